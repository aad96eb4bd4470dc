//! Selectors decide which requests a handle applies to.
//!
//! A selector is the `(methods, hosts, paths)` triple parsed from the leading strings of a
//! registration call. Every string is a blob of tokens separated by whitespace or commas:
//!
//! - a token starting with `/` is a path pattern
//! - a token naming a known HTTP method is a method
//! - anything else is a virtual host
//!
//! Categories left empty fall back to `*` for methods and hosts and to `/{*}` for paths.
//!
//! # Examples
//!
//! ```
//! use micro_dispatch::selector::Selector;
//!
//! let selector = Selector::parse(["GET, post api.example.com /users/{id}"]);
//! assert_eq!(selector.methods(), ["get", "post"]);
//! assert_eq!(selector.hosts(), ["api.example.com"]);
//! assert_eq!(selector.paths(), ["/users/{id}"]);
//! ```

pub mod matcher;

pub use matcher::PathParams;
pub use matcher::RequestTarget;

use crate::tables;

/// Token accepted in the method and host sets to mean "any".
pub const WILDCARD: &str = "*";

/// Path pattern used when a registration names no path: match everything from the root.
pub const MATCH_ALL: &str = "/{*}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    methods: Vec<String>,
    hosts: Vec<String>,
    paths: Vec<String>,
}

impl Selector {
    /// Parses selector blobs, applying the defaults for any empty category.
    pub fn parse<I, S>(blobs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut methods = vec![];
        let mut hosts = vec![];
        let mut paths = vec![];

        for blob in blobs {
            let blob = blob.as_ref().trim().to_lowercase();
            for token in blob.split(|c: char| c.is_whitespace() || c == ',').filter(|token| !token.is_empty()) {
                if token.starts_with('/') {
                    paths.push(token.to_owned());
                } else if tables::is_method(token) {
                    methods.push(token.to_owned());
                } else {
                    hosts.push(token.to_owned());
                }
            }
        }

        if methods.is_empty() {
            methods.push(WILDCARD.to_owned());
        }
        if hosts.is_empty() {
            hosts.push(WILDCARD.to_owned());
        }
        if paths.is_empty() {
            paths.push(MATCH_ALL.to_owned());
        }

        Self { methods, hosts, paths }
    }

    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Matches a request, returning the captured path placeholders on success.
    #[inline]
    pub fn matches(&self, target: &RequestTarget<'_>) -> Option<PathParams> {
        matcher::match_selector(target, self)
    }
}

impl Default for Selector {
    fn default() -> Self {
        Self::parse::<_, &str>([])
    }
}

/// Types usable as the leading strings of a registration call.
pub trait IntoSelector {
    fn into_blobs(self) -> Vec<String>;

    fn into_selector(self) -> Selector
    where
        Self: Sized,
    {
        Selector::parse(self.into_blobs())
    }
}

impl IntoSelector for () {
    fn into_blobs(self) -> Vec<String> {
        vec![]
    }
}

impl IntoSelector for &str {
    fn into_blobs(self) -> Vec<String> {
        vec![self.to_owned()]
    }
}

impl IntoSelector for String {
    fn into_blobs(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoSelector for &String {
    fn into_blobs(self) -> Vec<String> {
        vec![self.clone()]
    }
}

impl IntoSelector for &[&str] {
    fn into_blobs(self) -> Vec<String> {
        self.iter().map(|blob| (*blob).to_owned()).collect()
    }
}

impl<const N: usize> IntoSelector for [&str; N] {
    fn into_blobs(self) -> Vec<String> {
        self.iter().map(|blob| (*blob).to_owned()).collect()
    }
}

impl IntoSelector for Vec<&str> {
    fn into_blobs(self) -> Vec<String> {
        self.into_iter().map(ToOwned::to_owned).collect()
    }
}

impl IntoSelector for Vec<String> {
    fn into_blobs(self) -> Vec<String> {
        self
    }
}

/// Leading method token prepended to another selector source, used by the per-method helpers.
#[derive(Debug)]
pub(crate) struct WithMethod<S> {
    method: &'static str,
    inner: S,
}

impl<S> WithMethod<S> {
    pub(crate) fn new(method: &'static str, inner: S) -> Self {
        Self { method, inner }
    }
}

impl<S: IntoSelector> IntoSelector for WithMethod<S> {
    fn into_blobs(self) -> Vec<String> {
        let mut blobs = vec![self.method.to_owned()];
        blobs.extend(self.inner.into_blobs());
        blobs
    }
}
