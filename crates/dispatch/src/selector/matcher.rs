//! Matching of requests against selectors.
//!
//! Paths and patterns are split into tokens on `/` and `-` and walked in lock-step. A pattern
//! token wrapped in `()` or `{}` is a placeholder: `{*}`, `(*)`, `{~}` and `(~)` match the rest
//! of the request unconditionally, any other placeholder captures exactly one request token.
//! Literal tokens must be equal. Unless a rest placeholder was reached, the request must have
//! exactly as many tokens as the pattern.

use crate::selector::{Selector, WILDCARD};

/// The request facts a selector is matched against. `method` and `host` are expected lowercase.
#[derive(Debug, Clone, Copy)]
pub struct RequestTarget<'a> {
    pub method: &'a str,
    pub host: &'a str,
    pub path: &'a str,
}

impl<'a> RequestTarget<'a> {
    pub fn new(method: &'a str, host: &'a str, path: &'a str) -> Self {
        Self { method, host, path }
    }
}

/// Values captured by single-segment placeholders, keyed by the placeholder's inner text.
///
/// For the pattern `/users/{id}` matched against `/users/42`, `id` maps to `"42"`.
/// Values are the raw request segments, nothing is decoded or validated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    inner: Vec<(String, String)>,
}

impl PathParams {
    #[inline]
    pub fn empty() -> Self {
        Self { inner: vec![] }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Gets the value of a placeholder by name, the first capture wins on duplicates.
    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        let key = key.as_ref();
        self.inner.iter().find(|(name, _)| name == key).map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    fn push(&mut self, name: &str, value: &str) {
        self.inner.push((name.to_owned(), value.to_owned()));
    }
}

/// Returns true when the selector accepts the request.
#[inline]
pub fn matches(target: &RequestTarget<'_>, selector: &Selector) -> bool {
    match_selector(target, selector).is_some()
}

pub fn match_selector(target: &RequestTarget<'_>, selector: &Selector) -> Option<PathParams> {
    if !accepts(selector.methods(), target.method) || !accepts(selector.hosts(), target.host) {
        return None;
    }

    // only the first registered pattern takes part in matching
    let pattern = selector.paths().first()?;
    match_path(pattern, target.path)
}

/// Matches a single path pattern against a request path.
pub fn match_path(pattern: &str, path: &str) -> Option<PathParams> {
    let mut segments = tokens(path);
    let mut params = PathParams::empty();
    let mut short = false;

    for token in tokens(pattern) {
        let segment = segments.next();
        match placeholder(token) {
            Some("*" | "~") => return Some(params),
            Some(name) => {
                // a later rest placeholder still accepts a path that ran out here
                short |= segment.is_none();
                params.push(name, segment.unwrap_or_default());
            }
            None if segment != Some(token) => return None,
            None => {}
        }
    }

    (!short && segments.next().is_none()).then_some(params)
}

#[inline]
fn accepts(set: &[String], value: &str) -> bool {
    set.iter().any(|token| token == WILDCARD || token == value)
}

#[inline]
fn tokens(s: &str) -> std::str::Split<'_, [char; 2]> {
    s.split(['/', '-'])
}

fn placeholder(token: &str) -> Option<&str> {
    token
        .strip_prefix('(')
        .and_then(|inner| inner.strip_suffix(')'))
        .or_else(|| token.strip_prefix('{').and_then(|inner| inner.strip_suffix('}')))
}
