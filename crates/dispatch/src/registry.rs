//! Ordered list of registered handles.
//!
//! Registration order is execution order. A handle couples the [`Selector`] parsed from the
//! leading strings of a registration call with the handler to run and the name under which
//! its return value is published.

use crate::error::RegistrationError;
use crate::handler::Handler;
use crate::selector::{IntoSelector, Selector, WithMethod};
use std::fmt;
use std::sync::Arc;

pub struct Handle {
    selector: Selector,
    handler: Arc<dyn Handler>,
    output: Option<String>,
}

impl Handle {
    pub fn new<H: Handler + 'static>(selector: Selector, handler: H) -> Self {
        let output = handler.name();
        Self { selector, handler: Arc::new(handler), output }
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    /// The slot the handler's return value is stored under, `None` for anonymous handlers.
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle").field("selector", &self.selector).field("output", &self.output).finish()
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    handles: Vec<Handle>,
}

macro_rules! method_handle {
    ($method:ident) => {
        #[doc = concat!("Registers a handler restricted to `", stringify!($method), "` requests.")]
        pub fn $method<H: Handler + 'static>(&mut self, selector: impl IntoSelector, handler: H) -> &mut Self {
            self.add(WithMethod::new(stringify!($method), selector), handler)
        }
    };
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one handler.
    ///
    /// # Example
    /// ```
    /// use micro_dispatch::{Context, Registry, handler_fn};
    ///
    /// async fn hello(ctx: Context) {
    ///     ctx.set_body("hello");
    /// }
    ///
    /// let mut registry = Registry::new();
    /// registry.add("GET /hello", handler_fn(hello));
    /// assert_eq!(registry.len(), 1);
    /// ```
    pub fn add<H: Handler + 'static>(&mut self, selector: impl IntoSelector, handler: H) -> &mut Self {
        self.handles.push(Handle::new(selector.into_selector(), handler));
        self
    }

    /// Registers every handler with the same selector, in iteration order.
    pub fn add_all<I>(&mut self, selector: impl IntoSelector, handlers: I) -> Result<&mut Self, RegistrationError>
    where
        I: IntoIterator<Item = Box<dyn Handler>>,
    {
        let handlers = handlers.into_iter().collect::<Vec<_>>();
        if handlers.is_empty() {
            return Err(RegistrationError::invalid_handle("no handler given"));
        }

        let selector = selector.into_selector();
        for handler in handlers {
            self.handles.push(Handle::new(selector.clone(), handler));
        }
        Ok(self)
    }

    method_handle!(get);
    method_handle!(post);
    method_handle!(put);
    method_handle!(delete);
    method_handle!(head);
    method_handle!(options);
    method_handle!(patch);
    method_handle!(connect);
    method_handle!(trace);

    pub fn iter(&self) -> impl Iterator<Item = &Handle> {
        self.handles.iter()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::handler::{HandleResult, HandlerExt, handler_fn};
    use crate::selector::{MATCH_ALL, WILDCARD};
    use async_trait::async_trait;

    struct Session;

    #[async_trait]
    impl Handler for Session {
        async fn handle(&self, _ctx: Context) -> HandleResult {
            Ok(None)
        }
    }

    async fn users(_ctx: Context) {}

    #[test]
    fn test_registration_order_is_kept() {
        let mut registry = Registry::new();
        registry.add((), Session).add("/users", handler_fn(users)).add("", handler_fn(|_ctx: Context| async {}));

        let outputs = registry.iter().map(Handle::output).collect::<Vec<_>>();
        assert_eq!(outputs, [Some("session"), Some("users"), None]);

        let first = registry.iter().next().unwrap();
        assert_eq!(first.selector().methods(), [WILDCARD]);
        assert_eq!(first.selector().paths(), [MATCH_ALL]);
    }

    #[test]
    fn test_method_helpers() {
        let mut registry = Registry::new();
        registry.get("/a", Session).post("api.example.com /b", Session).trace((), Session);

        let methods = registry.iter().map(|handle| handle.selector().methods().to_vec()).collect::<Vec<_>>();
        assert_eq!(methods, [vec!["get"], vec!["post"], vec!["trace"]]);

        let second = registry.iter().nth(1).unwrap();
        assert_eq!(second.selector().hosts(), ["api.example.com"]);
        assert_eq!(second.selector().paths(), ["/b"]);
    }

    #[test]
    fn test_add_all_shares_selector() {
        let mut registry = Registry::new();
        let handlers: Vec<Box<dyn Handler>> = vec![Box::new(Session), Box::new(handler_fn(users).named("list"))];
        registry.add_all("GET /users", handlers).unwrap();

        assert_eq!(registry.len(), 2);
        let outputs = registry.iter().map(Handle::output).collect::<Vec<_>>();
        assert_eq!(outputs, [Some("session"), Some("list")]);
        assert!(registry.iter().all(|handle| handle.selector().paths() == ["/users"]));
    }

    #[test]
    fn test_add_all_without_handler_fails() {
        let mut registry = Registry::new();
        let result = registry.add_all("GET /users", Vec::<Box<dyn Handler>>::new());

        assert!(matches!(result, Err(RegistrationError::InvalidHandle { .. })));
        assert!(registry.is_empty());
    }
}
