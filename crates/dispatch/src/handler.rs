//! The handler contract.
//!
//! A handler receives the response [`Context`] of the request, may suspend, may mutate the
//! response state or end the response itself, and may return a value which the pipeline
//! stores in the context under the handler's name for later handlers to read.
//!
//! Two shapes are accepted: plain async functions or closures wrapped with [`handler_fn`],
//! and any type implementing [`Handler`]. Both are stored the same way once registered.

use crate::context::Context;
use crate::error::HandleError;
use async_trait::async_trait;
use serde_json::Value;
use std::any::type_name;
use std::sync::Arc;

pub type HandleResult = Result<Option<Value>, HandleError>;

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: Context) -> HandleResult;

    /// The declared name, used as the output slot of the returned value.
    ///
    /// Defaults to the implementing type's name with its first character lowercased,
    /// so a `Session` handler publishes its value as `session`.
    fn name(&self) -> Option<String> {
        declared_name(type_name::<Self>())
    }
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Box<H> {
    async fn handle(&self, ctx: Context) -> HandleResult {
        (**self).handle(ctx).await
    }

    fn name(&self) -> Option<String> {
        (**self).name()
    }
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn handle(&self, ctx: Context) -> HandleResult {
        (**self).handle(ctx).await
    }

    fn name(&self) -> Option<String> {
        (**self).name()
    }
}

/// Values a handler function may return.
pub trait IntoOutput {
    fn into_output(self) -> HandleResult;
}

impl IntoOutput for () {
    fn into_output(self) -> HandleResult {
        Ok(None)
    }
}

impl IntoOutput for Value {
    fn into_output(self) -> HandleResult {
        Ok(Some(self))
    }
}

impl IntoOutput for Option<Value> {
    fn into_output(self) -> HandleResult {
        Ok(self)
    }
}

impl<T, E> IntoOutput for Result<T, E>
where
    T: IntoOutput,
    E: Into<HandleError>,
{
    fn into_output(self) -> HandleResult {
        self.map_err(Into::into).and_then(IntoOutput::into_output)
    }
}

/// an async `Fn(Context)` holder
#[derive(Debug, Clone)]
pub struct FnHandler<F> {
    f: F,
}

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Context) -> Fut,
    Fut: Future,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut, R> Handler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutput + Send + 'static,
{
    async fn handle(&self, ctx: Context) -> HandleResult {
        (self.f)(ctx).await.into_output()
    }

    fn name(&self) -> Option<String> {
        declared_name(type_name::<F>())
    }
}

/// A handler with an explicitly given name.
#[derive(Debug, Clone)]
pub struct Named<H> {
    name: String,
    handler: H,
}

#[async_trait]
impl<H: Handler> Handler for Named<H> {
    async fn handle(&self, ctx: Context) -> HandleResult {
        self.handler.handle(ctx).await
    }

    fn name(&self) -> Option<String> {
        Some(self.name.clone())
    }
}

pub trait HandlerExt: Handler + Sized {
    fn named(self, name: impl Into<String>) -> Named<Self> {
        Named { name: name.into(), handler: self }
    }
}

impl<H: Handler> HandlerExt for H {}

/// Turns a type path such as `app::handlers::Session` or `app::session` into `session`.
///
/// Closures have no name of their own and yield `None`.
pub(crate) fn declared_name(path: &str) -> Option<String> {
    if path.contains("{{closure}}") {
        return None;
    }

    let without_generics = path.split('<').next().unwrap_or(path);
    let last = without_generics.rsplit("::").next().unwrap_or(without_generics).trim();

    let mut chars = last.chars();
    let first = chars.next()?;
    if !(first.is_alphabetic() || first == '_') {
        return None;
    }
    Some(first.to_lowercase().chain(chars).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Session;

    #[async_trait]
    impl Handler for Session {
        async fn handle(&self, _ctx: Context) -> HandleResult {
            Ok(None)
        }
    }

    async fn load_user(_ctx: Context) -> Value {
        Value::Null
    }

    fn assert_is_handler<T: Handler>(_handler: &T) {
        // no op
    }

    #[test]
    fn test_struct_name() {
        assert_eq!(Session.name().as_deref(), Some("session"));
        let boxed: Box<dyn Handler> = Box::new(Session);
        assert_eq!(boxed.name().as_deref(), Some("session"));
    }

    #[test]
    fn test_fn_item_name() {
        let handler = handler_fn(load_user);
        assert_is_handler(&handler);
        assert_eq!(handler.name().as_deref(), Some("load_user"));
    }

    #[test]
    fn test_closure_is_anonymous() {
        let handler = handler_fn(|_ctx: Context| async {});
        assert_is_handler(&handler);
        assert_eq!(handler.name(), None);

        let named = handler.named("greeting");
        assert_eq!(named.name().as_deref(), Some("greeting"));
    }

    #[test]
    fn test_declared_name() {
        assert_eq!(declared_name("app::handlers::Session").as_deref(), Some("session"));
        assert_eq!(declared_name("app::Cache<app::Store>").as_deref(), Some("cache"));
        assert_eq!(declared_name("Payload").as_deref(), Some("payload"));
        assert_eq!(declared_name("app::main::{{closure}}"), None);
        assert_eq!(declared_name(""), None);
    }

    #[test]
    fn test_into_output() {
        assert!(matches!(().into_output(), Ok(None)));
        assert!(matches!(Value::from(1).into_output(), Ok(Some(_))));

        let failed: Result<(), HandleError> = Err(HandleError::not_found("missing"));
        assert_eq!(failed.into_output().unwrap_err().code(), Some(404));
    }
}
