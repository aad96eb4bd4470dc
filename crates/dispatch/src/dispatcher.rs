//! The per-request dispatch pipeline.
//!
//! For every request the [`Dispatcher`] injects the security headers, builds the
//! [`Context`], then walks the registry in order: a handle runs when its selector matches,
//! and the walk stops as soon as the response is terminal. Unless a handle ended the
//! response, it is finalized with the accumulated state. Errors and panics raised by
//! handles are turned into an error response here and never reach the transport.

use crate::body::RequestBody;
use crate::config::ServerConfig;
use crate::context::{Context, Finalizer, Outgoing, RequestFacts};
use crate::error::{ConfigError, HandleError};
use crate::registry::Registry;
use crate::security::SecurityHeaders;
use crate::sink::ResponseSink;
use crate::tables;
use futures::FutureExt;
use http::StatusCode;
use http::request::Parts;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Debug)]
pub struct Dispatcher {
    registry: Registry,
    security: SecurityHeaders,
    finalizer: Arc<Finalizer>,
    host: String,
    secure: bool,
    debug: bool,
    end: bool,
}

impl Dispatcher {
    pub fn new(registry: Registry, config: &ServerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            registry,
            security: SecurityHeaders::from_config(config)?,
            finalizer: Arc::new(Finalizer::from_config(config)),
            host: config.host(),
            secure: config.is_secure(),
            debug: config.debug,
            end: config.end,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Runs the pipeline for one request, writing the response into `sink`.
    pub async fn dispatch(&self, parts: Parts, body: RequestBody, mut sink: Box<dyn ResponseSink>) {
        for (name, value) in self.security.head() {
            sink.set_header(name.clone(), value.clone());
        }

        let request = match RequestFacts::from_parts(&parts, self.secure, &self.host) {
            Ok(request) => request,
            Err(e) => {
                warn!(cause = %e, uri = %parts.uri, "can't rebuild request url");
                self.reject(sink.as_mut(), StatusCode::BAD_REQUEST).await;
                return;
            }
        };

        let ctx = Context::new(request, self.security.head().clone(), Some(body), sink, Arc::clone(&self.finalizer));

        let error = match AssertUnwindSafe(self.run(&ctx)).catch_unwind().await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(panic) => HandleError::new(panic_message(panic.as_ref())),
        };

        self.recover(&ctx, error).await;
    }

    async fn run(&self, ctx: &Context) -> Result<(), HandleError> {
        for handle in self.registry.iter() {
            if ctx.is_terminal().await {
                debug!(method = %ctx.method(), path = %ctx.path(), "response is terminal, stop dispatching");
                return Ok(());
            }

            let Some(params) = handle.selector().matches(&ctx.target()) else {
                continue;
            };
            ctx.set_params(params);

            let output = handle.handler().handle(ctx.clone()).await?;
            if let (Some(name), Some(value)) = (handle.output(), output)
                && is_present(&value)
            {
                ctx.set(name, value);
            }
        }

        if self.end && !ctx.is_terminal().await {
            ctx.end().await?;
        }
        Ok(())
    }

    async fn recover(&self, ctx: &Context, error: HandleError) {
        let code = error.status();
        if !error.is_intentional() {
            error!(method = %ctx.method(), path = %ctx.path(), cause = %error, "handle failed");
        }

        let message = (self.debug || error.is_intentional()).then(|| error.message().to_owned());
        ctx.reset_for_error(code, message);

        if let Err(e) = ctx.end().await {
            warn!(method = %ctx.method(), path = %ctx.path(), cause = %e, "can't write error response");
        }
    }

    async fn reject(&self, sink: &mut dyn ResponseSink, code: StatusCode) {
        let outgoing = Outgoing {
            code,
            message: tables::status_message(code).to_owned(),
            head: self.security.head().clone(),
            body: None,
        };
        if let Err(e) = self.finalizer.finalize(sink, outgoing).await {
            warn!(cause = %e, "can't write rejection");
        }
    }
}

/// Return values worth publishing: anything but `null`, `false`, `0` and `""`.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handle panicked".to_owned()
    }
}
