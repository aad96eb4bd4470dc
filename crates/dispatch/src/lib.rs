//! An async request-dispatch layer over HTTP/1.1, HTTP/2 and TLS.
//!
//! Requests are matched against an ordered list of handles, each bound to a selector of
//! methods, virtual hosts and a path pattern. Matching handles run one after another on a
//! shared [`Context`] until one of them ends the response; the response is then finalized
//! with content negotiation and security header defaults.
//!
//! # Example
//!
//! ```no_run
//! use micro_dispatch::{Context, HandleError, Server, ServerConfig, handler_fn};
//! use serde_json::{Value, json};
//!
//! async fn user(ctx: Context) -> Result<Value, HandleError> {
//!     let id = ctx.param("id").ok_or_else(|| HandleError::not_found("no user"))?;
//!     Ok(json!({ "id": id }))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(ServerConfig { port: 8080, ..ServerConfig::default() });
//!     server.get("/users/{id}", handler_fn(user))?;
//!     server.add((), handler_fn(|ctx: Context| async move {
//!         let user = ctx.get("user").unwrap_or_default();
//!         ctx.set_body(json!({ "user": user }));
//!     }))?;
//!
//!     server.open().await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.close().await?;
//!     Ok(())
//! }
//! ```

pub mod body;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod registry;
pub mod security;
pub mod selector;
pub mod server;
pub mod sink;
pub mod tables;

pub use body::{Body, ByteStream};
pub use config::ServerConfig;
pub use context::Context;
pub use dispatcher::Dispatcher;
pub use error::{ConfigError, HandleError, RegistrationError, ServerError, SinkError};
pub use handler::{FnHandler, HandleResult, Handler, HandlerExt, handler_fn};
pub use registry::Registry;
pub use selector::{IntoSelector, PathParams, Selector};
pub use server::Server;
