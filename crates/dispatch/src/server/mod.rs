//! The server shell: binds the listener, picks the protocol and hands every request to the
//! shared [`Dispatcher`].
//!
//! Handles are registered on the server before [`Server::open`]. Opening moves the registry
//! into the dispatcher, after which it is read-only and further registrations fail with
//! [`RegistrationError::Frozen`]. A closed server keeps its dispatcher and can be opened again.

mod channel_sink;
mod tls;

use crate::body::{RequestBody, ResponseBody};
use crate::config::{HttpVersion, ServerConfig};
use crate::dispatcher::Dispatcher;
use crate::error::{RegistrationError, ServerError};
use crate::handler::Handler;
use crate::registry::Registry;
use crate::security::SecurityHeaders;
use crate::selector::IntoSelector;
use channel_sink::ChannelSink;
use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::convert::Infallible;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    registry: Option<Registry>,
    dispatcher: Option<Arc<Dispatcher>>,
    running: Option<Running>,
    local_addr: Option<SocketAddr>,
}

#[derive(Debug)]
struct Running {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

macro_rules! method_handle {
    ($method:ident) => {
        #[doc = concat!("Registers a handler restricted to `", stringify!($method), "` requests.")]
        pub fn $method<H: Handler + 'static>(
            &mut self,
            selector: impl IntoSelector,
            handler: H,
        ) -> Result<&mut Self, RegistrationError> {
            self.registry()?.$method(selector, handler);
            Ok(self)
        }
    };
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self { config, registry: Some(Registry::new()), dispatcher: None, running: None, local_addr: None }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn registry(&mut self) -> Result<&mut Registry, RegistrationError> {
        self.registry.as_mut().ok_or(RegistrationError::Frozen)
    }

    pub fn add<H: Handler + 'static>(
        &mut self,
        selector: impl IntoSelector,
        handler: H,
    ) -> Result<&mut Self, RegistrationError> {
        self.registry()?.add(selector, handler);
        Ok(self)
    }

    pub fn add_all<I>(&mut self, selector: impl IntoSelector, handlers: I) -> Result<&mut Self, RegistrationError>
    where
        I: IntoIterator<Item = Box<dyn Handler>>,
    {
        self.registry()?.add_all(selector, handlers)?;
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

    /// Binds the listener and starts accepting connections in the background.
    ///
    /// Resolves once the server is listening, [`Server::port`] then reports the bound port
    /// even when an ephemeral one was requested.
    pub async fn open(&mut self) -> Result<(), ServerError> {
        if self.running.is_some() {
            return Err(ServerError::AlreadyOpen);
        }

        SecurityHeaders::from_config(&self.config)?;
        let version = self.config.version;
        let acceptor = self.config.tls_config()?.map(|material| tls::acceptor(material, version)).transpose()?;

        let address = self.config.bind_address().to_owned();
        let listener = TcpListener::bind((address.as_str(), self.config.port))
            .await
            .map_err(|source| ServerError::Bind { address: format!("{address}:{}", self.config.port), source })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind { address, source })?;

        let dispatcher = self.dispatcher()?;

        info!(
            address = %local_addr,
            ?version,
            secure = acceptor.is_some(),
            "start listening",
        );

        let (shutdown, signal) = oneshot::channel();
        let task = tokio::spawn(accept_loop(listener, dispatcher, acceptor, version, signal));

        self.local_addr = Some(local_addr);
        self.running = Some(Running { shutdown, task });
        Ok(())
    }

    fn dispatcher(&mut self) -> Result<Arc<Dispatcher>, ServerError> {
        if let Some(dispatcher) = &self.dispatcher {
            return Ok(Arc::clone(dispatcher));
        }
        let registry = self.registry.take().unwrap_or_default();
        let dispatcher = Arc::new(Dispatcher::new(registry, &self.config)?);
        self.dispatcher = Some(Arc::clone(&dispatcher));
        Ok(dispatcher)
    }

    /// Stops accepting connections. Connections already accepted are served to completion.
    pub async fn close(&mut self) -> Result<(), ServerError> {
        let Running { shutdown, task } = self.running.take().ok_or(ServerError::NotOpen)?;

        let _ = shutdown.send(());
        if let Err(e) = task.await {
            error!(cause = %e, "accept loop failed");
        }
        info!(address = ?self.local_addr, "server closed");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.running.is_some()
    }

    /// The bound port, or the configured one before [`Server::open`].
    pub fn port(&self) -> u16 {
        self.local_addr.map_or(self.config.port, |address| address.port())
    }

    pub fn address(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// `IPv4` or `IPv6`, once bound.
    pub fn family(&self) -> Option<&'static str> {
        self.local_addr.map(|address| if address.is_ipv4() { "IPv4" } else { "IPv6" })
    }
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    acceptor: Option<TlsAcceptor>,
    version: HttpVersion,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        let (stream, remote) = tokio::select! {
            _ = &mut shutdown => {
                debug!("shutdown requested, stop accepting");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            },
        };

        let dispatcher = Arc::clone(&dispatcher);
        let acceptor = acceptor.clone();

        tokio::spawn(async move {
            match acceptor {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(stream) => serve_connection(stream, dispatcher, version, remote).await,
                    Err(e) => warn!(cause = %e, %remote, "tls handshake failed"),
                },
                None => serve_connection(stream, dispatcher, version, remote).await,
            }
        });
    }
}

async fn serve_connection<S>(stream: S, dispatcher: Arc<Dispatcher>, version: HttpVersion, remote: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let service = service_fn(move |request| respond(Arc::clone(&dispatcher), request));

    let result: Result<(), Box<dyn Error + Send + Sync>> = match version {
        HttpVersion::Http1 => http1::Builder::new().serve_connection(io, service).await.map_err(Into::into),
        HttpVersion::Http2 => auto::Builder::new(TokioExecutor::new()).serve_connection(io, service).await,
    };

    match result {
        Ok(()) => debug!(%remote, "connection closed"),
        Err(e) => debug!(cause = %e, %remote, "connection closed with error"),
    }
}

/// Runs the pipeline for one request and answers with whatever head it writes.
///
/// The pipeline runs on its own task and keeps streaming the body after the head
/// has been returned to hyper.
async fn respond(
    dispatcher: Arc<Dispatcher>,
    request: Request<Incoming>,
) -> Result<Response<ResponseBody>, Infallible> {
    let (parts, body) = request.into_parts();
    let body: RequestBody = body.map_err(Into::into).boxed_unsync();
    let (sink, head) = ChannelSink::new();

    tokio::spawn(async move { dispatcher.dispatch(parts, body, Box::new(sink)).await });

    match head.await {
        Ok(response) => Ok(response),
        Err(_) => {
            debug!("pipeline finished without writing a response");
            let mut response = Response::new(ResponseBody::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            Ok(response)
        }
    }
}
