//! Per-request response context.
//!
//! A [`Context`] carries an immutable snapshot of the request (method, parsed url, headers)
//! and the response state handlers accumulate until finalization: status code, headers,
//! body, status message, plus named slots through which handlers hand values to the
//! handlers registered after them.
//!
//! The context is a cheap clonable handle; the pipeline passes a clone to every handler it
//! invokes and handlers never run concurrently within one request.

mod finalize;

pub use finalize::Finalizer;
pub(crate) use finalize::Outgoing;

use crate::body::{Body, RequestBody};
use crate::error::HandleError;
use crate::selector::{PathParams, RequestTarget};
use crate::sink::{ResponseSink, SinkState};
use crate::tables;
use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Version};
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;
use url::Url;

#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    request: RequestFacts,
    state: Mutex<State>,
    body: Mutex<Option<RequestBody>>,
    sink: tokio::sync::Mutex<Box<dyn ResponseSink>>,
    finalizer: Arc<Finalizer>,
}

/// Immutable facts about the incoming request.
#[derive(Debug, Clone)]
pub(crate) struct RequestFacts {
    method: String,
    url: Url,
    headers: HeaderMap,
    version: Version,
}

#[derive(Default)]
struct State {
    code: Option<StatusCode>,
    message: Option<String>,
    head: HeaderMap,
    body: Option<Body>,
    slots: HashMap<String, Value>,
    params: PathParams,
}

impl RequestFacts {
    /// Rebuilds the absolute request url from the request line and the `host` header.
    ///
    /// HTTP/2 requests carry scheme and authority in their uri, HTTP/1 requests only the
    /// path, so the scheme falls back to the connection's and the authority to `host`.
    pub(crate) fn from_parts(parts: &Parts, secure: bool, default_host: &str) -> Result<Self, url::ParseError> {
        let authority = parts
            .uri
            .authority()
            .map(|authority| authority.as_str().to_owned())
            .or_else(|| parts.headers.get(http::header::HOST).and_then(|value| value.to_str().ok()).map(str::to_owned))
            .unwrap_or_else(|| default_host.to_owned());
        let scheme = parts.uri.scheme_str().unwrap_or(if secure { "https" } else { "http" });
        let path = parts.uri.path_and_query().map_or("/", |path| path.as_str());

        let url = Url::parse(&format!("{scheme}://{authority}{path}"))?;

        Ok(Self {
            method: parts.method.as_str().to_ascii_lowercase(),
            url,
            headers: parts.headers.clone(),
            version: parts.version,
        })
    }
}

impl Context {
    pub(crate) fn new(
        request: RequestFacts,
        head: HeaderMap,
        body: Option<RequestBody>,
        sink: Box<dyn ResponseSink>,
        finalizer: Arc<Finalizer>,
    ) -> Self {
        let state = State { head, ..State::default() };
        Self {
            inner: Arc::new(Inner {
                request,
                state: Mutex::new(state),
                body: Mutex::new(body),
                sink: tokio::sync::Mutex::new(sink),
                finalizer,
            }),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut guard = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// The lowercase request method.
    pub fn method(&self) -> &str {
        &self.inner.request.method
    }

    pub fn url(&self) -> &Url {
        &self.inner.request.url
    }

    /// The lowercase host name, without port.
    pub fn host(&self) -> &str {
        self.inner.request.url.host_str().unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        self.inner.request.url.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.inner.request.url.query()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.request.headers
    }

    pub fn version(&self) -> Version {
        self.inner.request.version
    }

    pub fn target(&self) -> RequestTarget<'_> {
        RequestTarget::new(self.method(), self.host(), self.path())
    }

    /// A value captured by the matched path pattern of the running handler.
    pub fn param(&self, name: &str) -> Option<String> {
        self.with_state(|state| state.params.get(name).map(ToOwned::to_owned))
    }

    pub fn params(&self) -> PathParams {
        self.with_state(|state| state.params.clone())
    }

    pub(crate) fn set_params(&self, params: PathParams) {
        self.with_state(|state| state.params = params);
    }

    /// Reads a named slot.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.with_state(|state| state.slots.get(name).cloned())
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) -> &Self {
        self.with_state(|state| state.slots.insert(name.into(), value.into()));
        self
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.with_state(|state| state.slots.remove(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.with_state(|state| state.slots.contains_key(name))
    }

    pub fn code(&self) -> Option<StatusCode> {
        self.with_state(|state| state.code)
    }

    pub fn set_code(&self, code: StatusCode) -> &Self {
        self.with_state(|state| state.code = Some(code));
        self
    }

    pub fn message(&self) -> Option<String> {
        self.with_state(|state| state.message.clone())
    }

    pub fn set_message(&self, message: impl Into<String>) -> &Self {
        self.with_state(|state| state.message = Some(message.into()));
        self
    }

    pub fn header(&self, name: impl http::header::AsHeaderName) -> Option<HeaderValue> {
        self.with_state(|state| state.head.get(name).cloned())
    }

    pub fn insert_header(&self, name: HeaderName, value: HeaderValue) -> &Self {
        self.with_state(|state| state.head.insert(name, value));
        self
    }

    pub fn remove_header(&self, name: impl http::header::AsHeaderName) -> Option<HeaderValue> {
        self.with_state(|state| state.head.remove(name))
    }

    pub fn set_body(&self, body: impl Into<Body>) -> &Self {
        self.with_state(|state| state.body = Some(body.into()));
        self
    }

    pub fn has_body(&self) -> bool {
        self.with_state(|state| state.body.is_some())
    }

    /// Takes the request body, `None` if it was taken before.
    pub fn take_body(&self) -> Option<RequestBody> {
        self.inner.body.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Collects the whole request body.
    pub async fn read_body(&self) -> Result<Bytes, HandleError> {
        let body = self.take_body().ok_or_else(|| HandleError::bad_request("body has been consumed"))?;
        let collected = body.collect().await.map_err(HandleError::from_source)?;
        Ok(collected.to_bytes())
    }

    /// Terminal flags of the underlying response.
    pub async fn state(&self) -> SinkState {
        self.inner.sink.lock().await.state()
    }

    pub async fn is_terminal(&self) -> bool {
        self.state().await.is_terminal()
    }

    /// Exclusive access to the response sink, for handlers writing the response by hand.
    pub async fn sink(&self) -> tokio::sync::MutexGuard<'_, Box<dyn ResponseSink>> {
        self.inner.sink.lock().await
    }

    /// Tears the response down without completing it.
    pub async fn destroy(&self) {
        self.inner.sink.lock().await.destroy();
    }

    /// Finalizes the response with the accumulated state.
    ///
    /// Only the first call writes anything. Once the response is terminal, later calls
    /// return immediately; if a handler wrote the head itself, the sink is just ended.
    pub async fn end(&self) -> Result<(), HandleError> {
        let mut sink = self.inner.sink.lock().await;
        let state = sink.state();

        if state.is_terminal() {
            debug!(method = %self.method(), path = %self.path(), "response already terminated, skip finalization");
            return Ok(());
        }

        if state.head_sent {
            sink.end()?;
            return Ok(());
        }

        let outgoing = self.take_outgoing();
        self.inner.finalizer.finalize(&mut **sink, outgoing).await
    }

    /// Prepares the context for an error response: status and message replace the current
    /// ones and the body falls back to the default `{code, message}` document. Entity headers
    /// set for the discarded body are dropped with it.
    pub(crate) fn reset_for_error(&self, code: StatusCode, message: Option<String>) {
        self.with_state(|state| {
            state.code = Some(code);
            state.message = message;
            state.body = None;
            state.head.remove(http::header::CONTENT_LENGTH);
            state.head.remove(http::header::CONTENT_TYPE);
        });
    }

    fn take_outgoing(&self) -> Outgoing {
        self.with_state(|state| {
            let code = *state.code.get_or_insert(StatusCode::OK);
            let message =
                state.message.get_or_insert_with(|| tables::status_message(code).to_owned()).clone();
            Outgoing { code, message, head: std::mem::take(&mut state.head), body: state.body.take() }
        })
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.method())
            .field("url", &self.url().as_str())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::ServerConfig;
    use crate::sink::{MemorySink, Recording};
    use http::Request;

    pub(crate) fn parts(method: &str, uri: &str, host: &str) -> Parts {
        Request::builder().method(method).uri(uri).header(http::header::HOST, host).body(()).unwrap().into_parts().0
    }

    pub(crate) fn context(method: &str, uri: &str) -> (Context, Recording) {
        let request = RequestFacts::from_parts(&parts(method, uri, "example.com"), false, "localhost").unwrap();
        let (sink, recording) = MemorySink::new();
        let finalizer = Arc::new(Finalizer::from_config(&ServerConfig::default()));
        (Context::new(request, HeaderMap::new(), None, Box::new(sink), finalizer), recording)
    }
}
