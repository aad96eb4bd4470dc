use crate::body::ResponseBody;
use crate::error::SinkError;
use crate::sink::{ResponseSink, SinkState, merge_headers};
use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use futures::channel::mpsc;
use http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use std::io;
use tokio::sync::oneshot;
use tracing::debug;

const BODY_BUFFER: usize = 8;

/// A sink feeding a hyper response: the head goes through a oneshot channel to the service
/// future, body chunks through a bounded channel into the [`ResponseBody`].
///
/// A dropped receiver means the client went away, the sink reports itself aborted.
#[derive(Debug)]
pub(crate) struct ChannelSink {
    pending: HeaderMap,
    head: Option<oneshot::Sender<Response<ResponseBody>>>,
    body: Option<mpsc::Sender<io::Result<Bytes>>>,
    state: SinkState,
}

impl ChannelSink {
    pub(crate) fn new() -> (Self, oneshot::Receiver<Response<ResponseBody>>) {
        let (sender, receiver) = oneshot::channel();
        let sink = Self { pending: HeaderMap::new(), head: Some(sender), body: None, state: SinkState::default() };
        (sink, receiver)
    }

    fn abort(&mut self) {
        debug!("response receiver dropped, abort response");
        self.state.aborted = true;
        self.state.closed = true;
        self.head = None;
        self.body = None;
    }

    fn ensure_head(&mut self) -> Result<(), SinkError> {
        if self.state.head_sent { Ok(()) } else { self.write_head(StatusCode::OK, HeaderMap::new()) }
    }
}

#[async_trait]
impl ResponseSink for ChannelSink {
    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.pending.insert(name, value);
    }

    fn write_head(&mut self, status: StatusCode, headers: HeaderMap) -> Result<(), SinkError> {
        if self.state().is_terminal() {
            return Err(SinkError::Closed);
        }
        let Some(head) = self.head.take() else {
            return Err(SinkError::HeadersSent);
        };

        let mut merged = std::mem::take(&mut self.pending);
        merge_headers(&mut merged, headers);

        let (sender, receiver) = mpsc::channel(BODY_BUFFER);
        let mut response = Response::new(ResponseBody::channel(receiver));
        *response.status_mut() = status;
        *response.headers_mut() = merged;

        self.state.head_sent = true;
        if head.send(response).is_err() {
            self.abort();
            return Err(SinkError::Closed);
        }
        self.body = Some(sender);
        Ok(())
    }

    async fn write(&mut self, chunk: Bytes) -> Result<(), SinkError> {
        self.ensure_head()?;
        if self.state().is_terminal() {
            return Err(SinkError::Closed);
        }
        let Some(body) = self.body.as_mut() else {
            return Err(SinkError::Closed);
        };

        if body.send(Ok(chunk)).await.is_err() {
            self.abort();
            return Err(SinkError::Closed);
        }
        Ok(())
    }

    fn end(&mut self) -> Result<(), SinkError> {
        self.ensure_head()?;
        if self.state().is_terminal() {
            return Err(SinkError::Closed);
        }
        self.body = None;
        self.state.finished = true;
        Ok(())
    }

    fn destroy(&mut self) {
        if let Some(mut body) = self.body.take() {
            // a full buffer drops the error, the body then just ends early
            let _ = body.try_send(Err(io::Error::other("response destroyed")));
        }
        self.head = None;
        self.state.destroyed = true;
    }

    fn state(&self) -> SinkState {
        let mut state = self.state;
        if self.body.as_ref().is_some_and(mpsc::Sender::is_closed) {
            state.aborted = true;
            state.closed = true;
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header;
    use http_body_util::BodyExt;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_head_and_body_reach_the_response() {
        let (mut sink, head) = ChannelSink::new();
        sink.set_header(header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("5"));
        sink.write_head(StatusCode::CREATED, headers).unwrap();

        let response = head.await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "SAMEORIGIN");

        let writer = tokio::spawn(async move {
            sink.write(Bytes::from_static(b"he")).await.unwrap();
            sink.write(Bytes::from_static(b"llo")).await.unwrap();
            sink.end().unwrap();
            sink.state()
        });

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(b"hello"));
        assert!(writer.await.unwrap().finished);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_dropped_receiver_aborts() {
        let (mut sink, head) = ChannelSink::new();
        drop(head);

        assert_eq!(sink.write_head(StatusCode::OK, HeaderMap::new()), Err(SinkError::Closed));
        let state = sink.state();
        assert!(state.aborted && state.closed);
        assert!(state.is_terminal());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_dropped_body_is_reported() {
        let (mut sink, head) = ChannelSink::new();
        sink.write_head(StatusCode::OK, HeaderMap::new()).unwrap();
        drop(head.await.unwrap());

        assert!(sink.state().aborted);
        assert_eq!(sink.write(Bytes::from_static(b"late")).await, Err(SinkError::Closed));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_destroy_aborts_body() {
        let (mut sink, head) = ChannelSink::new();
        sink.write(Bytes::from_static(b"part")).await.unwrap();
        sink.destroy();

        let response = head.await.unwrap();
        response.into_body().collect().await.unwrap_err();
        assert!(sink.state().destroyed);
    }
}
