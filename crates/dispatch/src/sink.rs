//! The writable side of a response, as provided by the transport.
//!
//! A dispatch pipeline exclusively owns the sink of its request. Until the head is written,
//! headers set through [`ResponseSink::set_header`] are pending and get merged into the head;
//! headers passed to [`ResponseSink::write_head`] take precedence over pending ones.

use crate::error::SinkError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::sync::{Arc, Mutex, PoisonError};

/// Terminal flags of a response, mirrored from the transport.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SinkState {
    pub head_sent: bool,
    pub finished: bool,
    pub closed: bool,
    pub aborted: bool,
    pub destroyed: bool,
}

impl SinkState {
    /// Once terminal, nothing more may be written to the sink.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.finished || self.closed || self.aborted || self.destroyed
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponseSink: Send {
    /// Sets a header to be sent with the head.
    fn set_header(&mut self, name: HeaderName, value: HeaderValue);

    fn write_head(&mut self, status: StatusCode, headers: HeaderMap) -> Result<(), SinkError>;

    /// Writes a body chunk, writing a default `200` head first if none was written.
    async fn write(&mut self, chunk: Bytes) -> Result<(), SinkError>;

    /// Completes the response.
    fn end(&mut self) -> Result<(), SinkError>;

    /// Tears the response down without completing it.
    fn destroy(&mut self);

    fn state(&self) -> SinkState;
}

/// What a [`MemorySink`] has recorded so far.
#[derive(Debug, Default, Clone)]
pub struct Recorded {
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub body: BytesMut,
    pub head_writes: usize,
    pub state: SinkState,
}

/// A sink keeping everything in memory, for driving a pipeline without a transport.
///
/// The paired [`Recording`] stays readable after the sink has been handed to a pipeline.
///
/// # Example
/// ```
/// use micro_dispatch::sink::{MemorySink, ResponseSink};
/// use http::{HeaderMap, StatusCode};
///
/// let (mut sink, recording) = MemorySink::new();
/// sink.write_head(StatusCode::NO_CONTENT, HeaderMap::new()).unwrap();
/// sink.end().unwrap();
///
/// assert_eq!(recording.status(), Some(StatusCode::NO_CONTENT));
/// assert!(recording.state().finished);
/// ```
#[derive(Debug)]
pub struct MemorySink {
    pending: HeaderMap,
    recorded: Arc<Mutex<Recorded>>,
}

#[derive(Debug, Clone)]
pub struct Recording {
    recorded: Arc<Mutex<Recorded>>,
}

impl MemorySink {
    pub fn new() -> (Self, Recording) {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let recording = Recording { recorded: Arc::clone(&recorded) };
        (Self { pending: HeaderMap::new(), recorded }, recording)
    }

    fn with_recorded<T>(&self, f: impl FnOnce(&mut Recorded) -> T) -> T {
        let mut guard = self.recorded.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

#[async_trait]
impl ResponseSink for MemorySink {
    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.pending.insert(name, value);
    }

    fn write_head(&mut self, status: StatusCode, headers: HeaderMap) -> Result<(), SinkError> {
        let mut merged = std::mem::take(&mut self.pending);
        merge_headers(&mut merged, headers);

        self.with_recorded(|recorded| {
            if recorded.state.is_terminal() {
                return Err(SinkError::Closed);
            }
            if recorded.state.head_sent {
                return Err(SinkError::HeadersSent);
            }
            recorded.status = Some(status);
            recorded.headers = merged;
            recorded.head_writes += 1;
            recorded.state.head_sent = true;
            Ok(())
        })
    }

    async fn write(&mut self, chunk: Bytes) -> Result<(), SinkError> {
        if !self.state().head_sent {
            self.write_head(StatusCode::OK, HeaderMap::new())?;
        }
        self.with_recorded(|recorded| {
            if recorded.state.is_terminal() {
                return Err(SinkError::Closed);
            }
            recorded.body.extend_from_slice(&chunk);
            Ok(())
        })
    }

    fn end(&mut self) -> Result<(), SinkError> {
        if !self.state().head_sent {
            self.write_head(StatusCode::OK, HeaderMap::new())?;
        }
        self.with_recorded(|recorded| {
            if recorded.state.is_terminal() {
                return Err(SinkError::Closed);
            }
            recorded.state.finished = true;
            Ok(())
        })
    }

    fn destroy(&mut self) {
        self.with_recorded(|recorded| recorded.state.destroyed = true);
    }

    fn state(&self) -> SinkState {
        self.with_recorded(|recorded| recorded.state)
    }
}

impl Recording {
    pub fn snapshot(&self) -> Recorded {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.snapshot().status
    }

    pub fn headers(&self) -> HeaderMap {
        self.snapshot().headers
    }

    pub fn body(&self) -> Bytes {
        self.snapshot().body.freeze()
    }

    pub fn head_writes(&self) -> usize {
        self.snapshot().head_writes
    }

    pub fn state(&self) -> SinkState {
        self.snapshot().state
    }
}

/// Merges `headers` into `target`, replacing existing values of the same name.
pub(crate) fn merge_headers(target: &mut HeaderMap, headers: HeaderMap) {
    let mut current: Option<HeaderName> = None;
    for (name, value) in headers {
        match name {
            Some(name) => {
                target.insert(name.clone(), value);
                current = Some(name);
            }
            None => {
                if let Some(name) = &current {
                    target.append(name, value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header;

    #[test]
    fn test_terminal_flags() {
        assert!(!SinkState::default().is_terminal());
        assert!(!SinkState { head_sent: true, ..SinkState::default() }.is_terminal());
        assert!(SinkState { finished: true, ..SinkState::default() }.is_terminal());
        assert!(SinkState { closed: true, ..SinkState::default() }.is_terminal());
        assert!(SinkState { aborted: true, ..SinkState::default() }.is_terminal());
        assert!(SinkState { destroyed: true, ..SinkState::default() }.is_terminal());
    }

    #[test]
    fn test_head_merges_pending_headers() {
        let (mut sink, recording) = MemorySink::new();
        sink.set_header(header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
        sink.set_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        sink.write_head(StatusCode::OK, headers).unwrap();

        let headers = recording.headers();
        assert_eq!(headers[header::X_FRAME_OPTIONS], "SAMEORIGIN");
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_head_is_written_once() {
        let (mut sink, recording) = MemorySink::new();
        sink.write_head(StatusCode::OK, HeaderMap::new()).unwrap();
        assert_eq!(sink.write_head(StatusCode::OK, HeaderMap::new()), Err(SinkError::HeadersSent));
        assert_eq!(recording.head_writes(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_write_after_end_fails() {
        let (mut sink, recording) = MemorySink::new();
        sink.write(Bytes::from_static(b"hi")).await.unwrap();
        sink.end().unwrap();

        assert_eq!(sink.write(Bytes::from_static(b"again")).await, Err(SinkError::Closed));
        assert_eq!(recording.status(), Some(StatusCode::OK));
        assert_eq!(recording.body(), Bytes::from_static(b"hi"));
    }

    #[test]
    fn test_merge_keeps_multi_values() {
        let mut target = HeaderMap::new();
        target.insert(header::SET_COOKIE, HeaderValue::from_static("old=1"));

        let mut headers = HeaderMap::new();
        headers.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));
        merge_headers(&mut target, headers);

        let cookies = target.get_all(header::SET_COOKIE).iter().collect::<Vec<_>>();
        assert_eq!(cookies, ["a=1", "b=2"]);
    }
}
