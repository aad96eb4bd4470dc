use bytes::Bytes;
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use http_body::Body as HttpBody;
use http_body::{Frame, SizeHint};
use http_body_util::combinators::UnsyncBoxBody;
use serde_json::Value;
use std::error::Error;
use std::fmt;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::io::ReaderStream;

/// Incoming request body as handed over by the transport.
pub type RequestBody = UnsyncBoxBody<Bytes, Box<dyn Error + Send + Sync>>;

/// The body a handle assigns to the response context.
///
/// Structured values are serialized to JSON at finalization, streams are piped to the
/// sink without a computed content length.
pub enum Body {
    Bytes(Bytes),
    Text(String),
    Json(Value),
    Stream(ByteStream),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Bytes(bytes) => f.debug_tuple("Bytes").field(bytes).finish(),
            Body::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Body::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Body::Stream(stream) => f.debug_tuple("Stream").field(stream).finish(),
        }
    }
}

impl From<&'static str> for Body {
    fn from(value: &'static str) -> Self {
        Body::Text(value.to_owned())
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Body::Text(value)
    }
}

impl From<Bytes> for Body {
    fn from(value: Bytes) -> Self {
        Body::Bytes(value)
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(value))
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Json(value)
    }
}

impl From<ByteStream> for Body {
    fn from(value: ByteStream) -> Self {
        Body::Stream(value)
    }
}

/// A streaming byte source, optionally carrying the path it was read from.
///
/// The path is only metadata: finalization infers the content type from its extension.
pub struct ByteStream {
    path: Option<String>,
    inner: BoxStream<'static, io::Result<Bytes>>,
}

impl ByteStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self { path: None, inner: stream.boxed() }
    }

    /// Opens a file and streams its content.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(ReaderStream::new(file)).with_path(path.to_string_lossy()))
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }
}

impl Stream for ByteStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.poll_next_unpin(cx)
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStream").field("path", &self.path).finish_non_exhaustive()
    }
}

/// The response body handed to the transport.
pub struct ResponseBody {
    inner: Kind,
}

enum Kind {
    Once(Option<Bytes>),
    Channel(mpsc::Receiver<io::Result<Bytes>>),
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self { inner: Kind::Once(None) }
    }

    pub fn once(bytes: Bytes) -> Self {
        Self { inner: Kind::Once(Some(bytes)) }
    }

    /// A body fed chunk by chunk, ending when every sender is dropped.
    ///
    /// An `Err` item aborts the body, the transport then drops the connection.
    pub fn channel(receiver: mpsc::Receiver<io::Result<Bytes>>) -> Self {
        Self { inner: Kind::Channel(receiver) }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Kind::Once(bytes) => f.debug_tuple("Once").field(bytes).finish(),
            Kind::Channel(_) => f.write_str("Channel"),
        }
    }
}

impl HttpBody for ResponseBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().inner {
            Kind::Once(option_bytes) => Poll::Ready(option_bytes.take().map(|bytes| Ok(Frame::data(bytes)))),
            Kind::Channel(receiver) => {
                receiver.poll_next_unpin(cx).map(|option| option.map(|result| result.map(Frame::data)))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.inner {
            Kind::Once(option_bytes) => option_bytes.is_none(),
            Kind::Channel(_) => false,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.inner {
            Kind::Once(None) => SizeHint::with_exact(0),
            Kind::Once(Some(bytes)) => SizeHint::with_exact(bytes.len() as u64),
            Kind::Channel(_) => SizeHint::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use http_body_util::BodyExt;

    fn check_send<T: Send>() {}

    #[test]
    fn is_send() {
        check_send::<ResponseBody>();
        check_send::<Body>();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_once_body() {
        let mut body = ResponseBody::once(Bytes::from("Hello world"));

        assert_eq!(body.size_hint().exact(), Some(11));
        assert!(!body.is_end_stream());

        let bytes = body.frame().await.unwrap().unwrap().into_data().unwrap();
        assert_eq!(bytes, Bytes::from("Hello world"));

        assert!(body.is_end_stream());
        assert!(body.frame().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_channel_body() {
        let (mut sender, receiver) = mpsc::channel(4);
        let body = ResponseBody::channel(receiver);
        assert!(body.size_hint().exact().is_none());

        sender.send(Ok(Bytes::from_static(b"a"))).await.unwrap();
        sender.send(Ok(Bytes::from_static(b"b"))).await.unwrap();
        drop(sender);

        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected, Bytes::from_static(b"ab"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_channel_body_abort() {
        let (mut sender, receiver) = mpsc::channel(4);
        let body = ResponseBody::channel(receiver);

        sender.send(Ok(Bytes::from_static(b"a"))).await.unwrap();
        sender.send(Err(io::Error::other("destroyed"))).await.unwrap();
        drop(sender);

        assert_eq!(body.collect().await.unwrap_err().to_string(), "destroyed");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_byte_stream_keeps_path() {
        let chunks: Vec<io::Result<Bytes>> = vec![Ok(Bytes::from_static(b"1")), Ok(Bytes::from_static(b"2"))];
        let mut stream = ByteStream::new(futures::stream::iter(chunks)).with_path("/tmp/data.csv");

        assert_eq!(stream.path(), Some("/tmp/data.csv"));
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"1"));
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"2"));
        assert!(stream.next().await.is_none());
    }
}
