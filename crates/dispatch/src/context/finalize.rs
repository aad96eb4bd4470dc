use crate::body::{Body, ByteStream};
use crate::config::ServerConfig;
use crate::error::HandleError;
use crate::sink::ResponseSink;
use crate::tables;
use bytes::Bytes;
use futures::StreamExt;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::json;
use tracing::{trace, warn};

/// The response state handed over to finalization.
#[derive(Debug)]
pub(crate) struct Outgoing {
    pub(crate) code: StatusCode,
    pub(crate) message: String,
    pub(crate) head: HeaderMap,
    pub(crate) body: Option<Body>,
}

/// Serializes the accumulated response state into a sink.
#[derive(Debug, Clone)]
pub struct Finalizer {
    charset: String,
    default_type: String,
}

impl Finalizer {
    pub fn new(charset: impl Into<String>, default_type: impl Into<String>) -> Self {
        Self { charset: charset.into(), default_type: default_type.into() }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.charset.clone(), config.content_type.clone())
    }

    fn content_type(&self, mime: &str) -> Result<HeaderValue, HandleError> {
        let value = if self.charset.is_empty() { mime.to_owned() } else { format!("{mime};{}", self.charset) };
        HeaderValue::from_str(&value).map_err(HandleError::from_source)
    }

    /// Writes head and body, then completes the sink.
    ///
    /// Without a body the response carries `{"code", "message"}` as JSON. Streams are piped
    /// as chunks arrive and carry no content length; every other body is written at once.
    pub(crate) async fn finalize(&self, sink: &mut dyn ResponseSink, outgoing: Outgoing) -> Result<(), HandleError> {
        let Outgoing { code, message, mut head, body } = outgoing;
        let body = body.unwrap_or_else(|| Body::Json(json!({ "code": code.as_u16(), "message": message })));

        let bytes = match body {
            Body::Stream(stream) => {
                let mime = tables::mime_type(tables::extension(stream.path()));
                head.insert(CONTENT_TYPE, self.content_type(mime)?);
                sink.write_head(code, head)?;
                return pipe(stream, sink).await;
            }
            Body::Json(value) => {
                head.insert(CONTENT_TYPE, self.content_type(mime::APPLICATION_JSON.essence_str())?);
                Bytes::from(serde_json::to_vec(&value)?)
            }
            Body::Text(text) => Bytes::from(text),
            Body::Bytes(bytes) => bytes,
        };

        if !head.contains_key(CONTENT_TYPE) {
            head.insert(CONTENT_TYPE, self.content_type(&self.default_type)?);
        }
        if !head.contains_key(CONTENT_LENGTH) {
            head.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));
        }

        trace!(code = code.as_u16(), length = bytes.len(), "write response");
        sink.write_head(code, head)?;
        if !bytes.is_empty() {
            sink.write(bytes).await?;
        }
        sink.end()?;
        Ok(())
    }
}

async fn pipe(mut stream: ByteStream, sink: &mut dyn ResponseSink) -> Result<(), HandleError> {
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => sink.write(chunk).await?,
            Err(e) => {
                warn!(cause = %e, path = ?stream.path(), "response stream failed, destroy response");
                sink.destroy();
                return Err(e.into());
            }
        }
    }
    sink.end()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::context;
    use crate::sink::{MemorySink, Recording};
    use serde_json::Value;
    use std::io;

    fn finalizer() -> Finalizer {
        Finalizer::from_config(&ServerConfig::default())
    }

    fn outgoing(code: StatusCode, body: Option<Body>) -> Outgoing {
        Outgoing { code, message: tables::status_message(code).to_owned(), head: HeaderMap::new(), body }
    }

    async fn finalize(body: Option<Body>) -> Recording {
        let (mut sink, recording) = MemorySink::new();
        finalizer().finalize(&mut sink, outgoing(StatusCode::OK, body)).await.unwrap();
        recording
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_default_body() {
        let recording = finalize(None).await;

        assert_eq!(recording.status(), Some(StatusCode::OK));
        assert_eq!(recording.headers()[CONTENT_TYPE], "application/json;charset=utf-8");
        let body: Value = serde_json::from_slice(&recording.body()).unwrap();
        assert_eq!(body, json!({"code": 200, "message": "OK"}));
        assert!(recording.state().finished);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_json_body() {
        let recording = finalize(Some(Body::Json(json!({"a": 1})))).await;

        assert_eq!(recording.body(), Bytes::from_static(br#"{"a":1}"#));
        assert_eq!(recording.headers()[CONTENT_LENGTH], "7");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_text_body_gets_default_content_type() {
        let recording = finalize(Some(Body::from("hello"))).await;

        assert_eq!(recording.headers()[CONTENT_TYPE], "text/plain;charset=utf-8");
        assert_eq!(recording.headers()[CONTENT_LENGTH], "5");
        assert_eq!(recording.body(), Bytes::from_static(b"hello"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_explicit_content_type_is_kept() {
        let (mut sink, recording) = MemorySink::new();
        let mut response = outgoing(StatusCode::OK, Some(Body::from(vec![1u8, 2, 3])));
        response.head.insert(CONTENT_TYPE, HeaderValue::from_static("image/png"));

        finalizer().finalize(&mut sink, response).await.unwrap();
        assert_eq!(recording.headers()[CONTENT_TYPE], "image/png");
        assert_eq!(recording.body().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_stream_body_infers_type_from_path() {
        let chunks: Vec<io::Result<Bytes>> = vec![Ok(Bytes::from_static(b"<p>")), Ok(Bytes::from_static(b"</p>"))];
        let stream = ByteStream::new(futures::stream::iter(chunks)).with_path("/srv/index.html");
        let recording = finalize(Some(Body::Stream(stream))).await;

        assert_eq!(recording.headers()[CONTENT_TYPE], "text/html;charset=utf-8");
        assert!(!recording.headers().contains_key(CONTENT_LENGTH));
        assert_eq!(recording.body(), Bytes::from_static(b"<p></p>"));
        assert!(recording.state().finished);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_failed_stream_destroys_response() {
        let chunks: Vec<io::Result<Bytes>> = vec![Ok(Bytes::from_static(b"part")), Err(io::Error::other("gone"))];
        let (mut sink, recording) = MemorySink::new();
        let response = outgoing(StatusCode::OK, Some(Body::Stream(ByteStream::new(futures::stream::iter(chunks)))));

        let error = finalizer().finalize(&mut sink, response).await.unwrap_err();
        assert_eq!(error.message(), "gone");
        assert!(recording.state().destroyed);
        assert!(!recording.state().finished);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_end_is_idempotent() {
        let (ctx, recording) = context("GET", "/");
        ctx.set_code(StatusCode::ACCEPTED);

        ctx.end().await.unwrap();
        ctx.end().await.unwrap();

        assert_eq!(recording.head_writes(), 1);
        assert_eq!(recording.status(), Some(StatusCode::ACCEPTED));
        assert_eq!(ctx.message().as_deref(), Some("Accepted"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_end_after_manual_head_only_completes() {
        let (ctx, recording) = context("GET", "/");
        ctx.sink().await.write_head(StatusCode::NO_CONTENT, HeaderMap::new()).unwrap();

        ctx.end().await.unwrap();
        assert_eq!(recording.head_writes(), 1);
        assert_eq!(recording.status(), Some(StatusCode::NO_CONTENT));
        assert!(recording.body().is_empty());
        assert!(recording.state().finished);
    }
}
