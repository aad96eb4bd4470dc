use http::StatusCode;
use std::error::Error;
use std::io;
use thiserror::Error;

/// Raised synchronously while registering handles.
#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("invalid handle: {reason}")]
    InvalidHandle { reason: String },

    #[error("registry is frozen, the server has already been opened")]
    Frozen,
}

impl RegistrationError {
    pub fn invalid_handle<S: ToString>(str: S) -> Self {
        Self::InvalidHandle { reason: str.to_string() }
    }
}

/// Errors reported by a [`ResponseSink`](crate::sink::ResponseSink).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    #[error("response head has already been written")]
    HeadersSent,

    #[error("response sink has been closed")]
    Closed,
}

/// A fault raised by a handle during dispatch.
///
/// The optional numeric `code` is the status the handle intends the response to carry.
/// A code other than 500 marks the error as an intentional short-circuit (a handle
/// answering 404, for instance), which is not logged as a fault.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct HandleError {
    code: Option<u16>,
    message: String,
    #[source]
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl HandleError {
    pub fn new<S: ToString>(message: S) -> Self {
        Self { code: None, message: message.to_string(), source: None }
    }

    pub fn with_code<S: ToString>(code: u16, message: S) -> Self {
        Self { code: Some(code), message: message.to_string(), source: None }
    }

    pub fn not_found<S: ToString>(message: S) -> Self {
        Self::with_code(StatusCode::NOT_FOUND.as_u16(), message)
    }

    pub fn bad_request<S: ToString>(message: S) -> Self {
        Self::with_code(StatusCode::BAD_REQUEST.as_u16(), message)
    }

    pub fn from_source<E: Into<Box<dyn Error + Send + Sync>>>(source: E) -> Self {
        let source = source.into();
        Self { code: None, message: source.to_string(), source: Some(source) }
    }

    pub fn code(&self) -> Option<u16> {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The status this error maps to: its own code when it is a valid status, otherwise 500.
    pub fn status(&self) -> StatusCode {
        self.code.and_then(|code| StatusCode::from_u16(code).ok()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// True when the error carries an explicit code other than 500.
    pub fn is_intentional(&self) -> bool {
        self.code.is_some_and(|code| code != StatusCode::INTERNAL_SERVER_ERROR.as_u16())
    }
}

impl From<io::Error> for HandleError {
    fn from(e: io::Error) -> Self {
        Self::from_source(e)
    }
}

impl From<serde_json::Error> for HandleError {
    fn from(e: serde_json::Error) -> Self {
        Self::from_source(e)
    }
}

impl From<SinkError> for HandleError {
    fn from(e: SinkError) -> Self {
        Self::from_source(e)
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("can't read config file: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("invalid config: {source}")]
    Toml {
        #[from]
        source: toml::de::Error,
    },

    #[error("invalid value for header {name}: {value:?}")]
    InvalidHeaderValue { name: String, value: String },

    #[error("unsupported http version: {0}")]
    InvalidVersion(u8),

    #[error("invalid tls config: {reason}")]
    Tls { reason: String },
}

impl ConfigError {
    pub fn tls<S: ToString>(str: S) -> Self {
        Self::Tls { reason: str.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("can't bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("config error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("tls setup failed: {source}")]
    Tls {
        #[from]
        source: tokio_rustls::rustls::Error,
    },

    #[error("server is already open")]
    AlreadyOpen,

    #[error("server is not open")]
    NotOpen,
}
