//! Server configuration.
//!
//! [`ServerConfig`] can be built in code (every field has a default) or loaded from TOML:
//!
//! ```toml
//! port = 8443
//! host = "api.example.com"
//! version = 2
//! debug = false
//! xframe = "DENY"
//! hsts = false
//!
//! [secure]
//! cert = "/etc/tls/cert.pem"
//! key = "/etc/tls/key.pem"
//! ```

use crate::error::ConfigError;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Enables a default security header, replaces its value, or turns it off.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum HeaderToggle {
    Enabled(bool),
    Value(String),
}

impl Default for HeaderToggle {
    fn default() -> Self {
        HeaderToggle::Enabled(true)
    }
}

impl HeaderToggle {
    /// The header value this toggle yields, given the built-in default.
    pub fn resolve<'a>(&'a self, default: &'a str) -> Option<&'a str> {
        match self {
            HeaderToggle::Enabled(true) => Some(default),
            HeaderToggle::Enabled(false) => None,
            HeaderToggle::Value(value) if value.is_empty() => None,
            HeaderToggle::Value(value) => Some(value),
        }
    }
}

impl From<bool> for HeaderToggle {
    fn from(value: bool) -> Self {
        HeaderToggle::Enabled(value)
    }
}

impl From<&str> for HeaderToggle {
    fn from(value: &str) -> Self {
        HeaderToggle::Value(value.to_owned())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum HttpVersion {
    /// HTTP/1.1 only.
    #[default]
    Http1,
    /// HTTP/2, still accepting HTTP/1.1 connections.
    Http2,
}

impl TryFrom<u8> for HttpVersion {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(HttpVersion::Http1),
            2 => Ok(HttpVersion::Http2),
            other => Err(ConfigError::InvalidVersion(other)),
        }
    }
}

/// Certificate chain and private key, both PEM files.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// `secure = true` uses the `[tls]` table, an inline table configures TLS directly.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Secure {
    Enabled(bool),
    Tls(TlsConfig),
}

impl Default for Secure {
    fn default() -> Self {
        Secure::Enabled(false)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 0 binds an ephemeral port.
    pub port: u16,
    /// Virtual host name of this server.
    pub host: Option<String>,
    /// Bind address, falls back to `host`, then to `0.0.0.0`.
    pub address: Option<String>,
    pub version: HttpVersion,
    pub secure: Secure,
    pub tls: Option<TlsConfig>,
    /// Leaks fault messages into error responses.
    pub debug: bool,
    /// Finalizes responses no handle has ended.
    pub end: bool,
    pub charset: String,
    pub content_type: String,
    pub xss: HeaderToggle,
    pub xframe: HeaderToggle,
    pub hsts: HeaderToggle,
    pub xdownload: HeaderToggle,
    pub xcontent: HeaderToggle,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            host: None,
            address: None,
            version: HttpVersion::default(),
            secure: Secure::default(),
            tls: None,
            debug: false,
            end: true,
            charset: "charset=utf-8".to_owned(),
            content_type: mime::TEXT_PLAIN.essence_str().to_owned(),
            xss: HeaderToggle::default(),
            xframe: HeaderToggle::default(),
            hsts: HeaderToggle::default(),
            xdownload: HeaderToggle::default(),
            xcontent: HeaderToggle::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// The configured host name, else the machine's host name, else `localhost`.
    pub fn host(&self) -> String {
        self.host.clone().unwrap_or_else(|| machine_host(gethostname::gethostname()))
    }

    pub fn bind_address(&self) -> &str {
        self.address.as_deref().or(self.host.as_deref()).unwrap_or("0.0.0.0")
    }

    pub fn is_secure(&self) -> bool {
        !matches!(self.secure, Secure::Enabled(false))
    }

    /// Resolves the TLS material to use, `None` for plain text.
    pub fn tls_config(&self) -> Result<Option<&TlsConfig>, ConfigError> {
        match &self.secure {
            Secure::Enabled(false) => Ok(None),
            Secure::Enabled(true) => {
                self.tls.as_ref().map(Some).ok_or_else(|| ConfigError::tls("secure is enabled but no [tls] is given"))
            }
            Secure::Tls(tls) => Ok(Some(tls)),
        }
    }
}

fn machine_host(name: OsString) -> String {
    name.into_string().ok().filter(|name| !name.is_empty()).unwrap_or_else(|| "localhost".to_owned())
}
