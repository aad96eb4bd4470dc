//! Default security headers injected into every response.

use crate::config::{HeaderToggle, ServerConfig};
use crate::error::ConfigError;
use http::{HeaderMap, HeaderName, HeaderValue, header};

pub const HSTS: &str = "max-age=31536000; includeSubDomains; preload";
pub const X_FRAME_OPTIONS: &str = "SAMEORIGIN";
pub const X_XSS_PROTECTION: &str = "1; mode=block";
pub const X_DOWNLOAD_OPTIONS: &str = "noopen";
pub const X_CONTENT_TYPE_OPTIONS: &str = "nosniff";

/// The security header mapping, computed once from the configuration.
#[derive(Debug, Clone, Default)]
pub struct SecurityHeaders {
    head: HeaderMap,
}

impl SecurityHeaders {
    pub fn from_config(config: &ServerConfig) -> Result<Self, ConfigError> {
        let toggles = [
            (header::STRICT_TRANSPORT_SECURITY, &config.hsts, HSTS),
            (header::X_FRAME_OPTIONS, &config.xframe, X_FRAME_OPTIONS),
            (header::X_XSS_PROTECTION, &config.xss, X_XSS_PROTECTION),
            (HeaderName::from_static("x-download-options"), &config.xdownload, X_DOWNLOAD_OPTIONS),
            (header::X_CONTENT_TYPE_OPTIONS, &config.xcontent, X_CONTENT_TYPE_OPTIONS),
        ];

        let mut head = HeaderMap::with_capacity(toggles.len());
        for (name, toggle, default) in toggles {
            if let Some(value) = resolve(&name, toggle, default)? {
                head.insert(name, value);
            }
        }

        Ok(Self { head })
    }

    pub fn head(&self) -> &HeaderMap {
        &self.head
    }
}

fn resolve(name: &HeaderName, toggle: &HeaderToggle, default: &str) -> Result<Option<HeaderValue>, ConfigError> {
    toggle
        .resolve(default)
        .map(|value| {
            HeaderValue::from_str(value)
                .map_err(|_| ConfigError::InvalidHeaderValue { name: name.to_string(), value: value.to_owned() })
        })
        .transpose()
}
