//! Static lookup tables: MIME types by file extension, status texts, and the
//! HTTP method tokens recognized in selector blobs.

use http::StatusCode;

/// Lowercase HTTP method tokens understood by the selector parser.
pub const METHODS: &[&str] = &[
    "acl",
    "bind",
    "checkout",
    "connect",
    "copy",
    "delete",
    "get",
    "head",
    "link",
    "lock",
    "m-search",
    "merge",
    "mkactivity",
    "mkcalendar",
    "mkcol",
    "move",
    "notify",
    "options",
    "patch",
    "post",
    "propfind",
    "proppatch",
    "purge",
    "put",
    "rebind",
    "report",
    "search",
    "source",
    "subscribe",
    "trace",
    "unbind",
    "unlink",
    "unlock",
    "unsubscribe",
];

#[inline]
pub fn is_method(token: &str) -> bool {
    METHODS.contains(&token)
}

/// Get the MIME type for a file extension, without any charset parameter.
///
/// # Examples
/// ```
/// use micro_dispatch::tables::mime_type;
/// assert_eq!(mime_type("html"), "text/html");
/// assert_eq!(mime_type("json"), "application/json");
/// assert_eq!(mime_type("xyz"), "application/octet-stream");
/// ```
pub fn mime_type(extension: &str) -> &'static str {
    match extension {
        // Text
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "txt" | "text" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "xml" => "application/xml",

        // JavaScript/WASM
        "js" | "mjs" => "application/javascript",
        "json" | "map" => "application/json",
        "wasm" => "application/wasm",

        // Images
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "webp" => "image/webp",

        // Video
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "ogg" | "ogv" => "video/ogg",
        "mov" => "video/quicktime",

        // Audio
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",

        // Fonts
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",

        // Documents
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" | "gzip" => "application/gzip",
        "tar" => "application/x-tar",

        _ => "application/octet-stream",
    }
}

/// The extension of a path-like string: whatever follows the last `.`, or `txt`.
pub fn extension(path: Option<&str>) -> &str {
    match path.and_then(|path| path.rsplit_once('.')) {
        Some((_, extension)) => extension,
        None => "txt",
    }
}

/// Human readable text for a status code.
pub fn status_message(code: StatusCode) -> &'static str {
    code.canonical_reason().unwrap_or("Unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_types() {
        assert_eq!(mime_type("html"), "text/html");
        assert_eq!(mime_type("css"), "text/css");
        assert_eq!(mime_type("js"), "application/javascript");
        assert_eq!(mime_type("png"), "image/png");
        assert_eq!(mime_type("txt"), "text/plain");
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension(Some("/var/www/index.html")), "html");
        assert_eq!(extension(Some("archive.tar.gz")), "gz");
        assert_eq!(extension(Some("README")), "txt");
        assert_eq!(extension(None), "txt");
    }

    #[test]
    fn test_status_message() {
        assert_eq!(status_message(StatusCode::OK), "OK");
        assert_eq!(status_message(StatusCode::NOT_FOUND), "Not Found");
        assert_eq!(status_message(StatusCode::from_u16(599).unwrap()), "Unknown");
    }

    #[test]
    fn test_methods() {
        assert!(is_method("get"));
        assert!(is_method("m-search"));
        assert!(!is_method("GET"));
        assert!(!is_method("api.example.com"));
    }
}
