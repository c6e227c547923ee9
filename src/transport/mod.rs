//! The boundary between the pipeline and the processing service.
//!
//! The pipeline only ever builds a [`ServiceRequest`] and reads a
//! [`ServiceResponse`]; how the bytes reach the service is the business of a
//! [`Transport`].  [`HttpTransport`] is the production implementation.
//!
//! # Wire contract
//! - `POST /<op>` as `multipart/form-data`: field `file` (or repeated
//!   `files` for merge) holds envelope bytes, field `constraints` holds JSON.
//! - Header `X-Password` carries the shared secret out of band.
//! - Response header `X-Original-Content-Type` names the pre-encryption type
//!   of an envelope body.

mod http;

pub use http::HttpTransport;

use thiserror::Error;

/// Side-channel header carrying the shared secret.
pub const PASSWORD_HEADER: &str = "X-Password";
/// Response header naming the content type to restore after decryption.
pub const ORIGINAL_CONTENT_TYPE_HEADER: &str = "X-Original-Content-Type";

/// Content types the service uses for multi-output results.
pub const ARCHIVE_CONTENT_TYPES: &[&str] = &[
    "application/zip",
    "application/x-zip-compressed",
    "application/x-tar",
    "application/gzip",
    "application/x-7z-compressed",
];

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Request failed: {0}")]
    Request(String),
}

/// One binary part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field:    &'static str,
    pub filename: String,
    pub mime:     String,
    pub bytes:    Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Multipart {
        parts:  Vec<FilePart>,
        fields: Vec<(String, String)>,
    },
    Json(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    /// Path such as `/convert`.
    pub endpoint: String,
    /// Sent as [`PASSWORD_HEADER`]; `None` omits the header.
    pub password: Option<String>,
    pub body:     RequestBody,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceResponse {
    pub status:                u16,
    pub content_type:          Option<String>,
    pub original_content_type: Option<String>,
    pub body:                  Vec<u8>,
}

impl ServiceResponse {
    /// A `200 OK` with the given body and no declared types.
    pub fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body, ..Self::default() }
    }

    pub fn with_content_type(mut self, ct: impl Into<String>) -> Self {
        self.content_type = Some(ct.into());
        self
    }

    pub fn with_original_content_type(mut self, ct: impl Into<String>) -> Self {
        self.original_content_type = Some(ct.into());
        self
    }

    pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }

    /// True when the declared content type is one of [`ARCHIVE_CONTENT_TYPES`].
    pub fn is_archive(&self) -> bool {
        self.content_type
            .as_deref()
            .map(base_mime)
            .is_some_and(|ct| ARCHIVE_CONTENT_TYPES.contains(&ct.as_str()))
    }

    /// The restored content type, if the service declared a non-empty one.
    pub fn restored_type(&self) -> Option<&str> {
        self.original_content_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Sends requests to the processing service.
pub trait Transport: Send + Sync {
    fn send(&self, request: ServiceRequest) -> Result<ServiceResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: ServiceRequest) -> Result<ServiceResponse, TransportError> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, request: ServiceRequest) -> Result<ServiceResponse, TransportError> {
        (**self).send(request)
    }
}

fn base_mime(ct: &str) -> String {
    ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_detection_ignores_parameters_and_case() {
        assert!(ServiceResponse::ok(vec![]).with_content_type("Application/ZIP; name=x").is_archive());
        assert!(!ServiceResponse::ok(vec![]).with_content_type("application/octet-stream").is_archive());
        assert!(!ServiceResponse::ok(vec![]).is_archive());
    }

    #[test]
    fn empty_original_type_is_absent() {
        let r = ServiceResponse::ok(vec![]).with_original_content_type("  ");
        assert_eq!(r.restored_type(), None);
        let r = ServiceResponse::ok(vec![]).with_original_content_type("image/webp");
        assert_eq!(r.restored_type(), Some("image/webp"));
    }

    #[test]
    fn success_range() {
        for (status, ok) in [(200, true), (204, true), (299, true), (302, false), (400, false), (502, false)] {
            let r = ServiceResponse { status, ..ServiceResponse::default() };
            assert_eq!(r.is_success(), ok, "status {status}");
        }
    }
}
