//! Request error type and the stable error-code taxonomy

use std::fmt;

use bytes::Bytes;
use reqwest::{header::HeaderMap, StatusCode};
use thiserror::Error;

use crate::{engine::EngineError, options::FormedOptions};

/// Result type for facade operations
pub type Result<T> = std::result::Result<T, RequestError>;

/// Stable machine-readable failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Header-wait or body-wait exceeded the request timeout
    Timedout,
    /// Body failed to parse as the declared response type
    BodyParseFailure,
    /// Status outside [200, 400) with `throw_http_errors` enabled
    HttpError,
    /// Any other transport-level failure
    RequestError,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Timedout => "ETIMEDOUT",
            ErrorCode::BodyParseFailure => "ERR_BODY_PARSE_FAILURE",
            ErrorCode::HttpError => "ERR_HTTP_ERROR",
            ErrorCode::RequestError => "ERR_REQUEST_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unparsed engine output attached to errors for diagnostics. After a
/// JSON parse failure the raw text is recoverable via [`RawResponse::text`].
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status_code: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The single error type for all failing request paths.
///
/// Constructed exactly once per failure, handed to the `before_error`
/// hook (which observes but cannot suppress it), then returned.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RequestError {
    pub code: ErrorCode,
    message: String,
    /// The options that triggered the failure
    pub options: Box<FormedOptions>,
    /// Raw response, when the failure happened after one was received
    pub response: Option<RawResponse>,
    #[source]
    source: Option<EngineError>,
}

impl RequestError {
    pub(crate) fn new(
        message: impl Into<String>,
        code: ErrorCode,
        options: &FormedOptions,
        response: Option<RawResponse>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            options: Box::new(options.clone()),
            response,
            source: None,
        }
    }

    pub(crate) fn with_source(mut self, source: EngineError) -> Self {
        self.source = Some(source);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the failure was caused by cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.source, Some(EngineError::Cancelled))
    }
}
