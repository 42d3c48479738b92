//! Response envelope and the parsed body representation

use bytes::Bytes;
use reqwest::{header::HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

/// Parsed response payload, tagged by the requested response type.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Text(String),
    Json(serde_json::Value),
    Buffer(Bytes),
}

impl Body {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Body::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&Bytes> {
        match self {
            Body::Buffer(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Deserialize the payload into a concrete type, whatever variant it
    /// was parsed into.
    pub fn deserialize<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        match self {
            Body::Json(value) => serde_json::from_value(value.clone()),
            Body::Text(text) => serde_json::from_str(text),
            Body::Buffer(bytes) => serde_json::from_slice(bytes),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Phases {
    /// Total elapsed milliseconds from just before the network call to
    /// the full response being received
    pub total: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timings {
    pub phases: Phases,
}

/// Buffered response envelope, constructed once per completed call.
#[derive(Debug, Clone)]
pub struct Response {
    pub body: Body,
    pub headers: HeaderMap,
    pub url: String,
    pub status_code: StatusCode,
    pub timings: Timings,
}

/// What a buffered call resolves to: the full envelope, or just the body
/// when `resolve_body_only` is set.
#[derive(Debug, Clone)]
pub enum Reply {
    Response(Response),
    Body(Body),
}

impl Reply {
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Reply::Response(response) => Some(response.status_code),
            Reply::Body(_) => None,
        }
    }

    pub fn body(&self) -> &Body {
        match self {
            Reply::Response(response) => &response.body,
            Reply::Body(body) => body,
        }
    }

    pub fn into_body(self) -> Body {
        match self {
            Reply::Response(response) => response.body,
            Reply::Body(body) => body,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            Reply::Response(response) => Some(response),
            Reply::Body(_) => None,
        }
    }
}
