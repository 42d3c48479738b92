//! Layered HTTP request facade
//!
//! Provides a configurable client that resolves layered request options,
//! runs a middleware chain around a single network call, and classifies
//! failures into a small set of stable error codes.
//!
//! ## Features
//!
//! - **Layered configuration**: per-call options over client base options
//!   over hard defaults, field by field
//! - **Extension algebra**: `Client::extend` derives new clients without
//!   mutating the receiver
//! - **Onion middleware**: ordered handlers wrapping the network call with
//!   access to the resolved options and a continuation
//! - **Lifecycle hooks**: `before_request`, `after_response`, `before_error`
//! - **Typed failures**: one error type discriminated by a stable code
//! - **Pluggable transport**: `HttpEngine` trait, backed by reqwest in
//!   production and by a mock registry in tests

pub mod client;
pub mod engine;
pub mod error;
pub mod executor;
pub mod middleware;
pub mod options;
pub mod response;

pub use client::Client;
pub use engine::{ByteStream, EngineError, EngineRequest, EngineResponse, HttpEngine, ReqwestEngine};
pub use error::{ErrorCode, RawResponse, RequestError, Result};
pub use middleware::{Handler, HandlerFuture, Next};
pub use options::{
    form, merge_headers, FormedOptions, Hooks, RequestOptions, ResponseType, RetryOptions,
    TimeoutOptions,
};
pub use response::{Body, Phases, Reply, Response, Timings};

/// Re-export commonly used types
pub use reqwest::{header, Method, StatusCode};
pub use tokio_util::sync::CancellationToken;
