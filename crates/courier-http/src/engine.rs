//! Transport boundary: the engine trait and the production reqwest engine

use std::{future::Future, pin::Pin, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{header::HeaderMap, Method, StatusCode};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Live response byte stream handed back by the streaming path.
pub type ByteStream =
    Pin<Box<dyn Stream<Item = std::result::Result<Bytes, EngineError>> + Send>>;

/// Transport-level failures. Timeouts and cancellations are distinguished
/// from generic failures so the executor can classify them.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("request timed out")]
    Timeout,
    #[error("request was cancelled")]
    Cancelled,
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to build http engine: {0}")]
    Build(String),
    #[error("{0}")]
    Rejected(String),
}

impl EngineError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::Timeout)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}

/// Fully resolved request descriptor consumed by an engine.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub url: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Applied to both the header-wait and body-wait phases
    pub timeout: Option<Duration>,
    /// Zero disables redirect following
    pub max_redirects: usize,
    pub signal: Option<CancellationToken>,
}

/// Raw engine output for the buffered path. Engines never error on HTTP
/// status; status handling belongs to the executor.
#[derive(Debug, Clone)]
pub struct EngineResponse {
    pub status_code: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// The transport collaborator. Production code wraps reqwest; tests
/// inject a mock registry implementing the same trait.
#[async_trait]
pub trait HttpEngine: Send + Sync {
    /// Issue one buffered request.
    async fn request(&self, req: EngineRequest) -> std::result::Result<EngineResponse, EngineError>;

    /// Open a live response byte stream.
    async fn open_stream(&self, req: EngineRequest) -> std::result::Result<ByteStream, EngineError>;
}

fn from_reqwest(err: reqwest::Error) -> EngineError {
    if err.is_timeout() {
        EngineError::Timeout
    } else {
        EngineError::Transport(err)
    }
}

/// Race a transport future against cooperative cancellation.
async fn watched<T, F>(
    signal: Option<&CancellationToken>,
    fut: F,
) -> std::result::Result<T, EngineError>
where
    F: Future<Output = std::result::Result<T, EngineError>>,
{
    match signal {
        Some(token) => tokio::select! {
            _ = token.cancelled() => Err(EngineError::Cancelled),
            out = fut => out,
        },
        None => fut.await,
    }
}

/// Production engine over reqwest.
///
/// Redirect policy is client-level in reqwest, so two clients are built
/// upfront and picked per request.
pub struct ReqwestEngine {
    redirecting: reqwest::Client,
    direct: reqwest::Client,
}

impl ReqwestEngine {
    pub fn new() -> std::result::Result<Self, EngineError> {
        let redirecting = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| EngineError::Build(e.to_string()))?;
        let direct = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| EngineError::Build(e.to_string()))?;

        Ok(Self { redirecting, direct })
    }

    fn prepare(
        &self,
        req: &EngineRequest,
    ) -> std::result::Result<reqwest::RequestBuilder, EngineError> {
        let url = req.url.parse::<url::Url>()?;
        let client = if req.max_redirects > 0 {
            &self.redirecting
        } else {
            &self.direct
        };

        let mut builder = client
            .request(req.method.clone(), url)
            .headers(req.headers.clone());

        if let Some(timeout) = req.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = &req.body {
            builder = builder.body(body.clone());
        }

        Ok(builder)
    }
}

#[async_trait]
impl HttpEngine for ReqwestEngine {
    async fn request(
        &self,
        req: EngineRequest,
    ) -> std::result::Result<EngineResponse, EngineError> {
        let builder = self.prepare(&req)?;

        watched(req.signal.as_ref(), async move {
            let response = builder.send().await.map_err(from_reqwest)?;
            let status_code = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(from_reqwest)?;

            Ok(EngineResponse {
                status_code,
                headers,
                body,
            })
        })
        .await
    }

    async fn open_stream(
        &self,
        req: EngineRequest,
    ) -> std::result::Result<ByteStream, EngineError> {
        let timeout = req.timeout;
        let builder = self.prepare(&req)?;

        let response = watched(req.signal.as_ref(), async move {
            builder.send().await.map_err(from_reqwest)
        })
        .await?;

        let stream = response.bytes_stream().map(|chunk| chunk.map_err(from_reqwest));

        // Body-wait timeout applies per chunk read.
        match timeout {
            Some(timeout) => {
                let stream =
                    tokio_stream::StreamExt::timeout(stream, timeout).map(|item| match item {
                        Ok(chunk) => chunk,
                        Err(_) => Err(EngineError::Timeout),
                    });
                Ok(Box::pin(stream))
            }
            None => Ok(Box::pin(stream)),
        }
    }
}
