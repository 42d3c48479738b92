//! Executor: one network interaction per invocation, plus outcome shaping

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use reqwest::{
    header::{HeaderValue, CONTENT_TYPE},
    Method, StatusCode,
};
use tracing::{debug, warn};

use crate::{
    engine::{ByteStream, EngineError, EngineRequest, EngineResponse, HttpEngine},
    error::{ErrorCode, RawResponse, RequestError, Result},
    options::{FormedOptions, Hooks, ResponseType},
    response::{Body, Phases, Response, Timings},
};

const MAX_REDIRECTS: usize = 10;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);
const RETRY_DEFAULT_CAP: Duration = Duration::from_secs(10);

/// Terminal stage of the handler chain. Holds the engine and the hooks
/// resolved for this call; owns no state across calls.
pub(crate) struct Executor {
    engine: Arc<dyn HttpEngine>,
    hooks: Hooks,
}

impl Executor {
    pub(crate) fn new(engine: Arc<dyn HttpEngine>, hooks: Hooks) -> Self {
        Self { engine, hooks }
    }

    /// Buffered mode: one engine request (retried per the resolved retry
    /// policy), body parsing, timing capture, HTTP-error promotion, hook
    /// invocation.
    pub(crate) async fn execute(&self, mut options: FormedOptions) -> Result<Response> {
        if let Some(hook) = &self.hooks.before_request {
            hook(&mut options);
        }

        let request = self.descriptor(&options)?;
        debug!("HTTP {} {}", request.method, request.url);

        let retry = options.retry;
        let mut attempt: u32 = 0;

        loop {
            match self.attempt(request.clone(), &options).await {
                Ok(mut response) => {
                    if let Some(hook) = &self.hooks.after_response {
                        hook(&mut response, &options);
                    }
                    return Ok(response);
                }
                Err(err) => {
                    if attempt < retry.limit && is_retryable(&err) {
                        attempt += 1;
                        let delay = backoff_delay(attempt, retry.backoff_limit);
                        warn!(
                            "request failed (attempt {attempt}/{}), retrying in {delay:?}: {err}",
                            retry.limit
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(self.finish_error(err));
                }
            }
        }
    }

    /// Streaming mode: open the stream and hand it back live. No
    /// buffering, no parsing, no response hooks, no status promotion, no
    /// retry.
    pub(crate) async fn execute_stream(&self, mut options: FormedOptions) -> Result<ByteStream> {
        if let Some(hook) = &self.hooks.before_request {
            hook(&mut options);
        }

        let mut request = self.descriptor(&options)?;
        if request.method == Method::GET {
            // nothing to send; end the request body immediately
            request.body = None;
        }
        debug!("HTTP {} {} (stream)", request.method, request.url);

        self.engine
            .open_stream(request)
            .await
            .map_err(|err| self.finish_error(engine_failure(err, &options)))
    }

    async fn attempt(&self, request: EngineRequest, options: &FormedOptions) -> Result<Response> {
        let start = Instant::now();
        let engine_response = self
            .engine
            .request(request)
            .await
            .map_err(|err| engine_failure(err, options))?;
        let total = start.elapsed().as_secs_f64() * 1000.0;

        let raw = RawResponse {
            status_code: engine_response.status_code,
            headers: engine_response.headers.clone(),
            body: engine_response.body.clone(),
        };
        let body = parse_body(&engine_response, options, &raw)?;

        let response = Response {
            body,
            headers: engine_response.headers,
            url: options.url.clone().unwrap_or_default(),
            status_code: engine_response.status_code,
            timings: Timings {
                phases: Phases { total },
            },
        };

        if options.throw_http_errors && !accepted_status(response.status_code) {
            return Err(RequestError::new(
                format!("Response code {}", response.status_code.as_u16()),
                ErrorCode::HttpError,
                options,
                Some(raw),
            ));
        }

        Ok(response)
    }

    /// Build the engine request descriptor from resolved options.
    fn descriptor(&self, options: &FormedOptions) -> Result<EngineRequest> {
        let mut headers = options.headers.clone();

        let body = match &options.json {
            Some(value) => {
                // json wins over an explicitly supplied body
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                let serialized = serde_json::to_vec(value).map_err(|err| {
                    RequestError::new(err.to_string(), ErrorCode::RequestError, options, None)
                })?;
                Some(Bytes::from(serialized))
            }
            None => options.body.clone(),
        };

        Ok(EngineRequest {
            url: effective_url(options),
            method: options.method.clone(),
            headers,
            body,
            timeout: options.timeout.request,
            max_redirects: if options.follow_redirect {
                MAX_REDIRECTS
            } else {
                0
            },
            signal: options.signal.clone(),
        })
    }

    /// Every failing path funnels through here so `before_error` observes
    /// the fully-constructed error exactly once, right before it is
    /// returned. The hook cannot suppress the error.
    fn finish_error(&self, err: RequestError) -> RequestError {
        warn!("request failed: {err} ({})", err.code);
        if let Some(hook) = &self.hooks.before_error {
            hook(&err);
        }
        err
    }
}

/// `prefix_url + "/" + url` with exactly one separator slash at the seam;
/// no other slash normalization is performed.
fn effective_url(options: &FormedOptions) -> String {
    let url = options.url.as_deref().unwrap_or_default();
    match options.prefix_url.as_deref() {
        Some(prefix) => {
            let prefix = prefix.strip_suffix('/').unwrap_or(prefix);
            let url = url.strip_prefix('/').unwrap_or(url);
            format!("{prefix}/{url}")
        }
        None => url.to_string(),
    }
}

fn accepted_status(status: StatusCode) -> bool {
    let code = status.as_u16();
    (200..400).contains(&code)
}

fn parse_body(
    engine_response: &EngineResponse,
    options: &FormedOptions,
    raw: &RawResponse,
) -> Result<Body> {
    match options.response_type {
        ResponseType::Text => Ok(Body::Text(
            String::from_utf8_lossy(&engine_response.body).into_owned(),
        )),
        ResponseType::Buffer => Ok(Body::Buffer(engine_response.body.clone())),
        ResponseType::Json => serde_json::from_slice(&engine_response.body)
            .map(Body::Json)
            .map_err(|err| {
                RequestError::new(
                    err.to_string(),
                    ErrorCode::BodyParseFailure,
                    options,
                    Some(raw.clone()),
                )
            }),
    }
}

fn engine_failure(err: EngineError, options: &FormedOptions) -> RequestError {
    let (message, code) = if err.is_timeout() {
        (err.to_string(), ErrorCode::Timedout)
    } else {
        ("Request error".to_string(), ErrorCode::RequestError)
    };
    RequestError::new(message, code, options, None).with_source(err)
}

fn is_retryable(err: &RequestError) -> bool {
    match err.code {
        ErrorCode::Timedout => true,
        ErrorCode::RequestError => !err.is_cancelled(),
        ErrorCode::HttpError => err.response.as_ref().is_some_and(|raw| {
            raw.status_code == StatusCode::TOO_MANY_REQUESTS || raw.status_code.is_server_error()
        }),
        ErrorCode::BodyParseFailure => false,
    }
}

/// Deterministic exponential backoff: `100ms * 2^(attempt-1)`, capped.
fn backoff_delay(attempt: u32, cap: Option<Duration>) -> Duration {
    let cap = cap.unwrap_or(RETRY_DEFAULT_CAP);
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = RETRY_BASE_DELAY.saturating_mul(1 << exponent);
    delay.min(cap)
}
