//! Request options and the configuration resolver

use std::{fmt, sync::Arc, time::Duration};

use bytes::Bytes;
use reqwest::{
    header::{HeaderMap, HeaderValue, IntoHeaderName},
    Method,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    error::RequestError,
    middleware::{Handler, HandlerFuture, Next},
    response::Response,
};

/// How the response body is parsed in buffered mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    #[default]
    Text,
    Json,
    Buffer,
}

/// Per-request timeout budget. `request` covers both the header-wait and
/// body-wait phases; absent means no timeout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutOptions {
    #[serde(default)]
    pub request: Option<Duration>,
}

/// Retry policy for buffered requests.
///
/// `limit` is the number of additional attempts after the first call;
/// the default of zero keeps the surface inert. The delay before attempt
/// `n` is `100ms * 2^(n-1)`, capped at `backoff_limit` (10s when unset).
/// No jitter is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryOptions {
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub backoff_limit: Option<Duration>,
}

pub type BeforeRequestHook = Arc<dyn Fn(&mut FormedOptions) + Send + Sync>;
pub type AfterResponseHook = Arc<dyn Fn(&mut Response, &FormedOptions) + Send + Sync>;
pub type BeforeErrorHook = Arc<dyn Fn(&RequestError) + Send + Sync>;

/// Single-slot lifecycle callbacks. At most one function per slot per
/// client; a per-call slot replaces the base slot wholesale.
#[derive(Clone, Default)]
pub struct Hooks {
    pub before_request: Option<BeforeRequestHook>,
    pub after_response: Option<AfterResponseHook>,
    pub before_error: Option<BeforeErrorHook>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("before_request", &self.before_request.is_some())
            .field("after_response", &self.after_response.is_some())
            .field("before_error", &self.before_error.is_some())
            .finish()
    }
}

/// Caller-supplied request options. Every field is optional; missing
/// fields fall back to the client's base options and then to the hard
/// defaults when the request is formed.
#[derive(Clone, Default)]
pub struct RequestOptions {
    pub url: Option<String>,
    pub headers: Option<HeaderMap>,
    pub prefix_url: Option<String>,
    pub timeout: Option<TimeoutOptions>,
    pub method: Option<Method>,
    pub json: Option<serde_json::Value>,
    pub body: Option<Bytes>,
    pub response_type: Option<ResponseType>,
    /// Ordered middleware. Only honored at client construction and
    /// `extend` time; the resolver ignores per-call handlers.
    pub handlers: Vec<Handler>,
    pub hooks: Hooks,
    pub throw_http_errors: Option<bool>,
    pub signal: Option<CancellationToken>,
    pub follow_redirect: Option<bool>,
    pub is_stream: Option<bool>,
    pub resolve_body_only: Option<bool>,
    pub retry: Option<RetryOptions>,
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("url", &self.url)
            .field("prefix_url", &self.prefix_url)
            .field("method", &self.method)
            .field("response_type", &self.response_type)
            .field("handlers", &self.handlers.len())
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix_url(mut self, prefix_url: impl Into<String>) -> Self {
        self.prefix_url = Some(prefix_url.into());
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Add a single request header. Values that are not valid header
    /// values are dropped with a warning.
    pub fn with_header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: IntoHeaderName,
        V: TryInto<HeaderValue>,
    {
        match value.try_into() {
            Ok(value) => {
                self.headers
                    .get_or_insert_with(HeaderMap::new)
                    .insert(name, value);
            }
            Err(_) => warn!("dropping header with invalid value"),
        }
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Set the request timeout, covering header-wait and body-wait.
    pub fn with_timeout(mut self, request: Duration) -> Self {
        self.timeout = Some(TimeoutOptions {
            request: Some(request),
        });
        self
    }

    /// JSON request body. Takes precedence over `body` and defaults the
    /// `content-type` header to `application/json` when unset.
    pub fn with_json(mut self, json: serde_json::Value) -> Self {
        self.json = Some(json);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }

    pub fn with_throw_http_errors(mut self, throw_http_errors: bool) -> Self {
        self.throw_http_errors = Some(throw_http_errors);
        self
    }

    pub fn with_follow_redirect(mut self, follow_redirect: bool) -> Self {
        self.follow_redirect = Some(follow_redirect);
        self
    }

    pub fn with_resolve_body_only(mut self, resolve_body_only: bool) -> Self {
        self.resolve_body_only = Some(resolve_body_only);
        self
    }

    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Append a middleware handler. Handlers registered earlier stay
    /// outermost in the onion.
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(FormedOptions, Next) -> HandlerFuture + Send + Sync + 'static,
    {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn with_before_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut FormedOptions) + Send + Sync + 'static,
    {
        self.hooks.before_request = Some(Arc::new(hook));
        self
    }

    pub fn with_after_response<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Response, &FormedOptions) + Send + Sync + 'static,
    {
        self.hooks.after_response = Some(Arc::new(hook));
        self
    }

    pub fn with_before_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RequestError) + Send + Sync + 'static,
    {
        self.hooks.before_error = Some(Arc::new(hook));
        self
    }
}

/// Fully resolved, execution-ready options. Carries no handlers or hooks
/// so it stays printable and cloneable; those are resolved separately.
#[derive(Debug, Clone)]
pub struct FormedOptions {
    pub url: Option<String>,
    pub prefix_url: Option<String>,
    pub method: Method,
    pub headers: HeaderMap,
    pub timeout: TimeoutOptions,
    pub json: Option<serde_json::Value>,
    pub body: Option<Bytes>,
    pub response_type: ResponseType,
    pub throw_http_errors: bool,
    pub follow_redirect: bool,
    pub is_stream: bool,
    pub resolve_body_only: bool,
    pub retry: RetryOptions,
    pub signal: Option<CancellationToken>,
}

/// Shallow header merge: `base` first, `overlay` on top, overlay wins on
/// key conflict. An absent side is treated as empty.
pub fn merge_headers(base: Option<&HeaderMap>, overlay: Option<&HeaderMap>) -> HeaderMap {
    let mut merged = base.cloned().unwrap_or_default();
    if let Some(overlay) = overlay {
        for (name, value) in overlay {
            merged.insert(name, value.clone());
        }
    }
    merged
}

/// Resolve each hook slot independently, per-call slot winning.
pub(crate) fn resolve_hooks(base: &Hooks, call: &Hooks) -> Hooks {
    Hooks {
        before_request: call
            .before_request
            .clone()
            .or_else(|| base.before_request.clone()),
        after_response: call
            .after_response
            .clone()
            .or_else(|| base.after_response.clone()),
        before_error: call
            .before_error
            .clone()
            .or_else(|| base.before_error.clone()),
    }
}

/// Produce a [`FormedOptions`] from the client's base options and the
/// per-call options. Precedence per field, independently: per-call >
/// base > hard default. An explicit `false` from the caller wins over a
/// base `true`. Neither input is mutated.
pub fn form(base: &RequestOptions, call: RequestOptions) -> FormedOptions {
    FormedOptions {
        headers: merge_headers(base.headers.as_ref(), call.headers.as_ref()),
        url: call.url.or_else(|| base.url.clone()),
        prefix_url: call.prefix_url.or_else(|| base.prefix_url.clone()),
        method: call
            .method
            .or_else(|| base.method.clone())
            .unwrap_or(Method::GET),
        timeout: call.timeout.or(base.timeout).unwrap_or_default(),
        json: call.json.or_else(|| base.json.clone()),
        body: call.body.or_else(|| base.body.clone()),
        response_type: call
            .response_type
            .or(base.response_type)
            .unwrap_or_default(),
        throw_http_errors: call
            .throw_http_errors
            .or(base.throw_http_errors)
            .unwrap_or(true),
        follow_redirect: call
            .follow_redirect
            .or(base.follow_redirect)
            .unwrap_or(true),
        is_stream: call.is_stream.or(base.is_stream).unwrap_or(false),
        resolve_body_only: call
            .resolve_body_only
            .or(base.resolve_body_only)
            .unwrap_or(false),
        retry: call.retry.or(base.retry).unwrap_or_default(),
        signal: call.signal.or_else(|| base.signal.clone()),
    }
}
