//! Client: configuration holder, verb methods, and the extension algebra

use std::sync::Arc;

use reqwest::Method;

use crate::{
    engine::{ByteStream, HttpEngine, ReqwestEngine},
    error::{ErrorCode, RequestError, Result},
    executor::Executor,
    middleware::run_chain,
    options::{self, RequestOptions},
    response::Reply,
};

/// Immutable-by-convention holder of base configuration. Cheap to clone;
/// clones share the engine. Concurrent calls on one client share no
/// mutable state: base options are read-only at call time and each call
/// resolves a fresh options value.
#[derive(Clone)]
pub struct Client {
    base_options: RequestOptions,
    engine: Arc<dyn HttpEngine>,
}

impl Client {
    /// Client over the production reqwest engine with hard defaults only.
    pub fn new() -> Result<Self> {
        Self::with_options(RequestOptions::default())
    }

    /// Client over the production reqwest engine with the given base
    /// options.
    pub fn with_options(base_options: RequestOptions) -> Result<Self> {
        let engine = ReqwestEngine::new().map_err(|err| {
            let formed = options::form(&base_options, RequestOptions::default());
            RequestError::new(err.to_string(), ErrorCode::RequestError, &formed, None)
                .with_source(err)
        })?;
        Ok(Self::with_engine(base_options, Arc::new(engine)))
    }

    /// Client over an injected engine (production alternative, or a mock
    /// registry in tests).
    pub fn with_engine(base_options: RequestOptions, engine: Arc<dyn HttpEngine>) -> Self {
        Self {
            base_options,
            engine,
        }
    }

    pub fn base_options(&self) -> &RequestOptions {
        &self.base_options
    }

    /// Derive a new client by merging a configuration delta over this
    /// one. Never mutates the receiver. Headers merge with the delta
    /// winning on conflict; handlers concatenate (receiver's first, so
    /// earlier-registered handlers stay outermost); hook slots and all
    /// other fields take the delta's value where set. Extension is a left
    /// fold: `a.extend(b).extend(c)` equals merging the deltas in order.
    pub fn extend(&self, delta: RequestOptions) -> Client {
        let base = &self.base_options;

        let headers = match (base.headers.as_ref(), delta.headers.as_ref()) {
            (None, None) => None,
            (base_headers, delta_headers) => {
                Some(options::merge_headers(base_headers, delta_headers))
            }
        };

        let mut handlers = base.handlers.clone();
        handlers.extend(delta.handlers);

        let merged = RequestOptions {
            url: delta.url.or_else(|| base.url.clone()),
            headers,
            prefix_url: delta.prefix_url.or_else(|| base.prefix_url.clone()),
            timeout: delta.timeout.or(base.timeout),
            method: delta.method.or_else(|| base.method.clone()),
            json: delta.json.or_else(|| base.json.clone()),
            body: delta.body.or_else(|| base.body.clone()),
            response_type: delta.response_type.or(base.response_type),
            handlers,
            hooks: options::resolve_hooks(&base.hooks, &delta.hooks),
            throw_http_errors: delta.throw_http_errors.or(base.throw_http_errors),
            signal: delta.signal.or_else(|| base.signal.clone()),
            follow_redirect: delta.follow_redirect.or(base.follow_redirect),
            is_stream: delta.is_stream.or(base.is_stream),
            resolve_body_only: delta.resolve_body_only.or(base.resolve_body_only),
            retry: delta.retry.or(base.retry),
        };

        Client {
            base_options: merged,
            engine: self.engine.clone(),
        }
    }

    /// Shared entry point: resolve options, run the handler chain (when
    /// any handlers are registered) rooted at the executor, and shape the
    /// reply.
    pub async fn handle(&self, call: RequestOptions) -> Result<Reply> {
        let hooks = options::resolve_hooks(&self.base_options.hooks, &call.hooks);
        let formed = options::form(&self.base_options, call);
        let resolve_body_only = formed.resolve_body_only;

        let executor = Arc::new(Executor::new(self.engine.clone(), hooks));
        let response = if self.base_options.handlers.is_empty() {
            executor.execute(formed).await?
        } else {
            run_chain(self.base_options.handlers.clone(), executor, formed).await?
        };

        Ok(if resolve_body_only {
            Reply::Body(response.body)
        } else {
            Reply::Response(response)
        })
    }

    pub async fn request(
        &self,
        method: Method,
        url: impl Into<String>,
        call: RequestOptions,
    ) -> Result<Reply> {
        let call = RequestOptions {
            url: Some(url.into()),
            method: Some(method),
            ..call
        };
        self.handle(call).await
    }

    pub async fn get(&self, url: impl Into<String>, call: RequestOptions) -> Result<Reply> {
        self.request(Method::GET, url, call).await
    }

    pub async fn post(&self, url: impl Into<String>, call: RequestOptions) -> Result<Reply> {
        self.request(Method::POST, url, call).await
    }

    pub async fn put(&self, url: impl Into<String>, call: RequestOptions) -> Result<Reply> {
        self.request(Method::PUT, url, call).await
    }

    pub async fn patch(&self, url: impl Into<String>, call: RequestOptions) -> Result<Reply> {
        self.request(Method::PATCH, url, call).await
    }

    pub async fn delete(&self, url: impl Into<String>, call: RequestOptions) -> Result<Reply> {
        self.request(Method::DELETE, url, call).await
    }

    /// Open a live byte stream. Resolved options go straight to the
    /// executor's streaming path; handlers produce buffered responses and
    /// do not wrap streams.
    pub async fn stream(&self, url: impl Into<String>, call: RequestOptions) -> Result<ByteStream> {
        let call = RequestOptions {
            url: Some(url.into()),
            is_stream: Some(true),
            ..call
        };

        let hooks = options::resolve_hooks(&self.base_options.hooks, &call.hooks);
        let formed = options::form(&self.base_options, call);

        Executor::new(self.engine.clone(), hooks)
            .execute_stream(formed)
            .await
    }
}
