//! The interception registry and its engine implementation

use std::sync::Arc;

use async_trait::async_trait;
use courier_http::{ByteStream, EngineError, EngineRequest, EngineResponse, HttpEngine, Method};
use parking_lot::Mutex;
use tracing::debug;

use crate::rule::{Interceptor, MockRule};

pub(crate) struct RegistryInner {
    state: Mutex<RegistryState>,
    fallback: Option<Arc<dyn HttpEngine>>,
}

struct RegistryState {
    active: bool,
    rules: Vec<Interceptor>,
}

impl RegistryInner {
    pub(crate) fn register(&self, interceptor: Interceptor) {
        self.state.lock().rules.push(interceptor);
    }

    /// Consume one match from the first applicable rule. `None` when the
    /// registry is inactive or nothing matches.
    fn intercept(&self, req: &EngineRequest) -> Option<EngineResponse> {
        let url = req.url.parse::<url::Url>().ok()?;
        let origin = url.origin().ascii_serialization();
        let path = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };

        let mut state = self.state.lock();
        if !state.active {
            return None;
        }

        let index = state
            .rules
            .iter()
            .position(|rule| rule.remaining > 0 && rule.matches(req, &origin, &path))?;

        let response = state.rules[index].serve();
        state.rules[index].remaining -= 1;
        if state.rules[index].remaining == 0 {
            state.rules.remove(index);
        }

        debug!("mock matched {} {}", req.method, req.url);
        Some(response)
    }
}

/// Process-scoped interception service. Cloneable; clones share the rule
/// table. Inject into a client with `Client::with_engine(options,
/// registry.as_engine())`.
#[derive(Clone)]
pub struct MockRegistry {
    inner: Arc<RegistryInner>,
}

impl MockRegistry {
    /// Registry without a fallback: unmatched requests are rejected, so
    /// no test traffic ever reaches the network.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Registry that passes unmatched (or deactivated) traffic through to
    /// the given engine.
    pub fn with_fallback(engine: Arc<dyn HttpEngine>) -> Self {
        Self::build(Some(engine))
    }

    fn build(fallback: Option<Arc<dyn HttpEngine>>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                state: Mutex::new(RegistryState {
                    active: true,
                    rules: Vec::new(),
                }),
                fallback,
            }),
        }
    }

    /// The registry as an injectable engine.
    pub fn as_engine(&self) -> Arc<dyn HttpEngine> {
        Arc::new(self.clone())
    }

    /// Start a scope of rules for one origin, e.g.
    /// `"http://localhost:3000"`. A trailing slash is ignored.
    pub fn mock(&self, origin: impl Into<String>) -> MockScope {
        let origin = origin.into();
        let origin = origin.strip_suffix('/').unwrap_or(&origin).to_string();
        MockScope {
            registry: self.inner.clone(),
            origin,
        }
    }

    /// Resume interception after [`deactivate`](Self::deactivate).
    pub fn activate(&self) {
        self.inner.state.lock().active = true;
    }

    /// Stop intercepting; all traffic goes to the fallback (or is
    /// rejected when there is none). Registered rules are kept.
    pub fn deactivate(&self) {
        self.inner.state.lock().active = false;
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.lock().active
    }

    /// Drop all registered rules.
    pub fn reset(&self) {
        self.inner.state.lock().rules.clear();
    }

    /// Descriptions of rules that still have matches to serve. Useful in
    /// test teardown to assert every expected request happened.
    pub fn pending(&self) -> Vec<String> {
        self.inner
            .state
            .lock()
            .rules
            .iter()
            .map(|rule| rule.describe())
            .collect()
    }
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Rule scope bound to one origin.
pub struct MockScope {
    registry: Arc<RegistryInner>,
    origin: String,
}

impl MockScope {
    pub fn intercept(&self, method: Method, path: impl Into<String>) -> MockRule {
        MockRule::new(self.registry.clone(), self.origin.clone(), method, path)
    }

    pub fn get(&self, path: impl Into<String>) -> MockRule {
        self.intercept(Method::GET, path)
    }

    pub fn post(&self, path: impl Into<String>) -> MockRule {
        self.intercept(Method::POST, path)
    }

    pub fn put(&self, path: impl Into<String>) -> MockRule {
        self.intercept(Method::PUT, path)
    }

    pub fn patch(&self, path: impl Into<String>) -> MockRule {
        self.intercept(Method::PATCH, path)
    }

    pub fn delete(&self, path: impl Into<String>) -> MockRule {
        self.intercept(Method::DELETE, path)
    }
}

#[async_trait]
impl HttpEngine for MockRegistry {
    async fn request(&self, req: EngineRequest) -> Result<EngineResponse, EngineError> {
        match self.inner.intercept(&req) {
            Some(response) => Ok(response),
            None => match &self.inner.fallback {
                Some(engine) => engine.request(req).await,
                None => Err(EngineError::Rejected(format!(
                    "no interceptor matched {} {}",
                    req.method, req.url
                ))),
            },
        }
    }

    async fn open_stream(&self, req: EngineRequest) -> Result<ByteStream, EngineError> {
        match self.inner.intercept(&req) {
            Some(response) => {
                let chunks = vec![Ok(response.body)];
                Ok(Box::pin(futures::stream::iter(chunks)))
            }
            None => match &self.inner.fallback {
                Some(engine) => engine.open_stream(req).await,
                None => Err(EngineError::Rejected(format!(
                    "no interceptor matched {} {} (stream)",
                    req.method, req.url
                ))),
            },
        }
    }
}
