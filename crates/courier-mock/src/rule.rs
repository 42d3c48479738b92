//! Interception rules and their builder

use std::{fmt, sync::Arc};

use bytes::Bytes;
use courier_http::{
    header::{HeaderMap, HeaderValue},
    EngineRequest, EngineResponse, Method, StatusCode,
};

use crate::registry::RegistryInner;

type BodyPredicate = Arc<dyn Fn(&[u8]) -> bool + Send + Sync>;

enum BodyMatcher {
    Exact(Bytes),
    Predicate(BodyPredicate),
}

impl fmt::Debug for BodyMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyMatcher::Exact(bytes) => f.debug_tuple("Exact").field(bytes).finish(),
            BodyMatcher::Predicate(_) => f.write_str("Predicate"),
        }
    }
}

/// Builder for one interception rule. Register it with [`MockRule::reply`]
/// or [`MockRule::reply_with`]; a rule that is never replied to matches
/// nothing.
#[must_use = "a rule matches nothing until reply() registers it"]
pub struct MockRule {
    registry: Arc<RegistryInner>,
    origin: String,
    method: Method,
    path: String,
    times: usize,
    body_matcher: Option<BodyMatcher>,
    header_matchers: Vec<(String, String)>,
}

impl MockRule {
    pub(crate) fn new(
        registry: Arc<RegistryInner>,
        origin: String,
        method: Method,
        path: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            origin,
            method,
            path: path.into(),
            times: 1,
            body_matcher: None,
            header_matchers: Vec::new(),
        }
    }

    /// Serve this many matches before the rule expires. Rules are
    /// one-shot by default.
    pub fn times(mut self, times: usize) -> Self {
        self.times = times;
        self
    }

    /// Match only requests whose body equals the given bytes.
    pub fn match_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body_matcher = Some(BodyMatcher::Exact(body.into()));
        self
    }

    /// Match only requests whose body satisfies the predicate.
    pub fn match_body_with<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        self.body_matcher = Some(BodyMatcher::Predicate(Arc::new(predicate)));
        self
    }

    /// Match only requests carrying the given header value.
    pub fn match_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.header_matchers.push((name.into(), value.into()));
        self
    }

    /// Register the rule with a canned status and body.
    pub fn reply(self, status: u16, body: impl Into<Bytes>) {
        self.reply_with(status, body, HeaderMap::new());
    }

    /// Register the rule with a canned status, body, and headers.
    pub fn reply_with(self, status: u16, body: impl Into<Bytes>, headers: HeaderMap) {
        let interceptor = Interceptor {
            origin: self.origin,
            method: self.method,
            path: self.path,
            remaining: self.times,
            body_matcher: self.body_matcher,
            header_matchers: self.header_matchers,
            reply_status: StatusCode::from_u16(status)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            reply_body: body.into(),
            reply_headers: headers,
        };
        self.registry.register(interceptor);
    }
}

/// A registered rule plus its remaining match budget.
#[derive(Debug)]
pub(crate) struct Interceptor {
    origin: String,
    method: Method,
    path: String,
    pub(crate) remaining: usize,
    body_matcher: Option<BodyMatcher>,
    header_matchers: Vec<(String, String)>,
    reply_status: StatusCode,
    reply_body: Bytes,
    reply_headers: HeaderMap,
}

impl Interceptor {
    pub(crate) fn matches(&self, req: &EngineRequest, origin: &str, path: &str) -> bool {
        if self.method != req.method || self.origin != origin || self.path != path {
            return false;
        }

        for (name, expected) in &self.header_matchers {
            let matched = req
                .headers
                .get(name)
                .map(|value| header_equals(value, expected))
                .unwrap_or(false);
            if !matched {
                return false;
            }
        }

        match &self.body_matcher {
            Some(BodyMatcher::Exact(expected)) => {
                req.body.as_deref().unwrap_or_default() == expected.as_ref()
            }
            Some(BodyMatcher::Predicate(predicate)) => {
                predicate(req.body.as_deref().unwrap_or_default())
            }
            None => true,
        }
    }

    pub(crate) fn serve(&self) -> EngineResponse {
        EngineResponse {
            status_code: self.reply_status,
            headers: self.reply_headers.clone(),
            body: self.reply_body.clone(),
        }
    }

    pub(crate) fn describe(&self) -> String {
        format!(
            "{} {}{} ({} pending)",
            self.method, self.origin, self.path, self.remaining
        )
    }
}

fn header_equals(value: &HeaderValue, expected: &str) -> bool {
    value.to_str().map(|v| v == expected).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: Method, body: Option<&'static [u8]>) -> EngineRequest {
        EngineRequest {
            url: "http://localhost:3000/json".into(),
            method,
            headers: HeaderMap::new(),
            body: body.map(Bytes::from_static),
            timeout: None,
            max_redirects: 10,
            signal: None,
        }
    }

    fn interceptor(method: Method) -> Interceptor {
        Interceptor {
            origin: "http://localhost:3000".into(),
            method,
            path: "/json".into(),
            remaining: 1,
            body_matcher: None,
            header_matchers: Vec::new(),
            reply_status: StatusCode::OK,
            reply_body: Bytes::from_static(b"ok"),
            reply_headers: HeaderMap::new(),
        }
    }

    #[test]
    fn test_matches_on_origin_method_path() {
        let rule = interceptor(Method::GET);

        assert!(rule.matches(
            &request(Method::GET, None),
            "http://localhost:3000",
            "/json"
        ));
        assert!(!rule.matches(
            &request(Method::POST, None),
            "http://localhost:3000",
            "/json"
        ));
        assert!(!rule.matches(&request(Method::GET, None), "http://localhost:3000", "/x"));
        assert!(!rule.matches(&request(Method::GET, None), "http://other:3000", "/json"));
    }

    #[test]
    fn test_exact_body_matcher() {
        let mut rule = interceptor(Method::POST);
        rule.body_matcher = Some(BodyMatcher::Exact(Bytes::from_static(b"payload")));

        assert!(rule.matches(
            &request(Method::POST, Some(b"payload")),
            "http://localhost:3000",
            "/json"
        ));
        assert!(!rule.matches(
            &request(Method::POST, Some(b"other")),
            "http://localhost:3000",
            "/json"
        ));
        assert!(!rule.matches(
            &request(Method::POST, None),
            "http://localhost:3000",
            "/json"
        ));
    }

    #[test]
    fn test_predicate_body_matcher() {
        let mut rule = interceptor(Method::POST);
        rule.body_matcher = Some(BodyMatcher::Predicate(Arc::new(|body| {
            body.starts_with(b"pre")
        })));

        assert!(rule.matches(
            &request(Method::POST, Some(b"prefix")),
            "http://localhost:3000",
            "/json"
        ));
        assert!(!rule.matches(
            &request(Method::POST, Some(b"nope")),
            "http://localhost:3000",
            "/json"
        ));
    }

    #[test]
    fn test_header_matcher() {
        let mut rule = interceptor(Method::GET);
        rule.header_matchers.push(("x-token".into(), "secret".into()));

        let mut matching = request(Method::GET, None);
        matching
            .headers
            .insert("x-token", HeaderValue::from_static("secret"));

        assert!(rule.matches(&matching, "http://localhost:3000", "/json"));
        assert!(!rule.matches(
            &request(Method::GET, None),
            "http://localhost:3000",
            "/json"
        ));
    }
}
