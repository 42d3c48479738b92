//! Onion-style handler chain around the executor

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use futures::future::BoxFuture;

use crate::{error::Result, executor::Executor, options::FormedOptions, response::Response};

pub type HandlerFuture = BoxFuture<'static, Result<Response>>;

/// Middleware function wrapping the network call. Code before
/// `next.run(..)` runs on the way in, code after it on the way out;
/// errors propagate through the pending `next` future uncaught.
pub type Handler = Arc<dyn Fn(FormedOptions, Next) -> HandlerFuture + Send + Sync>;

struct ChainState {
    handlers: Vec<Handler>,
    executor: Arc<Executor>,
    /// One cursor per invocation, shared across stages: calling `next`
    /// twice advances to the remaining handlers (or the executor) instead
    /// of replaying the current one.
    cursor: AtomicUsize,
}

/// Continuation handed to each handler.
#[derive(Clone)]
pub struct Next {
    state: Arc<ChainState>,
}

impl Next {
    /// Invoke the following handler, or the executor past the end of the
    /// chain, with a possibly modified options value.
    pub fn run(&self, options: FormedOptions) -> HandlerFuture {
        let index = self.state.cursor.fetch_add(1, Ordering::SeqCst);
        match self.state.handlers.get(index) {
            Some(handler) => handler(options, self.clone()),
            None => {
                let executor = self.state.executor.clone();
                Box::pin(async move { executor.execute(options).await })
            }
        }
    }
}

/// Root the chain at index 0. The caller short-circuits an empty chain,
/// but an empty handler list degenerates to a plain executor call anyway.
pub(crate) fn run_chain(
    handlers: Vec<Handler>,
    executor: Arc<Executor>,
    options: FormedOptions,
) -> HandlerFuture {
    let next = Next {
        state: Arc::new(ChainState {
            handlers,
            executor,
            cursor: AtomicUsize::new(0),
        }),
    };
    next.run(options)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use reqwest::{header::HeaderMap, StatusCode};

    use super::*;
    use crate::{
        engine::{ByteStream, EngineError, EngineRequest, EngineResponse, HttpEngine},
        error::ErrorCode,
        options::{form, Hooks, RequestOptions},
    };

    struct CountingEngine {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HttpEngine for CountingEngine {
        async fn request(
            &self,
            _req: EngineRequest,
        ) -> std::result::Result<EngineResponse, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(EngineResponse {
                status_code: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Bytes::from_static(b"ok"),
            })
        }

        async fn open_stream(
            &self,
            _req: EngineRequest,
        ) -> std::result::Result<ByteStream, EngineError> {
            Err(EngineError::Rejected("not used".into()))
        }
    }

    fn chain_fixture() -> (Arc<CountingEngine>, Arc<Executor>) {
        let engine = Arc::new(CountingEngine {
            calls: AtomicUsize::new(0),
        });
        let executor = Arc::new(Executor::new(engine.clone(), Hooks::default()));
        (engine, executor)
    }

    fn formed() -> FormedOptions {
        let mut call = RequestOptions::new();
        call.url = Some("http://localhost/".into());
        form(&RequestOptions::default(), call)
    }

    fn logging_handler(log: Arc<Mutex<Vec<String>>>, name: &'static str) -> Handler {
        Arc::new(move |options, next| {
            let log = log.clone();
            Box::pin(async move {
                log.lock().unwrap().push(format!("before {name}"));
                let response = next.run(options).await?;
                log.lock().unwrap().push(format!("after {name}"));
                Ok(response)
            })
        })
    }

    #[tokio::test]
    async fn test_onion_ordering() {
        let (_engine, executor) = chain_fixture();
        let log = Arc::new(Mutex::new(Vec::new()));

        let handlers = vec![
            logging_handler(log.clone(), "h1"),
            logging_handler(log.clone(), "h2"),
        ];

        run_chain(handlers, executor, formed()).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["before h1", "before h2", "after h2", "after h1"]
        );
    }

    #[tokio::test]
    async fn test_handler_can_rewrite_options() {
        let (_engine, executor) = chain_fixture();
        let seen = Arc::new(Mutex::new(None));

        let observer = seen.clone();
        let rewrite: Handler = Arc::new(move |mut options, next| {
            options
                .headers
                .insert("x-injected", "yes".parse().unwrap());
            next.run(options)
        });
        let observe: Handler = Arc::new(move |options, next| {
            *observer.lock().unwrap() = options.headers.get("x-injected").cloned();
            next.run(options)
        });

        run_chain(vec![rewrite, observe], executor, formed())
            .await
            .unwrap();

        assert_eq!(seen.lock().unwrap().as_ref().unwrap(), "yes");
    }

    #[tokio::test]
    async fn test_calling_next_twice_reinvokes_downstream() {
        let (engine, executor) = chain_fixture();

        let double: Handler = Arc::new(move |options, next| {
            let replay = options.clone();
            Box::pin(async move {
                let _first = next.run(replay).await?;
                next.run(options).await
            })
        });

        run_chain(vec![double], executor, formed()).await.unwrap();

        // Shared cursor: the second `next` call reaches the executor
        // again rather than replaying the handler itself.
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_errors_propagate_uncaught() {
        let (_engine, executor) = chain_fixture();
        let log = Arc::new(Mutex::new(Vec::new()));

        let failing: Handler = Arc::new(|options, _next| {
            Box::pin(async move {
                Err(crate::error::RequestError::new(
                    "boom",
                    ErrorCode::RequestError,
                    &options,
                    None,
                ))
            })
        });

        let handlers = vec![logging_handler(log.clone(), "outer"), failing];
        let err = run_chain(handlers, executor, formed()).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::RequestError);
        // the outer handler's "after" half never ran
        assert_eq!(*log.lock().unwrap(), vec!["before outer"]);
    }

    #[tokio::test]
    async fn test_empty_chain_reaches_executor() {
        let (engine, executor) = chain_fixture();

        run_chain(Vec::new(), executor, formed()).await.unwrap();

        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }
}
