//! Request interception for courier clients
//!
//! A [`MockRegistry`] implements the courier engine trait and serves
//! canned responses for matched requests. It is injected into a client
//! with `Client::with_engine` rather than installed as ambient global
//! state, and carries an explicit activate/deactivate/reset lifecycle.
//!
//! ```no_run
//! # async fn demo() -> courier_http::Result<()> {
//! use courier_http::{Client, RequestOptions};
//! use courier_mock::MockRegistry;
//!
//! let registry = MockRegistry::new();
//! registry
//!     .mock("http://localhost:3000")
//!     .get("/json")
//!     .reply(200, r#"{"test": "value"}"#);
//!
//! let client = Client::with_engine(RequestOptions::default(), registry.as_engine());
//! let reply = client.get("http://localhost:3000/json", RequestOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod registry;
pub mod rule;

pub use registry::{MockRegistry, MockScope};
pub use rule::MockRule;
