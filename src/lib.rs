//! Structured access logging middleware for axum/tower services.
//!
//! Every request passing through [`RequestObserver`] produces exactly one
//! access record: timing, routing, client identity and B3 trace
//! correlation headers, emitted through an injected [`LogSink`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use axum::{routing::get, Router};
//! use request_observer::{RequestObserver, TracingSink};
//!
//! let app: Router = Router::new()
//!     .route("/", get(|| async { "hello" }))
//!     .layer(RequestObserver::new(Arc::new(TracingSink)));
//! ```

#![recursion_limit = "256"]

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::ServerConfig;
pub use http::{HttpServer, RequestObserver};
pub use lifecycle::Shutdown;
pub use observability::{AccessRecord, LogSink, MemorySink, TracingSink};
