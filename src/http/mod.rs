//! HTTP plumbing around the observer.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, connect info, graceful shutdown)
//!     → [request id layer] (optional, generates x-request-id)
//!     → middleware/request_observer.rs (timing + access record)
//!     → timeout layer
//!     → application routes
//!         attributes.rs: values set by earlier middleware
//!         error.rs: handler errors rendered for the client
//! ```

pub mod attributes;
pub mod error;
pub mod middleware;
pub mod server;

pub use attributes::{AttributeValue, RequestAttributes, RequestAttributesExt, USER_ID};
pub use error::{DefaultErrorResponder, ErrorResponder, HandlerError, HttpError};
pub use middleware::RequestObserver;
pub use server::HttpServer;
