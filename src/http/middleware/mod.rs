//! Middleware layers applied around application routes.

pub mod request_observer;

pub use request_observer::{RequestObserver, RequestObserverService};
