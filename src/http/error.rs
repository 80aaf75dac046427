//! Handler errors and how they become client responses.
//!
//! Two paths reach the access record:
//! - services with a real error type return `Err`, and the observer renders
//!   it through an [`ErrorResponder`]
//! - axum handlers are infallible, so they return [`HttpError`] as a
//!   response; it leaves a [`HandlerError`] in the response extensions

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use tower::BoxError;

/// An error carrying the status a client should see.
#[derive(Debug, Clone, thiserror::Error)]
#[error("code={}, message={message}", .status.as_u16())]
pub struct HttpError {
    pub status: StatusCode,
    pub message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not Found")
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response<Body> {
        let mut response = plain_text(self.status, self.message.clone());
        response
            .extensions_mut()
            .insert(HandlerError(self.to_string()));
        response
    }
}

/// Error text left on a response by a handler that already rendered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError(pub String);

/// Renders a client response for an error returned by an inner handler.
///
/// Called exactly once per failed request, before the access record is
/// assembled, so the logged status is the one the client receives.
pub trait ErrorResponder: Send + Sync {
    fn respond(&self, err: &BoxError) -> Response<Body>;
}

/// `HttpError`s keep their status and message; anything else is a 500.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorResponder;

impl ErrorResponder for DefaultErrorResponder {
    fn respond(&self, err: &BoxError) -> Response<Body> {
        match err.downcast_ref::<HttpError>() {
            Some(http) => plain_text(http.status, http.message.clone()),
            None => plain_text(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".to_string(),
            ),
        }
    }
}

fn plain_text(status: StatusCode, message: String) -> Response<Body> {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
