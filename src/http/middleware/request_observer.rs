//! Request observation middleware.
//!
//! Wraps an inner service, times it, and emits one access record per
//! request through an injected [`LogSink`].
//!
//! ```text
//! request
//!     → attach RequestAttributes handle
//!     → RequestContext::capture
//!     → start = clock.now()
//!     → inner service ──Err──▶ ErrorResponder::respond
//!     → stop = clock.now()
//!     → read userid, HandlerError from the response
//!     → ResponseSnapshot::capture
//!     → sink.info("Handled request", record)
//!     → Ok(response)
//! ```
//!
//! The service never fails: inner errors are logged and rendered into a
//! response by the [`ErrorResponder`], which makes the layer usable directly
//! with `axum::Router::layer`.

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use http_body::Body as HttpBody;
use tower::{BoxError, Layer, Service, ServiceExt};

use crate::http::attributes::RequestAttributesExt;
use crate::http::error::{DefaultErrorResponder, ErrorResponder, HandlerError};
use crate::observability::clock::{Clock, SystemClock};
use crate::observability::record::{
    AccessRecord, RequestContext, ResponseSnapshot, HANDLED_REQUEST,
};
use crate::observability::sink::LogSink;

/// Access logging layer.
#[derive(Clone)]
pub struct RequestObserver {
    sink: Arc<dyn LogSink>,
    clock: Arc<dyn Clock>,
    responder: Arc<dyn ErrorResponder>,
}

impl RequestObserver {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            clock: Arc::new(SystemClock),
            responder: Arc::new(DefaultErrorResponder),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_error_responder(mut self, responder: Arc<dyn ErrorResponder>) -> Self {
        self.responder = responder;
        self
    }

    /// Run `inner` for one request and log the outcome.
    pub async fn observe<S, ReqBody, ResBody>(
        &self,
        inner: S,
        mut request: Request<ReqBody>,
    ) -> Response<Body>
    where
        S: Service<Request<ReqBody>, Response = Response<ResBody>>,
        S::Error: Into<BoxError>,
        ResBody: HttpBody<Data = Bytes> + Send + 'static,
        ResBody::Error: Into<BoxError>,
    {
        let attributes = request.ensure_attributes();
        let mut context = RequestContext::capture(&request);

        let start = self.clock.now();
        let (response, error) = match inner.oneshot(request).await {
            Ok(response) => {
                let error = response
                    .extensions()
                    .get::<HandlerError>()
                    .map(|HandlerError(message)| message.clone());
                (response.map(Body::new), error)
            }
            Err(err) => {
                let err: BoxError = err.into();
                let response = self.responder.respond(&err);
                (response, Some(err.to_string()))
            }
        };
        let stop = self.clock.now();

        // Inner layers may have authenticated the request while it ran.
        context.user_id = attributes.user_id();

        let record = AccessRecord::assemble(
            context,
            ResponseSnapshot::capture(&response),
            error,
            stop.saturating_duration_since(start),
            self.clock.wall(),
        );
        self.sink.info(HANDLED_REQUEST, &record);

        response
    }
}

impl<S> Layer<S> for RequestObserver {
    type Service = RequestObserverService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestObserverService {
            inner,
            observer: self.clone(),
        }
    }
}

/// Service produced by [`RequestObserver`].
#[derive(Clone)]
pub struct RequestObserverService<S> {
    inner: S,
    observer: RequestObserver,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestObserverService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: HttpBody<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness failures of the inner service surface through `oneshot`
        // and are logged like any other handler error.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let observer = self.observer.clone();

        Box::pin(async move { Ok(observer.observe(inner, request).await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::attributes::USER_ID;
    use crate::http::error::HttpError;
    use crate::observability::clock::SteppingClock;
    use crate::observability::record::FieldValue;
    use crate::observability::sink::MemorySink;
    use axum::http::StatusCode;
    use axum::{middleware, routing::get, Router};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::service_fn;

    async fn ok_handler(_req: Request<Body>) -> Result<Response<Body>, BoxError> {
        Ok(Response::new(Body::from("hello")))
    }

    #[derive(Default)]
    struct CountingResponder {
        calls: AtomicUsize,
        last: std::sync::Mutex<Option<String>>,
    }

    impl ErrorResponder for CountingResponder {
        fn respond(&self, err: &BoxError) -> Response<Body> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(err.to_string());
            DefaultErrorResponder.respond(err)
        }
    }

    #[tokio::test]
    async fn test_one_record_per_request() {
        let sink = Arc::new(MemorySink::new());
        let service = RequestObserver::new(sink.clone()).layer(service_fn(ok_handler));

        for _ in 0..3 {
            let req = Request::builder().uri("/").body(Body::empty()).unwrap();
            let res = service.clone().oneshot(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }

        assert_eq!(sink.len(), 3);
        assert!(sink.messages().iter().all(|m| m == "Handled request"));
    }

    #[tokio::test]
    async fn test_record_emitted_after_handler_returns() {
        let sink = Arc::new(MemorySink::new());
        let seen = sink.clone();
        let inner = service_fn(move |_req: Request<Body>| {
            let seen = seen.clone();
            async move {
                assert!(seen.is_empty(), "record emitted before handler finished");
                Ok::<_, BoxError>(Response::new(Body::empty()))
            }
        });

        let service = RequestObserver::new(sink.clone()).layer(inner);
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        service.oneshot(req).await.unwrap();
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_handler_error_is_logged_and_propagated_once() {
        let sink = Arc::new(MemorySink::new());
        let responder = Arc::new(CountingResponder::default());
        let inner = service_fn(|_req: Request<Body>| async {
            Err::<Response<Body>, _>(HttpError::new(StatusCode::BAD_REQUEST, "bad input"))
        });

        let service = RequestObserver::new(sink.clone())
            .with_error_responder(responder.clone())
            .layer(inner);

        let req = Request::builder().uri("/submit").body(Body::empty()).unwrap();
        let res = service.oneshot(req).await;

        let res = res.expect("observer must not fail the pipeline");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(responder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            responder.last.lock().unwrap().as_deref(),
            Some("code=400, message=bad input")
        );

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].error.as_deref(), Some("code=400, message=bad input"));
        assert_eq!(records[0].status, 400);
        assert_eq!(records[0].bytes_out, "bad input".len() as u64);
    }

    #[tokio::test]
    async fn test_plain_error_renders_500() {
        let sink = Arc::new(MemorySink::new());
        let inner = service_fn(|_req: Request<Body>| async {
            Err::<Response<Body>, BoxError>("connection reset".into())
        });

        let service = RequestObserver::new(sink.clone()).layer(inner);
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let res = service.oneshot(req).await.unwrap();

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(sink.records()[0].error.as_deref(), Some("connection reset"));
    }

    #[tokio::test]
    async fn test_latency_from_clock() {
        let sink = Arc::new(MemorySink::new());
        let clock = Arc::new(SteppingClock::new(
            Duration::from_nanos(1_500_000),
            Utc::now(),
        ));
        let service = RequestObserver::new(sink.clone())
            .with_clock(clock)
            .layer(service_fn(ok_handler));

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        service.oneshot(req).await.unwrap();

        let record = &sink.records()[0];
        assert_eq!(record.latency_micros(), "1500");
        assert_eq!(record.latency_human(), "1.5ms");
        assert_eq!(record.error, None);
        assert_eq!(record.bytes_out, 5);
    }

    #[tokio::test]
    async fn test_user_id_set_by_earlier_middleware() {
        let sink = Arc::new(MemorySink::new());
        let service = RequestObserver::new(sink.clone()).layer(service_fn(ok_handler));

        let mut req = Request::builder().uri("/me").body(Body::empty()).unwrap();
        req.ensure_attributes().set("userid", "abc123");
        service.oneshot(req).await.unwrap();

        assert_eq!(
            sink.records()[0].field("userId"),
            Some(FieldValue::Str("abc123".into()))
        );
    }

    async fn authenticate(
        request: axum::extract::Request,
        next: middleware::Next,
    ) -> axum::response::Response {
        if let Some(attrs) = request.attributes() {
            attrs.set(USER_ID, "abc123");
        }
        next.run(request).await
    }

    #[tokio::test]
    async fn test_user_id_set_inside_observer() {
        let sink = Arc::new(MemorySink::new());
        let router = Router::new()
            .route("/me", get(|| async { "me" }))
            .layer(middleware::from_fn(authenticate))
            .layer(RequestObserver::new(sink.clone()));

        let req = Request::builder().uri("/me").body(Body::empty()).unwrap();
        let res = router.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        assert_eq!(sink.records()[0].user_id, "abc123");
    }

    #[tokio::test]
    async fn test_router_handler_error_is_logged() {
        let sink = Arc::new(MemorySink::new());
        let router = Router::new()
            .route(
                "/submit",
                get(|| async {
                    Err::<String, _>(HttpError::new(StatusCode::BAD_REQUEST, "bad input"))
                }),
            )
            .layer(RequestObserver::new(sink.clone()));

        let req = Request::builder().uri("/submit").body(Body::empty()).unwrap();
        let res = router.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let record = &sink.records()[0];
        assert_eq!(record.status, 400);
        assert_eq!(record.error.as_deref(), Some("code=400, message=bad input"));
    }

    #[tokio::test]
    async fn test_successful_router_handler_has_no_error() {
        let sink = Arc::new(MemorySink::new());
        let router = Router::new()
            .route("/", get(|| async { "fine" }))
            .layer(RequestObserver::new(sink.clone()));

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        router.oneshot(req).await.unwrap();
        assert_eq!(sink.records()[0].error, None);
    }
}
