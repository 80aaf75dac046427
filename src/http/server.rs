//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Wrap an application Router with the middleware stack
//! - Wire up request observation, timeouts, and request IDs
//! - Bind server to listener with connect info
//! - Stop on the shutdown broadcast

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
};

use crate::config::{AccessLogSink, ServerConfig};
use crate::http::error::HttpError;
use crate::http::middleware::RequestObserver;
use crate::observability::sink::{JsonSink, LogSink, TracingSink};

/// HTTP server hosting an application behind the request observer.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
}

impl HttpServer {
    /// Create a server whose access sink is chosen by configuration.
    pub fn new(config: ServerConfig, app: Router) -> Self {
        let sink: Arc<dyn LogSink> = match config.access_log.sink {
            AccessLogSink::Tracing => Arc::new(TracingSink),
            AccessLogSink::Json => Arc::new(JsonSink::stdout()),
        };
        Self::with_sink(config, app, sink)
    }

    /// Create a server that emits access records into `sink`.
    pub fn with_sink(config: ServerConfig, app: Router, sink: Arc<dyn LogSink>) -> Self {
        let router = Self::build_router(&config, app, sink);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers added later run first: request IDs are assigned before the
    /// observer captures the request, and timeouts fire inside it so timed
    /// out requests are still logged.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, app: Router, sink: Arc<dyn LogSink>) -> Router {
        let mut router = app.layer(TimeoutLayer::new(Duration::from_secs(
            config.timeouts.request_secs,
        )));

        if config.access_log.enabled {
            router = router.layer(RequestObserver::new(sink));
        }

        if config.request_id.generate {
            router = router
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));
        }

        router
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            access_log = self.config.access_log.enabled,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The fully layered router.
    pub fn into_router(self) -> Router {
        self.router
    }
}

/// Minimal application served by the bundled binary.
pub fn status_routes() -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .fallback(|| async { HttpError::not_found() })
}
