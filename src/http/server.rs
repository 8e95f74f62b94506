//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all gateway handler
//! - Wire up middleware (request ID, tracing, concurrency limit, timeout)
//! - Dispatch requests to the routing table and the route's filter chain
//! - Map chain failures to error responses
//! - Observability (metrics, correlation IDs)

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::backend::{Backend, HttpBackend};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::exchange::GatewayExchange;
use crate::http::request::{self, MakeRequestUuid, X_REQUEST_ID};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::routing::{RouteError, RouteTable};

/// Grace added on top of the exchange deadline before the outer timeout fires.
const TIMEOUT_GRACE: Duration = Duration::from_secs(1);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable>,
    pub backend: Arc<dyn Backend>,
    pub request_timeout: Duration,
    pub shutdown: Shutdown,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    shutdown: Shutdown,
}

impl HttpServer {
    /// Create a server whose routes come from `config`.
    pub fn new(config: GatewayConfig) -> Result<Self, RouteError> {
        let routes = RouteTable::from_config(&config)?;
        Ok(Self::with_routes(config, routes))
    }

    /// Create a server with programmatically built routes.
    pub fn with_routes(config: GatewayConfig, routes: RouteTable) -> Self {
        let backend = HttpBackend::new(Duration::from_secs(config.timeouts.connect_secs));
        Self::with_backend(config, routes, Arc::new(backend))
    }

    /// Create a server forwarding to a custom backend.
    pub fn with_backend(
        config: GatewayConfig,
        routes: RouteTable,
        backend: Arc<dyn Backend>,
    ) -> Self {
        let shutdown = Shutdown::new();
        let state = AppState {
            routes: Arc::new(routes),
            backend,
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
            shutdown: shutdown.clone(),
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            shutdown,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let timeout = Duration::from_secs(config.timeouts.request_secs) + TIMEOUT_GRACE;

        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
                    .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                        tracing::info_span!(
                            "request",
                            method = %req.method(),
                            path = %req.uri().path(),
                            request_id = %request::request_id(req),
                        )
                    }))
                    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                    .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_connections))
                    .layer(TimeoutLayer::new(timeout)),
            )
    }

    /// Handle used to stop the server; in-flight exchanges are cancelled with it.
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Run the server, accepting connections on the given listener until shutdown.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.config.routes.len(),
            "HTTP server starting"
        );

        let shutdown = self.shutdown.clone();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all handler.
/// Looks up the route, runs its chain and streams the final response.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let started = Instant::now();
    let request_id = request::request_id(&request);
    let method = request.method().to_string();
    let path = request.uri().path().to_owned();

    let Some(route) = state.routes.match_request(&request) else {
        tracing::warn!(request_id = %request_id, path = %path, "No route matched");
        metrics::record_request(&method, 404, "none", started);
        return GatewayError::NoRoute(path).into_response();
    };

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        route = %route.id(),
        filters = route.chain().len(),
        "Routing request"
    );

    let mut exchange = GatewayExchange::new(request)
        .with_request_id(request_id.clone())
        .with_timeout(state.request_timeout)
        .with_cancellation(state.shutdown.child_token())
        .with_route(route.id(), route.target().clone());

    match route.chain().execute(&mut exchange, state.backend.as_ref()).await {
        Ok(response) => {
            metrics::record_request(&method, response.status.as_u16(), route.id(), started);
            response.into_response()
        }
        Err(err) => {
            let status = err.status();
            if status.is_server_error() {
                tracing::error!(
                    request_id = %request_id,
                    route = %route.id(),
                    status = %status,
                    kind = err.kind(),
                    error = %err,
                    "Exchange failed"
                );
            } else {
                tracing::warn!(
                    request_id = %request_id,
                    route = %route.id(),
                    error = %err,
                    "Exchange failed"
                );
            }
            metrics::record_request(&method, status.as_u16(), route.id(), started);
            err.into_response()
        }
    }
}
