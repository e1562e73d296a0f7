//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the ingest and health handlers
//! - Wire up middleware (request ID, tracing, CORS, timeout)
//! - Run every ingest request through the guard chain
//! - Sweep expired rate-limit buckets in the background
//! - Serve until the shutdown signal, then drain

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderName, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{CorsConfig, GateConfig};
use crate::consent::ConsentHandler;
use crate::http::request::{
    client_ip, propagate_request_id_layer, request_id, set_request_id_layer,
};
use crate::http::response::ApiError;
use crate::lifecycle::ShutdownListener;
use crate::observability::metrics;
use crate::security::{CounterStore, GuardChain, GuardedRequest, MemoryStore, RequestMetadata};

pub const HEALTH_PATH: &str = "/health";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub chain: Arc<GuardChain>,
    pub handler: Arc<ConsentHandler>,
    pub trust_forwarded: bool,
}

/// HTTP server for the admission gate.
pub struct HttpServer {
    router: Router,
    config: GateConfig,
    store: Arc<dyn CounterStore>,
}

impl HttpServer {
    /// Create a server backed by the in-process counter store.
    pub fn new(config: GateConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    /// Create a server over a caller-supplied counter store.
    pub fn with_store(config: GateConfig, store: Arc<dyn CounterStore>) -> Self {
        let state = AppState {
            chain: Arc::new(GuardChain::from_config(&config, store.clone())),
            handler: Arc::new(ConsentHandler::new(&config.auth)),
            trust_forwarded: config.listener.trust_forwarded_headers,
        };

        tracing::debug!(
            guards = ?state.chain.guard_names(),
            ingest_path = %config.listener.ingest_path,
            "Guard chain built"
        );

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            store,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GateConfig, state: AppState) -> Router {
        let auth_header = HeaderName::from_bytes(config.auth.header.as_bytes())
            .unwrap_or(HeaderName::from_static("x-api-key"));

        Router::new()
            .route(&config.listener.ingest_path, post(ingest_handler))
            .route(HEALTH_PATH, get(health_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http().make_span_with(
                        |request: &Request<Body>| {
                            tracing::info_span!(
                                "request",
                                method = %request.method(),
                                path = %request.uri().path(),
                                request_id = %request_id(request.headers()),
                            )
                        },
                    ))
                    .layer(propagate_request_id_layer())
                    .layer(cors_layer(&config.cors, auth_header))
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.timeouts.request_secs,
                    ))),
            )
    }

    /// The router without a listener, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: ShutdownListener,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            ingest_path = %self.config.listener.ingest_path,
            "HTTP server starting"
        );

        let sweeper = self.config.rate_limit.enabled.then(|| {
            spawn_sweeper(
                self.store.clone(),
                self.config.rate_limit.sweep_interval(),
                shutdown.clone(),
            )
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await;

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        served?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn cors_layer(config: &CorsConfig, auth_header: HeaderName) -> CorsLayer {
    let origins = if config.allowed_origins.is_empty() {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(
            config
                .allowed_origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, auth_header])
}

/// Periodically drop lapsed counters so idle IPs do not accumulate.
fn spawn_sweeper(
    store: Arc<dyn CounterStore>,
    every: Duration,
    mut shutdown: ShutdownListener,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    sweep_once(store.as_ref(), SystemTime::now());
                }
                _ = shutdown.wait() => break,
            }
        }
    })
}

/// One sweep: purge lapsed keys, then publish how many remain.
fn sweep_once(store: &dyn CounterStore, now: SystemTime) -> usize {
    let purged = store.purge_expired(now);
    if let Some(tracked) = store.tracked_keys() {
        metrics::set_tracked_keys(tracked);
    }
    if purged > 0 {
        tracing::debug!(purged, "Swept expired rate limit buckets");
    }
    purged
}

/// Consent ingest: guard chain, then the consent handler.
async fn ingest_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let source_ip = client_ip(request.headers(), peer, state.trust_forwarded);

    let (parts, body) = request.into_parts();
    let metadata = RequestMetadata::from_headers(&parts.headers, source_ip, SystemTime::now());

    let result = match state.chain.run(GuardedRequest::new(metadata, body)).await {
        Ok(admitted) => state.handler.handle(&parts.headers, admitted),
        Err(rejection) => Err(ApiError::from(rejection)),
    };

    let response = match result {
        Ok(accepted) => (StatusCode::OK, Json(accepted)).into_response(),
        Err(e) => e.into_response(),
    };
    metrics::record_request(response.status().as_u16(), start_time);
    response
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
