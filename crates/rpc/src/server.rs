// Path: crates/rpc/src/server.rs
//! The HTTP surface: one JSON-RPC POST route plus `/metrics`.

use crate::jsonrpc::{ErrorObject, Request, Response as RpcResponse};
use crate::resolver::Resolver;
use crate::validator::Validator;
use anyhow::Result;
use axum::{
    error_handling::HandleErrorLayer,
    extract::{ConnectInfo, State},
    http::HeaderMap,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use once_cell::sync::OnceCell;
use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tower::{
    limit::ConcurrencyLimitLayer, load_shed::LoadShedLayer, timeout::TimeoutLayer, BoxError,
    ServiceBuilder,
};
use tower_http::{catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

static RPC_REQ_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static RPC_REQ_LATENCY: OnceCell<HistogramVec> = OnceCell::new();

fn install_server_metrics() {
    let _ = RPC_REQ_TOTAL.set(
        register_int_counter_vec!(
            "lightnode_rpc_requests_total",
            "Total JSON-RPC requests",
            &["method", "result"]
        )
        .expect("register_int_counter_vec"),
    );
    let _ = RPC_REQ_LATENCY.set(
        register_histogram_vec!(
            "lightnode_rpc_request_duration_seconds",
            "Latency of JSON-RPC requests (seconds)",
            &["method", "result"],
            prometheus::exponential_buckets(0.001, 2.0, 15).expect("buckets")
        )
        .expect("register_histogram_vec"),
    );
}

macro_rules! get_metric {
    ($m:ident) => {
        $m.get().expect("install_server_metrics() must be called before serving")
    };
}

#[derive(Clone)]
struct AppState {
    validator: Arc<Validator>,
    resolver: Arc<Resolver>,
}

async fn rpc_handler(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Json<RpcResponse> {
    let started = Instant::now();
    let request: Request = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return Json(RpcResponse::error(
                json!(null),
                ErrorObject::invalid_request(format!("malformed request: {e}")),
            ));
        }
    };
    let method = request.method.clone();
    let id = request.id.clone();
    let forwarded_for = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok());

    let response = match state.validator.validate(request, Some(remote), forwarded_for).await {
        Ok(validated) => state.resolver.resolve(validated).await,
        Err(error) => RpcResponse::error(id, error),
    };

    let result = if response.error.is_some() { "error" } else { "ok" };
    get_metric!(RPC_REQ_TOTAL).with_label_values(&[&method, result]).inc();
    get_metric!(RPC_REQ_LATENCY)
        .with_label_values(&[&method, result])
        .observe(started.elapsed().as_secs_f64());
    Json(response)
}

async fn metrics_handler() -> ([(axum::http::HeaderName, String); 1], axum::body::Bytes) {
    use prometheus::Encoder as _;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buf = Vec::with_capacity(1 << 16);
    if let Err(e) = encoder.encode(&metric_families, &mut buf) {
        tracing::error!(error = %e, "failed to encode prometheus metrics");
    }
    (
        [(axum::http::header::CONTENT_TYPE, encoder.format_type().to_string())],
        buf.into(),
    )
}

async fn map_middleware_error(err: BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::REQUEST_TIMEOUT,
            Json(json!({ "error": { "code": "TIMEOUT", "message": "request timed out" } })),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": { "code": "OVERLOADED", "message": err.to_string() } })),
        )
    }
}

/// HTTP-surface settings.
pub struct ServerConfig {
    /// The listen address, e.g. `0.0.0.0:5000`.
    pub listen_addr: String,
    /// Request body limit in KiB.
    pub body_limit_kb: usize,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Concurrent in-flight requests before load shedding.
    pub concurrency: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listen_addr: "0.0.0.0:5000".to_string(), body_limit_kb: 1024, timeout_secs: 15, concurrency: 256 }
    }
}

/// Serves the gateway until `shutdown_rx` fires.
pub async fn run_server(
    config: ServerConfig,
    validator: Arc<Validator>,
    resolver: Arc<Resolver>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    install_server_metrics();

    let state = AppState { validator, resolver };
    let app = Router::new()
        .route("/", post(rpc_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        // HandleErrorLayer must wrap the fallible layers to make the
        // service infallible.
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(map_middleware_error))
                .layer(LoadShedLayer::new())
                .layer(ConcurrencyLimitLayer::new(config.concurrency))
                .layer(TimeoutLayer::new(Duration::from_secs(config.timeout_secs))),
        )
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.body_limit_kb * 1024));

    let addr: SocketAddr = config.listen_addr.parse()?;
    tracing::info!(target: "server", "lightnode listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_rx.changed().await.ok();
        tracing::info!(target: "server", "shutting down gracefully");
    });

    if let Err(e) = server.await {
        tracing::error!(target: "server", error = %e, "server error");
    }
    Ok(())
}
