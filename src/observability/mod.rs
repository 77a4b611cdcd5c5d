//! 可观测性模块
//!
//! Prometheus 指标、追踪初始化以及健康检查端点。

use axum::{
    Json, Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::config::LoggingConfig;

// ===== Metrics =====

/// Application metrics on a private registry
#[derive(Clone)]
pub struct AppMetrics {
    registry: Registry,
    pub questions_total: IntCounter,
    pub question_errors_total: IntCounter,
    pub question_latency_seconds: Histogram,
    pub updates_total: IntCounter,
    pub update_failures_total: IntCounter,
    pub indexed_chunks: IntGauge,
    pub telegram_updates_total: IntCounter,
    pub http_requests_total: IntCounterVec,
}

impl AppMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("ragram".to_string()), None)?;

        let questions_total = IntCounter::new("questions_total", "Questions received")?;
        let question_errors_total =
            IntCounter::new("question_errors_total", "Questions that failed")?;
        let question_latency_seconds = Histogram::with_opts(
            HistogramOpts::new("question_latency_seconds", "Time to answer a question")
                .buckets(vec![0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )?;
        let updates_total = IntCounter::new("updates_total", "Knowledge base updates run")?;
        let update_failures_total =
            IntCounter::new("update_failures_total", "Knowledge base updates that failed")?;
        let indexed_chunks = IntGauge::new("indexed_chunks", "Chunks in the vector index")?;
        let telegram_updates_total =
            IntCounter::new("telegram_updates_total", "Updates received from Telegram")?;
        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP requests served"),
            &["method", "status"],
        )?;

        registry.register(Box::new(questions_total.clone()))?;
        registry.register(Box::new(question_errors_total.clone()))?;
        registry.register(Box::new(question_latency_seconds.clone()))?;
        registry.register(Box::new(updates_total.clone()))?;
        registry.register(Box::new(update_failures_total.clone()))?;
        registry.register(Box::new(indexed_chunks.clone()))?;
        registry.register(Box::new(telegram_updates_total.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;

        Ok(Self {
            registry,
            questions_total,
            question_errors_total,
            question_latency_seconds,
            updates_total,
            update_failures_total,
            indexed_chunks,
            telegram_updates_total,
            http_requests_total,
        })
    }

    /// Record a finished question.
    pub fn record_question(&self, seconds: f64, ok: bool) {
        self.questions_total.inc();
        self.question_latency_seconds.observe(seconds);
        if !ok {
            self.question_errors_total.inc();
        }
    }

    /// Record a finished update and the resulting index size.
    pub fn record_update(&self, ok: bool, chunks: usize) {
        self.updates_total.inc();
        if !ok {
            self.update_failures_total.inc();
        }
        self.indexed_chunks.set(chunks as i64);
    }

    /// Prometheus text exposition format
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!(error = %e, "Failed to encode Prometheus metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

// ===== Health Check =====

/// Health check status
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub uptime_seconds: f64,
    pub checks: Vec<HealthCheck>,
}

/// A single health check
#[derive(Debug, Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: String,
    pub message: Option<String>,
}

/// Recorded outcome of a health check
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    pub name: String,
    pub healthy: bool,
    pub message: String,
}

fn status_label(healthy: bool) -> String {
    if healthy { "healthy" } else { "unhealthy" }.to_string()
}

/// State behind the observability routes
#[derive(Clone)]
pub struct ObservabilityState {
    pub metrics: Arc<AppMetrics>,
    pub health_checks: Arc<Mutex<Vec<HealthCheckResult>>>,
    pub start_time: DateTime<Utc>,
    pub version: String,
}

impl ObservabilityState {
    pub fn new(version: &str, metrics: Arc<AppMetrics>) -> Self {
        Self {
            metrics,
            health_checks: Arc::new(Mutex::new(Vec::new())),
            start_time: Utc::now(),
            version: version.to_string(),
        }
    }

    /// Record a check result, replacing an earlier one with the same name.
    pub async fn set_health_check(&self, result: HealthCheckResult) {
        let mut checks = self.health_checks.lock().await;
        checks.retain(|c| c.name != result.name);
        checks.push(result);
    }

    pub fn uptime_seconds(&self) -> f64 {
        (Utc::now() - self.start_time).num_seconds() as f64
    }
}

// ===== Health Check Handlers =====

pub async fn health_check(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    let checks = state.health_checks.lock().await;
    let all_healthy = checks.iter().all(|c| c.healthy);

    let health_status = HealthStatus {
        status: status_label(all_healthy),
        timestamp: Utc::now().to_rfc3339(),
        version: state.version.clone(),
        uptime_seconds: state.uptime_seconds(),
        checks: checks
            .iter()
            .map(|c| HealthCheck {
                name: c.name.clone(),
                status: status_label(c.healthy),
                message: Some(c.message.clone()),
            })
            .collect(),
    };

    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health_status))
}

pub async fn liveness() -> impl IntoResponse {
    "OK"
}

pub async fn readiness(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    let checks = state.health_checks.lock().await;
    if checks.iter().all(|c| c.healthy) {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Not Ready")
    }
}

pub async fn metrics(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        state.metrics.gather(),
    )
}

pub async fn version(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": state.version,
        "uptime_seconds": state.uptime_seconds(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub fn create_observability_router(state: Arc<ObservabilityState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .route("/metrics", get(metrics))
        .route("/version", get(version))
        .with_state(state)
}

// ===== Request Metrics Middleware =====

/// Count every HTTP request by method and status.
pub async fn metrics_middleware(
    State(state): State<Arc<ObservabilityState>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().to_string();
    let response = next.run(req).await;
    state
        .metrics
        .http_requests_total
        .with_label_values(&[method.as_str(), response.status().as_str()])
        .inc();
    response
}

// ===== Structured Logging =====

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
///
/// When a log directory is configured, JSON lines also go to a daily rolling
/// file; the returned guard must live as long as the process.
pub fn init_tracing(
    config: &LoggingConfig,
) -> Result<Option<WorkerGuard>, tracing_subscriber::util::TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = if config.structured {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .boxed()
    };

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "ragram.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .with(env_filter)
        .try_init()?;

    Ok(guard)
}
