//! Meridian marketplace control-plane daemon (development mode).
//!
//! Wires the control plane against the in-memory store and bus, registers
//! the development providers, spawns the outbox relay and reconciliation
//! sweeper on their intervals, and serves the submission API:
//!
//! - `POST /v1/jobs` - submit a job (honors `Idempotency-Key`)
//! - `GET /v1/jobs/{id}` - fetch a job's current state
//! - `POST /v1/jobs/{id}/io` - allocate I/O locations for a job
//! - `GET /health` - liveness

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use meridian_core::observability::{init_logging, LogFormat};
use meridian_core::{JobId, UserId};
use meridian_market::bus::memory::InMemoryBus;
use meridian_market::config::MarketConfig;
use meridian_market::error::{Error, Result};
use meridian_market::idempotency::SubmissionKeys;
use meridian_market::io_urls::IoUrlAllocator;
use meridian_market::job::Job;
use meridian_market::ledger::Ledger;
use meridian_market::orchestrator::JobOrchestrator;
use meridian_market::outbox::OutboxRelay;
use meridian_market::provider::fake::FakeProvider;
use meridian_market::provider::http::HttpProvider;
use meridian_market::provider::ProviderRegistry;
use meridian_market::quotes::{QuoteService, StaticQuoteFetcher};
use meridian_market::selection::BalancedPolicy;
use meridian_market::store::memory::InMemoryStore;
use meridian_market::sweeper::ReconciliationSweeper;

const IDEMPOTENCY_HEADER: &str = "idempotency-key";

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<JobOrchestrator>,
    keys: SubmissionKeys,
    io_urls: IoUrlAllocator,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
    user_id: UserId,
    #[serde(default)]
    agent_spec: serde_json::Value,
    #[serde(default)]
    resource_hint: serde_json::Value,
    #[serde(default)]
    max_budget: Option<Decimal>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    job_id: JobId,
    status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobResponse {
    job_id: JobId,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let status = match &error {
            Error::JobNotFound { .. } => StatusCode::NOT_FOUND,
            Error::EmptyQuoteSet { .. }
            | Error::ProviderNotRegistered { .. }
            | Error::Provider { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

async fn health_handler() -> StatusCode {
    StatusCode::OK
}

async fn submit_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SubmitRequest>,
) -> std::result::Result<Json<SubmitResponse>, ApiError> {
    let idem_key = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    if let Some(key) = &idem_key {
        if let Some(job_id) = state.keys.find(key).await? {
            let job = state.orchestrator.get(job_id).await?;
            return Ok(Json(SubmitResponse {
                job_id: job.id,
                status: job.status.to_string(),
            }));
        }
    }

    let job = Job::new(req.user_id, req.agent_spec, req.resource_hint, req.max_budget);
    let job = state.orchestrator.submit(job).await?;

    if let Some(key) = &idem_key {
        state.keys.remember(key, job.id).await?;
    }

    Ok(Json(SubmitResponse {
        job_id: job.id,
        status: job.status.to_string(),
    }))
}

async fn get_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Json<JobResponse>, ApiError> {
    let job_id: JobId = id.parse().map_err(Error::from)?;
    let job = state.orchestrator.get(job_id).await?;
    Ok(Json(JobResponse {
        job_id: job.id,
        status: job.status.to_string(),
        provider: job.provider,
    }))
}

async fn io_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Json<meridian_market::io_urls::IoUrls>, ApiError> {
    let job_id: JobId = id.parse().map_err(Error::from)?;
    // The job must exist before locations are handed out.
    state.orchestrator.get(job_id).await?;
    Ok(Json(state.io_urls.allocate(job_id)))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn resolve_port() -> Result<u16> {
    if let Ok(port) = std::env::var("MERIDIAN_PORT") {
        return port
            .parse::<u16>()
            .map_err(|_| Error::configuration("invalid MERIDIAN_PORT"));
    }
    Ok(8080)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(LogFormat::from_env_value(
        optional_env("MERIDIAN_LOG_FORMAT").as_deref(),
    ));

    let config = MarketConfig::from_env()?;
    let port = resolve_port()?;

    let store = Arc::new(InMemoryStore::new());
    let bus = Arc::new(InMemoryBus::new());

    // Only quote providers that actually have a registered client.
    let mut providers = ProviderRegistry::new();
    let mut offers = vec![("fake".to_string(), 0.50, 800.0, 0.98)];
    providers.register("fake", Arc::new(FakeProvider::new()));
    if let Some(base_url) = optional_env("MERIDIAN_RUNPOD_BASE_URL") {
        providers.register("runpod", Arc::new(HttpProvider::new("runpod", base_url)?));
        offers.push(("runpod".to_string(), 0.62, 650.0, 0.97));
    }
    tracing::info!(providers = ?providers.labels(), "providers registered");

    let quotes = Arc::new(QuoteService::new(
        Arc::new(StaticQuoteFetcher::with_offers(offers)),
        config.quote_ttl,
        config.quote_cache_capacity,
    ));

    let orchestrator = Arc::new(JobOrchestrator::new(
        store.clone(),
        Ledger::new(store.clone()),
        quotes,
        Arc::new(BalancedPolicy),
        providers,
        config.clone(),
    ));

    let relay = OutboxRelay::new(store.clone(), bus, config.relay_batch_size);
    tokio::spawn(relay.run(config.relay_interval));

    let sweeper = ReconciliationSweeper::new(store.clone(), config.queued_stale_after);
    tokio::spawn(sweeper.run(config.sweeper_interval));

    let state = AppState {
        orchestrator,
        keys: SubmissionKeys::new(store),
        io_urls: IoUrlAllocator::new(
            optional_env("MERIDIAN_STORAGE_BASE_URL")
                .unwrap_or_else(|| "https://storage.internal".to_string()),
        ),
    };

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/v1/jobs", post(submit_handler))
        .route("/v1/jobs/{id}", get(get_handler))
        .route("/v1/jobs/{id}/io", post(io_handler))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(address = %addr, "starting control-plane daemon");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::configuration(format!("failed to bind: {e}")))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| Error::configuration(format!("server error: {e}")))
}
