use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    addrparse,
    error::{CoreError, InputError, StoreError},
    history,
    scheduler::{ScanScheduler, SchedulerState, SchedulerStatus, TickOutcome},
    types::{record_matches, AddressRecord, StatusFilter, SummaryStats},
};

#[derive(Clone)]
pub struct AppState {
    scheduler: Arc<ScanScheduler>,
}

/// JSON envelope shared by every endpoint.
#[derive(Debug, Serialize)]
struct Envelope<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn ok<T: Serialize>(data: T) -> Response {
    ok_with(StatusCode::OK, data, None)
}

fn ok_with<T: Serialize>(status: StatusCode, data: T, message: Option<String>) -> Response {
    let body = Envelope {
        success: true,
        data: Some(data),
        message,
        error: None,
    };
    (status, Json(body)).into_response()
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        let body: Envelope<()> = Envelope {
            success: false,
            data: None,
            message: None,
            error: Some(msg),
        };
        (status, Json(body)).into_response()
    }
}

impl From<InputError> for ApiError {
    fn from(e: InputError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        error!(error = %e, "store failure");
        ApiError::Internal(e.to_string())
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Input(e) => e.into(),
            CoreError::Persistence(e) => e.into(),
            other => {
                error!(error = %other, "operation failed");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: StatusFilter,
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub input: String,
    #[serde(default)]
    pub default_prefix: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NotesRequest {
    pub ip: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddressQuery {
    pub ip: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PingRequest {
    pub ip: String,
}

#[derive(Debug, Deserialize)]
pub struct BulkPingRequest {
    pub ips: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ScanInfo {
    #[serde(flatten)]
    pub status: SchedulerStatus,
    pub summary: SummaryStats,
}

/// Build the `/api` router around a scheduler.
pub fn router(scheduler: Arc<ScanScheduler>) -> Router {
    let state = AppState { scheduler };

    let api = Router::new()
        .route("/ips", get(list_ips).post(add_ips).patch(update_notes).delete(delete_ip))
        .route("/ips/clear", delete(clear_ips))
        .route("/ping", post(ping_one))
        .route("/ping/bulk", post(ping_bulk))
        .route("/scan", post(start_scan))
        .route("/scan-info", get(scan_info))
        .route("/history", get(get_history))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}

/// Serve the admin API until `cancel` fires.
pub async fn spawn_server(
    bind: &str,
    scheduler: Arc<ScanScheduler>,
    cancel: CancellationToken,
) -> Result<()> {
    let app = router(scheduler);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, "admin API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

async fn list_ips(
    State(app): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let records = app.scheduler.records().list_all().await?;
    let filtered: Vec<AddressRecord> = records
        .into_iter()
        .filter(|r| record_matches(r, query.status, query.q.as_deref()))
        .collect();
    Ok(ok(filtered))
}

async fn add_ips(
    State(app): State<AppState>,
    Json(req): Json<AddRequest>,
) -> Result<Response, ApiError> {
    let max = app.scheduler.config().max_addresses_per_request;
    let addresses =
        addrparse::validated_addresses(&req.input, req.default_prefix.as_deref(), max)?;
    let records = app
        .scheduler
        .records()
        .upsert_many(&addresses, req.notes.as_deref())
        .await?;
    info!(count = addresses.len(), "addresses registered");
    Ok(ok_with(
        StatusCode::OK,
        records,
        Some(format!("{} address(es) submitted", addresses.len())),
    ))
}

async fn update_notes(
    State(app): State<AppState>,
    Json(req): Json<NotesRequest>,
) -> Result<Response, ApiError> {
    let found = app
        .scheduler
        .records()
        .update_notes(&req.ip, req.notes)
        .await?;
    if !found {
        return Err(ApiError::NotFound(format!("unknown address: {}", req.ip)));
    }
    let record = app.scheduler.records().get(&req.ip).await?;
    Ok(ok(record))
}

async fn delete_ip(
    State(app): State<AppState>,
    Query(query): Query<AddressQuery>,
) -> Result<Response, ApiError> {
    let Some(ip) = query.ip.filter(|ip| !ip.trim().is_empty()) else {
        return Err(ApiError::BadRequest("missing ip".into()));
    };
    if !app.scheduler.records().remove(&ip).await? {
        return Err(ApiError::NotFound(format!("unknown address: {ip}")));
    }
    let records = app.scheduler.records().list_all().await?;
    Ok(ok(records))
}

async fn clear_ips(State(app): State<AppState>) -> Result<Response, ApiError> {
    app.scheduler.records().clear_all().await?;
    info!("all addresses cleared");
    Ok(ok(Vec::<AddressRecord>::new()))
}

async fn ping_one(
    State(app): State<AppState>,
    Json(req): Json<PingRequest>,
) -> Result<Response, ApiError> {
    let outcome = app.scheduler.probe_one(req.ip.trim()).await?;
    Ok(ok(outcome))
}

async fn ping_bulk(
    State(app): State<AppState>,
    Json(req): Json<BulkPingRequest>,
) -> Result<Response, ApiError> {
    let outcomes = app.scheduler.probe_batch(&req.ips).await?;
    Ok(ok(outcomes))
}

async fn start_scan(State(app): State<AppState>) -> Result<Response, ApiError> {
    if app.scheduler.state() == SchedulerState::Scanning {
        return Err(ApiError::Conflict("a scan is already running".into()));
    }

    // Spawn scan task
    let scheduler = app.scheduler.clone();
    tokio::spawn(async move {
        match scheduler.run_now().await {
            Ok(TickOutcome::Busy) => info!("forced scan skipped: another cycle is running"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "forced scan failed"),
        }
    });

    let status = app.scheduler.status().await?;
    Ok(ok_with(StatusCode::ACCEPTED, status, None))
}

async fn scan_info(State(app): State<AppState>) -> Result<Response, ApiError> {
    let status = app.scheduler.status().await?;
    let records = app.scheduler.records().list_all().await?;
    Ok(ok(ScanInfo {
        status,
        summary: SummaryStats::from_records(&records),
    }))
}

async fn get_history(
    State(app): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let records = app.scheduler.records().list_all().await?;
    Ok(ok(history::timeline(&records, query.status, query.q.as_deref())))
}
