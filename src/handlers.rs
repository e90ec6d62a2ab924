use crate::config::Config;
use crate::errors::{AppError, ResultExt};
use crate::lead_store::LeadStore;
use crate::models::*;
use crate::reconciliation::{reconcile_payload, IntakeContext};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::json;
use std::sync::Arc;

pub const INTAKE_TOKEN_HEADER: &str = "x-intake-token";
pub const DEALER_ID_HEADER: &str = "x-dealer-id";
pub const LEAD_SOURCE_HEADER: &str = "x-lead-source";

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Lead persistence gateway.
    pub store: Arc<dyn LeadStore>,
    /// Application configuration.
    pub config: Config,
}

impl AppState {
    pub fn new(store: Arc<dyn LeadStore>, config: Config) -> Self {
        Self { store, config }
    }
}

/// Health check endpoint.
///
/// Returns the service status, version, and health information.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is healthy"))
)]
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "lead-intake-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /api/v1/leads
///
/// Reconciles one lead submission: inserts a new lead, overwrites a matching
/// older one, or ignores a stale duplicate.
#[utoipa::path(
    post,
    path = "/api/v1/leads",
    request_body(content = serde_json::Value, description = "Lead fields; phone_number and/or email required"),
    responses(
        (status = 201, description = "New lead inserted", body = ReconcileOutcome),
        (status = 200, description = "Existing lead updated or submission ignored", body = ReconcileOutcome),
        (status = 400, description = "Invalid submission"),
        (status = 401, description = "Missing or invalid intake token"),
        (status = 503, description = "Lead store failure")
    )
)]
pub async fn submit_lead(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<LeadPayload>,
) -> Result<(StatusCode, Json<ReconcileOutcome>), AppError> {
    validate_intake_token(&state.config, &headers)?;
    let ctx = intake_context(&headers);

    tracing::info!(request_id = %ctx.request_id, "POST /leads");

    let outcome = reconcile_payload(state.store.as_ref(), &ctx, payload).await?;

    let status = match outcome {
        ReconcileOutcome::Inserted { .. } => StatusCode::CREATED,
        _ => StatusCode::OK,
    };

    Ok((status, Json(outcome)))
}

/// POST /api/v1/leads/batch
///
/// Accepts a single lead object or an array. Items are reconciled in order;
/// a failing item is counted and processing continues with the next one.
#[utoipa::path(
    post,
    path = "/api/v1/leads/batch",
    request_body(content = serde_json::Value, description = "Lead object or array of lead objects"),
    responses(
        (status = 200, description = "Batch processed", body = BatchIntakeResponse),
        (status = 400, description = "Batch too large or malformed"),
        (status = 401, description = "Missing or invalid intake token")
    )
)]
pub async fn submit_batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<LeadIntakePayload>,
) -> Result<Json<BatchIntakeResponse>, AppError> {
    validate_intake_token(&state.config, &headers)?;
    let mut ctx = intake_context(&headers);

    let total_received = payload.len();
    if total_received > state.config.max_batch_size {
        return Err(AppError::BadRequest(format!(
            "Batch of {} leads exceeds the limit of {}",
            total_received, state.config.max_batch_size
        )));
    }

    tracing::info!(
        request_id = %ctx.request_id,
        "Processing {} lead submission(s)",
        total_received
    );

    let mut response = BatchIntakeResponse {
        received: total_received,
        ..Default::default()
    };

    for (idx, item) in payload.into_payloads().into_iter().enumerate() {
        if idx > 0 {
            ctx.stamp_receipt();
        }
        let result = reconcile_payload(state.store.as_ref(), &ctx, item)
            .await
            .with_context(|| format!("Batch item {}", idx));

        if let Err(e) = &result {
            tracing::error!(request_id = %ctx.request_id, "Failed to reconcile lead: {}", e);
        }
        response.record(result);
    }

    tracing::info!(
        request_id = %ctx.request_id,
        "Batch complete: {} received, {} inserted, {} updated, {} ignored, {} failed",
        response.received,
        response.inserted,
        response.updated,
        response.ignored,
        response.failed
    );

    Ok(Json(response))
}

/// GET /api/v1/leads/lookup
///
/// Returns the stored lead matching the given phone number or email.
#[utoipa::path(
    get,
    path = "/api/v1/leads/lookup",
    params(LeadIdentity),
    responses(
        (status = 200, description = "Matching lead", body = StoredLead),
        (status = 400, description = "No identifier given"),
        (status = 404, description = "No lead matches")
    )
)]
pub async fn lookup_lead(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<LeadIdentity>,
) -> Result<Json<StoredLead>, AppError> {
    validate_intake_token(&state.config, &headers)?;

    let identity = LeadIdentity::new(params.phone_number.as_deref(), params.email.as_deref());
    if identity.is_empty() {
        return Err(AppError::BadRequest(
            "At least one identifier required (phone_number or email)".to_string(),
        ));
    }

    let lead = state
        .store
        .find_by_identity(&identity)
        .await?
        .ok_or_else(|| AppError::NotFound("No lead matches the given phone or email".to_string()))?;

    Ok(Json(lead))
}

/// Builds the explicit request context from headers.
fn intake_context(headers: &HeaderMap) -> IntakeContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    IntakeContext::new(header(LEAD_SOURCE_HEADER).unwrap_or_else(|| "api".to_string()))
        .with_dealer(header(DEALER_ID_HEADER))
}

/// Validate the intake token from the X-Intake-Token header
fn validate_intake_token(config: &Config, headers: &HeaderMap) -> Result<(), AppError> {
    // If no token is configured, skip validation (warn was already logged at startup)
    let Some(ref expected) = config.intake_token else {
        return Ok(());
    };

    let token = headers
        .get(INTAKE_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing X-Intake-Token header".to_string()))?;

    if !constant_time_compare(token, expected) {
        tracing::warn!("Invalid intake token received");
        return Err(AppError::Unauthorized("Invalid intake token".to_string()));
    }

    Ok(())
}

/// Constant-time string comparison
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
