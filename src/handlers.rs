use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use moka::future::Cache;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::errors::{AppError, NavError};
use crate::handoff::{HandoffOrchestrator, HandoffRequest};
use crate::models::OfferDetails;
use crate::status::CreditRequestStatus;
use crate::store::CreditRequestStore;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CreditRequestStore>,
    pub orchestrator: Arc<HandoffOrchestrator>,
    /// Credit request ids with a handoff in flight, valued with the unix
    /// timestamp the handoff started at. NAV has no idempotency key, so a
    /// second concurrent handoff would create a duplicate customer.
    pub handoffs_in_flight: Cache<i64, i64>,
}

/// States a request must be in before it is handed to NAV.
const HANDOFF_READY: [CreditRequestStatus; 2] =
    [CreditRequestStatus::Approved, CreditRequestStatus::Signed];

#[derive(Debug, Deserialize)]
pub struct NavHandoffBody {
    pub created_by: String,
    pub locality_name: String,
    #[serde(default)]
    pub offer_details: Option<OfferDetails>,
    pub vendor_id: String,
}

/// Routes behind the rate limiter.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/api/v1/credit-requests/:id/nav-handoff",
        post(nav_handoff),
    )
}

/// Routes that bypass the rate limiter.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "credit-nav-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /api/v1/credit-requests/:id/nav-handoff
///
/// Creates the NAV customer and contract for an approved or signed request.
/// Answers `{"navClient", "navContract"}` on success and `{"error"}` with
/// HTTP 500 when the handoff fails.
pub async fn nav_handoff(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<NavHandoffBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    tracing::info!("POST /credit-requests/{}/nav-handoff", id);

    // A missing request is left to the orchestrator, which reports it.
    let credit_request = state.store.load(id).await?;
    if let Some(cr) = &credit_request {
        if !HANDOFF_READY.contains(&cr.status()) {
            return Err(NavError::InvalidRequestState(format!(
                "credit request {} is {}, only approved or signed requests go to NAV",
                id,
                cr.status()
            ))
            .into());
        }
    }

    let now = chrono::Utc::now().timestamp();
    let entry = state
        .handoffs_in_flight
        .entry(id)
        .or_insert_with(async move { now })
        .await;
    if !entry.is_fresh() {
        tracing::warn!(
            "Duplicate handoff blocked: credit request {} in flight since {}",
            id,
            entry.value()
        );
        return Err(AppError::Conflict(format!(
            "NAV handoff for credit request {} is already running",
            id
        )));
    }

    // Detached from the request future: once a NAV customer exists the
    // handoff must finish or compensate even if the caller hangs up.
    let orchestrator = state.orchestrator.clone();
    let in_flight = state.handoffs_in_flight.clone();
    let handoff = tokio::spawn(async move {
        let outcome = orchestrator
            .run(HandoffRequest {
                credit_request,
                offer_details: body.offer_details,
                created_by: body.created_by,
                locality_name: body.locality_name,
                vendor_id: body.vendor_id,
            })
            .await;
        in_flight.invalidate(&id).await;
        outcome
    });

    let success = match handoff.await {
        Ok(outcome) => outcome?,
        Err(e) => {
            state.handoffs_in_flight.invalidate(&id).await;
            return Err(AppError::InternalError(format!(
                "NAV handoff task for credit request {} aborted: {}",
                id, e
            )));
        }
    };
    Ok(Json(success.to_json()))
}
