//! HTTP surface for the license client: the `/licente` management API and
//! the enforcement middleware a host registers for client installations.

pub mod cli;

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use hearth_license::{
    BootOutcome, DiagnosticReport, EnforcementGate, FailureKind, GateDecision, LicenseManager,
    LicenseOverview, ManagementOutcome,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Body of `POST /licente/upload`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UploadRequest {
    pub license_key: String,
}

/// Optional body of `POST /licente/diagnostic`.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct DiagnosticRequest {
    #[serde(default)]
    pub license_key: Option<String>,
}

/// Body of a blocked request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BlockedResponse {
    pub error: String,
    pub message: String,
}

fn outcome_status(outcome: &ManagementOutcome) -> StatusCode {
    match outcome.failure_kind() {
        None => StatusCode::OK,
        Some(FailureKind::Guarded) => StatusCode::CONFLICT,
        Some(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn outcome_response(outcome: ManagementOutcome) -> Response {
    (outcome_status(&outcome), Json(outcome)).into_response()
}

async fn overview_handler(State(manager): State<Arc<LicenseManager>>) -> Json<LicenseOverview> {
    Json(manager.overview().await)
}

async fn upload_handler(
    State(manager): State<Arc<LicenseManager>>,
    Json(body): Json<UploadRequest>,
) -> Response {
    outcome_response(manager.upload(&body.license_key).await)
}

async fn verify_handler(State(manager): State<Arc<LicenseManager>>) -> Response {
    outcome_response(manager.reverify().await)
}

async fn remove_handler(State(manager): State<Arc<LicenseManager>>) -> Response {
    outcome_response(manager.remove().await)
}

async fn diagnostic_handler(
    State(manager): State<Arc<LicenseManager>>,
    body: Bytes,
) -> Result<Json<DiagnosticReport>, (StatusCode, String)> {
    let request = if body.is_empty() {
        DiagnosticRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    };
    Ok(Json(manager.diagnostic(request.license_key.as_deref()).await))
}

/// Build the `/licente` management router.
pub fn build_router(manager: Arc<LicenseManager>) -> Router {
    Router::new()
        .route("/licente", get(overview_handler).delete(remove_handler))
        .route("/licente/upload", post(upload_handler))
        .route("/licente/verify", post(verify_handler))
        .route("/licente/diagnostic", post(diagnostic_handler))
        .with_state(manager)
}

/// Middleware answering 403 with the fixed block message when the gate
/// refuses a request.
pub async fn enforce_license(
    State(gate): State<Arc<EnforcementGate>>,
    request: Request,
    next: Next,
) -> Response {
    match gate.check(request.uri().path()).await {
        GateDecision::Allow => next.run(request).await,
        GateDecision::Block(reason) => {
            debug!(path = %request.uri().path(), reason = reason.code(), "Request blocked");
            let body = BlockedResponse {
                error: reason.code().to_string(),
                message: reason.message().to_string(),
            };
            (StatusCode::FORBIDDEN, Json(body)).into_response()
        }
    }
}

/// Wraps `router` in [`enforce_license`] unless this installation is the
/// authority.
pub fn protect(router: Router, boot: &BootOutcome) -> Router {
    match boot.gate() {
        Some(gate) => router.layer(middleware::from_fn_with_state(
            Arc::new(gate.clone()),
            enforce_license,
        )),
        None => router,
    }
}
