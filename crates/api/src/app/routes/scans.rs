use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use opsradar_infra::ScanRequest;

use crate::app::errors::json_error;
use crate::app::services::AppServices;

/// Run one scan inline and return its stats.
///
/// A request that fails validation gets a 400 and touches nothing. When every
/// pass failed the stats are still returned, with a 500.
pub async fn run_scan(
    Extension(services): Extension<Arc<AppServices>>,
    Json(request): Json<ScanRequest>,
) -> Response {
    let plan = match services.coordinator.plan(&request) {
        Ok(plan) => plan,
        Err(e) => {
            warn!(error = %e, "scan request rejected");
            return json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string());
        }
    };

    let stats = services.coordinator.run_plan(plan, Utc::now()).await;
    info!(
        success = stats.success,
        new_risks = stats.new_risks(),
        updated_risks = stats.updated_risks(),
        elapsed_ms = stats.elapsed_ms,
        "manual scan finished"
    );

    let status = if stats.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(stats)).into_response()
}

/// Nudge the scheduled runner. Bursts collapse into one pending run.
pub async fn trigger_scan(Extension(services): Extension<Arc<AppServices>>) -> Response {
    let Some(trigger) = services.trigger.as_ref() else {
        return json_error(
            StatusCode::CONFLICT,
            "runner_disabled",
            "scheduled scans are not enabled; set OPSRADAR_SCAN_INTERVAL_SECS",
        );
    };

    let queued = trigger.trigger();
    (StatusCode::ACCEPTED, Json(json!({ "queued": queued }))).into_response()
}
