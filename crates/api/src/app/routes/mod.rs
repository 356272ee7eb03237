use axum::{Router, routing::post};

pub mod scans;
pub mod system;

/// Routes that need [`AppServices`](super::AppServices) in an extension.
pub fn router() -> Router {
    Router::new()
        .route("/v1/scans", post(scans::run_scan))
        .route("/v1/scans/trigger", post(scans::trigger_scan))
}
