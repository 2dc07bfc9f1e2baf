use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use tracing::{error, info};

use vandalwatch_scout::MonitorError;

use super::error_json;
use crate::AppState;

/// Run one monitoring cycle and report what it filed.
///
/// The cycle runs in its own task so a dropped connection does not abort it
/// part-way through a post.
pub async fn api_monitor_run(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let monitor = state.monitor.clone();
    let result = tokio::spawn(async move { monitor.run_cycle().await }).await;

    match result {
        Ok(Ok(report)) => {
            info!("Manual monitor run complete. {report}");
            Json(report.summary()).into_response()
        }
        Ok(Err(MonitorError::AlreadyRunning)) => error_json(
            StatusCode::CONFLICT,
            MonitorError::AlreadyRunning.to_string(),
        ),
        Ok(Err(e)) => {
            error!(error = %e, "Manual monitor run failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            error!(error = %e, "Manual monitor run panicked");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "Monitor run failed")
        }
    }
}
