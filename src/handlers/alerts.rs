use axum::{extract::State, response::Json};

use crate::entities::alert;
use crate::services::alerts::ReconcileSummary;
use crate::{ApiResponse, ApiResult, AppState};

pub async fn list_alerts(State(state): State<AppState>) -> ApiResult<Vec<alert::Model>> {
    let alerts = state.services.alerts.list_active().await?;
    Ok(Json(ApiResponse::success(alerts)))
}

/// On-demand reconciliation; the same pass also runs on a timer.
pub async fn reconcile_alerts(State(state): State<AppState>) -> ApiResult<ReconcileSummary> {
    let summary = state.services.alerts.reconcile().await?;
    Ok(Json(ApiResponse::success(summary)))
}
