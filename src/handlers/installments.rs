use axum::{
    extract::{Path, State},
    response::Json,
};
use uuid::Uuid;

use crate::auth::CallerIdentity;
use crate::entities::payment_installment;
use crate::services::installments::{CreatePlanRequest, OrderInstallments, RecordPaymentRequest};
use crate::{ApiResponse, ApiResult, AppState};

pub async fn list_order_installments(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<OrderInstallments> {
    let installments = state.services.installments.list_for_order(order_id).await?;
    Ok(Json(ApiResponse::success(installments)))
}

pub async fn create_plan(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(order_id): Path<Uuid>,
    Json(request): Json<CreatePlanRequest>,
) -> ApiResult<Vec<payment_installment::Model>> {
    let created = state
        .services
        .installments
        .create_plan(caller, order_id, request)
        .await?;
    Ok(Json(ApiResponse::success(created)))
}

pub async fn record_payment(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(installment_id): Path<Uuid>,
    Json(request): Json<RecordPaymentRequest>,
) -> ApiResult<payment_installment::Model> {
    let updated = state
        .services
        .installments
        .record_payment(caller, installment_id, request)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}
