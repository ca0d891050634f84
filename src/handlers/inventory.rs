use axum::{
    extract::{Path, State},
    response::Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::CallerIdentity;
use crate::entities::{fabric_stock, stock_movement};
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Deserialize, Serialize)]
pub struct AdjustStockRequest {
    pub delta_meters: Decimal,
    pub notes: Option<String>,
}

pub async fn list_fabric(State(state): State<AppState>) -> ApiResult<Vec<fabric_stock::Model>> {
    let stock = state.services.reservations.list_fabric().await?;
    Ok(Json(ApiResponse::success(stock)))
}

pub async fn get_fabric(
    State(state): State<AppState>,
    Path(stock_id): Path<Uuid>,
) -> ApiResult<fabric_stock::Model> {
    let stock = state.services.reservations.get_fabric(stock_id).await?;
    Ok(Json(ApiResponse::success(stock)))
}

pub async fn get_low_stock(State(state): State<AppState>) -> ApiResult<Vec<fabric_stock::Model>> {
    let stock = state.services.reservations.list_low_stock().await?;
    Ok(Json(ApiResponse::success(stock)))
}

pub async fn get_movement_history(
    State(state): State<AppState>,
    Path(stock_id): Path<Uuid>,
) -> ApiResult<Vec<stock_movement::Model>> {
    let movements = state
        .services
        .reservations
        .movement_history(stock_id)
        .await?;
    Ok(Json(ApiResponse::success(movements)))
}

pub async fn adjust_stock(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(stock_id): Path<Uuid>,
    Json(request): Json<AdjustStockRequest>,
) -> ApiResult<stock_movement::Model> {
    let movement = state
        .services
        .reservations
        .adjust_stock(stock_id, request.delta_meters, caller.user_id, request.notes)
        .await?;
    Ok(Json(ApiResponse::success(movement)))
}
