use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use uuid::Uuid;

use crate::auth::CallerIdentity;
use crate::entities::{order, order_item};
use crate::services::order_items::{UpdateOrderItemRequest, UpdatedOrderItem};
use crate::services::order_split::{SplitOrderRequest, SplitOutcome};
use crate::services::orders::{ApplyDiscountRequest, OrderDetail, OrderListResponse};
use crate::{ApiResponse, ApiResult, AppState, ListQuery};

pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<OrderListResponse> {
    let response = state
        .services
        .orders
        .list_orders(query.page, query.limit, query.status)
        .await?;
    Ok(Json(ApiResponse::success(response)))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<OrderDetail> {
    let detail = state.services.orders.get_order(order_id).await?;
    Ok(Json(ApiResponse::success(detail)))
}

pub async fn get_order_items(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Vec<order_item::Model>> {
    let detail = state.services.orders.get_order(order_id).await?;
    Ok(Json(ApiResponse::success(detail.items)))
}

pub async fn update_order_item(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((order_id, item_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateOrderItemRequest>,
) -> ApiResult<UpdatedOrderItem> {
    let updated = state
        .services
        .order_items
        .update_item(caller, order_id, item_id, request)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn split_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(order_id): Path<Uuid>,
    Json(request): Json<SplitOrderRequest>,
) -> ApiResult<SplitOutcome> {
    let outcome = state
        .services
        .order_split
        .split(caller, order_id, request)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

pub async fn apply_discount(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(order_id): Path<Uuid>,
    Json(request): Json<ApplyDiscountRequest>,
) -> ApiResult<order::Model> {
    let updated = state
        .services
        .orders
        .apply_discount(caller, order_id, request)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}
