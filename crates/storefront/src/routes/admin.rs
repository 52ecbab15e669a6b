//! Operator routes. Every handler requires an admin session.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use marigold_core::{Order, OrderId, OrderStatus, RefundStatus};

use crate::db::OrderFilter;
use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::routes::extract::{AppJson, AppPath, AppQuery};
use crate::services::{AdminOrderService, AdminOrderUpdate, BulkStatusResult};
use crate::state::AppState;

/// Body of `POST /admin/orders/bulk-status`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkStatusRequest {
    pub order_ids: Vec<OrderId>,
    pub status: OrderStatus,
}

#[derive(Debug, Serialize)]
pub struct BulkStatusResponse {
    pub results: Vec<BulkStatusResult>,
}

/// Body of `PUT /admin/orders/{id}/refund`.
#[derive(Debug, Deserialize)]
pub struct RefundResolution {
    pub status: RefundStatus,
}

#[instrument(skip(state, _admin))]
pub async fn index(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    AppQuery(filter): AppQuery<OrderFilter>,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(AdminOrderService::new(state.orders()).list(&filter).await?))
}

#[instrument(skip(state, _admin))]
pub async fn show(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    AppPath(id): AppPath<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(AdminOrderService::new(state.orders()).get(id).await?))
}

/// Move status forward and/or edit tracking details.
#[instrument(skip(state, admin, update), fields(admin_id = %admin.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    AppPath(id): AppPath<OrderId>,
    AppJson(update): AppJson<AdminOrderUpdate>,
) -> Result<Json<Order>> {
    let order = AdminOrderService::new(state.orders())
        .update(id, &update)
        .await?;
    Ok(Json(order))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
pub async fn resolve_refund(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    AppPath(id): AppPath<OrderId>,
    AppJson(body): AppJson<RefundResolution>,
) -> Result<Json<Order>> {
    let order = AdminOrderService::new(state.orders())
        .resolve_refund(id, body.status)
        .await?;
    Ok(Json(order))
}

/// Apply one status to many orders. Responds 207 when any order failed.
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id, status = ?body.status))]
pub async fn bulk_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    AppJson(body): AppJson<BulkStatusRequest>,
) -> Result<(StatusCode, Json<BulkStatusResponse>)> {
    let results = AdminOrderService::new(state.orders())
        .bulk_status(&body.order_ids, body.status)
        .await?;

    let status = if results.iter().all(|r| r.success) {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };
    Ok((status, Json(BulkStatusResponse { results })))
}
