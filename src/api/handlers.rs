//! HTTP request handlers

use super::sse::status_stream;
use super::types::{
    AcceptedResponse, CatalogParentRequest, ErrorResponse, HelpTextRequest, ReplyRequest, ReplyResponse, StatsResponse,
    StatusRequest, SuccessResponse,
};
use super::AppState;
use crate::catalog::CatalogNode;
use crate::connection::{ConnectionStatus, TransportEvent};
use crate::db::{DbError, Order, OrderMessage, OrderStatus};
use crate::state_machine::render;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Connection status and pairing
        .route("/api/connection", get(get_connection))
        .route("/api/connection/stream", get(stream_connection))
        .route("/api/connection/reauth", post(reauth))
        // Gateway webhook
        .route("/api/transport/events", post(transport_event))
        // Orders
        .route("/api/orders/:id", get(get_order))
        .route("/api/orders/:id/reply", post(reply_to_order))
        .route("/api/orders/:id/status", post(set_order_status))
        // Catalog
        .route("/api/catalog", post(add_catalog_node))
        .route("/api/catalog/:id/parent", post(move_catalog_node))
        // Settings
        .route("/api/settings/help", post(set_help_text))
        .route("/api/stats", get(get_stats))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Connection
// ============================================================

async fn get_connection(State(state): State<AppState>) -> Json<ConnectionStatus> {
    Json(state.connection.status())
}

async fn stream_connection(State(state): State<AppState>) -> impl IntoResponse {
    status_stream(state.connection.subscribe())
}

async fn reauth(State(state): State<AppState>) -> Result<Json<SuccessResponse>, AppError> {
    state
        .connection
        .force_reauth()
        .await
        .map_err(|e| AppError::Unavailable(e.to_string()))?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn transport_event(
    State(state): State<AppState>,
    Json(event): Json<TransportEvent>,
) -> Result<Json<AcceptedResponse>, AppError> {
    state
        .transport_events
        .send(event)
        .await
        .map_err(|_| AppError::Unavailable("Transport event pump is not running".to_string()))?;
    Ok(Json(AcceptedResponse { accepted: true }))
}

// ============================================================
// Orders
// ============================================================

async fn get_order(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Order>, AppError> {
    Ok(Json(state.db.get_order(&id)?))
}

/// Push an operator reply into the customer's chat.
///
/// The reply is recorded on the order only once the transport accepted it;
/// the order then moves to processing.
async fn reply_to_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ReplyRequest>,
) -> Result<Json<ReplyResponse>, AppError> {
    let text = req.text.trim();
    if text.is_empty() {
        return Err(AppError::BadRequest("Please enter a valid message".to_string()));
    }

    let order = state.db.get_order(&id)?;
    let report = state
        .connection
        .send_tracked(&order.user_id, &render::operator_reply(&order.id, text))
        .await;

    let Some(receipt) = report.receipt else {
        tracing::warn!(order_id = %order.id, attempts = report.attempts, "Operator reply not delivered");
        return Err(AppError::Unavailable(
            "Message could not be delivered, the messaging connection is not ready".to_string(),
        ));
    };

    state
        .db
        .append_order_message(&order.id, &OrderMessage::operator(text), OrderStatus::Processing)?;
    tracing::info!(order_id = %order.id, message_id = %receipt.message_id, "Operator reply delivered");

    Ok(Json(ReplyResponse {
        delivered: true,
        message_id: Some(receipt.message_id),
        attempts: report.attempts,
    }))
}

async fn set_order_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.db.set_order_status(&id, req.status)?;
    tracing::info!(order_id = %id, status = %req.status, "Order status updated");
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// Catalog
// ============================================================

async fn add_catalog_node(
    State(state): State<AppState>,
    Json(node): Json<CatalogNode>,
) -> Result<Json<CatalogNode>, AppError> {
    if node.id.trim().is_empty() || node.name.trim().is_empty() {
        return Err(AppError::BadRequest("Catalog nodes need an id and a name".to_string()));
    }
    if node.price.is_some_and(|p| !p.is_finite() || p < 0.0) {
        return Err(AppError::BadRequest("Price must be a non-negative number".to_string()));
    }
    state.db.insert_catalog_node(&node)?;
    tracing::info!(node_id = %node.id, parent_id = ?node.parent_id, "Catalog node added");
    Ok(Json(node))
}

async fn move_catalog_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CatalogParentRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.db.set_catalog_parent(&id, req.parent_id.as_deref())?;
    tracing::info!(node_id = %id, parent_id = ?req.parent_id, "Catalog node moved");
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// Settings and stats
// ============================================================

async fn set_help_text(
    State(state): State<AppState>,
    Json(req): Json<HelpTextRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    let text = req.text.trim();
    if text.is_empty() {
        return Err(AppError::BadRequest("Help text cannot be empty".to_string()));
    }
    state.db.set_help_text(text)?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let counts = state.db.counts()?;
    Ok(Json(StatsResponse {
        counts,
        active_sessions: state.sessions.len().await,
        connection: state.connection.status(),
    }))
}

async fn get_version() -> &'static str {
    concat!("ordering-bot ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

impl From<DbError> for AppError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::OrderNotFound(_) | DbError::CatalogNodeNotFound(_) => AppError::NotFound(e.to_string()),
            DbError::CatalogCycle(_) => AppError::BadRequest(e.to_string()),
            _ => AppError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
