//! API request and response types

use crate::connection::ConnectionStatus;
use crate::db::{OrderStatus, StoreCounts};
use serde::{Deserialize, Serialize};

/// Operator reply to a customer
#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ReplyResponse {
    pub delivered: bool,
    pub message_id: Option<String>,
    pub attempts: u32,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

/// Move a catalog node; `null` makes it a root
#[derive(Debug, Deserialize)]
pub struct CatalogParentRequest {
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HelpTextRequest {
    pub text: String,
}

/// Response for lifecycle actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Webhook acknowledgement
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub accepted: bool,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub counts: StoreCounts,
    pub active_sessions: usize,
    pub connection: ConnectionStatus,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
