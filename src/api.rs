//! Operator bridge HTTP API
//!
//! Connection status and re-auth for the operator, operator replies into
//! customer chats, and the webhook the messaging gateway pushes events to.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::connection::{ConnectionManager, TransportEvent};
use crate::db::Database;
use crate::session::SessionStore;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub connection: Arc<ConnectionManager>,
    pub db: Database,
    pub sessions: Arc<SessionStore>,
    /// Inbox of the transport's event stream
    pub transport_events: mpsc::Sender<TransportEvent>,
}

impl AppState {
    pub fn new(
        connection: Arc<ConnectionManager>,
        db: Database,
        sessions: Arc<SessionStore>,
        transport_events: mpsc::Sender<TransportEvent>,
    ) -> Self {
        Self {
            connection,
            db,
            sessions,
            transport_events,
        }
    }
}
