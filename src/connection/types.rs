//! Connection and transport types

use super::credentials::Credentials;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle of the shared transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Closed,
    Connecting,
    Open,
}

/// Everything the operator needs to know about the connection
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Account the transport is authenticated as
    pub identity: Option<String>,
    /// Pairing code waiting to be scanned
    pub auth_code: Option<String>,
    pub reconnect_attempts: u32,
    /// Set after a terminal logout; cleared by re-authentication
    pub logged_out: bool,
    /// Reconnect budget exhausted
    pub fatal: bool,
    pub last_reason: Option<String>,
}

impl ConnectionStatus {
    /// Sends are only attempted when this holds
    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Open && self.identity.is_some()
    }
}

/// Why the transport closed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisconnectReason {
    /// Session revoked; needs a new pairing
    LoggedOut,
    Transient {
        #[serde(default)]
        detail: String,
    },
}

impl DisconnectReason {
    pub fn transient(detail: impl Into<String>) -> Self {
        DisconnectReason::Transient {
            detail: detail.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DisconnectReason::LoggedOut)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::LoggedOut => f.write_str("logged out"),
            DisconnectReason::Transient { detail } if detail.is_empty() => f.write_str("transient disconnect"),
            DisconnectReason::Transient { detail } => write!(f, "transient disconnect: {detail}"),
        }
    }
}

/// Events emitted by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    Message {
        conversation_id: String,
        text: String,
        /// Echo of something we sent
        #[serde(default)]
        from_me: bool,
    },
    ConnectionChanged {
        state: ConnectionState,
        #[serde(default)]
        identity: Option<String>,
        #[serde(default)]
        reason: Option<DisconnectReason>,
    },
    AuthCode {
        code: String,
    },
    CredentialsUpdated {
        credentials: Credentials,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub message_id: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transport request failed: {0}")]
    Request(String),
    #[error("Transport rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Transport is not connected")]
    NotConnected,
    #[error("Transport session was logged out")]
    LoggedOut,
}

impl TransportError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportError::LoggedOut)
    }
}
