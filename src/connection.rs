//! Messaging transport connection
//!
//! The manager owns the single transport instance: bootstrap and pairing,
//! bounded reconnects, and sends gated on the connection being ready.

mod credentials;
mod gateway;
mod manager;
mod types;

pub use credentials::{CredentialStore, Credentials};
pub use gateway::GatewayTransport;
pub use manager::{ConnectionError, ConnectionManager, ConnectionPolicy};
pub use types::{ConnectionStatus, DeliveryReceipt, DisconnectReason, TransportError, TransportEvent};

#[cfg(test)]
pub use types::ConnectionState;
