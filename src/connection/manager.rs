//! Owner of the shared transport
//!
//! State changes flow one way: transport events come in through
//! `handle_event`, and the resulting `ConnectionStatus` is published on a
//! watch channel. Nothing else writes the status.

use super::credentials::{CredentialError, CredentialStore};
use super::types::{
    ConnectionState, ConnectionStatus, DeliveryReceipt, DisconnectReason, TransportError, TransportEvent,
};
use crate::runtime::traits::{MessageSender, Transport};
use crate::runtime::InboundMessage;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Retry and reconnect tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionPolicy {
    /// Attempts per outbound message
    pub send_retries: u32,
    /// Attempt n waits n times this before the next one
    pub send_base_delay: Duration,
    /// Consecutive failed reconnects tolerated since the last Open
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub health_interval: Duration,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            send_retries: 3,
            send_base_delay: Duration::from_secs(1),
            max_reconnect_attempts: 3,
            reconnect_delay: Duration::from_secs(1),
            health_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Bootstrap requires a closed connection, current state is {0:?}")]
    NotClosed(ConnectionState),
    #[error("Session was logged out; re-authentication required")]
    LoggedOut,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Outcome of a disconnect notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    Scheduled { attempt: u32 },
    /// Another reconnect is already running
    AlreadyInProgress,
    /// Budget spent; the process should give up
    Exhausted,
    /// Logged out; the operator has to pair again
    Terminal,
}

/// Result of a gated send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub receipt: Option<DeliveryReceipt>,
    pub attempts: u32,
}

#[derive(Default)]
struct ReconnectGuard {
    attempts: u32,
    in_progress: bool,
    task: Option<JoinHandle<()>>,
}

pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    credentials: CredentialStore,
    policy: ConnectionPolicy,
    status_tx: watch::Sender<ConnectionStatus>,
    reconnect: Mutex<ReconnectGuard>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>, credentials: CredentialStore, policy: ConnectionPolicy) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::default());
        Self {
            transport,
            credentials,
            policy,
            status_tx,
            reconnect: Mutex::new(ReconnectGuard::default()),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    fn guard(&self) -> MutexGuard<'_, ReconnectGuard> {
        self.reconnect.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start or resume the transport session. Only valid from `Closed`.
    ///
    /// Without stored credentials the transport starts pairing and the
    /// pairing code shows up in the status once the transport reports it.
    pub async fn bootstrap(&self) -> Result<(), ConnectionError> {
        let mut current = ConnectionState::Closed;
        let mut logged_out = false;
        let claimed = self.status_tx.send_if_modified(|s| {
            current = s.state;
            logged_out = s.logged_out;
            if s.state == ConnectionState::Closed && !s.logged_out {
                s.state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if logged_out {
            return Err(ConnectionError::LoggedOut);
        }
        if !claimed {
            return Err(ConnectionError::NotClosed(current));
        }

        let credentials = match self.credentials.load().await {
            Ok(creds) => creds,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable credentials, pairing from scratch");
                None
            }
        };
        if credentials.is_none() {
            tracing::info!(dir = %self.credentials.dir().display(), "No stored credentials, waiting for pairing");
        }

        if let Err(e) = self.transport.connect(credentials.as_ref()).await {
            tracing::warn!(error = %e, "Transport handshake failed");
            self.status_tx.send_modify(|s| {
                s.state = ConnectionState::Closed;
                s.last_reason = Some(e.to_string());
            });
            return Err(e.into());
        }
        Ok(())
    }

    /// React to the transport closing
    pub async fn on_transport_closed(self: &Arc<Self>, reason: DisconnectReason) -> ReconnectDecision {
        tracing::info!(reason = %reason, "Connection closed");
        self.status_tx.send_modify(|s| {
            s.state = ConnectionState::Closed;
            s.last_reason = Some(reason.to_string());
        });

        if reason.is_terminal() {
            {
                let mut guard = self.guard();
                guard.attempts = 0;
                guard.in_progress = false;
            }
            if let Err(e) = self.clear_credentials().await {
                tracing::error!(error = %e, "Failed to clear credentials after logout");
            }
            self.status_tx.send_modify(|s| {
                s.logged_out = true;
                s.identity = None;
                s.auth_code = None;
                s.reconnect_attempts = 0;
            });
            tracing::warn!("Logged out; re-authentication required");
            return ReconnectDecision::Terminal;
        }

        self.schedule_reconnect()
    }

    fn schedule_reconnect(self: &Arc<Self>) -> ReconnectDecision {
        // Only force_reauth brings a logged-out session back
        if self.status_tx.borrow().logged_out {
            tracing::debug!("Not reconnecting, session is logged out");
            return ReconnectDecision::Terminal;
        }
        let attempt = {
            let mut guard = self.guard();
            if guard.in_progress {
                return ReconnectDecision::AlreadyInProgress;
            }
            if guard.attempts >= self.policy.max_reconnect_attempts {
                drop(guard);
                self.raise_fatal();
                return ReconnectDecision::Exhausted;
            }
            guard.attempts += 1;
            guard.in_progress = true;
            let attempt = guard.attempts;
            let manager = Arc::clone(self);
            guard.task = Some(tokio::spawn(manager.run_reconnect(attempt)));
            attempt
        };

        self.status_tx.send_modify(|s| s.reconnect_attempts = attempt);
        ReconnectDecision::Scheduled { attempt }
    }

    async fn run_reconnect(self: Arc<Self>, attempt: u32) {
        tracing::info!(
            attempt,
            max = self.policy.max_reconnect_attempts,
            delay_ms = u64::try_from(self.policy.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
            "Reconnecting"
        );
        tokio::time::sleep(self.policy.reconnect_delay).await;

        let result = self.bootstrap().await;
        self.guard().in_progress = false;

        match result {
            Ok(()) => {}
            Err(ConnectionError::NotClosed(state)) => {
                tracing::debug!(?state, "Reconnect skipped, connection already moving");
            }
            Err(ConnectionError::LoggedOut) => {
                tracing::debug!("Reconnect skipped, session is logged out");
            }
            Err(ConnectionError::Transport(e)) => {
                tracing::warn!(attempt, error = %e, "Reconnect attempt failed");
                let reason = if e.is_terminal() {
                    DisconnectReason::LoggedOut
                } else {
                    DisconnectReason::transient(e.to_string())
                };
                self.on_transport_closed(reason).await;
            }
        }
    }

    fn raise_fatal(&self) {
        tracing::error!(
            max = self.policy.max_reconnect_attempts,
            "Reconnect attempts exhausted, giving up"
        );
        self.status_tx.send_modify(|s| s.fatal = true);
    }

    fn on_open(&self, identity: Option<String>) {
        self.guard().attempts = 0;
        tracing::info!(identity = identity.as_deref().unwrap_or("unknown"), "Connection open");
        self.status_tx.send_modify(|s| {
            s.state = ConnectionState::Open;
            s.identity = identity;
            s.auth_code = None;
            s.reconnect_attempts = 0;
            s.logged_out = false;
            s.last_reason = None;
        });
    }

    /// Apply one transport event
    pub async fn handle_event(self: &Arc<Self>, event: TransportEvent, inbound_tx: &mpsc::Sender<InboundMessage>) {
        match event {
            TransportEvent::Message { from_me: true, .. } => {}
            TransportEvent::Message {
                conversation_id,
                text,
                from_me: false,
            } => {
                let message = InboundMessage { conversation_id, text };
                if inbound_tx.send(message).await.is_err() {
                    tracing::warn!("Dispatcher gone, dropping inbound message");
                }
            }
            TransportEvent::ConnectionChanged {
                state: ConnectionState::Open,
                identity,
                ..
            } => self.on_open(identity),
            TransportEvent::ConnectionChanged {
                state: ConnectionState::Connecting,
                ..
            } => self.status_tx.send_modify(|s| s.state = ConnectionState::Connecting),
            TransportEvent::ConnectionChanged {
                state: ConnectionState::Closed,
                reason,
                ..
            } => {
                let reason = reason.unwrap_or_else(|| DisconnectReason::transient("connection closed"));
                self.on_transport_closed(reason).await;
            }
            TransportEvent::AuthCode { code } => {
                tracing::info!("Pairing code available for the operator");
                self.status_tx.send_modify(|s| s.auth_code = Some(code));
            }
            TransportEvent::CredentialsUpdated { credentials } => {
                if let Err(e) = self.credentials.save(&credentials).await {
                    tracing::error!(error = %e, "Failed to persist credentials");
                }
            }
        }
    }

    /// Pump transport events until the transport's stream ends
    pub async fn run(self: Arc<Self>, inbound_tx: mpsc::Sender<InboundMessage>) {
        let Some(mut events) = self.transport.take_events() else {
            tracing::error!("Transport event stream already taken");
            return;
        };

        let mut health = tokio::time::interval(self.policy.health_interval);
        health.tick().await;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event, &inbound_tx).await,
                    None => break,
                },
                _ = health.tick() => {
                    let status = self.status();
                    if status.state != ConnectionState::Open {
                        tracing::info!(state = ?status.state, attempts = status.reconnect_attempts, "Connection health check");
                    }
                }
            }
        }
        tracing::info!("Transport event stream ended");
    }

    /// Deliver a message, waiting for the connection to be ready.
    ///
    /// Never fails loudly: after `send_retries` attempts the report simply
    /// carries no receipt.
    pub async fn send_tracked(&self, conversation_id: &str, content: &str) -> SendReport {
        let retries = self.policy.send_retries;
        for attempt in 1..=retries {
            let ready = self.status_tx.borrow().is_ready();
            if ready {
                match self.transport.send(conversation_id, content).await {
                    Ok(receipt) => {
                        tracing::debug!(conv_id = %conversation_id, attempt, "Message sent");
                        return SendReport {
                            receipt: Some(receipt),
                            attempts: attempt,
                        };
                    }
                    Err(e) => {
                        tracing::warn!(conv_id = %conversation_id, attempt, retries, error = %e, "Send failed");
                    }
                }
            } else {
                tracing::debug!(conv_id = %conversation_id, attempt, retries, "Connection not ready");
            }

            if attempt < retries {
                tokio::time::sleep(self.policy.send_base_delay * attempt).await;
            }
        }

        tracing::error!(conv_id = %conversation_id, retries, "Giving up on message");
        SendReport {
            receipt: None,
            attempts: retries,
        }
    }

    /// Drop the current session and start pairing again
    pub async fn force_reauth(self: &Arc<Self>) -> Result<(), ConnectionError> {
        tracing::info!("Forcing re-authentication");
        if let Err(e) = self.transport.logout().await {
            tracing::warn!(error = %e, "Logout before re-authentication failed");
        }
        if let Err(e) = self.clear_credentials().await {
            tracing::error!(error = %e, "Failed to clear credentials");
        }
        {
            let mut guard = self.guard();
            if let Some(task) = guard.task.take() {
                task.abort();
            }
            *guard = ReconnectGuard::default();
        }
        self.status_tx.send_replace(ConnectionStatus::default());
        self.bootstrap().await
    }

    async fn clear_credentials(&self) -> Result<(), CredentialError> {
        self.credentials.clear().await
    }

    /// Wait for any scheduled reconnects to finish
    #[cfg(test)]
    pub async fn settle(&self) {
        loop {
            let task = self.guard().task.take();
            match task {
                Some(task) => {
                    let _ = task.await;
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl MessageSender for ConnectionManager {
    async fn send(&self, conversation_id: &str, content: &str) -> Option<DeliveryReceipt> {
        self.send_tracked(conversation_id, content).await.receipt
    }
}
