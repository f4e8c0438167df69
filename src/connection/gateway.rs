//! HTTP messaging gateway transport
//!
//! Commands go out as JSON POSTs; the gateway pushes events back through the
//! operator bridge webhook, which feeds `event_sink()`.

use super::credentials::Credentials;
use super::types::{DeliveryReceipt, TransportError, TransportEvent};
use crate::runtime::traits::Transport;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

const EVENT_BUFFER: usize = 256;

#[derive(Serialize)]
struct ConnectRequest<'a> {
    credentials: Option<&'a Credentials>,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    to: &'a str,
    text: &'a str,
}

pub struct GatewayTransport {
    client: Client,
    base_url: String,
    events_tx: mpsc::Sender<TransportEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
}

impl GatewayTransport {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        })
    }

    /// Where webhook deliveries should be pushed
    pub fn event_sink(&self) -> mpsc::Sender<TransportEvent> {
        self.events_tx.clone()
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<String, TransportError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Request(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    TransportError::Request(format!("Connection failed: {e}"))
                } else {
                    TransportError::Request(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Request(format!("Failed to read response: {e}")))?;

        classify(status, body)
    }
}

fn classify(status: StatusCode, body: String) -> Result<String, TransportError> {
    match status {
        s if s.is_success() => Ok(body),
        StatusCode::UNAUTHORIZED => Err(TransportError::LoggedOut),
        StatusCode::CONFLICT | StatusCode::SERVICE_UNAVAILABLE => Err(TransportError::NotConnected),
        s => Err(TransportError::Rejected {
            status: s.as_u16(),
            body,
        }),
    }
}

#[async_trait]
impl Transport for GatewayTransport {
    async fn connect(&self, credentials: Option<&Credentials>) -> Result<(), TransportError> {
        self.post("/session/connect", &ConnectRequest { credentials }).await?;
        Ok(())
    }

    async fn send(&self, conversation_id: &str, content: &str) -> Result<DeliveryReceipt, TransportError> {
        let body = self
            .post(
                "/messages",
                &SendRequest {
                    to: conversation_id,
                    text: content,
                },
            )
            .await?;
        serde_json::from_str(&body)
            .map_err(|e| TransportError::Request(format!("Failed to parse receipt: {e} - body: {body}")))
    }

    async fn logout(&self) -> Result<(), TransportError> {
        self.post("/session/logout", &serde_json::json!({})).await?;
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::Receiver<TransportEvent>> {
        match self.events_rx.lock() {
            Ok(mut rx) => rx.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}
