//! Out-of-band order notifications

use crate::runtime::traits::NotificationSink;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Notification rejected with status {status}")]
    Rejected { status: u16 },
}

/// Credentials for the SMS gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsSettings {
    pub url: String,
    pub api_key: String,
    pub sender: String,
    pub recipient: String,
}

#[derive(Serialize)]
struct SmsRequest<'a> {
    api_key: &'a str,
    sender: &'a str,
    recipient: &'a str,
    message: &'a str,
}

/// Sends each notification as an SMS to the operator
pub struct SmsNotifier {
    client: Client,
    settings: SmsSettings,
}

impl SmsNotifier {
    pub fn new(settings: SmsSettings) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self { client, settings })
    }
}

#[async_trait]
impl NotificationSink for SmsNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.settings.url)
            .json(&SmsRequest {
                api_key: &self.settings.api_key,
                sender: &self.settings.sender,
                recipient: &self.settings.recipient,
                message: text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
            });
        }
        tracing::debug!(recipient = %self.settings.recipient, "SMS notification sent");
        Ok(())
    }
}

/// Used when no SMS gateway is configured
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        tracing::info!(notification = %text, "Order notification");
        Ok(())
    }
}
