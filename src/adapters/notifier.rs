//! Customer notification adapters.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

use crate::ports::{Notification, Notifier, NotifyError};
use crate::utils::sanitize::mask;

/// Writes notifications to the log instead of delivering them. Used when no
/// mail relay is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            to = %mask(notification.recipient()),
            subject = %notification.subject(),
            "Notification not delivered, no mail relay configured"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct EmailMessage<'a> {
    to: &'a str,
    subject: String,
    html: String,
}

/// Posts notifications as e-mails to a mail relay (`POST {base}/api/emails/send`).
#[derive(Clone)]
pub struct HttpNotifier {
    client: Client,
    base_url: String,
}

impl HttpNotifier {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self { client, base_url }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let url = format!("{}/api/emails/send", self.base_url.trim_end_matches('/'));
        let message = EmailMessage {
            to: notification.recipient(),
            subject: notification.subject(),
            html: notification.body(),
        };

        let response = self.client.post(&url).json(&message).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        info!(subject = %message.subject, "Notification sent");
        Ok(())
    }
}
