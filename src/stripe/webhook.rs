//! Webhook signature verification.
//!
//! The `Stripe-Signature` header carries `t=<unix seconds>` and one or more
//! `v1=<hex>` entries. Each `v1` is an HMAC-SHA256 of `"{t}.{raw body}"`
//! keyed with the endpoint's signing secret.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

use super::events::WebhookEvent;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("webhook signing secret is not configured")]
    MissingSecret,

    #[error("malformed signature header: {0}")]
    MalformedHeader(&'static str),

    #[error("timestamp outside the tolerance window")]
    StaleTimestamp,

    #[error("no signatures found matching the expected signature for payload")]
    SignatureMismatch,

    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance: Duration,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance: Duration) -> Self {
        Self {
            secret: secret.into(),
            tolerance,
        }
    }

    /// Verifies `header` against `payload` and decodes the event.
    pub fn verify(
        &self,
        payload: &[u8],
        header: &str,
        now: DateTime<Utc>,
    ) -> Result<WebhookEvent, WebhookError> {
        if self.secret.is_empty() {
            return Err(WebhookError::MissingSecret);
        }

        let parsed = ParsedHeader::parse(header)?;

        let tolerance = i64::try_from(self.tolerance.as_secs()).unwrap_or(i64::MAX);
        let skew = now
            .timestamp()
            .checked_sub(parsed.timestamp)
            .and_then(i64::checked_abs)
            .ok_or(WebhookError::StaleTimestamp)?;
        if skew > tolerance {
            return Err(WebhookError::StaleTimestamp);
        }

        let matched = parsed
            .signatures
            .iter()
            .any(|candidate| self.matches(parsed.timestamp, payload, candidate));
        if !matched {
            return Err(WebhookError::SignatureMismatch);
        }

        Ok(serde_json::from_slice(payload)?)
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes()).ok()?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Some(mac)
    }

    fn matches(&self, timestamp: i64, payload: &[u8], candidate: &str) -> bool {
        let Ok(expected) = hex::decode(candidate) else {
            return false;
        };
        self.mac(timestamp, payload)
            .map(|mac| mac.verify_slice(&expected).is_ok())
            .unwrap_or(false)
    }

    /// Produces a header value for `payload`, as the gateway would send it.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
        let signature = self
            .mac(timestamp, payload)
            .map(|mac| hex::encode(mac.finalize().into_bytes()))
            .unwrap_or_default();
        format!("t={},v1={}", timestamp, signature)
    }
}

struct ParsedHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

impl<'a> ParsedHeader<'a> {
    fn parse(header: &'a str) -> Result<Self, WebhookError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for item in header.split(',') {
            let Some((key, value)) = item.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    timestamp = Some(
                        value
                            .parse::<i64>()
                            .map_err(|_| WebhookError::MalformedHeader("timestamp is not an integer"))?,
                    )
                }
                "v1" => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(WebhookError::MalformedHeader("missing timestamp"))?;
        if signatures.is_empty() {
            return Err(WebhookError::MalformedHeader("no v1 signature"));
        }
        Ok(Self {
            timestamp,
            signatures,
        })
    }
}
