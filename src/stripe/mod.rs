pub mod client;
pub mod events;
pub mod webhook;

pub use client::StripeClient;
pub use events::GatewayEvent;
pub use webhook::{WebhookError, WebhookVerifier};
