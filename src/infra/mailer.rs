//! Outbound mail delivery through an HTTP relay.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("mail relay rejected the message with status {status}")]
    Relay { status: u16 },
    #[error("mail transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mail delivery is not configured")]
    Disabled,
}

#[async_trait]
pub trait AlertMailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), MailerError>;
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Posts messages as JSON to a relay endpoint.
pub struct HttpRelayMailer {
    client: reqwest::Client,
    relay_url: String,
    from: String,
}

impl HttpRelayMailer {
    pub fn new(relay_url: String, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            relay_url,
            from,
        }
    }
}

#[async_trait]
impl AlertMailer for HttpRelayMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), MailerError> {
        let response = self
            .client
            .post(&self.relay_url)
            .json(&RelayMessage {
                from: &self.from,
                to,
                subject,
                html,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MailerError::Relay {
                status: status.as_u16(),
            });
        }
        debug!(%to, "alert mail relayed");
        Ok(())
    }
}

/// Stand-in used when no relay is configured; every send fails so dispatch
/// reports the misconfiguration per recipient instead of crashing.
pub struct DisabledMailer;

#[async_trait]
impl AlertMailer for DisabledMailer {
    async fn send(&self, _to: &str, _subject: &str, _html: &str) -> Result<(), MailerError> {
        Err(MailerError::Disabled)
    }
}
