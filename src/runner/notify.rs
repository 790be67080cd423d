//! Terminal-condition alerting.
//!
//! `NotificationGate` wraps an `AlertSink` with the once-per-run latch:
//! the `alert_sent` flag on the run state is flipped under the state lock
//! before the sink is invoked, so a second caller can never reach the
//! sink. Send failures are logged and never un-latch (no retry).
//!
//! The concrete sink posts to the Resend email API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::log::EventLog;
use crate::types::RunState;

const RESEND_EMAILS_URL: &str = "https://api.resend.com/emails";

/// Out-of-band alert delivery.
///
/// Returns Ok(true) when the alert was delivered, Ok(false) when delivery
/// was skipped (e.g. no API key configured), Err on delivery failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// Resend sink
// ---------------------------------------------------------------------------

pub struct ResendClient {
    http: Client,
    api_key: Option<SecretString>,
    from: String,
    to: String,
}

impl ResendClient {
    pub fn new(api_key: Option<SecretString>, from: &str, to: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .context("Failed to build alert HTTP client")?;
        Ok(Self {
            http,
            api_key,
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[async_trait]
impl AlertSink for ResendClient {
    async fn send(&self, subject: &str, body: &str) -> Result<bool> {
        let Some(api_key) = &self.api_key else {
            tracing::warn!("Alert API key not configured; skipping stop alert email");
            return Ok(false);
        };

        let payload = json!({
            "from": self.from,
            "to": [self.to],
            "subject": subject,
            "text": body,
        });

        let resp = self
            .http
            .post(RESEND_EMAILS_URL)
            .bearer_auth(api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .context("Alert email request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Alert email rejected: HTTP {status} {text}");
        }
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Notification gate
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct NotificationGate {
    sink: Arc<dyn AlertSink>,
}

impl NotificationGate {
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self { sink }
    }

    /// Send the stop alert at most once per run.
    ///
    /// Only alerts when the run ended with an expired credential or an
    /// error, or when `force` is set (graceful-completion alerting).
    /// Returns true only when the sink reports delivery.
    pub async fn notify_once(
        &self,
        state: &Mutex<RunState>,
        log: &EventLog,
        reason: &str,
        force: bool,
    ) -> bool {
        // Latch under the state lock, before any await.
        let expired = {
            let mut st = state.lock().unwrap();
            if st.alert_sent {
                return false;
            }
            let should_send = force || st.credential_expired || st.error.is_some();
            if !should_send {
                return false;
            }
            st.alert_sent = true;
            st.credential_expired
        };

        let subject = if expired {
            "Bot stopped: session key expired"
        } else {
            "Bot stopped"
        };
        let body = format!(
            "The bot has stopped and requires attention.\nReason: {reason}\n\nPlease create a new session key."
        );

        match self.sink.send(subject, &body).await {
            Ok(true) => {
                log.info("Stop alert email sent");
                true
            }
            Ok(false) => false,
            Err(e) => {
                log.error(format!("Failed to send stop alert email: {e}"));
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
