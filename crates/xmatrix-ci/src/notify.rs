//! Failure notifications.
//!
//! A notification is sent only when the aggregate summary failed. Delivery
//! problems are reported to the caller, which logs them; they never change
//! the verdict of the run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;
use xmatrix_core::{AggregateSummary, MatrixError};

use crate::config::RunOptions;

/// Message dispatched on aggregate failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationMessage {
    /// `None` when the matrix configures no recipient; the channel decides.
    pub recipient: Option<String>,
    pub subject: String,
    pub body: String,
    pub build_id: String,
    pub build_url: Option<String>,
}

impl NotificationMessage {
    /// Compose the failure message for a summary.
    pub fn for_failure(summary: &AggregateSummary, opts: &RunOptions) -> Self {
        let subject = format!("xmatrix build {} failed", opts.build_id);

        let mut body = format!(
            "Build {} failed: {} of {} target(s) failing, {} missing report(s).\n",
            opts.build_id,
            summary.failing_targets().len(),
            summary.targets.len(),
            summary.missing
        );
        for name in summary.failing_targets() {
            body.push_str(&format!("- {name}\n"));
        }
        match &opts.build_url {
            Some(url) => body.push_str(&format!("\nSee {url}\n")),
            None => body.push_str("\nNo build URL configured.\n"),
        }

        Self {
            recipient: opts.recipient.clone(),
            subject,
            body,
            build_id: opts.build_id.clone(),
            build_url: opts.build_url.clone(),
        }
    }
}

/// Delivery channel for failure notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short channel name used in logs.
    fn channel(&self) -> &'static str;

    /// Deliver a message.
    async fn notify(&self, message: &NotificationMessage) -> Result<(), MatrixError>;
}

/// Posts the message as JSON to a webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn channel(&self) -> &'static str {
        "webhook"
    }

    async fn notify(&self, message: &NotificationMessage) -> Result<(), MatrixError> {
        self.client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| MatrixError::Notify(format!("webhook {}: {}", self.url, e)))?;
        Ok(())
    }
}

/// Writes the message to the log at `warn` level.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn channel(&self) -> &'static str {
        "log"
    }

    async fn notify(&self, message: &NotificationMessage) -> Result<(), MatrixError> {
        warn!(
            recipient = message.recipient.as_deref().unwrap_or("unset"),
            subject = %message.subject,
            build_url = message.build_url.as_deref().unwrap_or(""),
            "{}",
            message.body
        );
        Ok(())
    }
}

/// Keeps messages in memory.
#[derive(Default)]
pub struct MemoryNotifier {
    messages: Mutex<Vec<NotificationMessage>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn messages(&self) -> Vec<NotificationMessage> {
        self.messages.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    fn channel(&self) -> &'static str {
        "memory"
    }

    async fn notify(&self, message: &NotificationMessage) -> Result<(), MatrixError> {
        self.messages.lock().await.push(message.clone());
        Ok(())
    }
}
