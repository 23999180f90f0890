//! Alert fan-out to subscribers.
//!
//! Consumes records after the durable append. Never propagates errors
//! into the emitter: every recipient gets independent retries, permanently
//! unreachable recipients are dropped from the registry, and tier-1
//! records additionally go to the broadcast channel.

pub mod registry;

#[cfg(test)]
mod tests;

use crate::config::FanoutConfig;
use crate::metrics::SharedMetrics;
use crate::types::{AlertRecord, Tier};
use async_trait::async_trait;
use registry::SubscriberRegistry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How a single delivery failed.
#[derive(Debug)]
pub enum DeliveryError {
    /// Recipient is gone (blocked the bot, deleted account); remove it.
    Unreachable(String),
    /// Timeout or server hiccup; retry, keep the recipient.
    Transient(String),
}

#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn send(&self, recipient: &str, text: &str) -> std::result::Result<(), DeliveryError>;
}

/// Bot-API transport: one sendMessage call per recipient.
pub struct ChatDeliveryTransport {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl ChatDeliveryTransport {
    pub fn new(api_base: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }
}

#[async_trait]
impl DeliveryTransport for ChatDeliveryTransport {
    async fn send(&self, recipient: &str, text: &str) -> std::result::Result<(), DeliveryError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let body = serde_json::json!({
            "chat_id": recipient,
            "text": text,
            "parse_mode": "HTML",
        });
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transient(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        // 403 means the recipient blocked the bot or left; 400 with a
        // "chat not found" body is the deleted-chat case.
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(DeliveryError::Unreachable(format!("{status}")));
        }
        if status == reqwest::StatusCode::BAD_REQUEST {
            let text = resp.text().await.unwrap_or_default();
            if text.contains("chat not found") {
                return Err(DeliveryError::Unreachable(text));
            }
            return Err(DeliveryError::Transient(text));
        }
        Err(DeliveryError::Transient(format!("{status}")))
    }
}

pub struct FanoutAdapter {
    registry: Arc<SubscriberRegistry>,
    transport: Arc<dyn DeliveryTransport>,
    cfg: FanoutConfig,
    metrics: SharedMetrics,
}

impl FanoutAdapter {
    pub fn new(
        registry: Arc<SubscriberRegistry>,
        transport: Arc<dyn DeliveryTransport>,
        cfg: FanoutConfig,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            registry,
            transport,
            cfg,
            metrics,
        }
    }

    /// Consume the emitter channel until shutdown.
    pub async fn run(self, mut rx: mpsc::Receiver<AlertRecord>) {
        while let Some(record) = rx.recv().await {
            self.deliver(&record).await;
        }
        debug!("fan-out channel closed, adapter exiting");
    }

    /// Deliver one record to every matching subscriber. Infallible by
    /// contract; failures are counted, not raised.
    pub async fn deliver(&self, record: &AlertRecord) {
        let text = render_alert(record);
        let recipients = self.registry.recipients_for(record.tier);
        info!(
            id = %record.id,
            tier = %record.tier,
            recipients = recipients.len(),
            "delivering alert"
        );

        for recipient in recipients {
            self.deliver_one(&recipient.id, &text).await;
        }

        if record.tier == Tier::One {
            if let Some(channel) = &self.cfg.broadcast_channel {
                self.deliver_one(channel, &text).await;
            }
        }
    }

    async fn deliver_one(&self, recipient: &str, text: &str) {
        for attempt in 0..=self.cfg.retries {
            match self.transport.send(recipient, text).await {
                Ok(()) => return,
                Err(DeliveryError::Unreachable(reason)) => {
                    warn!(recipient, reason, "recipient unreachable, removing");
                    if let Err(e) = self.registry.remove(recipient) {
                        warn!(recipient, error = %e, "registry rewrite failed");
                    }
                    return;
                }
                Err(DeliveryError::Transient(reason)) => {
                    debug!(recipient, attempt, reason, "delivery attempt failed");
                    if attempt < self.cfg.retries {
                        tokio::time::sleep(Duration::from_secs(self.cfg.retry_delay_secs)).await;
                    }
                }
            }
        }
        self.metrics.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// Outgoing message body, built from the record's data fields only.
fn render_alert(record: &AlertRecord) -> String {
    let tier_emoji = match record.tier {
        Tier::One => "🚨",
        Tier::Two => "⚡",
        Tier::Three => "👀",
    };
    let mc = record
        .entry_mc
        .map(format_money)
        .unwrap_or_else(|| "n/a".to_string());
    let liq = record
        .liquidity
        .map(format_money)
        .unwrap_or_else(|| "n/a".to_string());

    format!(
        "{tier_emoji} <b>Tier {} Alert: {}</b>\n\n\
        {}\n\n\
        Entry MC: <code>{mc}</code>\n\
        Liquidity: <code>{liq}</code>\n\
        Hot list: {}\n\
        Confirmations: {}\n\
        Cohort: {}\n\n\
        CA: <code>{}</code>",
        record.tier,
        record.token,
        record.description,
        record.hotlist,
        record.confirmation_count,
        record.cohort_time,
        record.contract,
    )
}

fn format_money(v: f64) -> String {
    if v >= 1_000_000.0 {
        format!("${:.1}M", v / 1_000_000.0)
    } else if v >= 1_000.0 {
        format!("${:.1}K", v / 1_000.0)
    } else {
        format!("${v:.0}")
    }
}
