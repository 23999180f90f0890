//! Chat API transport: long-poll session over the bot HTTP API.

use super::ChatSource;
use crate::config::{IngestConfig, SourceSettings};
use crate::error::{MonitorError, Result};
use crate::types::{RawMessage, SourceKind, UrlEntity};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::Instant;

pub struct ChatFeedSource {
    settings: SourceSettings,
    http: reqwest::Client,
    api_base: String,
    token: String,
    poll_timeout_secs: u64,
}

impl ChatFeedSource {
    pub fn new(settings: SourceSettings, cfg: &IngestConfig) -> Result<Self> {
        let token = cfg
            .token
            .clone()
            .ok_or_else(|| MonitorError::Config("chat token not configured".into()))?;
        Ok(Self {
            settings,
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(cfg.poll_interval_secs + 30))
                .build()?,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            token,
            poll_timeout_secs: 25,
        })
    }
}

#[async_trait]
impl ChatSource for ChatFeedSource {
    fn source_id(&self) -> &str {
        &self.settings.source_id
    }

    fn kind(&self) -> SourceKind {
        self.settings.kind
    }

    async fn poll(&self, offset: Option<u64>) -> Result<(Vec<RawMessage>, Option<u64>)> {
        let url = format!("{}/bot{}/getUpdates", self.api_base, self.token);
        let mut query: Vec<(&str, String)> =
            vec![("timeout", self.poll_timeout_secs.to_string())];
        if let Some(offset) = offset {
            query.push(("offset", (offset + 1).to_string()));
        }

        let resp = self.http.get(&url).query(&query).send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(MonitorError::Auth {
                source_id: self.settings.source_id.clone(),
                message: format!("chat API returned {status}"),
            });
        }
        if !status.is_success() {
            return Err(MonitorError::Internal(format!(
                "chat API returned {status}"
            )));
        }

        let body: UpdatesResponse = resp.json().await?;
        let mut messages = Vec::new();
        let mut max_id = offset;

        for update in body.result.unwrap_or_default() {
            max_id = Some(max_id.map_or(update.update_id, |m| m.max(update.update_id)));
            let Some(msg) = update.message.or(update.channel_post) else {
                continue;
            };
            // Only the channel this source is bound to.
            let from_channel = msg
                .chat
                .as_ref()
                .and_then(|c| c.username.as_deref())
                .map(|u| format!("@{u}"))
                .unwrap_or_default();
            if !self.settings.channel.is_empty() && from_channel != self.settings.channel {
                continue;
            }
            let Some(text) = msg.text.or(msg.caption) else {
                continue;
            };
            let entities = extract_url_entities(&text, &msg.entities.unwrap_or_default());
            messages.push(RawMessage {
                source_id: self.settings.source_id.clone(),
                received_at: Utc::now(),
                received_mono: Instant::now(),
                text,
                entities,
                thread_id: msg.message_thread_id.map(|id| id.to_string()),
            });
        }

        Ok((messages, max_id))
    }
}

/// Map text_link entities onto (url, anchor-text) pairs. Offsets are in
/// UTF-16 code units on the wire.
fn extract_url_entities(text: &str, entities: &[MessageEntity]) -> Vec<UrlEntity> {
    let utf16: Vec<u16> = text.encode_utf16().collect();
    entities
        .iter()
        .filter_map(|e| {
            let url = e.url.clone()?;
            let start = e.offset.min(utf16.len());
            let end = (e.offset + e.length).min(utf16.len());
            let anchor = String::from_utf16(&utf16[start..end]).ok();
            Some(UrlEntity { url, anchor })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    result: Option<Vec<Update>>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: u64,
    message: Option<ChatMessage>,
    channel_post: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    chat: Option<Chat>,
    text: Option<String>,
    caption: Option<String>,
    entities: Option<Vec<MessageEntity>>,
    message_thread_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageEntity {
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    length: usize,
    url: Option<String>,
}
