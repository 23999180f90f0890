//! Source ingest: long-lived chat sessions feeding the parser.
//!
//! One task per configured source. Each loop polls its transport, buffers
//! into a bounded per-source queue (overflow drops the oldest), and
//! forwards into the pipeline. Transport errors reconnect with capped
//! exponential backoff; authentication errors are fatal and surface to
//! the supervisor.

pub mod chat;


use crate::config::IngestConfig;
use crate::error::{MonitorError, Result};
use crate::metrics::SharedMetrics;
use crate::types::{RawMessage, SourceKind};
use async_trait::async_trait;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A long-lived upstream chat stream.
#[async_trait]
pub trait ChatSource: Send + Sync {
    fn source_id(&self) -> &str;
    fn kind(&self) -> SourceKind;

    /// Read messages after `offset`. Returns the batch and the new offset
    /// when the transport supports resumption.
    async fn poll(&self, offset: Option<u64>) -> Result<(Vec<RawMessage>, Option<u64>)>;
}

/// Bounded per-source queue; overflow drops the oldest message.
pub(crate) struct SourceBuffer {
    queue: VecDeque<RawMessage>,
    capacity: usize,
}

impl SourceBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    /// Push a message, returning the dropped one when full.
    pub(crate) fn push(&mut self, msg: RawMessage) -> Option<RawMessage> {
        let dropped = if self.queue.len() >= self.capacity {
            self.queue.pop_front()
        } else {
            None
        };
        self.queue.push_back(msg);
        dropped
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    fn pop(&mut self) -> Option<RawMessage> {
        self.queue.pop_front()
    }

    fn unpop(&mut self, msg: RawMessage) {
        self.queue.push_front(msg);
    }
}

/// Run one source until shutdown (channel closed) or a fatal auth error.
pub async fn run_source(
    source: Arc<dyn ChatSource>,
    cfg: IngestConfig,
    tx: mpsc::Sender<RawMessage>,
    metrics: SharedMetrics,
) -> Result<()> {
    let source_id = source.source_id().to_string();
    info!(source = %source_id, kind = %source.kind(), "source session starting");

    let mut offset: Option<u64> = None;
    let mut backoff = cfg.reconnect_base_secs;
    let mut buffer = SourceBuffer::new(cfg.buffer_per_source);

    loop {
        match source.poll(offset).await {
            Ok((messages, new_offset)) => {
                backoff = cfg.reconnect_base_secs;
                if new_offset.is_some() {
                    offset = new_offset;
                }
                for msg in messages {
                    if buffer.push(msg).is_some() {
                        metrics.ingest_overflow.fetch_add(1, Ordering::Relaxed);
                        warn!(source = %source_id, "ingest buffer full, dropped oldest");
                    }
                }
                while let Some(msg) = buffer.pop() {
                    match tx.try_send(msg) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(msg)) => {
                            buffer.unpop(msg);
                            break;
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            info!(source = %source_id, "pipeline closed, source exiting");
                            return Ok(());
                        }
                    }
                }
                if buffer.len() > 0 {
                    debug!(source = %source_id, backlog = buffer.len(), "parser backpressure");
                }
                tokio::time::sleep(Duration::from_secs(cfg.poll_interval_secs)).await;
            }
            Err(e @ MonitorError::Auth { .. }) => {
                // Unrecoverable; the supervisor turns this into exit code 3.
                return Err(e);
            }
            Err(e) => {
                let jitter = rand::thread_rng().gen_range(0..500);
                warn!(
                    source = %source_id,
                    error = %e,
                    retry_in_secs = backoff,
                    "source transport error, reconnecting"
                );
                tokio::time::sleep(Duration::from_secs(backoff) + Duration::from_millis(jitter))
                    .await;
                backoff = (backoff * 2).min(cfg.reconnect_cap_secs);
            }
        }
    }
}
