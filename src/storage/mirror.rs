//! Best-effort remote mirror of the alert log.
//!
//! Serializes appends onto its own task, coalesces bursts into one cycle,
//! and retries with backoff. Failures raise a severity-high counter but
//! never block local acceptance. The transport sits behind `RemoteMirror`
//! so the content-addressed store is a configuration choice.

use crate::config::MirrorConfig;
use crate::error::{MonitorError, Result};
use crate::metrics::SharedMetrics;
use crate::storage::AlertLog;
use crate::types::AlertRecord;
use async_trait::async_trait;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

#[async_trait]
pub trait RemoteMirror: Send + Sync {
    /// Mirror one record, keyed by its id.
    async fn push(&self, record: &AlertRecord) -> Result<()>;
    /// Everything the mirror currently holds.
    async fn fetch_records(&self) -> Result<Vec<AlertRecord>>;
}

/// HTTP content-addressed store client: records live at `/records/{id}`.
pub struct HttpMirror {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpMirror {
    pub fn new(cfg: &MirrorConfig) -> Result<Self> {
        if cfg.base_url.is_empty() {
            return Err(MonitorError::Config(
                "mirror enabled but base_url is empty".into(),
            ));
        }
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            token: cfg.token.clone(),
        })
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl RemoteMirror for HttpMirror {
    async fn push(&self, record: &AlertRecord) -> Result<()> {
        let url = format!("{}/records/{}", self.base_url, record.id);
        let resp = self.authorized(self.http.put(&url)).json(record).send().await?;
        if !resp.status().is_success() {
            return Err(MonitorError::Mirror(format!(
                "push {} returned {}",
                record.id,
                resp.status()
            )));
        }
        Ok(())
    }

    async fn fetch_records(&self) -> Result<Vec<AlertRecord>> {
        let url = format!("{}/records", self.base_url);
        let resp = self.authorized(self.http.get(&url)).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            return Err(MonitorError::Mirror(format!(
                "fetch returned {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }
}

/// Startup reconcile: pull records the mirror holds that the local log
/// does not, merged dedup-by-id.
pub async fn reconcile(log: &AlertLog, mirror: &dyn RemoteMirror) -> Result<usize> {
    let records = mirror.fetch_records().await?;
    let pulled = log.merge_records(records).await?;
    if pulled > 0 {
        info!(pulled, "mirror was ahead of local log");
    }
    Ok(pulled)
}

/// Mirror committer task. Owns the only concurrency with the store.
pub struct MirrorTask {
    mirror: Arc<dyn RemoteMirror>,
    cfg: MirrorConfig,
    metrics: SharedMetrics,
}

impl MirrorTask {
    pub fn new(mirror: Arc<dyn RemoteMirror>, cfg: MirrorConfig, metrics: SharedMetrics) -> Self {
        Self {
            mirror,
            cfg,
            metrics,
        }
    }

    pub async fn run(self, mut rx: mpsc::Receiver<AlertRecord>) {
        while let Some(first) = rx.recv().await {
            let mut batch = vec![first];
            // Coalesce a burst into one cycle.
            let deadline = Instant::now() + Duration::from_secs(self.cfg.coalesce_window_secs);
            while batch.len() < self.cfg.coalesce_max {
                match timeout_at(deadline, rx.recv()).await {
                    Ok(Some(record)) => batch.push(record),
                    _ => break,
                }
            }
            debug!(count = batch.len(), "mirror cycle");
            self.push_batch(&batch).await;
        }
        debug!("mirror channel closed, task exiting");
    }

    async fn push_batch(&self, batch: &[AlertRecord]) {
        for record in batch {
            let mut delay = self.cfg.retry_base_secs;
            let mut pushed = false;
            for attempt in 0..3 {
                match self.mirror.push(record).await {
                    Ok(()) => {
                        pushed = true;
                        break;
                    }
                    Err(e) => {
                        warn!(id = %record.id, attempt = attempt + 1, error = %e, "mirror push failed");
                        tokio::time::sleep(Duration::from_secs(delay)).await;
                        delay = (delay * 2).min(self.cfg.retry_cap_secs);
                    }
                }
            }
            if !pushed {
                self.metrics.mirror_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
