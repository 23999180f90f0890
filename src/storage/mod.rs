//! Durable append-only alert log.
//!
//! A single JSON document, rewritten whole on every append with
//! temp-file + fsync + atomic-rename. Single writer (the emitter); the
//! read API only ever sees a fully-written file. A retry cascade backs the
//! write, and an emergency JSON-lines sidecar catches the record when the
//! cascade is exhausted.

pub mod mirror;


use crate::config::StorageConfig;
use crate::error::{MonitorError, Result};
use crate::metrics::SharedMetrics;
use crate::types::{AlertLogDocument, AlertRecord, Tier};
use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
struct BackupState {
    /// Writes since the last rotated backup.
    writes_since: u32,
    /// Rotate every Nth write; grows while writes are failing.
    interval: u32,
}

#[derive(Debug)]
pub struct AlertLog {
    path: PathBuf,
    backups_dir: PathBuf,
    emergency_path: PathBuf,
    lock_path: PathBuf,
    cfg: StorageConfig,
    metrics: SharedMetrics,
    doc: Mutex<AlertLogDocument>,
    backup: parking_lot::Mutex<BackupState>,
    seq: AtomicU64,
}

impl AlertLog {
    /// Open (or create) the log, acquire the writer lock, and run the
    /// startup recovery pass over the emergency sidecar.
    pub fn open(cfg: StorageConfig, metrics: SharedMetrics) -> Result<Self> {
        let path = cfg.log_path.clone();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let backups_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default()
            .join("backups");
        fs::create_dir_all(&backups_dir)?;

        let emergency_path = sibling(&path, "alerts.jsonl.emergency");
        let lock_path = path.with_extension("json.lock");
        acquire_lock(&lock_path)?;

        let mut doc = load_document(&path)?;
        recover_sidecar(&path, &emergency_path, &mut doc)?;

        Ok(Self {
            path,
            backups_dir,
            emergency_path,
            lock_path,
            cfg,
            metrics,
            doc: Mutex::new(doc),
            backup: parking_lot::Mutex::new(BackupState {
                writes_since: 0,
                interval: 1,
            }),
            seq: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn emergency_path(&self) -> &Path {
        &self.emergency_path
    }

    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    /// Snapshot of the in-memory document.
    pub async fn document(&self) -> AlertLogDocument {
        self.doc.lock().await.clone()
    }

    /// Deterministic id: first 8 chars of the contract plus the UTC date,
    /// with `_v2`, `_v3`, ... on same-day collisions.
    pub async fn next_record_id(&self, contract: &str, at: DateTime<Utc>) -> String {
        let prefix: String = contract.chars().take(8).collect();
        let base = format!("{}_{}", prefix.to_uppercase(), at.format("%Y-%m-%d"));
        let doc = self.doc.lock().await;
        if !doc.alerts.iter().any(|r| r.id == base) {
            return base;
        }
        let mut v = 2;
        loop {
            let id = format!("{base}_v{v}");
            if !doc.alerts.iter().any(|r| r.id == id) {
                return id;
            }
            v += 1;
        }
    }

    /// Append one record. Falls back to the emergency sidecar when the
    /// retry cascade is exhausted; only a sidecar failure is fatal.
    pub async fn append(&self, record: AlertRecord) -> Result<()> {
        let mut doc = self.doc.lock().await;
        self.maybe_rotate_backup();
        doc.alerts.push(record.clone());
        doc.last_updated = Some(Utc::now());

        match self.write_with_retries(&doc).await {
            Ok(()) => {
                debug!(id = %record.id, "alert appended to log");
                Ok(())
            }
            Err(e) => {
                error!(id = %record.id, error = %e, "log write exhausted retries, using emergency sidecar");
                match self.append_emergency(&record) {
                    Ok(()) => {
                        self.metrics
                            .emergency_writes
                            .fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    }
                    Err(side) => Err(MonitorError::DurableWrite {
                        attempts: self.cfg.write_retries,
                        message: format!("primary: {e}; sidecar: {side}"),
                    }),
                }
            }
        }
    }

    /// Trending-tracker echo: mutate `callers`/`subs` on records matching
    /// the token (and tier, when given). The only permitted in-place
    /// mutation of a written record.
    pub async fn update_callers_subs(
        &self,
        token: &str,
        tier: Option<Tier>,
        callers: u32,
        subs: u64,
    ) -> Result<usize> {
        let mut doc = self.doc.lock().await;
        let token_upper = token.to_uppercase();
        let mut changed = 0;
        for record in doc.alerts.iter_mut() {
            if record.token.to_uppercase() == token_upper
                && tier.map_or(true, |t| record.tier == t)
            {
                record.callers = Some(callers);
                record.subs = Some(subs);
                changed += 1;
            }
        }
        if changed > 0 {
            doc.last_updated = Some(Utc::now());
            self.write_with_retries(&doc).await?;
            info!(token = %token_upper, changed, "callers/subs echo applied");
        }
        Ok(changed)
    }

    /// Merge externally-sourced records (mirror reconcile), dedup by id.
    pub async fn merge_records(&self, records: Vec<AlertRecord>) -> Result<usize> {
        let mut doc = self.doc.lock().await;
        let mut added = 0;
        for record in records {
            if !doc.alerts.iter().any(|r| r.id == record.id) {
                doc.alerts.push(record);
                added += 1;
            }
        }
        if added > 0 {
            doc.last_updated = Some(Utc::now());
            self.write_with_retries(&doc).await?;
            info!(added, "merged records into local log");
        }
        Ok(added)
    }

    async fn write_with_retries(&self, doc: &AlertLogDocument) -> Result<()> {
        let mut delay = self.cfg.retry_base_ms;
        let mut last_err: Option<std::io::Error> = None;
        for attempt in 0..self.cfg.write_retries {
            match self.write_once(doc) {
                Ok(()) => {
                    self.note_write_ok();
                    return Ok(());
                }
                Err(e) => {
                    self.metrics.write_retries.fetch_add(1, Ordering::Relaxed);
                    warn!(attempt = attempt + 1, error = %e, "log write attempt failed");
                    last_err = Some(e);
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                    delay = (delay * 2).min(self.cfg.retry_cap_ms);
                }
            }
        }
        self.note_write_failed();
        Err(MonitorError::DurableWrite {
            attempts: self.cfg.write_retries,
            message: last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".into()),
        })
    }

    /// Full-document write: temp file, fsync, atomic rename.
    fn write_once(&self, doc: &AlertLogDocument) -> std::io::Result<()> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        write_document(&self.path, doc, seq)
    }

    fn append_emergency(&self, record: &AlertRecord) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.emergency_path)?;
        let line = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(file, "{line}")?;
        file.sync_all()
    }

    /// Rotate the prior file contents into backups/ on every Nth write.
    /// N stays 1 while writes succeed and doubles after failures.
    fn maybe_rotate_backup(&self) {
        let due = {
            let mut state = self.backup.lock();
            state.writes_since += 1;
            if state.writes_since >= state.interval {
                state.writes_since = 0;
                true
            } else {
                false
            }
        };
        if !due || !self.path.exists() {
            return;
        }
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let backup = self.backups_dir.join(format!("alerts_{stamp}_{seq}.json"));
        if let Err(e) = fs::rename(&self.path, &backup) {
            warn!(error = %e, "backup rotation failed");
            return;
        }
        self.prune_backups();
    }

    fn prune_backups(&self) {
        let Ok(entries) = fs::read_dir(&self.backups_dir) else {
            return;
        };
        let mut backups: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("alerts_") && n.ends_with(".json"))
            })
            .collect();
        backups.sort();
        while backups.len() > self.cfg.backup_count {
            let oldest = backups.remove(0);
            let _ = fs::remove_file(oldest);
        }
    }

    fn note_write_ok(&self) {
        self.backup.lock().interval = 1;
    }

    fn note_write_failed(&self) {
        let mut state = self.backup.lock();
        state.interval = (state.interval * 2).min(64);
    }
}

impl Drop for AlertLog {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

fn sibling(path: &Path, name: &str) -> PathBuf {
    path.parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_default()
        .join(name)
}

fn write_document(path: &Path, doc: &AlertLogDocument, seq: u64) -> std::io::Result<()> {
    let tmp = PathBuf::from(format!(
        "{}.tmp.{}.{}",
        path.display(),
        std::process::id(),
        seq
    ));
    let json = serde_json::to_vec_pretty(doc)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let result = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Startup pass: fold emergency-sidecar entries into the main document,
/// dedup by id, then remove the sidecar.
fn recover_sidecar(
    path: &Path,
    emergency_path: &Path,
    doc: &mut AlertLogDocument,
) -> Result<()> {
    if !emergency_path.exists() {
        return Ok(());
    }
    let text = fs::read_to_string(emergency_path)?;
    let mut added = 0;
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<AlertRecord>(line) {
            Ok(record) => {
                if !doc.alerts.iter().any(|r| r.id == record.id) {
                    doc.alerts.push(record);
                    added += 1;
                }
            }
            Err(e) => warn!(error = %e, "skipping malformed sidecar line"),
        }
    }
    if added > 0 {
        doc.last_updated = Some(Utc::now());
        write_document(path, doc, 0)?;
        info!(added, "recovered sidecar records into main log");
    }
    fs::remove_file(emergency_path)?;
    Ok(())
}

fn load_document(path: &Path) -> Result<AlertLogDocument> {
    if !path.exists() {
        return Ok(AlertLogDocument::default());
    }
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| MonitorError::LogUnreadable(format!("{}: {e}", path.display())))
}

/// Pid-stamped lock file guarding against concurrent writers. A lock left
/// by a dead process is reclaimed.
fn acquire_lock(lock_path: &Path) -> Result<()> {
    if lock_path.exists() {
        let holder = fs::read_to_string(lock_path).unwrap_or_default();
        if let Ok(pid) = holder.trim().parse::<u32>() {
            if process_alive(pid) && pid != std::process::id() {
                return Err(MonitorError::LogLocked(format!(
                    "pid {pid} holds {}",
                    lock_path.display()
                )));
            }
        }
        fs::remove_file(lock_path)?;
    }
    fs::write(lock_path, std::process::id().to_string())?;
    Ok(())
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    // Without a portable liveness probe, assume the holder is alive.
    true
}
