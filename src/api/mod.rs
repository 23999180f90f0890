//! Read-only HTTP API over the alert log.
//!
//! Serves the log file through a short-TTL cache with an mtime check for
//! immediate invalidation. Cross-origin access is open; the only 500 is
//! an unreadable or corrupt log, which operators must see.

#[cfg(test)]
mod tests;

use crate::error::Result as MonitorResult;
use crate::metrics::SharedMetrics;
use crate::notify::registry::SubscriberRegistry;
use crate::types::{AlertLogDocument, AlertRecord, Tier};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Cached view of the log file. Reloads when the TTL lapses or the file
/// mtime moves.
pub struct LogCache {
    path: PathBuf,
    ttl: std::time::Duration,
    inner: RwLock<Option<CacheEntry>>,
}

#[derive(Clone)]
struct CacheEntry {
    doc: Arc<AlertLogDocument>,
    loaded_at: std::time::Instant,
    mtime: Option<SystemTime>,
}

impl LogCache {
    pub fn new(path: PathBuf, ttl_secs: u64) -> Self {
        Self {
            path,
            ttl: std::time::Duration::from_secs(ttl_secs),
            inner: RwLock::new(None),
        }
    }

    /// Current document; a missing file reads as empty, a corrupt one is
    /// an error the caller must surface.
    pub fn get(&self) -> std::result::Result<Arc<AlertLogDocument>, String> {
        let mtime = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok();

        if let Some(entry) = self.inner.read().as_ref() {
            if entry.loaded_at.elapsed() < self.ttl && entry.mtime == mtime {
                return Ok(entry.doc.clone());
            }
        }

        let doc = if self.path.exists() {
            let text = std::fs::read_to_string(&self.path)
                .map_err(|e| format!("log unreadable: {e}"))?;
            serde_json::from_str::<AlertLogDocument>(&text)
                .map_err(|e| format!("log corrupt: {e}"))?
        } else {
            AlertLogDocument::default()
        };

        let doc = Arc::new(doc);
        *self.inner.write() = Some(CacheEntry {
            doc: doc.clone(),
            loaded_at: std::time::Instant::now(),
            mtime,
        });
        Ok(doc)
    }

    pub fn invalidate(&self) {
        *self.inner.write() = None;
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub cache: Arc<LogCache>,
    pub registry: Arc<SubscriberRegistry>,
    pub metrics: SharedMetrics,
    pub log_path: PathBuf,
    pub emergency_path: PathBuf,
    pub backups_dir: PathBuf,
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.message, "status": self.status.as_u16() });
        (self.status, Json(body)).into_response()
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/alerts/recent", get(recent_alerts))
        .route("/api/stats", get(stats))
        .route("/api/alerts/tiers", get(tier_breakdown))
        .route("/api/alerts/stats/daily", get(daily_stats))
        .route("/api/health", get(health))
        .route("/api/cache/refresh", get(cache_refresh))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: ApiState, port: u16) -> MonitorResult<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "read API listening");
    axum::serve(listener, app)
        .await
        .map_err(crate::error::MonitorError::Io)
}

fn load_doc(state: &ApiState) -> std::result::Result<Arc<AlertLogDocument>, ApiError> {
    state.cache.get().map_err(|e| {
        error!(error = %e, "serving 500: alert log unreadable");
        ApiError::internal(e)
    })
}

fn parse_flag(raw: Option<&String>, default: bool) -> std::result::Result<bool, ApiError> {
    match raw.map(|s| s.as_str()) {
        None => Ok(default),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(other) => Err(ApiError::bad_request(format!("invalid boolean: {other}"))),
    }
}

fn parse_num<T: std::str::FromStr>(
    raw: Option<&String>,
    name: &str,
) -> std::result::Result<Option<T>, ApiError> {
    match raw {
        None => Ok(None),
        Some(s) => s
            .parse::<T>()
            .map(Some)
            .map_err(|_| ApiError::bad_request(format!("invalid {name}: {s}"))),
    }
}

/// Newest-first selection with optional tier filter and per-token dedup.
fn select_recent(
    doc: &AlertLogDocument,
    limit: usize,
    tier: Option<Tier>,
    dedupe: bool,
) -> Vec<AlertRecord> {
    let mut alerts: Vec<&AlertRecord> = doc
        .alerts
        .iter()
        .filter(|r| tier.map_or(true, |t| r.tier == t))
        .collect();
    alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut out = Vec::new();
    let mut seen_tokens = std::collections::HashSet::new();
    for record in alerts {
        if dedupe && !seen_tokens.insert(record.token.to_uppercase()) {
            continue;
        }
        out.push(record.clone());
        if limit != 0 && out.len() >= limit {
            break;
        }
    }
    out
}

async fn recent_alerts(
    State(state): State<ApiState>,
    Query(params): Query<HashMap<String, String>>,
) -> std::result::Result<Response, ApiError> {
    let limit: usize = parse_num(params.get("limit"), "limit")?.unwrap_or(20);
    let tier = match parse_num::<u8>(params.get("tier"), "tier")? {
        None => None,
        Some(n) => Some(
            Tier::try_from(n).map_err(|e| ApiError::bad_request(e))?,
        ),
    };
    let dedupe = parse_flag(params.get("dedupe"), true)?;

    let doc = load_doc(&state)?;
    let selected = select_recent(&doc, limit, tier, dedupe);
    let count = selected.len();
    Ok(Json(json!({
        "alerts": selected,
        "count": count,
        "total_in_storage": doc.alerts.len(),
        "timestamp": Utc::now(),
    }))
    .into_response())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    total_subscribers: usize,
    user_subscribers: usize,
    group_subscribers: usize,
    total_alerts: usize,
    tier1_alerts: usize,
    tier2_alerts: usize,
    tier3_alerts: usize,
    recent_alerts24h: usize,
    recent_alerts7d: usize,
    last_updated: DateTime<Utc>,
}

fn build_stats(doc: &AlertLogDocument, users: usize, groups: usize, now: DateTime<Utc>) -> StatsResponse {
    let mut tiers = [0usize; 3];
    for record in &doc.alerts {
        tiers[(record.tier.number() - 1) as usize] += 1;
    }
    let day = now - Duration::hours(24);
    let week = now - Duration::days(7);
    StatsResponse {
        total_subscribers: users + groups,
        user_subscribers: users,
        group_subscribers: groups,
        total_alerts: doc.alerts.len(),
        tier1_alerts: tiers[0],
        tier2_alerts: tiers[1],
        tier3_alerts: tiers[2],
        recent_alerts24h: doc.alerts.iter().filter(|r| r.timestamp > day).count(),
        recent_alerts7d: doc.alerts.iter().filter(|r| r.timestamp > week).count(),
        last_updated: now,
    }
}

async fn stats(State(state): State<ApiState>) -> std::result::Result<Response, ApiError> {
    let doc = load_doc(&state)?;
    let (users, groups) = state.registry.counts();
    Ok(Json(build_stats(&doc, users, groups, Utc::now())).into_response())
}

fn tier_summary(doc: &AlertLogDocument, tier: Tier) -> serde_json::Value {
    let mut records: Vec<&AlertRecord> =
        doc.alerts.iter().filter(|r| r.tier == tier).collect();
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    let recent: Vec<_> = records
        .iter()
        .take(3)
        .map(|r| {
            json!({
                "token": r.token,
                "timestamp": r.timestamp,
                "contract": r.contract,
            })
        })
        .collect();
    json!({ "count": records.len(), "alerts": recent })
}

async fn tier_breakdown(State(state): State<ApiState>) -> std::result::Result<Response, ApiError> {
    let doc = load_doc(&state)?;
    Ok(Json(json!({
        "tier1": tier_summary(&doc, Tier::One),
        "tier2": tier_summary(&doc, Tier::Two),
        "tier3": tier_summary(&doc, Tier::Three),
        "total": doc.alerts.len(),
    }))
    .into_response())
}

/// D buckets by UTC date, oldest first.
fn build_daily(doc: &AlertLogDocument, days: i64, now: DateTime<Utc>) -> Vec<serde_json::Value> {
    let mut buckets: HashMap<String, [usize; 4]> = HashMap::new();
    for record in &doc.alerts {
        if now - record.timestamp > Duration::days(days) {
            continue;
        }
        let key = record.timestamp.format("%Y-%m-%d").to_string();
        let bucket = buckets.entry(key).or_insert([0; 4]);
        bucket[0] += 1;
        bucket[record.tier.number() as usize] += 1;
    }

    (0..days)
        .rev()
        .map(|i| {
            let date = (now - Duration::days(i)).format("%Y-%m-%d").to_string();
            let bucket = buckets.get(&date).copied().unwrap_or([0; 4]);
            json!({
                "date": date,
                "total": bucket[0],
                "tier1": bucket[1],
                "tier2": bucket[2],
                "tier3": bucket[3],
            })
        })
        .collect()
}

async fn daily_stats(
    State(state): State<ApiState>,
    Query(params): Query<HashMap<String, String>>,
) -> std::result::Result<Response, ApiError> {
    let days: i64 = parse_num(params.get("days"), "days")?.unwrap_or(7);
    if days <= 0 || days > 365 {
        return Err(ApiError::bad_request(format!("invalid days: {days}")));
    }
    let doc = load_doc(&state)?;
    Ok(Json(json!({
        "period": days,
        "data": build_daily(&doc, days, Utc::now()),
    }))
    .into_response())
}

async fn health(State(state): State<ApiState>) -> Response {
    let latest = state.cache.get().ok().and_then(|doc| {
        doc.alerts
            .iter()
            .max_by_key(|r| r.timestamp)
            .map(|r| {
                json!({
                    "id": r.id,
                    "token": r.token,
                    "tier": r.tier,
                    "timestamp": r.timestamp,
                })
            })
    });
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "files": {
            "alert_log": state.log_path.exists(),
            "emergency_sidecar": state.emergency_path.exists(),
            "backups": dir_nonempty(&state.backups_dir),
        },
        "latest": latest,
        "counters": state.metrics.snapshot(),
    }))
    .into_response()
}

async fn cache_refresh(State(state): State<ApiState>) -> Response {
    state.cache.invalidate();
    Json(json!({ "status": "refreshed", "timestamp": Utc::now() })).into_response()
}

fn dir_nonempty(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut d| d.next().is_some())
        .unwrap_or(false)
}
