//! Read API tests

use super::*;
use crate::metrics::Metrics;
use crate::notify::registry::SubscriberRegistry;
use crate::types::{AlertRecord, Tier};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tempfile::TempDir;
use tower::ServiceExt;

fn record(id: &str, token: &str, tier: Tier, ts: &str) -> AlertRecord {
    AlertRecord {
        id: id.into(),
        token: token.into(),
        tier,
        level: tier.level(),
        timestamp: ts.parse().unwrap(),
        contract: "AAAA111111111111111111111111111111111111".into(),
        entry_mc: Some(60_000.0),
        hotlist: "Yes".into(),
        description: "test".into(),
        matched_signals: vec![],
        tags: vec![],
        liquidity: None,
        callers: None,
        subs: None,
        confirmation_count: 1,
        cohort_time: "1m ago".into(),
        last_buy_sol: None,
        top_buy_sol: None,
    }
}

fn write_log(dir: &TempDir, alerts: Vec<AlertRecord>) -> PathBuf {
    let path = dir.path().join("alerts.json");
    let doc = AlertLogDocument {
        alerts,
        last_updated: Some(Utc::now()),
    };
    std::fs::write(&path, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();
    path
}

fn state_for(dir: &TempDir, log_path: PathBuf) -> ApiState {
    let registry = Arc::new(SubscriberRegistry::load(
        dir.path().join("subscriptions.json"),
        dir.path().join("alert_groups.json"),
    ));
    ApiState {
        cache: Arc::new(LogCache::new(log_path.clone(), 5)),
        registry,
        metrics: Metrics::new(),
        log_path,
        emergency_path: dir.path().join("alerts.jsonl.emergency"),
        backups_dir: dir.path().join("backups"),
    }
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

fn sample_alerts() -> Vec<AlertRecord> {
    vec![
        record("A_2026-01-01", "FOO", Tier::One, "2026-01-01T10:00:00Z"),
        record("B_2026-01-01", "BAR", Tier::Two, "2026-01-01T11:00:00Z"),
        record("C_2026-01-02", "FOO", Tier::Two, "2026-01-02T09:00:00Z"),
        record("D_2026-01-02", "BAZ", Tier::Three, "2026-01-02T10:00:00Z"),
    ]
}

#[tokio::test]
async fn test_recent_default_dedupes_newest_first() {
    let dir = TempDir::new().unwrap();
    let path = write_log(&dir, sample_alerts());
    let app = router(state_for(&dir, path));

    let (status, body) = get_json(app, "/api/alerts/recent").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_in_storage"], 4);
    // FOO deduped to its most recent record.
    assert_eq!(body["count"], 3);
    assert_eq!(body["alerts"][0]["id"], "D_2026-01-02");
    assert_eq!(body["alerts"][1]["id"], "C_2026-01-02");
    assert_eq!(body["alerts"][2]["id"], "B_2026-01-01");
}

#[tokio::test]
async fn test_recent_limit_zero_returns_all_raw() {
    let dir = TempDir::new().unwrap();
    let path = write_log(&dir, sample_alerts());
    let app = router(state_for(&dir, path));

    let (status, body) = get_json(app, "/api/alerts/recent?limit=0&dedupe=false").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 4);
    // Newest-first ordering of the full array.
    let ids: Vec<&str> = body["alerts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["id"].as_str().unwrap())
        .collect();
    assert_eq!(
        ids,
        vec!["D_2026-01-02", "C_2026-01-02", "B_2026-01-01", "A_2026-01-01"]
    );
}

#[tokio::test]
async fn test_recent_tier_filter() {
    let dir = TempDir::new().unwrap();
    let path = write_log(&dir, sample_alerts());
    let app = router(state_for(&dir, path));

    let (status, body) = get_json(app, "/api/alerts/recent?tier=2&dedupe=false").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
}

#[tokio::test]
async fn test_recent_malformed_query_is_400() {
    let dir = TempDir::new().unwrap();
    let path = write_log(&dir, sample_alerts());

    let app = router(state_for(&dir, path.clone()));
    let (status, body) = get_json(app, "/api/alerts/recent?limit=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
    assert!(body["error"].as_str().unwrap().contains("limit"));

    let app = router(state_for(&dir, path));
    let (status, _) = get_json(app, "/api/alerts/recent?tier=9").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_corrupt_log_is_500_not_hidden() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("alerts.json");
    std::fs::write(&path, "{not json").unwrap();
    let app = router(state_for(&dir, path));

    let (status, body) = get_json(app, "/api/alerts/recent").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], 500);
}

#[tokio::test]
async fn test_missing_log_serves_empty() {
    let dir = TempDir::new().unwrap();
    let app = router(state_for(&dir, dir.path().join("alerts.json")));

    let (status, body) = get_json(app, "/api/alerts/recent").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_stats_counts() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("subscriptions.json"),
        r#"{"users": ["u1", "u2"]}"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("alert_groups.json"), r#"{"groups": ["g1"]}"#).unwrap();
    let path = write_log(&dir, sample_alerts());
    let app = router(state_for(&dir, path));

    let (status, body) = get_json(app, "/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalAlerts"], 4);
    assert_eq!(body["tier1Alerts"], 1);
    assert_eq!(body["tier2Alerts"], 2);
    assert_eq!(body["tier3Alerts"], 1);
    assert_eq!(body["totalSubscribers"], 3);
    assert_eq!(body["userSubscribers"], 2);
    assert_eq!(body["groupSubscribers"], 1);
}

#[tokio::test]
async fn test_tier_breakdown_three_most_recent() {
    let dir = TempDir::new().unwrap();
    let mut alerts = sample_alerts();
    for i in 0..5 {
        alerts.push(record(
            &format!("T2_{i}"),
            &format!("TK{i}"),
            Tier::Two,
            &format!("2026-01-02T1{i}:00:00Z"),
        ));
    }
    let path = write_log(&dir, alerts);
    let app = router(state_for(&dir, path));

    let (status, body) = get_json(app, "/api/alerts/tiers").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tier2"]["count"], 7);
    assert_eq!(body["tier2"]["alerts"].as_array().unwrap().len(), 3);
    assert_eq!(body["total"], 9);
}

#[tokio::test]
async fn test_daily_buckets() {
    let dir = TempDir::new().unwrap();
    let path = write_log(&dir, sample_alerts());
    let app = router(state_for(&dir, path));

    let (status, body) = get_json(app, "/api/alerts/stats/daily?days=400").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let _ = body;

    let app = router(state_for(
        &dir,
        dir.path().join("alerts.json"),
    ));
    let (status, body) = get_json(app, "/api/alerts/stats/daily?days=3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["period"], 3);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_health_reports_files_and_counters() {
    let dir = TempDir::new().unwrap();
    let path = write_log(&dir, sample_alerts());
    let app = router(state_for(&dir, path));

    let (status, body) = get_json(app, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["files"]["alert_log"], true);
    assert_eq!(body["files"]["emergency_sidecar"], false);
    assert_eq!(body["latest"]["id"], "D_2026-01-02");
    assert!(body["counters"]["parse_miss"].is_number());
}

#[tokio::test]
async fn test_cache_refresh_picks_up_new_writes() {
    let dir = TempDir::new().unwrap();
    let path = write_log(&dir, vec![sample_alerts().remove(0)]);
    let state = state_for(&dir, path.clone());
    let app = router(state.clone());

    let (_, body) = get_json(app.clone(), "/api/alerts/recent").await;
    assert_eq!(body["total_in_storage"], 1);

    write_log(&dir, sample_alerts());
    let (_, _) = get_json(app.clone(), "/api/cache/refresh").await;
    let (_, body) = get_json(app, "/api/alerts/recent?dedupe=false&limit=0").await;
    assert_eq!(body["total_in_storage"], 4);
}

#[test]
fn test_select_recent_reserialization_matches_order() {
    // limit=0, dedupe=false round-trips the full array newest-first.
    let doc = AlertLogDocument {
        alerts: sample_alerts(),
        last_updated: None,
    };
    let selected = select_recent(&doc, 0, None, false);
    let json = serde_json::to_value(&selected).unwrap();
    let round: Vec<AlertRecord> = serde_json::from_value(json).unwrap();
    assert_eq!(round.len(), 4);
    assert!(round.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
}
