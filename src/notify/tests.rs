//! Tests for fan-out

use super::registry::SubscriberRegistry;
use super::*;
use crate::config::FanoutConfig;
use crate::metrics::Metrics;
use crate::types::{AlertLevel, AlertRecord, Tier};
use parking_lot::Mutex;
use tempfile::TempDir;

fn record(tier: Tier) -> AlertRecord {
    AlertRecord {
        id: "AAAA1111_2026-01-02".into(),
        token: "FOO".into(),
        tier,
        level: tier.level(),
        timestamp: "2026-01-02T21:00:33Z".parse().unwrap(),
        contract: "AAAA111111111111111111111111111111111111".into(),
        entry_mc: Some(60_000.0),
        hotlist: "Yes".into(),
        description: "FOO is riding the hot list.".into(),
        matched_signals: vec!["whale_buy".into()],
        tags: vec![],
        liquidity: Some(20_000.0),
        callers: None,
        subs: None,
        confirmation_count: 2,
        cohort_time: "1m ago".into(),
        last_buy_sol: None,
        top_buy_sol: None,
    }
}

fn write_registry(dir: &TempDir, users: &str, groups: &str) -> Arc<SubscriberRegistry> {
    let users_path = dir.path().join("subscriptions.json");
    let groups_path = dir.path().join("alert_groups.json");
    std::fs::write(&users_path, users).unwrap();
    std::fs::write(&groups_path, groups).unwrap();
    Arc::new(SubscriberRegistry::load(users_path, groups_path))
}

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<String>>,
    /// Recipients that fail permanently.
    unreachable: Vec<String>,
    /// Recipients that fail once, then succeed.
    flaky: Vec<String>,
    attempts: Mutex<std::collections::HashMap<String, u32>>,
}

#[async_trait]
impl DeliveryTransport for RecordingTransport {
    async fn send(&self, recipient: &str, _text: &str) -> Result<(), DeliveryError> {
        if self.unreachable.iter().any(|r| r == recipient) {
            return Err(DeliveryError::Unreachable("blocked".into()));
        }
        let mut attempts = self.attempts.lock();
        let n = attempts.entry(recipient.to_string()).or_insert(0);
        *n += 1;
        if self.flaky.iter().any(|r| r == recipient) && *n == 1 {
            return Err(DeliveryError::Transient("timeout".into()));
        }
        self.sent.lock().push(recipient.to_string());
        Ok(())
    }
}

fn adapter(
    registry: Arc<SubscriberRegistry>,
    transport: Arc<RecordingTransport>,
    broadcast: Option<String>,
) -> FanoutAdapter {
    let cfg = FanoutConfig {
        broadcast_channel: broadcast,
        retries: 2,
        retry_delay_secs: 0,
        ..FanoutConfig::default()
    };
    FanoutAdapter::new(registry, transport, cfg, Metrics::new())
}

#[tokio::test]
async fn test_tier_filter_routing() {
    let dir = TempDir::new().unwrap();
    let registry = write_registry(
        &dir,
        r#"{"users": [{"id": "u1", "tiers": [1]}, {"id": "u2", "tiers": [1,2,3]}]}"#,
        r#"{"groups": ["g1"]}"#,
    );
    let transport = Arc::new(RecordingTransport::default());
    let adapter = adapter(registry, transport.clone(), None);

    adapter.deliver(&record(Tier::Two)).await;
    let sent = transport.sent.lock().clone();
    // u1 only wants tier 1; u2 and g1 take everything.
    assert!(!sent.contains(&"u1".to_string()));
    assert!(sent.contains(&"u2".to_string()));
    assert!(sent.contains(&"g1".to_string()));
}

#[tokio::test]
async fn test_tier1_hits_broadcast_channel() {
    let dir = TempDir::new().unwrap();
    let registry = write_registry(&dir, r#"{"users": []}"#, r#"{"groups": []}"#);
    let transport = Arc::new(RecordingTransport::default());
    let adapter = adapter(registry, transport.clone(), Some("@broadcast".into()));

    adapter.deliver(&record(Tier::One)).await;
    assert!(transport.sent.lock().contains(&"@broadcast".to_string()));

    adapter.deliver(&record(Tier::Two)).await;
    assert_eq!(
        transport
            .sent
            .lock()
            .iter()
            .filter(|r| *r == "@broadcast")
            .count(),
        1
    );
}

#[tokio::test]
async fn test_transient_failure_retries_and_keeps_recipient() {
    let dir = TempDir::new().unwrap();
    let registry = write_registry(&dir, r#"{"users": ["u1"]}"#, r#"{"groups": []}"#);
    let transport = Arc::new(RecordingTransport {
        flaky: vec!["u1".into()],
        ..RecordingTransport::default()
    });
    let adapter = adapter(registry.clone(), transport.clone(), None);

    adapter.deliver(&record(Tier::One)).await;
    assert!(transport.sent.lock().contains(&"u1".to_string()));
    let (users, _) = registry.counts();
    assert_eq!(users, 1);
}

#[tokio::test]
async fn test_unreachable_recipient_removed_from_registry() {
    let dir = TempDir::new().unwrap();
    let registry = write_registry(
        &dir,
        r#"{"users": ["gone", "alive"]}"#,
        r#"{"groups": []}"#,
    );
    let transport = Arc::new(RecordingTransport {
        unreachable: vec!["gone".into()],
        ..RecordingTransport::default()
    });
    let adapter = adapter(registry.clone(), transport.clone(), None);

    adapter.deliver(&record(Tier::One)).await;

    let (users, _) = registry.counts();
    assert_eq!(users, 1);
    // The rewrite persisted to disk.
    let text = std::fs::read_to_string(dir.path().join("subscriptions.json")).unwrap();
    assert!(!text.contains("gone"));
    assert!(text.contains("alive"));
}

#[test]
fn test_render_alert_carries_data_fields() {
    let text = render_alert(&record(Tier::One));
    assert!(text.contains("Tier 1"));
    assert!(text.contains("FOO"));
    assert!(text.contains("$60.0K"));
    assert!(text.contains("AAAA111111111111111111111111111111111111"));
}
