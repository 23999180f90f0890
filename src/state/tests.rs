//! Unit tests for the token state store

use super::*;
use crate::config::WindowConfig;
use crate::types::{ParsedEvent, SignalTag, SourceKind};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;

const CONTRACT: &str = "AAAA111111111111111111111111111111111111";

fn base_time() -> DateTime<Utc> {
    "2026-01-02T12:00:00Z".parse().unwrap()
}

fn event(
    source_id: &str,
    kind: SourceKind,
    contract: &str,
    symbol: &str,
    at: DateTime<Utc>,
) -> ParsedEvent {
    ParsedEvent {
        source_id: source_id.into(),
        kind,
        observed_at: at,
        contract_address: contract.into(),
        symbol: symbol.into(),
        market_cap_usd: None,
        liquidity_usd: None,
        buy_sol: None,
        holders: None,
        callers: None,
        subs: None,
        multiplier: None,
        signal_tags: BTreeSet::new(),
    }
}

fn store() -> TokenStateStore {
    TokenStateStore::new(WindowConfig::default())
}

#[test]
fn test_upsert_creates_state_and_derives() {
    let mut store = store();
    let t0 = base_time();

    let mut buy = event("whale_buys", SourceKind::BuyFeed, CONTRACT, "FOO", t0);
    buy.buy_sol = Some(10.0);
    buy.market_cap_usd = Some(60_000.0);
    store.upsert(buy, t0);

    let mut buy2 = event("large_buys", SourceKind::BuyFeed, CONTRACT, "FOO", t0 + Duration::seconds(30));
    buy2.buy_sol = Some(5.0);
    store.upsert(buy2, t0 + Duration::seconds(30));

    let state = store.snapshot(CONTRACT).unwrap();
    assert_eq!(state.events.len(), 2);
    assert_eq!(state.total_buy_sol, 15.0);
    assert_eq!(state.distinct_buy_sources, 2);
    assert_eq!(state.first_to_second_buy_gap_secs, Some(30));
    assert_eq!(state.top_buy_sol, Some(10.0));
    assert_eq!(state.last_buy_sol, Some(5.0));
    assert_eq!(state.latest_mc_usd, Some(60_000.0));
}

#[test]
fn test_window_trim() {
    let mut store = store();
    let t0 = base_time();

    store.upsert(event("a", SourceKind::BuyFeed, CONTRACT, "FOO", t0), t0);
    let later = t0 + Duration::minutes(31);
    store.upsert(event("b", SourceKind::BuyFeed, CONTRACT, "FOO", later), later);

    let state = store.snapshot(CONTRACT).unwrap();
    // The first event fell outside the 30-minute window.
    assert_eq!(state.events.len(), 1);
    assert_eq!(state.events[0].source_id, "b");
}

#[test]
fn test_ring_capacity() {
    let mut store = TokenStateStore::new(WindowConfig {
        ring_capacity: 4,
        ..WindowConfig::default()
    });
    let t0 = base_time();
    for i in 0..10 {
        let at = t0 + Duration::seconds(i);
        store.upsert(event("a", SourceKind::BuyFeed, CONTRACT, "FOO", at), at);
    }
    assert_eq!(store.snapshot(CONTRACT).unwrap().events.len(), 4);
}

#[test]
fn test_cohort_start_survives_trim() {
    let mut store = store();
    let t0 = base_time();

    let mut cohort = event("momentum", SourceKind::MomentumFeed, CONTRACT, "FOO", t0);
    cohort.multiplier = Some(2.0);
    cohort.market_cap_usd = Some(200_000.0);
    cohort.signal_tags.insert(SignalTag::CohortConfirmation);
    store.upsert(cohort, t0);

    let later = t0 + Duration::minutes(45);
    store.upsert(event("b", SourceKind::BuyFeed, CONTRACT, "FOO", later), later);

    let state = store.snapshot(CONTRACT).unwrap();
    assert_eq!(state.events.len(), 1);
    assert_eq!(state.cohort_start, Some(t0));
    assert_eq!(state.cohort_entry_mc, Some(200_000.0));
}

#[test]
fn test_hotlist_merge_onto_existing_contract() {
    let mut store = store();
    let t0 = base_time();

    store.upsert(event("momentum", SourceKind::MomentumFeed, CONTRACT, "FOO", t0), t0);

    let mut sentinel = event(
        "hotlist",
        SourceKind::HotlistFeed,
        "HOTLIST:FOO",
        "FOO",
        t0 + Duration::seconds(30),
    );
    sentinel.signal_tags.insert(SignalTag::Top5Hotlist);
    let outcome = store.upsert(sentinel, t0 + Duration::seconds(30));

    assert_eq!(outcome, UpsertOutcome::HotlistMerged(CONTRACT.to_string()));
    let state = store.snapshot(CONTRACT).unwrap();
    assert!(state.tags_union.contains(&SignalTag::Top5Hotlist));
    assert_eq!(state.hotlist_observations.len(), 1);
}

#[test]
fn test_orphan_sentinel_reconciled_on_arrival() {
    let mut store = store();
    let t0 = base_time();

    let mut sentinel = event("hotlist", SourceKind::HotlistFeed, "HOTLIST:FOO", "FOO", t0);
    sentinel.signal_tags.insert(SignalTag::Top5Hotlist);
    assert_eq!(store.upsert(sentinel, t0), UpsertOutcome::SentinelStored);

    // Real contract arrives 5 minutes later; within the ±20 minute window.
    let arrival = t0 + Duration::minutes(5);
    store.upsert(
        event("momentum", SourceKind::MomentumFeed, CONTRACT, "FOO", arrival),
        arrival,
    );

    let state = store.snapshot(CONTRACT).unwrap();
    assert!(state.tags_union.contains(&SignalTag::Top5Hotlist));
}

#[test]
fn test_orphan_sentinel_outside_window_not_merged() {
    let mut store = store();
    let t0 = base_time();

    let mut sentinel = event("hotlist", SourceKind::HotlistFeed, "HOTLIST:FOO", "FOO", t0);
    sentinel.signal_tags.insert(SignalTag::Top5Hotlist);
    store.upsert(sentinel, t0);

    let arrival = t0 + Duration::minutes(25);
    store.upsert(
        event("momentum", SourceKind::MomentumFeed, CONTRACT, "FOO", arrival),
        arrival,
    );

    let state = store.snapshot(CONTRACT).unwrap();
    assert!(!state.tags_union.contains(&SignalTag::Top5Hotlist));
}

#[test]
fn test_symbol_partial_matching() {
    assert!(symbols_match("SNOWBALL", "SNOWBALL"));
    assert!(symbols_match("#SNOW", "$snow"));
    assert!(symbols_match("SNOWBALL", "SNOW"));
    assert!(!symbols_match("SNO", "SNOWBALL")); // below 4 chars, no partial
    assert!(!symbols_match("FOO", "BAR"));
}

#[test]
fn test_mark_alerted_keeps_strongest() {
    let mut store = store();
    let t0 = base_time();
    store.upsert(event("a", SourceKind::BuyFeed, CONTRACT, "FOO", t0), t0);

    store.mark_alerted(CONTRACT, Tier::Three, None, t0);
    assert_eq!(store.snapshot(CONTRACT).unwrap().alerted_tier, Some(Tier::Three));

    store.mark_alerted(CONTRACT, Tier::One, None, t0 + Duration::seconds(10));
    assert_eq!(store.snapshot(CONTRACT).unwrap().alerted_tier, Some(Tier::One));

    // A weaker tier later never downgrades the recorded strongest.
    store.mark_alerted(CONTRACT, Tier::Two, None, t0 + Duration::seconds(20));
    assert_eq!(store.snapshot(CONTRACT).unwrap().alerted_tier, Some(Tier::One));
}

#[test]
fn test_dedup_window_boundary() {
    let mut store = store();
    let t0 = base_time();
    store.upsert(event("a", SourceKind::BuyFeed, CONTRACT, "FOO", t0), t0);
    store.mark_alerted(CONTRACT, Tier::Two, None, t0);

    // Same tier inside the window: suppressed.
    assert!(store.should_suppress(CONTRACT, Tier::Two, None, t0 + Duration::seconds(120)));
    // Weaker tier inside the window: suppressed.
    assert!(store.should_suppress(CONTRACT, Tier::Three, None, t0 + Duration::seconds(120)));
    // Strictly stronger tier: never suppressed.
    assert!(!store.should_suppress(CONTRACT, Tier::One, None, t0 + Duration::seconds(120)));
    // Exactly at 300 s the window has elapsed.
    assert!(!store.should_suppress(CONTRACT, Tier::Two, None, t0 + Duration::seconds(300)));
}

#[test]
fn test_same_cohort_suppressed_past_window() {
    let mut store = store();
    let t0 = base_time();
    store.upsert(event("a", SourceKind::BuyFeed, CONTRACT, "FOO", t0), t0);
    store.mark_alerted(CONTRACT, Tier::One, Some(t0), t0 + Duration::seconds(60));

    // Ten minutes later, same cohort, same tier: still suppressed.
    assert!(store.should_suppress(
        CONTRACT,
        Tier::One,
        Some(t0),
        t0 + Duration::minutes(10)
    ));
    // A fresh cohort after the window is free to alert again.
    let t1 = t0 + Duration::hours(2);
    assert!(!store.should_suppress(CONTRACT, Tier::One, Some(t1), t1));
}

#[test]
fn test_social_only_exclusion_flag() {
    let mut store = store();
    let t0 = base_time();

    store.upsert(event("calls", SourceKind::SocialFeed, CONTRACT, "FOO", t0), t0);
    assert!(store.snapshot(CONTRACT).unwrap().is_social_only());

    store.upsert(
        event("whale_buys", SourceKind::BuyFeed, CONTRACT, "FOO", t0 + Duration::seconds(5)),
        t0 + Duration::seconds(5),
    );
    assert!(!store.snapshot(CONTRACT).unwrap().is_social_only());
}

#[test]
fn test_eviction_respects_cap_and_idle() {
    let mut store = TokenStateStore::new(WindowConfig {
        max_tracked_contracts: 2,
        ..WindowConfig::default()
    });
    let t0 = base_time();

    for (i, c) in ["C1", "C2", "C3"].iter().enumerate() {
        let contract = format!("{c}{}", "1".repeat(40 - c.len()));
        let at = t0 + Duration::seconds(i as i64);
        store.upsert(event("a", SourceKind::BuyFeed, &contract, "FOO", at), at);
    }
    assert_eq!(store.len(), 3);

    // Nothing is idle yet; cap exceeded but no eviction candidates.
    store.evict(t0 + Duration::minutes(5));
    assert_eq!(store.len(), 3);

    // All idle past the window; oldest evicted down to the cap.
    store.evict(t0 + Duration::minutes(40));
    assert_eq!(store.len(), 2);
}
