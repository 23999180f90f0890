//! Per-contract rolling state.
//!
//! Keyed by canonical contract address; single-writer discipline, only the
//! correlator task mutates. Hotlist sentinels live alongside real contracts
//! until they can be reconciled by symbol.

#[cfg(test)]
mod tests;

use crate::config::WindowConfig;
use crate::types::{ParsedEvent, SignalTag, SourceKind, Tier};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Rolling aggregate for one contract.
#[derive(Debug, Clone)]
pub struct TokenState {
    pub contract: String,
    pub symbol: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    /// Bounded event ring, trimmed to the state window.
    pub events: VecDeque<ParsedEvent>,
    pub sources_seen: BTreeSet<String>,
    pub kinds_seen: HashSet<SourceKind>,
    pub tags_union: BTreeSet<SignalTag>,
    /// First momentum 2x/3x confirmation; survives ring trimming.
    pub cohort_start: Option<DateTime<Utc>>,
    /// Market cap at cohort start, or the first MC seen after it.
    pub cohort_entry_mc: Option<f64>,
    /// Times a hotlist appearance was merged onto this state.
    pub hotlist_observations: Vec<DateTime<Utc>>,
    /// Strongest tier already emitted, with its emission time and the
    /// cohort it belonged to.
    pub alerted_tier: Option<Tier>,
    pub alerted_at: Option<DateTime<Utc>>,
    pub alerted_cohort: Option<DateTime<Utc>>,
    // Derived metrics, refreshed on every upsert.
    pub total_buy_sol: f64,
    pub distinct_buy_sources: usize,
    pub first_to_second_buy_gap_secs: Option<i64>,
    pub time_spread_secs: i64,
    pub last_buy_sol: Option<f64>,
    pub top_buy_sol: Option<f64>,
    pub latest_mc_usd: Option<f64>,
    pub latest_liquidity_usd: Option<f64>,
    pub latest_callers: Option<u32>,
    pub latest_subs: Option<u64>,
}

impl TokenState {
    fn new(contract: String, symbol: String, now: DateTime<Utc>) -> Self {
        Self {
            contract,
            symbol,
            first_seen_at: now,
            last_updated_at: now,
            events: VecDeque::new(),
            sources_seen: BTreeSet::new(),
            kinds_seen: HashSet::new(),
            tags_union: BTreeSet::new(),
            cohort_start: None,
            cohort_entry_mc: None,
            hotlist_observations: Vec::new(),
            alerted_tier: None,
            alerted_at: None,
            alerted_cohort: None,
            total_buy_sol: 0.0,
            distinct_buy_sources: 0,
            first_to_second_buy_gap_secs: None,
            time_spread_secs: 0,
            last_buy_sol: None,
            top_buy_sol: None,
            latest_mc_usd: None,
            latest_liquidity_usd: None,
            latest_callers: None,
            latest_subs: None,
        }
    }

    /// Only social-kind sources have ever been seen.
    pub fn is_social_only(&self) -> bool {
        !self.kinds_seen.is_empty() && self.kinds_seen.iter().all(|k| k.is_social())
    }

    /// Hotlist observation inside [t0 - window, t0 + window].
    pub fn hotlist_within(&self, t0: DateTime<Utc>, window: Duration) -> bool {
        self.hotlist_observations
            .iter()
            .any(|t| (*t - t0).abs() <= window)
    }

    /// Hotlist observation outside the cohort window (a "late" hotlist).
    pub fn hotlist_outside(&self, t0: DateTime<Utc>, window: Duration) -> bool {
        self.hotlist_observations
            .iter()
            .any(|t| (*t - t0).abs() > window)
    }

    fn rederive(&mut self) {
        let mut total = 0.0;
        let mut buy_sources = HashSet::new();
        let mut buy_times: Vec<DateTime<Utc>> = Vec::new();
        let mut last_buy: Option<(DateTime<Utc>, f64)> = None;
        let mut top_buy: Option<f64> = None;

        for ev in &self.events {
            if let Some(sol) = ev.buy_sol {
                total += sol;
                buy_sources.insert(ev.source_id.clone());
                buy_times.push(ev.observed_at);
                if last_buy.map_or(true, |(t, _)| ev.observed_at >= t) {
                    last_buy = Some((ev.observed_at, sol));
                }
                if top_buy.map_or(true, |b| sol > b) {
                    top_buy = Some(sol);
                }
            }
            if ev.market_cap_usd.is_some() {
                self.latest_mc_usd = ev.market_cap_usd;
            }
            if ev.liquidity_usd.is_some() {
                self.latest_liquidity_usd = ev.liquidity_usd;
            }
            if ev.callers.is_some() {
                self.latest_callers = ev.callers;
            }
            if ev.subs.is_some() {
                self.latest_subs = ev.subs;
            }
        }

        buy_times.sort_unstable();
        self.total_buy_sol = total;
        self.distinct_buy_sources = buy_sources.len();
        self.first_to_second_buy_gap_secs = (buy_times.len() >= 2)
            .then(|| (buy_times[1] - buy_times[0]).num_seconds());
        self.time_spread_secs = match (self.events.front(), self.events.back()) {
            (Some(first), Some(last)) => {
                (last.observed_at - first.observed_at).num_seconds()
            }
            _ => 0,
        };
        self.last_buy_sol = last_buy.map(|(_, sol)| sol);
        self.top_buy_sol = top_buy;
    }
}

/// Normalize a symbol for matching: uppercase, strip # and $ prefixes.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim_matches(|c| c == '#' || c == '$').to_uppercase()
}

/// Exact match, or partial containment for symbols of at least 4 chars.
pub fn symbols_match(a: &str, b: &str) -> bool {
    let a = normalize_symbol(a);
    let b = normalize_symbol(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }
    a.len() >= 4 && b.len() >= 4 && (a.contains(&b) || b.contains(&a))
}

/// What `upsert` did, so the correlator knows whether to evaluate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Real-contract state changed; evaluate this contract.
    Updated(String),
    /// Hotlist sentinel merged onto a real contract; evaluate it.
    HotlistMerged(String),
    /// Orphan sentinel stored; nothing to evaluate.
    SentinelStored,
}

pub struct TokenStateStore {
    windows: WindowConfig,
    states: HashMap<String, TokenState>,
    /// Orphan hotlist sentinels, keyed by normalized symbol.
    sentinels: HashMap<String, DateTime<Utc>>,
}

impl TokenStateStore {
    pub fn new(windows: WindowConfig) -> Self {
        Self {
            windows,
            states: HashMap::new(),
            sentinels: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn state_window(&self) -> Duration {
        Duration::minutes(self.windows.state_mins)
    }

    /// Append an event, trim the window, refresh derived metrics.
    pub fn upsert(&mut self, event: ParsedEvent, now: DateTime<Utc>) -> UpsertOutcome {
        if event.is_hotlist_sentinel() {
            return self.upsert_sentinel(&event, now);
        }

        let contract = event.contract_address.clone();
        let horizon = now - self.state_window();
        let ring_capacity = self.windows.ring_capacity;
        let match_window = Duration::minutes(self.windows.hotlist_match_mins);

        let state = self
            .states
            .entry(contract.clone())
            .or_insert_with(|| TokenState::new(contract.clone(), event.symbol.clone(), now));

        if state.symbol == "UNKNOWN" && event.symbol != "UNKNOWN" {
            state.symbol = event.symbol.clone();
        }
        state.last_updated_at = now;
        state.sources_seen.insert(event.source_id.clone());
        state.kinds_seen.insert(event.kind);
        state.tags_union.extend(event.signal_tags.iter().copied());

        // Entry MC is pinned at cohort start; later readings never
        // overwrite it (the emitter falls back to live enrichment).
        if state.cohort_start.is_none()
            && event.signal_tags.contains(&SignalTag::CohortConfirmation)
        {
            state.cohort_start = Some(event.observed_at);
            state.cohort_entry_mc = event.market_cap_usd.or(state.latest_mc_usd);
        }

        state.events.push_back(event);
        while let Some(front) = state.events.front() {
            if front.observed_at < horizon {
                state.events.pop_front();
            } else {
                break;
            }
        }
        while state.events.len() > ring_capacity {
            state.events.pop_front();
        }
        state.rederive();

        // A sentinel seen earlier may belong to this contract.
        let symbol = normalize_symbol(&state.symbol);
        let first_seen = state.first_seen_at;
        let matched: Vec<String> = self
            .sentinels
            .iter()
            .filter(|(sym, seen_at)| {
                symbols_match(sym, &symbol) && (**seen_at - first_seen).abs() <= match_window
            })
            .map(|(sym, _)| sym.clone())
            .collect();
        for sym in matched {
            if let Some(seen_at) = self.sentinels.remove(&sym) {
                let state = self.states.get_mut(&contract).expect("state just inserted");
                state.tags_union.insert(SignalTag::Top5Hotlist);
                state.hotlist_observations.push(seen_at);
            }
        }

        UpsertOutcome::Updated(contract)
    }

    /// Hotlist sentinel: merge onto a live real-contract state when the
    /// symbol matches, otherwise keep as an orphan for later arrival.
    fn upsert_sentinel(&mut self, event: &ParsedEvent, now: DateTime<Utc>) -> UpsertOutcome {
        if !event.signal_tags.contains(&SignalTag::Top5Hotlist) {
            // Listed but below the top entries; nothing to merge.
            return UpsertOutcome::SentinelStored;
        }
        let symbol = normalize_symbol(&event.symbol);

        let target = self
            .states
            .values()
            .filter(|s| symbols_match(&s.symbol, &symbol))
            .map(|s| s.contract.clone())
            .next();

        match target {
            Some(contract) => {
                let state = self.states.get_mut(&contract).expect("state exists");
                state.tags_union.insert(SignalTag::Top5Hotlist);
                state.hotlist_observations.push(event.observed_at);
                state.last_updated_at = now;
                UpsertOutcome::HotlistMerged(contract)
            }
            None => {
                self.sentinels.insert(symbol, event.observed_at);
                UpsertOutcome::SentinelStored
            }
        }
    }

    /// Immutable view for the scorer.
    pub fn snapshot(&self, contract: &str) -> Option<TokenState> {
        self.states.get(contract).cloned()
    }

    /// Record that a tier fired; keeps the strongest tier, its time, and
    /// the cohort it fired for.
    pub fn mark_alerted(
        &mut self,
        contract: &str,
        tier: Tier,
        cohort_start: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) {
        if let Some(state) = self.states.get_mut(contract) {
            let stronger = match state.alerted_tier {
                Some(prev) => tier.is_stronger_than(prev),
                None => true,
            };
            if stronger {
                state.alerted_tier = Some(tier);
            }
            state.alerted_at = Some(now);
            state.alerted_cohort = cohort_start;
        }
    }

    /// A strictly stronger tier always passes. An equal-or-weaker tier is
    /// suppressed for the lifetime of the cohort it already alerted on,
    /// and for the dedup window otherwise.
    pub fn should_suppress(
        &self,
        contract: &str,
        tier: Tier,
        cohort_start: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(state) = self.states.get(contract) else {
            return false;
        };
        let (Some(prev_tier), Some(alerted_at)) = (state.alerted_tier, state.alerted_at) else {
            return false;
        };
        if tier.is_stronger_than(prev_tier) {
            return false;
        }
        if cohort_start.is_some() && state.alerted_cohort == cohort_start {
            return true;
        }
        now - alerted_at < Duration::seconds(self.windows.dedupe_secs)
    }

    /// Drop orphan sentinels past the state window, and LRU-evict idle
    /// states once the tracked-contract cap is exceeded.
    pub fn evict(&mut self, now: DateTime<Utc>) {
        let horizon = now - self.state_window();
        self.sentinels.retain(|_, seen_at| *seen_at >= horizon);

        if self.states.len() <= self.windows.max_tracked_contracts {
            return;
        }
        let mut idle: Vec<(String, DateTime<Utc>)> = self
            .states
            .values()
            .filter(|s| s.last_updated_at < horizon)
            .map(|s| (s.contract.clone(), s.last_updated_at))
            .collect();
        idle.sort_by_key(|(_, at)| *at);
        let excess = self.states.len() - self.windows.max_tracked_contracts;
        for (contract, _) in idle.into_iter().take(excess) {
            self.states.remove(&contract);
        }
    }
}
