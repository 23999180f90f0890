//! Correlator and alert emitter.
//!
//! The linearizer of the pipeline: the single task that owns token state,
//! evaluates tier rules after every upsert, deduplicates, enriches, appends
//! to the durable log and hands records to fan-out. Nothing else mutates
//! state or writes the log.

pub mod scorer;


use crate::config::Config;
use crate::enrich::QuoteService;
use crate::error::Result;
use crate::metrics::SharedMetrics;
use crate::state::{normalize_symbol, TokenState, TokenStateStore, UpsertOutcome};
use crate::storage::AlertLog;
use crate::types::{
    format_relative, AlertRecord, DescriptionTheme, ParsedEvent, SignalTag, SourceKind, Tier,
};
use chrono::{DateTime, Duration, Utc};
use scorer::{Rejection, RuleOutcome, Scorer};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Messages consumed by the correlator task. Sweeps come from the
/// periodic-jobs task so all state mutation stays on one task.
#[derive(Debug)]
pub enum CorrelatorMsg {
    Event(ParsedEvent),
    Sweep,
}

pub struct Correlator {
    scorer: Scorer,
    store: TokenStateStore,
    log: Arc<AlertLog>,
    quotes: Arc<dyn QuoteService>,
    fanout_tx: mpsc::Sender<AlertRecord>,
    mirror_tx: Option<mpsc::Sender<AlertRecord>>,
    metrics: SharedMetrics,
    latency_budget: Duration,
    churn_window: Duration,
    churn_peak: f64,
    /// Tier-1 emission times in the last 24h, for dynamic thresholding.
    tier1_times: VecDeque<DateTime<Utc>>,
    tightened: bool,
    dynamic_tighten_above: usize,
    dynamic_restore_below: usize,
    /// Last alert time per normalized symbol (churn lookback).
    symbol_alerts: HashMap<String, DateTime<Utc>>,
    /// Peak momentum multiplier echoed per normalized symbol.
    symbol_peaks: HashMap<String, f64>,
}

impl Correlator {
    pub fn new(
        config: &Config,
        log: Arc<AlertLog>,
        quotes: Arc<dyn QuoteService>,
        fanout_tx: mpsc::Sender<AlertRecord>,
        mirror_tx: Option<mpsc::Sender<AlertRecord>>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            scorer: Scorer {
                tiers: config.tiers.clone(),
                penalties: config.penalties.clone(),
                windows: config.windows.clone(),
            },
            store: TokenStateStore::new(config.windows.clone()),
            log,
            quotes,
            fanout_tx,
            mirror_tx,
            metrics,
            latency_budget: Duration::seconds(config.ingest.latency_budget_secs as i64),
            churn_window: Duration::hours(config.penalties.churn_window_hours),
            churn_peak: config.penalties.churn_peak,
            tier1_times: VecDeque::new(),
            tightened: false,
            dynamic_tighten_above: config.tiers.dynamic_tighten_above,
            dynamic_restore_below: config.tiers.dynamic_restore_below,
            symbol_alerts: HashMap::new(),
            symbol_peaks: HashMap::new(),
        }
    }

    /// Consume events until the channel closes. The only error that
    /// escapes is a durable-write failure past the emergency sidecar.
    pub async fn run(mut self, mut rx: mpsc::Receiver<CorrelatorMsg>) -> Result<()> {
        while let Some(msg) = rx.recv().await {
            match msg {
                CorrelatorMsg::Event(event) => {
                    self.handle_event(event, Utc::now()).await?;
                }
                CorrelatorMsg::Sweep => {
                    let now = Utc::now();
                    self.store.evict(now);
                    self.refresh_dynamic(now);
                    self.prune_symbol_tracking(now);
                }
            }
        }
        info!("correlator channel closed, draining complete");
        Ok(())
    }

    pub async fn handle_event(&mut self, event: ParsedEvent, now: DateTime<Utc>) -> Result<()> {
        if now - event.observed_at > self.latency_budget {
            self.metrics.stale_dropped.fetch_add(1, Ordering::Relaxed);
            debug!(
                source = %event.source_id,
                lag_secs = (now - event.observed_at).num_seconds(),
                "event past latency budget, dropped"
            );
            return Ok(());
        }

        // Outcome feed: momentum multiplier echoes record peak data used
        // by the churn penalty.
        if let Some(mult) = event.multiplier {
            let sym = normalize_symbol(&event.symbol);
            let peak = self.symbol_peaks.entry(sym).or_insert(0.0);
            if mult > *peak {
                *peak = mult;
            }
        }

        // Trending-tracker echo of an already-alerted symbol updates the
        // written records' callers/subs.
        if matches!(event.kind, SourceKind::MomentumFeed | SourceKind::TrendingFeed) {
            if let (Some(callers), Some(subs)) = (event.callers, event.subs) {
                let sym = normalize_symbol(&event.symbol);
                if self.symbol_alerts.contains_key(&sym) {
                    if let Err(e) = self.log.update_callers_subs(&sym, None, callers, subs).await
                    {
                        warn!(symbol = %sym, error = %e, "callers/subs echo failed");
                    }
                }
            }
        }

        match self.store.upsert(event, now) {
            UpsertOutcome::Updated(contract) | UpsertOutcome::HotlistMerged(contract) => {
                self.evaluate(&contract, now).await
            }
            UpsertOutcome::SentinelStored => Ok(()),
        }
    }

    async fn evaluate(&mut self, contract: &str, now: DateTime<Utc>) -> Result<()> {
        let Some(snapshot) = self.store.snapshot(contract) else {
            return Ok(());
        };
        self.refresh_dynamic(now);
        let churn = self.churn_hit(&snapshot.symbol, snapshot.cohort_start);

        let outcome = match self.scorer.evaluate(&snapshot, now, self.tightened, churn) {
            Ok(outcome) => outcome,
            Err(Rejection::Gate(reason)) => {
                self.metrics
                    .eligibility_rejected
                    .fetch_add(1, Ordering::Relaxed);
                debug!(contract, reason, "eligibility rejected");
                return Ok(());
            }
            Err(Rejection::NoRule) => {
                debug!(contract, "no tier rule fired");
                return Ok(());
            }
            Err(Rejection::DemotedOut) => {
                debug!(contract, "candidate demoted below tier 3");
                return Ok(());
            }
        };

        if self
            .store
            .should_suppress(contract, outcome.tier, snapshot.cohort_start, now)
        {
            self.metrics.dedup_suppressed.fetch_add(1, Ordering::Relaxed);
            debug!(contract, tier = %outcome.tier, "dedup suppressed");
            return Ok(());
        }

        self.emit(&snapshot, outcome, now).await
    }

    /// Dedup passed; enrich, build the record, append, then fan out.
    async fn emit(
        &mut self,
        state: &TokenState,
        outcome: RuleOutcome,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut entry_mc = state.cohort_entry_mc;
        let mut stale_mc = false;
        if entry_mc.is_none() {
            match self.quotes.snapshot(&state.contract).await {
                Ok(snap) if snap.market_cap_usd.is_some() => {
                    entry_mc = snap.market_cap_usd;
                }
                other => {
                    if let Err(e) = other {
                        debug!(contract = %state.contract, error = %e, "enrichment failed");
                    }
                    self.metrics.enrich_failures.fetch_add(1, Ordering::Relaxed);
                    // Freshest parsed MC, or null when never observed.
                    entry_mc = state.latest_mc_usd;
                    stale_mc = true;
                }
            }
        }

        let cohort_start = state.cohort_start.unwrap_or(state.first_seen_at);
        let tier = outcome.tier;
        let id = self.log.next_record_id(&state.contract, now).await;

        let record = AlertRecord {
            id,
            token: state.symbol.clone(),
            tier,
            level: tier.level(),
            timestamp: now,
            contract: state.contract.clone(),
            entry_mc,
            hotlist: if outcome.hotlist { "Yes" } else { "No" }.to_string(),
            description: render_description(&outcome.theme, state, outcome.confirmation_count),
            matched_signals: outcome.matched_signals.clone(),
            tags: build_tags(state, &outcome, stale_mc),
            liquidity: state.latest_liquidity_usd,
            callers: state.latest_callers,
            subs: state.latest_subs,
            confirmation_count: outcome.confirmation_count,
            cohort_time: format_relative(cohort_start, now),
            last_buy_sol: state.last_buy_sol,
            top_buy_sol: state.top_buy_sol,
        };

        // Append-before-fan-out: the log is authoritative.
        self.log.append(record.clone()).await?;

        if let Some(tx) = &self.mirror_tx {
            if tx.try_send(record.clone()).is_err() {
                warn!(id = %record.id, "mirror channel full, record not mirrored this cycle");
            }
        }

        match self.fanout_tx.try_send(record.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.fanout_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(id = %record.id, "fan-out channel full, delivery dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(id = %record.id, "fan-out channel closed");
            }
        }

        self.store
            .mark_alerted(&state.contract, tier, state.cohort_start, now);
        self.symbol_alerts
            .insert(normalize_symbol(&state.symbol), now);
        if tier == Tier::One {
            self.tier1_times.push_back(now);
            self.refresh_dynamic(now);
        }

        info!(
            id = %record.id,
            token = %record.token,
            tier = %tier,
            entry_mc = ?record.entry_mc,
            reasons = ?outcome.reasons,
            "alert emitted"
        );
        Ok(())
    }

    /// Prior alert for the symbol before this cohort, within the churn
    /// lookback, with outcome data showing it never reached the peak.
    fn churn_hit(&self, symbol: &str, cohort_start: Option<DateTime<Utc>>) -> bool {
        let Some(t0) = cohort_start else {
            return false;
        };
        let sym = normalize_symbol(symbol);
        let Some(prior) = self.symbol_alerts.get(&sym) else {
            return false;
        };
        if *prior >= t0 || t0 - *prior > self.churn_window {
            return false;
        }
        // Absence of outcome data means no penalty.
        self.symbol_peaks
            .get(&sym)
            .is_some_and(|peak| *peak < self.churn_peak)
    }

    /// Tighten tier-1 thresholds when the 24h rate runs hot; restore once
    /// it cools below the lower bound.
    fn refresh_dynamic(&mut self, now: DateTime<Utc>) {
        let day_ago = now - Duration::hours(24);
        while self
            .tier1_times
            .front()
            .is_some_and(|t| *t < day_ago)
        {
            self.tier1_times.pop_front();
        }
        let rate = self.tier1_times.len();
        if !self.tightened && rate > self.dynamic_tighten_above {
            self.tightened = true;
            info!(rate, "tier-1 rate high, tightening thresholds");
        } else if self.tightened && rate < self.dynamic_restore_below {
            self.tightened = false;
            info!(rate, "tier-1 rate recovered, restoring thresholds");
        }
    }

    fn prune_symbol_tracking(&mut self, now: DateTime<Utc>) {
        let horizon = now - self.churn_window;
        self.symbol_alerts.retain(|_, at| *at >= horizon);
        // Peaks are only meaningful alongside a tracked alert.
        let alive: std::collections::HashSet<&String> = self.symbol_alerts.keys().collect();
        self.symbol_peaks.retain(|sym, _| alive.contains(sym));
    }

    #[cfg(test)]
    pub fn store(&self) -> &TokenStateStore {
        &self.store
    }
}

/// Tags carried on the record: hotlist provenance plus the analysis
/// markers the log consumers filter on.
fn build_tags(state: &TokenState, outcome: &RuleOutcome, stale_mc: bool) -> Vec<String> {
    let mut tags = Vec::new();
    if outcome.hotlist {
        tags.push(SignalTag::Top5Hotlist.as_str().to_string());
    }
    if outcome.late_hotlist {
        tags.push(SignalTag::LateHotlist.as_str().to_string());
    }
    if stale_mc {
        tags.push(SignalTag::StaleMc.as_str().to_string());
    }
    if state.latest_liquidity_usd.is_some_and(|l| l < 5_000.0) {
        tags.push("low_liq".to_string());
    }
    let tiny = state.last_buy_sol.unwrap_or(0.0) < 5.0 && state.top_buy_sol.unwrap_or(0.0) < 5.0;
    if state.total_buy_sol > 0.0 && tiny {
        tags.push("tiny_buy".to_string());
    }
    tags
}

/// Deterministic description per theme; instantiated from the record's own
/// fields so re-running the stream reproduces it byte for byte.
fn render_description(theme: &DescriptionTheme, state: &TokenState, confirmations: u32) -> String {
    let token = &state.symbol;
    match theme {
        DescriptionTheme::Hotlist => format!(
            "{token} is riding the hot list with {confirmations} confirmation signal(s) stacked behind it."
        ),
        DescriptionTheme::Momentum => format!(
            "{token} just printed a momentum spike with {confirmations} confirmation signal(s) inside the window."
        ),
        DescriptionTheme::SmartMoney => format!(
            "Smart money is stepping into {token}: top buy {:.1} SOL across {} buying source(s).",
            state.top_buy_sol.unwrap_or(0.0),
            state.distinct_buy_sources
        ),
        DescriptionTheme::EarlyTrending => format!(
            "{token} is trending early with {confirmations} confirmation signal(s) on the board."
        ),
    }
}
