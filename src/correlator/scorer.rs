//! Tier rules.
//!
//! Pure evaluation over a token-state snapshot: eligibility gates, the
//! three tier rules in declared order, then boundary adjustments
//! (penalties, buy-size boost, dynamic tightening).

use crate::config::{PenaltyConfig, TierConfig, WindowConfig};
use crate::state::TokenState;
use crate::types::{DescriptionTheme, SignalTag, Tier};
use chrono::{DateTime, Duration, Utc};

/// Why evaluation produced nothing; logged at debug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Eligibility gate failed.
    Gate(&'static str),
    /// Gates held but no tier rule fired.
    NoRule,
    /// A penalty demoted the candidate below tier 3.
    DemotedOut,
}

/// A fired rule set, before dedup and enrichment.
#[derive(Debug, Clone)]
pub struct RuleOutcome {
    pub tier: Tier,
    pub reasons: Vec<String>,
    pub theme: DescriptionTheme,
    pub matched_signals: Vec<String>,
    pub confirmation_count: u32,
    pub hotlist: bool,
    pub late_hotlist: bool,
    pub entry_mc: Option<f64>,
}

pub struct Scorer {
    pub tiers: TierConfig,
    pub penalties: PenaltyConfig,
    pub windows: WindowConfig,
}

impl Scorer {
    /// Evaluate one state. `tightened` applies the dynamic tier-1
    /// thresholds; `churn` is the outcome-feed verdict for this symbol.
    pub fn evaluate(
        &self,
        state: &TokenState,
        now: DateTime<Utc>,
        tightened: bool,
        churn: bool,
    ) -> Result<RuleOutcome, Rejection> {
        // Gate 1: real contract only. Sentinel states are never created,
        // but the invariant is cheap to assert.
        if state.contract.starts_with(crate::types::HOTLIST_PREFIX) {
            return Err(Rejection::Gate("hotlist_sentinel"));
        }
        // Gate 2: liquidity floor, when known.
        if let Some(liq) = state.latest_liquidity_usd {
            if liq < self.tiers.liq_gate {
                return Err(Rejection::Gate("liquidity_below_floor"));
            }
        }
        let entry_mc = state.cohort_entry_mc.or(state.latest_mc_usd);
        // Gate 3: market-cap ceiling, when known.
        if let Some(mc) = entry_mc {
            if mc > self.tiers.mc_cap {
                return Err(Rejection::Gate("market_cap_above_cap"));
            }
        }
        // Gate 4: social-only states are excluded.
        if state.is_social_only() {
            return Err(Rejection::Gate("social_only"));
        }

        // All windowed rules hang off the cohort start.
        let Some(t0) = state.cohort_start else {
            return Err(Rejection::Gate("no_cohort"));
        };

        let hotlist_window = Duration::minutes(self.windows.cohort_hotlist_mins);
        let hotlist_timely = state.hotlist_within(t0, hotlist_window);
        let hotlist_late = state.hotlist_outside(t0, hotlist_window);
        let confirmations: Vec<SignalTag> = state
            .tags_union
            .iter()
            .copied()
            .filter(|t| t.is_confirmation())
            .collect();
        let confirmation_count = confirmations.len() as u32;

        let mut reasons = Vec::new();
        let base = self.base_tier(
            state,
            now,
            t0,
            entry_mc,
            hotlist_timely,
            hotlist_late,
            confirmation_count,
            tightened,
            &mut reasons,
        );
        let Some(base) = base else {
            return Err(Rejection::NoRule);
        };

        let mut tier = Some(base);

        // Buy-size boost: tier 2/3 boundary only, never into tier 1.
        if base == Tier::Three {
            let top = state.top_buy_sol.unwrap_or(0.0);
            let last = state.last_buy_sol.unwrap_or(0.0);
            if top >= self.penalties.boost_top_buy_sol || last >= self.penalties.boost_last_buy_sol
            {
                tier = Some(Tier::Two);
                reasons.push("buy_size_boost".into());
            }
        }

        if let Some(liq) = state.latest_liquidity_usd {
            if liq < self.penalties.low_liq_threshold {
                tier = demote(tier);
                reasons.push("low_liquidity_penalty".into());
            }
        }
        if churn {
            tier = demote(tier);
            reasons.push("churn_penalty".into());
        }

        let Some(tier) = tier else {
            return Err(Rejection::DemotedOut);
        };

        let matched_signals: Vec<String> = state
            .tags_union
            .iter()
            .filter(|t| !matches!(t, SignalTag::StaleMc))
            .map(|t| t.as_str().to_string())
            .collect();

        Ok(RuleOutcome {
            tier,
            reasons,
            theme: pick_theme(state, hotlist_timely || hotlist_late),
            matched_signals,
            confirmation_count,
            hotlist: hotlist_timely || hotlist_late,
            late_hotlist: hotlist_late && !hotlist_timely,
            entry_mc,
        })
    }

    /// Tier rules in declared order; first satisfied wins.
    #[allow(clippy::too_many_arguments)]
    fn base_tier(
        &self,
        state: &TokenState,
        now: DateTime<Utc>,
        t0: DateTime<Utc>,
        entry_mc: Option<f64>,
        hotlist_timely: bool,
        hotlist_late: bool,
        confirmation_count: u32,
        tightened: bool,
        reasons: &mut Vec<String>,
    ) -> Option<Tier> {
        let state_window = Duration::minutes(self.windows.state_mins);

        // Tier 1.
        let tier1_mc_max = if tightened {
            self.tiers.tier1_mc_max + self.tiers.dynamic_mc_bump
        } else {
            self.tiers.tier1_mc_max
        };
        let social_factor = if tightened {
            1.0 + self.tiers.dynamic_social_pct / 100.0
        } else {
            1.0
        };
        let callers_min = (self.tiers.social_callers_min as f64 * social_factor).ceil() as u32;
        let subs_min = (self.tiers.social_subs_min as f64 * social_factor).ceil() as u64;
        let social_strong = state.latest_callers.is_some_and(|c| c >= callers_min)
            && state.latest_subs.is_some_and(|s| s >= subs_min);
        // Gate 1 already guarantees a real contract; social strength is the
        // alternative qualifying path.
        let contract_present = !state.contract.starts_with(crate::types::HOTLIST_PREFIX);

        if now - t0 <= state_window
            && hotlist_timely
            && confirmation_count >= 1
            && entry_mc.is_some_and(|mc| {
                mc >= self.tiers.tier1_mc_min && mc <= tier1_mc_max
            })
            && (contract_present || social_strong)
        {
            reasons.push("tier1_hotlist_confirmed".into());
            return Some(Tier::One);
        }

        // Tier 2.
        if hotlist_timely
            && confirmation_count >= 1
            && entry_mc.is_some_and(|mc| {
                mc >= self.tiers.tier2_mc_min && mc <= self.tiers.tier2_mc_max
            })
        {
            reasons.push("tier2_hotlist_window".into());
            return Some(Tier::Two);
        }

        // Tier 3: confirmations alone, or a late hotlist.
        if confirmation_count >= 2 {
            reasons.push("tier3_multi_confirmation".into());
            return Some(Tier::Three);
        }
        if hotlist_late {
            reasons.push("tier3_late_hotlist".into());
            return Some(Tier::Three);
        }

        None
    }
}

fn demote(tier: Option<Tier>) -> Option<Tier> {
    match tier {
        Some(Tier::One) => Some(Tier::Two),
        Some(Tier::Two) => Some(Tier::Three),
        Some(Tier::Three) | None => None,
    }
}

/// Deterministic theme choice from the observed tags.
fn pick_theme(state: &TokenState, hotlist: bool) -> DescriptionTheme {
    if hotlist {
        DescriptionTheme::Hotlist
    } else if state.tags_union.contains(&SignalTag::MomentumSpike) {
        DescriptionTheme::Momentum
    } else if state.tags_union.contains(&SignalTag::WhaleBuy)
        || state.tags_union.contains(&SignalTag::LargeBuy)
    {
        DescriptionTheme::SmartMoney
    } else {
        DescriptionTheme::EarlyTrending
    }
}
