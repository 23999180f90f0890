//! Signal-tag assignment.
//!
//! Source kind sets the baseline; message content promotes the rest.

use super::numeric;
use crate::config::ParserConfig;
use crate::types::{SignalTag, SourceKind};
use std::collections::BTreeSet;

pub fn assign_tags(
    kind: SourceKind,
    text: &str,
    buy_sol: Option<f64>,
    multiplier: Option<f64>,
    cfg: &ParserConfig,
) -> BTreeSet<SignalTag> {
    let mut tags = BTreeSet::new();

    match kind {
        SourceKind::TrendingFeed => {
            tags.insert(SignalTag::EarlyTrending);
        }
        SourceKind::MomentumFeed => {
            if let Some(mult) = multiplier {
                if mult >= cfg.cohort_multiplier {
                    tags.insert(SignalTag::CohortConfirmation);
                }
            }
        }
        SourceKind::BuyFeed | SourceKind::SocialFeed | SourceKind::HotlistFeed => {}
    }

    if numeric::has_spike(text) {
        tags.insert(SignalTag::MomentumSpike);
    }

    if let Some(sol) = buy_sol {
        if sol > cfg.whale_buy_sol {
            tags.insert(SignalTag::WhaleBuy);
            tags.insert(SignalTag::LargeBuy);
        } else if sol > cfg.large_buy_sol {
            tags.insert(SignalTag::LargeBuy);
        }
    }

    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trending_baseline() {
        let tags = assign_tags(
            SourceKind::TrendingFeed,
            "🔥 FOO New Trending",
            None,
            None,
            &ParserConfig::default(),
        );
        assert!(tags.contains(&SignalTag::EarlyTrending));
    }

    #[test]
    fn test_cohort_confirmation_needs_multiplier() {
        let cfg = ParserConfig::default();
        let with = assign_tags(SourceKind::MomentumFeed, "FOO did 👉 2x", None, Some(2.0), &cfg);
        assert!(with.contains(&SignalTag::CohortConfirmation));

        let below = assign_tags(SourceKind::MomentumFeed, "FOO 1.5x", None, Some(1.5), &cfg);
        assert!(!below.contains(&SignalTag::CohortConfirmation));
    }

    #[test]
    fn test_buy_size_promotions() {
        let cfg = ParserConfig::default();
        let whale = assign_tags(SourceKind::BuyFeed, "Buy 25 SOL", Some(25.0), None, &cfg);
        assert!(whale.contains(&SignalTag::WhaleBuy));
        assert!(whale.contains(&SignalTag::LargeBuy));

        let large = assign_tags(SourceKind::BuyFeed, "Buy 6 SOL", Some(6.0), None, &cfg);
        assert!(large.contains(&SignalTag::LargeBuy));
        assert!(!large.contains(&SignalTag::WhaleBuy));

        let small = assign_tags(SourceKind::BuyFeed, "Buy 2 SOL", Some(2.0), None, &cfg);
        assert!(small.is_empty());
    }

    #[test]
    fn test_spike_promotion() {
        let tags = assign_tags(
            SourceKind::MomentumFeed,
            "⚡ FOO ($13.4K) - ⏫ 41.06% in 1.5s",
            None,
            None,
            &ParserConfig::default(),
        );
        assert!(tags.contains(&SignalTag::MomentumSpike));
    }
}
