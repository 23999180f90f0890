//! Core domain types shared across the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Instant;

/// Prefix of the placeholder contract id used when only a symbol is known.
pub const HOTLIST_PREFIX: &str = "HOTLIST:";

/// Kind of upstream source, fixed at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    BuyFeed,
    SocialFeed,
    MomentumFeed,
    TrendingFeed,
    HotlistFeed,
}

impl SourceKind {
    pub fn is_social(&self) -> bool {
        matches!(self, SourceKind::SocialFeed)
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::BuyFeed => write!(f, "buy_feed"),
            SourceKind::SocialFeed => write!(f, "social_feed"),
            SourceKind::MomentumFeed => write!(f, "momentum_feed"),
            SourceKind::TrendingFeed => write!(f, "trending_feed"),
            SourceKind::HotlistFeed => write!(f, "hotlist_feed"),
        }
    }
}

/// Categorical signal extracted by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalTag {
    EarlyTrending,
    MomentumSpike,
    LargeBuy,
    WhaleBuy,
    Top5Hotlist,
    /// Momentum-tracker 2x/3x echo that opens a cohort.
    CohortConfirmation,
    /// Hotlist appearance outside the cohort window.
    LateHotlist,
    /// Entry MC taken from parsed state because live enrichment failed.
    StaleMc,
}

impl SignalTag {
    /// Tags that satisfy the tier rules' confirmation requirement.
    pub fn is_confirmation(&self) -> bool {
        matches!(
            self,
            SignalTag::EarlyTrending
                | SignalTag::MomentumSpike
                | SignalTag::LargeBuy
                | SignalTag::WhaleBuy
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalTag::EarlyTrending => "early_trending",
            SignalTag::MomentumSpike => "momentum_spike",
            SignalTag::LargeBuy => "large_buy",
            SignalTag::WhaleBuy => "whale_buy",
            SignalTag::Top5Hotlist => "top5_hotlist",
            SignalTag::CohortConfirmation => "cohort_confirmation",
            SignalTag::LateHotlist => "late_hotlist",
            SignalTag::StaleMc => "stale_mc",
        }
    }
}

impl std::fmt::Display for SignalTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence tier. Tier 1 is the strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tier {
    One,
    Two,
    Three,
}

impl Tier {
    pub fn number(&self) -> u8 {
        match self {
            Tier::One => 1,
            Tier::Two => 2,
            Tier::Three => 3,
        }
    }

    /// Ranking is 1 > 2 > 3.
    pub fn is_stronger_than(&self, other: Tier) -> bool {
        self.number() < other.number()
    }

    pub fn level(&self) -> AlertLevel {
        match self {
            Tier::One => AlertLevel::High,
            Tier::Two | Tier::Three => AlertLevel::Medium,
        }
    }
}

impl From<Tier> for u8 {
    fn from(t: Tier) -> u8 {
        t.number()
    }
}

impl TryFrom<u8> for Tier {
    type Error = String;

    fn try_from(n: u8) -> std::result::Result<Self, Self::Error> {
        match n {
            1 => Ok(Tier::One),
            2 => Ok(Tier::Two),
            3 => Ok(Tier::Three),
            other => Err(format!("invalid tier: {other}")),
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Alert level carried on the record; HIGH iff tier 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    High,
    Medium,
}

/// URL entity attached to a chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlEntity {
    pub url: String,
    pub anchor: Option<String>,
}

/// One inbound chat message, before parsing.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub source_id: String,
    pub received_at: DateTime<Utc>,
    /// Monotonic anchor taken at arrival; used for the latency budget.
    pub received_mono: Instant,
    pub text: String,
    pub entities: Vec<UrlEntity>,
    pub thread_id: Option<String>,
}

/// A message that yielded usable token data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedEvent {
    pub source_id: String,
    pub kind: SourceKind,
    pub observed_at: DateTime<Utc>,
    /// Canonical uppercase base58 address, or `HOTLIST:{symbol}`.
    pub contract_address: String,
    pub symbol: String,
    pub market_cap_usd: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub buy_sol: Option<f64>,
    pub holders: Option<u32>,
    pub callers: Option<u32>,
    pub subs: Option<u64>,
    /// Momentum-tracker multiplier echo (2.0, 3.0, ...), when present.
    pub multiplier: Option<f64>,
    pub signal_tags: BTreeSet<SignalTag>,
}

impl ParsedEvent {
    pub fn is_hotlist_sentinel(&self) -> bool {
        self.contract_address.starts_with(HOTLIST_PREFIX)
    }

    /// Symbol carried by a hotlist sentinel, if this event is one.
    pub fn hotlist_symbol(&self) -> Option<&str> {
        self.contract_address.strip_prefix(HOTLIST_PREFIX)
    }
}

/// Theme driving the rendered alert description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptionTheme {
    Hotlist,
    Momentum,
    SmartMoney,
    EarlyTrending,
}

/// Ephemeral output of the correlator, input to the emitter.
#[derive(Debug, Clone)]
pub struct AlertCandidate {
    pub contract: String,
    pub symbol: String,
    pub tier: Tier,
    /// Rule ids that fired, in evaluation order.
    pub reasons: Vec<String>,
    pub theme: DescriptionTheme,
    pub cohort_start: DateTime<Utc>,
    pub entry_mc_usd: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub callers: Option<u32>,
    pub subs: Option<u64>,
    pub matched_signals: Vec<String>,
    pub confirmation_count: u32,
    pub hotlist: bool,
    pub tags: BTreeSet<SignalTag>,
    pub last_buy_sol: Option<f64>,
    pub top_buy_sol: Option<f64>,
}

/// Durable alert, one element of the log's `alerts` array.
///
/// Serialized field names are lowerCamelCase; this is the authoritative
/// on-disk and API wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub id: String,
    pub token: String,
    pub tier: Tier,
    pub level: AlertLevel,
    pub timestamp: DateTime<Utc>,
    pub contract: String,
    /// Market cap at alert time; null when never observed (S6).
    pub entry_mc: Option<f64>,
    pub hotlist: String,
    pub description: String,
    pub matched_signals: Vec<String>,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callers: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subs: Option<u64>,
    pub confirmation_count: u32,
    pub cohort_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_buy_sol: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_buy_sol: Option<f64>,
}

/// The whole persisted log document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertLogDocument {
    #[serde(default)]
    pub alerts: Vec<AlertRecord>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Render a "3h ago" style relative time, reconstructable from the
/// record timestamp.
pub fn format_relative(from: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - from).num_seconds().max(0);
    if secs < 60 {
        format!("{secs}s ago")
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86_400 {
        format!("{}h ago", secs / 3600)
    } else {
        format!("{}d ago", secs / 86_400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Tier::One).unwrap(), "1");
        assert_eq!(serde_json::from_str::<Tier>("3").unwrap(), Tier::Three);
        assert!(serde_json::from_str::<Tier>("4").is_err());
    }

    #[test]
    fn test_tier_ranking() {
        assert!(Tier::One.is_stronger_than(Tier::Two));
        assert!(Tier::Two.is_stronger_than(Tier::Three));
        assert!(!Tier::Three.is_stronger_than(Tier::Three));
        assert!(!Tier::Three.is_stronger_than(Tier::One));
    }

    #[test]
    fn test_level_from_tier() {
        assert_eq!(Tier::One.level(), AlertLevel::High);
        assert_eq!(Tier::Two.level(), AlertLevel::Medium);
        assert_eq!(Tier::Three.level(), AlertLevel::Medium);
        assert_eq!(
            serde_json::to_string(&AlertLevel::High).unwrap(),
            "\"HIGH\""
        );
    }

    #[test]
    fn test_hotlist_sentinel() {
        let ev = ParsedEvent {
            source_id: "hotlist".into(),
            kind: SourceKind::HotlistFeed,
            observed_at: Utc::now(),
            contract_address: "HOTLIST:FOO".into(),
            symbol: "FOO".into(),
            market_cap_usd: None,
            liquidity_usd: None,
            buy_sol: None,
            holders: None,
            callers: None,
            subs: None,
            multiplier: None,
            signal_tags: BTreeSet::new(),
        };
        assert!(ev.is_hotlist_sentinel());
        assert_eq!(ev.hotlist_symbol(), Some("FOO"));
    }

    #[test]
    fn test_record_camel_case_shape() {
        let record = AlertRecord {
            id: "ABCDEFGH_2026-01-02".into(),
            token: "XYZ".into(),
            tier: Tier::One,
            level: AlertLevel::High,
            timestamp: "2026-01-02T21:00:33Z".parse().unwrap(),
            contract: "ABCDEFGH111111111111111111111111111111".into(),
            entry_mc: Some(198_100.0),
            hotlist: "Yes".into(),
            description: "test".into(),
            matched_signals: vec!["hotlist".into(), "momentum_spike".into()],
            tags: vec!["top5_hotlist".into()],
            liquidity: Some(21_800.0),
            callers: Some(3),
            subs: Some(12_357),
            confirmation_count: 2,
            cohort_time: "3h ago".into(),
            last_buy_sol: None,
            top_buy_sol: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["entryMc"], 198_100.0);
        assert_eq!(json["matchedSignals"][0], "hotlist");
        assert_eq!(json["confirmationCount"], 2);
        assert_eq!(json["cohortTime"], "3h ago");
        assert_eq!(json["tier"], 1);
        assert_eq!(json["level"], "HIGH");
        assert!(json.get("lastBuySol").is_none());
    }

    #[test]
    fn test_format_relative() {
        let base: DateTime<Utc> = "2026-01-02T12:00:00Z".parse().unwrap();
        let plus = |s: i64| base + chrono::Duration::seconds(s);
        assert_eq!(format_relative(base, plus(30)), "30s ago");
        assert_eq!(format_relative(base, plus(150)), "2m ago");
        assert_eq!(format_relative(base, plus(3 * 3600 + 120)), "3h ago");
        assert_eq!(format_relative(base, plus(2 * 86_400)), "2d ago");
    }
}
