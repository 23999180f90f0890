//! Configuration management
//!
//! Everything tunable lives here: source definitions, correlation windows,
//! tier thresholds, storage paths. Defaults match the documented strategy;
//! a missing config file yields a config error, a minimal one works.

use crate::error::{MonitorError, Result};
use crate::types::SourceKind;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Upstream chat sources, fixed at startup.
    #[serde(default)]
    pub sources: Vec<SourceSettings>,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub windows: WindowConfig,
    #[serde(default)]
    pub tiers: TierConfig,
    #[serde(default)]
    pub penalties: PenaltyConfig,
    #[serde(default)]
    pub enrich: EnrichConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub fanout: FanoutConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSettings {
    /// Stable identifier, e.g. "momentum_tracker".
    pub source_id: String,
    pub kind: SourceKind,
    /// Chat channel to read from.
    pub channel: String,
    #[serde(default = "default_trust_weight")]
    pub trust_weight: f64,
}

fn default_trust_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Chat API base URL.
    pub api_base: String,
    /// API credential; overridden by SOLALERT_CHAT_TOKEN.
    pub token: Option<String>,
    /// Events lagging wall clock by more than this are dropped.
    pub latency_budget_secs: u64,
    /// Bounded buffer per source; overflow drops oldest.
    pub buffer_per_source: usize,
    pub parser_buffer: usize,
    pub poll_interval_secs: u64,
    pub reconnect_base_secs: u64,
    pub reconnect_cap_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            token: None,
            latency_budget_secs: 5,
            buffer_per_source: 1024,
            parser_buffer: 4096,
            poll_interval_secs: 2,
            reconnect_base_secs: 2,
            reconnect_cap_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// SOL buy size promoting the large_buy tag.
    pub large_buy_sol: f64,
    /// SOL buy size promoting the whale_buy tag.
    pub whale_buy_sol: f64,
    /// Hotlist entries counted as "top 5".
    pub hotlist_top_n: usize,
    /// Momentum multiplier that opens a cohort.
    pub cohort_multiplier: f64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            large_buy_sol: 5.0,
            whale_buy_sol: 20.0,
            hotlist_top_n: 5,
            cohort_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Rolling horizon of events kept per token (W_state).
    pub state_mins: i64,
    /// Minimum gap before the same or weaker tier re-alerts (W_dedupe).
    pub dedupe_secs: i64,
    /// Hotlist sentinel ↔ real contract reconciliation window.
    pub hotlist_match_mins: i64,
    /// Hotlist window around cohort start for tiers 1 and 2.
    pub cohort_hotlist_mins: i64,
    /// Max events retained per token state.
    pub ring_capacity: usize,
    /// Max tracked contracts before LRU eviction kicks in.
    pub max_tracked_contracts: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            state_mins: 30,
            dedupe_secs: 300,
            hotlist_match_mins: 20,
            cohort_hotlist_mins: 20,
            ring_capacity: 256,
            max_tracked_contracts: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub tier1_mc_min: f64,
    pub tier1_mc_max: f64,
    pub tier2_mc_min: f64,
    pub tier2_mc_max: f64,
    /// Global market-cap eligibility ceiling.
    pub mc_cap: f64,
    /// Global liquidity eligibility floor (when liquidity is known).
    pub liq_gate: f64,
    /// Tier-1 social strength alternative: callers >= this ...
    pub social_callers_min: u32,
    /// ... and subs >= this.
    pub social_subs_min: u64,
    /// Tier-1 alerts in 24h that trigger tightening.
    pub dynamic_tighten_above: usize,
    /// Rate below which thresholds restore.
    pub dynamic_restore_below: usize,
    /// Tier-1 MC ceiling bump while tightened.
    pub dynamic_mc_bump: f64,
    /// Social threshold increase while tightened, in percent.
    pub dynamic_social_pct: f64,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            tier1_mc_min: 40_000.0,
            tier1_mc_max: 100_000.0,
            tier2_mc_min: 30_000.0,
            tier2_mc_max: 120_000.0,
            mc_cap: 1_000_000.0,
            liq_gate: 10_000.0,
            social_callers_min: 20,
            social_subs_min: 100_000,
            dynamic_tighten_above: 10,
            dynamic_restore_below: 8,
            dynamic_mc_bump: 10_000.0,
            dynamic_social_pct: 25.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PenaltyConfig {
    /// Liquidity below this demotes the candidate one tier.
    pub low_liq_threshold: f64,
    /// Same-symbol churn lookback.
    pub churn_window_hours: i64,
    /// Peak multiple that clears a prior alert of the churn penalty.
    pub churn_peak: f64,
    /// Top buy at or above this promotes across the 2/3 boundary.
    pub boost_top_buy_sol: f64,
    /// Last buy at or above this promotes across the 2/3 boundary.
    pub boost_last_buy_sol: f64,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            low_liq_threshold: 5_000.0,
            churn_window_hours: 48,
            churn_peak: 4.0,
            boost_top_buy_sol: 20.0,
            boost_last_buy_sol: 5.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub retries: u32,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.dexscreener.com".to_string(),
            timeout_ms: 2_000,
            retries: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Durable log path; overridden by SOLALERT_LOG_PATH.
    pub log_path: PathBuf,
    pub backup_count: usize,
    pub write_retries: u32,
    pub retry_base_ms: u64,
    pub retry_cap_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("alerts.json"),
            backup_count: 5,
            write_retries: 5,
            retry_base_ms: 50,
            retry_cap_ms: 800,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub enabled: bool,
    pub base_url: String,
    /// Credential; overridden by SOLALERT_MIRROR_TOKEN.
    pub token: Option<String>,
    /// Appends within the window collapse into one mirror cycle.
    pub coalesce_max: usize,
    pub coalesce_window_secs: u64,
    pub retry_base_secs: u64,
    pub retry_cap_secs: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            token: None,
            coalesce_max: 3,
            coalesce_window_secs: 2,
            retry_base_secs: 1,
            retry_cap_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Overridden by SOLALERT_HTTP_PORT.
    pub listen_port: u16,
    pub cache_ttl_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_port: 8080,
            cache_ttl_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    pub registry_path: PathBuf,
    pub groups_path: PathBuf,
    /// Channel receiving every tier-1 record.
    pub broadcast_channel: Option<String>,
    pub retries: u32,
    pub retry_delay_secs: u64,
    pub buffer: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            registry_path: PathBuf::from("subscriptions.json"),
            groups_path: PathBuf::from("alert_groups.json"),
            broadcast_channel: None,
            retries: 2,
            retry_delay_secs: 1,
            buffer: 256,
        }
    }
}

impl Config {
    /// Load configuration from file, then apply environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()
            .map_err(|e| MonitorError::Config(e.to_string()))?;

        let mut config: Config = settings
            .try_deserialize()
            .map_err(|e| MonitorError::Config(e.to_string()))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Credentials and deploy-specific knobs come from the environment.
    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("SOLALERT_CHAT_TOKEN") {
            self.ingest.token = Some(token);
        }
        if let Ok(token) = std::env::var("SOLALERT_MIRROR_TOKEN") {
            self.mirror.token = Some(token);
        }
        if let Ok(port) = std::env::var("SOLALERT_HTTP_PORT") {
            if let Ok(port) = port.parse() {
                self.http.listen_port = port;
            }
        }
        if let Ok(path) = std::env::var("SOLALERT_LOG_PATH") {
            self.storage.log_path = PathBuf::from(path);
        }
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            if source.source_id.is_empty() {
                return Err(MonitorError::Config("source_id must not be empty".into()));
            }
            if !seen.insert(&source.source_id) {
                return Err(MonitorError::Config(format!(
                    "duplicate source_id: {}",
                    source.source_id
                )));
            }
        }
        if self.tiers.tier1_mc_min > self.tiers.tier1_mc_max {
            return Err(MonitorError::Config("tier1 MC band is inverted".into()));
        }
        if self.tiers.tier2_mc_min > self.tiers.tier2_mc_max {
            return Err(MonitorError::Config("tier2 MC band is inverted".into()));
        }
        if self.windows.ring_capacity == 0 {
            return Err(MonitorError::Config("ring_capacity must be > 0".into()));
        }
        if self.storage.write_retries == 0 {
            return Err(MonitorError::Config("write_retries must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            ingest: IngestConfig::default(),
            parser: ParserConfig::default(),
            windows: WindowConfig::default(),
            tiers: TierConfig::default(),
            penalties: PenaltyConfig::default(),
            enrich: EnrichConfig::default(),
            storage: StorageConfig::default(),
            mirror: MirrorConfig::default(),
            http: HttpConfig::default(),
            fanout: FanoutConfig::default(),
        }
    }
}
