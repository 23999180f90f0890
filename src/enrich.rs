//! Live market snapshot enrichment.
//!
//! Bounded call on the correlator task: short timeout, one retry, and the
//! caller proceeds on the fallback path when it fails.

use crate::config::EnrichConfig;
use crate::error::{MonitorError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Live view of a token's market, as returned by the quote service.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub symbol: Option<String>,
    pub market_cap_usd: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub price_usd: Option<f64>,
}

#[async_trait]
pub trait QuoteService: Send + Sync {
    async fn snapshot(&self, contract: &str) -> Result<MarketSnapshot>;
}

/// DexScreener-backed quote service. Free public API, no auth.
pub struct DexScreenerClient {
    http: reqwest::Client,
    base_url: String,
    retries: u32,
}

impl DexScreenerClient {
    pub fn new(cfg: &EnrichConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            retries: cfg.retries,
        })
    }

    async fn fetch(&self, contract: &str) -> Result<TokensResponse> {
        let url = format!("{}/latest/dex/tokens/{}", self.base_url, contract);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(MonitorError::Enrich(format!(
                "quote service returned {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl QuoteService for DexScreenerClient {
    async fn snapshot(&self, contract: &str) -> Result<MarketSnapshot> {
        let mut last_err = None;
        for _ in 0..=self.retries {
            match self.fetch(contract).await {
                Ok(resp) => return Ok(select_pair(resp)),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| MonitorError::Enrich("no attempts made".into())))
    }
}

/// Pick the Solana pair with the deepest liquidity; prefer marketCap over
/// fully-diluted valuation.
fn select_pair(resp: TokensResponse) -> MarketSnapshot {
    let mut best: Option<&Pair> = None;
    let mut best_liq = -1.0;
    for pair in resp.pairs.iter().flatten() {
        if pair.chain_id.as_deref() != Some("solana") {
            continue;
        }
        let liq = pair.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
        if liq > best_liq {
            best_liq = liq;
            best = Some(pair);
        }
    }

    let Some(pair) = best else {
        return MarketSnapshot::default();
    };
    MarketSnapshot {
        symbol: pair
            .base_token
            .as_ref()
            .and_then(|t| t.symbol.clone())
            .map(|s| s.trim().to_string()),
        market_cap_usd: pair.market_cap.or(pair.fdv),
        liquidity_usd: pair.liquidity.as_ref().and_then(|l| l.usd),
        price_usd: pair
            .price_usd
            .as_deref()
            .and_then(|p| p.parse::<f64>().ok()),
    }
}

#[derive(Debug, Deserialize)]
struct TokensResponse {
    #[serde(default)]
    pairs: Option<Vec<Pair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pair {
    chain_id: Option<String>,
    base_token: Option<BaseToken>,
    liquidity: Option<Liquidity>,
    market_cap: Option<f64>,
    fdv: Option<f64>,
    price_usd: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BaseToken {
    symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Liquidity {
    usd: Option<f64>,
}
