//! Message parser: pure, per-message extraction of token data.
//!
//! Structured as an ordered cascade of source-shaped extractors. Parsing is
//! stateless and exercises only the input message; misses return a reason
//! code that feeds the per-source counters.

pub mod address;
pub mod numeric;
pub mod symbol;
pub mod tags;


use crate::config::{ParserConfig, SourceSettings};
use crate::types::{ParsedEvent, RawMessage, SourceKind, HOTLIST_PREFIX};
use std::collections::BTreeSet;

/// Why a message yielded no event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMiss {
    EmptyContent,
    EthereumAddress,
    NoContract,
    NoSymbol,
}

impl ParseMiss {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMiss::EmptyContent => "empty_content",
            ParseMiss::EthereumAddress => "eth_ca",
            ParseMiss::NoContract => "no_ca",
            ParseMiss::NoSymbol => "no_symbol",
        }
    }
}

/// Parse one message into zero or more events.
///
/// Hotlist messages list several ranked symbols and yield one sentinel
/// event per entry; every other source yields exactly one event, keyed by
/// a real contract address.
pub fn parse(
    msg: &RawMessage,
    source: &SourceSettings,
    cfg: &ParserConfig,
) -> Result<Vec<ParsedEvent>, ParseMiss> {
    if msg.text.trim().is_empty() {
        return Err(ParseMiss::EmptyContent);
    }

    if source.kind == SourceKind::HotlistFeed {
        return parse_hotlist(msg, source, cfg);
    }

    if address::has_ethereum_link(&msg.text, &msg.entities) {
        return Err(ParseMiss::EthereumAddress);
    }

    let contract = address::extract_contract(&msg.text, &msg.entities)
        .ok_or(ParseMiss::NoContract)?;

    let symbol = symbol::extract_symbol(&msg.text).unwrap_or_else(|| "UNKNOWN".to_string());

    let buy_sol = numeric::parse_buy_sol(&msg.text);
    let multiplier = if source.kind == SourceKind::MomentumFeed {
        numeric::parse_multiplier(&msg.text)
    } else {
        None
    };
    let (callers, subs) = numeric::parse_callers_subs(&msg.text);

    let signal_tags = tags::assign_tags(source.kind, &msg.text, buy_sol, multiplier, cfg);

    Ok(vec![ParsedEvent {
        source_id: source.source_id.clone(),
        kind: source.kind,
        observed_at: msg.received_at,
        contract_address: contract,
        symbol,
        market_cap_usd: numeric::parse_market_cap(&msg.text),
        liquidity_usd: numeric::parse_liquidity(&msg.text),
        buy_sol,
        holders: numeric::parse_holders(&msg.text),
        callers,
        subs,
        multiplier,
        signal_tags,
    }])
}

/// Hotlist messages carry symbols only; contract resolution happens later
/// in the state store. The first N entries are the "top 5".
fn parse_hotlist(
    msg: &RawMessage,
    source: &SourceSettings,
    cfg: &ParserConfig,
) -> Result<Vec<ParsedEvent>, ParseMiss> {
    let symbols = symbol::extract_hotlist_symbols(&msg.text);
    if symbols.is_empty() {
        return Err(ParseMiss::NoSymbol);
    }

    Ok(symbols
        .into_iter()
        .enumerate()
        .map(|(rank, sym)| {
            let mut signal_tags = BTreeSet::new();
            if rank < cfg.hotlist_top_n {
                signal_tags.insert(crate::types::SignalTag::Top5Hotlist);
            }
            ParsedEvent {
                source_id: source.source_id.clone(),
                kind: source.kind,
                observed_at: msg.received_at,
                contract_address: format!("{HOTLIST_PREFIX}{sym}"),
                symbol: sym,
                market_cap_usd: None,
                liquidity_usd: None,
                buy_sol: None,
                holders: None,
                callers: None,
                subs: None,
                multiplier: None,
                signal_tags,
            }
        })
        .collect())
}
