//! Contract-address extraction.
//!
//! Tried in priority order: source-bot deep links, dex/explorer URLs,
//! keyed text labels, then a bare base58 run. URL entities are scanned
//! before the message text at each step.

use crate::types::UrlEntity;
use once_cell::sync::Lazy;
use regex::Regex;

static ETH_START_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\?start=0x[a-fA-F0-9]{40}").unwrap());

// Deep links: ?start=track_<addr>, ?start=15_<addr>, ?start=<addr>
static START_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\?start=(?:track_|15_)?([A-Za-z0-9]{32,44})").unwrap());

// gmgn token links, with or without a routing prefix before the address.
static GMGN_PREFIXED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"gmgn\.ai/sol/token/[A-Za-z0-9]+_([A-Za-z0-9]{32,44})(?:[?)]|$|\s)").unwrap()
});
static GMGN_DIRECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"gmgn\.ai/sol/token/([A-Za-z0-9]{32,44})(?:[?)]|$|\s)").unwrap()
});
static PUMP_FUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pump\.fun/([A-Za-z0-9]{32,44})").unwrap());

static KEYED_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:Mint:|CA:|Contract:|📄)\s*([A-Za-z0-9]{32,44})").unwrap()
});

static BARE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^A-Za-z0-9])([A-Za-z0-9]{32,44})(?:[^A-Za-z0-9]|$)").unwrap());

static URL_IN_TEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s)]+").unwrap());

/// Length 32-44, alphanumeric, not an Ethereum-style 0x address.
pub fn is_valid_solana_address(addr: &str) -> bool {
    if addr.len() < 32 || addr.len() > 44 {
        return false;
    }
    if addr.to_ascii_uppercase().starts_with("0X") {
        return false;
    }
    addr.chars().all(|c| c.is_ascii_alphanumeric())
}

/// True when the message carries an Ethereum deep link; such messages are
/// rejected outright rather than falling through to weaker patterns.
pub fn has_ethereum_link(text: &str, entities: &[UrlEntity]) -> bool {
    ETH_START_LINK.is_match(text) || entities.iter().any(|e| ETH_START_LINK.is_match(&e.url))
}

/// Extract and canonicalize a contract address, or None.
pub fn extract_contract(text: &str, entities: &[UrlEntity]) -> Option<String> {
    let mut haystacks: Vec<&str> = entities.iter().map(|e| e.url.as_str()).collect();
    let text_urls: Vec<&str> = URL_IN_TEXT.find_iter(text).map(|m| m.as_str()).collect();
    haystacks.extend(text_urls);
    haystacks.push(text);

    // 1. Bot deep links are the richest source-typed hints.
    for hay in &haystacks {
        if let Some(addr) = capture_valid(&START_LINK, hay) {
            return Some(addr);
        }
    }

    // 2. Known dex/explorer URLs. Prefixed gmgn links first so the routing
    // prefix is not mistaken for the address.
    for hay in &haystacks {
        for re in [&*GMGN_PREFIXED, &*GMGN_DIRECT, &*PUMP_FUN] {
            if let Some(addr) = capture_valid(re, hay) {
                return Some(addr);
            }
        }
    }

    // 3. Keyed text labels.
    if let Some(addr) = capture_valid(&KEYED_LABEL, text) {
        return Some(addr);
    }

    // 4. Bare base58 run.
    capture_valid(&BARE_RUN, text)
}

fn capture_valid(re: &Regex, hay: &str) -> Option<String> {
    for caps in re.captures_iter(hay) {
        let addr = caps.get(1)?.as_str();
        if is_valid_solana_address(addr) {
            return Some(addr.to_ascii_uppercase());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "Ec1zHFvVWibrCbZQEcG1VoAZozkWtFNjY8feQewupump";

    #[test]
    fn test_valid_address() {
        assert!(is_valid_solana_address(ADDR));
        assert!(!is_valid_solana_address("0x10cdbc0a4b0b180ed3be461750adba0bddd54444"));
        assert!(!is_valid_solana_address("short"));
        assert!(!is_valid_solana_address(&"a".repeat(45)));
    }

    #[test]
    fn test_deep_link_track_format() {
        let text = format!("https://t.me/scanner_bot?start=track_{ADDR}");
        assert_eq!(
            extract_contract(&text, &[]),
            Some(ADDR.to_ascii_uppercase())
        );
    }

    #[test]
    fn test_deep_link_numbered_format() {
        let text = format!("https://t.me/scanner_bot?start=15_{ADDR}");
        assert_eq!(
            extract_contract(&text, &[]),
            Some(ADDR.to_ascii_uppercase())
        );
    }

    #[test]
    fn test_gmgn_prefixed_link() {
        let entities = vec![UrlEntity {
            url: format!("https://gmgn.ai/sol/token/rLkfkJiz_{ADDR}?maker=xyz"),
            anchor: None,
        }];
        assert_eq!(
            extract_contract("big buy", &entities),
            Some(ADDR.to_ascii_uppercase())
        );
    }

    #[test]
    fn test_gmgn_direct_link() {
        let text = format!("chart: https://gmgn.ai/sol/token/{ADDR}");
        assert_eq!(
            extract_contract(&text, &[]),
            Some(ADDR.to_ascii_uppercase())
        );
    }

    #[test]
    fn test_pump_fun_link() {
        let text = format!("https://pump.fun/{ADDR}");
        assert_eq!(
            extract_contract(&text, &[]),
            Some(ADDR.to_ascii_uppercase())
        );
    }

    #[test]
    fn test_keyed_labels() {
        for label in ["Mint:", "CA:", "Contract:", "📄"] {
            let text = format!("{label} {ADDR}");
            assert_eq!(
                extract_contract(&text, &[]),
                Some(ADDR.to_ascii_uppercase()),
                "label {label}"
            );
        }
    }

    #[test]
    fn test_bare_run() {
        let text = format!("fresh mint {ADDR} looks early");
        assert_eq!(
            extract_contract(&text, &[]),
            Some(ADDR.to_ascii_uppercase())
        );
    }

    #[test]
    fn test_ethereum_rejected() {
        let text = "https://t.me/spy_bot?start=0x10cdbc0a4b0b180ed3be461750adba0bddd54444";
        assert!(has_ethereum_link(text, &[]));
        assert_eq!(extract_contract(text, &[]), None);
    }

    #[test]
    fn test_entity_beats_text() {
        let other = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
        let entities = vec![UrlEntity {
            url: format!("https://bot.example?start={ADDR}"),
            anchor: None,
        }];
        let text = format!("CA: {other}");
        assert_eq!(
            extract_contract(&text, &entities),
            Some(ADDR.to_ascii_uppercase())
        );
    }
}
