//! Symbol extraction.
//!
//! Ordered cascade over the source shapes we see in the wild. Pure numeric
//! symbols are rejected; results are uppercased with decorative glyphs
//! trimmed.

use once_cell::sync::Lazy;
use regex::Regex;

/// Names that follow "On #..." in swap messages; never token symbols.
const EXCHANGE_STOPLIST: &[&str] = &[
    "SOL", "USD", "USDC", "WSOL", "FLASH", "JUPITER", "RAYDIUM", "PUMPFUN", "PUMPSWAP", "BINANCE",
    "MAESTRO", "CHART", "BUY",
];

static NEW_TRENDING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)🔥\s*‎?([^\n]+?)\s+New\s+Trending").unwrap());
static MONEY_PAREN: Lazy<Regex> = Lazy::new(|| Regex::new(r"💰\s*([A-Za-z0-9-]+)\s*\(").unwrap());
static BOLT_PAREN: Lazy<Regex> = Lazy::new(|| Regex::new(r"⚡\s*([A-Za-z0-9-]+)\s*\(").unwrap());
// "Swapped 2.97 #SOL ($349.13) for 16,984,188.19 #$dns On #FLASH":
// the buy-side symbol is the one after "for".
// "[Asgore💊]" / "[VEIL💊 (https://...)]" in whale-buy messages.
static BUY_BRACKET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([A-Za-z0-9-]+)[💊\s(\]]").unwrap());
static SWAPPED_FOR_DOLLAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)for\s+[\d,.]+\s+#\$([A-Za-z0-9]+)\s+On").unwrap());
static SWAPPED_FOR_HASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)for\s+[\d,.]+\s+#([A-Za-z0-9™©®]+)").unwrap());
static DID_ARROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)([A-Za-z0-9]+)\s+did\s+👉").unwrap());
static CALLERS_PAREN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"⚪\s*[^(]+?\s*\(#([^)]+)\)").unwrap());
static CALL_ALERT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)CALL ALERT:\s*([A-Za-z0-9-]+)").unwrap());
static CALL_ON: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)call on\s+([A-Za-z0-9-]+)").unwrap());
static LEADING_HASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#([A-Za-z0-9]+)").unwrap());
static DOLLAR_SYM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$([A-Za-z0-9]+)").unwrap());

// "1. $PP" / "2. #Probable" hotlist entries.
static HOTLIST_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\.\s*[#$]?([A-Za-z0-9]+)").unwrap());

/// Extract a token symbol from message text.
pub fn extract_symbol(text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = NEW_TRENDING.captures(text) {
        if let Some(sym) = clean(caps.get(1)?.as_str(), 50) {
            return Some(sym);
        }
    }
    if let Some(caps) = MONEY_PAREN.captures(text) {
        if let Some(sym) = clean(caps.get(1)?.as_str(), 20) {
            return Some(sym);
        }
    }
    if let Some(caps) = BOLT_PAREN.captures(text) {
        if let Some(sym) = clean(caps.get(1)?.as_str(), 20) {
            return Some(sym);
        }
    }
    // Whale-buy bracket shape; the last bracket is the token, earlier ones
    // identify the whale.
    if text.contains("Buy") && text.contains("MCP") {
        if let Some(caps) = BUY_BRACKET.captures_iter(text).last() {
            if let Some(sym) = clean(caps.get(1).map(|m| m.as_str()).unwrap_or_default(), 20) {
                return Some(sym);
            }
        }
    }
    if let Some(caps) = SWAPPED_FOR_DOLLAR.captures(text) {
        if let Some(sym) = clean(caps.get(1)?.as_str(), 50) {
            return Some(sym);
        }
    }
    if let Some(caps) = SWAPPED_FOR_HASH.captures(text) {
        let raw = caps.get(1)?.as_str();
        if !is_stoplisted(raw) {
            if let Some(sym) = clean(raw, 20) {
                return Some(sym);
            }
        }
    }
    if let Some(caps) = DID_ARROW.captures(text) {
        if let Some(sym) = clean_min(caps.get(1)?.as_str(), 2, 20) {
            return Some(sym);
        }
    }
    if let Some(caps) = CALLERS_PAREN.captures(text) {
        if let Some(sym) = clean_min(caps.get(1)?.as_str(), 2, 20) {
            return Some(sym);
        }
    }
    if let Some(caps) = CALL_ALERT.captures(text) {
        if let Some(sym) = clean_min(caps.get(1)?.as_str(), 2, 20) {
            return Some(sym);
        }
    }
    if let Some(caps) = CALL_ON.captures(text) {
        if let Some(sym) = clean_min(caps.get(1)?.as_str(), 2, 20) {
            return Some(sym);
        }
    }
    // Leading #SYM, but in swap messages the leading tag is the trader id.
    if !text.contains("Swapped") {
        if let Some(caps) = LEADING_HASH.captures(text) {
            if let Some(sym) = clean_min(caps.get(1)?.as_str(), 2, 20) {
                return Some(sym);
            }
        }
    }
    // $SYM, skipping market-cap figures like $24.4K.
    for caps in DOLLAR_SYM.captures_iter(text) {
        let raw = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        if raw.ends_with('K') || raw.ends_with('M') || raw.ends_with('B') {
            continue;
        }
        if let Some(sym) = clean_min(raw, 2, 20) {
            return Some(sym);
        }
    }

    None
}

/// Ranked symbols of a hotlist message, in listed order.
pub fn extract_hotlist_symbols(text: &str) -> Vec<String> {
    let mut symbols = Vec::new();
    for caps in HOTLIST_ENTRY.captures_iter(text) {
        if let Some(sym) = clean(caps.get(1).map(|m| m.as_str()).unwrap_or_default(), 20) {
            if !symbols.contains(&sym) {
                symbols.push(sym);
            }
        }
    }
    symbols
}

fn is_stoplisted(raw: &str) -> bool {
    let upper = raw.to_uppercase();
    EXCHANGE_STOPLIST.contains(&upper.as_str())
}

fn clean(raw: &str, max_len: usize) -> Option<String> {
    clean_min(raw, 1, max_len)
}

/// Uppercase, trim decorative glyphs, reject pure-numeric and off-length.
fn clean_min(raw: &str, min_len: usize, max_len: usize) -> Option<String> {
    let trimmed: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '™' | '©' | '®' | '‎' | '\u{fe0f}'))
        .collect();
    let trimmed = trimmed.trim();
    if trimmed.is_empty() {
        return None;
    }
    let n = trimmed.chars().count();
    if n < min_len || n > max_len {
        return None;
    }
    if trimmed.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    Some(trimmed.to_uppercase())
}
