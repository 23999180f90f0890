//! Numeric field extraction: market cap, liquidity, buy size, momentum
//! multiplier, callers/subs/holders.
//!
//! Money figures accept suffixed shorthand (K/M/B), commas, and the keyed
//! forms each source uses.

use once_cell::sync::Lazy;
use regex::Regex;

// "MC: $23.1k 👉 $69.2k": the current value is the second one.
static MC_ALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)MC:\s*\$([\d,.]+[KMB]?)").unwrap());
static MCP: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)MCP\s+\$([\d,.]+)([KMB])").unwrap());
static MC_KEYED: Lazy<[Regex; 6]> = Lazy::new(|| {
    [
        Regex::new(r"(?i)💰\s*MC:\s*\$?([\d,.]+[KMB]?)").unwrap(),
        Regex::new(r"(?i)Current\s+MC(?:ap)?:\s*\$?([\d,.]+[KMB]?)").unwrap(),
        Regex::new(r"(?i)MCap[:\s]+\$?([\d,.]+[KMB]?)").unwrap(),
        Regex::new(r"(?i)Market\s+Cap[:\s]+\$?([\d,.]+[KMB]?)").unwrap(),
        Regex::new(r"(?i)MC[:\s]+\$([\d,.]+[KMB]?)").unwrap(),
        Regex::new(r"\(\$([\d,.]+[KMB]?)\)").unwrap(),
    ]
});

static LIQ_KEYED: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(r"(?i)(?:💧\s*)?LIQ[:\s]+\$?([\d,.]+[KMB]?)").unwrap(),
        Regex::new(r"(?i)Liquidity[:\s]+\$?([\d,.]+[KMB]?)").unwrap(),
    ]
});

static BUY_SOL: Lazy<[Regex; 5]> = Lazy::new(|| {
    [
        Regex::new(r"(?i)Buy\s+(\d+(?:\.\d+)?)\s*W?SOL").unwrap(),
        Regex::new(r"(?i)swapped\s+(\d+(?:\.\d+)?)\s*#?SOL\s+").unwrap(),
        Regex::new(r"(?i)-\s*(\d+(?:\.\d+)?)\s*SOL\s*BUY").unwrap(),
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*SOL\s*BUY").unwrap(),
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*SOL\s+for").unwrap(),
    ]
});

static MULTIPLIER: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        Regex::new(r"did\s+👉\s*(\d+(?:\.\d+)?)[xX]").unwrap(),
        Regex::new(r"(?i)made\s+(\d+(?:\.\d+)?)[xX]\+?\s+on").unwrap(),
        Regex::new(r"(?i)is\s+up\s+(\d+(?:\.\d+)?)[xX]").unwrap(),
        // Word-bounded so base58 runs like "z9xB" never read as 9x.
        Regex::new(r"\b(\d+(?:\.\d+)?)[xX]\b").unwrap(),
    ]
});

static CALLERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Callers:\s*([\d,]+)").unwrap());
static SUBS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Subs:\s*([\d,]+)").unwrap());
static HOLDERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Holders:\s*([\d,]+)").unwrap());

// "⏫ 41.06% in 1.5s": a percent-in-seconds spike.
static SPIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)%\s+in\s+(\d+(?:\.\d+)?)s").unwrap());

/// Parse "53.8K" / "1.5M" / "51,398" into dollars.
fn parse_money(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', "").to_uppercase();
    let (digits, scale) = match cleaned.chars().last()? {
        'K' => (&cleaned[..cleaned.len() - 1], 1_000.0),
        'M' => (&cleaned[..cleaned.len() - 1], 1_000_000.0),
        'B' => (&cleaned[..cleaned.len() - 1], 1_000_000_000.0),
        _ => (cleaned.as_str(), 1.0),
    };
    digits.parse::<f64>().ok().map(|v| v * scale)
}

pub fn parse_market_cap(text: &str) -> Option<f64> {
    if text.is_empty() {
        return None;
    }

    // Arrow form: two MC values; the one after the arrow is current.
    let all: Vec<&str> = MC_ALL
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    if all.len() >= 2 {
        if let Some(v) = parse_money(all[all.len() - 1]) {
            return Some(v);
        }
    }

    if let Some(caps) = MCP.captures(text) {
        let raw = format!("{}{}", &caps[1], &caps[2]);
        if let Some(v) = parse_money(&raw) {
            return Some(v);
        }
    }

    for re in MC_KEYED.iter() {
        if let Some(caps) = re.captures(text) {
            if let Some(v) = parse_money(&caps[1]) {
                return Some(v);
            }
        }
    }

    None
}

pub fn parse_liquidity(text: &str) -> Option<f64> {
    for re in LIQ_KEYED.iter() {
        if let Some(caps) = re.captures(text) {
            if let Some(v) = parse_money(&caps[1]) {
                return Some(v);
            }
        }
    }
    None
}

pub fn parse_buy_sol(text: &str) -> Option<f64> {
    for re in BUY_SOL.iter() {
        if let Some(caps) = re.captures(text) {
            if let Ok(v) = caps[1].parse::<f64>() {
                return Some(v);
            }
        }
    }
    None
}

/// Momentum-tracker multiplier echo ("did 👉 3x", "made 2x+ on ...").
pub fn parse_multiplier(text: &str) -> Option<f64> {
    for re in MULTIPLIER.iter() {
        if let Some(caps) = re.captures(text) {
            if let Ok(v) = caps[1].parse::<f64>() {
                return Some(v);
            }
        }
    }
    None
}

pub fn parse_callers_subs(text: &str) -> (Option<u32>, Option<u64>) {
    let callers = CALLERS
        .captures(text)
        .and_then(|c| c[1].replace(',', "").parse().ok());
    let subs = SUBS
        .captures(text)
        .and_then(|c| c[1].replace(',', "").parse().ok());
    (callers, subs)
}

pub fn parse_holders(text: &str) -> Option<u32> {
    HOLDERS
        .captures(text)
        .and_then(|c| c[1].replace(',', "").parse().ok())
}

/// True when the text reports a percent-in-seconds price spike.
pub fn has_spike(text: &str) -> bool {
    SPIKE.is_match(text)
}
