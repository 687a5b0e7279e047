//! Ticker normalization. Ported from the aliasing/UK-heuristic tables used
//! by the upstream instrument catalog; see SPEC_FULL.md section 6.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(_EQ|_US|_BE|_DE|_GB|_FR|_NL|_ES|_IT)+$").unwrap());
static LEVERAGED_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(3|5|7)[A-Z]+").unwrap());
static LEVERAGED_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z]+(2|3|5|7)$").unwrap());

const LEVERAGED_STEMS: &[&str] = &[
    "LLOY", "BARC", "VOD", "HSBA", "TSCO", "BP", "AZN", "RR", "NG", "SGLN", "SSLN",
];

fn special_mappings() -> &'static [(&'static str, &'static str)] {
    &[
        ("SSLNL", "SSLN"),
        ("SGLNL", "SGLN"),
        ("LLOY1", "LLOY"),
        ("VOD1", "VOD"),
        ("BARC1", "BARC"),
        ("TSCO1", "TSCO"),
        ("BPL1", "BP"),
        ("BPL", "BP"),
        ("AZNL1", "AZN"),
        ("AZNL", "AZN"),
        ("SGLN1", "SGLN"),
        ("AVL", "AV"),
        ("UUL", "UU"),
        ("BAL", "BA"),
        ("SLL", "SL"),
        ("AU", "AUT"),
        ("REL", "REL"),
        ("AAL", "AAL"),
        ("RBL", "RKT"),
        ("MICCL", "MICC"),
        ("3GLD", "3GLD"),
    ]
}

fn us_exclusions() -> &'static HashSet<&'static str> {
    static SET: Lazy<HashSet<&'static str>> = Lazy::new(|| {
        [
            // tech
            "AAPL", "MSFT", "GOOGL", "GOOG", "AMZN", "META", "NVDA", "TSLA", "NFLX", "ADBE",
            "CRM", "ORCL", "INTC", "AMD", "QCOM", "CSCO", "IBM", "UBER", "ABNB", "SHOP",
            // financials
            "JPM", "BAC", "WFC", "GS", "MS", "C", "V", "MA", "PYPL", "AXP", "SCHW", "BLK",
            // industrial
            "GE", "BA", "CAT", "HON", "MMM", "UPS", "LMT", "RTX", "DE", "UNP",
            // consumer
            "KO", "PEP", "PG", "WMT", "COST", "MCD", "NKE", "SBUX", "DIS", "HD", "TGT",
            // healthcare
            "JNJ", "PFE", "UNH", "ABBV", "MRK", "LLY", "TMO", "ABT", "CVS", "AMGN",
            // energy / telecom
            "XOM", "CVX", "COP", "T", "VZ", "TMUS",
            // ETFs
            "SPY", "QQQ", "VOO", "VTI", "IWM", "DIA", "ARKK",
            // single letter
            "F", "T",
        ]
        .into_iter()
        .collect()
    });
    &SET
}

fn is_likely_uk(symbol: &str) -> bool {
    if us_exclusions().contains(symbol) {
        return false;
    }
    symbol.len() <= 5 || symbol.ends_with('L')
}

/// Normalizes a raw ticker string into the canonical form used throughout
/// the core. Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize_ticker(raw: &str) -> String {
    let mut s = raw.trim().to_ascii_uppercase();
    if s.starts_with('$') {
        s = s[1..].to_string();
    }

    if s.contains('.') {
        return s;
    }

    s = SUFFIX_RE.replace(&s, "").to_string();
    s = s.replace('_', "");

    for (from, to) in special_mappings() {
        if s == *from {
            s = (*to).to_string();
            break;
        }
    }

    if s.ends_with('1') {
        let stem = &s[..s.len() - 1];
        if LEVERAGED_STEMS.contains(&stem) {
            s = stem.to_string();
        }
    }

    if s.contains('.') {
        return s;
    }

    // A spurious trailing "L" (e.g. "BARCL", "GSKL") is an artifact some
    // data sources append to UK tickers; strip it before adding the real
    // ".L" suffix so the result is "BARC.L" rather than "BARCL.L".
    if is_likely_uk(&s) && s.ends_with('L') && s.len() > 3 {
        s = s[..s.len() - 1].to_string();
    }

    let is_leveraged_pattern = LEVERAGED_PREFIX_RE.is_match(&s) || LEVERAGED_SUFFIX_RE.is_match(&s);
    let uk = is_leveraged_pattern || is_likely_uk(&s);

    if uk {
        format!("{}.L", s)
    } else {
        s
    }
}

/// Scans `candidates` (most-recent-first) for a ticker-like token: a
/// `$SYMBOL` marker takes priority, otherwise the first uppercase
/// alphanumeric token of length 2-6 not in `stop_words`.
pub fn resolve_ticker_from_history(candidates: &[&str], stop_words: &HashSet<&str>) -> Option<String> {
    for line in candidates {
        for word in line.split_whitespace() {
            if let Some(sym) = word.strip_prefix('$') {
                let clean: String = sym.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
                if !clean.is_empty() {
                    return Some(normalize_ticker(&clean));
                }
            }
        }
    }
    for line in candidates {
        for word in line.split_whitespace() {
            let clean: String = word.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
            if clean.len() < 2 || clean.len() > 6 {
                continue;
            }
            if clean.chars().any(|c| c.is_ascii_lowercase()) {
                continue;
            }
            let upper = clean.to_ascii_uppercase();
            if stop_words.contains(upper.as_str()) {
                continue;
            }
            return Some(normalize_ticker(&upper));
        }
    }
    None
}

/// Longest-common-subsequence similarity ratio in `[0, 1]`, used by the
/// Tier-2 instrument-search recovery ladder to score candidate matches.
pub fn lcs_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_ascii_uppercase().chars().collect();
    let b: Vec<char> = b.to_ascii_uppercase().chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut dp = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            dp[i][j] = if a[i - 1] == b[j - 1] {
                dp[i - 1][j - 1] + 1
            } else {
                dp[i - 1][j].max(dp[i][j - 1])
            };
        }
    }
    let lcs = dp[a.len()][b.len()] as f64;
    lcs / a.len().max(b.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn us_ticker_passes_through() {
        assert_eq!(normalize_ticker("AAPL"), "AAPL");
        assert_eq!(normalize_ticker("$aapl"), "AAPL");
    }

    #[test]
    fn uk_ticker_gets_l_suffix() {
        assert_eq!(normalize_ticker("VOD"), "VOD.L");
    }

    #[test]
    fn t212_suffix_is_stripped() {
        assert_eq!(normalize_ticker("LLOY_EQ_GB"), "LLOY.L");
    }

    #[test]
    fn special_mapping_applies() {
        assert_eq!(normalize_ticker("AVL"), "AV.L");
    }

    #[test]
    fn leveraged_one_suffix_stripped() {
        assert_eq!(normalize_ticker("LLOY1"), "LLOY.L");
    }

    #[test]
    fn already_dotted_passes_through() {
        assert_eq!(normalize_ticker("VOD.L"), "VOD.L");
    }

    #[test]
    fn idempotent_for_sample_set() {
        for raw in ["AAPL", "VOD", "LLOY_EQ_GB", "AVL", "3GLD", "TSCO1", "$msft"] {
            let once = normalize_ticker(raw);
            let twice = normalize_ticker(&once);
            assert_eq!(once, twice, "not idempotent for {raw}");
        }
    }

    #[test]
    fn lcs_similarity_identical_is_one() {
        assert_eq!(lcs_similarity("LLOYDS", "LLOYDS"), 1.0);
    }

    #[test]
    fn lcs_similarity_threshold() {
        assert!(lcs_similarity("LLOYDS BANKING GROUP", "LLOYDS BANKING GRP") >= 0.6);
    }
}
