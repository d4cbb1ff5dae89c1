//! Ticker exclusion rules.
//!
//! Explicit tickers match exactly (case-insensitive). Patterns are globs:
//! `*` matches any run of characters, `?` one character, and `[56]` one
//! character out of a set, so `*[56]` excludes tickers ending in 5 or 6.

use std::collections::HashSet;

use regex::Regex;

use crate::domain::error::FilterError;

/// A glob compiled to an anchored, case-insensitive regex.
#[derive(Debug, Clone)]
pub struct TickerPattern {
    source: String,
    regex: Regex,
}

impl TickerPattern {
    pub fn parse(source: &str) -> Result<Self, String> {
        let source = source.trim();
        if source.is_empty() {
            return Err("empty pattern".to_string());
        }
        let regex = Regex::new(&glob_to_regex(source)?)
            .map_err(|e| format!("invalid pattern '{source}': {e}"))?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, ticker: &str) -> bool {
        self.regex.is_match(ticker)
    }
}

fn glob_to_regex(glob: &str) -> Result<String, String> {
    let mut out = String::from("(?i)^");
    let mut chars = glob.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                let mut set = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(c) => set.push(c),
                        None => return Err(format!("unclosed '[' in pattern '{glob}'")),
                    }
                }
                if set.is_empty() {
                    return Err(format!("empty character set in pattern '{glob}'"));
                }
                out.push('[');
                out.push_str(&set);
                out.push(']');
            }
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    out.push('$');
    Ok(out)
}

#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    tickers: HashSet<String>,
    patterns: Vec<TickerPattern>,
}

impl ExclusionRules {
    pub fn new(tickers: &[String], patterns: &[String]) -> Result<Self, FilterError> {
        let tickers = tickers
            .iter()
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect();
        let patterns = patterns
            .iter()
            .enumerate()
            .map(|(i, p)| {
                TickerPattern::parse(p)
                    .map_err(|reason| FilterError::new(format!("excludedTickerPatterns[{i}]"), reason))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tickers, patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty() && self.patterns.is_empty()
    }

    /// Why a ticker is excluded, if it is.
    pub fn reason(&self, ticker: &str) -> Option<String> {
        if self.tickers.contains(&ticker.trim().to_uppercase()) {
            return Some("listed in excluded tickers".to_string());
        }
        self.patterns
            .iter()
            .find(|p| p.matches(ticker.trim()))
            .map(|p| format!("matches excluded pattern '{}'", p.source()))
    }

    pub fn is_excluded(&self, ticker: &str) -> bool {
        self.reason(ticker).is_some()
    }
}
