//! Identity matching: deciding whether a candidate record is the target
//! business without false positives.
//!
//! Business names in local results are frequently substrings of each other
//! and chains share prefixes, so a bare substring match is not enough. The
//! matcher anchors on the normalized core prefix of the business name and,
//! when that prefix is common across the current result set, additionally
//! requires a rare business-specific token before accepting.

use std::collections::HashMap;

use localrank_common::types::CandidateRecord;
use localrank_common::LocalRankError;
use tracing::debug;

/// Characters that end the core portion of a display name
/// ("Sunrise Dental Clinic - Park St" → "Sunrise Dental Clinic").
const CORE_SEPARATORS: [char; 5] = [':', '-', '|', '(', ')'];

/// Lowercase and strip everything but ASCII alphanumerics.
pub fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Lowercase, replace non-alphanumerics with spaces, split on whitespace.
pub fn tokenize(s: &str) -> Vec<String> {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// The text preceding the first separator character, trimmed. A separator
/// at position 0 does not split.
fn extract_core(s: &str) -> &str {
    match s.find(&CORE_SEPARATORS[..]) {
        Some(idx) if idx > 0 => s[..idx].trim(),
        _ => s.trim(),
    }
}

/// Tunable matching thresholds. The defaults reproduce field-tested values;
/// none of them is load-bearing beyond "a reasonable disambiguation
/// threshold".
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Minimum normalized core-prefix length below which matching is refused.
    pub min_core_len: usize,
    /// Minimum length for a word to count as a signature token.
    pub min_token_len: usize,
    /// Minimum length for a signature token to qualify as rare.
    pub rare_token_min_len: usize,
    /// Maximum in-set title frequency for a token to qualify as rare.
    pub rare_token_max_freq: usize,
    /// Number of in-set core-prefix hits at which a rare token becomes
    /// required for a match.
    pub common_core_threshold: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_core_len: 4,
            min_token_len: 3,
            rare_token_min_len: 5,
            rare_token_max_freq: 2,
            common_core_threshold: 3,
        }
    }
}

/// Caller-supplied inputs for building the target signature.
#[derive(Debug, Clone)]
pub struct SignatureInputs {
    pub display_name: String,
    /// Canonical listing title when one has been observed; preferred over
    /// the display name for the core-prefix anchor.
    pub canonical_name: Option<String>,
    pub stop_words: Vec<String>,
}

impl SignatureInputs {
    pub fn new(display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            canonical_name: None,
            stop_words: Vec::new(),
        }
    }
}

/// The target business's match identity, computed once per run.
#[derive(Debug, Clone)]
pub struct Signature {
    /// Normalized distinctive words from the display name.
    pub tokens: Vec<String>,
    /// Normalized core prefix of the canonical (or display) name.
    pub core_prefix: String,
}

impl Signature {
    /// Build the signature. Refuses with [`LocalRankError::AmbiguousName`]
    /// when the normalized core prefix is too short to match safely.
    pub fn build(inputs: &SignatureInputs, config: &MatcherConfig) -> Result<Self, LocalRankError> {
        let anchor_name = inputs
            .canonical_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&inputs.display_name);
        let core_prefix = normalize(extract_core(anchor_name));

        if core_prefix.len() < config.min_core_len {
            return Err(LocalRankError::AmbiguousName(anchor_name.to_string()));
        }

        let tokens = tokenize(&inputs.display_name)
            .into_iter()
            .filter(|t| t.len() >= config.min_token_len)
            .filter(|t| !inputs.stop_words.iter().any(|s| s == t))
            .collect();

        Ok(Self {
            tokens,
            core_prefix,
        })
    }
}

/// Per-set statistics the rarity refinement needs: how common the core
/// prefix is among titles, and which signature tokens are rare in this set.
/// Sponsored records are excluded from the counts.
#[derive(Debug, Clone)]
pub struct SetStats {
    pub core_count: usize,
    pub rare_tokens: Vec<String>,
}

impl SetStats {
    pub fn compute(records: &[CandidateRecord], sig: &Signature, config: &MatcherConfig) -> Self {
        let titles: Vec<&str> = records
            .iter()
            .filter(|r| !r.is_sponsored())
            .map(|r| r.title.as_str())
            .collect();

        let core_count = if sig.core_prefix.len() >= config.min_core_len {
            titles
                .iter()
                .filter(|t| normalize(t).contains(&sig.core_prefix))
                .count()
        } else {
            0
        };

        // Token frequency: each title contributes each of its words once.
        let mut freq: HashMap<String, usize> = HashMap::new();
        for title in &titles {
            let mut words = tokenize(title);
            words.sort();
            words.dedup();
            for w in words {
                *freq.entry(w).or_insert(0) += 1;
            }
        }

        let rare_tokens = sig
            .tokens
            .iter()
            .filter(|t| t.len() >= config.rare_token_min_len)
            .filter(|t| freq.get(*t).copied().unwrap_or(0) <= config.rare_token_max_freq)
            .cloned()
            .collect();

        Self {
            core_count,
            rare_tokens,
        }
    }
}

/// Decides whether a candidate record represents the target business.
#[derive(Debug, Clone)]
pub struct IdentityMatcher<'a> {
    sig: &'a Signature,
    config: &'a MatcherConfig,
}

impl<'a> IdentityMatcher<'a> {
    pub fn new(sig: &'a Signature, config: &'a MatcherConfig) -> Self {
        Self { sig, config }
    }

    /// Pure decision over one record against the current set's statistics.
    pub fn matches(&self, record: &CandidateRecord, stats: &SetStats) -> bool {
        // Too-short prefixes are refused outright to avoid false positives.
        if self.sig.core_prefix.len() < self.config.min_core_len {
            debug!("Core prefix missing/short, refusing to match");
            return false;
        }
        if record.is_sponsored() {
            return false;
        }

        let title_norm = normalize(&record.title);
        let url_norm = normalize(&record.url);
        let core_hit = title_norm.contains(&self.sig.core_prefix)
            || url_norm.contains(&self.sig.core_prefix);
        if !core_hit {
            return false;
        }

        // When the prefix is common in this set (a chain or generic term),
        // a rare business-specific token must also appear in the title.
        if stats.core_count >= self.config.common_core_threshold {
            return stats.rare_tokens.iter().any(|t| title_norm.contains(t));
        }

        true
    }
}
