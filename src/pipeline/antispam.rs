// Copyright 2025 Cowboy AI, LLC.

//! Anti-spam sub-checks
//!
//! Optional pre-filter in front of scoring. Operators pick one of three
//! policies: drop detected results, keep them as zero-confidence
//! candidates, or disable the checks entirely (the default).

use crate::pipeline::keywords::{
    contains_term, word_set, EDUCATION_TERMS, FUNCTION_WORDS, SCAMMER_INDUSTRY_TERMS,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// What to do when a sub-check fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpamPolicy {
    /// Drop the result before scoring
    PreFilter,
    /// Keep it as a zero-confidence, skipped candidate
    ScoreZero,
    /// Do not run the checks
    #[default]
    Disabled,
}

/// Which sub-check fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpamSignal {
    /// Unique-word ratio of the combined metadata below 0.5
    KeywordStuffing,
    /// Domain tokens and metadata share almost no vocabulary
    DomainMetadataMismatch,
    /// Fewer than two common function words in the combined text
    UnnaturalKeywordList,
    /// Scammer-industry domain carrying education metadata
    CrossCategory,
}

impl fmt::Display for SpamSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SpamSignal::KeywordStuffing => "keyword stuffing",
            SpamSignal::DomainMetadataMismatch => "domain-metadata mismatch",
            SpamSignal::UnnaturalKeywordList => "unnatural keyword list",
            SpamSignal::CrossCategory => "cross-category",
        };
        f.write_str(label)
    }
}

/// Unique-word ratio below this is keyword stuffing
const STUFFING_RATIO: f64 = 0.5;
/// Cosine similarity below this is a domain-metadata mismatch
const MISMATCH_SIMILARITY: f64 = 0.15;
/// Function words required for natural-language metadata
const MIN_FUNCTION_WORDS: usize = 2;

/// The anti-spam detector
#[derive(Debug, Clone, Default)]
pub struct SpamChecks;

impl SpamChecks {
    /// Run the sub-checks; first firing signal wins
    pub fn detect(&self, host: &str, title: &str, snippet: &str) -> Option<SpamSignal> {
        let combined = format!("{title} {snippet}");
        let tokens: Vec<String> = combined
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_string())
            .collect();

        if tokens.is_empty() {
            return None;
        }

        if Self::keyword_stuffing(&tokens) {
            return Some(SpamSignal::KeywordStuffing);
        }
        if Self::domain_metadata_mismatch(host, &tokens) {
            return Some(SpamSignal::DomainMetadataMismatch);
        }
        if Self::unnatural_keyword_list(&tokens) {
            return Some(SpamSignal::UnnaturalKeywordList);
        }
        if Self::cross_category(host, &combined) {
            return Some(SpamSignal::CrossCategory);
        }
        None
    }

    fn keyword_stuffing(tokens: &[String]) -> bool {
        let unique: std::collections::HashSet<&String> = tokens.iter().collect();
        (unique.len() as f64) / (tokens.len() as f64) < STUFFING_RATIO
    }

    fn domain_metadata_mismatch(host: &str, tokens: &[String]) -> bool {
        // Domain bag: host labels split on '.' and '-', minus the TLD.
        let mut labels: Vec<&str> = host.split(['.', '-']).filter(|l| !l.is_empty()).collect();
        if labels.len() > 1 {
            labels.pop();
        }
        let domain_bag = Self::frequency(labels.iter().map(|l| l.to_lowercase()));
        if domain_bag.is_empty() {
            return false;
        }
        let text_bag = Self::frequency(tokens.iter().cloned());
        Self::cosine(&domain_bag, &text_bag) < MISMATCH_SIMILARITY
    }

    fn unnatural_keyword_list(tokens: &[String]) -> bool {
        let function_count = tokens
            .iter()
            .filter(|t| FUNCTION_WORDS.contains(&t.as_str()))
            .count();
        function_count < MIN_FUNCTION_WORDS
    }

    fn cross_category(host: &str, combined: &str) -> bool {
        let host_lower = host.to_lowercase();
        let industry = SCAMMER_INDUSTRY_TERMS
            .iter()
            .any(|term| host_lower.contains(term));
        if !industry {
            return false;
        }
        let lower = combined.to_lowercase();
        let words = word_set(&lower);
        EDUCATION_TERMS
            .iter()
            .any(|term| contains_term(&lower, &words, term))
    }

    fn frequency(words: impl Iterator<Item = String>) -> HashMap<String, f64> {
        let mut bag = HashMap::new();
        for word in words {
            *bag.entry(word).or_insert(0.0) += 1.0;
        }
        bag
    }

    fn cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
        let dot: f64 = a
            .iter()
            .filter_map(|(word, weight)| b.get(word).map(|other| weight * other))
            .sum();
        let norm_a: f64 = a.values().map(|w| w * w).sum::<f64>().sqrt();
        let norm_b: f64 = b.values().map(|w| w * w).sum::<f64>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }
}
