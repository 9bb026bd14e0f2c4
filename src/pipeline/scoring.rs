// Copyright 2025 Cowboy AI, LLC.

//! Metadata-only confidence scoring
//!
//! All arithmetic is integer hundredths. The rules are fixed:
//! TLD tier (+0.20 / +0.15 / +0.08 / 0.00 / -0.20), funding keyword in the
//! title +0.15, in the description +0.10, geographic match +0.15,
//! organization-type match +0.15, and a +0.15 compound bonus when three or
//! more of the four text signals are present. The sum clamps to
//! [0.00, 1.00]. Scoring is deterministic and never fails; empty inputs
//! simply contribute nothing.

use crate::confidence::Confidence;
use crate::domain::ScoreBreakdown;
use crate::pipeline::keywords::{
    contains_term, matching_terms, word_set, DEFAULT_REGION_TERMS, FUNDING_KEYWORDS,
    ORGANIZATION_TERMS,
};
use crate::pipeline::tld::TldTable;

/// Scoring contributions in hundredths
const TITLE_KEYWORD: i16 = 15;
const DESCRIPTION_KEYWORD: i16 = 10;
const GEOGRAPHIC_MATCH: i16 = 15;
const ORGANIZATION_MATCH: i16 = 15;
const COMPOUND_BONUS: i16 = 15;
/// Text signals required for the compound bonus
const COMPOUND_SIGNALS: usize = 3;

/// What one scoring run concluded
#[derive(Debug, Clone)]
pub struct ScoredResult {
    /// Clamped scale-2 confidence
    pub confidence: Confidence,
    /// Raw component breakdown
    pub breakdown: ScoreBreakdown,
    /// Terms that matched, for the judgment record
    pub keywords_found: Vec<String>,
}

/// The deterministic metadata scorer
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    tld_table: TldTable,
    region_terms: Vec<String>,
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::new(
            TldTable::default(),
            DEFAULT_REGION_TERMS.iter().map(|t| (*t).to_string()).collect(),
        )
    }
}

impl ConfidenceScorer {
    /// Build a scorer with a TLD table and target-region terms
    ///
    /// Empty region terms fall back to the curated default set.
    pub fn new(tld_table: TldTable, region_terms: Vec<String>) -> Self {
        let region_terms = if region_terms.is_empty() {
            DEFAULT_REGION_TERMS.iter().map(|t| (*t).to_string()).collect()
        } else {
            region_terms.into_iter().map(|t| t.to_lowercase()).collect()
        };
        Self {
            tld_table,
            region_terms,
        }
    }

    /// Score one result's metadata
    pub fn score(&self, title: &str, description: &str, host: &str) -> ScoredResult {
        let title_lower = title.to_lowercase();
        let description_lower = description.to_lowercase();
        let combined_lower = format!("{title_lower} {description_lower}");
        let title_words = word_set(title);
        let description_words = word_set(description);
        let combined_words = word_set(&combined_lower);

        let mut keywords_found: Vec<String> = Vec::new();

        let title_matches = matching_terms(&title_lower, &title_words, FUNDING_KEYWORDS);
        let description_matches =
            matching_terms(&description_lower, &description_words, FUNDING_KEYWORDS);
        let geographic_match = self
            .region_terms
            .iter()
            .any(|term| contains_term(&combined_lower, &combined_words, term));
        let organization_matches =
            matching_terms(&combined_lower, &combined_words, ORGANIZATION_TERMS);

        for term in title_matches.iter().chain(description_matches.iter()) {
            if !keywords_found.iter().any(|k| k == term) {
                keywords_found.push((*term).to_string());
            }
        }
        for term in &organization_matches {
            if !keywords_found.iter().any(|k| k == term) {
                keywords_found.push((*term).to_string());
            }
        }
        if geographic_match {
            if let Some(term) = self
                .region_terms
                .iter()
                .find(|term| contains_term(&combined_lower, &combined_words, term))
            {
                keywords_found.push(term.clone());
            }
        }

        let signals = [
            !title_matches.is_empty(),
            !description_matches.is_empty(),
            geographic_match,
            !organization_matches.is_empty(),
        ];
        let signal_count = signals.iter().filter(|present| **present).count();

        let breakdown = ScoreBreakdown {
            domain_credibility: self.tld_table.tier(host).score(),
            funding_keywords_title: if signals[0] { TITLE_KEYWORD } else { 0 },
            funding_keywords_description: if signals[1] { DESCRIPTION_KEYWORD } else { 0 },
            geographic_relevance: if signals[2] { GEOGRAPHIC_MATCH } else { 0 },
            organization_type: if signals[3] { ORGANIZATION_MATCH } else { 0 },
            compound_bonus: if signal_count >= COMPOUND_SIGNALS {
                COMPOUND_BONUS
            } else {
                0
            },
        };

        ScoredResult {
            confidence: breakdown.confidence(),
            breakdown,
            keywords_found,
        }
    }

    /// The TLD table this scorer classifies hosts with
    pub fn tld_table(&self) -> &TldTable {
        &self.tld_table
    }
}
