// Copyright 2025 Cowboy AI, LLC.

//! Classified TLD table
//!
//! Five tiers bias the confidence score: institutional suffixes add the
//! most, known spam suffixes subtract and are rejected outright by the
//! pipeline's spam-TLD filter before scoring even runs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ordinal TLD classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TldTier {
    /// Institutional (.gov, .edu, .ngo, ...): +0.20
    Institutional,
    /// Nonprofit (.org): +0.15
    Nonprofit,
    /// Commercial (.com, .net): +0.08
    Commercial,
    /// Informational and unclassified: 0.00
    Informational,
    /// Known spam suffixes (.xyz, .top, ...): -0.20, filtered
    Spam,
}

impl TldTier {
    /// Confidence contribution in hundredths
    pub fn score(&self) -> i16 {
        match self {
            TldTier::Institutional => 20,
            TldTier::Nonprofit => 15,
            TldTier::Commercial => 8,
            TldTier::Informational => 0,
            TldTier::Spam => -20,
        }
    }
}

/// Lookup table from TLD (and known two-label suffixes) to tier
#[derive(Debug, Clone)]
pub struct TldTable {
    entries: HashMap<&'static str, TldTier>,
}

impl Default for TldTable {
    fn default() -> Self {
        let mut entries = HashMap::new();

        for tld in ["gov", "edu", "ngo", "int", "mil", "gov.bg", "gov.uk", "edu.bg"] {
            entries.insert(tld, TldTier::Institutional);
        }
        for tld in ["org", "org.uk", "org.bg"] {
            entries.insert(tld, TldTier::Nonprofit);
        }
        for tld in ["com", "net", "co", "co.uk", "com.bg"] {
            entries.insert(tld, TldTier::Commercial);
        }
        for tld in ["info", "io", "eu", "bg", "de", "fr", "uk", "us", "me", "online", "site"] {
            entries.insert(tld, TldTier::Informational);
        }
        for tld in [
            "xyz", "top", "click", "loan", "win", "bid", "stream", "download", "racing", "date",
            "faith", "review", "accountant", "science", "work", "party", "buzz", "cam", "gq",
            "cf", "tk", "ml", "ga",
        ] {
            entries.insert(tld, TldTier::Spam);
        }

        Self { entries }
    }
}

impl TldTable {
    /// Classify a normalized host
    ///
    /// Two-label suffixes (gov.bg) win over single labels; hosts with no
    /// dot or an unknown suffix fall back to Informational.
    pub fn tier(&self, host: &str) -> TldTier {
        let labels: Vec<&str> = host.rsplit('.').collect();
        if labels.len() >= 2 {
            let two = format!("{}.{}", labels[1], labels[0]);
            if let Some(tier) = self.entries.get(two.as_str()) {
                return *tier;
            }
        }
        labels
            .first()
            .and_then(|tld| self.entries.get(tld))
            .copied()
            .unwrap_or(TldTier::Informational)
    }

    /// Whether the host's TLD is a known spam suffix
    pub fn is_spam(&self, host: &str) -> bool {
        self.tier(host) == TldTier::Spam
    }
}
