// Copyright 2025 Cowboy AI, LLC.

//! Curated term tables used by scoring and anti-spam
//!
//! The funding keyword set is multilingual (English plus Bulgarian, German,
//! French); matching is word-boundary based for single words and substring
//! based for phrases, always on lowercased text.

use std::collections::HashSet;

/// Funding keywords searched in titles and descriptions
pub const FUNDING_KEYWORDS: &[&str] = &[
    // English
    "grant",
    "grants",
    "scholarship",
    "scholarships",
    "fellowship",
    "fellowships",
    "funding",
    "fund",
    "funds",
    "award",
    "awards",
    "subsidy",
    "subsidies",
    "loan",
    "loans",
    "bursary",
    "stipend",
    "donation",
    "endowment",
    "call for proposals",
    // Bulgarian
    "грант",
    "грантове",
    "стипендия",
    "стипендии",
    "финансиране",
    "субсидия",
    "безвъзмездна помощ",
    "конкурс за проекти",
    // German
    "förderung",
    "stipendium",
    "zuschuss",
    // French
    "subvention",
    "bourse",
    "financement",
];

/// Organization-type terms suggesting an institutional funder
pub const ORGANIZATION_TERMS: &[&str] = &[
    "ministry",
    "foundation",
    "commission",
    "council",
    "agency",
    "trust",
    "institute",
    "directorate",
    "municipality",
    "embassy",
    "министерство",
    "фондация",
    "комисия",
    "община",
    "агенция",
    "stiftung",
    "ministerium",
    "fondation",
    "ministère",
];

/// Default region terms when the session criteria name none
pub const DEFAULT_REGION_TERMS: &[&str] = &[
    "bulgaria",
    "bulgarian",
    "българия",
    "balkan",
    "southeast europe",
    "eastern europe",
    "european union",
    "european",
    "europe",
    "eu",
];

/// Common English function words; fewer than two in combined metadata is an
/// unnatural-keyword-list signal
pub const FUNCTION_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "for", "to", "of", "in", "on", "at", "by", "with", "from",
    "is", "are", "was", "be", "this", "that", "your", "our", "you", "we",
];

/// Industries whose domains never legitimately carry education metadata
pub const SCAMMER_INDUSTRY_TERMS: &[&str] = &[
    "casino", "poker", "betting", "gambling", "slots", "essay", "essays", "homework",
    "coursework", "pills", "pharma",
];

/// Education-flavored terms used by the cross-category check
pub const EDUCATION_TERMS: &[&str] = &[
    "education",
    "school",
    "university",
    "student",
    "scholarship",
    "academic",
    "learning",
];

/// Lowercase a text and split it into a word set
pub fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect()
}

/// Whether a term occurs in the text
///
/// Single-word terms match on word boundaries (so "grant" does not match
/// "migrants"); multi-word phrases match as substrings of the lowercased
/// text.
pub fn contains_term(lower_text: &str, words: &HashSet<String>, term: &str) -> bool {
    if term.contains(' ') {
        lower_text.contains(term)
    } else {
        words.contains(term)
    }
}

/// First matching term from a table, for judgment records
pub fn matching_terms<'a>(
    lower_text: &str,
    words: &HashSet<String>,
    terms: &'a [&'a str],
) -> Vec<&'a str> {
    terms
        .iter()
        .filter(|term| contains_term(lower_text, words, term))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_boundary_matching() {
        let text = "support for migrants arriving in europe";
        let words = word_set(text);
        // "grant" must not match inside "migrants".
        assert!(!contains_term(text, &words, "grant"));
        assert!(contains_term(text, &words, "europe"));
    }

    #[test]
    fn test_phrase_matching() {
        let text = "open call for proposals 2025";
        let words = word_set(text);
        assert!(contains_term(text, &words, "call for proposals"));
        assert!(!contains_term(text, &words, "безвъзмездна помощ"));
    }

    #[test]
    fn test_cyrillic_terms_match() {
        let text = "безвъзмездна помощ за училища в българия";
        let words = word_set(text);
        assert!(contains_term(text, &words, "безвъзмездна помощ"));
        assert!(contains_term(text, &words, "българия"));
    }

    #[test]
    fn test_matching_terms_collects_all() {
        let text = "european commission grants for bulgaria";
        let words = word_set(text);
        let matched = matching_terms(text, &words, FUNDING_KEYWORDS);
        assert_eq!(matched, vec!["grants"]);
        let orgs = matching_terms(text, &words, ORGANIZATION_TERMS);
        assert_eq!(orgs, vec!["commission"]);
    }
}
