// Copyright 2025 Cowboy AI, LLC.

//! User-supplied search criteria
//!
//! A search request names what kind of funding is sought, for whom, and
//! where. Validation happens here, before any side effects: an invalid
//! request never creates a session or publishes an event.

use crate::errors::{DiscoveryError, DiscoveryResult};
use serde::{Deserialize, Serialize};

/// Funding category the requester is interested in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FundingCategory {
    /// Schools, scholarships, adult learning
    Education,
    /// Culture and heritage programs
    Culture,
    /// Health and social care
    Health,
    /// Social services and inclusion
    SocialServices,
    /// Environment and climate
    Environment,
    /// Community and rural development
    CommunityDevelopment,
    /// Research and innovation
    Research,
    /// Infrastructure and public works
    Infrastructure,
    /// Youth programs and sport
    YouthPrograms,
    /// Arts and media
    ArtsAndMedia,
}

impl FundingCategory {
    /// Search terms seeding generated queries for this category
    pub fn terms(&self) -> &'static [&'static str] {
        match self {
            FundingCategory::Education => &["education", "school", "scholarship"],
            FundingCategory::Culture => &["culture", "heritage"],
            FundingCategory::Health => &["health", "healthcare"],
            FundingCategory::SocialServices => &["social services", "inclusion"],
            FundingCategory::Environment => &["environment", "climate"],
            FundingCategory::CommunityDevelopment => &["community development", "rural"],
            FundingCategory::Research => &["research", "innovation"],
            FundingCategory::Infrastructure => &["infrastructure", "public works"],
            FundingCategory::YouthPrograms => &["youth", "sport"],
            FundingCategory::ArtsAndMedia => &["arts", "media"],
        }
    }
}

/// Geographic scope of eligible funding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeographicScope {
    /// National programs
    Bulgaria,
    /// Balkan-region programs
    BalkanRegion,
    /// Eastern-Europe programs
    EasternEurope,
    /// EU-level programs
    EuropeanUnion,
    /// Pan-European programs outside EU instruments
    Europe,
    /// Worldwide programs open to any geography
    Global,
}

impl GeographicScope {
    /// Region terms used for both query generation and geographic scoring
    pub fn terms(&self) -> &'static [&'static str] {
        match self {
            GeographicScope::Bulgaria => &["bulgaria", "bulgarian", "българия"],
            GeographicScope::BalkanRegion => &["balkan", "balkans", "southeast europe"],
            GeographicScope::EasternEurope => &["eastern europe", "east european"],
            GeographicScope::EuropeanUnion => &["european union", "eu", "european"],
            GeographicScope::Europe => &["europe", "european"],
            GeographicScope::Global => &["international", "worldwide", "global"],
        }
    }
}

/// Who may receive the funding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipientType {
    /// Municipal governments
    Municipality,
    /// Schools and kindergartens
    School,
    /// Non-governmental organizations
    Ngo,
    /// Community centers
    CommunityCenter,
    /// Universities and research institutes
    University,
    /// Social enterprises
    SocialEnterprise,
    /// Private individuals
    Individual,
    /// Small businesses
    SmallBusiness,
}

/// Rough project scale, used to bias query phrasing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectScale {
    /// Under ~5k
    Micro,
    /// 5k-50k
    Small,
    /// 50k-500k
    Medium,
    /// Over 500k
    Large,
}

/// Bounds on results requested per query
pub const MIN_RESULTS_PER_QUERY: u32 = 10;
/// Upper bound on results requested per query
pub const MAX_RESULTS_PER_QUERY: u32 = 100;

/// A validated description of desired funding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCriteria {
    /// At least one funding category
    pub funding_categories: Vec<FundingCategory>,
    /// At least one geographic scope
    pub geographic_scopes: Vec<GeographicScope>,
    /// At least one recipient type
    pub recipient_types: Vec<RecipientType>,
    /// Optional scale hint
    #[serde(default)]
    pub project_scale: Option<ProjectScale>,
    /// Query language (BCP-47-ish tag, e.g. "en", "bg")
    pub language: String,
    /// Results requested per (engine, query) pair
    pub max_results_per_query: u32,
}

impl SearchCriteria {
    /// Validate the criteria; an `Err` here means HTTP 400 and no side effects
    pub fn validate(&self) -> DiscoveryResult<()> {
        if self.funding_categories.is_empty() {
            return Err(DiscoveryError::validation(
                "fundingCategories must contain at least one entry",
            ));
        }
        if self.geographic_scopes.is_empty() {
            return Err(DiscoveryError::validation(
                "geographicScopes must contain at least one entry",
            ));
        }
        if self.recipient_types.is_empty() {
            return Err(DiscoveryError::validation(
                "recipientTypes must contain at least one entry",
            ));
        }
        if self.language.trim().is_empty() {
            return Err(DiscoveryError::validation("language must not be empty"));
        }
        if !(MIN_RESULTS_PER_QUERY..=MAX_RESULTS_PER_QUERY).contains(&self.max_results_per_query) {
            return Err(DiscoveryError::validation(format!(
                "maxResultsPerQuery must be between {MIN_RESULTS_PER_QUERY} and {MAX_RESULTS_PER_QUERY}, got {}",
                self.max_results_per_query
            )));
        }
        Ok(())
    }

    /// Region terms derived from the requested scopes, lowercased, deduplicated
    pub fn region_terms(&self) -> Vec<String> {
        let mut terms: Vec<String> = Vec::new();
        for scope in &self.geographic_scopes {
            for term in scope.terms() {
                if !terms.iter().any(|t| t == term) {
                    terms.push((*term).to_string());
                }
            }
        }
        terms
    }

    /// Canned criteria used by the scheduled path and the CLI trigger
    pub fn canned() -> Self {
        Self {
            funding_categories: vec![
                FundingCategory::Education,
                FundingCategory::CommunityDevelopment,
            ],
            geographic_scopes: vec![GeographicScope::Bulgaria, GeographicScope::EuropeanUnion],
            recipient_types: vec![RecipientType::Municipality, RecipientType::Ngo],
            project_scale: Some(ProjectScale::Small),
            language: "en".to_string(),
            max_results_per_query: 20,
        }
    }
}
