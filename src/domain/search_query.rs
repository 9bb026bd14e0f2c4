// Copyright 2025 Cowboy AI, LLC.

//! Saved query library for the scheduled path

use crate::domain::engine::EngineKind;
use chrono::{DateTime, Datelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Day of week a saved query runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleDay {
    /// Monday
    Monday,
    /// Tuesday
    Tuesday,
    /// Wednesday
    Wednesday,
    /// Thursday
    Thursday,
    /// Friday
    Friday,
    /// Saturday
    Saturday,
    /// Sunday
    Sunday,
}

impl ScheduleDay {
    /// The schedule day of a timestamp
    pub fn of(at: DateTime<Utc>) -> Self {
        match at.weekday() {
            Weekday::Mon => ScheduleDay::Monday,
            Weekday::Tue => ScheduleDay::Tuesday,
            Weekday::Wed => ScheduleDay::Wednesday,
            Weekday::Thu => ScheduleDay::Thursday,
            Weekday::Fri => ScheduleDay::Friday,
            Weekday::Sat => ScheduleDay::Saturday,
            Weekday::Sun => ScheduleDay::Sunday,
        }
    }

    /// Parse a lowercase English day name
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "monday" | "mon" => Some(ScheduleDay::Monday),
            "tuesday" | "tue" => Some(ScheduleDay::Tuesday),
            "wednesday" | "wed" => Some(ScheduleDay::Wednesday),
            "thursday" | "thu" => Some(ScheduleDay::Thursday),
            "friday" | "fri" => Some(ScheduleDay::Friday),
            "saturday" | "sat" => Some(ScheduleDay::Saturday),
            "sunday" | "sun" => Some(ScheduleDay::Sunday),
            _ => None,
        }
    }
}

/// A persisted named query run by the nightly schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedQuery {
    /// Query identifier
    pub id: Uuid,
    /// Operator-facing name
    pub name: String,
    /// Query text sent to the engines verbatim
    pub text: String,
    /// Day of week this query runs
    pub day: ScheduleDay,
    /// Engines the query targets
    pub engines: Vec<EngineKind>,
    /// Free-form tags
    pub tags: Vec<String>,
    /// Disabled queries are skipped by the schedule
    pub enabled: bool,
    /// When the query was created
    pub created_at: DateTime<Utc>,
}

impl SavedQuery {
    /// Create an enabled query for the given day and engines
    pub fn new(
        name: impl Into<String>,
        text: impl Into<String>,
        day: ScheduleDay,
        engines: Vec<EngineKind>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            text: text.into(),
            day,
            engines,
            tags: Vec::new(),
            enabled: true,
            created_at: Utc::now(),
        }
    }
}
