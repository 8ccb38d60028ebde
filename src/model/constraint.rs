//! Correlation Constraints
//!
//! A constraint travels with one correlation request and limits what each
//! query may return: a time window, a per-query result limit, and a per-query
//! timeout. Stores honor it at the backend where they can; the engine
//! additionally rejects time-tagged objects outside the window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Optional limits applied to every query of one correlation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Constraint {
    /// Start of the time window; objects before this instant are rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,

    /// End of the time window; objects after this instant are rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,

    /// Maximum number of objects a single query may contribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    /// Timeout for a single store call, e.g. `"30s"`.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl Constraint {
    pub fn new() -> Self {
        Constraint::default()
    }

    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn ending_at(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether a timestamp falls inside the window. Either bound may be
    /// absent. A window whose end precedes its start allows nothing.
    pub fn allows(&self, t: DateTime<Utc>) -> bool {
        self.start.is_none_or_before(t) && self.end.is_none_or_after(t)
    }
}

// Small readability helpers for the two-sided optional bound.
trait Bound {
    fn is_none_or_before(&self, t: DateTime<Utc>) -> bool;
    fn is_none_or_after(&self, t: DateTime<Utc>) -> bool;
}

impl Bound for Option<DateTime<Utc>> {
    fn is_none_or_before(&self, t: DateTime<Utc>) -> bool {
        self.map_or(true, |b| b <= t)
    }
    fn is_none_or_after(&self, t: DateTime<Utc>) -> bool {
        self.map_or(true, |b| t <= b)
    }
}
