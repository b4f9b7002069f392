//! Data models for analytics

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::Variable;

pub const MINUTES_PER_HOUR: i64 = 60;
pub const MINUTES_PER_DAY: i64 = 1440;

/// One resolved redirect, written once and never updated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectEvent {
    pub link_uid: String,
    pub rule_index: usize,
    /// Unix time in minutes
    pub minute: i64,
    pub values: Vec<(Variable, String)>,
}

/// Resolution of a stored time-bucket counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    Minute,
    Hour,
    Day,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [Granularity::Minute, Granularity::Hour, Granularity::Day];

    pub fn minutes(self) -> i64 {
        match self {
            Granularity::Minute => 1,
            Granularity::Hour => MINUTES_PER_HOUR,
            Granularity::Day => MINUTES_PER_DAY,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
            Granularity::Day => "day",
        }
    }

    /// Start of the bucket containing `minute`
    pub fn bucket_start(self, minute: i64) -> i64 {
        minute.div_euclid(self.minutes()) * self.minutes()
    }

    /// Coarsest stored granularity whose buckets tile `span` exactly
    pub fn for_span(span: Span) -> Self {
        let minutes = span.minutes();
        if minutes % MINUTES_PER_DAY == 0 {
            Granularity::Day
        } else if minutes % MINUTES_PER_HOUR == 0 {
            Granularity::Hour
        } else {
            Granularity::Minute
        }
    }
}

/// Width of a time bucket in minutes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "i64")]
pub struct Span(i64);

impl Span {
    pub const MINUTE: Span = Span(1);
    pub const HOUR: Span = Span(MINUTES_PER_HOUR);
    pub const DAY: Span = Span(MINUTES_PER_DAY);
    /// Widest accepted bucket, one leap year
    pub const MAX_MINUTES: i64 = 366 * MINUTES_PER_DAY;

    pub fn new(minutes: i64) -> Option<Self> {
        (1..=Self::MAX_MINUTES).contains(&minutes).then_some(Self(minutes))
    }

    pub fn minutes(self) -> i64 {
        self.0
    }

    /// Round `minute` down to a multiple of this span
    pub fn align(self, minute: i64) -> i64 {
        minute.div_euclid(self.0) * self.0
    }
}

impl Default for Span {
    fn default() -> Self {
        Span::MINUTE
    }
}

impl FromStr for Span {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "min" | "minute" => Ok(Span::MINUTE),
            "hour" => Ok(Span::HOUR),
            "day" => Ok(Span::DAY),
            other => other
                .parse::<i64>()
                .ok()
                .and_then(Span::new)
                .ok_or_else(|| format!("invalid span '{s}'")),
        }
    }
}

impl TryFrom<String> for Span {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Span> for i64 {
    fn from(span: Span) -> Self {
        span.0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Increasing,
    Decreasing,
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Increasing" | "increasing" | "asc" => Ok(SortDirection::Increasing),
            "Decreasing" | "decreasing" | "desc" => Ok(SortDirection::Decreasing),
            other => Err(format!("invalid sort direction '{other}'")),
        }
    }
}

/// One table row of a value-count page. Padding rows use `"-"` for both
/// fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRow {
    pub key: String,
    pub count: String,
}

impl CountRow {
    pub const SENTINEL: &'static str = "-";

    pub fn new(key: impl Into<String>, count: i64) -> Self {
        Self {
            key: key.into(),
            count: count.to_string(),
        }
    }

    pub fn sentinel() -> Self {
        Self {
            key: Self::SENTINEL.to_string(),
            count: Self::SENTINEL.to_string(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.key == Self::SENTINEL && self.count == Self::SENTINEL
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueCountPage {
    pub counts: Vec<CountRow>,
    pub page_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesPage {
    /// Aligned start of the first bucket, in minutes
    pub start: i64,
    pub span: i64,
    pub data_points: Vec<i64>,
}

/// A query result plus whether it came from the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryOutcome<T> {
    #[serde(flatten)]
    pub payload: T,
    pub from_cache: bool,
}

impl<T> QueryOutcome<T> {
    pub fn fresh(payload: T) -> Self {
        Self {
            payload,
            from_cache: false,
        }
    }

    pub fn cached(payload: T) -> Self {
        Self {
            payload,
            from_cache: true,
        }
    }
}
