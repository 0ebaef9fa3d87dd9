//! Time-windowed aggregation over saved records.
//!
//! `summarize_at` is a pure function of its inputs — no I/O, no hidden
//! state — so every statistic is deterministic given a record set and a
//! clock value.

use chrono::{DateTime, Duration, Local, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::models::SavedRecord;

/// Probability cutoff separating the positive and negative buckets.
/// Ties at exactly the threshold count as negative.
pub const CLASSIFICATION_THRESHOLD: f64 = 0.5;

/// Number of entries in the `recent_activity` slice.
pub const RECENT_ACTIVITY_LIMIT: usize = 5;

/// Named time range, resolved to `[start, now]` at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Window {
    Today,
    LastWeek,
    LastMonth,
    LastYear,
    Lifetime,
}

impl Window {
    pub fn as_str(&self) -> &'static str {
        match self {
            Window::Today => "today",
            Window::LastWeek => "last-week",
            Window::LastMonth => "last-month",
            Window::LastYear => "last-year",
            Window::Lifetime => "lifetime",
        }
    }

    /// Resolve the start of the window's `[start, now]` range.
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Window::Today => {
                let midnight = now.with_timezone(&Local).date_naive().and_time(NaiveTime::MIN);
                // A DST transition can skip local midnight entirely.
                midnight
                    .and_local_timezone(Local)
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|| now - Duration::days(1))
            }
            Window::LastWeek => now - Duration::days(7),
            Window::LastMonth => now - Duration::days(30),
            Window::LastYear => now - Duration::days(365),
            Window::Lifetime => DateTime::UNIX_EPOCH,
        }
    }
}

impl std::str::FromStr for Window {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(Window::Today),
            "last-week" => Ok(Window::LastWeek),
            "last-month" => Ok(Window::LastMonth),
            "last-year" => Ok(Window::LastYear),
            "lifetime" => Ok(Window::Lifetime),
            other => Err(ValidationError::UnknownWindow(other.to_string())),
        }
    }
}

/// Two-bucket record count around [`CLASSIFICATION_THRESHOLD`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDistribution {
    pub positive: u64,
    pub negative: u64,
}

/// One row of the bounded recent-activity slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub probability: f64,
    pub processing_time_ms: u64,
    pub has_comments: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub window: Window,
    pub total_count: u64,
    pub average_probability: f64,
    pub average_processing_time_ms: f64,
    pub class_distribution: ClassDistribution,
    pub recent_activity: Vec<ActivityEntry>,
}

/// Summarize `records` over `window` resolved against the current instant.
///
/// `records` are expected newest-first, as [`crate::store::RecordStore::list`]
/// returns them; the recent-activity slice preserves that order.
pub fn summarize(records: &[SavedRecord], window: Window) -> DashboardSummary {
    summarize_at(records, window, Utc::now())
}

/// Summarize against an explicit clock value. Pure.
pub fn summarize_at(
    records: &[SavedRecord],
    window: Window,
    now: DateTime<Utc>,
) -> DashboardSummary {
    let start = window.start(now);
    let filtered: Vec<&SavedRecord> = records
        .iter()
        .filter(|r| r.created_at >= start && r.created_at <= now)
        .collect();

    let total = filtered.len();
    let mut probability_sum = 0.0f64;
    let mut processing_time_sum = 0.0f64;
    let mut class_distribution = ClassDistribution::default();

    for record in &filtered {
        let result = &record.analysis_result;
        probability_sum += result.probability;
        processing_time_sum += result.processing_time_ms as f64;
        if result.probability > CLASSIFICATION_THRESHOLD {
            class_distribution.positive += 1;
        } else {
            class_distribution.negative += 1;
        }
    }

    let recent_activity = filtered
        .iter()
        .take(RECENT_ACTIVITY_LIMIT)
        .map(|record| ActivityEntry {
            id: record.id,
            timestamp: record.created_at,
            probability: record.analysis_result.probability,
            processing_time_ms: record.analysis_result.processing_time_ms,
            has_comments: record.has_comments(),
        })
        .collect();

    DashboardSummary {
        window,
        total_count: total as u64,
        average_probability: if total == 0 {
            0.0
        } else {
            probability_sum / total as f64
        },
        average_processing_time_ms: if total == 0 {
            0.0
        } else {
            processing_time_sum / total as f64
        },
        class_distribution,
        recent_activity,
    }
}
