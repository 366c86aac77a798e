//! Time-bucketed breakdown of attempts for dashboard charts.

use crate::types::AuthAttempt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Most buckets a breakdown returns; older buckets are dropped first.
pub const MAX_BUCKETS: usize = 24;

/// Bucket size used to group attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// `YYYY-MM-DD HH:00`
    Hourly,
    /// `YYYY-MM-DD`
    Daily,
}

impl Granularity {
    /// Label of the UTC bucket containing `t`.
    ///
    /// Both formats use zero-padded fields, so lexical order of labels is
    /// chronological order of buckets.
    pub fn bucket_label(&self, t: DateTime<Utc>) -> String {
        match self {
            Self::Hourly => t.format("%Y-%m-%d %H:00").to_string(),
            Self::Daily => t.format("%Y-%m-%d").to_string(),
        }
    }
}

/// Attempt counts for one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakdownEntry {
    pub bucket_label: String,
    pub attempts: u64,
    pub successful: u64,
}

/// Group `attempts` into buckets, ascending by label, keeping only the
/// [`MAX_BUCKETS`] most recent buckets.
pub fn compute_breakdown<'a, I>(attempts: I, granularity: Granularity) -> Vec<BreakdownEntry>
where
    I: IntoIterator<Item = &'a AuthAttempt>,
{
    let mut builder = BreakdownBuilder::new(granularity);
    for attempt in attempts {
        builder.add(attempt.timestamp, attempt.success);
    }
    builder.finish()
}

/// Incremental form of [`compute_breakdown`], fed one attempt at a time.
///
/// Memory is bounded by the number of distinct buckets, not attempts.
#[derive(Debug, Clone)]
pub struct BreakdownBuilder {
    granularity: Granularity,
    buckets: BTreeMap<String, (u64, u64)>,
}

impl BreakdownBuilder {
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            buckets: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, at: DateTime<Utc>, success: bool) {
        let (total, successful) = self
            .buckets
            .entry(self.granularity.bucket_label(at))
            .or_default();
        *total += 1;
        if success {
            *successful += 1;
        }
    }

    pub fn finish(self) -> Vec<BreakdownEntry> {
        let skip = self.buckets.len().saturating_sub(MAX_BUCKETS);
        self.buckets
            .into_iter()
            .skip(skip)
            .map(|(bucket_label, (attempts, successful))| BreakdownEntry {
                bucket_label,
                attempts,
                successful,
            })
            .collect()
    }
}
