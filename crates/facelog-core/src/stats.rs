//! Summary statistics over a set of authentication attempts.
//!
//! Aggregation is an explicit fold over the attempts: the storage layer only
//! hands back rows, it never computes the numbers.

use crate::types::AuthAttempt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Decimal places kept in `success_rate` (a percentage).
const SUCCESS_RATE_PRECISION: i32 = 2;
/// Decimal places kept in `avg_confidence`.
const CONFIDENCE_PRECISION: i32 = 3;

/// Aggregate counts and rates for a window of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Stats {
    pub total_attempts: u64,
    pub successful_attempts: u64,
    pub failed_attempts: u64,
    /// Percentage of attempts that succeeded, 0 when there were none.
    pub success_rate: f64,
    /// Mean confidence, 0 when there were no attempts.
    pub avg_confidence: f64,
}

impl Stats {
    /// Fold `attempts` into summary statistics.
    pub fn from_attempts<'a, I>(attempts: I) -> Self
    where
        I: IntoIterator<Item = &'a AuthAttempt>,
    {
        let mut acc = StatsAccumulator::default();
        for attempt in attempts {
            acc.push(attempt);
        }
        acc.finish()
    }
}

/// Running totals; `finish` turns them into rounded [`Stats`].
#[derive(Debug, Clone, Default)]
pub struct StatsAccumulator {
    total: u64,
    successful: u64,
    confidence_sum: f64,
    last_attempt: Option<DateTime<Utc>>,
}

impl StatsAccumulator {
    pub fn push(&mut self, attempt: &AuthAttempt) {
        self.add(attempt.success, attempt.confidence, attempt.timestamp);
    }

    /// Count one attempt from its raw fields, without materializing it.
    pub fn add(&mut self, success: bool, confidence: f64, at: DateTime<Utc>) {
        self.total += 1;
        if success {
            self.successful += 1;
        }
        self.confidence_sum += confidence;
        self.last_attempt = Some(match self.last_attempt {
            Some(prev) => prev.max(at),
            None => at,
        });
    }

    /// Most recent attempt timestamp seen so far.
    pub fn last_attempt(&self) -> Option<DateTime<Utc>> {
        self.last_attempt
    }

    pub fn finish(&self) -> Stats {
        if self.total == 0 {
            return Stats::default();
        }

        let total = self.total as f64;
        Stats {
            total_attempts: self.total,
            successful_attempts: self.successful,
            failed_attempts: self.total - self.successful,
            success_rate: round_to(self.successful as f64 / total * 100.0, SUCCESS_RATE_PRECISION),
            avg_confidence: round_to(self.confidence_sum / total, CONFIDENCE_PRECISION),
        }
    }
}

/// Stats for a single user plus the time of their latest attempt.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UserStats {
    #[serde(flatten)]
    pub stats: Stats,
    pub last_attempt: Option<DateTime<Utc>>,
}

impl UserStats {
    pub fn from_attempts<'a, I>(attempts: I) -> Self
    where
        I: IntoIterator<Item = &'a AuthAttempt>,
    {
        let mut acc = StatsAccumulator::default();
        for attempt in attempts {
            acc.push(attempt);
        }
        Self::from(&acc)
    }
}

impl From<&StatsAccumulator> for UserStats {
    fn from(acc: &StatsAccumulator) -> Self {
        Self {
            stats: acc.finish(),
            last_attempt: acc.last_attempt(),
        }
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}
