//! Named reporting periods and the windows they select.

use crate::breakdown::Granularity;
use crate::types::Window;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const HOUR_SECS: i64 = 60 * 60;
const DAY_SECS: i64 = 24 * HOUR_SECS;

/// A named reporting period, relative to "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1h")]
    LastHour,
    #[serde(rename = "24h")]
    LastDay,
    #[serde(rename = "7d")]
    LastWeek,
    #[serde(rename = "30d")]
    LastMonth,
    #[serde(rename = "all")]
    All,
}

struct Preset {
    name: &'static str,
    period: Period,
    /// How far back the window reaches; `None` means unbounded.
    lookback_secs: Option<i64>,
    granularity: Granularity,
}

static PRESETS: [Preset; 5] = [
    Preset {
        name: "1h",
        period: Period::LastHour,
        lookback_secs: Some(HOUR_SECS),
        granularity: Granularity::Hourly,
    },
    Preset {
        name: "24h",
        period: Period::LastDay,
        lookback_secs: Some(DAY_SECS),
        granularity: Granularity::Daily,
    },
    Preset {
        name: "7d",
        period: Period::LastWeek,
        lookback_secs: Some(7 * DAY_SECS),
        granularity: Granularity::Daily,
    },
    Preset {
        name: "30d",
        period: Period::LastMonth,
        lookback_secs: Some(30 * DAY_SECS),
        granularity: Granularity::Daily,
    },
    Preset {
        name: "all",
        period: Period::All,
        lookback_secs: None,
        granularity: Granularity::Daily,
    },
];

impl Period {
    /// Period used when none is given or the given one is not recognized.
    pub const DEFAULT: Period = Period::LastDay;

    /// Look up a period by name, falling back to [`Period::DEFAULT`] for
    /// anything outside the named set.
    pub fn parse(name: &str) -> Self {
        match PRESETS.iter().find(|p| p.name == name.trim()) {
            Some(preset) => preset.period,
            None => {
                tracing::debug!(period = name, fallback = Self::DEFAULT.as_str(), "unknown period");
                Self::DEFAULT
            }
        }
    }

    fn preset(&self) -> &'static Preset {
        // Every variant has exactly one row in PRESETS.
        PRESETS
            .iter()
            .find(|p| p.period == *self)
            .unwrap_or(&PRESETS[1])
    }

    pub fn as_str(&self) -> &'static str {
        self.preset().name
    }

    pub fn granularity(&self) -> Granularity {
        self.preset().granularity
    }

    /// Window ending at `now`, or `None` for the unbounded period.
    pub fn window(&self, now: DateTime<Utc>) -> Option<Window> {
        self.preset()
            .lookback_secs
            .map(|secs| Window::new(now - Duration::seconds(secs), now))
    }
}

impl Default for Period {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
