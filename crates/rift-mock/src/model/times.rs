//! Counters, lifetimes and delays.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    #[default]
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn duration(self, value: u64) -> Duration {
        match self {
            TimeUnit::Nanoseconds => Duration::from_nanos(value),
            TimeUnit::Microseconds => Duration::from_micros(value),
            TimeUnit::Milliseconds => Duration::from_millis(value),
            TimeUnit::Seconds => Duration::from_secs(value),
            TimeUnit::Minutes => Duration::from_secs(value.saturating_mul(60)),
            TimeUnit::Hours => Duration::from_secs(value.saturating_mul(3_600)),
            TimeUnit::Days => Duration::from_secs(value.saturating_mul(86_400)),
        }
    }
}

/// Delay applied before an action completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delay {
    #[serde(default)]
    pub time_unit: TimeUnit,
    pub value: u64,
}

impl Delay {
    pub fn milliseconds(value: u64) -> Self {
        Self {
            time_unit: TimeUnit::Milliseconds,
            value,
        }
    }

    pub fn duration(&self) -> Duration {
        self.time_unit.duration(self.value)
    }
}

/// How many times an expectation may still match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "TimesRepr")]
pub struct Times {
    pub remaining_times: u64,
    pub unlimited: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimesRepr {
    remaining_times: Option<u64>,
    unlimited: Option<bool>,
}

impl From<TimesRepr> for Times {
    fn from(repr: TimesRepr) -> Self {
        let unlimited = repr
            .unlimited
            .unwrap_or(repr.remaining_times.is_none());
        Times {
            remaining_times: if unlimited {
                0
            } else {
                repr.remaining_times.unwrap_or(0)
            },
            unlimited,
        }
    }
}

impl Default for Times {
    fn default() -> Self {
        Times::unlimited()
    }
}

impl Times {
    pub fn unlimited() -> Self {
        Times {
            remaining_times: 0,
            unlimited: true,
        }
    }

    pub fn exactly(n: u64) -> Self {
        Times {
            remaining_times: n,
            unlimited: false,
        }
    }

    pub fn once() -> Self {
        Times::exactly(1)
    }
}

/// How long an expectation stays active after it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "TimeToLiveRepr")]
pub struct TimeToLive {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_unit: Option<TimeUnit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_live: Option<u64>,
    pub unlimited: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeToLiveRepr {
    time_unit: Option<TimeUnit>,
    time_to_live: Option<u64>,
    unlimited: Option<bool>,
}

impl From<TimeToLiveRepr> for TimeToLive {
    fn from(repr: TimeToLiveRepr) -> Self {
        let unlimited = repr.unlimited.unwrap_or(repr.time_to_live.is_none());
        if unlimited {
            return TimeToLive::unlimited();
        }
        TimeToLive {
            time_unit: Some(repr.time_unit.unwrap_or_default()),
            time_to_live: repr.time_to_live,
            unlimited: false,
        }
    }
}

impl Default for TimeToLive {
    fn default() -> Self {
        TimeToLive::unlimited()
    }
}

impl TimeToLive {
    pub fn unlimited() -> Self {
        TimeToLive {
            time_unit: None,
            time_to_live: None,
            unlimited: true,
        }
    }

    pub fn exactly(unit: TimeUnit, value: u64) -> Self {
        TimeToLive {
            time_unit: Some(unit),
            time_to_live: Some(value),
            unlimited: false,
        }
    }

    /// The lifetime, or `None` when unlimited.
    pub fn duration(&self) -> Option<Duration> {
        if self.unlimited {
            return None;
        }
        Some(
            self.time_unit
                .unwrap_or_default()
                .duration(self.time_to_live.unwrap_or(0)),
        )
    }
}

/// Bounds on how many times matching traffic must have occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "VerificationTimesRepr")]
pub struct VerificationTimes {
    pub at_least: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_most: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerificationTimesRepr {
    #[serde(default)]
    at_least: i64,
    #[serde(default)]
    at_most: Option<i64>,
}

impl From<VerificationTimesRepr> for VerificationTimes {
    fn from(repr: VerificationTimesRepr) -> Self {
        VerificationTimes {
            at_least: repr.at_least.max(0) as u64,
            // negative upper bounds mean unbounded
            at_most: repr.at_most.filter(|n| *n >= 0).map(|n| n as u64),
        }
    }
}

impl Default for VerificationTimes {
    fn default() -> Self {
        VerificationTimes::at_least(1)
    }
}

impl VerificationTimes {
    pub fn exactly(n: u64) -> Self {
        VerificationTimes {
            at_least: n,
            at_most: Some(n),
        }
    }

    pub fn once() -> Self {
        VerificationTimes::exactly(1)
    }

    pub fn at_least(n: u64) -> Self {
        VerificationTimes {
            at_least: n,
            at_most: None,
        }
    }

    pub fn at_most(n: u64) -> Self {
        VerificationTimes {
            at_least: 0,
            at_most: Some(n),
        }
    }

    pub fn between(min: u64, max: u64) -> Self {
        VerificationTimes {
            at_least: min,
            at_most: Some(max),
        }
    }

    pub fn never() -> Self {
        VerificationTimes::exactly(0)
    }

    pub fn unlimited() -> Self {
        VerificationTimes::at_least(0)
    }

    pub fn matches(&self, count: u64) -> bool {
        count >= self.at_least && self.at_most.is_none_or(|max| count <= max)
    }
}

fn times_phrase(n: u64) -> String {
    if n == 1 {
        "once".to_string()
    } else {
        format!("{n} times")
    }
}

impl fmt::Display for VerificationTimes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.at_most {
            Some(max) if max == self.at_least => write!(f, "exactly {}", times_phrase(max)),
            None => write!(f, "at least {}", times_phrase(self.at_least)),
            Some(max) if self.at_least == 0 => write!(f, "at most {}", times_phrase(max)),
            Some(max) => write!(f, "between {} and {} times", self.at_least, max),
        }
    }
}
