use std::path::PathBuf;

use chrono::Weekday;

use crate::limits::MAX_CANCEL_LEAD_MINUTES;
use crate::timestamp::{format_minutes, parse_minutes};

/// Operating window of the single location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessHours {
    pub closed_day: Weekday,
    /// Minutes from midnight.
    pub opens_at: u32,
    /// Minutes from midnight; every appointment must end by then.
    pub closes_at: u32,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            closed_day: Weekday::Sun,
            opens_at: 11 * 60,
            closes_at: 18 * 60,
        }
    }
}

impl BusinessHours {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.closes_at > 24 * 60 {
            return Err(ConfigError::Invalid {
                var: "SLOTBOOK_CLOSES_AT",
                value: format_minutes(self.closes_at),
                reason: "closing time is past midnight",
            });
        }
        if self.opens_at >= self.closes_at {
            return Err(ConfigError::Invalid {
                var: "SLOTBOOK_OPENS_AT",
                value: format_minutes(self.opens_at),
                reason: "opening time must be before closing time",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancellationRules {
    /// Client self-cancellation needs at least this many minutes before the start.
    pub min_lead_minutes: i64,
}

impl Default for CancellationRules {
    fn default() -> Self {
        Self { min_lead_minutes: 60 }
    }
}

/// Everything the engine needs to judge a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulePolicy {
    pub hours: BusinessHours,
    pub cancellation: CancellationRules,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub policy: SchedulePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { var, value, reason } => {
                write!(f, "invalid {var}={value:?}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// The appointment log inside `data_dir`.
    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("appointments.wal")
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = lookup("SLOTBOOK_DATA_DIR").unwrap_or_else(|| "./data".into());
        let compact_threshold: u64 = match lookup("SLOTBOOK_COMPACT_THRESHOLD") {
            Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid {
                var: "SLOTBOOK_COMPACT_THRESHOLD",
                value: v,
                reason: "expected a non-negative integer",
            })?,
            None => 1000,
        };
        let metrics_port: Option<u16> = match lookup("SLOTBOOK_METRICS_PORT") {
            Some(v) => Some(v.trim().parse().map_err(|_| ConfigError::Invalid {
                var: "SLOTBOOK_METRICS_PORT",
                value: v,
                reason: "expected a port number",
            })?),
            None => None,
        };

        let mut hours = BusinessHours::default();
        if let Some(v) = lookup("SLOTBOOK_CLOSED_DAY") {
            hours.closed_day = v.trim().parse().map_err(|_| ConfigError::Invalid {
                var: "SLOTBOOK_CLOSED_DAY",
                value: v,
                reason: "expected a weekday name",
            })?;
        }
        if let Some(v) = lookup("SLOTBOOK_OPENS_AT") {
            hours.opens_at = parse_minutes(&v).ok_or(ConfigError::Invalid {
                var: "SLOTBOOK_OPENS_AT",
                value: v,
                reason: "expected HH:MM",
            })?;
        }
        if let Some(v) = lookup("SLOTBOOK_CLOSES_AT") {
            hours.closes_at = parse_minutes(&v).ok_or(ConfigError::Invalid {
                var: "SLOTBOOK_CLOSES_AT",
                value: v,
                reason: "expected HH:MM",
            })?;
        }
        hours.validate()?;

        let mut cancellation = CancellationRules::default();
        if let Some(v) = lookup("SLOTBOOK_CANCEL_LEAD_MINUTES") {
            cancellation.min_lead_minutes = v
                .trim()
                .parse()
                .ok()
                .filter(|m: &i64| (0..=MAX_CANCEL_LEAD_MINUTES).contains(m))
                .ok_or(ConfigError::Invalid {
                    var: "SLOTBOOK_CANCEL_LEAD_MINUTES",
                    value: v,
                    reason: "expected between 0 and 10080 minutes",
                })?;
        }

        Ok(Self {
            data_dir: PathBuf::from(data_dir),
            compact_threshold,
            metrics_port,
            policy: SchedulePolicy { hours, cancellation },
        })
    }
}
