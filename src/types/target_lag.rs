use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use serde::{de, Deserialize, Deserializer};

use crate::types::errors::TargetLagError;

/// Staleness budget of a derived relation.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TargetLag {
    /// Refresh only when a dependent view needs fresher input.
    Downstream,
    /// Reflect every source write older than this duration.
    Duration(Duration)
}

impl TargetLag {
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            TargetLag::Downstream => None,
            TargetLag::Duration(duration) => Some(*duration)
        }
    }
}

impl Default for TargetLag {
    fn default() -> Self {
        TargetLag::Duration(Duration::from_secs(60))
    }
}

impl Display for TargetLag {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TargetLag::Downstream => write!(formatter, "downstream"),
            TargetLag::Duration(duration) => {
                let millis = duration.as_millis();

                if millis % 3_600_000 == 0 && millis > 0 {
                    write!(formatter, "{}h", millis / 3_600_000)
                } else if millis % 60_000 == 0 && millis > 0 {
                    write!(formatter, "{}m", millis / 60_000)
                } else if millis % 1_000 == 0 {
                    write!(formatter, "{}s", millis / 1_000)
                } else {
                    write!(formatter, "{millis}ms")
                }
            }
        }
    }
}

impl FromStr for TargetLag {
    type Err = TargetLagError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim().to_lowercase();

        if value.is_empty() {
            return Err(TargetLagError::InvalidFormat("Value is an empty string".to_string()));
        }

        if value == "downstream" {
            return Ok(TargetLag::Downstream);
        }

        let split = value.find(|c: char| !c.is_ascii_digit()).unwrap_or(value.len());
        let (amount, unit) = value.split_at(split);

        if amount.is_empty() {
            return Err(TargetLagError::InvalidFormat(format!("'{value}' does not start with a number")));
        }

        let amount: u64 = amount.parse()?;
        let millis_per_unit: u64 = match unit.trim() {
            "ms" | "millis" | "milliseconds" => 1,
            "" | "s" | "sec" | "secs" | "second" | "seconds" => 1_000,
            "m" | "min" | "mins" | "minute" | "minutes" => 60_000,
            "h" | "hr" | "hour" | "hours" => 3_600_000,
            "d" | "day" | "days" => 86_400_000,
            other => return Err(TargetLagError::InvalidFormat(format!("Unknown unit '{other}'")))
        };

        let millis = amount.checked_mul(millis_per_unit).ok_or(TargetLagError::Overflow)?;

        Ok(TargetLag::Duration(Duration::from_millis(millis)))
    }
}

impl<'de> Deserialize<'de> for TargetLag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        TargetLag::from_str(&value).map_err(de::Error::custom)
    }
}
