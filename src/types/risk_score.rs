use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer};

use crate::types::errors::RiskScoreError;

/// Normalized fraud-likelihood indicator, always within `[0, 1]`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct RiskScore(Decimal);

impl RiskScore {
    /// Default threshold at or above which a transaction counts as high risk.
    pub const HIGH_RISK: RiskScore = RiskScore(Decimal::from_parts(7, 0, 0, false, 1));

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for RiskScore {
    type Error = RiskScoreError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        if value < Decimal::ZERO || value > Decimal::ONE {
            return Err(RiskScoreError::OutOfRange(value));
        }

        Ok(RiskScore(value.normalize()))
    }
}

impl FromStr for RiskScore {
    type Err = RiskScoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();

        if value.is_empty() {
            return Err(RiskScoreError::InvalidFormat("Value is an empty string".to_string()));
        }

        let decimal = Decimal::from_str(value).map_err(|error| {
            RiskScoreError::InvalidFormat(format!("'{value}' is not a decimal: {error}"))
        })?;

        RiskScore::try_from(decimal)
    }
}

impl Display for RiskScore {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for RiskScore {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = <Decimal as Deserialize>::deserialize(deserializer)?;
        RiskScore::try_from(value).map_err(de::Error::custom)
    }
}
