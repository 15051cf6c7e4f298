mod aggregate;
mod errors;
mod transaction;

use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer};

pub use aggregate::{GroupColumn, GroupKey, GroupStats};
pub use errors::{AggregateError, ValidationError};
pub use transaction::{Transaction, TransactionRecord};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum TransactionStatus {
    Approved,
    Declined,
    Pending
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Approved => "APPROVED",
            TransactionStatus::Declined => "DECLINED",
            TransactionStatus::Pending => "PENDING"
        }
    }
}

impl Display for TransactionStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "APPROVED" => Ok(TransactionStatus::Approved),
            "DECLINED" => Ok(TransactionStatus::Declined),
            "PENDING" => Ok(TransactionStatus::Pending),
            _ => Err(format!("'{value}' is not one of APPROVED, DECLINED, PENDING"))
        }
    }
}

impl<'de> Deserialize<'de> for TransactionStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        TransactionStatus::from_str(&value).map_err(de::Error::custom)
    }
}
