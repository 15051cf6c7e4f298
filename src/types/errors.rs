use std::num::ParseIntError;

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskScoreError {
    #[error("Risk score error: {0}")]
    InvalidFormat(String),
    #[error("Risk score error: {0} is outside of [0, 1]")]
    OutOfRange(Decimal)
}

#[derive(Debug, Error)]
pub enum TargetLagError {
    #[error("Target lag error: {0}")]
    InvalidFormat(String),
    #[error("Target lag error: {0}")]
    ParseInt(#[from] ParseIntError),
    #[error("Target lag error: Overflow")]
    Overflow
}
