mod errors;
mod risk_score;
mod target_lag;
#[cfg(test)]
mod tests;

pub use errors::{RiskScoreError, TargetLagError};
pub use risk_score::RiskScore;
pub use target_lag::TargetLag;

pub type TransactionId = String;
pub type CustomerId = String;
pub type AccountId = String;

/// Identifies one incarnation of a relation's change log. A full rebuild of a
/// derived relation starts a new generation.
pub type Generation = u64;
/// Position within a change log, counted in entries.
pub type Position = u64;
