use crate::models::TransactionRecord;
use crate::types::{RiskScoreError, TransactionId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Transaction [{transaction_id}] is missing required field [{field}]")]
    MissingField {
        transaction_id: TransactionId,
        field: &'static str
    },
    #[error("Transaction [{transaction_id}] has an invalid status [{value}]")]
    InvalidStatus {
        transaction_id: TransactionId,
        value: String
    },
    #[error("Transaction [{transaction_id}] has an invalid risk score: {source}")]
    InvalidRiskScore {
        transaction_id: TransactionId,
        #[source]
        source: RiskScoreError
    },
    #[error("Transaction [{transaction_id}] has an invalid amount [{value}]")]
    InvalidAmount {
        transaction_id: TransactionId,
        value: String
    },
    #[error("Transaction [{transaction_id}] has a negative amount [{value}]")]
    NegativeAmount {
        transaction_id: TransactionId,
        value: String
    },
    #[error("Transaction [{transaction_id}] has an invalid timestamp [{value}]")]
    InvalidTimestamp {
        transaction_id: TransactionId,
        value: String
    },
    #[error("Transaction [{transaction_id}] has an invalid fraud flag [{value}]")]
    InvalidFraudFlag {
        transaction_id: TransactionId,
        value: String
    },
    #[error("Duplicate transaction [{transaction_id}]")]
    DuplicateTransaction {
        transaction_id: TransactionId
    },
    #[error("Malformed input row: {message}")]
    Malformed {
        message: String
    }
}

impl ValidationError {
    //NOTE: Every record-scoped error carries the offending transaction id, the factories keep call sites short.

    pub fn missing_field(record: &TransactionRecord, field: &'static str) -> Self {
        Self::MissingField { transaction_id: record.transaction_id.clone(), field }
    }

    pub fn invalid_status(record: &TransactionRecord) -> Self {
        Self::InvalidStatus {
            transaction_id: record.transaction_id.clone(),
            value: record.status.clone()
        }
    }

    pub fn invalid_risk_score(record: &TransactionRecord, source: RiskScoreError) -> Self {
        Self::InvalidRiskScore { transaction_id: record.transaction_id.clone(), source }
    }

    pub fn invalid_amount(record: &TransactionRecord) -> Self {
        Self::InvalidAmount {
            transaction_id: record.transaction_id.clone(),
            value: record.amount.clone()
        }
    }

    pub fn negative_amount(record: &TransactionRecord) -> Self {
        Self::NegativeAmount {
            transaction_id: record.transaction_id.clone(),
            value: record.amount.clone()
        }
    }

    pub fn invalid_timestamp(record: &TransactionRecord) -> Self {
        Self::InvalidTimestamp {
            transaction_id: record.transaction_id.clone(),
            value: record.transaction_timestamp.clone()
        }
    }

    pub fn invalid_fraud_flag(record: &TransactionRecord) -> Self {
        Self::InvalidFraudFlag {
            transaction_id: record.transaction_id.clone(),
            value: record.is_fraud.clone()
        }
    }

    pub fn duplicate_transaction(transaction_id: &str) -> Self {
        Self::DuplicateTransaction { transaction_id: transaction_id.to_string() }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed { message: message.into() }
    }
}

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("Numeric overflow while aggregating transaction [{transaction_id}]")]
    Overflow {
        transaction_id: TransactionId
    }
}
