use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::models::errors::ValidationError;
use crate::models::TransactionStatus;
use crate::types::{AccountId, CustomerId, RiskScore, TransactionId};

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
const OUTPUT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Represents a single unvalidated row as it arrives from an ingestion source.
///
/// Every field is kept as text so that a malformed value produces a
/// `ValidationError` naming the transaction instead of an opaque parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransactionRecord {
    pub transaction_id: String,
    pub transaction_timestamp: String,
    pub customer_id: String,
    pub account_id: String,
    pub amount: String,
    pub transaction_type: String,
    pub merchant_name: Option<String>,
    pub merchant_category: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub device_id: Option<String>,
    pub ip_address: Option<String>,
    pub is_fraud: String,
    pub risk_score: String,
    pub status: String
}

/// A validated transaction as held by the raw store and every derived relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub transaction_timestamp: NaiveDateTime,
    pub customer_id: CustomerId,
    pub account_id: AccountId,
    pub amount: Decimal,
    pub transaction_type: String,
    pub merchant_name: Option<String>,
    pub merchant_category: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub device_id: Option<String>,
    pub ip_address: Option<String>,
    pub is_fraud: bool,
    pub risk_score: RiskScore,
    pub status: TransactionStatus
}

impl Transaction {
    pub const HEADER: [&'static str; 15] = [
        "transaction_id",
        "transaction_timestamp",
        "customer_id",
        "account_id",
        "amount",
        "transaction_type",
        "merchant_name",
        "merchant_category",
        "city",
        "country",
        "device_id",
        "ip_address",
        "is_fraud",
        "risk_score",
        "status"
    ];

    pub fn date(&self) -> NaiveDate {
        self.transaction_timestamp.date()
    }

    /// Renders the transaction in `HEADER` column order.
    pub fn to_record(&self) -> Vec<String> {
        let optional = |value: &Option<String>| value.clone().unwrap_or_default();

        vec![
            self.transaction_id.clone(),
            self.transaction_timestamp.format(OUTPUT_TIMESTAMP_FORMAT).to_string(),
            self.customer_id.clone(),
            self.account_id.clone(),
            self.amount.to_string(),
            self.transaction_type.clone(),
            optional(&self.merchant_name),
            optional(&self.merchant_category),
            optional(&self.city),
            optional(&self.country),
            optional(&self.device_id),
            optional(&self.ip_address),
            self.is_fraud.to_string(),
            self.risk_score.to_string(),
            self.status.to_string()
        ]
    }
}

impl TryFrom<TransactionRecord> for Transaction {
    type Error = ValidationError;

    /// Validates the fixed-field invariants of a raw row.
    ///
    /// # Errors
    /// Returns `ValidationError` if:
    /// - An identifier, the timestamp, the amount or the type is blank.
    /// - The status is not one of APPROVED, DECLINED, PENDING.
    /// - The risk score is not a decimal within `[0, 1]`.
    /// - The amount is not a decimal or is negative.
    fn try_from(record: TransactionRecord) -> Result<Self, Self::Error> {
        if record.transaction_id.trim().is_empty() {
            return Err(ValidationError::missing_field(&record, "transaction_id"))
        }

        for (field, value) in [
            ("customer_id", &record.customer_id),
            ("account_id", &record.account_id),
            ("transaction_timestamp", &record.transaction_timestamp),
            ("amount", &record.amount),
            ("transaction_type", &record.transaction_type),
            ("risk_score", &record.risk_score),
            ("status", &record.status)
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::missing_field(&record, field))
            }
        }

        let status = TransactionStatus::from_str(&record.status)
            .map_err(|_| ValidationError::invalid_status(&record))?;

        let risk_score = RiskScore::from_str(&record.risk_score)
            .map_err(|error| ValidationError::invalid_risk_score(&record, error))?;

        let amount = Decimal::from_str(record.amount.trim())
            .map_err(|_| ValidationError::invalid_amount(&record))?;

        if amount < Decimal::ZERO {
            return Err(ValidationError::negative_amount(&record))
        }

        let transaction_timestamp = parse_timestamp(&record.transaction_timestamp)
            .ok_or_else(|| ValidationError::invalid_timestamp(&record))?;

        let is_fraud = parse_flag(&record.is_fraud)
            .ok_or_else(|| ValidationError::invalid_fraud_flag(&record))?;

        Ok(Transaction {
            transaction_id: record.transaction_id.trim().to_string(),
            transaction_timestamp,
            customer_id: record.customer_id.trim().to_string(),
            account_id: record.account_id.trim().to_string(),
            amount,
            transaction_type: record.transaction_type.trim().to_uppercase(),
            merchant_name: non_blank(record.merchant_name),
            merchant_category: non_blank(record.merchant_category),
            city: non_blank(record.city),
            country: non_blank(record.country),
            device_id: non_blank(record.device_id),
            ip_address: non_blank(record.ip_address),
            is_fraud,
            risk_score,
            status
        })
    }
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();

    for format in TIMESTAMP_FORMATS {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(value, format) {
            return Some(timestamp);
        }
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.naive_utc());
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "" | "false" | "f" | "0" | "no" | "n" => Some(false),
        _ => None
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}
