use rust_decimal::Decimal;
use serde::Deserialize;

use crate::models::errors::AggregateError;
use crate::models::Transaction;
use crate::types::RiskScore;

const AVERAGE_DECIMAL_PLACES: u32 = 4;

/// A transaction attribute an aggregate view can group by.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupColumn {
    Date,
    Hour,
    Category,
    TransactionType,
    Merchant,
    Country,
    City,
    Status,
    CustomerId,
    AccountId
}

impl GroupColumn {
    pub fn name(&self) -> &'static str {
        match self {
            GroupColumn::Date => "date",
            GroupColumn::Hour => "hour",
            GroupColumn::Category => "category",
            GroupColumn::TransactionType => "transaction_type",
            GroupColumn::Merchant => "merchant",
            GroupColumn::Country => "country",
            GroupColumn::City => "city",
            GroupColumn::Status => "status",
            GroupColumn::CustomerId => "customer_id",
            GroupColumn::AccountId => "account_id"
        }
    }

    /// Missing optional attributes group together under `None`.
    pub fn extract(&self, transaction: &Transaction) -> Option<String> {
        match self {
            GroupColumn::Date => Some(transaction.date().format("%Y-%m-%d").to_string()),
            GroupColumn::Hour => Some(transaction.transaction_timestamp.format("%Y-%m-%d %H:00").to_string()),
            GroupColumn::Category => transaction.merchant_category.clone(),
            GroupColumn::TransactionType => Some(transaction.transaction_type.clone()),
            GroupColumn::Merchant => transaction.merchant_name.clone(),
            GroupColumn::Country => transaction.country.clone(),
            GroupColumn::City => transaction.city.clone(),
            GroupColumn::Status => Some(transaction.status.to_string()),
            GroupColumn::CustomerId => Some(transaction.customer_id.clone()),
            GroupColumn::AccountId => Some(transaction.account_id.clone())
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct GroupKey(pub Vec<Option<String>>);

impl GroupKey {
    pub fn of(columns: &[GroupColumn], transaction: &Transaction) -> Self {
        GroupKey(columns.iter().map(|column| column.extract(transaction)).collect())
    }
}

/// Running statistics for one group of an aggregate view.
///
/// Only sums and counts are stored so that applying a delta is exact and
/// order-independent; averages are derived on read.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct GroupStats {
    pub transaction_count: u64,
    pub total_amount: Decimal,
    pub fraud_count: u64,
    pub risk_score_total: Decimal,
    pub max_risk_score: RiskScore,
    pub high_risk_count: u64
}

impl GroupStats {
    pub const HEADER: [&'static str; 8] = [
        "transaction_count",
        "total_amount",
        "avg_amount",
        "fraud_count",
        "fraud_rate",
        "avg_risk_score",
        "max_risk_score",
        "high_risk_count"
    ];

    /// Folds a single transaction into the group.
    ///
    /// # Errors
    /// Returns `AggregateError::Overflow` if a running sum no longer fits a decimal,
    /// in which case the group is left untouched.
    pub fn apply(&mut self, transaction: &Transaction, high_risk_threshold: RiskScore) -> Result<(), AggregateError> {
        let overflow = || AggregateError::Overflow { transaction_id: transaction.transaction_id.clone() };

        let total_amount = self.total_amount.checked_add(transaction.amount).ok_or_else(overflow)?;
        let risk_score_total = self.risk_score_total.checked_add(transaction.risk_score.value()).ok_or_else(overflow)?;
        let transaction_count = self.transaction_count.checked_add(1).ok_or_else(overflow)?;

        self.total_amount = total_amount;
        self.risk_score_total = risk_score_total;
        self.transaction_count = transaction_count;

        if transaction.is_fraud {
            self.fraud_count += 1;
        }

        if transaction.risk_score >= high_risk_threshold {
            self.high_risk_count += 1;
        }

        self.max_risk_score = self.max_risk_score.max(transaction.risk_score);

        Ok(())
    }

    pub fn avg_amount(&self) -> Decimal {
        self.average(self.total_amount)
    }

    pub fn avg_risk_score(&self) -> Decimal {
        self.average(self.risk_score_total)
    }

    pub fn fraud_rate(&self) -> Decimal {
        self.average(Decimal::from(self.fraud_count))
    }

    /// Renders the statistics in `HEADER` column order.
    pub fn to_record(&self) -> Vec<String> {
        vec![
            self.transaction_count.to_string(),
            self.total_amount.to_string(),
            self.avg_amount().to_string(),
            self.fraud_count.to_string(),
            self.fraud_rate().to_string(),
            self.avg_risk_score().to_string(),
            self.max_risk_score.to_string(),
            self.high_risk_count.to_string()
        ]
    }

    fn average(&self, total: Decimal) -> Decimal {
        if self.transaction_count == 0 {
            return Decimal::ZERO;
        }

        total.checked_div(Decimal::from(self.transaction_count))
            .map(|average| average.round_dp(AVERAGE_DECIMAL_PLACES).normalize())
            .unwrap_or(Decimal::ZERO)
    }
}
