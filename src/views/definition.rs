use rust_decimal::Decimal;
use serde::Deserialize;

use crate::models::{GroupColumn, Transaction, TransactionStatus};
use crate::types::{RiskScore, TargetLag};

/// Row-level condition of a filter view (or of an aggregate's input).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Status(TransactionStatus),
    FraudFlag(bool),
    MinRiskScore(RiskScore),
    MaxRiskScore(RiskScore),
    MinAmount(Decimal),
    Country(String),
    Category(String),
    TransactionType(String),
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Not(Box<Predicate>)
}

impl Predicate {
    /// `status = APPROVED AND is_fraud = false`
    pub fn clean() -> Self {
        Predicate::All(vec![
            Predicate::Status(TransactionStatus::Approved),
            Predicate::FraudFlag(false)
        ])
    }

    pub fn matches(&self, transaction: &Transaction) -> bool {
        let equals = |expected: &str, actual: Option<&str>| {
            actual.is_some_and(|actual| actual.eq_ignore_ascii_case(expected))
        };

        match self {
            Predicate::Status(status) => transaction.status == *status,
            Predicate::FraudFlag(flag) => transaction.is_fraud == *flag,
            Predicate::MinRiskScore(score) => transaction.risk_score >= *score,
            Predicate::MaxRiskScore(score) => transaction.risk_score <= *score,
            Predicate::MinAmount(amount) => transaction.amount >= *amount,
            Predicate::Country(country) => equals(country, transaction.country.as_deref()),
            Predicate::Category(category) => equals(category, transaction.merchant_category.as_deref()),
            Predicate::TransactionType(kind) => equals(kind, Some(&transaction.transaction_type)),
            Predicate::All(predicates) => predicates.iter().all(|predicate| predicate.matches(transaction)),
            Predicate::Any(predicates) => predicates.iter().any(|predicate| predicate.matches(transaction)),
            Predicate::Not(predicate) => !predicate.matches(transaction)
        }
    }
}

fn default_high_risk_threshold() -> RiskScore {
    RiskScore::HIGH_RISK
}

/// Declared transformation of a derived relation. Multiple sources are combined
/// with union-all semantics.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewDefinition {
    Filter {
        sources: Vec<String>,
        predicate: Predicate
    },
    Aggregate {
        sources: Vec<String>,
        group_by: Vec<GroupColumn>,
        #[serde(default = "default_high_risk_threshold")]
        high_risk_threshold: RiskScore,
        #[serde(default)]
        predicate: Option<Predicate>
    }
}

impl ViewDefinition {
    pub fn filter(source: &str, predicate: Predicate) -> Self {
        ViewDefinition::Filter { sources: vec![source.to_string()], predicate }
    }

    pub fn aggregate(source: &str, group_by: Vec<GroupColumn>) -> Self {
        ViewDefinition::Aggregate {
            sources: vec![source.to_string()],
            group_by,
            high_risk_threshold: RiskScore::HIGH_RISK,
            predicate: None
        }
    }

    pub fn sources(&self) -> &[String] {
        match self {
            ViewDefinition::Filter { sources, .. } => sources,
            ViewDefinition::Aggregate { sources, .. } => sources
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ViewDefinition::Filter { .. } => "filter",
            ViewDefinition::Aggregate { .. } => "aggregate"
        }
    }

    /// Only filter views produce transaction rows other views can consume.
    pub fn produces_transactions(&self) -> bool {
        matches!(self, ViewDefinition::Filter { .. })
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    /// Incremental whenever the change logs allow it, full otherwise.
    #[default]
    Auto,
    Incremental,
    /// Rebuild from scratch whenever a source changed.
    Full
}

impl RefreshMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshMode::Auto => "auto",
            RefreshMode::Incremental => "incremental",
            RefreshMode::Full => "full"
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Deserialize)]
pub struct ViewOptions {
    #[serde(default)]
    pub target_lag: TargetLag,
    #[serde(default)]
    pub refresh_mode: RefreshMode
}

impl ViewOptions {
    pub fn with_target_lag(mut self, target_lag: TargetLag) -> Self {
        self.target_lag = target_lag;
        self
    }

    pub fn with_refresh_mode(mut self, refresh_mode: RefreshMode) -> Self {
        self.refresh_mode = refresh_mode;
        self
    }
}
