use super::{Pipeline, PipelineError};

use anyhow::{anyhow, Result};
use chrono::{TimeDelta, Utc};
use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::time::sleep;

use crate::config::PipelineConfig;
use crate::models::{TransactionRecord, ValidationError};
use crate::views::{DependencyError, QueryResult, RefreshTrigger, SchedulingState, ViewError};

const HEADER: &str = "transaction_id,transaction_timestamp,customer_id,account_id,amount,transaction_type,merchant_name,merchant_category,city,country,device_id,ip_address,is_fraud,risk_score,status";

fn create_temporary_csv(rows: &[&str]) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;

    writeln!(file, "{HEADER}")?;

    for row in rows {
        writeln!(file, "{row}")?;
    }

    Ok(file)
}

fn create_record(transaction_id: &str, amount: &str, is_fraud: &str, status: &str) -> TransactionRecord {
    TransactionRecord {
        transaction_id: transaction_id.to_string(),
        transaction_timestamp: "2024-01-15 10:30:00".to_string(),
        customer_id: "CUST001".to_string(),
        account_id: "ACC001".to_string(),
        amount: amount.to_string(),
        transaction_type: "PURCHASE".to_string(),
        merchant_category: Some("Retail".to_string()),
        country: Some("USA".to_string()),
        is_fraud: is_fraud.to_string(),
        risk_score: "0.2".to_string(),
        status: status.to_string(),
        ..TransactionRecord::default()
    }
}

fn builtin_pipeline() -> Result<Pipeline> {
    Ok(Pipeline::new(&PipelineConfig::builtin()?)?)
}

#[tokio::test]
async fn test_pipeline_ingests_csv_and_refreshes_every_layer() -> Result<()> {
    let file = create_temporary_csv(&[
        "TXN001,2024-01-15 10:30:00,CUST001,ACC001,150.00,PURCHASE,Amazon,Retail,Seattle,USA,DEV001,192.168.1.1,false,0.15,APPROVED",
        "TXN002,2024-01-15 11:45:00,CUST002,ACC002,2500.00,TRANSFER,,,Miami,USA,DEV002,10.0.0.5,true,0.92,DECLINED",
        "TXN003,2024-01-15 14:20:00,CUST003,ACC003,75.50,PURCHASE,Starbucks,Food,Seattle,USA,DEV003,192.168.1.7,false,0.05,APPROVED"
    ])?;

    let pipeline = builtin_pipeline()?;
    let report = pipeline.ingest_csv(file.path()).await;

    assert_eq!(report.accepted, 3);
    assert!(report.rejected.is_empty());

    pipeline.refresh_all();

    let catalog = pipeline.catalog();

    assert_eq!(catalog.query("raw_transactions")?.row_count(), 3);

    let clean = catalog.query("clean_transactions")?;
    let ids: Vec<&str> = clean.transactions().iter().map(|t| t.transaction_id.as_str()).collect();

    assert_eq!(ids, vec!["TXN001", "TXN003"]);

    // One group per (date, category, country) of the clean rows.
    assert_eq!(catalog.query("daily_sales_summary")?.row_count(), 2);

    let QueryResult::Aggregates { groups, .. } = catalog.query("fraud_risk_summary")? else {
        return Err(anyhow!("fraud_risk_summary should be an aggregate"));
    };

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].1.transaction_count, 3);
    assert_eq!(groups[0].1.fraud_count, 1);
    assert_eq!(groups[0].1.high_risk_count, 1);

    pipeline.shutdown().await;

    Ok(())
}

#[tokio::test]
async fn test_pipeline_counts_malformed_rows_as_rejected() -> Result<()> {
    let file = create_temporary_csv(&[
        "TXN001,2024-01-15 10:30:00,CUST001,ACC001,150.00,PURCHASE,Amazon,Retail,Seattle,USA,DEV001,192.168.1.1,false,0.15,APPROVED",
        "TXN002,2024-01-15 11:45:00,CUST002,ACC002,10.00,PURCHASE,,,,,,,false,1.5,APPROVED",
        "TXN003,not a date,CUST003,ACC003,75.50,PURCHASE,,,,,,,false,0.05,APPROVED",
        "TXN004,2024-01-15 14:20:00,CUST003,ACC003,-5.00,PURCHASE,,,,,,,false,0.05,APPROVED",
        "TXN005,2024-01-15 14:20:00,CUST003,ACC003,5.00,PURCHASE,,,,,,,false,0.05,SETTLED",
        "TXN001,2024-01-15 10:30:00,CUST001,ACC001,150.00,PURCHASE,Amazon,Retail,Seattle,USA,DEV001,192.168.1.1,false,0.15,APPROVED"
    ])?;

    let pipeline = builtin_pipeline()?;
    let report = pipeline.ingest_csv(file.path()).await;

    assert_eq!(report.accepted, 1);
    assert_eq!(report.rejected.len(), 5);
    assert!(matches!(report.rejected[0], ValidationError::InvalidRiskScore { .. }));
    assert!(matches!(report.rejected[1], ValidationError::InvalidTimestamp { .. }));
    assert!(matches!(report.rejected[2], ValidationError::NegativeAmount { .. }));
    assert!(matches!(report.rejected[3], ValidationError::InvalidStatus { .. }));
    assert!(matches!(report.rejected[4], ValidationError::DuplicateTransaction { .. }));

    Ok(())
}

#[tokio::test]
async fn test_pipeline_returns_empty_report_for_missing_file() -> Result<()> {
    let pipeline = builtin_pipeline()?;
    let report = pipeline.ingest_csv("this_file_does_not_exist.csv").await;

    assert_eq!(report.accepted, 0);
    assert!(report.rejected.is_empty());
    assert_eq!(pipeline.catalog().raw().len(), 0);

    Ok(())
}

#[tokio::test]
async fn test_pipeline_batches_respect_configured_size() -> Result<()> {
    let rows: Vec<String> = (0..25)
        .map(|index| format!("TXN{index:03},2024-01-15 10:30:00,CUST001,ACC001,1.00,PURCHASE,,,,,,,false,0.1,APPROVED"))
        .collect();
    let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
    let file = create_temporary_csv(&rows)?;

    let mut config = PipelineConfig::builtin()?;
    config.ingest.batch_size = 4;
    config.ingest.backpressure = 2;

    let pipeline = Pipeline::new(&config)?;
    let report = pipeline.ingest_csv(file.path()).await;

    assert_eq!(report.accepted, 25);
    assert_eq!(pipeline.catalog().raw().len(), 25);

    Ok(())
}

#[tokio::test]
async fn test_pipeline_refresh_actor_follows_zero_lag_views() -> Result<()> {
    let config = PipelineConfig::from_toml(r#"
        [[views]]
        name = "clean_transactions"
        target_lag = "0s"

        [views.definition]
        kind = "filter"
        sources = ["raw_transactions"]
        predicate = { all = [{ status = "APPROVED" }, { fraud_flag = false }] }
    "#)?;

    let mut pipeline = Pipeline::new(&config)?;
    pipeline.start(Duration::from_secs(3_600));

    let report = pipeline.ingest(vec![
        create_record("TXN001", "10.00", "false", "APPROVED"),
        create_record("TXN002", "20.00", "true", "DECLINED")
    ]);

    assert_eq!(report.accepted, 2);

    sleep(Duration::from_millis(200)).await;

    let catalog = pipeline.catalog().clone();
    pipeline.shutdown().await;

    assert_eq!(catalog.query("clean_transactions")?.row_count(), 1);
    assert!(catalog.refresh_history("clean_transactions")?.iter().any(|record| record.trigger == RefreshTrigger::Scheduled));

    Ok(())
}

#[test]
fn test_pipeline_leaves_suspended_views_off_the_schedule() -> Result<()> {
    let config = PipelineConfig::from_toml(r#"
        [[views]]
        name = "clean_transactions"
        target_lag = "0s"
        suspended = true

        [views.definition]
        kind = "filter"
        sources = ["raw_transactions"]
        predicate = { status = "APPROVED" }
    "#)?;

    let pipeline = Pipeline::new(&config)?;
    let catalog = pipeline.catalog();

    assert_eq!(catalog.list_views(Utc::now())[0].scheduling, SchedulingState::Suspended);

    pipeline.ingest(vec![create_record("TXN001", "10.00", "false", "APPROVED")]);

    assert!(catalog.refresh_due(Utc::now() + TimeDelta::hours(1)).is_empty());
    assert_eq!(catalog.query("clean_transactions")?.row_count(), 0);

    assert_eq!(pipeline.refresh_all().len(), 1);
    assert_eq!(catalog.query("clean_transactions")?.row_count(), 1);

    Ok(())
}

#[test]
fn test_pipeline_defines_views_in_dependency_order() -> Result<()> {
    let config = PipelineConfig::from_toml(r#"
        [[views]]
        name = "summary"

        [views.definition]
        kind = "aggregate"
        sources = ["clean"]
        group_by = ["country"]

        [[views]]
        name = "clean"

        [views.definition]
        kind = "filter"
        sources = ["raw_transactions"]
        predicate = { status = "APPROVED" }
    "#)?;

    let pipeline = Pipeline::new(&config)?;

    assert_eq!(pipeline.catalog().topological_order(), vec!["clean", "summary"]);

    Ok(())
}

#[test]
fn test_pipeline_rejects_views_over_unknown_relations() -> Result<()> {
    let config = PipelineConfig::from_toml(r#"
        [[views]]
        name = "clean"

        [views.definition]
        kind = "filter"
        sources = ["missing"]
        predicate = { status = "APPROVED" }
    "#)?;

    let result = Pipeline::new(&config);

    assert!(matches!(
        result,
        Err(PipelineError::Definition { source: ViewError::Dependency(DependencyError::MissingRelation { .. }), .. })
    ));

    Ok(())
}
