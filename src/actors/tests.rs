use super::RefreshActor;
use crate::models::{Transaction, TransactionRecord};
use crate::storage::RawStore;
use crate::types::TargetLag;
use crate::views::{Catalog, Predicate, RefreshPolicy, RefreshTrigger, ViewDefinition, ViewOptions};
use anyhow::Result;
use chrono::Utc;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn create_transaction(transaction_id: &str, status: &str) -> Result<Transaction> {
    Ok(Transaction::try_from(TransactionRecord {
        transaction_id: transaction_id.to_string(),
        transaction_timestamp: "2024-01-15 10:30:00".to_string(),
        customer_id: "CUST001".to_string(),
        account_id: "ACC001".to_string(),
        amount: "10.00".to_string(),
        transaction_type: "PURCHASE".to_string(),
        is_fraud: "false".to_string(),
        risk_score: "0.1".to_string(),
        status: status.to_string(),
        ..TransactionRecord::default()
    })?)
}

fn create_catalog(target_lag: &str) -> Result<Arc<Catalog>> {
    let catalog = Arc::new(Catalog::new(Arc::new(RawStore::new("raw_transactions")), RefreshPolicy::default()));
    let options = ViewOptions::default().with_target_lag(TargetLag::from_str(target_lag)?);

    catalog.define_view("clean_transactions", ViewDefinition::filter("raw_transactions", Predicate::clean()), options, Utc::now())?;

    Ok(catalog)
}

#[tokio::test]
async fn test_actor_refreshes_zero_lag_views_after_a_notification() -> Result<()> {
    let catalog = create_catalog("0s")?;
    let actor = RefreshActor::spawn(catalog.clone(), Duration::from_secs(3_600));

    catalog.raw().append(create_transaction("TXN001", "APPROVED")?, Utc::now())?;
    catalog.raw().append(create_transaction("TXN002", "DECLINED")?, Utc::now())?;

    assert!(actor.notify());

    sleep(Duration::from_millis(200)).await;
    actor.despawn().await?;

    assert_eq!(catalog.query("clean_transactions")?.row_count(), 1);

    let history = catalog.refresh_history("clean_transactions")?;

    assert!(history.iter().any(|record| record.trigger == RefreshTrigger::Scheduled));

    Ok(())
}

#[tokio::test]
async fn test_actor_leaves_views_alone_while_within_their_lag() -> Result<()> {
    let catalog = create_catalog("1h")?;
    let actor = RefreshActor::spawn(catalog.clone(), Duration::from_millis(10));

    catalog.raw().append(create_transaction("TXN001", "APPROVED")?, Utc::now())?;
    actor.notify();

    sleep(Duration::from_millis(100)).await;
    actor.despawn().await?;

    assert_eq!(catalog.query("clean_transactions")?.row_count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_actor_stops_when_despawned() -> Result<()> {
    let catalog = create_catalog("1m")?;
    let actor = RefreshActor::spawn(catalog, Duration::from_millis(10));

    actor.despawn().await?;

    Ok(())
}
