use super::{ChangeLog, Frontier, RawStore};
use crate::models::{Transaction, TransactionRecord, ValidationError};
use anyhow::Result;
use chrono::{Duration, Utc};

fn create_transaction(transaction_id: &str) -> Result<Transaction> {
    Ok(Transaction::try_from(TransactionRecord {
        transaction_id: transaction_id.to_string(),
        transaction_timestamp: "2024-01-15 10:30:00".to_string(),
        customer_id: "CUST001".to_string(),
        account_id: "ACC001".to_string(),
        amount: "10.00".to_string(),
        transaction_type: "PURCHASE".to_string(),
        is_fraud: "false".to_string(),
        risk_score: "0.1".to_string(),
        status: "APPROVED".to_string(),
        ..TransactionRecord::default()
    })?)
}

#[test]
fn test_store_appends_at_consecutive_positions() -> Result<()> {
    let store = RawStore::new("raw_transactions");

    assert_eq!(store.len(), 0);
    assert_eq!(store.append(create_transaction("TXN001")?, Utc::now())?, 0);
    assert_eq!(store.append(create_transaction("TXN002")?, Utc::now())?, 1);

    let scanned = store.scan();

    assert_eq!(scanned.len(), 2);
    assert_eq!(scanned[1].transaction_id, "TXN002");
    assert_eq!(store.read_since(None).head, Frontier { generation: 0, position: 2 });

    Ok(())
}

#[test]
fn test_store_rejects_duplicate_transaction_ids() -> Result<()> {
    let store = RawStore::new("raw_transactions");
    store.append(create_transaction("TXN001")?, Utc::now())?;

    let result = store.append(create_transaction("TXN001")?, Utc::now());

    assert!(matches!(result, Err(ValidationError::DuplicateTransaction { .. })));
    assert_eq!(store.len(), 1);

    Ok(())
}

#[test]
fn test_store_reads_only_entries_beyond_the_frontier() -> Result<()> {
    let store = RawStore::new("raw_transactions");
    store.append(create_transaction("TXN001")?, Utc::now())?;
    store.append(create_transaction("TXN002")?, Utc::now())?;

    let first = store.read_since(None);

    assert!(first.reset);
    assert_eq!(first.entries.len(), 2);
    assert_eq!(first.head, Frontier { generation: 0, position: 2 });

    store.append(create_transaction("TXN003")?, Utc::now())?;

    let second = store.read_since(Some(first.head));

    assert!(!second.reset);
    assert_eq!(second.entries.len(), 1);
    assert_eq!(second.entries[0].transaction.transaction_id, "TXN003");

    let caught_up = store.read_since(Some(second.head));

    assert!(caught_up.entries.is_empty());

    Ok(())
}

#[test]
fn test_store_reports_the_oldest_unread_commit_time() -> Result<()> {
    let store = RawStore::new("raw_transactions");
    let earlier = Utc::now() - Duration::seconds(30);
    let later = Utc::now();

    store.append(create_transaction("TXN001")?, earlier)?;
    store.append(create_transaction("TXN002")?, later)?;

    assert_eq!(store.unread_since(None), Some(earlier));
    assert_eq!(store.unread_since(Some(Frontier { generation: 0, position: 1 })), Some(later));
    assert_eq!(store.unread_since(Some(store.read_since(None).head)), None);

    Ok(())
}

#[test]
fn test_store_scan_preserves_insertion_order() -> Result<()> {
    let store = RawStore::new("raw_transactions");

    for id in ["TXN003", "TXN001", "TXN002"] {
        store.append(create_transaction(id)?, Utc::now())?;
    }

    let ids: Vec<_> = store.scan().iter().map(|transaction| transaction.transaction_id.clone()).collect();

    assert_eq!(ids, vec!["TXN003", "TXN001", "TXN002"]);

    Ok(())
}

#[test]
fn test_store_accepts_each_id_once_under_concurrent_appends() -> Result<()> {
    let store = RawStore::new("raw_transactions");
    let transactions: Vec<Vec<Transaction>> = (0..4)
        .map(|_| (0..50).map(|index| create_transaction(&format!("TXN{index:03}"))).collect::<Result<Vec<_>>>())
        .collect::<Result<_>>()?;

    let accepted: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = transactions.into_iter()
            .map(|batch| {
                let store = &store;
                scope.spawn(move || batch.into_iter().filter_map(|transaction| store.append(transaction, Utc::now()).ok()).count())
            })
            .collect();

        handles.into_iter().map(|handle| handle.join().unwrap_or_default()).sum()
    });

    let mut ids: Vec<_> = store.scan().iter().map(|transaction| transaction.transaction_id.clone()).collect();
    ids.sort();
    ids.dedup();

    assert_eq!(accepted, 50);
    assert_eq!(store.len(), 50);
    assert_eq!(ids.len(), 50);

    Ok(())
}
