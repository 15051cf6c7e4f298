use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use parking_lot::RwLock;

use crate::models::{Transaction, ValidationError};
use crate::storage::{read_entries, ChangeLog, Frontier, LogEntry, LogRead};
use crate::types::{Generation, Position, TransactionId};

/// The raw log never gets rebuilt, so it lives in a single generation.
const RAW_GENERATION: Generation = 0;

/// Append-only ingestion table.
pub struct RawStore {
    name: String,
    /// Claimed ids. A concurrent duplicate loses the claim before it can touch the log.
    index: DashSet<TransactionId>,
    log: RwLock<Vec<LogEntry>>
}

impl RawStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: DashSet::new(),
            log: RwLock::new(Vec::new())
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a validated transaction.
    ///
    /// # Errors
    /// Returns `ValidationError::DuplicateTransaction` if the id is already stored.
    pub fn append(&self, transaction: Transaction, committed_at: DateTime<Utc>) -> Result<Position, ValidationError> {
        if !self.index.insert(transaction.transaction_id.clone()) {
            return Err(ValidationError::duplicate_transaction(&transaction.transaction_id));
        }

        let mut log = self.log.write();
        let position = log.len() as Position;
        log.push(LogEntry { transaction: Arc::new(transaction), committed_at });

        Ok(position)
    }

    pub fn len(&self) -> usize {
        self.log.read().len()
    }

    pub fn scan(&self) -> Vec<Arc<Transaction>> {
        self.log.read().iter().map(|entry| entry.transaction.clone()).collect()
    }
}

impl ChangeLog for RawStore {
    fn read_since(&self, frontier: Option<Frontier>) -> LogRead {
        read_entries(RAW_GENERATION, &self.log.read(), frontier)
    }

    fn unread_since(&self, frontier: Option<Frontier>) -> Option<DateTime<Utc>> {
        let log = self.log.read();
        let start = match frontier {
            Some(frontier) if frontier.generation == RAW_GENERATION => frontier.position as usize,
            _ => 0
        };

        log.get(start).map(|entry| entry.committed_at)
    }
}
