mod raw_store;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::Transaction;
use crate::types::{Generation, Position};

pub use raw_store::RawStore;

/// One row of a transaction relation together with the time its underlying raw
/// write was committed. Derived relations carry the raw commit time forward so
/// staleness is always measured against the original write.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub transaction: Arc<Transaction>,
    pub committed_at: DateTime<Utc>
}

/// How far a consumer has read into a change log.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Frontier {
    pub generation: Generation,
    pub position: Position
}

/// Result of reading a change log from a frontier.
#[derive(Debug, Clone)]
pub struct LogRead {
    /// Frontier to store once the entries have been applied.
    pub head: Frontier,
    pub entries: Vec<LogEntry>,
    /// The consumer's frontier belonged to another generation, `entries` holds the full log.
    pub reset: bool
}

/// An append-only relation of transactions that derived views consume incrementally.
pub trait ChangeLog: Send + Sync {
    fn read_since(&self, frontier: Option<Frontier>) -> LogRead;

    /// Commit time of the oldest entry a consumer at `frontier` has not seen yet.
    fn unread_since(&self, frontier: Option<Frontier>) -> Option<DateTime<Utc>>;
}

/// Shared implementation of `ChangeLog::read_since` over an in-memory log.
pub(crate) fn read_entries(generation: Generation, entries: &[LogEntry], frontier: Option<Frontier>) -> LogRead {
    let head = Frontier { generation, position: entries.len() as Position };

    match frontier {
        Some(frontier) if frontier.generation == generation => {
            let start = (frontier.position as usize).min(entries.len());
            LogRead { head, entries: entries[start..].to_vec(), reset: false }
        }
        _ => LogRead { head, entries: entries.to_vec(), reset: true }
    }
}
