use std::io::Write;
use std::sync::Arc;

use csv::Writer;

use crate::models::{GroupColumn, GroupKey, GroupStats, Transaction};

/// Point-in-time contents of a relation.
#[derive(Debug, Clone)]
pub enum QueryResult {
    Transactions(Vec<Arc<Transaction>>),
    Aggregates {
        group_by: Vec<GroupColumn>,
        groups: Vec<(GroupKey, GroupStats)>
    }
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        match self {
            QueryResult::Transactions(rows) => rows.len(),
            QueryResult::Aggregates { groups, .. } => groups.len()
        }
    }

    pub fn transactions(&self) -> &[Arc<Transaction>] {
        match self {
            QueryResult::Transactions(rows) => rows,
            QueryResult::Aggregates { .. } => &[]
        }
    }

    pub fn groups(&self) -> &[(GroupKey, GroupStats)] {
        match self {
            QueryResult::Transactions(_) => &[],
            QueryResult::Aggregates { groups, .. } => groups
        }
    }

    /// Writes the result as CSV with a header row. Missing group values are empty cells.
    pub fn write_csv<W: Write>(&self, output: W) -> csv::Result<()> {
        let mut writer = Writer::from_writer(output);

        match self {
            QueryResult::Transactions(rows) => {
                writer.write_record(Transaction::HEADER)?;

                for transaction in rows {
                    writer.write_record(transaction.to_record())?;
                }
            }
            QueryResult::Aggregates { group_by, groups } => {
                let header = group_by.iter().map(GroupColumn::name).chain(GroupStats::HEADER);
                writer.write_record(header)?;

                for (key, stats) in groups {
                    let values = key.0.iter().map(|value| value.clone().unwrap_or_default());
                    writer.write_record(values.chain(stats.to_record()))?;
                }
            }
        }

        writer.flush()?;

        Ok(())
    }
}
