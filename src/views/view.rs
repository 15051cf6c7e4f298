use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use crate::models::{GroupKey, GroupStats};
use crate::storage::{read_entries, ChangeLog, Frontier, LogEntry, LogRead};
use crate::types::Generation;
use crate::views::definition::{RefreshMode, ViewDefinition, ViewOptions};
use crate::views::errors::RefreshError;
use crate::views::status::{RefreshAction, ViewHealth};

/// Generations are unique across every view so a consumer can never mistake a
/// rebuilt (or replaced) upstream log for the one it was reading.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> Generation {
    NEXT_GENERATION.fetch_add(1, Ordering::SeqCst)
}

/// Materialized result of a view.
#[derive(Debug, Clone)]
pub enum Contents {
    Rows(Vec<LogEntry>),
    Groups(BTreeMap<GroupKey, GroupStats>)
}

impl Contents {
    fn empty_for(definition: &ViewDefinition) -> Self {
        match definition {
            ViewDefinition::Filter { .. } => Contents::Rows(Vec::new()),
            ViewDefinition::Aggregate { .. } => Contents::Groups(BTreeMap::new())
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Contents::Rows(rows) => rows.len(),
            Contents::Groups(groups) => groups.len()
        }
    }
}

/// An immutable, consistent state of a view. Readers hold an `Arc` to it while a
/// refresh prepares the next one on the side.
#[derive(Debug)]
pub struct Snapshot {
    pub generation: Generation,
    pub generation_started_at: DateTime<Utc>,
    /// One frontier per source, in definition order.
    pub frontiers: Vec<Frontier>,
    pub contents: Contents
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct RefreshSummary {
    pub action: RefreshAction,
    pub rows_changed: u64
}

pub struct View {
    name: String,
    definition: ViewDefinition,
    options: ViewOptions,
    snapshot: RwLock<Arc<Snapshot>>,
    pub(crate) health: Mutex<ViewHealth>
}

impl View {
    /// Builds a view and materializes it from scratch.
    ///
    /// # Errors
    /// Returns `RefreshError` if the initial materialization fails; nothing is created.
    pub(crate) fn create(
        name: &str,
        definition: ViewDefinition,
        options: ViewOptions,
        sources: &[Arc<dyn ChangeLog>],
        now: DateTime<Utc>
    ) -> Result<(Self, RefreshSummary), RefreshError> {
        let (snapshot, rows_changed) = Self::build_full(name, &definition, sources, now)?;

        let view = Self {
            name: name.to_string(),
            definition,
            options,
            snapshot: RwLock::new(Arc::new(snapshot)),
            health: Mutex::new(ViewHealth::new())
        };

        Ok((view, RefreshSummary { action: RefreshAction::Full, rows_changed }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &ViewDefinition {
        &self.definition
    }

    pub fn options(&self) -> &ViewOptions {
        &self.options
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    /// Brings the view up to date with its sources.
    ///
    /// Returns a `NoData` summary when no source moved. On error the published
    /// snapshot and its frontiers are left untouched.
    pub(crate) fn refresh(&self, sources: &[Arc<dyn ChangeLog>], now: DateTime<Utc>) -> Result<RefreshSummary, RefreshError> {
        let current = self.snapshot();

        let reads: Vec<LogRead> = sources.iter().zip(&current.frontiers)
            .map(|(source, frontier)| source.read_since(Some(*frontier)))
            .collect();

        let changed = reads.len() != sources.len()
            || reads.iter().any(|read| read.reset || !read.entries.is_empty());

        if !changed {
            return Ok(RefreshSummary { action: RefreshAction::NoData, rows_changed: 0 });
        }

        let must_rebuild = self.options.refresh_mode == RefreshMode::Full
            || reads.len() != sources.len()
            || reads.iter().any(|read| read.reset);

        let (snapshot, summary) = if must_rebuild {
            let (snapshot, rows_changed) = Self::build_full(&self.name, &self.definition, sources, now)?;
            (snapshot, RefreshSummary { action: RefreshAction::Full, rows_changed })
        } else {
            let mut contents = current.contents.clone();
            let mut rows_changed = 0;

            for read in &reads {
                rows_changed += Self::fold(&self.name, &self.definition, &mut contents, &read.entries)?;
            }

            let snapshot = Snapshot {
                generation: current.generation,
                generation_started_at: current.generation_started_at,
                frontiers: reads.iter().map(|read| read.head).collect(),
                contents
            };

            (snapshot, RefreshSummary { action: RefreshAction::Incremental, rows_changed })
        };

        *self.snapshot.write() = Arc::new(snapshot);

        Ok(summary)
    }

    fn build_full(
        name: &str,
        definition: &ViewDefinition,
        sources: &[Arc<dyn ChangeLog>],
        now: DateTime<Utc>
    ) -> Result<(Snapshot, u64), RefreshError> {
        let mut contents = Contents::empty_for(definition);
        let mut frontiers = Vec::with_capacity(sources.len());
        let mut rows_changed = 0;

        for source in sources {
            let read = source.read_since(None);
            rows_changed += Self::fold(name, definition, &mut contents, &read.entries)?;
            frontiers.push(read.head);
        }

        let snapshot = Snapshot {
            generation: next_generation(),
            generation_started_at: now,
            frontiers,
            contents
        };

        Ok((snapshot, rows_changed))
    }

    fn fold(name: &str, definition: &ViewDefinition, contents: &mut Contents, entries: &[LogEntry]) -> Result<u64, RefreshError> {
        let mut applied = 0;

        match (definition, contents) {
            (ViewDefinition::Filter { predicate, .. }, Contents::Rows(rows)) => {
                for entry in entries {
                    if predicate.matches(&entry.transaction) {
                        rows.push(entry.clone());
                        applied += 1;
                    }
                }
            }
            (ViewDefinition::Aggregate { group_by, high_risk_threshold, predicate, .. }, Contents::Groups(groups)) => {
                for entry in entries {
                    if predicate.as_ref().is_some_and(|predicate| !predicate.matches(&entry.transaction)) {
                        continue;
                    }

                    groups.entry(GroupKey::of(group_by, &entry.transaction))
                        .or_default()
                        .apply(&entry.transaction, *high_risk_threshold)
                        .map_err(|source| RefreshError::Aggregate { view: name.to_string(), source })?;

                    applied += 1;
                }
            }
            _ => return Err(RefreshError::ShapeMismatch { view: name.to_string() })
        }

        Ok(applied)
    }
}

impl ChangeLog for View {
    fn read_since(&self, frontier: Option<Frontier>) -> LogRead {
        let snapshot = self.snapshot();

        match &snapshot.contents {
            Contents::Rows(rows) => read_entries(snapshot.generation, rows, frontier),
            Contents::Groups(_) => read_entries(snapshot.generation, &[], frontier)
        }
    }

    fn unread_since(&self, frontier: Option<Frontier>) -> Option<DateTime<Utc>> {
        let snapshot = self.snapshot();

        match (frontier, &snapshot.contents) {
            (Some(frontier), Contents::Rows(rows)) if frontier.generation == snapshot.generation => {
                rows.get(frontier.position as usize).map(|entry| entry.committed_at)
            }
            (Some(frontier), Contents::Groups(_)) if frontier.generation == snapshot.generation => None,
            _ => Some(snapshot.generation_started_at)
        }
    }
}
