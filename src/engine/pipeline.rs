use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use csv::{ReaderBuilder, Trim};
use tokio::sync::mpsc;
use tokio::task::{spawn_blocking, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::actors::RefreshActor;
use crate::config::{IngestConfig, PipelineConfig, ViewConfig};
use crate::engine::errors::PipelineError;
use crate::models::{Transaction, TransactionRecord, ValidationError};
use crate::storage::RawStore;
use crate::views::{Catalog, RefreshRecord};

/// Outcome of an ingestion call.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub accepted: usize,
    pub rejected: Vec<ValidationError>
}

impl IngestReport {
    pub fn merge(&mut self, other: IngestReport) {
        self.accepted += other.accepted;
        self.rejected.extend(other.rejected);
    }
}

/// A running fraud pipeline: the raw store, its derived views and the actor
/// that keeps them fresh.
pub struct Pipeline {
    catalog: Arc<Catalog>,
    ingest: IngestConfig,
    refresher: Option<RefreshActor>
}

impl Pipeline {
    /// Creates the raw relation and defines every configured view.
    ///
    /// Views may be listed in any order; each one is defined once its sources exist.
    pub fn new(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let raw = Arc::new(RawStore::new(config.raw_relation.clone()));
        let catalog = Arc::new(Catalog::new(raw, config.refresh.policy()));
        let mut pending: Vec<&ViewConfig> = config.views.iter().collect();

        while !pending.is_empty() {
            let known = catalog.view_names();
            let (ready, waiting): (Vec<&ViewConfig>, Vec<&ViewConfig>) = pending.into_iter().partition(|view| {
                view.definition.sources().iter()
                    .all(|source| *source == config.raw_relation || known.contains(source))
            });

            //NOTE: Nothing ready means a missing relation or a cycle, defining the waiting views reports it.
            let (batch, rest) = if ready.is_empty() { (waiting, Vec::new()) } else { (ready, waiting) };
            pending = rest;

            for view in batch {
                catalog.define_view(&view.name, view.definition.clone(), view.options(), Utc::now())
                    .map_err(|source| PipelineError::Definition { name: view.name.clone(), source })?;

                if view.suspended {
                    catalog.suspend(&view.name)
                        .map_err(|source| PipelineError::Definition { name: view.name.clone(), source: source.into() })?;
                }
            }
        }

        Ok(Self {
            catalog,
            ingest: config.ingest.clone(),
            refresher: None
        })
    }

    /// Starts the background refresh actor. Must be called from within a tokio runtime.
    pub fn start(&mut self, tick: Duration) {
        if self.refresher.is_none() {
            self.refresher = Some(RefreshActor::spawn(self.catalog.clone(), tick));
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Validates and appends a batch of records.
    ///
    /// Invalid records are reported individually; the rest of the batch is still appended.
    pub fn ingest(&self, records: Vec<TransactionRecord>) -> IngestReport {
        let mut report = IngestReport::default();

        for record in records {
            let appended = Transaction::try_from(record)
                .and_then(|transaction| self.catalog.raw().append(transaction, Utc::now()));

            match appended {
                Ok(_) => report.accepted += 1,
                Err(error) => {
                    warn!("Rejected record: {error}");
                    report.rejected.push(error);
                }
            }
        }

        if report.accepted > 0 {
            if let Some(refresher) = &self.refresher {
                if !refresher.notify() {
                    error!("Refresh actor could not accept a change notification");
                }
            }
        }

        report
    }

    /// Streams a CSV file into the raw store in batches.
    ///
    /// A file that cannot be opened is logged and yields an empty report.
    pub async fn ingest_csv(&self, path: impl AsRef<Path>) -> IngestReport {
        let (sender, receiver) = mpsc::channel(self.ingest.backpressure.max(1));
        let csv_handle = spawn_csv_reader(path.as_ref().to_path_buf(), sender);
        let report = self.process_records(receiver).await;

        if let Err(error) = csv_handle.await {
            error!("CSV ingestion failed: {error}");
        }

        info!(
            "Ingested {} records, rejected {}, raw store holds {}",
            report.accepted,
            report.rejected.len(),
            self.catalog.raw().len()
        );

        report
    }

    async fn process_records(&self, mut receiver: mpsc::Receiver<Result<TransactionRecord, ValidationError>>) -> IngestReport {
        let batch_size = self.ingest.batch_size.max(1);
        let mut report = IngestReport::default();
        let mut batch = Vec::with_capacity(batch_size);

        while let Some(result) = receiver.recv().await {
            match result {
                Ok(record) => batch.push(record),
                Err(error) => report.rejected.push(error)
            }

            if batch.len() >= batch_size {
                report.merge(self.ingest(std::mem::take(&mut batch)));
            }
        }

        if !batch.is_empty() {
            report.merge(self.ingest(batch));
        }

        report
    }

    /// Manually refreshes every view, upstream views first.
    ///
    /// Failures are logged and left in each view's history; the remaining views
    /// are still refreshed. Returns the records of the successful refreshes.
    pub fn refresh_all(&self) -> Vec<RefreshRecord> {
        let mut records = Vec::new();

        for name in self.catalog.topological_order() {
            match self.catalog.refresh(&name, Utc::now()) {
                Ok(record) => records.push(record),
                Err(error) => error!("Manual refresh of view [{name}] failed: {error}")
            }
        }

        records
    }

    /// Stops the refresh actor, if running.
    pub async fn shutdown(self) {
        if let Some(refresher) = self.refresher {
            if let Err(error) = refresher.despawn().await {
                error!("Refresh actor did not despawn gracefully: {error:?}");
            }
        }

        debug!("Pipeline stopped");
    }
}

fn spawn_csv_reader(path: PathBuf, sender: mpsc::Sender<Result<TransactionRecord, ValidationError>>) -> JoinHandle<()> {
    spawn_blocking(move || {
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(error) => {
                error!("Error opening CSV at path: {} | {error}", path.display());
                return;
            }
        };

        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(BufReader::new(file));

        for result in reader.deserialize::<TransactionRecord>() {
            let result = result.map_err(|error| {
                error!("CSV deserialization error: {error}");
                ValidationError::malformed(error.to_string())
            });

            if sender.blocking_send(result).is_err() {
                break;
            }
        }
    })
}
