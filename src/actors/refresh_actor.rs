use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::{spawn_blocking, JoinError, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};
use tokio::{select, spawn};
use tracing::{debug, error};

use crate::views::Catalog;

enum RefreshCommand {
    SourcesChanged
}

/// Background task keeping the views of a catalog within their target lag.
///
/// Due views are refreshed on every tick and whenever ingestion reports new raw
/// writes, so views with a zero lag follow writes immediately.
pub struct RefreshActor {
    sender: mpsc::UnboundedSender<RefreshCommand>,
    handle: JoinHandle<()>
}

impl RefreshActor {
    /// Spawns the refresh loop. Must be called from within a tokio runtime.
    pub fn spawn(catalog: Arc<Catalog>, tick: Duration) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel();

        let handle = spawn(async move {
            let mut ticker = interval(tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                select! {
                    _ = ticker.tick() => {}
                    command = receiver.recv() => {
                        if command.is_none() {
                            break;
                        }
                    }
                }

                let catalog = catalog.clone();

                match spawn_blocking(move || catalog.refresh_due(Utc::now())).await {
                    Ok(records) => {
                        for record in records {
                            debug!("Scheduled refresh of view [{}]: {}", record.view, record.outcome);
                        }
                    }
                    Err(error) => error!("Scheduled refresh task failed: {error}")
                }
            }

            debug!("Refresh actor stopped");
        });

        Self { sender, handle }
    }

    /// Signals that raw data changed. Returns false once the actor is gone.
    pub fn notify(&self) -> bool {
        self.sender.send(RefreshCommand::SourcesChanged).is_ok()
    }

    /// Stops the loop after the refresh in progress, if any, completes.
    pub async fn despawn(self) -> Result<(), JoinError> {
        drop(self.sender);
        self.handle.await
    }
}
