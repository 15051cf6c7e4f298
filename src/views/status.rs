use std::collections::VecDeque;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::views::definition::RefreshMode;
use crate::types::{Generation, TargetLag};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RefreshAction {
    /// Sources had nothing new, the snapshot was left as is.
    NoData,
    Incremental,
    Full
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RefreshTrigger {
    Creation,
    Scheduled,
    Manual
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RefreshOutcome {
    Succeeded {
        action: RefreshAction,
        rows_changed: u64
    },
    Failed {
        error: String
    }
}

impl Display for RefreshOutcome {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RefreshOutcome::Succeeded { action, rows_changed } => write!(formatter, "{action:?}({rows_changed})"),
            RefreshOutcome::Failed { error } => write!(formatter, "Failed({error})")
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefreshRecord {
    pub view: String,
    pub trigger: RefreshTrigger,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub outcome: RefreshOutcome
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SchedulingState {
    Active,
    /// Suspended by an operator.
    Suspended,
    /// Suspended after this many refreshes failed in a row.
    SuspendedOnFailures(u32)
}

impl Display for SchedulingState {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SchedulingState::Active => write!(formatter, "ACTIVE"),
            SchedulingState::Suspended => write!(formatter, "SUSPENDED"),
            SchedulingState::SuspendedOnFailures(failures) => write!(formatter, "SUSPENDED after {failures} failures")
        }
    }
}

/// Retry and bookkeeping limits shared by every view of a catalog.
#[derive(Debug, Clone, Copy)]
pub struct RefreshPolicy {
    pub max_consecutive_failures: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub history_limit: usize
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            history_limit: 32
        }
    }
}

impl RefreshPolicy {
    /// Exponential backoff: `initial * 2^(failures - 1)`, capped at `max_backoff`.
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.initial_backoff
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Mutable bookkeeping of a view, guarded separately from its snapshot.
#[derive(Debug)]
pub(crate) struct ViewHealth {
    pub scheduling: SchedulingState,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<RefreshOutcome>,
    pub consecutive_failures: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub staleness_exceeded: bool,
    pub history: VecDeque<RefreshRecord>
}

impl ViewHealth {
    pub fn new() -> Self {
        Self {
            scheduling: SchedulingState::Active,
            last_refreshed_at: None,
            last_outcome: None,
            consecutive_failures: 0,
            next_retry_at: None,
            staleness_exceeded: false,
            history: VecDeque::new()
        }
    }

    pub fn is_backing_off(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at.is_some_and(|retry_at| now < retry_at)
    }

    /// Applies a finished refresh and returns true if the view just got suspended.
    pub fn record(&mut self, record: RefreshRecord, policy: &RefreshPolicy) -> bool {
        let mut suspended = false;

        match &record.outcome {
            RefreshOutcome::Succeeded { .. } => {
                self.last_refreshed_at = Some(record.started_at);
                self.consecutive_failures = 0;
                self.next_retry_at = None;
            }
            RefreshOutcome::Failed { .. } => {
                self.consecutive_failures += 1;

                let backoff = TimeDelta::from_std(policy.backoff(self.consecutive_failures))
                    .unwrap_or_else(|_| TimeDelta::seconds(60));
                self.next_retry_at = Some(record.started_at + backoff);

                if self.consecutive_failures >= policy.max_consecutive_failures && self.scheduling == SchedulingState::Active {
                    self.scheduling = SchedulingState::SuspendedOnFailures(self.consecutive_failures);
                    suspended = true;
                }
            }
        }

        self.last_outcome = Some(record.outcome.clone());
        self.history.push_back(record);

        while self.history.len() > policy.history_limit.max(1) {
            self.history.pop_front();
        }

        suspended
    }
}

/// Observable state of a derived view.
#[derive(Debug, Clone)]
pub struct ViewInfo {
    pub name: String,
    pub kind: &'static str,
    pub sources: Vec<String>,
    pub target_lag: TargetLag,
    pub refresh_mode: RefreshMode,
    pub scheduling: SchedulingState,
    pub generation: Generation,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<RefreshOutcome>,
    pub consecutive_failures: u32,
    pub row_count: usize,
    /// Age of the oldest source write not yet reflected, zero when up to date.
    pub staleness: Duration,
    pub staleness_exceeded: bool
}
