use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::storage::{ChangeLog, RawStore};
use crate::types::TargetLag;
use crate::views::definition::{ViewDefinition, ViewOptions};
use crate::views::errors::{DependencyError, RefreshError, ViewError};
use crate::views::graph::DependencyGraph;
use crate::views::query::QueryResult;
use crate::views::status::{RefreshOutcome, RefreshPolicy, RefreshRecord, RefreshTrigger, SchedulingState, ViewInfo};
use crate::views::view::{Contents, RefreshSummary, View};

type ViewMap = BTreeMap<String, Arc<View>>;

/// The set of relations of a pipeline: the raw store plus every derived view.
///
/// Definition changes and refreshes are serialised by a single refresh lock;
/// readers only ever touch published snapshots and never wait on a refresh.
pub struct Catalog {
    raw: Arc<RawStore>,
    views: RwLock<ViewMap>,
    refresh_lock: Mutex<()>,
    policy: RefreshPolicy
}

impl Catalog {
    pub fn new(raw: Arc<RawStore>, policy: RefreshPolicy) -> Self {
        Self {
            raw,
            views: RwLock::new(BTreeMap::new()),
            refresh_lock: Mutex::new(()),
            policy
        }
    }

    pub fn raw(&self) -> &Arc<RawStore> {
        &self.raw
    }

    pub fn view_names(&self) -> Vec<String> {
        self.views.read().keys().cloned().collect()
    }

    /// View names ordered so every view follows the views it reads from.
    pub fn topological_order(&self) -> Vec<String> {
        dependency_graph(&self.views.read()).topological_order()
    }

    /// Creates or replaces a view and materializes it.
    ///
    /// # Errors
    /// Returns `DependencyError` when a source is missing, is an aggregate, or the
    /// definition would introduce a cycle, and `RefreshError` when the initial
    /// materialization fails. In every error case the previous definition stays live.
    pub fn define_view(
        &self,
        name: &str,
        definition: ViewDefinition,
        options: ViewOptions,
        now: DateTime<Utc>
    ) -> Result<RefreshRecord, ViewError> {
        let name = name.trim();

        if name.is_empty() || name == self.raw.name() {
            return Err(DependencyError::InvalidName { name: name.to_string() }.into());
        }

        if definition.sources().is_empty() {
            return Err(DependencyError::NoSources { view: name.to_string() }.into());
        }

        let _guard = self.refresh_lock.lock();
        let views = self.views.read().clone();
        let graph = dependency_graph(&views);

        for source in definition.sources() {
            if let Some(path) = graph.path(source, name) {
                let mut cycle = vec![name.to_string()];
                cycle.extend(path);
                return Err(DependencyError::Cycle { view: name.to_string(), path: cycle }.into());
            }
        }

        if !definition.produces_transactions() {
            if let Some(dependent) = graph.dependents(name).first() {
                return Err(DependencyError::IncompatibleSource {
                    view: dependent.clone(),
                    input: name.to_string(),
                    reason: "aggregate views cannot feed other views"
                }.into());
            }
        }

        let sources = self.resolve_sources(name, &definition, &views)?;

        let timer = Instant::now();
        let (view, summary) = View::create(name, definition, options, &sources, now)?;
        let record = success_record(name, RefreshTrigger::Creation, now, timer.elapsed(), summary);

        view.health.lock().record(record.clone(), &self.policy);

        let replaced = self.views.write().insert(name.to_string(), Arc::new(view)).is_some();

        if replaced {
            info!("View [{name}] redefined and rebuilt with {} rows", summary.rows_changed);
        } else {
            info!("View [{name}] created with {} rows", summary.rows_changed);
        }

        Ok(record)
    }

    /// # Errors
    /// Returns `DependencyError::HasDependents` while other views still read from `name`.
    pub fn drop_view(&self, name: &str) -> Result<(), DependencyError> {
        let _guard = self.refresh_lock.lock();
        let mut views = self.views.write();

        if !views.contains_key(name) {
            return Err(DependencyError::MissingRelation { relation: name.to_string() });
        }

        let graph = dependency_graph(&views);
        let dependents = graph.dependents(name);

        if !dependents.is_empty() {
            return Err(DependencyError::HasDependents {
                relation: name.to_string(),
                dependents: dependents.to_vec()
            });
        }

        views.remove(name);
        info!("View [{name}] dropped");

        Ok(())
    }

    /// Refreshes `name`, first bringing every view it reads from up to date.
    ///
    /// Runs regardless of scheduling state or backoff.
    pub fn refresh(&self, name: &str, now: DateTime<Utc>) -> Result<RefreshRecord, ViewError> {
        let _guard = self.refresh_lock.lock();
        let views = self.views.read().clone();
        let target = lookup(&views, name)?;
        let graph = dependency_graph(&views);

        for upstream in graph.upstream(name) {
            if let Some(view) = views.get(&upstream) {
                self.refresh_view(view, &views, RefreshTrigger::Manual, now);
            }
        }

        let (record, failure) = self.refresh_view(&target, &views, RefreshTrigger::Manual, now);

        match failure {
            Some(error) => Err(error.into()),
            None => Ok(record)
        }
    }

    /// Refreshes every view whose staleness budget requires it, in dependency order.
    pub fn refresh_due(&self, now: DateTime<Utc>) -> Vec<RefreshRecord> {
        let _guard = self.refresh_lock.lock();
        let views = self.views.read().clone();
        let graph = dependency_graph(&views);
        let order = graph.topological_order();
        let pending = self.pending_since(&views, &order);

        let mut due = BTreeSet::new();

        for name in order.iter().rev() {
            let Some(view) = views.get(name) else { continue };
            let health = view.health.lock();

            if health.scheduling != SchedulingState::Active || health.is_backing_off(now) {
                continue;
            }

            let since = pending.get(name).copied().flatten();
            let dependent_due = graph.dependents(name).iter().any(|dependent| due.contains(dependent));

            //NOTE: A view with pending writes is also refreshed ahead of a due dependent, so the dependent never reads a stale input.
            let needed = match view.options().target_lag {
                TargetLag::Duration(budget) => since.is_some_and(|since| age(now, since) >= budget / 2 || dependent_due),
                TargetLag::Downstream => dependent_due
            };

            if needed {
                due.insert(name.clone());
            }
        }

        let mut records = Vec::with_capacity(due.len());

        for name in order.iter().filter(|name| due.contains(*name)) {
            if let Some(view) = views.get(name) {
                let (record, _) = self.refresh_view(view, &views, RefreshTrigger::Scheduled, now);
                records.push(record);
            }
        }

        self.check_staleness(&views, &order, now);

        records
    }

    pub fn list_views(&self, now: DateTime<Utc>) -> Vec<ViewInfo> {
        let views = self.views.read().clone();
        let order = dependency_graph(&views).topological_order();
        let pending = self.pending_since(&views, &order);

        views.values()
            .map(|view| {
                let snapshot = view.snapshot();
                let health = view.health.lock();
                let staleness = pending.get(view.name()).copied().flatten()
                    .map(|since| age(now, since))
                    .unwrap_or_default();

                ViewInfo {
                    name: view.name().to_string(),
                    kind: view.definition().kind(),
                    sources: view.definition().sources().to_vec(),
                    target_lag: view.options().target_lag,
                    refresh_mode: view.options().refresh_mode,
                    scheduling: health.scheduling,
                    generation: snapshot.generation,
                    last_refreshed_at: health.last_refreshed_at,
                    last_outcome: health.last_outcome.clone(),
                    consecutive_failures: health.consecutive_failures,
                    row_count: snapshot.contents.len(),
                    staleness,
                    staleness_exceeded: health.staleness_exceeded
                }
            })
            .collect()
    }

    pub fn refresh_history(&self, name: &str) -> Result<Vec<RefreshRecord>, DependencyError> {
        let view = lookup(&self.views.read(), name)?;
        let history = view.health.lock().history.iter().cloned().collect();

        Ok(history)
    }

    pub fn suspend(&self, name: &str) -> Result<(), DependencyError> {
        let view = lookup(&self.views.read(), name)?;
        view.health.lock().scheduling = SchedulingState::Suspended;
        info!("View [{name}] suspended");

        Ok(())
    }

    /// Puts a suspended view back on schedule and forgets its failure streak.
    pub fn resume(&self, name: &str) -> Result<(), DependencyError> {
        let view = lookup(&self.views.read(), name)?;
        let mut health = view.health.lock();

        health.scheduling = SchedulingState::Active;
        health.consecutive_failures = 0;
        health.next_retry_at = None;
        info!("View [{name}] resumed");

        Ok(())
    }

    /// Reads the current published contents of any relation.
    pub fn query(&self, name: &str) -> Result<QueryResult, DependencyError> {
        if name == self.raw.name() {
            return Ok(QueryResult::Transactions(self.raw.scan()));
        }

        let view = lookup(&self.views.read(), name)?;
        let snapshot = view.snapshot();

        Ok(match (&snapshot.contents, view.definition()) {
            (Contents::Rows(rows), _) => {
                QueryResult::Transactions(rows.iter().map(|entry| entry.transaction.clone()).collect())
            }
            (Contents::Groups(groups), ViewDefinition::Aggregate { group_by, .. }) => QueryResult::Aggregates {
                group_by: group_by.clone(),
                groups: groups.iter().map(|(key, stats)| (key.clone(), stats.clone())).collect()
            },
            (Contents::Groups(groups), _) => QueryResult::Aggregates {
                group_by: Vec::new(),
                groups: groups.iter().map(|(key, stats)| (key.clone(), stats.clone())).collect()
            }
        })
    }

    fn resolve_sources(&self, name: &str, definition: &ViewDefinition, views: &ViewMap) -> Result<Vec<Arc<dyn ChangeLog>>, DependencyError> {
        definition.sources().iter()
            .map(|source| {
                if source == self.raw.name() {
                    return Ok(self.raw.clone() as Arc<dyn ChangeLog>);
                }

                let view = views.get(source).ok_or_else(|| DependencyError::MissingRelation { relation: source.clone() })?;

                if !view.definition().produces_transactions() {
                    return Err(DependencyError::IncompatibleSource {
                        view: name.to_string(),
                        input: source.clone(),
                        reason: "aggregate views cannot feed other views"
                    });
                }

                Ok(view.clone() as Arc<dyn ChangeLog>)
            })
            .collect()
    }

    /// Runs one refresh and applies its outcome to the view's health.
    fn refresh_view(&self, view: &Arc<View>, views: &ViewMap, trigger: RefreshTrigger, now: DateTime<Utc>) -> (RefreshRecord, Option<RefreshError>) {
        let timer = Instant::now();
        let result = self.resolve_sources(view.name(), view.definition(), views)
            .map_err(RefreshError::from)
            .and_then(|sources| view.refresh(&sources, now));

        let (record, failure) = match result {
            Ok(summary) => {
                debug!("View [{}] refreshed: {:?} ({} rows)", view.name(), summary.action, summary.rows_changed);
                (success_record(view.name(), trigger, now, timer.elapsed(), summary), None)
            }
            Err(error) => {
                warn!("{error}");

                let record = RefreshRecord {
                    view: view.name().to_string(),
                    trigger,
                    started_at: now,
                    elapsed: timer.elapsed(),
                    outcome: RefreshOutcome::Failed { error: error.to_string() }
                };

                (record, Some(error))
            }
        };

        let mut health = view.health.lock();

        if health.record(record.clone(), &self.policy) {
            error!(
                "View [{}] suspended after {} consecutive refresh failures",
                view.name(),
                health.consecutive_failures
            );
        }

        (record, failure)
    }

    /// For every view, the commit time of the oldest raw write it does not reflect yet.
    fn pending_since(&self, views: &ViewMap, order: &[String]) -> HashMap<String, Option<DateTime<Utc>>> {
        let mut pending: HashMap<String, Option<DateTime<Utc>>> = HashMap::with_capacity(order.len());

        for name in order {
            let Some(view) = views.get(name) else { continue };
            let snapshot = view.snapshot();
            let mut oldest: Option<DateTime<Utc>> = None;

            for (index, source) in view.definition().sources().iter().enumerate() {
                let frontier = snapshot.frontiers.get(index).copied();

                let unread = if source == self.raw.name() {
                    self.raw.unread_since(frontier)
                } else if let Some(upstream) = views.get(source) {
                    let own = upstream.unread_since(frontier);
                    let inherited = if upstream.health.lock().scheduling == SchedulingState::Active {
                        pending.get(source).copied().flatten()
                    } else {
                        None
                    };

                    earliest(own, inherited)
                } else {
                    None
                };

                oldest = earliest(oldest, unread);
            }

            pending.insert(name.clone(), oldest);
        }

        pending
    }

    fn check_staleness(&self, views: &ViewMap, order: &[String], now: DateTime<Utc>) {
        let pending = self.pending_since(views, order);

        for (name, view) in views {
            let Some(budget) = view.options().target_lag.as_duration() else { continue };
            let lag = pending.get(name).copied().flatten()
                .map(|since| age(now, since))
                .unwrap_or_default();

            let exceeded = lag > budget;
            let mut health = view.health.lock();

            if exceeded && !health.staleness_exceeded {
                warn!("View [{name}] is {lag:?} behind its sources, exceeding its target lag of {}", view.options().target_lag);
            } else if !exceeded && health.staleness_exceeded {
                info!("View [{name}] is back within its target lag");
            }

            health.staleness_exceeded = exceeded;
        }
    }
}

fn dependency_graph(views: &ViewMap) -> DependencyGraph {
    let mut graph = DependencyGraph::new();

    for (name, view) in views {
        graph.add_view(name, view.definition().sources());
    }

    graph
}

fn lookup(views: &ViewMap, name: &str) -> Result<Arc<View>, DependencyError> {
    views.get(name).cloned().ok_or_else(|| DependencyError::MissingRelation { relation: name.to_string() })
}

fn success_record(view: &str, trigger: RefreshTrigger, started_at: DateTime<Utc>, elapsed: Duration, summary: RefreshSummary) -> RefreshRecord {
    RefreshRecord {
        view: view.to_string(),
        trigger,
        started_at,
        elapsed,
        outcome: RefreshOutcome::Succeeded { action: summary.action, rows_changed: summary.rows_changed }
    }
}

fn earliest(left: Option<DateTime<Utc>>, right: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (left, right) {
        (Some(left), Some(right)) => Some(left.min(right)),
        (left, right) => left.or(right)
    }
}

fn age(now: DateTime<Utc>, since: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or_default()
}
