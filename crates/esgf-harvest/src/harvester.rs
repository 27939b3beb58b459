//! The harvest orchestrator.
//!
//! A [`Harvester`] owns one run: the per-dataset status map, the aggregate
//! counters and the collector tasks it spawned. Datasets move through
//! `CREATED -> HARVESTING -> {COMPLETED | FAILED}`; the run itself moves
//! through `CREATED -> HARVESTING -> {COMPLETED | FAILED | PAUSED}` and back
//! from `PAUSED` to `HARVESTING` on resume.
//!
//! The status map and the task set are guarded by one lock each, always taken
//! in that order. Observers are notified after the locks are released, on the
//! task that made the transition.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Semaphore, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use esgf_core::error::{IllegalStateError, InvalidInputError};
use esgf_core::{
    DatasetRepository, EngineConfig, Error, HarvestKind, HarvestStatus, Result, RunRepository,
    RunSnapshot, SearchQuery, SearchService,
};

use crate::collector::Collector;
use crate::discovery::discover_instances;
use crate::observer::{HarvestObserver, Progress};

/// The collaborators a harvester drives.
///
/// Cloning shares the worker pool, so every harvester built from the same
/// `HarvestServices` competes for the same `workers` permits.
#[derive(Clone)]
pub struct HarvestServices {
    search: Arc<dyn SearchService>,
    collector: Arc<dyn Collector>,
    datasets: Arc<dyn DatasetRepository>,
    runs: Option<Arc<dyn RunRepository>>,
    pool: Arc<Semaphore>,
    retry_failed_on_resume: bool,
}

impl HarvestServices {
    pub fn new(
        search: Arc<dyn SearchService>,
        collector: Arc<dyn Collector>,
        datasets: Arc<dyn DatasetRepository>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            search,
            collector,
            datasets,
            runs: None,
            pool: Arc::new(Semaphore::new(config.workers.max(1))),
            retry_failed_on_resume: config.retry_failed_on_resume,
        }
    }

    /// Persist run snapshots on completion, pause and reset.
    pub fn with_runs(mut self, runs: Arc<dyn RunRepository>) -> Self {
        self.runs = Some(runs);
        self
    }
}

impl fmt::Debug for HarvestServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarvestServices")
            .field("workers_available", &self.pool.available_permits())
            .field("persists_runs", &self.runs.is_some())
            .field("retry_failed_on_resume", &self.retry_failed_on_resume)
            .finish_non_exhaustive()
    }
}

/// Orchestrates the harvest of every dataset matched by one query.
///
/// Cheap to clone; clones share the same run. Methods that spawn work must be
/// called from within a Tokio runtime.
#[derive(Clone)]
pub struct Harvester {
    inner: Arc<Inner>,
}

struct Inner {
    run_id: String,
    query: SearchQuery,
    services: HarvestServices,
    state: Mutex<RunState>,
    tasks: Mutex<TaskSet>,
    observers: RwLock<Vec<Arc<dyn HarvestObserver>>>,
    status: watch::Sender<HarvestStatus>,
}

#[derive(Debug)]
struct RunState {
    kind: HarvestKind,
    status: HarvestStatus,
    datasets: BTreeMap<String, HarvestStatus>,
    processed: usize,
    any_failed: bool,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    /// Bumped by every start, pause and reset; discovery results from an
    /// older epoch are dropped.
    epoch: u64,
}

#[derive(Debug, Default)]
struct TaskSet {
    next_serial: u64,
    running: HashMap<String, Task>,
    discovery: Option<CancellationToken>,
}

#[derive(Debug)]
struct Task {
    serial: u64,
    token: CancellationToken,
}

/// A collector task ready to spawn.
struct Assignment {
    instance_id: String,
    serial: u64,
    token: CancellationToken,
    kind: HarvestKind,
}

impl RunState {
    fn new(kind: HarvestKind) -> Self {
        Self {
            kind,
            status: HarvestStatus::Created,
            datasets: BTreeMap::new(),
            processed: 0,
            any_failed: false,
            started_at: None,
            finished_at: None,
            epoch: 0,
        }
    }

    fn count_processed(&mut self) {
        self.processed = self.datasets.values().filter(|s| s.is_terminal()).count();
    }

    /// Put every dataset back to `CREATED` and clear the aggregates.
    fn clear(&mut self) {
        for status in self.datasets.values_mut() {
            *status = HarvestStatus::Created;
        }
        self.processed = 0;
        self.any_failed = false;
        self.started_at = None;
        self.finished_at = None;
    }
}

impl TaskSet {
    fn register(&mut self, instance_id: &str) -> Option<(u64, CancellationToken)> {
        if self.running.contains_key(instance_id) {
            return None;
        }
        self.next_serial += 1;
        let token = CancellationToken::new();
        self.running.insert(
            instance_id.to_string(),
            Task {
                serial: self.next_serial,
                token: token.clone(),
            },
        );
        Some((self.next_serial, token))
    }

    fn cancel(&mut self, instance_id: &str) {
        if let Some(task) = self.running.remove(instance_id) {
            task.token.cancel();
        }
    }

    fn cancel_all(&mut self) {
        if let Some(token) = self.discovery.take() {
            token.cancel();
        }
        for (_, task) in self.running.drain() {
            task.token.cancel();
        }
    }

    fn owns(&self, instance_id: &str, serial: u64) -> bool {
        self.running
            .get(instance_id)
            .is_some_and(|task| task.serial == serial)
    }
}

impl Harvester {
    /// Create a fresh run for `query`.
    pub fn new(query: SearchQuery, services: HarvestServices) -> Self {
        let run_id = uuid::Uuid::new_v4().to_string();
        Self::from_parts(run_id, query, services, RunState::new(HarvestKind::default()))
    }

    /// Rebuild a run from a persisted snapshot.
    ///
    /// A run that was harvesting when it was saved comes back `PAUSED`, and
    /// datasets that were mid-flight come back `CREATED`, so the next
    /// [`start`](Self::start) resumes it.
    pub fn restore(snapshot: RunSnapshot, services: HarvestServices) -> Self {
        let mut state = RunState::new(snapshot.kind);
        state.datasets = snapshot
            .datasets
            .into_iter()
            .map(|(id, status)| match status {
                HarvestStatus::Harvesting => (id, HarvestStatus::Created),
                status => (id, status),
            })
            .collect();
        state.count_processed();
        state.status = match snapshot.status {
            HarvestStatus::Harvesting => HarvestStatus::Paused,
            status => status,
        };
        state.any_failed = snapshot.any_failed;
        state.started_at = snapshot.started_at;
        state.finished_at = snapshot.finished_at;
        debug!(run_id = %snapshot.run_id, status = %state.status, "restored run");
        Self::from_parts(snapshot.run_id, snapshot.query, services, state)
    }

    fn from_parts(
        run_id: String,
        query: SearchQuery,
        services: HarvestServices,
        state: RunState,
    ) -> Self {
        let (status, _) = watch::channel(state.status);
        Self {
            inner: Arc::new(Inner {
                run_id,
                query,
                services,
                state: Mutex::new(state),
                tasks: Mutex::new(TaskSet::default()),
                observers: RwLock::new(Vec::new()),
                status,
            }),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.inner.run_id
    }

    pub fn query(&self) -> &SearchQuery {
        &self.inner.query
    }

    pub fn status(&self) -> HarvestStatus {
        self.inner.state.lock().status
    }

    /// Status of one dataset, if the run tracks it.
    pub fn dataset_status(&self, instance_id: &str) -> Option<HarvestStatus> {
        self.inner.state.lock().datasets.get(instance_id).copied()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let state = self.inner.state.lock();
        self.inner.snapshot(&state)
    }

    pub fn add_observer(&self, observer: Arc<dyn HarvestObserver>) {
        self.inner.observers.write().push(observer);
    }

    /// Wait until the run leaves `HARVESTING`, then return its snapshot.
    ///
    /// A completed or failed run is persisted and its observers notified
    /// before this returns.
    pub async fn wait(&self) -> RunSnapshot {
        let mut status = self.inner.status.subscribe();
        // The sender lives as long as `self`, so this only returns on a match.
        let _ = status
            .wait_for(|status| *status != HarvestStatus::Harvesting)
            .await;
        self.snapshot()
    }

    // ========================================================================
    // Run Control
    // ========================================================================

    /// Start (or resume) harvesting `kind`.
    ///
    /// Discovery runs on a background task; this returns as soon as the run
    /// is marked `HARVESTING`.
    pub fn start(&self, kind: HarvestKind) -> Result<()> {
        let epoch = {
            let mut state = self.inner.state.lock();
            match state.status {
                HarvestStatus::Harvesting => {
                    return Err(IllegalStateError::AlreadyHarvesting {
                        run_id: self.inner.run_id.clone(),
                    }
                    .into());
                }
                HarvestStatus::Completed if state.kind == kind => {
                    return Err(IllegalStateError::AlreadyCompleted {
                        run_id: self.inner.run_id.clone(),
                        kind: kind.to_string(),
                    }
                    .into());
                }
                _ => {}
            }

            if state.kind != kind || state.status == HarvestStatus::Completed {
                state.clear();
            }
            state.kind = kind;
            state.status = HarvestStatus::Harvesting;
            state.finished_at = None;
            state.any_failed = false;
            state.started_at.get_or_insert_with(Utc::now);
            state.epoch += 1;
            self.inner.status.send_replace(state.status);
            state.epoch
        };

        let token = CancellationToken::new();
        self.inner.tasks.lock().discovery = Some(token.clone());

        info!(run_id = %self.inner.run_id, %kind, "harvest started");
        let harvester = self.clone();
        let span = info_span!("discovery", run_id = %self.inner.run_id);
        tokio::spawn(async move { harvester.discover(epoch, token).await }.instrument(span));
        Ok(())
    }

    /// Pause the run, cancelling every outstanding collector.
    ///
    /// Datasets that were mid-flight go back to `CREATED`. A completed run is
    /// left untouched.
    pub fn pause(&self) -> Result<()> {
        let snapshot = {
            let mut state = self.inner.state.lock();
            if state.status == HarvestStatus::Completed {
                return Ok(());
            }
            state.status = HarvestStatus::Paused;
            state.epoch += 1;
            self.inner.tasks.lock().cancel_all();
            for status in state.datasets.values_mut() {
                if *status == HarvestStatus::Harvesting {
                    *status = HarvestStatus::Created;
                }
            }
            self.inner.status.send_replace(state.status);
            self.inner.snapshot(&state)
        };

        info!(
            run_id = %self.inner.run_id,
            processed = snapshot.processed,
            total = snapshot.total,
            "harvest paused"
        );
        self.inner.save(&snapshot)
    }

    /// Clear the run back to `CREATED` and drop every harvested payload.
    ///
    /// Every payload removal is attempted and the cleared run is saved even
    /// when some removals fail; the first failure is returned afterwards.
    pub fn reset(&self) -> Result<()> {
        let (ids, snapshot) = {
            let mut state = self.inner.state.lock();
            state.epoch += 1;
            self.inner.tasks.lock().cancel_all();
            state.clear();
            state.status = HarvestStatus::Created;
            self.inner.status.send_replace(state.status);
            let ids: Vec<String> = state.datasets.keys().cloned().collect();
            (ids, self.inner.snapshot(&state))
        };

        let mut first_error = None;
        for id in &ids {
            if let Err(err) = self.inner.services.datasets.remove(id) {
                warn!(instance_id = %id, error = %err, "could not drop harvested payload");
                first_error.get_or_insert(err);
            }
        }
        info!(run_id = %self.inner.run_id, datasets = ids.len(), "harvest reset");
        self.inner.save(&snapshot)?;
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Put one dataset back to `CREATED`, dropping its payload.
    ///
    /// An active run immediately re-enqueues it; a completed run becomes
    /// `PAUSED` so the next [`start`](Self::start) picks it up.
    pub fn reset_dataset(&self, instance_id: &str) -> Result<()> {
        let (assignment, snapshot) = {
            let mut state = self.inner.state.lock();
            let Some(current) = state.datasets.get(instance_id).copied() else {
                return Err(self.inner.unknown(instance_id));
            };

            let mut tasks = self.inner.tasks.lock();
            tasks.cancel(instance_id);
            if current.is_terminal() {
                state.processed -= 1;
            }
            state
                .datasets
                .insert(instance_id.to_string(), HarvestStatus::Created);

            let mut assignment = None;
            match state.status {
                HarvestStatus::Harvesting => {
                    assignment = tasks.register(instance_id).map(|(serial, token)| Assignment {
                        instance_id: instance_id.to_string(),
                        serial,
                        token,
                        kind: state.kind,
                    });
                }
                HarvestStatus::Completed => {
                    state.status = HarvestStatus::Paused;
                    state.finished_at = None;
                    state.any_failed = false;
                    self.inner.status.send_replace(state.status);
                }
                _ => {}
            }
            (assignment, self.inner.snapshot(&state))
        };

        let removed = self.inner.services.datasets.remove(instance_id);
        if let Some(assignment) = assignment {
            self.spawn_collector(assignment);
        }
        debug!(run_id = %self.inner.run_id, instance_id, "dataset reset");
        self.inner.save(&snapshot)?;
        removed.map(|_| ())
    }

    // ========================================================================
    // Dataset Mutators
    // ========================================================================

    /// Record that a collector began working on `instance_id`.
    pub fn mark_harvesting(&self, instance_id: &str) -> Result<()> {
        self.transition(instance_id, None, HarvestStatus::Harvesting)
            .map(|_| ())
    }

    pub fn mark_completed(&self, instance_id: &str) -> Result<()> {
        self.transition(instance_id, None, HarvestStatus::Completed)
            .map(|_| ())
    }

    pub fn mark_failed(&self, instance_id: &str) -> Result<()> {
        self.transition(instance_id, None, HarvestStatus::Failed)
            .map(|_| ())
    }

    /// Apply a dataset transition.
    ///
    /// With an `owner`, the transition applies only while that collector task
    /// still owns the dataset. Transitions arriving when the run is not
    /// harvesting, or for a dataset already terminal, are ignored. Returns
    /// whether the transition applied.
    fn transition(&self, instance_id: &str, owner: Option<u64>, to: HarvestStatus) -> Result<bool> {
        let (progress, completed) = {
            let mut state = self.inner.state.lock();
            let Some(current) = state.datasets.get(instance_id).copied() else {
                return Err(self.inner.unknown(instance_id));
            };
            if state.status != HarvestStatus::Harvesting {
                debug!(instance_id, %to, run_status = %state.status, "late transition ignored");
                return Ok(false);
            }

            if let Some(serial) = owner {
                let mut tasks = self.inner.tasks.lock();
                if !tasks.owns(instance_id, serial) {
                    debug!(instance_id, %to, "transition from a cancelled collector ignored");
                    return Ok(false);
                }
                if to.is_terminal() || current.is_terminal() {
                    tasks.running.remove(instance_id);
                }
            }

            if current.is_terminal() {
                warn!(instance_id, %current, %to, "dataset already finished");
                return Ok(false);
            }
            match to {
                HarvestStatus::Harvesting => {}
                HarvestStatus::Completed | HarvestStatus::Failed => state.processed += 1,
                HarvestStatus::Created | HarvestStatus::Paused => return Ok(false),
            }
            state.datasets.insert(instance_id.to_string(), to);

            let progress = Progress {
                run_id: self.inner.run_id.clone(),
                instance_id: instance_id.to_string(),
                status: to,
                processed: state.processed,
                total: state.datasets.len(),
            };
            (progress, self.inner.finish_if_done(&mut state))
        };

        for observer in self.inner.observers() {
            observer.on_progress(&progress);
        }
        if let Some(snapshot) = completed {
            self.inner.completed(&snapshot);
        }
        Ok(true)
    }

    // ========================================================================
    // Background Work
    // ========================================================================

    async fn discover(self, epoch: u64, token: CancellationToken) {
        let search = self.inner.services.search.clone();
        let result = tokio::select! {
            _ = token.cancelled() => {
                debug!("discovery cancelled");
                return;
            }
            result = discover_instances(search.as_ref(), &self.inner.query) => result,
        };

        match result {
            Ok(ids) if ids.is_empty() => self.fail_run(
                epoch,
                InvalidInputError::Other {
                    message: "query matched no datasets".into(),
                }
                .into(),
            ),
            Ok(ids) => self.seed(epoch, ids),
            Err(err) => self.fail_run(epoch, err),
        }
    }

    /// Merge discovered ids into the run and spawn a collector per pending
    /// dataset.
    fn seed(&self, epoch: u64, ids: Vec<String>) {
        let (assignments, completed) = {
            let mut state = self.inner.state.lock();
            if state.epoch != epoch || state.status != HarvestStatus::Harvesting {
                debug!("discovery result outdated");
                return;
            }

            for id in ids {
                state.datasets.entry(id).or_insert(HarvestStatus::Created);
            }
            if self.inner.services.retry_failed_on_resume {
                for status in state.datasets.values_mut() {
                    if *status == HarvestStatus::Failed {
                        *status = HarvestStatus::Created;
                    }
                }
            }
            state.count_processed();

            let kind = state.kind;
            let mut tasks = self.inner.tasks.lock();
            tasks.discovery = None;
            let assignments: Vec<Assignment> = state
                .datasets
                .iter()
                .filter(|(_, status)| **status == HarvestStatus::Created)
                .filter_map(|(id, _)| {
                    tasks.register(id).map(|(serial, token)| Assignment {
                        instance_id: id.clone(),
                        serial,
                        token,
                        kind,
                    })
                })
                .collect();
            drop(tasks);

            info!(
                datasets = state.datasets.len(),
                pending = assignments.len(),
                "discovery seeded run"
            );
            let completed = self.inner.finish_if_done(&mut state);
            (assignments, completed)
        };

        for assignment in assignments {
            self.spawn_collector(assignment);
        }
        if let Some(snapshot) = completed {
            self.inner.completed(&snapshot);
        }
    }

    fn fail_run(&self, epoch: u64, error: Error) {
        let snapshot = {
            let mut state = self.inner.state.lock();
            if state.epoch != epoch || state.status != HarvestStatus::Harvesting {
                return;
            }
            state.status = HarvestStatus::Failed;
            state.finished_at = Some(Utc::now());
            self.inner.tasks.lock().discovery = None;
            self.inner.snapshot(&state)
        };

        warn!(run_id = %self.inner.run_id, error = %error, "harvest failed");
        if let Err(err) = self.inner.save(&snapshot) {
            warn!(error = %err, "could not persist failed run");
        }
        for observer in self.inner.observers() {
            observer.on_error(&snapshot, &error);
        }
        self.inner.publish();
    }

    fn spawn_collector(&self, assignment: Assignment) {
        let harvester = self.clone();
        let span = info_span!(
            "collector",
            run_id = %self.inner.run_id,
            instance_id = %assignment.instance_id
        );
        tokio::spawn(async move { harvester.run_collector(assignment).await }.instrument(span));
    }

    async fn run_collector(self, assignment: Assignment) {
        let Assignment {
            instance_id,
            serial,
            token,
            kind,
        } = assignment;

        let pool = self.inner.services.pool.clone();
        let permit = tokio::select! {
            _ = token.cancelled() => return,
            permit = pool.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        match self.transition(&instance_id, Some(serial), HarvestStatus::Harvesting) {
            Ok(true) => {}
            Ok(false) => return,
            Err(err) => {
                warn!(error = %err, "collector could not start");
                return;
            }
        }

        let outcome = tokio::select! {
            _ = token.cancelled() => {
                debug!("collection cancelled");
                return;
            }
            outcome = self.collect(&instance_id, kind) => outcome,
        };
        drop(permit);

        let status = match outcome {
            Ok(()) => HarvestStatus::Completed,
            Err(err) => {
                warn!(error = %err, "dataset harvest failed");
                HarvestStatus::Failed
            }
        };
        if let Err(err) = self.transition(&instance_id, Some(serial), status) {
            warn!(error = %err, "could not record collector result");
        }
    }

    async fn collect(&self, instance_id: &str, kind: HarvestKind) -> Result<()> {
        let dataset = self
            .inner
            .services
            .collector
            .collect(&self.inner.query, instance_id, kind)
            .await?;
        self.inner.services.datasets.put(&dataset)
    }
}

impl Inner {
    fn snapshot(&self, state: &RunState) -> RunSnapshot {
        RunSnapshot {
            run_id: self.run_id.clone(),
            query: self.query.clone(),
            kind: state.kind,
            status: state.status,
            datasets: state.datasets.clone(),
            total: state.datasets.len(),
            processed: state.processed,
            any_failed: state.any_failed,
            started_at: state.started_at,
            finished_at: state.finished_at,
        }
    }

    /// Flip a harvesting run to `COMPLETED` once every dataset is terminal.
    ///
    /// Returns the snapshot only to the caller that made the transition.
    fn finish_if_done(&self, state: &mut RunState) -> Option<RunSnapshot> {
        if state.status != HarvestStatus::Harvesting || state.processed < state.datasets.len() {
            return None;
        }
        state.status = HarvestStatus::Completed;
        state.finished_at = Some(Utc::now());
        state.any_failed = state
            .datasets
            .values()
            .any(|status| *status == HarvestStatus::Failed);
        Some(self.snapshot(state))
    }

    fn completed(&self, snapshot: &RunSnapshot) {
        info!(
            run_id = %self.run_id,
            total = snapshot.total,
            failed = snapshot.count(HarvestStatus::Failed),
            "harvest completed"
        );
        if let Err(err) = self.save(snapshot) {
            warn!(error = %err, "could not persist completed run");
        }
        for observer in self.observers() {
            observer.on_completed(snapshot);
        }
        self.publish();
    }

    /// Wake `wait()`ers with the current run status. Must not be called
    /// with the state lock held.
    fn publish(&self) {
        let status = self.state.lock().status;
        self.status.send_replace(status);
    }

    fn save(&self, snapshot: &RunSnapshot) -> Result<()> {
        match &self.services.runs {
            Some(runs) => runs.save_run(snapshot),
            None => Ok(()),
        }
    }

    fn observers(&self) -> Vec<Arc<dyn HarvestObserver>> {
        self.observers.read().clone()
    }

    fn unknown(&self, instance_id: &str) -> Error {
        IllegalStateError::UnknownDataset {
            instance_id: instance_id.to_string(),
        }
        .into()
    }
}

impl fmt::Debug for Harvester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Harvester")
            .field("run_id", &self.inner.run_id)
            .field("kind", &state.kind)
            .field("status", &state.status)
            .field("processed", &state.processed)
            .field("total", &state.datasets.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_set_single_owner() {
        let mut tasks = TaskSet::default();
        let (first, token) = tasks.register("ds").unwrap();
        assert!(tasks.register("ds").is_none());
        assert!(tasks.owns("ds", first));

        tasks.cancel("ds");
        assert!(token.is_cancelled());
        assert!(!tasks.owns("ds", first));

        let (second, _) = tasks.register("ds").unwrap();
        assert_ne!(first, second);
        assert!(!tasks.owns("ds", first));
    }

    #[test]
    fn clear_resets_aggregates() {
        let mut state = RunState::new(HarvestKind::Files);
        state.datasets.insert("a".into(), HarvestStatus::Completed);
        state.datasets.insert("b".into(), HarvestStatus::Failed);
        state.count_processed();
        state.any_failed = true;
        assert_eq!(state.processed, 2);

        state.clear();
        assert_eq!(state.processed, 0);
        assert!(!state.any_failed);
        assert!(
            state
                .datasets
                .values()
                .all(|status| *status == HarvestStatus::Created)
        );
    }
}
