use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::SystemTime;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::applier::ModelApplier;
use crate::engine::{ReconciliationEngine, SyncOutcome};
use crate::error::{FetchError, SyncError};
use crate::fetch::{fetch_snapshot, BuildServer};
use crate::loaded::LoadRequest;

pub type SyncTaskId = u64;

/// Coarse-grained state of the most relevant sync task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTaskState {
    Idle,
    Queued,
    Running,
    Success,
    Failure,
    Cancelled,
}

/// Step a running cycle is in. Cycles can be cancelled until they reach `Applying`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Fetching,
    Planning,
    Applying,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncRequest {
    pub load: LoadRequest,
}

impl SyncRequest {
    pub fn new(load: LoadRequest) -> Self {
        Self { load }
    }

    pub fn description(&self) -> String {
        if self.load.is_empty() {
            "sync".to_string()
        } else {
            format!(
                "sync (load {}, unload {})",
                self.load.load.len(),
                self.load.unload.len()
            )
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncStatusSnapshot {
    pub state: SyncTaskState,
    pub phase: Option<SyncPhase>,
    pub active_id: Option<SyncTaskId>,
    pub queued: usize,
    pub last_completed_id: Option<SyncTaskId>,
    pub message: Option<String>,
    pub last_error: Option<String>,
    pub queued_at: Option<SystemTime>,
    /// Start of the running cycle, or of the last completed one when nothing is running.
    pub started_at: Option<SystemTime>,
    pub last_finished_at: Option<SystemTime>,
}

/// Runs sync cycles on a dedicated worker thread.
///
/// The worker owns the [`ReconciliationEngine`] and the [`ModelApplier`], so there is a single
/// writer to the model.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

struct Inner {
    server: Arc<dyn BuildServer>,
    state: Mutex<State>,
    wake: Condvar,
    worker: Mutex<Worker>,
}

struct Worker {
    engine: ReconciliationEngine,
    applier: Box<dyn ModelApplier>,
}

#[derive(Debug, Default)]
struct State {
    next_id: SyncTaskId,
    queue: VecDeque<QueuedSync>,
    running: Option<RunningSync>,
    last: Option<CompletedSync>,
    /// Load requests of cycles dropped by `cancel`, folded into the next enqueued request.
    pending_load: LoadRequest,
}

#[derive(Debug, Clone)]
struct QueuedSync {
    id: SyncTaskId,
    request: SyncRequest,
    queued_at: SystemTime,
}

#[derive(Debug)]
struct RunningSync {
    id: SyncTaskId,
    request: SyncRequest,
    phase: SyncPhase,
    started_at: SystemTime,
    cancel: CancellationToken,
}

#[derive(Debug, Clone)]
struct CompletedSync {
    id: SyncTaskId,
    request: SyncRequest,
    state: SyncTaskState,
    started_at: SystemTime,
    finished_at: SystemTime,
    outcome: Option<SyncOutcome>,
    error: Option<String>,
}

impl SyncOrchestrator {
    pub fn new(
        server: Arc<dyn BuildServer>,
        engine: ReconciliationEngine,
        applier: Box<dyn ModelApplier>,
    ) -> Self {
        let inner = Arc::new(Inner {
            server,
            state: Mutex::new(State::default()),
            wake: Condvar::new(),
            worker: Mutex::new(Worker { engine, applier }),
        });

        let for_thread = inner.clone();
        std::thread::Builder::new()
            .name("nova-project-sync-orchestrator".to_string())
            .spawn(move || worker_loop(for_thread))
            .expect("failed to spawn nova project sync orchestrator thread");

        Self { inner }
    }

    /// Enqueue a sync request.
    ///
    /// The queue is bounded to one: enqueueing cancels the running cycle unless it is already
    /// applying, and replaces any queued request. Load requests of the work it displaces are
    /// folded into the new request so explicit loads and unloads are never lost.
    pub fn enqueue(&self, request: SyncRequest) -> SyncTaskId {
        let mut state = self
            .inner
            .state
            .lock()
            .expect("sync orchestrator lock poisoned");
        state.next_id = state.next_id.wrapping_add(1);
        let id = state.next_id;

        let load = take_displaced_load(&mut state).merge(request.load);
        state.queue.push_back(QueuedSync {
            id,
            request: SyncRequest::new(load),
            queued_at: SystemTime::now(),
        });
        tracing::debug!(target: "nova.sync.orchestrator", id, "enqueued sync");
        self.inner.wake.notify_all();
        id
    }

    /// Cancel the running cycle (unless applying) and drop queued work.
    ///
    /// Their load requests are kept and applied by the next enqueued sync.
    pub fn cancel(&self) {
        let mut state = self
            .inner
            .state
            .lock()
            .expect("sync orchestrator lock poisoned");
        state.pending_load = take_displaced_load(&mut state);
        self.inner.wake.notify_all();
    }

    pub fn status(&self) -> SyncStatusSnapshot {
        let state = self
            .inner
            .state
            .lock()
            .expect("sync orchestrator lock poisoned");
        let (status, phase, active_id, message) = if let Some(running) = state.running.as_ref() {
            (
                SyncTaskState::Running,
                Some(running.phase),
                Some(running.id),
                Some(running.request.description()),
            )
        } else if let Some(next) = state.queue.front() {
            (
                SyncTaskState::Queued,
                None,
                Some(next.id),
                Some(next.request.description()),
            )
        } else if let Some(last) = state.last.as_ref() {
            (
                last.state,
                None,
                Some(last.id),
                Some(last.request.description()),
            )
        } else {
            (SyncTaskState::Idle, None, None, None)
        };

        SyncStatusSnapshot {
            state: status,
            phase,
            active_id,
            queued: state.queue.len(),
            last_completed_id: state.last.as_ref().map(|s| s.id),
            message,
            last_error: state.last.as_ref().and_then(|s| s.error.clone()),
            queued_at: state.queue.front().map(|s| s.queued_at),
            started_at: state
                .running
                .as_ref()
                .map(|s| s.started_at)
                .or_else(|| state.last.as_ref().map(|s| s.started_at)),
            last_finished_at: state.last.as_ref().map(|s| s.finished_at),
        }
    }

    /// Plan and warnings of the last successful cycle, if the last cycle succeeded.
    pub fn last_outcome(&self) -> Option<SyncOutcome> {
        let state = self
            .inner
            .state
            .lock()
            .expect("sync orchestrator lock poisoned");
        state.last.as_ref().and_then(|s| s.outcome.clone())
    }

    /// Run `f` against the engine. Blocks while a cycle is in progress.
    pub fn with_engine<R>(&self, f: impl FnOnce(&ReconciliationEngine) -> R) -> R {
        let worker = self
            .inner
            .worker
            .lock()
            .expect("sync orchestrator worker lock poisoned");
        f(&worker.engine)
    }
}

/// Cancel the running cycle unless it is applying, drain the queue, and return the combined load
/// request of everything displaced (oldest first). A cancelled cycle is only absorbed once.
fn take_displaced_load(state: &mut State) -> LoadRequest {
    let mut load = std::mem::take(&mut state.pending_load);
    if let Some(running) = state.running.as_ref() {
        if running.phase != SyncPhase::Applying && !running.cancel.is_cancelled() {
            running.cancel.cancel();
            load = load.merge(running.request.load.clone());
        }
    }
    for queued in state.queue.drain(..) {
        load = load.merge(queued.request.load);
    }
    load
}

fn worker_loop(inner: Arc<Inner>) {
    loop {
        let (id, request, started_at, cancel) = {
            let mut state = inner
                .state
                .lock()
                .expect("sync orchestrator lock poisoned");
            while state.queue.is_empty() {
                state = inner
                    .wake
                    .wait(state)
                    .expect("sync orchestrator lock poisoned");
            }
            let Some(queued) = state.queue.pop_front() else {
                continue;
            };

            let cancel = CancellationToken::new();
            let started_at = SystemTime::now();
            state.running = Some(RunningSync {
                id: queued.id,
                request: queued.request.clone(),
                phase: SyncPhase::Fetching,
                started_at,
                cancel: cancel.clone(),
            });

            (queued.id, queued.request, started_at, cancel)
        };

        let (task_state, outcome, error) = run_cycle(&inner, &request, &cancel);
        let finished_at = SystemTime::now();

        tracing::debug!(
            target: "nova.sync.orchestrator",
            id,
            state = ?task_state,
            error = error.as_deref().unwrap_or(""),
            "sync finished"
        );

        let mut shared = inner
            .state
            .lock()
            .expect("sync orchestrator lock poisoned");
        shared.running = None;
        shared.last = Some(CompletedSync {
            id,
            request,
            state: task_state,
            started_at,
            finished_at,
            outcome,
            error,
        });

        if !shared.queue.is_empty() {
            inner.wake.notify_all();
        }
    }
}

fn set_phase(inner: &Inner, phase: SyncPhase) {
    let mut state = inner
        .state
        .lock()
        .expect("sync orchestrator lock poisoned");
    if let Some(running) = state.running.as_mut() {
        running.phase = phase;
    }
}

/// Move to `Applying` unless cancellation already happened. Both checks happen under the state
/// lock so `enqueue` either cancels before apply or leaves the cycle alone.
fn begin_apply(inner: &Inner, cancel: &CancellationToken) -> bool {
    let mut state = inner
        .state
        .lock()
        .expect("sync orchestrator lock poisoned");
    if cancel.is_cancelled() {
        return false;
    }
    if let Some(running) = state.running.as_mut() {
        running.phase = SyncPhase::Applying;
    }
    true
}

fn cancelled() -> (SyncTaskState, Option<SyncOutcome>, Option<String>) {
    (
        SyncTaskState::Cancelled,
        None,
        Some(FetchError::Cancelled.to_string()),
    )
}

fn failed(err: SyncError) -> (SyncTaskState, Option<SyncOutcome>, Option<String>) {
    (SyncTaskState::Failure, None, Some(err.to_string()))
}

fn run_cycle(
    inner: &Inner,
    request: &SyncRequest,
    cancel: &CancellationToken,
) -> (SyncTaskState, Option<SyncOutcome>, Option<String>) {
    let snapshot = match fetch_snapshot(inner.server.as_ref(), cancel) {
        Ok(snapshot) => snapshot,
        Err(_) if cancel.is_cancelled() => return cancelled(),
        Err(err) => return failed(SyncError::Fetch(err)),
    };
    if cancel.is_cancelled() {
        return cancelled();
    }

    set_phase(inner, SyncPhase::Planning);
    let mut worker = inner
        .worker
        .lock()
        .expect("sync orchestrator worker lock poisoned");
    let prepared = match worker.engine.prepare(Some(&snapshot), &request.load) {
        Ok(prepared) => prepared,
        Err(err) => return failed(err),
    };

    if !begin_apply(inner, cancel) {
        return cancelled();
    }

    if !prepared.plan().is_empty() {
        if let Err(err) = prepared.plan().apply_to(worker.applier.as_mut()) {
            return failed(SyncError::Apply(err));
        }
    }
    let outcome = SyncOutcome {
        plan: prepared.plan().clone(),
        warnings: prepared.warnings().to_vec(),
    };
    worker.engine.commit(prepared);

    (SyncTaskState::Success, Some(outcome), None)
}
