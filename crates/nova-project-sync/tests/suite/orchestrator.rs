use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use nova_bsp_model::{
    BuildTarget, BuildTargetId, DependencySourcesResult, JavacOptionsResult, PythonOptionsResult,
    ResourcesResult, ServerCapabilities, SourcesResult, WorkspaceBuildTargetsResult,
};
use nova_config::SyncConfig;
use nova_project_sync::{
    ApplyError, BuildServer, DefaultModuleNameResolver, FetchError, InMemoryModelStore, Library,
    LoadNone, LoadRequest, ModelApplier, Module, ReconciliationEngine, SyncOrchestrator,
    SyncPhase, SyncRequest, SyncTaskState,
};

#[derive(Debug, Clone)]
struct Script {
    delay: Duration,
    result: Result<Vec<&'static str>, FetchError>,
}

impl Script {
    fn targets(delay: Duration, ids: Vec<&'static str>) -> Self {
        Self {
            delay,
            result: Ok(ids),
        }
    }
}

/// Serves one scripted `workspace/buildTargets` answer per cycle.
#[derive(Debug)]
struct ScriptedServer {
    scripts: Mutex<VecDeque<Script>>,
}

impl ScriptedServer {
    fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
        }
    }
}

impl BuildServer for ScriptedServer {
    fn capabilities(&self) -> Result<ServerCapabilities, FetchError> {
        Ok(ServerCapabilities::default())
    }

    fn workspace_build_targets(&self) -> Result<WorkspaceBuildTargetsResult, FetchError> {
        let script = self
            .scripts
            .lock()
            .expect("scripts mutex poisoned")
            .pop_front()
            .unwrap_or(Script::targets(Duration::from_millis(0), vec!["//a"]));

        std::thread::sleep(script.delay);

        let ids = script.result?;
        Ok(WorkspaceBuildTargetsResult {
            targets: ids
                .into_iter()
                .map(|id| {
                    let mut target = BuildTarget::new(id);
                    target.language_ids = vec!["java".to_string()];
                    target
                })
                .collect(),
        })
    }

    fn sources(&self, _targets: &[BuildTargetId]) -> Result<SourcesResult, FetchError> {
        Ok(SourcesResult::default())
    }

    fn resources(&self, _targets: &[BuildTargetId]) -> Result<ResourcesResult, FetchError> {
        Ok(ResourcesResult::default())
    }

    fn dependency_sources(
        &self,
        _targets: &[BuildTargetId],
    ) -> Result<DependencySourcesResult, FetchError> {
        Ok(DependencySourcesResult::default())
    }

    fn javac_options(&self, _targets: &[BuildTargetId]) -> Result<JavacOptionsResult, FetchError> {
        Ok(JavacOptionsResult::default())
    }

    fn python_options(
        &self,
        _targets: &[BuildTargetId],
    ) -> Result<PythonOptionsResult, FetchError> {
        Ok(PythonOptionsResult::default())
    }
}

/// In-memory store the test can inspect while the orchestrator owns a handle to it.
#[derive(Debug, Clone, Default)]
struct SharedStore {
    store: Arc<Mutex<InMemoryModelStore>>,
    begin_delay: Duration,
}

impl SharedStore {
    fn with<R>(&self, f: impl FnOnce(&InMemoryModelStore) -> R) -> R {
        f(&self.store.lock().expect("store mutex poisoned"))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryModelStore> {
        self.store.lock().expect("store mutex poisoned")
    }
}

impl ModelApplier for SharedStore {
    fn begin_batch(&mut self) -> Result<(), ApplyError> {
        std::thread::sleep(self.begin_delay);
        self.lock().begin_batch()
    }

    fn add_module(&mut self, module: &Module) -> Result<(), ApplyError> {
        self.lock().add_module(module)
    }

    fn remove_module(&mut self, name: &str) -> Result<(), ApplyError> {
        self.lock().remove_module(name)
    }

    fn replace_module(&mut self, old: &Module, new: &Module) -> Result<(), ApplyError> {
        self.lock().replace_module(old, new)
    }

    fn add_library(&mut self, library: &Library) -> Result<(), ApplyError> {
        self.lock().add_library(library)
    }

    fn remove_library(&mut self, name: &str) -> Result<(), ApplyError> {
        self.lock().remove_library(name)
    }

    fn replace_library(&mut self, old: &Library, new: &Library) -> Result<(), ApplyError> {
        self.lock().replace_library(old, new)
    }

    fn commit_batch(&mut self) -> Result<(), ApplyError> {
        self.lock().commit_batch()
    }

    fn abort_batch(&mut self) {
        self.lock().abort_batch()
    }
}

fn orchestrator(scripts: Vec<Script>, store: &SharedStore) -> SyncOrchestrator {
    SyncOrchestrator::new(
        Arc::new(ScriptedServer::new(scripts)),
        ReconciliationEngine::from_config(SyncConfig::default()),
        Box::new(store.clone()),
    )
}

/// Orchestrator whose engine loads nothing unless asked to.
fn on_demand_orchestrator(scripts: Vec<Script>, store: &SharedStore) -> SyncOrchestrator {
    SyncOrchestrator::new(
        Arc::new(ScriptedServer::new(scripts)),
        ReconciliationEngine::new(
            SyncConfig::default(),
            Box::new(DefaultModuleNameResolver),
            Box::new(LoadNone),
        ),
        Box::new(store.clone()),
    )
}

fn wait_until(timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("timed out waiting for condition");
}

#[test]
fn sync_applies_plan_to_store() {
    let store = SharedStore::default();
    let orchestrator = orchestrator(
        vec![Script::targets(Duration::from_millis(0), vec!["//a", "//b"])],
        &store,
    );
    assert_eq!(orchestrator.status().state, SyncTaskState::Idle);

    let id = orchestrator.enqueue(SyncRequest::default());
    wait_until(Duration::from_secs(5), || {
        orchestrator.status().last_completed_id == Some(id)
    });

    let status = orchestrator.status();
    assert_eq!(status.state, SyncTaskState::Success);
    assert_eq!(status.last_error, None);
    assert_eq!(status.message.as_deref(), Some("sync"));
    assert_eq!(status.queued_at, None);
    let started = status.started_at.expect("started_at");
    let finished = status.last_finished_at.expect("last_finished_at");
    assert!(started <= finished);

    let outcome = orchestrator.last_outcome().expect("outcome");
    assert_eq!(outcome.plan.len(), 2);
    store.with(|store| {
        assert!(store.module("//a").is_some());
        assert!(store.module("//b").is_some());
        assert_eq!(store.revision(), 1);
    });
    assert!(orchestrator.with_engine(|engine| engine.current_graph().is_some()));
}

#[test]
fn enqueue_cancels_running_fetch_and_replaces_queue() {
    let store = SharedStore::default();
    let orchestrator = orchestrator(
        vec![
            Script::targets(Duration::from_millis(300), vec!["//a"]),
            Script::targets(Duration::from_millis(0), vec!["//b"]),
        ],
        &store,
    );

    let first = orchestrator.enqueue(SyncRequest::default());
    wait_until(Duration::from_secs(5), || {
        let status = orchestrator.status();
        status.state == SyncTaskState::Running && status.active_id == Some(first)
    });

    let _replaced = orchestrator.enqueue(SyncRequest::default());
    let last = orchestrator.enqueue(SyncRequest::default());
    assert_eq!(orchestrator.status().queued, 1);

    wait_until(Duration::from_secs(5), || {
        orchestrator.status().last_completed_id == Some(last)
    });

    assert_eq!(orchestrator.status().state, SyncTaskState::Success);
    store.with(|store| {
        assert!(store.module("//a").is_none());
        assert!(store.module("//b").is_some());
        assert_eq!(store.revision(), 1);
    });
}

#[test]
fn fetch_failure_reports_error_and_leaves_store_untouched() {
    let store = SharedStore::default();
    let orchestrator = orchestrator(
        vec![Script {
            delay: Duration::from_millis(0),
            result: Err(FetchError::Failed {
                request: "workspace/buildTargets",
                message: "server crashed".to_string(),
            }),
        }],
        &store,
    );

    let id = orchestrator.enqueue(SyncRequest::default());
    wait_until(Duration::from_secs(5), || {
        orchestrator.status().last_completed_id == Some(id)
    });

    let status = orchestrator.status();
    assert_eq!(status.state, SyncTaskState::Failure);
    assert_eq!(
        status.last_error.as_deref(),
        Some("workspace/buildTargets failed: server crashed")
    );
    assert!(orchestrator.last_outcome().is_none());
    store.with(|store| assert_eq!(store.revision(), 0));
    assert!(orchestrator.with_engine(|engine| engine.current_graph().is_none()));
}

#[test]
fn cancel_stops_cycle_before_apply() {
    let store = SharedStore::default();
    let orchestrator = orchestrator(
        vec![Script::targets(Duration::from_millis(200), vec!["//a"])],
        &store,
    );

    let id = orchestrator.enqueue(SyncRequest::default());
    wait_until(Duration::from_secs(5), || {
        orchestrator.status().state == SyncTaskState::Running
    });
    orchestrator.cancel();

    wait_until(Duration::from_secs(5), || {
        orchestrator.status().last_completed_id == Some(id)
    });
    assert_eq!(orchestrator.status().state, SyncTaskState::Cancelled);
    store.with(|store| {
        assert!(store.graph().is_empty());
        assert_eq!(store.revision(), 0);
    });
}

#[test]
fn applying_cycle_runs_to_completion() {
    let store = SharedStore {
        begin_delay: Duration::from_millis(300),
        ..SharedStore::default()
    };
    let orchestrator = orchestrator(
        vec![
            Script::targets(Duration::from_millis(0), vec!["//a"]),
            Script::targets(Duration::from_millis(0), vec!["//a", "//b"]),
        ],
        &store,
    );

    orchestrator.enqueue(SyncRequest::default());
    wait_until(Duration::from_secs(5), || {
        orchestrator.status().phase == Some(SyncPhase::Applying)
    });

    let second = orchestrator.enqueue(SyncRequest::default());
    wait_until(Duration::from_secs(5), || {
        orchestrator.status().last_completed_id == Some(second)
    });

    assert_eq!(orchestrator.status().state, SyncTaskState::Success);
    store.with(|store| {
        assert!(store.module("//a").is_some());
        assert!(store.module("//b").is_some());
        assert_eq!(store.revision(), 2);
    });
}

#[test]
fn displaced_syncs_keep_their_load_requests() {
    let store = SharedStore::default();
    let orchestrator = on_demand_orchestrator(
        vec![
            Script::targets(Duration::from_millis(300), vec!["//a", "//b", "//c"]),
            Script::targets(Duration::from_millis(0), vec!["//a", "//b", "//c"]),
        ],
        &store,
    );

    let first = orchestrator.enqueue(SyncRequest::new(LoadRequest::load(["//a", "//b"])));
    wait_until(Duration::from_secs(5), || {
        let status = orchestrator.status();
        status.state == SyncTaskState::Running && status.active_id == Some(first)
    });

    orchestrator.enqueue(SyncRequest::new(LoadRequest::unload(["//b"])));
    let last = orchestrator.enqueue(SyncRequest::default());
    let status = orchestrator.status();
    assert_eq!(status.queued, 1);
    assert!(status.queued_at.is_some());

    wait_until(Duration::from_secs(5), || {
        orchestrator.status().last_completed_id == Some(last)
    });
    assert_eq!(orchestrator.status().state, SyncTaskState::Success);
    assert_eq!(
        orchestrator.status().message.as_deref(),
        Some("sync (load 1, unload 1)")
    );

    store.with(|store| {
        assert!(store.module("//a").is_some());
        assert!(store.module("//b").is_none());
        assert!(store.module("//c").is_none());
    });
    let loaded = orchestrator
        .with_engine(|engine| engine.loaded_targets().cloned())
        .expect("loaded set");
    assert!(loaded.contains(&BuildTargetId::new("//a")));
    assert_eq!(loaded.len(), 1);
}

#[test]
fn cancelled_load_request_is_applied_by_the_next_sync() {
    let store = SharedStore::default();
    let orchestrator = on_demand_orchestrator(
        vec![
            Script::targets(Duration::from_millis(200), vec!["//a", "//b"]),
            Script::targets(Duration::from_millis(0), vec!["//a", "//b"]),
        ],
        &store,
    );

    let first = orchestrator.enqueue(SyncRequest::new(LoadRequest::load(["//a"])));
    wait_until(Duration::from_secs(5), || {
        orchestrator.status().state == SyncTaskState::Running
    });
    orchestrator.cancel();
    wait_until(Duration::from_secs(5), || {
        orchestrator.status().last_completed_id == Some(first)
    });
    assert_eq!(orchestrator.status().state, SyncTaskState::Cancelled);

    let next = orchestrator.enqueue(SyncRequest::default());
    wait_until(Duration::from_secs(5), || {
        orchestrator.status().last_completed_id == Some(next)
    });

    assert_eq!(orchestrator.status().state, SyncTaskState::Success);
    store.with(|store| {
        assert!(store.module("//a").is_some());
        assert!(store.module("//b").is_none());
        assert_eq!(store.revision(), 1);
    });
}
