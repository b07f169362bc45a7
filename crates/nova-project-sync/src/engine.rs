use nova_bsp_model::{BuildTargetId, TargetSnapshot};
use nova_config::SyncConfig;

use crate::applier::ModelApplier;
use crate::diff::{diff, ApplyPlan};
use crate::error::{SyncError, SyncWarning};
use crate::graph::ModuleGraph;
use crate::loaded::{
    collapse, policy_from_config, DefaultLoadPolicy, LoadRequest, LoadedSet, LoadedSetTracker,
};
use crate::name::{DefaultModuleNameResolver, ModuleNameResolver};
use crate::transform::GraphTransformer;

const DEFAULT_PROJECT_NAME: &str = "project";

/// Result of [`ReconciliationEngine::prepare`]: the plan plus the state to retain once it has been
/// applied.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct PreparedSync {
    plan: ApplyPlan,
    next: Option<(ModuleGraph, LoadedSet)>,
    warnings: Vec<SyncWarning>,
}

impl PreparedSync {
    pub fn plan(&self) -> &ApplyPlan {
        &self.plan
    }

    pub fn warnings(&self) -> &[SyncWarning] {
        &self.warnings
    }

    /// Graph the engine retains after commit. `None` when there was no snapshot.
    pub fn graph(&self) -> Option<&ModuleGraph> {
        self.next.as_ref().map(|(graph, _)| graph)
    }

    pub fn loaded(&self) -> Option<&LoadedSet> {
        self.next.as_ref().map(|(_, loaded)| loaded)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub plan: ApplyPlan,
    pub warnings: Vec<SyncWarning>,
}

/// Holds the materialized graph between cycles and turns new snapshots into apply plans.
pub struct ReconciliationEngine {
    config: SyncConfig,
    project_name: String,
    resolver: Box<dyn ModuleNameResolver>,
    policy: Box<dyn DefaultLoadPolicy>,
    current: Option<ModuleGraph>,
    tracker: LoadedSetTracker,
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("project_name", &self.project_name)
            .field("modules", &self.current.as_ref().map(ModuleGraph::module_count))
            .field("loaded", &self.tracker.current().map(LoadedSet::len))
            .finish_non_exhaustive()
    }
}

impl ReconciliationEngine {
    pub fn new(
        config: SyncConfig,
        resolver: Box<dyn ModuleNameResolver>,
        policy: Box<dyn DefaultLoadPolicy>,
    ) -> Self {
        let project_name = config
            .project_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string());
        Self {
            config,
            project_name,
            resolver,
            policy,
            current: None,
            tracker: LoadedSetTracker::new(),
        }
    }

    /// Engine using the identity name resolver and the `[sync.default_load]` policy.
    pub fn from_config(config: SyncConfig) -> Self {
        let policy = policy_from_config(&config.default_load);
        Self::new(config, Box::new(DefaultModuleNameResolver), policy)
    }

    /// Seed the loaded set, e.g. with the ids that were loaded before a restart.
    pub fn with_loaded_targets(mut self, ids: impl IntoIterator<Item = BuildTargetId>) -> Self {
        self.tracker = LoadedSetTracker::with_loaded(ids.into_iter().collect());
        self
    }

    /// Resume from a graph materialized by an earlier run. The targets of its modules become the
    /// loaded set.
    pub fn with_previous_graph(mut self, graph: ModuleGraph) -> Self {
        self.tracker = LoadedSetTracker::with_loaded(
            graph
                .modules()
                .map(|module| module.target.clone())
                .collect(),
        );
        self.current = Some(graph);
        self
    }

    pub fn current_graph(&self) -> Option<&ModuleGraph> {
        self.current.as_ref()
    }

    pub fn loaded_targets(&self) -> Option<&LoadedSet> {
        self.tracker.current()
    }

    /// Compute the plan for `snapshot` without changing any state.
    ///
    /// A missing snapshot (failed or cancelled fetch) yields an empty plan and keeps the current
    /// graph.
    pub fn prepare(
        &self,
        snapshot: Option<&TargetSnapshot>,
        request: &LoadRequest,
    ) -> Result<PreparedSync, SyncError> {
        let Some(snapshot) = snapshot else {
            tracing::debug!(
                target: "nova.sync.engine",
                "no snapshot available; keeping current graph"
            );
            return Ok(PreparedSync {
                plan: ApplyPlan::empty(),
                next: None,
                warnings: Vec::new(),
            });
        };

        let (loaded, mut warnings) =
            self.tracker
                .compute_loaded(request, snapshot, self.policy.as_ref());

        let transformer =
            GraphTransformer::new(self.resolver.as_ref(), &self.config, &self.project_name);
        let output = transformer.transform(snapshot)?;
        warnings.extend(output.warnings);

        let graph = collapse(output.graph, &loaded);
        let plan = diff(self.current.as_ref(), &graph);

        tracing::debug!(
            target: "nova.sync.engine",
            targets = snapshot.len(),
            loaded = loaded.len(),
            modules = graph.module_count(),
            entries = plan.len(),
            warnings = warnings.len(),
            "prepared sync plan"
        );

        Ok(PreparedSync {
            plan,
            next: Some((graph, loaded)),
            warnings,
        })
    }

    /// Retain the graph and loaded set of an applied plan.
    pub fn commit(&mut self, prepared: PreparedSync) {
        if let Some((graph, loaded)) = prepared.next {
            self.current = Some(graph);
            self.tracker.commit(loaded);
        }
    }

    /// Prepare, apply as one batch, and commit.
    ///
    /// When applying fails the retained graph and loaded set stay as they were.
    pub fn reconcile(
        &mut self,
        snapshot: Option<&TargetSnapshot>,
        request: &LoadRequest,
        applier: &mut dyn ModelApplier,
    ) -> Result<SyncOutcome, SyncError> {
        let prepared = self.prepare(snapshot, request)?;
        if !prepared.plan.is_empty() {
            prepared.plan.apply_to(applier)?;
        }
        let outcome = SyncOutcome {
            plan: prepared.plan.clone(),
            warnings: prepared.warnings.clone(),
        };
        self.commit(prepared);

        tracing::info!(
            target: "nova.sync.engine",
            entries = outcome.plan.len(),
            warnings = outcome.warnings.len(),
            "sync cycle applied"
        );
        Ok(outcome)
    }
}
