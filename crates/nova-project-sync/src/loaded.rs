//! Which targets are materialized as modules, and how the rest are collapsed.

use std::collections::BTreeSet;

use nova_bsp_model::{BuildTargetId, TargetDescriptor, TargetSnapshot};
use nova_config::{DefaultLoadConfig, DefaultLoadMode};
use serde::{Deserialize, Serialize};

use crate::error::SyncWarning;
use crate::graph::{Library, LibraryDependency, ModuleGraph, COLLAPSED_LIBRARY_NAME};

/// Chooses the targets loaded on the first sync, before any explicit request.
pub trait DefaultLoadPolicy: Send + Sync {
    fn select_defaults(&self, targets: &[TargetDescriptor]) -> BTreeSet<BuildTargetId>;
}

impl<F> DefaultLoadPolicy for F
where
    F: Fn(&[TargetDescriptor]) -> BTreeSet<BuildTargetId> + Send + Sync,
{
    fn select_defaults(&self, targets: &[TargetDescriptor]) -> BTreeSet<BuildTargetId> {
        self(targets)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadAll;

impl DefaultLoadPolicy for LoadAll {
    fn select_defaults(&self, targets: &[TargetDescriptor]) -> BTreeSet<BuildTargetId> {
        targets.iter().map(|target| target.id.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadNonTest;

impl DefaultLoadPolicy for LoadNonTest {
    fn select_defaults(&self, targets: &[TargetDescriptor]) -> BTreeSet<BuildTargetId> {
        targets
            .iter()
            .filter(|target| !target.is_test())
            .map(|target| target.id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadNone;

impl DefaultLoadPolicy for LoadNone {
    fn select_defaults(&self, _targets: &[TargetDescriptor]) -> BTreeSet<BuildTargetId> {
        BTreeSet::new()
    }
}

/// Wraps another policy and loads nothing when its selection is larger than `max_targets`.
#[derive(Debug, Clone, Copy)]
pub struct Threshold<P> {
    pub inner: P,
    pub max_targets: usize,
}

impl<P: DefaultLoadPolicy> DefaultLoadPolicy for Threshold<P> {
    fn select_defaults(&self, targets: &[TargetDescriptor]) -> BTreeSet<BuildTargetId> {
        let selected = self.inner.select_defaults(targets);
        if selected.len() > self.max_targets {
            tracing::info!(
                target: "nova.sync.loaded",
                selected = selected.len(),
                max_targets = self.max_targets,
                "default selection exceeds max_targets; loading nothing by default"
            );
            return BTreeSet::new();
        }
        selected
    }
}

/// Build the policy described by `[sync.default_load]`.
pub fn policy_from_config(config: &DefaultLoadConfig) -> Box<dyn DefaultLoadPolicy> {
    fn bounded<P: DefaultLoadPolicy + 'static>(
        inner: P,
        max_targets: Option<usize>,
    ) -> Box<dyn DefaultLoadPolicy> {
        match max_targets {
            Some(max_targets) => Box::new(Threshold { inner, max_targets }),
            None => Box::new(inner),
        }
    }

    match config.mode {
        DefaultLoadMode::All => bounded(LoadAll, config.max_targets),
        DefaultLoadMode::NonTest => bounded(LoadNonTest, config.max_targets),
        DefaultLoadMode::None => Box::new(LoadNone),
    }
}

/// Explicit load/unload request for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadRequest {
    pub load: BTreeSet<BuildTargetId>,
    pub unload: BTreeSet<BuildTargetId>,
}

impl LoadRequest {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn load<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<BuildTargetId>,
    {
        Self {
            load: ids.into_iter().map(Into::into).collect(),
            unload: BTreeSet::new(),
        }
    }

    pub fn unload<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<BuildTargetId>,
    {
        Self {
            load: BTreeSet::new(),
            unload: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.load.is_empty() && self.unload.is_empty()
    }

    /// Fold a later request into this one. A later load of an id drops an earlier unload of it
    /// and the reverse.
    pub fn merge(mut self, later: LoadRequest) -> Self {
        self.load.retain(|id| !later.unload.contains(id));
        self.unload.retain(|id| !later.load.contains(id));
        self.load.extend(later.load);
        self.unload.extend(later.unload);
        self
    }
}

/// Target ids currently materialized as modules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadedSet(BTreeSet<BuildTargetId>);

impl LoadedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &BuildTargetId) -> bool {
        self.0.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuildTargetId> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_superset(&self, other: &LoadedSet) -> bool {
        self.0.is_superset(&other.0)
    }
}

impl<T: Into<BuildTargetId>> FromIterator<T> for LoadedSet {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeSet<BuildTargetId>> for LoadedSet {
    fn from(ids: BTreeSet<BuildTargetId>) -> Self {
        Self(ids)
    }
}

/// Remembers the loaded set between cycles and computes the next one.
#[derive(Debug, Clone, Default)]
pub struct LoadedSetTracker {
    loaded: Option<LoadedSet>,
}

impl LoadedSetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker that behaves as if `loaded` was produced by a previous cycle.
    pub fn with_loaded(loaded: LoadedSet) -> Self {
        Self {
            loaded: Some(loaded),
        }
    }

    pub fn current(&self) -> Option<&LoadedSet> {
        self.loaded.as_ref()
    }

    /// Compute the loaded set for the next cycle without changing the tracker.
    ///
    /// The first cycle starts from the policy defaults; later cycles start from the current set.
    /// Explicit loads are added, explicit unloads removed, and the result is restricted to the
    /// targets in `snapshot`. Nothing is unloaded implicitly.
    pub fn compute_loaded(
        &self,
        request: &LoadRequest,
        snapshot: &TargetSnapshot,
        policy: &dyn DefaultLoadPolicy,
    ) -> (LoadedSet, Vec<SyncWarning>) {
        let all = snapshot.all_target_ids();

        let warnings: Vec<SyncWarning> = request
            .load
            .iter()
            .filter(|id| !all.contains(*id))
            .map(|id| {
                tracing::debug!(
                    target: "nova.sync.loaded",
                    build_target = %id,
                    "ignoring load request for unknown target"
                );
                SyncWarning::UnknownRequestedTarget { target: id.clone() }
            })
            .collect();

        let mut next: BTreeSet<BuildTargetId> = match &self.loaded {
            Some(loaded) => loaded.0.clone(),
            None => policy.select_defaults(snapshot.targets()),
        };
        next.extend(request.load.iter().cloned());
        next.retain(|id| all.contains(id) && !request.unload.contains(id));

        tracing::debug!(
            target: "nova.sync.loaded",
            first_sync = self.loaded.is_none(),
            loaded = next.len(),
            total = all.len(),
            "computed loaded target set"
        );

        (LoadedSet(next), warnings)
    }

    pub fn commit(&mut self, loaded: LoadedSet) {
        self.loaded = Some(loaded);
    }
}

/// Restrict `graph` to loaded targets and fold everything else into the collapsed library.
///
/// Edges from loaded modules to collapsed ones become a dependency on
/// [`COLLAPSED_LIBRARY_NAME`], whose class roots are the compiler outputs of all collapsed
/// modules. Libraries only used by collapsed modules are dropped. When every module is loaded,
/// the graph is returned unchanged.
pub fn collapse(graph: ModuleGraph, loaded: &LoadedSet) -> ModuleGraph {
    let (kept, collapsed): (Vec<_>, Vec<_>) = graph
        .modules()
        .cloned()
        .partition(|module| loaded.contains(&module.target));
    if collapsed.is_empty() {
        return graph;
    }

    let collapsed_names: BTreeSet<&str> =
        collapsed.iter().map(|module| module.name.as_str()).collect();
    let mut class_roots: Vec<String> = collapsed
        .iter()
        .filter_map(|module| module.compiler_output.clone())
        .collect();
    class_roots.sort();
    class_roots.dedup();

    let mut out = ModuleGraph::new();
    for mut module in kept {
        let before = module.module_dependencies.len();
        module
            .module_dependencies
            .retain(|dep| !collapsed_names.contains(dep.module_name.as_str()));
        if module.module_dependencies.len() != before
            && !module.depends_on_library(COLLAPSED_LIBRARY_NAME)
        {
            module
                .library_dependencies
                .push(LibraryDependency::new(COLLAPSED_LIBRARY_NAME));
        }

        for dependency in &module.library_dependencies {
            if let Some(library) = graph.library(&dependency.library_name) {
                out.insert_library(library.clone());
            }
        }
        out.insert_module(module);
    }

    out.insert_library(Library {
        name: COLLAPSED_LIBRARY_NAME.to_string(),
        class_roots,
        source_roots: Vec::new(),
    });

    tracing::debug!(
        target: "nova.sync.loaded",
        loaded = out.module_count(),
        collapsed = collapsed.len(),
        "collapsed not loaded targets"
    );

    out
}
