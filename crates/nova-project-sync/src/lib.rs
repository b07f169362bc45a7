//! BSP project model reconciliation for Nova.
//!
//! A sync cycle turns a [`nova_bsp_model::TargetSnapshot`] into a normalized [`ModuleGraph`],
//! folds unloaded targets into one synthetic library, and diffs the result against the graph of
//! the previous cycle:
//! - [`GraphTransformer`]: snapshot to module graph (edges resolved, libraries de-duplicated)
//! - [`LoadedSetTracker`] and [`collapse`]: which targets become modules
//! - [`diff`] / [`ApplyPlan`]: ordered, idempotent mutations for a [`ModelApplier`]
//! - [`ReconciliationEngine`]: keeps the previous graph between cycles
//! - [`SyncOrchestrator`]: fetch, plan and apply on a worker thread with cancellation

mod applier;
mod diff;
mod engine;
mod error;
mod fetch;
mod graph;
mod loaded;
mod name;
mod orchestrator;
mod transform;

pub use crate::{
    applier::{InMemoryModelStore, ModelApplier},
    diff::{diff, ApplyPlan, PlanEntry},
    engine::{PreparedSync, ReconciliationEngine, SyncOutcome},
    error::{ApplyError, ApplyOperation, FetchError, SyncError, SyncWarning},
    fetch::{collect_project_details, fetch_snapshot, BuildServer},
    graph::{
        class_jar_for_sources, library_name_for_archive, ContentRoot, JdkReference,
        KotlinAddendum, LanguageAddendum, Library, LibraryDependency, Module, ModuleDependency,
        ModuleGraph, ModuleKind, PythonAddendum, ResourceRoot, SourceRoot, COLLAPSED_LIBRARY_NAME,
        LIBRARY_NAME_PREFIX,
    },
    loaded::{
        collapse, policy_from_config, DefaultLoadPolicy, LoadAll, LoadNonTest, LoadNone,
        LoadRequest, LoadedSet, LoadedSetTracker, Threshold,
    },
    name::{DefaultModuleNameResolver, ModuleNameResolver},
    orchestrator::{
        SyncOrchestrator, SyncPhase, SyncRequest, SyncStatusSnapshot, SyncTaskId, SyncTaskState,
    },
    transform::{GraphTransformer, TransformOutput},
};
