//! Build Server Protocol data shared by Nova's project sync.
//!
//! This crate holds two layers:
//! - [`protocol`]: the BSP request/response payloads a sync reads (`workspace/buildTargets`,
//!   `buildTarget/sources`, `buildTarget/javacOptions`, ...)
//! - [`TargetSnapshot`]: the immutable, id-joined view of one fetch that the reconciliation engine
//!   consumes

pub mod protocol;
mod snapshot;
mod uri;

pub use crate::{
    protocol::{
        BuildTarget, BuildTargetCapabilities, BuildTargetId, DependencySourcesItem,
        DependencySourcesResult, JavacOptionsItem, JavacOptionsResult, JvmBuildTarget,
        KotlinBuildTarget, PythonBuildTarget, PythonOptionsItem, PythonOptionsResult,
        ResourcesItem, ResourcesResult, ServerCapabilities, SourceItem, SourceItemKind,
        SourcesItem, SourcesResult, WorkspaceBuildTargetsResult,
    },
    snapshot::{
        JvmCompileOptions, ProjectDetails, PythonOptions, ResourceEntry, SourceEntry,
        TargetDescriptor, TargetSnapshot,
    },
    uri::{uri_file_name, uri_is_within, uri_parent},
};
