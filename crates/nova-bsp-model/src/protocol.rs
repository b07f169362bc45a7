//! Build Server Protocol payloads consumed by project sync.
//!
//! Only the subset of BSP 2.x needed to describe a workspace is modelled here. Every struct
//! tolerates missing optional fields (`#[serde(default)]`) because servers differ wildly in
//! what they populate.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// BSP build target identifier. The URI is opaque and stable across fetches.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BuildTargetId {
    pub uri: String,
}

impl BuildTargetId {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.uri
    }
}

impl fmt::Display for BuildTargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

impl From<&str> for BuildTargetId {
    fn from(uri: &str) -> Self {
        Self::new(uri)
    }
}

impl From<String> for BuildTargetId {
    fn from(uri: String) -> Self {
        Self { uri }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTargetCapabilities {
    #[serde(default)]
    pub can_compile: bool,
    #[serde(default)]
    pub can_test: bool,
    #[serde(default)]
    pub can_run: bool,
    #[serde(default)]
    pub can_debug: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTarget {
    pub id: BuildTargetId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_directory: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub language_ids: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<BuildTargetId>,
    #[serde(default)]
    pub capabilities: BuildTargetCapabilities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl BuildTarget {
    pub fn new(id: impl Into<BuildTargetId>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            base_directory: None,
            tags: Vec::new(),
            language_ids: Vec::new(),
            dependencies: Vec::new(),
            capabilities: BuildTargetCapabilities::default(),
            data_kind: None,
            data: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceBuildTargetsResult {
    pub targets: Vec<BuildTarget>,
}

/// `SourceItemKind` is an integer enum on the wire (`1` = file, `2` = directory).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SourceItemKind {
    File,
    Directory,
}

impl TryFrom<u8> for SourceItemKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::File),
            2 => Ok(Self::Directory),
            other => Err(format!("unknown source item kind {other}")),
        }
    }
}

impl From<SourceItemKind> for u8 {
    fn from(value: SourceItemKind) -> Self {
        match value {
            SourceItemKind::File => 1,
            SourceItemKind::Directory => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceItem {
    pub uri: String,
    pub kind: SourceItemKind,
    #[serde(default)]
    pub generated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesItem {
    pub target: BuildTargetId,
    #[serde(default)]
    pub sources: Vec<SourceItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesResult {
    pub items: Vec<SourcesItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcesItem {
    pub target: BuildTargetId,
    #[serde(default)]
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcesResult {
    pub items: Vec<ResourcesItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySourcesItem {
    pub target: BuildTargetId,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySourcesResult {
    pub items: Vec<DependencySourcesItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JavacOptionsItem {
    pub target: BuildTargetId,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub classpath: Vec<String>,
    #[serde(default)]
    pub class_directory: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JavacOptionsResult {
    pub items: Vec<JavacOptionsItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PythonOptionsItem {
    pub target: BuildTargetId,
    #[serde(default)]
    pub interpreter_options: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PythonOptionsResult {
    pub items: Vec<PythonOptionsItem>,
}

/// The parts of `build/initialize`'s server capabilities that decide which sub-queries a sync
/// is allowed to issue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    #[serde(default)]
    pub resources_provider: bool,
    #[serde(default)]
    pub dependency_sources_provider: bool,
    #[serde(default)]
    pub inverse_sources_provider: bool,
}

/// `dataKind = "jvm"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JvmBuildTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_home: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_version: Option<String>,
}

/// `dataKind = "kotlin"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KotlinBuildTarget {
    pub language_version: String,
    pub api_version: String,
    #[serde(default)]
    pub kotlinc_options: Option<Vec<String>>,
    #[serde(default)]
    pub associates: Vec<BuildTargetId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jvm_build_target: Option<JvmBuildTarget>,
}

/// `dataKind = "python"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PythonBuildTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
}

/// Well-known `BuildTarget.dataKind` values.
pub mod data_kind {
    pub const JVM: &str = "jvm";
    pub const KOTLIN: &str = "kotlin";
    pub const PYTHON: &str = "python";
}
