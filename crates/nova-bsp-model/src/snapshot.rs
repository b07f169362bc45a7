use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::{
    BuildTarget, BuildTargetCapabilities, BuildTargetId, DependencySourcesItem, JavacOptionsItem,
    PythonOptionsItem, ResourcesItem, SourceItemKind, SourcesItem,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub uri: String,
    pub kind: SourceItemKind,
    #[serde(default)]
    pub generated: bool,
    /// Excluded entries become excluded paths of the module's content root instead of roots.
    #[serde(default)]
    pub excluded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub uri: String,
    #[serde(default)]
    pub excluded: bool,
}

/// Compiler options reported by `buildTarget/javacOptions`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JvmCompileOptions {
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub classpath: Vec<String>,
    /// Compiler output URI. Empty when the server does not report one.
    #[serde(default)]
    pub class_directory: String,
}

impl From<JavacOptionsItem> for JvmCompileOptions {
    fn from(item: JavacOptionsItem) -> Self {
        Self {
            options: item.options,
            classpath: item.classpath,
            class_directory: item.class_directory,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PythonOptions {
    #[serde(default)]
    pub interpreter_options: Vec<String>,
}

/// Everything the build server reported about a single target, joined by target id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDescriptor {
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
    pub capabilities: BuildTargetCapabilities,
    #[serde(default)]
    pub dependencies: Vec<BuildTargetId>,
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
    /// Source roots declared by the server (`SourcesItem.roots`).
    #[serde(default)]
    pub source_roots: Vec<String>,
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
    #[serde(default)]
    pub dependency_sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub javac_options: Option<JvmCompileOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_options: Option<PythonOptions>,
    /// Raw `BuildTarget.dataKind` / `BuildTarget.data`; decoded during transformation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl TargetDescriptor {
    pub fn new(id: impl Into<BuildTargetId>) -> Self {
        Self::from_build_target(BuildTarget::new(id))
    }

    pub fn from_build_target(target: BuildTarget) -> Self {
        Self {
            id: target.id,
            display_name: target.display_name,
            base_directory: target.base_directory,
            tags: target.tags,
            language_ids: target.language_ids,
            capabilities: target.capabilities,
            dependencies: target.dependencies,
            sources: Vec::new(),
            source_roots: Vec::new(),
            resources: Vec::new(),
            dependency_sources: Vec::new(),
            javac_options: None,
            python_options: None,
            data_kind: target.data_kind,
            data: target.data,
        }
    }

    pub fn has_language(&self, language_id: &str) -> bool {
        self.language_ids.iter().any(|id| id == language_id)
    }

    /// Test targets are recognized by the `canTest` capability or an explicit `test` tag.
    pub fn is_test(&self) -> bool {
        self.capabilities.can_test || self.tags.iter().any(|tag| tag == "test")
    }

    fn add_sources(&mut self, item: SourcesItem) {
        self.sources
            .extend(item.sources.into_iter().map(|source| SourceEntry {
                uri: source.uri,
                kind: source.kind,
                generated: source.generated,
                excluded: false,
            }));
        for root in item.roots.unwrap_or_default() {
            if !self.source_roots.contains(&root) {
                self.source_roots.push(root);
            }
        }
    }

    fn add_resources(&mut self, item: ResourcesItem) {
        self.resources
            .extend(item.resources.into_iter().map(|uri| ResourceEntry {
                uri,
                excluded: false,
            }));
    }

    fn add_dependency_sources(&mut self, item: DependencySourcesItem) {
        self.dependency_sources.extend(item.sources);
    }
}

/// Raw results of one sync fetch, before they are joined by target id.
///
/// Serialized as one JSON object holding the `items`/`targets` arrays of each response, which is
/// the format `nova-sync plan --snapshot` reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetails {
    #[serde(default)]
    pub targets: Vec<BuildTarget>,
    #[serde(default)]
    pub sources: Vec<SourcesItem>,
    #[serde(default)]
    pub resources: Vec<ResourcesItem>,
    #[serde(default)]
    pub dependency_sources: Vec<DependencySourcesItem>,
    #[serde(default)]
    pub javac_options: Vec<JavacOptionsItem>,
    #[serde(default)]
    pub python_options: Vec<PythonOptionsItem>,
}

/// Immutable capture of one protocol round-trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetSnapshot {
    targets: Vec<TargetDescriptor>,
}

impl TargetSnapshot {
    pub fn new(targets: Vec<TargetDescriptor>) -> Self {
        Self { targets }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Join the per-request result items onto their targets.
    ///
    /// Duplicate target rows keep their first occurrence. Items that reference a target id the
    /// server did not list in `workspace/buildTargets` are dropped.
    pub fn from_project_details(details: ProjectDetails) -> Self {
        let mut targets = Vec::with_capacity(details.targets.len());
        let mut index = HashMap::<BuildTargetId, usize>::with_capacity(details.targets.len());

        for target in details.targets {
            if index.contains_key(&target.id) {
                tracing::debug!(
                    target: "nova.bsp.model",
                    build_target = %target.id,
                    "duplicate build target in workspace/buildTargets; keeping first"
                );
                continue;
            }
            index.insert(target.id.clone(), targets.len());
            targets.push(TargetDescriptor::from_build_target(target));
        }

        fn slot<'a>(
            targets: &'a mut [TargetDescriptor],
            index: &HashMap<BuildTargetId, usize>,
            id: &BuildTargetId,
            request: &'static str,
        ) -> Option<&'a mut TargetDescriptor> {
            match index.get(id) {
                Some(&idx) => targets.get_mut(idx),
                None => {
                    tracing::debug!(
                        target: "nova.bsp.model",
                        build_target = %id,
                        request,
                        "ignoring result item for unknown build target"
                    );
                    None
                }
            }
        }

        for item in details.sources {
            if let Some(target) = slot(&mut targets, &index, &item.target, "buildTarget/sources") {
                target.add_sources(item);
            }
        }
        for item in details.resources {
            if let Some(target) = slot(&mut targets, &index, &item.target, "buildTarget/resources")
            {
                target.add_resources(item);
            }
        }
        for item in details.dependency_sources {
            if let Some(target) = slot(
                &mut targets,
                &index,
                &item.target,
                "buildTarget/dependencySources",
            ) {
                target.add_dependency_sources(item);
            }
        }
        for item in details.javac_options {
            if let Some(target) = slot(
                &mut targets,
                &index,
                &item.target,
                "buildTarget/javacOptions",
            ) {
                target.javac_options = Some(item.into());
            }
        }
        for item in details.python_options {
            if let Some(target) = slot(
                &mut targets,
                &index,
                &item.target,
                "buildTarget/pythonOptions",
            ) {
                target.python_options = Some(PythonOptions {
                    interpreter_options: item.interpreter_options,
                });
            }
        }

        Self { targets }
    }

    pub fn targets(&self) -> &[TargetDescriptor] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn get(&self, id: &BuildTargetId) -> Option<&TargetDescriptor> {
        self.targets.iter().find(|target| &target.id == id)
    }

    /// `allTargetsIds`: every target id present in this snapshot.
    pub fn all_target_ids(&self) -> BTreeSet<BuildTargetId> {
        self.targets.iter().map(|target| target.id.clone()).collect()
    }
}

impl FromIterator<TargetDescriptor> for TargetSnapshot {
    fn from_iter<I: IntoIterator<Item = TargetDescriptor>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
