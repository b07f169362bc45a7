//! Build-target snapshot -> normalized module graph.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use nova_bsp_model::protocol::data_kind;
use nova_bsp_model::{
    uri_file_name, uri_is_within, uri_parent, BuildTargetId, JvmBuildTarget, KotlinBuildTarget,
    PythonBuildTarget, SourceItemKind, TargetDescriptor, TargetSnapshot,
};
use nova_config::SyncConfig;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{SyncError, SyncWarning};
use crate::graph::{
    ContentRoot, JdkReference, KotlinAddendum, LanguageAddendum, Library, LibraryDependency,
    Module, ModuleDependency, ModuleGraph, ModuleKind, PythonAddendum, ResourceRoot, SourceRoot,
};
use crate::name::ModuleNameResolver;

/// Graph plus the non-fatal diagnostics collected while building it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformOutput {
    pub graph: ModuleGraph,
    pub warnings: Vec<SyncWarning>,
}

/// Converts a [`TargetSnapshot`] into a [`ModuleGraph`].
///
/// The output depends only on the snapshot contents, the resolver and the configuration; the
/// order of targets inside the snapshot does not matter.
pub struct GraphTransformer<'a> {
    resolver: &'a dyn ModuleNameResolver,
    language_priority: &'a [String],
    project_name: &'a str,
}

/// Typed view of `BuildTarget.data`.
enum TargetData {
    None,
    Jvm(JvmBuildTarget),
    Kotlin(KotlinBuildTarget),
    Python(PythonBuildTarget),
    Extension { data_kind: String, data: Value },
}

impl<'a> GraphTransformer<'a> {
    pub fn new(
        resolver: &'a dyn ModuleNameResolver,
        config: &'a SyncConfig,
        project_name: &'a str,
    ) -> Self {
        Self {
            resolver,
            language_priority: &config.language_priority,
            project_name,
        }
    }

    pub fn transform(&self, snapshot: &TargetSnapshot) -> Result<TransformOutput, SyncError> {
        let mut warnings = Vec::new();

        let mut targets: Vec<&TargetDescriptor> = Vec::with_capacity(snapshot.len());
        let mut seen = HashSet::with_capacity(snapshot.len());
        for target in snapshot.targets() {
            if seen.insert(&target.id) {
                targets.push(target);
            } else {
                warnings.push(SyncWarning::DuplicateTarget {
                    target: target.id.clone(),
                });
            }
        }
        // First occurrence wins above; everything below is order-independent.
        targets.sort_by(|a, b| a.id.cmp(&b.id));

        let mut decoded = Vec::with_capacity(targets.len());
        for target in targets {
            match decode_target_data(target) {
                Ok(data) => decoded.push((target, data)),
                Err(reason) => {
                    tracing::warn!(
                        target: "nova.sync.transform",
                        build_target = %target.id,
                        reason = %reason,
                        "skipping malformed build target"
                    );
                    warnings.push(SyncWarning::MalformedTarget {
                        target: target.id.clone(),
                        reason,
                    });
                }
            }
        }

        let known: BTreeSet<&BuildTargetId> = decoded.iter().map(|(target, _)| &target.id).collect();

        let mut owners = BTreeMap::<String, &BuildTargetId>::new();
        for (target, _) in &decoded {
            let name = self.resolver.resolve(&target.id);
            if let Some(first) = owners.get(&name) {
                return Err(SyncError::NameCollision {
                    name,
                    first: (*first).clone(),
                    second: target.id.clone(),
                });
            }
            owners.insert(name, &target.id);
        }

        let mut graph = ModuleGraph::new();
        let compiler_outputs: BTreeSet<&str> = decoded
            .iter()
            .filter_map(|(target, _)| target.javac_options.as_ref())
            .map(|options| options.class_directory.as_str())
            .filter(|dir| !dir.is_empty())
            .collect();

        for (target, data) in &decoded {
            let module = self.build_module(target, data, &known, &mut graph);
            graph.insert_module(module);
        }

        let library_class_jars: BTreeSet<String> = graph
            .libraries()
            .flat_map(|library| library.class_roots.iter().cloned())
            .collect();
        let classpaths: BTreeMap<&BuildTargetId, &[String]> = decoded
            .iter()
            .filter_map(|(target, _)| {
                target
                    .javac_options
                    .as_ref()
                    .map(|options| (&target.id, options.classpath.as_slice()))
            })
            .collect();
        for module in graph.modules_mut() {
            let Some(classpath) = classpaths.get(&module.target) else {
                continue;
            };
            module.module_libraries =
                module_libraries(classpath, &library_class_jars, &compiler_outputs);
        }

        tracing::debug!(
            target: "nova.sync.transform",
            modules = graph.module_count(),
            libraries = graph.library_count(),
            warnings = warnings.len(),
            "transformed build target snapshot"
        );

        Ok(TransformOutput { graph, warnings })
    }

    fn build_module(
        &self,
        target: &TargetDescriptor,
        data: &TargetData,
        known: &BTreeSet<&BuildTargetId>,
        graph: &mut ModuleGraph,
    ) -> Module {
        let name = self.resolver.resolve(&target.id);
        let mut module = Module::new(name, target.id.clone(), self.module_kind(target));

        for dependency in &target.dependencies {
            if !known.contains(dependency) {
                tracing::debug!(
                    target: "nova.sync.transform",
                    build_target = %target.id,
                    dependency = %dependency,
                    "dropping dependency on target outside the workspace"
                );
                continue;
            }
            let dependency = ModuleDependency::new(self.resolver.resolve(dependency));
            if !module.module_dependencies.contains(&dependency) {
                module.module_dependencies.push(dependency);
            }
        }

        for archive in &target.dependency_sources {
            let library = Library::from_sources_archive(archive);
            let dependency = LibraryDependency::new(library.name.clone());
            if !module.library_dependencies.contains(&dependency) {
                module.library_dependencies.push(dependency);
            }
            graph.insert_library(library);
        }

        module.content_root = content_root(target);
        module.source_roots = source_roots(target);
        module.resource_roots = resource_roots(target);
        module.compiler_output = target
            .javac_options
            .as_ref()
            .map(|options| options.class_directory.clone())
            .filter(|dir| !dir.is_empty());

        let jvm = match data {
            TargetData::Jvm(jvm) => Some(jvm),
            TargetData::Kotlin(kotlin) => kotlin.jvm_build_target.as_ref(),
            _ => None,
        };
        module.jdk = jvm.and_then(|jvm| self.jdk_reference(jvm));

        if let TargetData::Kotlin(kotlin) = data {
            module.associates = kotlin
                .associates
                .iter()
                .map(|id| self.resolver.resolve(id))
                .collect();
        }
        module.addendum = match data {
            TargetData::Kotlin(kotlin) => {
                Some(LanguageAddendum::Kotlin(KotlinAddendum {
                    language_version: kotlin.language_version.clone(),
                    api_version: kotlin.api_version.clone(),
                    kotlinc_options: kotlin.kotlinc_options.clone().unwrap_or_default(),
                }))
            }
            TargetData::Python(python) => Some(LanguageAddendum::Python(PythonAddendum {
                version: python.version.clone(),
                interpreter: python.interpreter.clone(),
                interpreter_options: python_interpreter_options(target),
            })),
            TargetData::None | TargetData::Jvm(_) if target.python_options.is_some() => {
                Some(LanguageAddendum::Python(PythonAddendum {
                    version: None,
                    interpreter: None,
                    interpreter_options: python_interpreter_options(target),
                }))
            }
            TargetData::Extension { data_kind, data } => Some(LanguageAddendum::Extension {
                data_kind: data_kind.clone(),
                data: data.clone(),
            }),
            TargetData::None | TargetData::Jvm(_) => None,
        };

        module
    }

    fn module_kind(&self, target: &TargetDescriptor) -> ModuleKind {
        self.language_priority
            .iter()
            .filter(|language| target.has_language(language))
            .find_map(|language| ModuleKind::for_language(language))
            .unwrap_or(ModuleKind::Generic)
    }

    fn jdk_reference(&self, jvm: &JvmBuildTarget) -> Option<JdkReference> {
        let version = jvm.java_version.as_deref()?.trim();
        if version.is_empty() {
            return None;
        }
        Some(JdkReference {
            name: format!("{}-{version}", self.project_name),
            java_home: jvm.java_home.clone(),
        })
    }
}

fn decode_target_data(target: &TargetDescriptor) -> Result<TargetData, String> {
    let (Some(kind), Some(data)) = (target.data_kind.as_deref(), target.data.as_ref()) else {
        return Ok(TargetData::None);
    };

    fn decode<T: DeserializeOwned>(kind: &str, data: &Value) -> Result<T, String> {
        T::deserialize(data).map_err(|err| format!("invalid `{kind}` data: {err}"))
    }

    Ok(match kind {
        data_kind::JVM => TargetData::Jvm(decode(kind, data)?),
        data_kind::KOTLIN => TargetData::Kotlin(decode(kind, data)?),
        data_kind::PYTHON => TargetData::Python(decode(kind, data)?),
        other => TargetData::Extension {
            data_kind: other.to_string(),
            data: data.clone(),
        },
    })
}

fn python_interpreter_options(target: &TargetDescriptor) -> Vec<String> {
    target
        .python_options
        .as_ref()
        .map(|options| options.interpreter_options.clone())
        .unwrap_or_default()
}

fn normalize_root(uri: &str) -> String {
    let trimmed = uri.trim_end_matches('/');
    if trimmed.is_empty() || trimmed.ends_with(':') {
        uri.to_string()
    } else {
        trimmed.to_string()
    }
}

fn content_root(target: &TargetDescriptor) -> Option<ContentRoot> {
    let base = target.base_directory.as_deref()?;
    let mut excluded: Vec<String> = target
        .sources
        .iter()
        .filter(|source| source.excluded)
        .map(|source| normalize_root(&source.uri))
        .chain(
            target
                .resources
                .iter()
                .filter(|resource| resource.excluded)
                .map(|resource| normalize_root(&resource.uri)),
        )
        .collect();
    excluded.sort();
    excluded.dedup();
    Some(ContentRoot {
        url: normalize_root(base),
        excluded,
    })
}

fn source_roots(target: &TargetDescriptor) -> Vec<SourceRoot> {
    let mut roots: Vec<SourceRoot> = Vec::new();
    for source in target.sources.iter().filter(|source| !source.excluded) {
        let declared = target
            .source_roots
            .iter()
            .find(|root| uri_is_within(&source.uri, root));
        let url = match (declared, source.kind) {
            (Some(root), _) => normalize_root(root),
            (None, SourceItemKind::Directory) => normalize_root(&source.uri),
            (None, SourceItemKind::File) => {
                normalize_root(uri_parent(&source.uri).unwrap_or(&source.uri))
            }
        };
        if roots.iter().all(|root| root.url != url) {
            roots.push(SourceRoot {
                url,
                generated: source.generated,
            });
        }
    }
    roots
}

fn resource_roots(target: &TargetDescriptor) -> Vec<ResourceRoot> {
    let mut roots: Vec<ResourceRoot> = Vec::new();
    for resource in target.resources.iter().filter(|resource| !resource.excluded) {
        // Resources carry no kind: a trailing slash or an extension-less name means a directory.
        let is_file =
            !resource.uri.ends_with('/') && uri_file_name(&resource.uri).contains('.');
        let url = if is_file {
            normalize_root(uri_parent(&resource.uri).unwrap_or(&resource.uri))
        } else {
            normalize_root(&resource.uri)
        };
        if roots.iter().all(|root| root.url != url) {
            roots.push(ResourceRoot { url });
        }
    }
    roots
}

fn module_libraries(
    classpath: &[String],
    library_class_jars: &BTreeSet<String>,
    compiler_outputs: &BTreeSet<&str>,
) -> Vec<Library> {
    let mut libraries: Vec<Library> = Vec::new();
    for entry in classpath {
        if library_class_jars.contains(entry) || compiler_outputs.contains(entry.as_str()) {
            continue;
        }
        let library = Library::from_class_jar(entry);
        match libraries.iter_mut().find(|existing| existing.name == library.name) {
            Some(existing) => existing.merge(library),
            None => libraries.push(library),
        }
    }
    libraries
}
