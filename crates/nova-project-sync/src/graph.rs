//! The normalized module graph produced by one sync cycle.
//!
//! Everything here is plain data: the graph is rebuilt from scratch on every cycle and handed to a
//! [`crate::ModelApplier`] as tagged records.

use std::collections::BTreeMap;
use std::fmt;

use nova_bsp_model::{uri_file_name, BuildTargetId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Namespace prefix of every library derived from build-server data.
pub const LIBRARY_NAME_PREFIX: &str = "BSP: ";

/// Name of the synthetic library standing in for all targets that are not loaded.
pub const COLLAPSED_LIBRARY_NAME: &str = "BSP: not loaded targets";

const ARCHIVE_EXTENSIONS: &[&str] = &[".srcjar", ".jar", ".zip", ".aar"];
const SOURCES_SUFFIX: &str = "-sources";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModuleKind {
    #[serde(rename = "JAVA_MODULE")]
    Java,
    #[serde(rename = "PYTHON_MODULE")]
    Python,
    #[serde(rename = "GENERIC_MODULE")]
    Generic,
}

impl ModuleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleKind::Java => "JAVA_MODULE",
            ModuleKind::Python => "PYTHON_MODULE",
            ModuleKind::Generic => "GENERIC_MODULE",
        }
    }

    /// Module kind for a BSP language id, if the id maps to one.
    pub fn for_language(language_id: &str) -> Option<Self> {
        match language_id {
            "java" | "kotlin" | "scala" => Some(ModuleKind::Java),
            "python" => Some(ModuleKind::Python),
            _ => None,
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleDependency {
    pub module_name: String,
}

impl ModuleDependency {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryDependency {
    pub library_name: String,
}

impl LibraryDependency {
    pub fn new(library_name: impl Into<String>) -> Self {
        Self {
            library_name: library_name.into(),
        }
    }
}

/// A library entity. Identity is the name alone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Library {
    pub name: String,
    #[serde(default)]
    pub class_roots: Vec<String>,
    #[serde(default)]
    pub source_roots: Vec<String>,
}

impl Library {
    /// Library for a dependency-sources archive
    /// (`.../test1-1.0.0-sources.jar` -> `BSP: test1-1.0.0`).
    pub fn from_sources_archive(uri: &str) -> Self {
        Self {
            name: library_name_for_archive(uri),
            class_roots: vec![class_jar_for_sources(uri)],
            source_roots: vec![uri.to_string()],
        }
    }

    /// Library for a plain class jar found on a compiler classpath.
    pub fn from_class_jar(uri: &str) -> Self {
        Self {
            name: library_name_for_archive(uri),
            class_roots: vec![uri.to_string()],
            source_roots: Vec::new(),
        }
    }

    /// Merge roots of another library with the same name. Roots stay sorted and unique so the
    /// result does not depend on merge order.
    pub fn merge(&mut self, other: Library) {
        debug_assert_eq!(self.name, other.name);
        self.class_roots.extend(other.class_roots);
        self.source_roots.extend(other.source_roots);
        self.normalize();
    }

    pub(crate) fn normalize(&mut self) {
        self.class_roots.sort();
        self.class_roots.dedup();
        self.source_roots.sort();
        self.source_roots.dedup();
    }
}

/// Deterministic library name for an archive URI: file name without directory, archive extension
/// and `-sources` suffix, prefixed with [`LIBRARY_NAME_PREFIX`].
pub fn library_name_for_archive(uri: &str) -> String {
    let stem = strip_sources_suffix(archive_stem(uri_file_name(uri)));
    format!("{LIBRARY_NAME_PREFIX}{stem}")
}

/// Class jar matching a sources archive: the `-sources` infix removed. URIs without the infix
/// are returned unchanged.
pub fn class_jar_for_sources(uri: &str) -> String {
    let file_name = uri_file_name(uri);
    let stem = archive_stem(file_name);
    let Some(class_stem) = stem.strip_suffix(SOURCES_SUFFIX) else {
        return uri.to_string();
    };
    let Some(name_start) = uri.rfind(file_name) else {
        return uri.to_string();
    };
    let extension = &file_name[stem.len()..];
    let extension = if extension == ".srcjar" { ".jar" } else { extension };
    format!("{}{class_stem}{extension}", &uri[..name_start])
}

fn archive_stem(file_name: &str) -> &str {
    ARCHIVE_EXTENSIONS
        .iter()
        .find_map(|ext| file_name.strip_suffix(ext))
        .unwrap_or(file_name)
}

fn strip_sources_suffix(stem: &str) -> &str {
    stem.strip_suffix(SOURCES_SUFFIX).unwrap_or(stem)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRoot {
    pub url: String,
    #[serde(default)]
    pub excluded: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRoot {
    pub url: String,
    #[serde(default)]
    pub generated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRoot {
    pub url: String,
}

/// JDK the module compiles against; `name` is `<project>-<javaVersion>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JdkReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_home: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KotlinAddendum {
    pub language_version: String,
    pub api_version: String,
    #[serde(default)]
    pub kotlinc_options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PythonAddendum {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
    #[serde(default)]
    pub interpreter_options: Vec<String>,
}

/// Language-specific side data attached to a module verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "language", rename_all = "snake_case")]
pub enum LanguageAddendum {
    Kotlin(KotlinAddendum),
    Python(PythonAddendum),
    /// Data of a `dataKind` the transformer does not interpret.
    Extension { data_kind: String, data: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub target: BuildTargetId,
    pub kind: ModuleKind,
    #[serde(default)]
    pub module_dependencies: Vec<ModuleDependency>,
    #[serde(default)]
    pub library_dependencies: Vec<LibraryDependency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_root: Option<ContentRoot>,
    #[serde(default)]
    pub source_roots: Vec<SourceRoot>,
    #[serde(default)]
    pub resource_roots: Vec<ResourceRoot>,
    /// Classpath jars private to this module.
    #[serde(default)]
    pub module_libraries: Vec<Library>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jdk: Option<JdkReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addendum: Option<LanguageAddendum>,
    /// Module names whose internal declarations are visible to this module.
    #[serde(default)]
    pub associates: Vec<String>,
}

impl Module {
    pub fn new(name: impl Into<String>, target: BuildTargetId, kind: ModuleKind) -> Self {
        Self {
            name: name.into(),
            target,
            kind,
            module_dependencies: Vec::new(),
            library_dependencies: Vec::new(),
            content_root: None,
            source_roots: Vec::new(),
            resource_roots: Vec::new(),
            module_libraries: Vec::new(),
            compiler_output: None,
            jdk: None,
            addendum: None,
            associates: Vec::new(),
        }
    }

    /// Equality that ignores the order of dependency-like lists.
    ///
    /// Source roots stay order-sensitive: their order decides lookup precedence.
    pub fn structurally_eq(&self, other: &Module) -> bool {
        self.normalized() == other.normalized()
    }

    fn normalized(&self) -> Module {
        let mut out = self.clone();
        out.module_dependencies.sort();
        out.library_dependencies.sort();
        out.module_libraries.sort();
        out.associates.sort();
        if let Some(content_root) = out.content_root.as_mut() {
            content_root.excluded.sort();
        }
        out.resource_roots.sort_by(|a, b| a.url.cmp(&b.url));
        out
    }

    pub fn depends_on_module(&self, name: &str) -> bool {
        self.module_dependencies
            .iter()
            .any(|dep| dep.module_name == name)
    }

    pub fn depends_on_library(&self, name: &str) -> bool {
        self.library_dependencies
            .iter()
            .any(|dep| dep.library_name == name)
    }
}

/// Name-keyed module and library tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleGraph {
    #[serde(default)]
    modules: BTreeMap<String, Module>,
    #[serde(default)]
    libraries: BTreeMap<String, Library>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty() && self.libraries.is_empty()
    }

    /// Modules in name order.
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    /// Libraries in name order.
    pub fn libraries(&self) -> impl Iterator<Item = &Library> {
        self.libraries.values()
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn library(&self, name: &str) -> Option<&Library> {
        self.libraries.get(name)
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn library_count(&self) -> usize {
        self.libraries.len()
    }

    /// Insert or replace a module, returning the previous value with the same name.
    pub fn insert_module(&mut self, module: Module) -> Option<Module> {
        self.modules.insert(module.name.clone(), module)
    }

    /// Insert a library, merging roots into an existing library of the same name.
    pub fn insert_library(&mut self, mut library: Library) {
        match self.libraries.get_mut(&library.name) {
            Some(existing) => existing.merge(library),
            None => {
                library.normalize();
                self.libraries.insert(library.name.clone(), library);
            }
        }
    }

    pub fn remove_module(&mut self, name: &str) -> Option<Module> {
        self.modules.remove(name)
    }

    pub fn remove_library(&mut self, name: &str) -> Option<Library> {
        self.libraries.remove(name)
    }

    pub(crate) fn modules_mut(&mut self) -> impl Iterator<Item = &mut Module> {
        self.modules.values_mut()
    }

    /// Graph equality using [`Module::structurally_eq`] for modules.
    pub fn structurally_eq(&self, other: &ModuleGraph) -> bool {
        self.libraries == other.libraries
            && self.modules.len() == other.modules.len()
            && self.modules.iter().all(|(name, module)| {
                other
                    .modules
                    .get(name)
                    .is_some_and(|other| module.structurally_eq(other))
            })
    }
}
