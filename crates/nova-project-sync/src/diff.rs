use std::collections::BTreeSet;

use serde::Serialize;

use crate::applier::ModelApplier;
use crate::error::ApplyError;
use crate::graph::{Library, Module, ModuleGraph};

/// One idempotent entity mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlanEntry {
    AddModule { module: Module },
    RemoveModule { name: String },
    ReplaceModule { old: Module, new: Module },
    AddLibrary { library: Library },
    RemoveLibrary { name: String },
    ReplaceLibrary { old: Library, new: Library },
}

impl PlanEntry {
    /// Name of the module or library this entry touches.
    pub fn entity_name(&self) -> &str {
        match self {
            PlanEntry::AddModule { module } => &module.name,
            PlanEntry::RemoveModule { name } | PlanEntry::RemoveLibrary { name } => name,
            PlanEntry::ReplaceModule { new, .. } => &new.name,
            PlanEntry::AddLibrary { library } => &library.name,
            PlanEntry::ReplaceLibrary { new, .. } => &new.name,
        }
    }

    pub fn op_name(&self) -> &'static str {
        match self {
            PlanEntry::AddModule { .. } => "add_module",
            PlanEntry::RemoveModule { .. } => "remove_module",
            PlanEntry::ReplaceModule { .. } => "replace_module",
            PlanEntry::AddLibrary { .. } => "add_library",
            PlanEntry::RemoveLibrary { .. } => "remove_library",
            PlanEntry::ReplaceLibrary { .. } => "replace_library",
        }
    }
}

/// Ordered mutations turning one graph into another.
///
/// Entries are ordered: library adds/replaces, module adds/replaces, module removes, library
/// removes; each group sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ApplyPlan {
    entries: Vec<PlanEntry>,
}

impl ApplyPlan {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every entry against `applier` inside one batch.
    ///
    /// The first failing entry aborts the batch and its error is returned.
    pub fn apply_to(&self, applier: &mut dyn ModelApplier) -> Result<(), ApplyError> {
        applier.begin_batch()?;
        for entry in &self.entries {
            let result = match entry {
                PlanEntry::AddModule { module } => applier.add_module(module),
                PlanEntry::RemoveModule { name } => applier.remove_module(name),
                PlanEntry::ReplaceModule { old, new } => applier.replace_module(old, new),
                PlanEntry::AddLibrary { library } => applier.add_library(library),
                PlanEntry::RemoveLibrary { name } => applier.remove_library(name),
                PlanEntry::ReplaceLibrary { old, new } => applier.replace_library(old, new),
            };
            if let Err(err) = result {
                tracing::warn!(
                    target: "nova.sync.engine",
                    op = entry.op_name(),
                    entity = entry.entity_name(),
                    error = %err,
                    "apply failed; aborting batch"
                );
                applier.abort_batch();
                return Err(err);
            }
        }
        applier.commit_batch()
    }
}

impl IntoIterator for ApplyPlan {
    type Item = PlanEntry;
    type IntoIter = std::vec::IntoIter<PlanEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Compute the mutations turning `previous` (or an empty model) into `next`.
///
/// Equal entities are omitted, so `diff(Some(g), g)` is empty.
pub fn diff(previous: Option<&ModuleGraph>, next: &ModuleGraph) -> ApplyPlan {
    let empty = ModuleGraph::new();
    let previous = previous.unwrap_or(&empty);

    let mut entries = Vec::new();

    for library in next.libraries() {
        match previous.library(&library.name) {
            None => entries.push(PlanEntry::AddLibrary {
                library: library.clone(),
            }),
            Some(old) if old != library => entries.push(PlanEntry::ReplaceLibrary {
                old: old.clone(),
                new: library.clone(),
            }),
            Some(_) => {}
        }
    }

    for module in next.modules() {
        match previous.module(&module.name) {
            None => entries.push(PlanEntry::AddModule {
                module: module.clone(),
            }),
            Some(old) if !old.structurally_eq(module) => entries.push(PlanEntry::ReplaceModule {
                old: old.clone(),
                new: module.clone(),
            }),
            Some(_) => {}
        }
    }

    let next_modules: BTreeSet<&str> = next.modules().map(|m| m.name.as_str()).collect();
    for module in previous.modules() {
        if !next_modules.contains(module.name.as_str()) {
            entries.push(PlanEntry::RemoveModule {
                name: module.name.clone(),
            });
        }
    }

    let next_libraries: BTreeSet<&str> = next.libraries().map(|l| l.name.as_str()).collect();
    for library in previous.libraries() {
        if !next_libraries.contains(library.name.as_str()) {
            entries.push(PlanEntry::RemoveLibrary {
                name: library.name.clone(),
            });
        }
    }

    ApplyPlan { entries }
}
