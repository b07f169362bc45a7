use crate::error::ApplyError;
use crate::graph::{Library, Module, ModuleGraph};

/// Target model store the engine writes to.
///
/// Every operation must be idempotent: adding an entity that already exists replaces it and
/// removing a missing entity succeeds. Calls arrive bracketed by [`ModelApplier::begin_batch`]
/// and either [`ModelApplier::commit_batch`] or [`ModelApplier::abort_batch`].
pub trait ModelApplier: Send {
    fn begin_batch(&mut self) -> Result<(), ApplyError> {
        Ok(())
    }

    fn add_module(&mut self, module: &Module) -> Result<(), ApplyError>;

    fn remove_module(&mut self, name: &str) -> Result<(), ApplyError>;

    fn replace_module(&mut self, old: &Module, new: &Module) -> Result<(), ApplyError>;

    fn add_library(&mut self, library: &Library) -> Result<(), ApplyError>;

    fn remove_library(&mut self, name: &str) -> Result<(), ApplyError>;

    fn replace_library(&mut self, old: &Library, new: &Library) -> Result<(), ApplyError>;

    fn commit_batch(&mut self) -> Result<(), ApplyError> {
        Ok(())
    }

    /// Discard everything since `begin_batch`.
    fn abort_batch(&mut self) {}
}

/// Transactional in-memory store.
///
/// Batches mutate a staged copy that replaces the committed graph on commit. Operations outside a
/// batch apply directly.
#[derive(Debug, Clone, Default)]
pub struct InMemoryModelStore {
    committed: ModuleGraph,
    staged: Option<ModuleGraph>,
    revision: u64,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose committed contents are `graph`.
    pub fn from_graph(graph: ModuleGraph) -> Self {
        Self {
            committed: graph,
            ..Self::default()
        }
    }

    /// Committed contents.
    pub fn graph(&self) -> &ModuleGraph {
        &self.committed
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.committed.module(name)
    }

    pub fn library(&self, name: &str) -> Option<&Library> {
        self.committed.library(name)
    }

    /// Number of committed batches.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn in_batch(&self) -> bool {
        self.staged.is_some()
    }

    fn target(&mut self) -> &mut ModuleGraph {
        self.staged.as_mut().unwrap_or(&mut self.committed)
    }
}

impl ModelApplier for InMemoryModelStore {
    fn begin_batch(&mut self) -> Result<(), ApplyError> {
        if self.staged.is_some() {
            return Err(ApplyError::Batch("batch already in progress".to_string()));
        }
        self.staged = Some(self.committed.clone());
        Ok(())
    }

    fn add_module(&mut self, module: &Module) -> Result<(), ApplyError> {
        self.target().insert_module(module.clone());
        Ok(())
    }

    fn remove_module(&mut self, name: &str) -> Result<(), ApplyError> {
        self.target().remove_module(name);
        Ok(())
    }

    fn replace_module(&mut self, old: &Module, new: &Module) -> Result<(), ApplyError> {
        let target = self.target();
        if old.name != new.name {
            target.remove_module(&old.name);
        }
        target.insert_module(new.clone());
        Ok(())
    }

    fn add_library(&mut self, library: &Library) -> Result<(), ApplyError> {
        let target = self.target();
        target.remove_library(&library.name);
        target.insert_library(library.clone());
        Ok(())
    }

    fn remove_library(&mut self, name: &str) -> Result<(), ApplyError> {
        self.target().remove_library(name);
        Ok(())
    }

    fn replace_library(&mut self, old: &Library, new: &Library) -> Result<(), ApplyError> {
        let target = self.target();
        target.remove_library(&old.name);
        target.remove_library(&new.name);
        target.insert_library(new.clone());
        Ok(())
    }

    fn commit_batch(&mut self) -> Result<(), ApplyError> {
        let staged = self
            .staged
            .take()
            .ok_or_else(|| ApplyError::Batch("no batch in progress".to_string()))?;
        self.committed = staged;
        self.revision += 1;
        Ok(())
    }

    fn abort_batch(&mut self) {
        self.staged = None;
    }
}
