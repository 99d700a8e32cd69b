//! Named workflow lookup for `workflow_ref` invocations.
//!
//! Loading, saving and discovering workflows on disk belongs to the embedding
//! application; the engine only needs to turn a name into an IR document.

use std::path::Path;

use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use pathflow_types::WorkflowIr;

use crate::load_workflow_file;

/// Resolves workflow names to IR documents.
pub trait WorkflowStore: Send + Sync {
    fn load(&self, name: &str) -> Result<WorkflowIr>;
}

/// Workflow catalogue held in memory, keyed by name in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkflowStore {
    workflows: IndexMap<String, WorkflowIr>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a workflow, replacing any earlier one with the same name.
    pub fn insert(&mut self, name: impl Into<String>, ir: WorkflowIr) -> &mut Self {
        self.workflows.insert(name.into(), ir);
        self
    }

    /// Loads every `*.json`, `*.yaml` and `*.yml` file in `directory`, named by file stem.
    pub fn from_directory(directory: impl AsRef<Path>) -> Result<Self> {
        let directory = directory.as_ref();
        let mut store = Self::new();
        let entries = std::fs::read_dir(directory).with_context(|| format!("read workflow directory {}", directory.display()))?;
        let mut paths = entries
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<std::io::Result<Vec<_>>>()
            .with_context(|| format!("list workflow directory {}", directory.display()))?;
        paths.sort();

        for path in paths {
            let is_workflow_file = path
                .extension()
                .and_then(|extension| extension.to_str())
                .is_some_and(|extension| matches!(extension, "json" | "yaml" | "yml"));
            if !is_workflow_file {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()).map(str::to_string) else {
                continue;
            };
            if store.workflows.contains_key(&name) {
                bail!("duplicate workflow name detected: '{name}'");
            }
            let ir = load_workflow_file(&path)?;
            store.workflows.insert(name, ir);
        }

        Ok(store)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.workflows.keys().map(String::as_str)
    }
}

impl WorkflowStore for InMemoryWorkflowStore {
    fn load(&self, name: &str) -> Result<WorkflowIr> {
        match self.workflows.get(name) {
            Some(ir) => Ok(ir.clone()),
            None => {
                let known = self.names().collect::<Vec<_>>().join(", ");
                bail!("workflow '{name}' not found (known workflows: {known})")
            }
        }
    }
}
