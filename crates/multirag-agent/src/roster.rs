use std::collections::HashMap;
use std::sync::Arc;

use multirag_core::error::{RagError, Result};
use multirag_core::traits::Worker;

use crate::graph::END;

/// Option the oracle answers with to end the run.
pub const FINISH: &str = "FINISH";

/// Step name of the supervisor in the orchestration graph.
pub const ROUTER_STEP: &str = "supervisor";

/// Scope shown for a worker with an empty scope.
pub const DEFAULT_SCOPE: &str = "General purpose agent";

/// Ordered set of retrieval workers available to a run.
#[derive(Default, Clone)]
pub struct Roster {
    workers: Vec<Arc<dyn Worker>>,
    scopes: HashMap<String, String>,
}

impl std::fmt::Debug for Roster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Roster").field("workers", &self.names()).finish()
    }
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a worker at the end of the roster.
    pub fn register(&mut self, worker: Arc<dyn Worker>) -> Result<()> {
        let name = worker.name();
        if name.trim().is_empty() || name == FINISH || name == END || name == ROUTER_STEP {
            return Err(RagError::Config(format!("invalid worker name: '{}'", name)));
        }
        if self.contains(name) {
            return Err(RagError::Config(format!("duplicate worker name: {}", name)));
        }
        self.workers.push(worker);
        Ok(())
    }

    pub fn with_worker(mut self, worker: Arc<dyn Worker>) -> Result<Self> {
        self.register(worker)?;
        Ok(self)
    }

    /// Override the scope shown to the oracle for `name`.
    pub fn set_scope(&mut self, name: impl Into<String>, scope: impl Into<String>) {
        self.scopes.insert(name.into(), scope.into());
    }

    /// Scope override, else the worker's own scope, else `DEFAULT_SCOPE`.
    pub fn scope(&self, name: &str) -> &str {
        if let Some(scope) = self.scopes.get(name) {
            return scope;
        }
        self.get(name)
            .map(|w| w.scope())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_SCOPE)
    }

    pub fn names(&self) -> Vec<&str> {
        self.workers.iter().map(|w| w.name()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workers.iter().any(|w| w.name() == name)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Worker>> {
        self.workers.iter().find(|w| w.name() == name)
    }

    pub fn workers(&self) -> &[Arc<dyn Worker>] {
        &self.workers
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
