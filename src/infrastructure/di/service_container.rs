//! Service container for dependency injection
//!
//! Wires settings and one store into all services.

use std::sync::Arc;

use crate::application::services::{
    ConsistencyInspector, RepairEngine, TreeMutator, TreeQueries,
};
use crate::config::Settings;
use crate::infrastructure::traits::{InspectionStore, NodeStore};
use crate::infrastructure::{InfraResult, MemoryStore, SqliteStore};

/// Container holding settings and the store shared by all services.
///
/// One store backs both traits so that inspections are written inside the
/// same transactions as the rows they describe.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    nodes: Arc<dyn NodeStore>,
    inspections: Arc<dyn InspectionStore>,
}

impl ServiceContainer {
    /// Open the SQLite database named in the settings.
    pub fn new(settings: Settings) -> InfraResult<Self> {
        let store = Arc::new(SqliteStore::open(&settings.database, &settings.entity)?);
        Ok(Self::with_store(settings, store))
    }

    /// Container over an in-memory store (for testing and embedding).
    pub fn in_memory(settings: Settings) -> Self {
        let store = Arc::new(MemoryStore::new(settings.entity.clone()));
        Self::with_store(settings, store)
    }

    /// Create a service container with a custom store.
    pub fn with_store<S>(settings: Settings, store: Arc<S>) -> Self
    where
        S: NodeStore + InspectionStore + 'static,
    {
        let nodes: Arc<dyn NodeStore> = store.clone();
        let inspections: Arc<dyn InspectionStore> = store;
        Self {
            settings: Arc::new(settings),
            nodes,
            inspections,
        }
    }

    pub fn nodes(&self) -> Arc<dyn NodeStore> {
        Arc::clone(&self.nodes)
    }

    pub fn mutator(&self) -> TreeMutator {
        TreeMutator::new(self.nodes())
    }

    pub fn inspector(&self) -> ConsistencyInspector {
        ConsistencyInspector::new(
            self.nodes(),
            Arc::clone(&self.inspections),
            self.settings.inspect.clone(),
        )
    }

    pub fn repair_engine(&self) -> RepairEngine {
        RepairEngine::new(
            self.nodes(),
            Arc::clone(&self.inspections),
            self.inspector(),
            self.settings.repair.clone(),
        )
    }

    pub fn queries(&self) -> TreeQueries {
        TreeQueries::new(self.nodes(), self.settings.inspect.page_size)
    }
}
