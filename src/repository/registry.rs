//! Explicit entity kind -> repository lookup handed to the engine

use super::{EntityKind, EntityRepository, StoreError, StoreResult, TableRepository, TableSchema};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct RepositoryRegistry {
    repositories: HashMap<EntityKind, Arc<dyn EntityRepository>>,
}

impl RepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a repository under the kind declared by its schema, replacing any previous one
    pub fn register(&mut self, repository: Arc<dyn EntityRepository>) {
        let kind = repository.schema().kind.clone();
        if self.repositories.insert(kind.clone(), repository).is_some() {
            log::warn!("Replaced repository for entity kind '{}'", kind);
        }
    }

    /// Register the SQLite repository for a table
    pub fn register_table(&mut self, schema: TableSchema) -> StoreResult<()> {
        self.register(Arc::new(TableRepository::new(schema)?));
        Ok(())
    }

    pub fn get(&self, kind: &EntityKind) -> StoreResult<Arc<dyn EntityRepository>> {
        self.repositories
            .get(kind)
            .cloned()
            .ok_or_else(|| StoreError::UnknownKind(kind.clone()))
    }

    pub fn contains(&self, kind: &EntityKind) -> bool {
        self.repositories.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&EntityKind> {
        let mut kinds: Vec<&EntityKind> = self.repositories.keys().collect();
        kinds.sort();
        kinds
    }
}
