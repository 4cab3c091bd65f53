//! Schema adapter capability and registry.

use std::collections::HashMap;
use std::sync::Arc;

use super::constraint::NativeConstraint;
use crate::error::AdapterError;
use crate::storage::{MemoryStore, SledStore};

/// Native constraint capabilities of a backing store.
///
/// Every method has a no-op default, so a store without native constraints
/// implements the trait with an empty `impl` block.
pub trait SchemaAdapter: Send + Sync {
    /// Check if a constraint with the given name exists on `table`.
    fn constraint_exists(&self, _table: &str, _name: &str) -> Result<bool, AdapterError> {
        Ok(false)
    }

    /// Check if the storage for `table` exists.
    fn storage_exists(&self, _table: &str) -> Result<bool, AdapterError> {
        Ok(false)
    }

    /// Create the constraint. Returns `false` if nothing was created.
    fn create_relationship_constraint(
        &self,
        _constraint: &NativeConstraint,
    ) -> Result<bool, AdapterError> {
        Ok(false)
    }

    /// Drop the constraint. Returns `false` if nothing was dropped.
    fn destroy_relationship_constraint(
        &self,
        _constraint: &NativeConstraint,
    ) -> Result<bool, AdapterError> {
        Ok(false)
    }
}

impl SchemaAdapter for MemoryStore {}

impl SchemaAdapter for SledStore {}

/// Schema adapters by repository name.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn SchemaAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the adapter for a repository, replacing any previous one.
    pub fn register(&mut self, repository: impl Into<String>, adapter: Arc<dyn SchemaAdapter>) {
        self.adapters.insert(repository.into(), adapter);
    }

    /// Builder form of [`AdapterRegistry::register`].
    pub fn with_adapter(
        mut self,
        repository: impl Into<String>,
        adapter: Arc<dyn SchemaAdapter>,
    ) -> Self {
        self.register(repository, adapter);
        self
    }

    /// Get the adapter for a repository.
    pub fn get(&self, repository: &str) -> Option<&dyn SchemaAdapter> {
        self.adapters.get(repository).map(|adapter| adapter.as_ref())
    }

    /// Check if a repository has an adapter.
    pub fn contains(&self, repository: &str) -> bool {
        self.adapters.contains_key(repository)
    }

    /// Number of registered adapters.
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Check if no adapter is registered.
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.adapters.keys().collect();
        names.sort();
        f.debug_struct("AdapterRegistry")
            .field("repositories", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ReferentialAction;

    fn constraint() -> NativeConstraint {
        NativeConstraint {
            name: "comments_article_id_articles_fk".to_string(),
            table: "comments".to_string(),
            columns: vec!["article_id".to_string()],
            referenced_table: "articles".to_string(),
            referenced_columns: vec!["id".to_string()],
            action: ReferentialAction::Cascade,
        }
    }

    #[test]
    fn test_defaults_are_no_ops() {
        let store = MemoryStore::new();
        let c = constraint();
        assert!(!store.constraint_exists(&c.table, &c.name).unwrap());
        assert!(!store.storage_exists(&c.table).unwrap());
        assert!(!store.create_relationship_constraint(&c).unwrap());
        assert!(!store.destroy_relationship_constraint(&c).unwrap());
    }

    #[test]
    fn test_registry_lookup() {
        let registry =
            AdapterRegistry::new().with_adapter("default", Arc::new(MemoryStore::new()));
        assert!(registry.contains("default"));
        assert!(registry.get("default").is_some());
        assert!(registry.get("archive").is_none());
        assert_eq!(registry.len(), 1);
    }
}
