//! Model lifecycle entry points.

use std::sync::Arc;

use tracing::instrument;

use crate::cascade::{DeletionContext, DeletionPolicyEngine, DeletionReport};
use crate::catalog::ModelRegistry;
use crate::config::ConstraintConfig;
use crate::error::{ConfigurationError, Error, StoreError};
use crate::schema::{AdapterRegistry, MigrationStep, SchemaAdapter, SchemaConstraintManager};
use crate::storage::{Persistence, Record, UnitOfWork, Value};

/// Constraint enforcement for one registry of models and one record store.
pub struct Constraints<P: Persistence + ?Sized> {
    registry: Arc<ModelRegistry>,
    store: Arc<P>,
    adapters: AdapterRegistry,
    config: ConstraintConfig,
}

impl<P: Persistence + ?Sized> Constraints<P> {
    /// Create with the default configuration and no schema adapters.
    pub fn new(registry: impl Into<Arc<ModelRegistry>>, store: Arc<P>) -> Self {
        Self {
            registry: registry.into(),
            store,
            adapters: AdapterRegistry::new(),
            config: ConstraintConfig::default(),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: ConstraintConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Register the schema adapter of a repository.
    pub fn with_adapter(
        mut self,
        repository: impl Into<String>,
        adapter: Arc<dyn SchemaAdapter>,
    ) -> Self {
        self.adapters.register(repository, adapter);
        self
    }

    /// Register the record store as the configured repository's schema adapter.
    pub fn with_store_adapter(mut self) -> Self
    where
        P: SchemaAdapter + Sized + 'static,
    {
        let adapter: Arc<dyn SchemaAdapter> = self.store.clone();
        self.adapters.register(self.config.repository.clone(), adapter);
        self
    }

    /// The model registry.
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// The record store.
    pub fn store(&self) -> &P {
        &self.store
    }

    /// The active configuration.
    pub fn config(&self) -> &ConstraintConfig {
        &self.config
    }

    /// The registered schema adapters.
    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    /// The deletion policy engine.
    pub fn engine(&self) -> DeletionPolicyEngine<'_> {
        DeletionPolicyEngine::new(&self.registry, &self.config)
    }

    /// The schema constraint manager for the configured repository.
    pub fn schema(&self) -> SchemaConstraintManager<'_> {
        SchemaConstraintManager::new(&self.registry, &self.adapters, &self.config)
    }

    /// Delete a record, enforcing the constraint policies of its relations.
    pub fn destroy(&self, record: &Record) -> Result<DeletionReport, Error> {
        self.destroy_with_loaded(record, &mut [])
    }

    /// Delete a record and keep already loaded dependents in sync.
    ///
    /// Instances in `loaded` whose foreign key is nulled in storage get the
    /// same fields nulled once the deletion is committed.
    pub fn destroy_with_loaded(
        &self,
        record: &Record,
        loaded: &mut [Record],
    ) -> Result<DeletionReport, Error> {
        self.engine().destroy(self.store.as_ref(), record, loaded)
    }

    /// Load a record by key and delete it.
    pub fn destroy_by_key(&self, model: &str, key: &[Value]) -> Result<DeletionReport, Error> {
        let record = self
            .store
            .get(model, key)?
            .ok_or_else(|| StoreError::NotFound {
                model: model.to_string(),
                key: Record::new(model, key.iter().cloned()).key_display(),
            })?;
        self.destroy(&record)
    }

    /// Check that no `protect` relation blocks deleting the record.
    pub fn can_destroy(&self, record: &Record) -> Result<(), Error> {
        self.engine().can_destroy(self.store.as_ref(), record)
    }

    /// Enforce the parent's relations inside a caller-managed unit of work.
    ///
    /// The parent itself is left in place; the caller deletes it and commits.
    pub fn on_before_delete(
        &self,
        unit: &mut dyn UnitOfWork,
        ctx: &mut DeletionContext<'_>,
    ) -> Result<(), Error> {
        let relations = self.registry.relations_of(&ctx.parent().model);
        self.engine().on_before_delete(unit, ctx, relations)
    }

    /// Create the native constraints of a model's relations.
    #[instrument(skip(self))]
    pub fn on_migrate_up(&self, model: &str) -> Result<Vec<MigrationStep>, Error> {
        let model = self.registry.require(model)?;
        self.schema().migrate_model_up(model)
    }

    /// Drop the native constraints of a model's relations.
    #[instrument(skip(self))]
    pub fn on_migrate_down(&self, model: &str) -> Result<Vec<MigrationStep>, Error> {
        let model = self.registry.require(model)?;
        self.schema().migrate_model_down(model)
    }

    /// Create the native constraints of every registered model.
    ///
    /// `repository` defaults to the configured one.
    pub fn auto_migrate_up(&self, repository: Option<&str>) -> Result<Vec<MigrationStep>, Error> {
        let manager = self.schema();
        match repository {
            Some(repository) => manager.with_repository(repository).auto_migrate_up(),
            None => manager.auto_migrate_up(),
        }
    }

    /// Drop the native constraints of every registered model.
    ///
    /// `repository` defaults to the configured one.
    pub fn auto_migrate_down(
        &self,
        repository: Option<&str>,
    ) -> Result<Vec<MigrationStep>, Error> {
        let manager = self.schema();
        match repository {
            Some(repository) => manager.with_repository(repository).auto_migrate_down(),
            None => manager.auto_migrate_down(),
        }
    }
}
