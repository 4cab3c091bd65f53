//! Native constraint migrations.

use std::fmt;

use tracing::{debug, info, instrument};

use super::adapter::{AdapterRegistry, SchemaAdapter};
use super::constraint::NativeConstraint;
use crate::catalog::{ConstraintPolicy, ModelDef, ModelRegistry, RelationDef, RelationshipMetadata};
use crate::config::ConstraintConfig;
use crate::error::{ConfigurationError, Error};

/// Why a relation was left alone by a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Many-to-many constraints belong to the join model's relations.
    ManyToMany,
    /// The relation uses the `skip` policy.
    SkipPolicy,
    /// The parent or dependent model is remixable.
    Remixable,
    /// The dependent table does not exist.
    StorageMissing,
    /// There is no constraint to drop.
    NotPresent,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::ManyToMany => "many-to-many",
            SkipReason::SkipPolicy => "skip policy",
            SkipReason::Remixable => "remixable model",
            SkipReason::StorageMissing => "storage missing",
            SkipReason::NotPresent => "constraint not present",
        };
        f.write_str(reason)
    }
}

/// Outcome of migrating one relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The constraint was created.
    Created,
    /// The constraint already existed.
    AlreadyExists,
    /// The constraint was dropped.
    Dropped,
    /// The repository's store does not manage native constraints.
    Unsupported,
    /// Nothing to do for this relation.
    Skipped(SkipReason),
}

/// One migrated relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStep {
    /// Declaring model.
    pub model: String,
    /// Relation name.
    pub relation: String,
    /// Constraint name, when the relation has one.
    pub constraint: Option<String>,
    /// What happened.
    pub outcome: MigrationOutcome,
}

/// Creates and drops the native constraints backing declared relations.
pub struct SchemaConstraintManager<'a> {
    registry: &'a ModelRegistry,
    adapters: &'a AdapterRegistry,
    config: &'a ConstraintConfig,
    repository: &'a str,
}

impl<'a> SchemaConstraintManager<'a> {
    /// Create a manager for the configured repository.
    pub fn new(
        registry: &'a ModelRegistry,
        adapters: &'a AdapterRegistry,
        config: &'a ConstraintConfig,
    ) -> Self {
        Self {
            registry,
            adapters,
            config,
            repository: &config.repository,
        }
    }

    /// Use another repository's adapter.
    pub fn with_repository(mut self, repository: &'a str) -> Self {
        self.repository = repository;
        self
    }

    /// Create the relation's constraint unless it already exists.
    #[instrument(skip(self, relation), fields(repository = %self.repository, relation = %relation.name))]
    pub fn migrate_up(&self, relation: &RelationDef) -> Result<MigrationStep, Error> {
        let (parent, dependent) = self.models_of(relation)?;
        let mut step = step(relation);

        if let Some(reason) = self.skip_reason(parent, dependent, relation) {
            step.outcome = MigrationOutcome::Skipped(reason);
            return Ok(step);
        }
        let constraint = self.constraint(parent, dependent, relation)?;
        step.constraint = Some(constraint.name.clone());

        let adapter = match self.adapter() {
            Some(adapter) => adapter,
            None => {
                step.outcome = MigrationOutcome::Unsupported;
                return Ok(step);
            }
        };

        step.outcome = if adapter.constraint_exists(&constraint.table, &constraint.name)? {
            MigrationOutcome::AlreadyExists
        } else if adapter.create_relationship_constraint(&constraint)? {
            info!(
                constraint = %constraint.name,
                table = %constraint.table,
                action = constraint.action.as_sql(),
                "Foreign key constraint created"
            );
            MigrationOutcome::Created
        } else {
            MigrationOutcome::Unsupported
        };
        Ok(step)
    }

    /// Drop the relation's constraint if its table and the constraint exist.
    #[instrument(skip(self, relation), fields(repository = %self.repository, relation = %relation.name))]
    pub fn migrate_down(&self, relation: &RelationDef) -> Result<MigrationStep, Error> {
        let (parent, dependent) = self.models_of(relation)?;
        let mut step = step(relation);

        if let Some(reason) = self.skip_reason(parent, dependent, relation) {
            step.outcome = MigrationOutcome::Skipped(reason);
            return Ok(step);
        }
        let constraint = self.constraint(parent, dependent, relation)?;
        step.constraint = Some(constraint.name.clone());

        let adapter = match self.adapter() {
            Some(adapter) => adapter,
            None => {
                step.outcome = MigrationOutcome::Unsupported;
                return Ok(step);
            }
        };

        step.outcome = if !adapter.storage_exists(&constraint.table)? {
            MigrationOutcome::Skipped(SkipReason::StorageMissing)
        } else if !adapter.constraint_exists(&constraint.table, &constraint.name)? {
            MigrationOutcome::Skipped(SkipReason::NotPresent)
        } else if adapter.destroy_relationship_constraint(&constraint)? {
            info!(
                constraint = %constraint.name,
                table = %constraint.table,
                "Foreign key constraint dropped"
            );
            MigrationOutcome::Dropped
        } else {
            MigrationOutcome::Unsupported
        };
        Ok(step)
    }

    /// Migrate up every relation declared on `model`.
    pub fn migrate_model_up(&self, model: &ModelDef) -> Result<Vec<MigrationStep>, Error> {
        if model.is_remixable() {
            debug!(model = %model.name, "Skipping remixable model");
            return Ok(skipped_all(model, SkipReason::Remixable));
        }
        model
            .relations
            .iter()
            .map(|relation| self.migrate_up(relation))
            .collect()
    }

    /// Migrate down every relation declared on `model`.
    pub fn migrate_model_down(&self, model: &ModelDef) -> Result<Vec<MigrationStep>, Error> {
        if model.is_remixable() {
            debug!(model = %model.name, "Skipping remixable model");
            return Ok(skipped_all(model, SkipReason::Remixable));
        }
        model
            .relations
            .iter()
            .map(|relation| self.migrate_down(relation))
            .collect()
    }

    /// Migrate up every registered model in registration order.
    pub fn auto_migrate_up(&self) -> Result<Vec<MigrationStep>, Error> {
        let mut steps = Vec::new();
        for model in self.registry.models() {
            steps.extend(self.migrate_model_up(model)?);
        }
        info!(
            repository = %self.repository,
            created = count(&steps, MigrationOutcome::Created),
            "Constraints migrated up"
        );
        Ok(steps)
    }

    /// Migrate down every registered model in registration order.
    pub fn auto_migrate_down(&self) -> Result<Vec<MigrationStep>, Error> {
        let mut steps = Vec::new();
        for model in self.registry.models() {
            steps.extend(self.migrate_model_down(model)?);
        }
        info!(
            repository = %self.repository,
            dropped = count(&steps, MigrationOutcome::Dropped),
            "Constraints migrated down"
        );
        Ok(steps)
    }

    fn adapter(&self) -> Option<&'a dyn SchemaAdapter> {
        let adapter = self.adapters.get(self.repository);
        if adapter.is_none() {
            debug!(repository = %self.repository, "No schema adapter registered");
        }
        adapter
    }

    fn models_of(&self, relation: &RelationDef) -> Result<(&'a ModelDef, Option<&'a ModelDef>), Error> {
        let parent = self.registry.require(&relation.parent)?;
        Ok((parent, self.registry.get(relation.dependent_model())))
    }

    fn skip_reason(
        &self,
        parent: &ModelDef,
        dependent: Option<&ModelDef>,
        relation: &RelationDef,
    ) -> Option<SkipReason> {
        if relation.is_many_to_many() {
            Some(SkipReason::ManyToMany)
        } else if relation.policy == ConstraintPolicy::Skip {
            Some(SkipReason::SkipPolicy)
        } else if parent.is_remixable() || dependent.is_some_and(ModelDef::is_remixable) {
            Some(SkipReason::Remixable)
        } else {
            None
        }
    }

    fn constraint(
        &self,
        parent: &ModelDef,
        dependent: Option<&ModelDef>,
        relation: &RelationDef,
    ) -> Result<NativeConstraint, Error> {
        let fallback;
        let dependent = match dependent {
            Some(model) => model,
            None => {
                fallback = ModelDef::new(relation.dependent_model());
                &fallback
            }
        };
        NativeConstraint::for_relation(parent, dependent, relation, self.config.max_identifier_length)
            .ok_or_else(|| {
                Error::from(ConfigurationError::IncompatiblePolicy {
                    relation: relation.name.clone(),
                    policy: relation.policy,
                    reason: "relation has no native constraint".to_string(),
                })
            })
    }
}

fn step(relation: &RelationDef) -> MigrationStep {
    MigrationStep {
        model: relation.parent.clone(),
        relation: relation.name.clone(),
        constraint: None,
        outcome: MigrationOutcome::Unsupported,
    }
}

fn skipped_all(model: &ModelDef, reason: SkipReason) -> Vec<MigrationStep> {
    model
        .relations
        .iter()
        .map(|relation| MigrationStep {
            outcome: MigrationOutcome::Skipped(reason),
            ..step(relation)
        })
        .collect()
}

fn count(steps: &[MigrationStep], outcome: MigrationOutcome) -> usize {
    steps.iter().filter(|s| s.outcome == outcome).count()
}
