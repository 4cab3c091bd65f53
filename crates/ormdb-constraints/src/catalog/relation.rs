//! Relation definitions between models.

use super::policy::ConstraintPolicy;
use crate::error::ConfigurationError;

/// Cardinality of a relation, seen from the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// One-to-one relation (unique foreign key on the dependent).
    OneToOne,
    /// One-to-many relation (foreign key on the many side).
    OneToMany,
    /// Many-to-many relation (requires a join model).
    ManyToMany,
}

/// Join model backing a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinDef {
    /// Join model name.
    pub model: String,
    /// Join fields referencing the parent key.
    pub parent_fields: Vec<String>,
    /// Join fields referencing the far-end target key.
    pub target_fields: Vec<String>,
    /// Key fields of the far-end target.
    pub target_key: Vec<String>,
}

impl JoinDef {
    /// Create a join definition with single-field references and `id` keys.
    pub fn new(
        model: impl Into<String>,
        parent_field: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            parent_fields: vec![parent_field.into()],
            target_fields: vec![target_field.into()],
            target_key: vec!["id".to_string()],
        }
    }

    /// Use composite join fields.
    pub fn with_fields(
        mut self,
        parent_fields: impl IntoIterator<Item = impl Into<String>>,
        target_fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.parent_fields = parent_fields.into_iter().map(Into::into).collect();
        self.target_fields = target_fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set the far-end key fields referenced by `target_fields`.
    pub fn with_target_key(mut self, key: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.target_key = key.into_iter().map(Into::into).collect();
        self
    }
}

/// Read access to a relation, as consumed by the policy engine and stores.
pub trait RelationshipMetadata {
    /// Relation name (unique within the declaring model).
    fn name(&self) -> &str;

    /// Relation cardinality.
    fn cardinality(&self) -> Cardinality;

    /// Configured constraint policy.
    fn constraint_policy(&self) -> ConstraintPolicy;

    /// Model that declares the relation and is being deleted.
    fn parent_model(&self) -> &str;

    /// Model whose rows hold the foreign key (the join model for many-to-many).
    fn dependent_model(&self) -> &str;

    /// Foreign key fields on the dependent model.
    fn foreign_key_fields(&self) -> &[String];

    /// Parent key fields referenced by the foreign key.
    fn parent_key_fields(&self) -> &[String];

    /// Whether the foreign key may not be null.
    fn is_required(&self) -> bool;
}

/// A relation declared on a parent model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    /// Relation name (unique within the declaring model).
    pub name: String,
    /// Declaring (parent) model.
    pub parent: String,
    /// Related model: the dependent, or the far-end target for many-to-many.
    pub target: String,
    /// Relation cardinality.
    pub cardinality: Cardinality,
    /// Parent key fields. Filled from the parent model's key when left empty.
    pub parent_key: Vec<String>,
    /// Foreign key fields on the dependent (join parent fields for many-to-many).
    pub foreign_key: Vec<String>,
    /// Constraint policy applied on delete.
    pub policy: ConstraintPolicy,
    /// Whether the foreign key is required.
    pub required: bool,
    /// Join model for many-to-many relations.
    pub through: Option<JoinDef>,
}

impl RelationDef {
    fn with_shape(
        name: impl Into<String>,
        parent: impl Into<String>,
        target: impl Into<String>,
        cardinality: Cardinality,
        foreign_key: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            parent: parent.into(),
            target: target.into(),
            cardinality,
            parent_key: Vec::new(),
            foreign_key,
            policy: ConstraintPolicy::Protect,
            required: false,
            through: None,
        }
    }

    /// Create a one-to-one relation (`parent has 1 target`).
    pub fn one_to_one(
        name: impl Into<String>,
        parent: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let foreign_key = foreign_key.into_iter().map(Into::into).collect();
        Self::with_shape(name, parent, target, Cardinality::OneToOne, foreign_key)
    }

    /// Create a one-to-many relation (`parent has n target`).
    pub fn one_to_many(
        name: impl Into<String>,
        parent: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let foreign_key = foreign_key.into_iter().map(Into::into).collect();
        Self::with_shape(name, parent, target, Cardinality::OneToMany, foreign_key)
    }

    /// Create a many-to-many relation through a join model.
    pub fn many_to_many(
        name: impl Into<String>,
        parent: impl Into<String>,
        target: impl Into<String>,
        through: JoinDef,
    ) -> Self {
        let mut relation = Self::with_shape(
            name,
            parent,
            target,
            Cardinality::ManyToMany,
            through.parent_fields.clone(),
        );
        relation.required = true;
        relation.through = Some(through);
        relation
    }

    /// Set the constraint policy.
    pub fn with_policy(mut self, policy: ConstraintPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the constraint policy from its configuration token.
    pub fn with_policy_token(self, token: &str) -> Result<Self, ConfigurationError> {
        let policy = token.parse()?;
        Ok(self.with_policy(policy))
    }

    /// Set the parent key fields referenced by the foreign key.
    pub fn references(mut self, key: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.parent_key = key.into_iter().map(Into::into).collect();
        self
    }

    /// Mark the foreign key as required (not nullable).
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark the foreign key as optional (nullable).
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Check if this is a many-to-many relation.
    pub fn is_many_to_many(&self) -> bool {
        self.cardinality == Cardinality::ManyToMany
    }

    /// Whether a native foreign key belongs to this relation.
    ///
    /// Many-to-many constraints belong to the join model's own relations.
    pub fn owns_native_constraint(&self) -> bool {
        !self.is_many_to_many() && self.policy.native_action().is_some()
    }

    /// Check the relation's shape against its policy.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.is_many_to_many() && self.through.is_none() {
            return Err(ConfigurationError::MissingJoin(self.name.clone()));
        }

        if self.policy == ConstraintPolicy::SetNil {
            if self.is_many_to_many() {
                return Err(self.incompatible("join rows cannot hold a null key"));
            }
            if self.required {
                return Err(self.incompatible("the foreign key is required"));
            }
        }

        if self.foreign_key.is_empty()
            || (!self.parent_key.is_empty() && self.parent_key.len() != self.foreign_key.len())
        {
            return Err(ConfigurationError::KeyArityMismatch {
                relation: self.name.clone(),
                foreign_key: self.foreign_key.len(),
                key: self.parent_key.len(),
            });
        }

        if let Some(join) = &self.through {
            if join.target_fields.is_empty() || join.target_fields.len() != join.target_key.len()
            {
                return Err(ConfigurationError::KeyArityMismatch {
                    relation: self.name.clone(),
                    foreign_key: join.target_fields.len(),
                    key: join.target_key.len(),
                });
            }
        }

        Ok(())
    }

    fn incompatible(&self, reason: &str) -> ConfigurationError {
        ConfigurationError::IncompatiblePolicy {
            relation: self.name.clone(),
            policy: self.policy,
            reason: reason.to_string(),
        }
    }
}

impl RelationshipMetadata for RelationDef {
    fn name(&self) -> &str {
        &self.name
    }

    fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    fn constraint_policy(&self) -> ConstraintPolicy {
        self.policy
    }

    fn parent_model(&self) -> &str {
        &self.parent
    }

    fn dependent_model(&self) -> &str {
        match &self.through {
            Some(join) => &join.model,
            None => &self.target,
        }
    }

    fn foreign_key_fields(&self) -> &[String] {
        &self.foreign_key
    }

    fn parent_key_fields(&self) -> &[String] {
        &self.parent_key
    }

    fn is_required(&self) -> bool {
        self.required
    }
}
