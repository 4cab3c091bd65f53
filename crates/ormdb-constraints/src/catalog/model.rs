//! Model definitions.

use super::relation::RelationDef;
use crate::error::ConfigurationError;

/// A model definition: storage identity, key and declared relations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDef {
    /// Model name (unique within the registry).
    pub name: String,
    /// Backing table name.
    pub storage_name: String,
    /// Key field names.
    pub key: Vec<String>,
    /// Relations in declaration order.
    pub relations: Vec<RelationDef>,
    /// A remixable model is a reusable mixin, not an independently migrated table.
    pub remixable: bool,
}

impl ModelDef {
    /// Create a model keyed by `id` and stored in a table named after it.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let storage_name = format!("{}s", name.to_lowercase());
        Self {
            name,
            storage_name,
            key: vec!["id".to_string()],
            relations: Vec::new(),
            remixable: false,
        }
    }

    /// Set the backing table name.
    pub fn with_storage_name(mut self, storage_name: impl Into<String>) -> Self {
        self.storage_name = storage_name.into();
        self
    }

    /// Set the key fields.
    pub fn with_key(mut self, key: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.key = key.into_iter().map(Into::into).collect();
        self
    }

    /// Mark the model as remixable.
    pub fn remixable(mut self) -> Self {
        self.remixable = true;
        self
    }

    /// Declare a relation on this model.
    ///
    /// The relation is validated immediately; invalid policy combinations
    /// never reach the policy engine.
    pub fn has(mut self, relation: RelationDef) -> Result<Self, ConfigurationError> {
        if self.relation(&relation.name).is_some() {
            return Err(ConfigurationError::DuplicateRelation {
                model: self.name.clone(),
                relation: relation.name,
            });
        }
        let relation = self.adopt(relation)?;
        self.relations.push(relation);
        Ok(self)
    }

    /// Redefine a relation, keeping its position in declaration order.
    ///
    /// Declares the relation if it did not exist yet.
    pub fn redefine(mut self, relation: RelationDef) -> Result<Self, ConfigurationError> {
        let relation = self.adopt(relation)?;
        match self.relations.iter().position(|r| r.name == relation.name) {
            Some(index) => self.relations[index] = relation,
            None => self.relations.push(relation),
        }
        Ok(self)
    }

    /// Re-check every relation, including ones pushed onto `relations` directly.
    pub(crate) fn validated(mut self) -> Result<Self, ConfigurationError> {
        let relations = std::mem::take(&mut self.relations);
        for relation in relations {
            self = self.has(relation)?;
        }
        Ok(self)
    }

    fn adopt(&self, mut relation: RelationDef) -> Result<RelationDef, ConfigurationError> {
        relation.parent = self.name.clone();
        if relation.parent_key.is_empty() {
            relation.parent_key = self.key.clone();
        }
        relation.validate()?;
        Ok(relation)
    }

    /// Get a relation by name.
    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Check if this model is remixable.
    pub fn is_remixable(&self) -> bool {
        self.remixable
    }
}
