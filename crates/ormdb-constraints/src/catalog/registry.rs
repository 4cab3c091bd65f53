//! Explicit model registry.

use std::collections::HashMap;

use super::model::ModelDef;
use super::relation::RelationDef;
use crate::error::ConfigurationError;

/// Registry of model definitions, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Vec<ModelDef>,
    index: HashMap<String, usize>,
}

impl ModelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model.
    pub fn register(&mut self, model: ModelDef) -> Result<(), ConfigurationError> {
        if self.index.contains_key(&model.name) {
            return Err(ConfigurationError::DuplicateModel(model.name));
        }
        let model = model.validated()?;
        self.index.insert(model.name.clone(), self.models.len());
        self.models.push(model);
        Ok(())
    }

    /// Register a model, builder style.
    pub fn with_model(mut self, model: ModelDef) -> Result<Self, ConfigurationError> {
        self.register(model)?;
        Ok(self)
    }

    /// Replace a registered model with a redefinition.
    pub fn redefine(&mut self, model: ModelDef) -> Result<(), ConfigurationError> {
        match self.index.get(&model.name) {
            Some(&index) => {
                self.models[index] = model.validated()?;
                Ok(())
            }
            None => Err(ConfigurationError::UnknownModel(model.name)),
        }
    }

    /// Get a model by name.
    pub fn get(&self, name: &str) -> Option<&ModelDef> {
        self.index.get(name).map(|&index| &self.models[index])
    }

    /// Get a model by name, failing if it is not registered.
    pub fn require(&self, name: &str) -> Result<&ModelDef, ConfigurationError> {
        self.get(name)
            .ok_or_else(|| ConfigurationError::UnknownModel(name.to_string()))
    }

    /// Relations declared on a model, in declaration order.
    ///
    /// Unregistered models declare no relations.
    pub fn relations_of(&self, model: &str) -> &[RelationDef] {
        self.get(model).map(|m| m.relations.as_slice()).unwrap_or(&[])
    }

    /// All models in registration order.
    pub fn models(&self) -> impl Iterator<Item = &ModelDef> {
        self.models.iter()
    }

    /// Number of registered models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Check if no models are registered.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ConstraintPolicy, JoinDef};

    #[test]
    fn test_register_and_lookup() {
        let registry = ModelRegistry::new()
            .with_model(ModelDef::new("Article"))
            .and_then(|r| r.with_model(ModelDef::new("Comment")))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.require("Comment").unwrap().storage_name, "comments");
        assert!(registry.relations_of("Missing").is_empty());
        let names: Vec<_> = registry.models().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Article", "Comment"]);
    }

    #[test]
    fn test_duplicate_model() {
        let mut registry = ModelRegistry::new();
        registry.register(ModelDef::new("Article")).unwrap();
        assert_eq!(
            registry.register(ModelDef::new("Article")),
            Err(ConfigurationError::DuplicateModel("Article".to_string()))
        );
    }

    #[test]
    fn test_register_validates_pushed_relations() {
        let mut article = ModelDef::new("Article");
        article.relations.push(
            RelationDef::many_to_many(
                "tags",
                "Article",
                "Tag",
                JoinDef::new("ArticleTag", "article_id", "tag_id"),
            )
            .with_policy(ConstraintPolicy::SetNil),
        );

        assert!(matches!(
            ModelRegistry::new().with_model(article.clone()),
            Err(ConfigurationError::IncompatiblePolicy { .. })
        ));

        let mut registry = ModelRegistry::new()
            .with_model(ModelDef::new("Article"))
            .unwrap();
        assert!(matches!(
            registry.redefine(article),
            Err(ConfigurationError::IncompatiblePolicy { .. })
        ));
        assert!(registry.relations_of("Article").is_empty());
    }

    #[test]
    fn test_register_adopts_pushed_relations() {
        let mut comment = ModelDef::new("Comment").with_key(["uuid"]);
        comment.relations.push(RelationDef::one_to_many(
            "replies",
            "Somewhere",
            "Reply",
            ["comment_uuid"],
        ));
        comment
            .relations
            .push(RelationDef::one_to_many("replies", "Comment", "Reply", ["parent_uuid"]));
        assert!(matches!(
            ModelRegistry::new().with_model(comment.clone()),
            Err(ConfigurationError::DuplicateRelation { .. })
        ));

        comment.relations.pop();
        let registry = ModelRegistry::new().with_model(comment).unwrap();
        let relation = &registry.relations_of("Comment")[0];
        assert_eq!(relation.parent, "Comment");
        assert_eq!(relation.parent_key, vec!["uuid".to_string()]);
    }

    #[test]
    fn test_redefine_unknown_model() {
        let mut registry = ModelRegistry::new();
        assert!(matches!(
            registry.redefine(ModelDef::new("Ghost")),
            Err(ConfigurationError::UnknownModel(_))
        ));
    }
}
