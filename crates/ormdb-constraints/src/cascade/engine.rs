//! Deletion policy engine.
//!
//! Enforces each relation's [`ConstraintPolicy`] before a parent record is
//! removed:
//! - `protect`: refuse the deletion while dependents exist
//! - `destroy`: delete dependents, tolerating individual failures
//! - `destroy!`: delete dependents, aborting on the first failure
//! - `set_nil`: null the dependents' foreign key
//! - `skip`: leave dependents alone
//!
//! Destroying a dependent applies the dependent model's own relations first,
//! so cascades recurse through the registry.

use tracing::{debug, info, instrument, warn};

use super::context::DeletionContext;
use super::report::DeletionReport;
use crate::catalog::{ConstraintPolicy, ModelRegistry, RelationDef, RelationshipMetadata};
use crate::config::ConstraintConfig;
use crate::error::{CascadeAction, ConstraintViolation, Error, StoreError};
use crate::storage::{Persistence, Record, UnitOfWork, Value};

/// Key field of models missing from the registry.
const DEFAULT_KEY: &str = "id";

/// Applies constraint policies to the dependents of deleted records.
pub struct DeletionPolicyEngine<'a> {
    registry: &'a ModelRegistry,
    config: &'a ConstraintConfig,
}

impl<'a> DeletionPolicyEngine<'a> {
    /// Create a new engine.
    pub fn new(registry: &'a ModelRegistry, config: &'a ConstraintConfig) -> Self {
        Self { registry, config }
    }

    /// Delete `parent` together with whatever its relations require.
    ///
    /// All mutations go through one unit of work. On success the unit is
    /// committed and the dependents in `loaded` whose foreign key was nulled
    /// are updated in memory. On failure the unit is rolled back; if it had
    /// already written changes it could not undo, the violation is returned
    /// as [`Error::PartialCascade`].
    #[instrument(skip(self, store, parent, loaded), fields(model = %parent.model, key = %parent.key_display()))]
    pub fn destroy<P: Persistence + ?Sized>(
        &self,
        store: &P,
        parent: &Record,
        loaded: &mut [Record],
    ) -> Result<DeletionReport, Error> {
        self.can_destroy(store, parent)?;

        let mut unit = store.begin()?;
        let mut ctx = DeletionContext::new(parent, loaded);

        match self.destroy_in(unit.as_mut(), &mut ctx) {
            Ok(()) => {
                unit.commit()?;
                let report = ctx.finish();
                info!(
                    deleted = report.deleted.len(),
                    nullified = report.nullified.len(),
                    failures = report.failures.len(),
                    "Cascade delete completed"
                );
                Ok(report)
            }
            Err(err) => {
                let applied = if unit.is_atomic() { 0 } else { unit.mutations() };
                if let Err(rollback_err) = unit.rollback() {
                    warn!(error = %rollback_err, "Failed to roll back unit of work");
                }
                match err {
                    Error::Violation(violation) if applied > 0 => {
                        Err(Error::PartialCascade { violation, applied })
                    }
                    other => Err(other),
                }
            }
        }
    }

    /// Enforce the parent's relations and delete it inside an open unit of work.
    pub fn destroy_in(
        &self,
        unit: &mut dyn UnitOfWork,
        ctx: &mut DeletionContext<'_>,
    ) -> Result<(), Error> {
        let parent = ctx.parent();
        self.on_before_delete(unit, ctx, self.registry.relations_of(&parent.model))?;

        unit.delete(parent)?;
        ctx.record_deleted(parent);
        Ok(())
    }

    /// Enforce every relation in declared order.
    pub fn on_before_delete(
        &self,
        unit: &mut dyn UnitOfWork,
        ctx: &mut DeletionContext<'_>,
        relations: &[RelationDef],
    ) -> Result<(), Error> {
        for relation in relations {
            self.apply_on_delete(unit, ctx, relation)?;
        }
        Ok(())
    }

    /// Enforce one relation of the context's parent.
    pub fn apply_on_delete(
        &self,
        unit: &mut dyn UnitOfWork,
        ctx: &mut DeletionContext<'_>,
        relation: &RelationDef,
    ) -> Result<(), Error> {
        ctx.set_relation(&relation.name);
        let parent = ctx.parent();
        self.enforce(unit, ctx, parent, relation, 0)
    }

    /// Check the parent's `protect` relations without mutating anything.
    pub fn can_destroy<P: Persistence + ?Sized>(
        &self,
        store: &P,
        parent: &Record,
    ) -> Result<(), Error> {
        let mut unit = store.begin()?;
        let result = self.check_protected(unit.as_mut(), parent);
        unit.rollback()?;
        result.map_err(Error::from)
    }

    fn check_protected(
        &self,
        unit: &mut dyn UnitOfWork,
        parent: &Record,
    ) -> Result<(), ConstraintViolation> {
        for relation in self.registry.relations_of(&parent.model) {
            if relation.policy != ConstraintPolicy::Protect {
                continue;
            }
            let dependents = self.dependents_of(unit, parent, relation)?;
            if !dependents.is_empty() {
                return Err(protected(parent, relation, dependents.len()));
            }
        }
        Ok(())
    }

    fn enforce(
        &self,
        unit: &mut dyn UnitOfWork,
        ctx: &mut DeletionContext<'_>,
        parent: &Record,
        relation: &RelationDef,
        depth: usize,
    ) -> Result<(), Error> {
        let policy = relation.policy;
        if policy == ConstraintPolicy::Skip {
            return Ok(());
        }
        if policy.is_strict() && self.config.require_atomic_units && !unit.is_atomic() {
            return Err(Error::AtomicityUnavailable {
                relation: relation.name.clone(),
                policy,
            });
        }

        let dependents = self.dependents_of(unit, parent, relation)?;
        if dependents.is_empty() {
            return Ok(());
        }

        debug!(
            relation = %relation.name,
            policy = %policy,
            dependents = dependents.len(),
            depth,
            "Enforcing constraint policy"
        );

        match policy {
            ConstraintPolicy::Protect => {
                Err(protected(parent, relation, dependents.len()).into())
            }
            ConstraintPolicy::Destroy => {
                for dependent in &dependents {
                    self.destroy_tolerant(unit, ctx, relation, dependent, depth)?;
                }
                Ok(())
            }
            ConstraintPolicy::DestroyStrict => {
                for dependent in &dependents {
                    self.destroy_linked(unit, ctx, relation, dependent, depth)?;
                }
                Ok(())
            }
            ConstraintPolicy::SetNil => {
                self.nullify(unit, ctx, relation, &dependents)?;
                Ok(())
            }
            ConstraintPolicy::Skip => Ok(()),
        }
    }

    /// Destroy a dependent; a violation in its subtree is rolled back and reported.
    fn destroy_tolerant(
        &self,
        unit: &mut dyn UnitOfWork,
        ctx: &mut DeletionContext<'_>,
        relation: &RelationDef,
        dependent: &Record,
        depth: usize,
    ) -> Result<(), Error> {
        let savepoint = unit.savepoint();
        let mark = ctx.mark();

        let violation = match self.destroy_linked(unit, ctx, relation, dependent, depth) {
            Ok(()) => return Ok(()),
            Err(Error::Violation(violation)) => violation,
            Err(other) => return Err(other),
        };

        if unit.rollback_to(savepoint)? {
            ctx.restore(mark);
        }

        if self.config.log_destroy_failures {
            warn!(
                relation = %relation.name,
                dependent = %dependent.model,
                key = %dependent.key_display(),
                error = %violation,
                "Failed to destroy dependent, continuing"
            );
        }
        ctx.record_failure(violation);
        Ok(())
    }

    /// Destroy a dependent and, for many-to-many, the target its join row points at.
    fn destroy_linked(
        &self,
        unit: &mut dyn UnitOfWork,
        ctx: &mut DeletionContext<'_>,
        relation: &RelationDef,
        dependent: &Record,
        depth: usize,
    ) -> Result<(), Error> {
        self.destroy_record(unit, ctx, relation, dependent, depth + 1)?;

        if let Some(join) = &relation.through {
            let values = self.field_values(dependent, &join.target_fields);
            if values.iter().any(Value::is_null) {
                return Ok(());
            }
            for target in self.join_targets(unit, relation, &join.target_key, &values)? {
                self.destroy_record(unit, ctx, relation, &target, depth + 1)?;
            }
        }
        Ok(())
    }

    /// Targets whose `target_key` fields hold `values`.
    fn join_targets(
        &self,
        unit: &mut dyn UnitOfWork,
        relation: &RelationDef,
        target_key: &[String],
        values: &[Value],
    ) -> Result<Vec<Record>, ConstraintViolation> {
        if self.is_primary_key(&relation.target, target_key) {
            let target = unit
                .get(&relation.target, values)
                .map_err(|e| lookup_failed(relation, e))?;
            return Ok(target.into_iter().collect());
        }

        // Narrow by the plain fields, then compare key fields in memory.
        let (fields, field_values): (Vec<String>, Vec<Value>) = target_key
            .iter()
            .zip(values)
            .filter(|(name, _)| self.key_position(&relation.target, name).is_none())
            .map(|(name, value)| (name.clone(), value.clone()))
            .unzip();
        let candidates = unit
            .find_where(&relation.target, &fields, &field_values)
            .map_err(|e| lookup_failed(relation, e))?;
        Ok(candidates
            .into_iter()
            .filter(|target| self.field_values(target, target_key) == values)
            .collect())
    }

    fn destroy_record(
        &self,
        unit: &mut dyn UnitOfWork,
        ctx: &mut DeletionContext<'_>,
        via: &RelationDef,
        record: &Record,
        depth: usize,
    ) -> Result<(), Error> {
        if depth > self.config.max_cascade_depth {
            return Err(ConstraintViolation::CascadeTooDeep {
                depth: self.config.max_cascade_depth,
            }
            .into());
        }
        // Already deleted, or being deleted further up this cascade.
        if !ctx.enter(record) {
            return Ok(());
        }

        for own in self.registry.relations_of(&record.model) {
            self.enforce(unit, ctx, record, own, depth)?;
        }

        unit.delete(record)
            .map_err(|e| dependent_failed(via, record, CascadeAction::Delete, e))?;
        ctx.record_deleted(record);
        Ok(())
    }

    fn nullify(
        &self,
        unit: &mut dyn UnitOfWork,
        ctx: &mut DeletionContext<'_>,
        relation: &RelationDef,
        dependents: &[Record],
    ) -> Result<(), ConstraintViolation> {
        let values: Vec<(String, Value)> = relation
            .foreign_key
            .iter()
            .map(|field| (field.clone(), Value::Null))
            .collect();

        for dependent in dependents {
            unit.update_fields(dependent, &values)
                .map_err(|e| dependent_failed(relation, dependent, CascadeAction::Nullify, e))?;
            ctx.record_nullified(dependent, &relation.foreign_key);
        }
        Ok(())
    }

    fn dependents_of(
        &self,
        unit: &mut dyn UnitOfWork,
        parent: &Record,
        relation: &RelationDef,
    ) -> Result<Vec<Record>, ConstraintViolation> {
        let key = self.referenced_key(parent, relation);
        if key.iter().any(Value::is_null) {
            return Ok(Vec::new());
        }
        unit.find_dependents(relation, &key)
            .map_err(|e| lookup_failed(relation, e))
    }

    /// Values of the parent fields the relation's foreign key points at.
    fn referenced_key(&self, parent: &Record, relation: &RelationDef) -> Vec<Value> {
        if relation.parent_key.is_empty()
            || self.is_primary_key(&parent.model, &relation.parent_key)
        {
            parent.key.clone()
        } else {
            self.field_values(parent, &relation.parent_key)
        }
    }

    /// Whether `fields` is exactly the model's key, in key order.
    fn is_primary_key(&self, model: &str, fields: &[String]) -> bool {
        match self.registry.get(model) {
            Some(def) => def.key == fields,
            None => fields.len() == 1 && fields[0] == DEFAULT_KEY,
        }
    }

    fn key_position(&self, model: &str, field: &str) -> Option<usize> {
        match self.registry.get(model) {
            Some(def) => def.key.iter().position(|k| k == field),
            None => (field == DEFAULT_KEY).then_some(0),
        }
    }

    /// Values of named fields, reading key fields from the record's key.
    ///
    /// Missing fields read as null.
    fn field_values(&self, record: &Record, names: &[String]) -> Vec<Value> {
        names
            .iter()
            .map(|name| {
                let value = match self.key_position(&record.model, name) {
                    Some(i) => record.key.get(i),
                    None => record.get(name),
                };
                value.cloned().unwrap_or(Value::Null)
            })
            .collect()
    }
}

fn protected(parent: &Record, relation: &RelationDef, count: usize) -> ConstraintViolation {
    ConstraintViolation::Protected {
        model: parent.model.clone(),
        key: parent.key_display(),
        relation: relation.name.clone(),
        dependent_model: relation.dependent_model().to_string(),
        count,
    }
}

fn dependent_failed(
    relation: &RelationDef,
    dependent: &Record,
    action: CascadeAction,
    err: StoreError,
) -> ConstraintViolation {
    ConstraintViolation::DependentDeleteFailed {
        relation: relation.name.clone(),
        dependent_model: dependent.model.clone(),
        key: dependent.key_display(),
        action,
        reason: err.to_string(),
    }
}

fn lookup_failed(relation: &RelationDef, err: StoreError) -> ConstraintViolation {
    ConstraintViolation::DependentLookupFailed {
        relation: relation.name.clone(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{JoinDef, ModelDef};
    use crate::storage::MemoryStore;

    fn registry(policy: ConstraintPolicy) -> ModelRegistry {
        let article = ModelDef::new("Article")
            .has(
                RelationDef::one_to_many("comments", "Article", "Comment", ["article_id"])
                    .with_policy(policy),
            )
            .unwrap();
        ModelRegistry::new()
            .with_model(article)
            .unwrap()
            .with_model(ModelDef::new("Comment"))
            .unwrap()
    }

    fn seed(store: &MemoryStore) -> Record {
        let article = Record::new("Article", [1i64]);
        store.insert(article.clone()).unwrap();
        for id in 1..=2i64 {
            store
                .insert(Record::new("Comment", [id]).with_field("article_id", 1i64))
                .unwrap();
        }
        article
    }

    #[test]
    fn test_protect_blocks() {
        let registry = registry(ConstraintPolicy::Protect);
        let config = ConstraintConfig::default();
        let engine = DeletionPolicyEngine::new(&registry, &config);
        let store = MemoryStore::new();
        let article = seed(&store);

        let err = engine.destroy(&store, &article, &mut []).unwrap_err();
        assert!(err.is_protected());
        assert_eq!(store.count("Article"), 1);
        assert_eq!(store.count("Comment"), 2);
    }

    #[test]
    fn test_protect_without_dependents() {
        let registry = registry(ConstraintPolicy::Protect);
        let config = ConstraintConfig::default();
        let engine = DeletionPolicyEngine::new(&registry, &config);
        let store = MemoryStore::new();
        let article = Record::new("Article", [1i64]);
        store.insert(article.clone()).unwrap();

        let report = engine.destroy(&store, &article, &mut []).unwrap();
        assert!(report.was_deleted("Article", &[Value::Int(1)]));
        assert_eq!(store.count("Article"), 0);
    }

    #[test]
    fn test_destroy_removes_dependents() {
        let registry = registry(ConstraintPolicy::Destroy);
        let config = ConstraintConfig::default();
        let engine = DeletionPolicyEngine::new(&registry, &config);
        let store = MemoryStore::new();
        let article = seed(&store);

        let report = engine.destroy(&store, &article, &mut []).unwrap();
        assert_eq!(report.deleted.len(), 3);
        assert_eq!(report.deleted.last().unwrap().0, "Article");
        assert_eq!(store.count("Comment"), 0);
    }

    #[test]
    fn test_set_nil_updates_loaded() {
        let registry = registry(ConstraintPolicy::SetNil);
        let config = ConstraintConfig::default();
        let engine = DeletionPolicyEngine::new(&registry, &config);
        let store = MemoryStore::new();
        let article = seed(&store);
        let mut loaded = store.scan("Comment").unwrap();

        let report = engine.destroy(&store, &article, &mut loaded).unwrap();
        assert_eq!(report.nullified.len(), 2);
        assert!(loaded.iter().all(|c| c.get("article_id") == Some(&Value::Null)));
        for stored in store.scan("Comment").unwrap() {
            assert_eq!(stored.get("article_id"), Some(&Value::Null));
        }
    }

    #[test]
    fn test_skip_orphans() {
        let registry = registry(ConstraintPolicy::Skip);
        let config = ConstraintConfig::default();
        let engine = DeletionPolicyEngine::new(&registry, &config);
        let store = MemoryStore::new();
        let article = seed(&store);

        engine.destroy(&store, &article, &mut []).unwrap();
        assert_eq!(store.count("Article"), 0);
        assert_eq!(store.count("Comment"), 2);
    }

    #[test]
    fn test_cycle_terminates() {
        let person = ModelDef::new("Person")
            .has(
                RelationDef::one_to_many("friends", "Person", "Person", ["friend_of"])
                    .with_policy(ConstraintPolicy::DestroyStrict),
            )
            .unwrap();
        let registry = ModelRegistry::new().with_model(person).unwrap();
        let config = ConstraintConfig::default();
        let engine = DeletionPolicyEngine::new(&registry, &config);
        let store = MemoryStore::new();
        store
            .insert(Record::new("Person", [1i64]).with_field("friend_of", 2i64))
            .unwrap();
        let root = Record::new("Person", [2i64]).with_field("friend_of", 1i64);
        store.insert(root.clone()).unwrap();

        let report = engine.destroy(&store, &root, &mut []).unwrap();
        assert_eq!(report.deleted.len(), 2);
        assert_eq!(store.count("Person"), 0);
    }

    #[test]
    fn test_hook_cycle_leaves_parent() {
        let person = ModelDef::new("Person")
            .has(
                RelationDef::one_to_many("friends", "Person", "Person", ["friend_of"])
                    .with_policy(ConstraintPolicy::DestroyStrict),
            )
            .unwrap();
        let registry = ModelRegistry::new().with_model(person).unwrap();
        let config = ConstraintConfig::default();
        let engine = DeletionPolicyEngine::new(&registry, &config);
        let store = MemoryStore::new();
        store
            .insert(Record::new("Person", [1i64]).with_field("friend_of", 2i64))
            .unwrap();
        let root = Record::new("Person", [2i64]).with_field("friend_of", 1i64);
        store.insert(root.clone()).unwrap();

        let mut loaded = Vec::new();
        let mut unit = store.begin().unwrap();
        let mut ctx = DeletionContext::new(&root, &mut loaded);
        engine
            .on_before_delete(unit.as_mut(), &mut ctx, registry.relations_of("Person"))
            .unwrap();
        assert!(!ctx.report().was_deleted("Person", &[Value::Int(2)]));
        unit.delete(&root).unwrap();
        unit.commit().unwrap();

        assert_eq!(store.count("Person"), 0);
    }

    #[test]
    fn test_protect_reordered_composite_key() {
        let shelf = ModelDef::new("Shelf")
            .with_key(["aisle", "slot"])
            .has(
                RelationDef::one_to_many("books", "Shelf", "Book", ["shelf_slot", "shelf_aisle"])
                    .references(["slot", "aisle"]),
            )
            .unwrap();
        let registry = ModelRegistry::new().with_model(shelf).unwrap();
        let config = ConstraintConfig::default();
        let engine = DeletionPolicyEngine::new(&registry, &config);
        let store = MemoryStore::new();
        let parent = Record::new("Shelf", [3i64, 7i64]);
        store.insert(parent.clone()).unwrap();
        store
            .insert(
                Record::new("Book", [1i64])
                    .with_field("shelf_slot", 7i64)
                    .with_field("shelf_aisle", 3i64),
            )
            .unwrap();

        let err = engine.destroy(&store, &parent, &mut []).unwrap_err();
        assert!(err.is_protected());
        assert_eq!(store.count("Shelf"), 1);
        assert_eq!(store.count("Book"), 1);
    }

    #[test]
    fn test_depth_limit() {
        let registry = ModelRegistry::new()
            .with_model(
                ModelDef::new("Article")
                    .has(
                        RelationDef::one_to_many("comments", "Article", "Comment", ["article_id"])
                            .with_policy(ConstraintPolicy::DestroyStrict),
                    )
                    .unwrap(),
            )
            .unwrap()
            .with_model(
                ModelDef::new("Comment")
                    .has(
                        RelationDef::one_to_many("replies", "Comment", "Reply", ["comment_id"])
                            .with_policy(ConstraintPolicy::DestroyStrict),
                    )
                    .unwrap(),
            )
            .unwrap();
        let config = ConstraintConfig::default().with_max_cascade_depth(1);
        let engine = DeletionPolicyEngine::new(&registry, &config);
        let store = MemoryStore::new();
        let article = seed(&store);
        store
            .insert(Record::new("Reply", [1i64]).with_field("comment_id", 1i64))
            .unwrap();

        let err = engine.destroy(&store, &article, &mut []).unwrap_err();
        assert!(matches!(
            err,
            Error::Violation(ConstraintViolation::CascadeTooDeep { depth: 1 })
        ));
        assert_eq!(store.count("Reply"), 1);
    }

    #[test]
    fn test_many_to_many_destroys_targets() {
        let join = JoinDef::new("ArticleTag", "article_id", "tag_id");
        let article = ModelDef::new("Article")
            .has(
                RelationDef::many_to_many("tags", "Article", "Tag", join)
                    .with_policy(ConstraintPolicy::Destroy),
            )
            .unwrap();
        let registry = ModelRegistry::new().with_model(article).unwrap();
        let config = ConstraintConfig::default();
        let engine = DeletionPolicyEngine::new(&registry, &config);
        let store = MemoryStore::new();
        let parent = Record::new("Article", [1i64]);
        store.insert(parent.clone()).unwrap();
        store.insert(Record::new("Tag", [10i64])).unwrap();
        store.insert(Record::new("Tag", [11i64])).unwrap();
        store
            .insert(
                Record::new("ArticleTag", [1i64])
                    .with_field("article_id", 1i64)
                    .with_field("tag_id", 10i64),
            )
            .unwrap();

        engine.destroy(&store, &parent, &mut []).unwrap();
        assert_eq!(store.count("ArticleTag"), 0);
        assert_eq!(store.count("Tag"), 1);
        assert!(store.get("Tag", &[Value::Int(11)]).unwrap().is_some());
    }

    #[test]
    fn test_many_to_many_by_target_field() {
        let join = JoinDef::new("ArticleTag", "article_id", "tag_slug").with_target_key(["slug"]);
        let article = ModelDef::new("Article")
            .has(
                RelationDef::many_to_many("tags", "Article", "Tag", join)
                    .with_policy(ConstraintPolicy::DestroyStrict),
            )
            .unwrap();
        let registry = ModelRegistry::new().with_model(article).unwrap();
        let config = ConstraintConfig::default();
        let engine = DeletionPolicyEngine::new(&registry, &config);
        let store = MemoryStore::new();
        let parent = Record::new("Article", [1i64]);
        store.insert(parent.clone()).unwrap();
        store
            .insert(Record::new("Tag", [10i64]).with_field("slug", "rust"))
            .unwrap();
        store
            .insert(Record::new("Tag", [11i64]).with_field("slug", "sled"))
            .unwrap();
        store
            .insert(
                Record::new("ArticleTag", [1i64])
                    .with_field("article_id", 1i64)
                    .with_field("tag_slug", "rust"),
            )
            .unwrap();

        let report = engine.destroy(&store, &parent, &mut []).unwrap();
        assert!(report.was_deleted("Tag", &[Value::Int(10)]));
        assert_eq!(store.count("ArticleTag"), 0);
        assert_eq!(store.count("Tag"), 1);
        assert!(store.get("Tag", &[Value::Int(11)]).unwrap().is_some());
    }
}
