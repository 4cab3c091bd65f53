//! Persistence layer interface consumed by the policy engine.

use super::record::Record;
use super::value::Value;
use crate::catalog::RelationshipMetadata;
use crate::error::StoreError;

/// A position inside a unit of work that later mutations can be rolled back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Savepoint(pub usize);

/// A record store.
///
/// All mutations made on behalf of one parent deletion go through a single
/// [`UnitOfWork`] obtained from [`Persistence::begin`].
pub trait Persistence: Send + Sync {
    /// Get a record by key.
    fn get(&self, model: &str, key: &[Value]) -> Result<Option<Record>, StoreError>;

    /// Insert or replace a record.
    fn insert(&self, record: Record) -> Result<(), StoreError>;

    /// All records of a model, in store order.
    fn scan(&self, model: &str) -> Result<Vec<Record>, StoreError>;

    /// Start a unit of work.
    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>, StoreError>;
}

/// The mutations of one parent deletion.
///
/// An atomic unit applies nothing until [`UnitOfWork::commit`]; a best-effort
/// unit writes through and cannot undo what it already wrote.
pub trait UnitOfWork {
    /// Whether this unit commits or rolls back as a whole.
    fn is_atomic(&self) -> bool;

    /// Get a record, observing this unit's own uncommitted writes.
    fn get(&mut self, model: &str, key: &[Value]) -> Result<Option<Record>, StoreError>;

    /// Records of `model` whose `fields` hold exactly `values`, observing this
    /// unit's own uncommitted writes. Empty `fields` match every record.
    fn find_where(
        &mut self,
        model: &str,
        fields: &[String],
        values: &[Value],
    ) -> Result<Vec<Record>, StoreError>;

    /// Records of the relation's dependent model whose foreign key holds `parent_key`.
    fn find_dependents(
        &mut self,
        relation: &dyn RelationshipMetadata,
        parent_key: &[Value],
    ) -> Result<Vec<Record>, StoreError> {
        self.find_where(
            relation.dependent_model(),
            relation.foreign_key_fields(),
            parent_key,
        )
    }

    /// Delete a record.
    fn delete(&mut self, record: &Record) -> Result<(), StoreError>;

    /// Overwrite fields of a record.
    fn update_fields(
        &mut self,
        record: &Record,
        values: &[(String, Value)],
    ) -> Result<(), StoreError>;

    /// Number of mutations made through this unit so far.
    fn mutations(&self) -> usize;

    /// Mark the current position.
    fn savepoint(&mut self) -> Savepoint {
        Savepoint(self.mutations())
    }

    /// Undo mutations made after `savepoint`.
    ///
    /// Returns `false` when the unit cannot undo writes.
    fn rollback_to(&mut self, _savepoint: Savepoint) -> Result<bool, StoreError> {
        Ok(false)
    }

    /// Apply all mutations.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard all mutations that can still be discarded.
    fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
