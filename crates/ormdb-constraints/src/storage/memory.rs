//! In-memory record store.

use std::collections::{BTreeMap, HashMap, HashSet};

use parking_lot::RwLock;
use tracing::warn;

use super::buffered::{Backend, BufferedUnit, PendingOp};
use super::persistence::{Persistence, UnitOfWork};
use super::record::{render_key, Record};
use super::value::Value;
use crate::error::StoreError;

type Table = BTreeMap<Vec<Value>, Record>;

/// An in-memory store.
///
/// By default units of work are buffered and applied atomically. A store
/// built with [`MemoryStore::without_transactions`] writes through instead,
/// which models backends with best-effort semantics.
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
    locked: RwLock<HashSet<(String, Vec<Value>)>>,
    atomic: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a transactional store.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            locked: RwLock::new(HashSet::new()),
            atomic: true,
        }
    }

    /// Create a store whose units write through without rollback.
    pub fn without_transactions() -> Self {
        Self {
            atomic: false,
            ..Self::new()
        }
    }

    /// Lock a record so that deleting or updating it fails.
    pub fn lock(&self, model: &str, key: &[Value]) {
        self.locked.write().insert((model.to_string(), key.to_vec()));
    }

    /// Unlock a previously locked record.
    pub fn unlock(&self, model: &str, key: &[Value]) {
        self.locked.write().remove(&(model.to_string(), key.to_vec()));
    }

    /// Number of records stored for a model.
    pub fn count(&self, model: &str) -> usize {
        self.tables.read().get(model).map_or(0, BTreeMap::len)
    }

    fn write_now(&self, op: PendingOp) {
        apply_op(&mut self.tables.write(), op);
    }
}

fn apply_op(tables: &mut HashMap<String, Table>, op: PendingOp) {
    match op {
        PendingOp::Put(record) => {
            tables
                .entry(record.model.clone())
                .or_default()
                .insert(record.key.clone(), record);
        }
        PendingOp::Delete { model, key } => {
            if let Some(table) = tables.get_mut(&model) {
                table.remove(&key);
            }
        }
    }
}

impl Backend for MemoryStore {
    fn load(&self, model: &str, key: &[Value]) -> Result<Option<Record>, StoreError> {
        Ok(self
            .tables
            .read()
            .get(model)
            .and_then(|table| table.get(key))
            .cloned())
    }

    fn scan_model(&self, model: &str) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .tables
            .read()
            .get(model)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default())
    }

    fn check_writable(&self, model: &str, key: &[Value]) -> Result<(), StoreError> {
        if self.locked.read().contains(&(model.to_string(), key.to_vec())) {
            return Err(StoreError::Rejected(format!(
                "{} {} is locked",
                model,
                render_key(key)
            )));
        }
        Ok(())
    }

    fn apply(&self, ops: Vec<PendingOp>) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        for op in ops {
            apply_op(&mut tables, op);
        }
        Ok(())
    }
}

impl Persistence for MemoryStore {
    fn get(&self, model: &str, key: &[Value]) -> Result<Option<Record>, StoreError> {
        self.load(model, key)
    }

    fn insert(&self, record: Record) -> Result<(), StoreError> {
        self.write_now(PendingOp::Put(record));
        Ok(())
    }

    fn scan(&self, model: &str) -> Result<Vec<Record>, StoreError> {
        self.scan_model(model)
    }

    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>, StoreError> {
        if self.atomic {
            Ok(Box::new(BufferedUnit::new(self)))
        } else {
            Ok(Box::new(DirectUnit {
                store: self,
                applied: 0,
            }))
        }
    }
}

/// A write-through unit with best-effort semantics.
struct DirectUnit<'a> {
    store: &'a MemoryStore,
    applied: usize,
}

impl DirectUnit<'_> {
    fn require(&self, record: &Record) -> Result<Record, StoreError> {
        self.store
            .load(&record.model, &record.key)?
            .ok_or_else(|| StoreError::NotFound {
                model: record.model.clone(),
                key: record.key_display(),
            })
    }
}

impl UnitOfWork for DirectUnit<'_> {
    fn is_atomic(&self) -> bool {
        false
    }

    fn get(&mut self, model: &str, key: &[Value]) -> Result<Option<Record>, StoreError> {
        self.store.load(model, key)
    }

    fn find_where(
        &mut self,
        model: &str,
        fields: &[String],
        values: &[Value],
    ) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .store
            .scan_model(model)?
            .into_iter()
            .filter(|record| record.references(fields, values))
            .collect())
    }

    fn delete(&mut self, record: &Record) -> Result<(), StoreError> {
        self.require(record)?;
        self.store.check_writable(&record.model, &record.key)?;
        self.store.write_now(PendingOp::Delete {
            model: record.model.clone(),
            key: record.key.clone(),
        });
        self.applied += 1;
        Ok(())
    }

    fn update_fields(
        &mut self,
        record: &Record,
        values: &[(String, Value)],
    ) -> Result<(), StoreError> {
        let mut current = self.require(record)?;
        self.store.check_writable(&record.model, &record.key)?;
        for (name, value) in values {
            current.set(name.clone(), value.clone());
        }
        self.store.write_now(PendingOp::Put(current));
        self.applied += 1;
        Ok(())
    }

    fn mutations(&self) -> usize {
        self.applied
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        if self.applied > 0 {
            warn!(
                applied = self.applied,
                "Rollback requested on a write-through unit; applied mutations remain"
            );
        }
        Ok(())
    }
}
