//! Buffered unit of work shared by the bundled stores.

use std::collections::HashMap;

use tracing::debug;

use super::persistence::{Savepoint, UnitOfWork};
use super::record::{render_key, Record};
use super::value::Value;
use crate::error::StoreError;

/// A queued mutation.
#[derive(Debug, Clone)]
pub(crate) enum PendingOp {
    /// Write the full record.
    Put(Record),
    /// Remove the record.
    Delete {
        /// Model name.
        model: String,
        /// Key values.
        key: Vec<Value>,
    },
}

/// Committed state a buffered unit reads from and applies to.
pub(crate) trait Backend {
    /// Load a committed record.
    fn load(&self, model: &str, key: &[Value]) -> Result<Option<Record>, StoreError>;

    /// All committed records of a model, in store order.
    fn scan_model(&self, model: &str) -> Result<Vec<Record>, StoreError>;

    /// Refuse mutations of a record.
    fn check_writable(&self, _model: &str, _key: &[Value]) -> Result<(), StoreError> {
        Ok(())
    }

    /// Apply queued mutations in one atomic step.
    fn apply(&self, ops: Vec<PendingOp>) -> Result<(), StoreError>;
}

type RecordId = (String, Vec<Value>);

/// A unit of work that queues mutations and applies them on commit.
///
/// Reads overlay the unit's own uncommitted writes on the committed state.
pub(crate) struct BufferedUnit<'a, B: Backend> {
    backend: &'a B,
    ops: Vec<PendingOp>,
    /// Local cache for uncommitted writes (`None` marks a delete).
    write_cache: HashMap<RecordId, Option<Record>>,
}

impl<'a, B: Backend> BufferedUnit<'a, B> {
    /// Create an empty unit.
    pub(crate) fn new(backend: &'a B) -> Self {
        Self {
            backend,
            ops: Vec::new(),
            write_cache: HashMap::new(),
        }
    }

    fn push(&mut self, op: PendingOp) {
        Self::cache(&mut self.write_cache, &op);
        self.ops.push(op);
    }

    fn cache(write_cache: &mut HashMap<RecordId, Option<Record>>, op: &PendingOp) {
        match op {
            PendingOp::Put(record) => {
                let id = (record.model.clone(), record.key.clone());
                write_cache.insert(id, Some(record.clone()));
            }
            PendingOp::Delete { model, key } => {
                write_cache.insert((model.clone(), key.clone()), None);
            }
        }
    }

    fn require(&mut self, record: &Record) -> Result<Record, StoreError> {
        self.get(&record.model, &record.key)?
            .ok_or_else(|| StoreError::NotFound {
                model: record.model.clone(),
                key: record.key_display(),
            })
    }
}

impl<B: Backend> UnitOfWork for BufferedUnit<'_, B> {
    fn is_atomic(&self) -> bool {
        true
    }

    fn get(&mut self, model: &str, key: &[Value]) -> Result<Option<Record>, StoreError> {
        if let Some(cached) = self.write_cache.get(&(model.to_string(), key.to_vec())) {
            return Ok(cached.clone());
        }
        self.backend.load(model, key)
    }

    fn find_where(
        &mut self,
        model: &str,
        fields: &[String],
        values: &[Value],
    ) -> Result<Vec<Record>, StoreError> {
        let mut rows = Vec::new();
        for committed in self.backend.scan_model(model)? {
            let id = (committed.model.clone(), committed.key.clone());
            let current = match self.write_cache.get(&id) {
                Some(cached) => cached.clone(),
                None => Some(committed),
            };
            if let Some(record) = current {
                if record.references(fields, values) {
                    rows.push(record);
                }
            }
        }

        Ok(rows)
    }

    fn delete(&mut self, record: &Record) -> Result<(), StoreError> {
        self.require(record)?;
        self.backend.check_writable(&record.model, &record.key)?;
        self.push(PendingOp::Delete {
            model: record.model.clone(),
            key: record.key.clone(),
        });
        Ok(())
    }

    fn update_fields(
        &mut self,
        record: &Record,
        values: &[(String, Value)],
    ) -> Result<(), StoreError> {
        let mut current = self.require(record)?;
        self.backend.check_writable(&record.model, &record.key)?;
        for (name, value) in values {
            current.set(name.clone(), value.clone());
        }
        self.push(PendingOp::Put(current));
        Ok(())
    }

    fn mutations(&self) -> usize {
        self.ops.len()
    }

    fn rollback_to(&mut self, savepoint: Savepoint) -> Result<bool, StoreError> {
        if savepoint.0 > self.ops.len() {
            return Err(StoreError::Transaction(format!(
                "savepoint {} is beyond {} queued mutation(s)",
                savepoint.0,
                self.ops.len()
            )));
        }

        self.ops.truncate(savepoint.0);
        self.write_cache.clear();
        for op in &self.ops {
            Self::cache(&mut self.write_cache, op);
        }
        Ok(true)
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let BufferedUnit { backend, ops, .. } = *self;
        let count = ops.len();
        backend.apply(ops)?;
        debug!(mutations = count, "Unit of work committed");
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        if !self.ops.is_empty() {
            let first = match &self.ops[0] {
                PendingOp::Put(record) => format!("{} {}", record.model, record.key_display()),
                PendingOp::Delete { model, key } => format!("{} {}", model, render_key(key)),
            };
            debug!(
                discarded = self.ops.len(),
                first = %first,
                "Unit of work rolled back"
            );
        }
        Ok(())
    }
}
