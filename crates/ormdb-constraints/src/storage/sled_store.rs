//! sled-backed record store.

use std::path::PathBuf;

use sled::{Batch, Db, Tree};
use tracing::debug;

use super::buffered::{Backend, BufferedUnit, PendingOp};
use super::persistence::{Persistence, UnitOfWork};
use super::record::Record;
use super::value::Value;
use crate::error::StoreError;

/// Tree name for records.
const RECORDS_TREE: &str = "records";

/// Separator between the model name and the encoded key.
const MODEL_SEPARATOR: u8 = 0;

/// Configuration for the sled store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the database directory.
    pub path: PathBuf,

    /// Page cache capacity in bytes.
    pub cache_capacity: u64,

    /// Flush interval in milliseconds. None means flush only on demand.
    pub flush_every_ms: Option<u64>,

    /// Temporary database (deleted on drop).
    pub temporary: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./ormdb_constraints"),
            cache_capacity: 64 * 1024 * 1024, // 64MB
            flush_every_ms: Some(1000),
            temporary: false,
        }
    }
}

impl StoreConfig {
    /// Create a configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create a temporary configuration for testing.
    pub fn temporary() -> Self {
        Self {
            path: PathBuf::from(""),
            temporary: true,
            ..Default::default()
        }
    }

    /// Set the page cache capacity.
    pub fn with_cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = bytes;
        self
    }

    /// Convert to sled configuration.
    pub(crate) fn to_sled_config(&self) -> sled::Config {
        let mut config = sled::Config::new()
            .cache_capacity(self.cache_capacity)
            .use_compression(true);

        if self.temporary {
            config = config.temporary(true);
        } else {
            config = config.path(&self.path);
        }

        config.flush_every_ms(self.flush_every_ms)
    }
}

/// A durable store on sled.
///
/// Units of work are buffered and committed with a single atomic batch.
pub struct SledStore {
    db: Db,
    records: Tree,
}

impl SledStore {
    /// Open or create a store.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let db = config.to_sled_config().open()?;
        let records = db.open_tree(RECORDS_TREE)?;
        debug!(
            recovered = db.was_recovered(),
            temporary = config.temporary,
            "Record store opened"
        );
        Ok(Self { db, records })
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    fn model_prefix(model: &str) -> Vec<u8> {
        let mut prefix = model.as_bytes().to_vec();
        prefix.push(MODEL_SEPARATOR);
        prefix
    }

    fn encode_key(model: &str, key: &[Value]) -> Result<Vec<u8>, StoreError> {
        let mut bytes = Self::model_prefix(model);
        let encoded = rkyv::to_bytes::<rkyv::rancor::Error>(&key.to_vec())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        bytes.extend_from_slice(&encoded);
        Ok(bytes)
    }
}

impl Backend for SledStore {
    fn load(&self, model: &str, key: &[Value]) -> Result<Option<Record>, StoreError> {
        match self.records.get(Self::encode_key(model, key)?)? {
            Some(bytes) => Ok(Some(Record::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan_model(&self, model: &str) -> Result<Vec<Record>, StoreError> {
        let mut rows = Vec::new();
        for entry in self.records.scan_prefix(Self::model_prefix(model)) {
            let (_, bytes) = entry?;
            rows.push(Record::from_bytes(&bytes)?);
        }
        Ok(rows)
    }

    fn apply(&self, ops: Vec<PendingOp>) -> Result<(), StoreError> {
        let mut batch = Batch::default();
        for op in ops {
            match op {
                PendingOp::Put(record) => {
                    let key = Self::encode_key(&record.model, &record.key)?;
                    batch.insert(key, record.to_bytes()?);
                }
                PendingOp::Delete { model, key } => {
                    batch.remove(Self::encode_key(&model, &key)?);
                }
            }
        }
        self.records.apply_batch(batch)?;
        Ok(())
    }
}

impl Persistence for SledStore {
    fn get(&self, model: &str, key: &[Value]) -> Result<Option<Record>, StoreError> {
        self.load(model, key)
    }

    fn insert(&self, record: Record) -> Result<(), StoreError> {
        let key = Self::encode_key(&record.model, &record.key)?;
        self.records.insert(key, record.to_bytes()?)?;
        Ok(())
    }

    fn scan(&self, model: &str) -> Result<Vec<Record>, StoreError> {
        self.scan_model(model)
    }

    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>, StoreError> {
        Ok(Box::new(BufferedUnit::new(self)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_scan() {
        let store = SledStore::open(StoreConfig::temporary()).unwrap();
        store
            .insert(Record::new("Comment", [1i64]).with_field("article_id", 7i64))
            .unwrap();
        store
            .insert(Record::new("Comment", [2i64]).with_field("article_id", 7i64))
            .unwrap();
        store.insert(Record::new("CommentDraft", [1i64])).unwrap();

        let found = store.get("Comment", &[Value::Int(1)]).unwrap().unwrap();
        assert_eq!(found.get("article_id"), Some(&Value::Int(7)));
        assert_eq!(store.scan("Comment").unwrap().len(), 2);
        assert!(store.get("Comment", &[Value::Int(3)]).unwrap().is_none());
    }

    #[test]
    fn test_commit_applies_batch() {
        let store = SledStore::open(StoreConfig::temporary()).unwrap();
        let record = Record::new("Comment", [1i64]).with_field("article_id", 7i64);
        store.insert(record.clone()).unwrap();

        let mut unit = store.begin().unwrap();
        unit.update_fields(&record, &[("article_id".to_string(), Value::Null)])
            .unwrap();
        assert_eq!(
            store.get("Comment", &[Value::Int(1)]).unwrap().unwrap().get("article_id"),
            Some(&Value::Int(7))
        );
        unit.commit().unwrap();

        let stored = store.get("Comment", &[Value::Int(1)]).unwrap().unwrap();
        assert_eq!(stored.get("article_id"), Some(&Value::Null));
    }

    #[test]
    fn test_string_keys() {
        let store = SledStore::open(StoreConfig::temporary()).unwrap();
        store.insert(Record::new("Author", ["John", "Doe"])).unwrap();
        let key = [Value::from("John"), Value::from("Doe")];
        assert!(store.get("Author", &key).unwrap().is_some());
    }
}
