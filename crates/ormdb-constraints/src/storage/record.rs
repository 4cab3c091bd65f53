//! Record type for stored rows.

use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};

use super::value::Value;
use crate::error::StoreError;

/// A stored row: model, key and ordered field values.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct Record {
    /// Model name.
    pub model: String,
    /// Key values, in the model's key field order.
    pub key: Vec<Value>,
    /// Non-key field values.
    pub fields: Vec<(String, Value)>,
}

impl Record {
    /// Create a record with no fields.
    pub fn new(model: impl Into<String>, key: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self {
            model: model.into(),
            key: key.into_iter().map(Into::into).collect(),
            fields: Vec::new(),
        }
    }

    /// Set a field, builder style.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Get a field value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Set a field value, adding the field if missing.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Values of the given fields; missing fields read as null.
    pub fn values_of(&self, fields: &[String]) -> Vec<Value> {
        fields
            .iter()
            .map(|f| self.get(f).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Check if `fields` hold exactly `key` (a null never references anything).
    pub fn references(&self, fields: &[String], key: &[Value]) -> bool {
        fields.len() == key.len()
            && fields
                .iter()
                .zip(key)
                .all(|(f, k)| !k.is_null() && self.get(f) == Some(k))
    }

    /// Check if this record is the row identified by `model` and `key`.
    pub fn is(&self, model: &str, key: &[Value]) -> bool {
        self.model == model && self.key == key
    }

    /// Render the key for messages, e.g. `(1)` or `("John", "Doe")`.
    pub fn key_display(&self) -> String {
        render_key(&self.key)
    }

    /// Serialize the record to bytes using rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Deserialize a record from bytes using rkyv.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let mut aligned = AlignedVec::<16>::new();
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| StoreError::Deserialization(e.to_string()))
    }
}

/// Render key values for messages.
pub(crate) fn render_key(key: &[Value]) -> String {
    let parts: Vec<String> = key.iter().map(ToString::to_string).collect();
    format!("({})", parts.join(", "))
}
