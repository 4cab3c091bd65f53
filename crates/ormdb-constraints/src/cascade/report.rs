//! Outcome of a cascading delete.

use crate::error::ConstraintViolation;
use crate::storage::{Record, Value};

/// Result of a cascading delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionReport {
    /// Records that were deleted, dependents first and the parent last.
    pub deleted: Vec<(String, Vec<Value>)>,
    /// Records whose foreign key fields were set to null.
    pub nullified: Vec<(String, Vec<Value>, Vec<String>)>,
    /// Dependent failures tolerated under the non-strict `destroy` policy.
    pub failures: Vec<ConstraintViolation>,
}

impl DeletionReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the total number of affected records.
    pub fn affected_count(&self) -> usize {
        self.deleted.len() + self.nullified.len()
    }

    /// Check if every dependent was handled without tolerated failures.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Check if the given record was deleted.
    pub fn was_deleted(&self, model: &str, key: &[Value]) -> bool {
        self.deleted.iter().any(|(m, k)| m == model && k == key)
    }

    /// Check if the given record had its foreign key nulled.
    pub fn was_nullified(&self, model: &str, key: &[Value]) -> bool {
        self.nullified.iter().any(|(m, k, _)| m == model && k == key)
    }

    /// Null the foreign key fields of loaded instances that were nulled in storage.
    ///
    /// Returns the number of instances updated.
    pub fn apply_to_loaded(&self, loaded: &mut [Record]) -> usize {
        let mut updated = 0;
        for record in loaded.iter_mut() {
            let nulled = self
                .nullified
                .iter()
                .find(|(model, key, _)| record.is(model, key));
            if let Some((_, _, fields)) = nulled {
                for field in fields {
                    record.set(field.clone(), Value::Null);
                }
                updated += 1;
            }
        }
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_to_loaded() {
        let report = DeletionReport {
            nullified: vec![(
                "Revision".to_string(),
                vec![Value::Int(1)],
                vec!["article_id".to_string()],
            )],
            ..Default::default()
        };
        let mut loaded = vec![
            Record::new("Revision", [1i64]).with_field("article_id", 5i64),
            Record::new("Revision", [2i64]).with_field("article_id", 5i64),
        ];

        assert_eq!(report.apply_to_loaded(&mut loaded), 1);
        assert_eq!(loaded[0].get("article_id"), Some(&Value::Null));
        assert_eq!(loaded[1].get("article_id"), Some(&Value::Int(5)));
        assert!(report.was_nullified("Revision", &[Value::Int(1)]));
        assert_eq!(report.affected_count(), 1);
    }
}
