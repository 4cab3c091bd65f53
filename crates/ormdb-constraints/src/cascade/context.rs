//! Per-deletion state.

use std::collections::HashSet;

use super::report::DeletionReport;
use crate::storage::{Record, Value};

type RecordId = (String, Vec<Value>);

/// Position in a [`DeletionContext`] that can be restored after a rolled-back subtree.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ContextMark {
    visited: usize,
    deleted: usize,
    nullified: usize,
    failures: usize,
}

/// State of one parent deletion.
///
/// Holds the parent, the dependent instances the caller has already loaded,
/// and the records visited so far so cycles are cut.
pub struct DeletionContext<'a> {
    parent: &'a Record,
    loaded: &'a mut [Record],
    relation: Option<String>,
    report: DeletionReport,
    visited: HashSet<RecordId>,
    visit_log: Vec<RecordId>,
}

impl<'a> DeletionContext<'a> {
    /// Create a context for deleting `parent`.
    ///
    /// The parent counts as visited from the start, so a cascade that cycles
    /// back to it never deletes it from under the caller.
    pub fn new(parent: &'a Record, loaded: &'a mut [Record]) -> Self {
        let mut ctx = Self {
            parent,
            loaded,
            relation: None,
            report: DeletionReport::new(),
            visited: HashSet::new(),
            visit_log: Vec::new(),
        };
        ctx.enter(parent);
        ctx
    }

    /// The record being deleted.
    pub fn parent(&self) -> &'a Record {
        self.parent
    }

    /// The full key of the record being deleted.
    pub fn parent_key(&self) -> &'a [Value] {
        &self.parent.key
    }

    /// The top-level relation currently being enforced.
    pub fn relation(&self) -> Option<&str> {
        self.relation.as_deref()
    }

    /// The report so far.
    pub fn report(&self) -> &DeletionReport {
        &self.report
    }

    pub(crate) fn set_relation(&mut self, relation: &str) {
        self.relation = Some(relation.to_string());
    }

    /// Mark a record as visited; false if it already was.
    pub(crate) fn enter(&mut self, record: &Record) -> bool {
        let id = (record.model.clone(), record.key.clone());
        if !self.visited.insert(id.clone()) {
            return false;
        }
        self.visit_log.push(id);
        true
    }

    pub(crate) fn record_deleted(&mut self, record: &Record) {
        self.report
            .deleted
            .push((record.model.clone(), record.key.clone()));
    }

    pub(crate) fn record_nullified(&mut self, record: &Record, fields: &[String]) {
        self.report
            .nullified
            .push((record.model.clone(), record.key.clone(), fields.to_vec()));
    }

    pub(crate) fn record_failure(&mut self, violation: crate::error::ConstraintViolation) {
        self.report.failures.push(violation);
    }

    pub(crate) fn mark(&self) -> ContextMark {
        ContextMark {
            visited: self.visit_log.len(),
            deleted: self.report.deleted.len(),
            nullified: self.report.nullified.len(),
            failures: self.report.failures.len(),
        }
    }

    /// Forget everything recorded after `mark`.
    pub(crate) fn restore(&mut self, mark: ContextMark) {
        for id in self.visit_log.drain(mark.visited..) {
            self.visited.remove(&id);
        }
        self.report.deleted.truncate(mark.deleted);
        self.report.nullified.truncate(mark.nullified);
        self.report.failures.truncate(mark.failures);
    }

    /// Finish the deletion after a successful commit.
    ///
    /// Loaded dependents whose foreign key was nulled in storage get the same
    /// fields nulled in memory.
    pub fn finish(self) -> DeletionReport {
        self.report.apply_to_loaded(self.loaded);
        self.report
    }
}
