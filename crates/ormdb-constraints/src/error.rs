//! Error types for constraint configuration, enforcement and schema management.

use std::fmt;

use thiserror::Error;

use crate::catalog::ConstraintPolicy;

/// Errors raised while defining models and relations.
///
/// These are always reported eagerly, when the definition is made, never
/// deferred to the first delete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// The policy token is not one of the recognized policies.
    #[error("unknown constraint policy '{0}'")]
    UnknownPolicy(String),

    /// The policy cannot be combined with the relation's shape.
    #[error("constraint policy {policy} is incompatible with relation {relation}: {reason}")]
    IncompatiblePolicy {
        /// Relation name.
        relation: String,
        /// Rejected policy.
        policy: ConstraintPolicy,
        /// Why the combination is rejected.
        reason: String,
    },

    /// Foreign key and referenced key have different arity.
    #[error(
        "relation {relation} maps {foreign_key} foreign key field(s) onto {key} key field(s)"
    )]
    KeyArityMismatch {
        /// Relation name.
        relation: String,
        /// Number of foreign key fields.
        foreign_key: usize,
        /// Number of referenced key fields.
        key: usize,
    },

    /// A many-to-many relation was declared without a join model.
    #[error("many-to-many relation {0} has no join model")]
    MissingJoin(String),

    /// A model with the same name is already registered.
    #[error("model {0} is already registered")]
    DuplicateModel(String),

    /// A relation with the same name is already declared on the model.
    #[error("relation {relation} is declared twice on model {model}")]
    DuplicateRelation {
        /// Declaring model.
        model: String,
        /// Relation name.
        relation: String,
    },

    /// The model is not known to the registry.
    #[error("model {0} is not registered")]
    UnknownModel(String),

    /// Configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// The mutation that was attempted on a dependent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeAction {
    /// The dependent was being deleted.
    Delete,
    /// The dependent's foreign key was being set to null.
    Nullify,
}

impl fmt::Display for CascadeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CascadeAction::Delete => write!(f, "delete"),
            CascadeAction::Nullify => write!(f, "nullify"),
        }
    }
}

/// Deletion-time refusals produced by the policy engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintViolation {
    /// Dependents exist under a `Protect` relation.
    #[error(
        "cannot delete {model} {key}: {count} dependent {dependent_model} record(s) via {relation}"
    )]
    Protected {
        /// Model of the record being deleted.
        model: String,
        /// Rendered key of the record being deleted.
        key: String,
        /// Relation that blocked the deletion.
        relation: String,
        /// Model of the dependents.
        dependent_model: String,
        /// Number of dependents found.
        count: usize,
    },

    /// A dependent mutation failed under a strict policy.
    #[error("failed to {action} dependent {dependent_model} {key} via {relation}: {reason}")]
    DependentDeleteFailed {
        /// Relation being enforced.
        relation: String,
        /// Model of the dependent.
        dependent_model: String,
        /// Rendered key of the dependent.
        key: String,
        /// Attempted mutation.
        action: CascadeAction,
        /// Underlying failure.
        reason: String,
    },

    /// Dependents could not be loaded.
    #[error("failed to load dependents via {relation}: {reason}")]
    DependentLookupFailed {
        /// Relation being enforced.
        relation: String,
        /// Underlying failure.
        reason: String,
    },

    /// The cascade recursed deeper than allowed.
    #[error("cascade exceeded maximum depth of {depth}")]
    CascadeTooDeep {
        /// Configured maximum depth.
        depth: usize,
    },
}

/// Persistence layer errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// sled error.
    #[error("storage error: {0}")]
    Sled(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Record not found.
    #[error("record not found: {model} {key}")]
    NotFound {
        /// Model name.
        model: String,
        /// Rendered key.
        key: String,
    },

    /// The store refused the write.
    #[error("write rejected: {0}")]
    Rejected(String),

    /// Transaction error.
    #[error("transaction error: {0}")]
    Transaction(String),
}

/// Schema adapter errors.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// A DDL statement or catalog query failed.
    #[error("failed to execute `{statement}`: {reason}")]
    Execution {
        /// The statement that failed.
        statement: String,
        /// Driver-reported reason.
        reason: String,
    },

    /// The backing store has no notion of native constraints.
    #[error("adapter does not support {0}")]
    Unsupported(String),
}

/// Crate-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid model or relation definition.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Deletion refused by a constraint policy.
    #[error("constraint violation: {0}")]
    Violation(#[from] ConstraintViolation),

    /// Persistence layer error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Schema adapter error.
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// A violation occurred after a best-effort unit had already written changes.
    #[error("cascade partially applied, {applied} mutation(s) could not be rolled back: {violation}")]
    PartialCascade {
        /// The violation that stopped the cascade.
        violation: ConstraintViolation,
        /// Mutations already written before the failure.
        applied: usize,
    },

    /// A strict policy was asked to run without an atomic unit of work.
    #[error("constraint policy {policy} on relation {relation} requires an atomic unit of work")]
    AtomicityUnavailable {
        /// Relation name.
        relation: String,
        /// Policy that requires atomicity.
        policy: ConstraintPolicy,
    },
}

impl Error {
    /// The constraint violation behind this error, if any.
    pub fn violation(&self) -> Option<&ConstraintViolation> {
        match self {
            Error::Violation(violation) => Some(violation),
            Error::PartialCascade { violation, .. } => Some(violation),
            _ => None,
        }
    }

    /// Check if the deletion was refused by a `Protect` relation.
    pub fn is_protected(&self) -> bool {
        matches!(self.violation(), Some(ConstraintViolation::Protected { .. }))
    }
}
