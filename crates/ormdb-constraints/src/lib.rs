//! ORMDB Constraints - Referential integrity for deleted records.
//!
//! Every relation carries a constraint policy that decides what happens to
//! dependent records when their parent is deleted, and the native foreign
//! key constraints mirroring those policies are created and dropped through
//! the repository's schema adapter.

pub mod cascade;
pub mod catalog;
pub mod config;
pub mod constraints;
pub mod error;
pub mod schema;
pub mod storage;

pub use cascade::{DeletionContext, DeletionPolicyEngine, DeletionReport};
pub use catalog::{
    Cardinality, ConstraintPolicy, JoinDef, ModelDef, ModelRegistry, ReferentialAction,
    RelationDef, RelationshipMetadata,
};
pub use config::ConstraintConfig;
pub use constraints::Constraints;
pub use error::{
    AdapterError, CascadeAction, ConfigurationError, ConstraintViolation, Error, StoreError,
};
pub use schema::{
    AdapterRegistry, Dialect, MigrationOutcome, MigrationStep, NativeConstraint,
    SchemaAdapter, SchemaConstraintManager, SkipReason, SqlExecutor, SqlSchemaAdapter,
};
pub use storage::{
    MemoryStore, Persistence, Record, Savepoint, SledStore, StoreConfig, UnitOfWork, Value,
};
