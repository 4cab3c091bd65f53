//! Native foreign key constraint management.
//!
//! Constraint names and referential actions are derived from relations;
//! stores expose what they can do through [`SchemaAdapter`].

mod adapter;
mod constraint;
mod manager;
mod sql;

pub use adapter::{AdapterRegistry, SchemaAdapter};
pub use constraint::{constraint_name, NativeConstraint};
pub use manager::{MigrationOutcome, MigrationStep, SchemaConstraintManager, SkipReason};
pub use sql::{Dialect, SqlExecutor, SqlSchemaAdapter};
