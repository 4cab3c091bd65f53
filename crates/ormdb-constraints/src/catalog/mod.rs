//! Model and relation catalog.
//!
//! Models register their relations explicitly; every relation carries exactly
//! one constraint policy, validated when it is declared.

mod model;
mod policy;
mod registry;
mod relation;

pub use model::ModelDef;
pub use policy::{ConstraintPolicy, ReferentialAction};
pub use registry::ModelRegistry;
pub use relation::{Cardinality, JoinDef, RelationDef, RelationshipMetadata};
