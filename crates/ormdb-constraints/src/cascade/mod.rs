//! Deletion-time enforcement of constraint policies.

mod context;
mod engine;
mod report;

pub use context::DeletionContext;
pub use engine::DeletionPolicyEngine;
pub use report::DeletionReport;
