//! Persistence layer.
//!
//! This module defines the record store interface used by the policy engine
//! and two stores: an in-memory reference store and a sled-based durable store.

mod buffered;
mod memory;
mod persistence;
mod record;
mod sled_store;
mod value;

pub use memory::MemoryStore;
pub use persistence::{Persistence, Savepoint, UnitOfWork};
pub use record::Record;
pub use sled_store::{SledStore, StoreConfig};
pub use value::Value;
