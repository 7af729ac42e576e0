//! Key/value storage collaborator backing the registry.

pub mod engine;
pub mod error;
pub mod memory;
pub mod transaction;

pub use engine::{Store, StoreExt, TableVisitor};
pub use error::StorageError;
pub use memory::MemoryStore;
pub use transaction::{Command, Transaction};
