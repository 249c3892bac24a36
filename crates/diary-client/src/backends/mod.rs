//! Local implementations of the remote collaborator traits.

pub mod fs;
pub mod memory;

pub use fs::FsObjectStore;
pub use memory::{MemoryDocumentStore, MemoryObjectStore, StaticIdentity};
