//! PartsDesk Session Stores
//!
//! Implementations of [`partsdesk_core::SessionStore`]:
//! - `MemorySessionStore`: process-local, for tests and embedding
//! - `FileSessionStore`: JSON file with atomic replace, survives restarts

pub mod atomic_writer;
pub mod file_store;
pub mod memory;

pub use file_store::FileSessionStore;
pub use memory::MemorySessionStore;
