//! Storage layer
//!
//! Reads and writes the stored record (document plus metadata) as a
//! single JSON file on disk. Validation failures on load are downgraded
//! to absent data; only writes surface errors.

pub mod error;
pub mod persistence;
pub mod record;

pub use error::{StorageError, StorageResult};
pub use persistence::{FilePersistence, SyncResult};
pub use record::{Metadata, StoredRecord};
