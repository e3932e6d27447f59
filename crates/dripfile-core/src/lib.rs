//! dripfile core library
//!
//! A throttled, write-coalescing persistent document store: an in-memory
//! JSON document backed by a single file, where updates land instantly
//! in memory while physical writes are rate-limited, deduplicated, and
//! serialized so that at most one write is ever in flight.
//!
//! # Quick Start
//!
//! ```ignore
//! let store = Store::open(StoreOptions::new("followers.json"))?;
//!
//! // Instant in-memory merges; writes are throttled and coalesced.
//! store.update(json!({ "alice": { "since": 1700000000000_i64 } }));
//! store.update(json!({ "bob": merge::DELETE }));
//!
//! // Force the coalesced batch to disk before shutdown.
//! store.flush().await?;
//! ```
//!
//! # Modules
//!
//! - `store`: store facade (main entry point)
//! - `scheduler`: write scheduling state machine
//! - `storage`: persistence for the stored record
//! - `merge`: deep merge engine for partial updates
//! - `config`: store construction parameters

pub mod config;
pub mod merge;
pub mod scheduler;
pub mod storage;
pub mod store;

pub use config::{AfterLoadHook, AfterSyncHook, BeforeSyncHook, StoreOptions};
pub use merge::DELETE;
pub use scheduler::{OutcomeReceiver, WriteOutcome};
pub use store::{Store, StoreError};
pub use storage::{Metadata, StorageError, StoredRecord, SyncResult};
