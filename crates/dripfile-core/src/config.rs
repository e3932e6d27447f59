//! Store construction parameters
//!
//! Plain in-process options. How the surrounding application sources
//! these values (files, environment, flags) is its own concern.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::storage::SyncResult;

/// Transforms the in-memory document into its on-disk payload before a
/// write. Dual of [`AfterLoadHook`]; lets the persisted shape omit
/// in-memory-only derived state.
pub type BeforeSyncHook = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Transforms the raw stored payload into the in-memory document shape
/// after a load (e.g., building indices from a plain list).
pub type AfterLoadHook = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Observability hook invoked once per completed write.
pub type AfterSyncHook = Arc<dyn Fn(&SyncResult) + Send + Sync>;

/// Default minimum spacing between non-urgent writes.
pub const DEFAULT_SYNC_THROTTLE: Duration = Duration::from_millis(5000);

/// Store construction parameters.
#[derive(Clone)]
pub struct StoreOptions {
    /// Path of the store file. Exclusively owned by one store instance
    /// per process; no file locking is performed.
    pub path: PathBuf,
    /// Minimum wall-clock spacing between non-urgent writes.
    pub sync_throttle: Duration,
    /// Serialize the store file as human-readable multi-line JSON.
    pub prettify: bool,
    /// Document used when no file exists yet.
    pub initial_data: Value,
    /// Treat a missing file at construction time as a fatal error
    /// instead of starting empty.
    pub must_exist: bool,
    /// Optional serialization hook applied before each write.
    pub before_sync: Option<BeforeSyncHook>,
    /// Optional observability hook receiving each completed write.
    pub after_sync: Option<AfterSyncHook>,
    /// Optional deserialization hook applied after load.
    pub after_load: Option<AfterLoadHook>,
}

impl StoreOptions {
    /// Options for a store at `path`, everything else defaulted.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sync_throttle: DEFAULT_SYNC_THROTTLE,
            prettify: true,
            initial_data: Value::Object(Map::new()),
            must_exist: false,
            before_sync: None,
            after_sync: None,
            after_load: None,
        }
    }

    /// Set the minimum spacing between non-urgent writes.
    pub fn sync_throttle(mut self, throttle: Duration) -> Self {
        self.sync_throttle = throttle;
        self
    }

    pub fn prettify(mut self, prettify: bool) -> Self {
        self.prettify = prettify;
        self
    }

    /// Set the document used when no file exists yet.
    pub fn initial_data(mut self, data: Value) -> Self {
        self.initial_data = data;
        self
    }

    pub fn must_exist(mut self, must_exist: bool) -> Self {
        self.must_exist = must_exist;
        self
    }

    /// Transform the document into its on-disk payload before each write.
    pub fn before_sync(mut self, hook: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        self.before_sync = Some(Arc::new(hook));
        self
    }

    /// Observe every completed write.
    pub fn after_sync(mut self, hook: impl Fn(&SyncResult) + Send + Sync + 'static) -> Self {
        self.after_sync = Some(Arc::new(hook));
        self
    }

    /// Transform the raw stored payload into the in-memory shape on load.
    pub fn after_load(mut self, hook: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.after_load = Some(Arc::new(hook));
        self
    }
}
