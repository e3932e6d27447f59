//! Store facade
//!
//! Composes the merge engine, persistence layer, and write scheduler
//! behind the snapshot/update/flush surface that callers use.
//!
//! ## Usage
//!
//! ```ignore
//! let store = Store::open(StoreOptions::new("data/store.json"))?;
//!
//! store.update(json!({ "count": 1 }));          // instant, in memory
//! store.update(json!({ "count": 2 }));          // coalesced with above
//! let result = store.flush().await?;            // forced to disk
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use thiserror::Error;

use crate::config::{AfterSyncHook, StoreOptions};
use crate::merge;
use crate::scheduler::{WriteFn, WriteScheduler};
use crate::storage::record::now_millis;
use crate::storage::{FilePersistence, Metadata, StorageError, SyncResult};

/// Errors surfaced by the store facade.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Fatal problem at construction time, e.g. a required file that
    /// does not exist.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The batch this caller contributed to failed to reach disk. Every
    /// caller coalesced into the same batch observes the same failure.
    #[error("failed to sync store file: {0}")]
    SyncFailed(Arc<StorageError>),

    /// The write task disappeared without reporting an outcome.
    #[error("write scheduler stopped before the batch completed")]
    SchedulerStopped,
}

/// The live document plus its metadata. Single-writer: every mutation
/// happens under the lock, and no lock is ever held across an await.
struct DocState {
    document: Value,
    meta: Metadata,
}

/// Throttled, write-coalescing persistent document store.
///
/// Updates land instantly in memory; physical writes are rate-limited,
/// coalesced, and serialized so at most one write is ever in flight.
/// The store file is exclusively owned by one instance per process.
///
/// Must be used from within a Tokio runtime; write scheduling relies on
/// its timers and tasks.
pub struct Store {
    state: Arc<Mutex<DocState>>,
    scheduler: WriteScheduler,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open the store, loading the file at `options.path` if present.
    ///
    /// When `open` returns, the initial load has completed. A missing
    /// file starts the store from `options.initial_data`, unless
    /// `options.must_exist` is set, in which case it is a fatal
    /// configuration error. A file that fails to parse or fails
    /// structural validation is treated as absent, never as a crash.
    pub fn open(options: StoreOptions) -> Result<Self, StoreError> {
        let persistence = Arc::new(FilePersistence::new(
            options.path,
            options.prettify,
            options.must_exist,
            options.before_sync,
            options.after_load,
        ));

        let (document, meta) = match persistence.load()? {
            Some((document, meta)) => (document, meta),
            None => (options.initial_data, Metadata::new(now_millis())),
        };
        let last_sync = meta.last_sync;

        let state = Arc::new(Mutex::new(DocState { document, meta }));
        let write = Self::write_fn(Arc::clone(&state), persistence, options.after_sync);
        let scheduler = WriteScheduler::new(options.sync_throttle, last_sync, write);

        Ok(Self { state, scheduler })
    }

    /// The write operation handed to the scheduler: snapshot the
    /// document at the moment the write begins (so it includes every
    /// update applied since the batch was requested), persist it, then
    /// commit the new `last_sync` to the in-memory metadata. A failed
    /// save leaves the in-memory state untouched.
    fn write_fn(
        state: Arc<Mutex<DocState>>,
        persistence: Arc<FilePersistence>,
        after_sync: Option<AfterSyncHook>,
    ) -> WriteFn {
        Arc::new(move || {
            let state = Arc::clone(&state);
            let persistence = Arc::clone(&persistence);
            let after_sync = after_sync.clone();
            Box::pin(async move {
                let now = now_millis();
                let (document, mut meta) = {
                    let state = lock(&state);
                    (state.document.clone(), state.meta)
                };
                meta.last_sync = now;

                let result = persistence.save(&document, &meta)?;

                lock(&state).meta.last_sync = now;
                if let Some(hook) = &after_sync {
                    hook(&result);
                }
                Ok(result)
            })
        })
    }

    /// Read-only snapshot of the current document.
    pub fn snapshot(&self) -> Value {
        lock(&self.state).document.clone()
    }

    /// Current metadata.
    pub fn metadata(&self) -> Metadata {
        lock(&self.state).meta
    }

    /// Apply a partial update to the document and arrange a throttled
    /// write. The merge happens synchronously; the write is
    /// fire-and-forget. Fields set to [`merge::DELETE`] are removed,
    /// nested objects merge recursively, everything else replaces.
    pub fn update(&self, partial: Value) {
        {
            let mut state = lock(&self.state);
            merge::apply(&mut state.document, partial);
            state.meta.last_update = now_millis();
        }
        let _ = self.scheduler.request_write(false);
    }

    /// Force a write that bypasses the throttle and resolve once it is
    /// on disk. The persisted snapshot contains at least every update
    /// applied before this call. A flush requested while a non-urgent
    /// write is pending promotes that batch rather than adding one.
    pub async fn flush(&self) -> Result<SyncResult, StoreError> {
        let mut rx = self.scheduler.request_write(true);
        let outcome = rx
            .wait_for(|outcome| outcome.is_some())
            .await
            .map_err(|_| StoreError::SchedulerStopped)?;
        match outcome.as_ref() {
            Some(Ok(result)) => Ok(result.clone()),
            Some(Err(err)) => Err(StoreError::SyncFailed(Arc::clone(err))),
            None => Err(StoreError::SchedulerStopped),
        }
    }
}

fn lock(state: &Arc<Mutex<DocState>>) -> MutexGuard<'_, DocState> {
    state
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
