//! Write scheduler
//!
//! Decides when a physical write actually runs, given update/flush
//! requests arriving at arbitrary times, a minimum inter-write interval,
//! and an at-most-one-concurrent-write invariant.
//!
//! The scheduler is an explicit three-state machine:
//!
//! - **Idle**: no write in flight, nothing scheduled
//! - **Scheduled**: a batch is armed and waiting out the throttle window
//! - **Writing**: a write is executing; requests arriving now coalesce
//!   into a follow-up batch whose timer is armed only once the in-flight
//!   write finishes
//!
//! Every request that contributed to a batch observes the same outcome
//! through a shared watch channel. The throttle window is anchored to
//! the completion of the previous write, so sustained update streams
//! still respect a strict minimum inter-write spacing.
//!
//! Scheduling never fails: a write is always arranged. Only the write
//! operation itself can fail, and that failure is delivered to exactly
//! the callers whose requests were coalesced into the failing batch.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::storage::record::now_millis;
use crate::storage::{StorageError, SyncResult};

/// Outcome shared by every request coalesced into one batch.
pub type WriteOutcome = Result<SyncResult, Arc<StorageError>>;

/// Receiver half of a batch's shared outcome. Resolves once the batch's
/// write completes, successfully or not.
pub type OutcomeReceiver = watch::Receiver<Option<WriteOutcome>>;

/// The injected write operation. Runs at most once concurrently.
pub(crate) type WriteFn =
    Arc<dyn Fn() -> BoxFuture<'static, Result<SyncResult, StorageError>> + Send + Sync>;

/// A pending coalesced write. At most one exists at any instant; it is
/// destroyed the moment its write begins executing.
struct Batch {
    /// Sticky urgency: once any contributing request is urgent, the
    /// whole batch bypasses the throttle.
    urgent: bool,
    /// Armed throttle timer, present only while waiting.
    timer: Option<JoinHandle<()>>,
    /// Broadcasts the batch outcome to every contributing caller.
    done: watch::Sender<Option<WriteOutcome>>,
}

impl Batch {
    fn new(urgent: bool) -> Self {
        let (done, _) = watch::channel(None);
        Self {
            urgent,
            timer: None,
            done,
        }
    }

    fn subscribe(&self) -> OutcomeReceiver {
        self.done.subscribe()
    }
}

enum State {
    Idle,
    Scheduled(Batch),
    Writing { next: Option<Batch> },
}

/// Schedules writes so that at most one is in flight and non-urgent
/// writes keep a minimum spacing from the previous completed write.
pub(crate) struct WriteScheduler {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    /// Completion time of the last successful write, ms since epoch.
    last_sync_ms: AtomicI64,
    throttle: Duration,
    write: WriteFn,
}

impl WriteScheduler {
    /// Create a scheduler anchored at `last_sync_ms` (typically the
    /// metadata value from the initial load).
    pub(crate) fn new(throttle: Duration, last_sync_ms: i64, write: WriteFn) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Idle),
                last_sync_ms: AtomicI64::new(last_sync_ms),
                throttle,
                write,
            }),
        }
    }

    /// Arrange a future write and return a handle on its batch outcome.
    ///
    /// An urgent request made while a non-urgent batch is waiting
    /// promotes that batch instead of creating a second one.
    pub(crate) fn request_write(&self, urgent: bool) -> OutcomeReceiver {
        Shared::request_write(&self.shared, urgent)
    }
}

impl Shared {
    fn request_write(this: &Arc<Self>, urgent: bool) -> OutcomeReceiver {
        let mut state = this.lock_state();

        // A write is executing: coalesce into the follow-up batch. Its
        // timer is armed only once the in-flight write finishes, since
        // the throttle window is measured from that completion.
        if let State::Writing { next } = &mut *state {
            let batch = next.get_or_insert_with(|| Batch::new(false));
            batch.urgent |= urgent;
            return batch.subscribe();
        }

        // Already scheduled: merge into the existing batch, never create
        // a second one. Urgency clears the timer and runs right away.
        if let State::Scheduled(batch) = &mut *state {
            batch.urgent |= urgent;
            let rx = batch.subscribe();
            if urgent {
                if let State::Scheduled(mut batch) =
                    std::mem::replace(&mut *state, State::Writing { next: None })
                {
                    if let Some(timer) = batch.timer.take() {
                        timer.abort();
                    }
                    drop(state);
                    Self::spawn_write(this, batch);
                }
            }
            return rx;
        }

        // Idle: run now if urgent or past the throttle window, otherwise
        // arm a timer for the remainder of the window.
        let mut batch = Batch::new(urgent);
        let rx = batch.subscribe();
        let wait = if urgent {
            Duration::ZERO
        } else {
            this.throttle_wait()
        };
        if wait.is_zero() {
            *state = State::Writing { next: None };
            drop(state);
            Self::spawn_write(this, batch);
        } else {
            batch.timer = Some(Self::arm_timer(this, wait));
            *state = State::Scheduled(batch);
        }
        rx
    }

    /// Remaining throttle window, measured from the last completed
    /// write. A negative computed wait clamps to zero.
    fn throttle_wait(&self) -> Duration {
        let due = self.last_sync_ms.load(Ordering::Acquire) + self.throttle.as_millis() as i64;
        let wait = due - now_millis();
        if wait <= 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(wait as u64)
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Arm the throttle timer for the currently scheduled batch.
    fn arm_timer(this: &Arc<Self>, wait: Duration) -> JoinHandle<()> {
        let shared = Arc::clone(this);
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            Shared::timer_fired(&shared);
        })
    }

    /// Timer expiry: move the scheduled batch into execution. A batch
    /// promoted to urgent in the meantime has already detached itself,
    /// in which case there is nothing left to do.
    fn timer_fired(this: &Arc<Self>) {
        let mut state = this.lock_state();
        if !matches!(&*state, State::Scheduled(_)) {
            return;
        }
        if let State::Scheduled(batch) =
            std::mem::replace(&mut *state, State::Writing { next: None })
        {
            drop(state);
            Self::spawn_write(this, batch);
        }
    }

    /// Execute a batch, then decide the fate of any follow-up batch that
    /// accumulated during the write: urgent follow-ups run back to back,
    /// non-urgent ones wait out the throttle window anchored to the write
    /// that just finished.
    fn spawn_write(this: &Arc<Self>, batch: Batch) {
        let shared = Arc::clone(this);
        tokio::spawn(async move {
            let mut batch = batch;
            loop {
                let outcome = (shared.write)().await;
                match &outcome {
                    Ok(_) => {
                        shared.last_sync_ms.store(now_millis(), Ordering::Release);
                    }
                    Err(err) => {
                        warn!(error = %err, "batch write failed");
                    }
                }
                let _ = batch.done.send(Some(outcome.map_err(Arc::new)));

                let mut state = shared.lock_state();
                let next = match &mut *state {
                    State::Writing { next } => next.take(),
                    // Only this task leaves the Writing state.
                    _ => None,
                };
                match next {
                    None => {
                        *state = State::Idle;
                        return;
                    }
                    Some(follow_up) => {
                        let wait = if follow_up.urgent {
                            Duration::ZERO
                        } else {
                            shared.throttle_wait()
                        };
                        if wait.is_zero() {
                            *state = State::Writing { next: None };
                            drop(state);
                            batch = follow_up;
                            continue;
                        }
                        let mut follow_up = follow_up;
                        follow_up.timer = Some(Self::arm_timer(&shared, wait));
                        *state = State::Scheduled(follow_up);
                        return;
                    }
                }
            }
        });
    }
}
