//! Debounced write-back of bucket snapshots.
//!
//! Per bucket the scheduler runs this state machine:
//!
//! ```text
//!            mutation                 quiet period elapses
//!   Clean ─────────────▶ PendingFlush ─────────────────────▶ Flushing ──▶ Clean
//!                         │      ▲                              │
//!                         └──────┘ mutation: restart timer      │ mutation during flush:
//!                                                               ▼ re-arm after it completes
//!                                                          PendingFlush
//! ```
//!
//! A timer is identified by a generation number. Re-arming bumps the
//! generation, so a timer that fires after being superseded finds a stale
//! generation and exits without flushing. Snapshot writes for one bucket are
//! serialized by an async mutex, which keeps durable writes in the same order
//! as the in-memory states they capture. A bucket leaves `Flushing` only
//! when every write it started (timer or drain) has settled.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use carestate_backend::{BackendResult, SnapshotBackend};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::tracker::BucketCell;

/// Per-bucket write-back phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    Clean,
    Pending,
    Flushing,
}

struct FlushState {
    phase: Phase,
    generation: u64,
    /// A mutation arrived while a flush was in flight.
    rerun: bool,
    /// Writes started while `Flushing` that have not settled yet.
    writers: usize,
    timer: Option<JoinHandle<()>>,
}

/// Transient write-back state owned by each bucket.
pub(crate) struct FlushSlot {
    state: Mutex<FlushState>,
    io: tokio::sync::Mutex<()>,
}

impl FlushSlot {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(FlushState {
                phase: Phase::Clean,
                generation: 0,
                rerun: false,
                writers: 0,
                timer: None,
            }),
            io: tokio::sync::Mutex::new(()),
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        self.state.lock().expect("lock poisoned").phase
    }

    /// Dirty from the first observed mutation until the covering flush ends.
    pub(crate) fn is_dirty(&self) -> bool {
        self.phase() != Phase::Clean
    }
}

/// What a drain did for one bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DrainOutcome {
    Skipped,
    Flushed,
    Failed,
}

/// Turns "bucket changed" notifications into deferred snapshot writes.
///
/// With no backend the scheduler is inert: notifications are ignored and
/// nothing is ever written (pure-memory mode).
pub(crate) struct FlushScheduler {
    backend: Option<Arc<dyn SnapshotBackend>>,
    quiet_period: Duration,
    runtime: Handle,
}

impl FlushScheduler {
    pub(crate) fn new(
        backend: Option<Arc<dyn SnapshotBackend>>,
        quiet_period: Duration,
        runtime: Handle,
    ) -> Self {
        Self {
            backend,
            quiet_period,
            runtime,
        }
    }

    pub(crate) fn backend(&self) -> Option<&Arc<dyn SnapshotBackend>> {
        self.backend.as_ref()
    }

    pub(crate) fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Record that `cell` changed.
    pub(crate) fn notify(&self, cell: &Arc<BucketCell>) {
        if self.backend.is_none() {
            return;
        }
        let mut state = cell.flush.state.lock().expect("lock poisoned");
        match state.phase {
            Phase::Clean | Phase::Pending => self.arm(cell, &mut state),
            Phase::Flushing => state.rerun = true,
        }
    }

    /// Forget pending work for `cell` after its value was replaced by a
    /// freshly loaded snapshot.
    pub(crate) fn reset(&self, cell: &BucketCell) {
        let mut state = cell.flush.state.lock().expect("lock poisoned");
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;
        match state.phase {
            Phase::Pending | Phase::Clean => state.phase = Phase::Clean,
            // The in-flight write carries the pre-reload value; write the
            // reloaded value after it so the stale one does not stick.
            Phase::Flushing => state.rerun = true,
        }
    }

    /// Start (or restart) the quiet-period timer.
    fn arm(&self, cell: &Arc<BucketCell>, state: &mut FlushState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;
        state.phase = Phase::Pending;

        let generation = state.generation;
        let quiet = self.quiet_period;
        let cell = Arc::clone(cell);
        state.timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(quiet).await;
            let scheduler = Arc::clone(cell.scheduler());
            scheduler.expire(&cell, generation).await;
        }));
    }

    async fn expire(&self, cell: &Arc<BucketCell>, generation: u64) {
        {
            let mut state = cell.flush.state.lock().expect("lock poisoned");
            if state.generation != generation || state.phase != Phase::Pending {
                return;
            }
            state.phase = Phase::Flushing;
            state.rerun = false;
            state.writers += 1;
            state.timer = None;
        }
        self.finish_flush(cell).await;
    }

    /// Write the snapshot for a bucket already moved to `Flushing` (with
    /// `writers` counting this write), then settle its phase once no other
    /// write is outstanding. Returns `true` if the write succeeded.
    async fn finish_flush(&self, cell: &Arc<BucketCell>) -> bool {
        let result = self.write_snapshot(cell).await;
        if let Err(e) = &result {
            error!(
                bucket = %cell.name(),
                error = %e,
                "snapshot flush failed; bucket stays unpersisted until its next mutation"
            );
        }

        let mut state = cell.flush.state.lock().expect("lock poisoned");
        state.writers -= 1;
        if state.writers == 0 {
            self.settle(cell, &mut state);
        }
        result.is_ok()
    }

    /// Leave `Flushing`: re-arm if a mutation arrived meanwhile, else clean.
    fn settle(&self, cell: &Arc<BucketCell>, state: &mut FlushState) {
        if state.rerun {
            state.rerun = false;
            self.arm(cell, state);
        } else {
            state.phase = Phase::Clean;
        }
    }

    /// Upsert the bucket's current full value. At most one write per bucket
    /// is in flight at a time.
    async fn write_snapshot(&self, cell: &BucketCell) -> BackendResult<()> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };
        let _io = cell.flush.io.lock().await;
        let data = cell.snapshot();
        let snapshot = backend.upsert(cell.name(), &data).await?;
        debug!(bucket = %cell.name(), updated_at = %snapshot.updated_at, "snapshot flushed");
        Ok(())
    }

    /// Flush `cell` now if it has a pending timer or a flush in flight.
    pub(crate) async fn drain(&self, cell: &Arc<BucketCell>) -> DrainOutcome {
        if self.backend.is_none() {
            return DrainOutcome::Skipped;
        }

        let phase = {
            let mut state = cell.flush.state.lock().expect("lock poisoned");
            let phase = state.phase;
            match phase {
                Phase::Clean => {}
                Phase::Pending => {
                    if let Some(timer) = state.timer.take() {
                        timer.abort();
                    }
                    state.generation += 1;
                    state.phase = Phase::Flushing;
                    state.rerun = false;
                    state.writers += 1;
                }
                // This drain writes the latest value once the in-flight
                // write finishes, so no follow-up flush is needed. The bucket
                // stays `Flushing` until both writes settle.
                Phase::Flushing => {
                    state.rerun = false;
                    state.writers += 1;
                }
            }
            phase
        };

        match phase {
            Phase::Clean => DrainOutcome::Skipped,
            Phase::Pending | Phase::Flushing => {
                if self.finish_flush(cell).await {
                    DrainOutcome::Flushed
                } else {
                    DrainOutcome::Failed
                }
            }
        }
    }
}
