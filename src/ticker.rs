use crate::clock::Clock;
use crate::error::Result;
use crate::events::{publish, ChangeEvent};
use crate::store::TaskStore;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Default sweep interval in milliseconds
pub const DEFAULT_TICK_MS: u64 = 1000;

/// Get the default sweep interval
pub fn tick_duration() -> Duration {
    Duration::from_millis(DEFAULT_TICK_MS)
}

/// Lock the shared store, recovering the data from a poisoned lock
pub(crate) fn lock_store(store: &Mutex<TaskStore>) -> MutexGuard<'_, TaskStore> {
    store.lock().unwrap_or_else(|poisoned| {
        warn!("task store lock was poisoned; continuing with its last state");
        poisoned.into_inner()
    })
}

/// Run one sweep under the store lock and publish what it produced.
///
/// Events go out before the lock is released so subscribers see them in
/// the same order the mutations happened.
pub fn run_sweep(
    store: &Mutex<TaskStore>,
    clock: &dyn Clock,
    events: &broadcast::Sender<ChangeEvent>,
) -> Result<usize> {
    let mut guard = lock_store(store);
    let result = guard.sweep(clock.now());
    publish(events, guard.drain_events());
    drop(guard);

    if let Ok(count) = &result {
        if *count > 0 {
            debug!("sweep moved {} tasks to overdue", count);
        }
    }
    result
}

/// Spawn the recurring sweep on the current tokio runtime.
///
/// Sweeps run on the blocking pool.
/// Persistence failures are logged and the loop keeps ticking. Abort the
/// returned handle to stop it.
pub fn spawn_sweep(
    store: Arc<Mutex<TaskStore>>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<ChangeEvent>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("overdue sweep started every {:?}", period);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            let (store, clock, events) = (store.clone(), clock.clone(), events.clone());
            let swept =
                tokio::task::spawn_blocking(move || run_sweep(&store, clock.as_ref(), &events))
                    .await;
            match swept {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!("sweep could not persist changes: {}", e),
                Err(e) => warn!("sweep task failed: {}", e),
            }
        }
    })
}
