use chrono::NaiveDate;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Capacity of the change-event channel; slow subscribers see `Lagged`
pub const EVENT_CAPACITY: usize = 256;

/// What changed in the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    TaskAdded(Uuid),
    TaskUpdated(Uuid),
    TaskRemoved(Uuid),
    /// The aggregate for this date changed
    StatsChanged(NaiveDate),
    /// A sweep ran; derived views (remaining time, progress) may have moved
    Tick { transitioned: usize },
}

pub fn channel() -> broadcast::Sender<ChangeEvent> {
    let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
    tx
}

/// Send events in order; having no subscribers is not an error
pub fn publish(tx: &broadcast::Sender<ChangeEvent>, events: Vec<ChangeEvent>) {
    for event in events {
        let _ = tx.send(event);
    }
}
