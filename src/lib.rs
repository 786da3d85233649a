//! Personal task tracking engine.
//!
//! Tasks carry an estimate, an optional due date and a repeat rule, and move
//! through a small lifecycle (pending, in progress, paused, completed,
//! overdue). The [`TaskManager`] owns the collection, keeps today's
//! [`DailyStatistics`] current, persists every change through a
//! [`PersistenceGateway`] and runs a once-a-second overdue sweep.

pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod manager;
pub mod persistence;
pub mod report;
pub mod store;
pub mod ticker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_config, save_config, Config, CONFIG_FILE};
pub use domain::{DailyStatistics, Priority, RepeatKind, RepeatRule, Task, TaskStatus, WorkloadTotals};
pub use error::{PersistenceError, Result, TaskError};
pub use events::ChangeEvent;
pub use manager::TaskManager;
pub use persistence::{JsonFileGateway, MemoryGateway, PersistenceGateway};
pub use store::TaskStore;
