use crate::domain::{DailyStatistics, Task};
use crate::error::PersistenceError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Key-value store the engine persists its state through
pub trait PersistenceGateway: Send + Sync {
    fn save_tasks(&self, tasks: &[Task]) -> Result<(), PersistenceError>;

    /// Empty when nothing has been saved yet
    fn load_tasks(&self) -> Result<Vec<Task>, PersistenceError>;

    fn save_daily_statistics(
        &self,
        stats: &DailyStatistics,
        date_key: &str,
    ) -> Result<(), PersistenceError>;

    fn load_daily_statistics(
        &self,
        date_key: &str,
    ) -> Result<Option<DailyStatistics>, PersistenceError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    tasks: Option<Vec<Task>>,
    stats: HashMap<String, DailyStatistics>,
}

/// In-memory gateway; clones share the same storage
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    state: Arc<Mutex<MemoryState>>,
    fail_writes: Arc<AtomicBool>,
    task_saves: Arc<AtomicUsize>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent save fail until switched back
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful task-list saves
    pub fn task_save_count(&self) -> usize {
        self.task_saves.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<(), PersistenceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable(
                "memory store is read-only".to_string(),
            ));
        }
        Ok(())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PersistenceGateway for MemoryGateway {
    fn save_tasks(&self, tasks: &[Task]) -> Result<(), PersistenceError> {
        self.check_writable()?;
        self.state().tasks = Some(tasks.to_vec());
        self.task_saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load_tasks(&self) -> Result<Vec<Task>, PersistenceError> {
        Ok(self.state().tasks.clone().unwrap_or_default())
    }

    fn save_daily_statistics(
        &self,
        stats: &DailyStatistics,
        date_key: &str,
    ) -> Result<(), PersistenceError> {
        self.check_writable()?;
        self.state().stats.insert(date_key.to_string(), stats.clone());
        Ok(())
    }

    fn load_daily_statistics(
        &self,
        date_key: &str,
    ) -> Result<Option<DailyStatistics>, PersistenceError> {
        Ok(self.state().stats.get(date_key).cloned())
    }
}
