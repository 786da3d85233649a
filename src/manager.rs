//! Caller-facing task manager.
//!
//! Owns the task store behind a single lock, the clock, the change-event
//! channel and (optionally) the background overdue sweep. Caller operations
//! and sweep ticks are mutually exclusive.

use crate::clock::Clock;
use crate::config::Config;
use crate::domain::{DailyStatistics, Task, TaskStatus, WorkloadTotals};
use crate::error::Result;
use crate::events::{self, publish, ChangeEvent};
use crate::persistence::PersistenceGateway;
use crate::store::TaskStore;
use crate::ticker::{self, lock_store};
use chrono::{DateTime, Duration, Local};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

pub struct TaskManager {
    store: Arc<Mutex<TaskStore>>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<ChangeEvent>,
    config: Config,
    sweep: Option<JoinHandle<()>>,
}

impl TaskManager {
    /// Load state through the gateway without starting the sweep
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Result<Self> {
        let store = TaskStore::load(gateway, clock.now())?;
        Ok(Self {
            store: Arc::new(Mutex::new(store)),
            clock,
            events: events::channel(),
            config,
            sweep: None,
        })
    }

    /// Load state and start the recurring sweep.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        gateway: Arc<dyn PersistenceGateway>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Result<Self> {
        let mut manager = Self::new(gateway, clock, config)?;
        manager.sweep = Some(ticker::spawn_sweep(
            manager.store.clone(),
            manager.clock.clone(),
            manager.events.clone(),
            manager.config.tick_interval(),
        ));
        Ok(manager)
    }

    /// Stop the sweep; idempotent
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.sweep.take() {
            handle.abort();
            info!("overdue sweep stopped");
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweep
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn now(&self) -> DateTime<Local> {
        self.clock.now()
    }

    /// Receive every change event from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    /// Run a mutation and publish its events, both under the lock
    fn mutate<T>(&self, op: impl FnOnce(&mut TaskStore, DateTime<Local>) -> Result<T>) -> Result<T> {
        let mut store = lock_store(&self.store);
        let result = op(&mut store, self.clock.now());
        publish(&self.events, store.drain_events());
        result
    }

    fn read<T>(&self, query: impl FnOnce(&TaskStore, DateTime<Local>) -> T) -> T {
        let now = self.clock.now();
        let store = lock_store(&self.store);
        query(&store, now)
    }

    pub fn add_task(&self, task: Task) -> Result<Uuid> {
        self.mutate(|store, now| store.add_task(task, now))
    }

    pub fn update_task(&self, task: Task) -> Result<()> {
        self.mutate(|store, now| store.update_task(task, now))
    }

    pub fn delete_task(&self, id: Uuid) -> Result<Task> {
        self.mutate(|store, _| store.delete_task(id))
    }

    pub fn start_task(&self, id: Uuid) -> Result<()> {
        self.mutate(|store, now| store.start_task(id, now))
    }

    pub fn pause_task(&self, id: Uuid) -> Result<()> {
        self.mutate(|store, now| store.pause_task(id, now))
    }

    pub fn resume_task(&self, id: Uuid) -> Result<()> {
        self.mutate(|store, now| store.resume_task(id, now))
    }

    /// Returns the id of the spawned successor for repeating tasks
    pub fn complete_task(&self, id: Uuid) -> Result<Option<Uuid>> {
        self.mutate(|store, now| store.complete_task(id, now))
    }

    pub fn reset_task(&self, id: Uuid) -> Result<()> {
        self.mutate(|store, now| store.reset_task(id, now))
    }

    pub fn archive_task(&self, id: Uuid) -> Result<()> {
        self.mutate(|store, now| store.archive_task(id, now))
    }

    pub fn unarchive_task(&self, id: Uuid) -> Result<()> {
        self.mutate(|store, now| store.unarchive_task(id, now))
    }

    /// Run one overdue sweep immediately
    pub fn sweep_now(&self) -> Result<usize> {
        ticker::run_sweep(&self.store, self.clock.as_ref(), &self.events)
    }

    pub fn task(&self, id: Uuid) -> Option<Task> {
        self.read(|store, _| store.task(id).cloned())
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.read(|store, _| store.tasks().to_vec())
    }

    pub fn active_task(&self) -> Option<Task> {
        self.read(|store, _| store.active_task().cloned())
    }

    pub fn statistics(&self) -> DailyStatistics {
        self.read(|store, _| store.statistics().clone())
    }

    pub fn tasks_for_today(&self) -> Vec<Task> {
        self.read(|store, now| store.tasks_for_today(now))
    }

    pub fn workload(&self) -> WorkloadTotals {
        self.read(|store, now| store.workload(now))
    }

    pub fn free_time(&self) -> Duration {
        let workday = self.config.workday();
        self.read(|store, now| store.free_time(now, workday))
    }

    pub fn slack_time(&self) -> Duration {
        self.read(|store, now| store.slack_time(now))
    }

    pub fn overdue_tasks(&self) -> Vec<Task> {
        self.read(|store, now| store.overdue_tasks(now))
    }

    pub fn upcoming_tasks(&self, within_days: u32) -> Vec<Task> {
        self.read(|store, now| store.upcoming_tasks(now, within_days))
    }

    pub fn tasks_with_status(&self, status: TaskStatus) -> Vec<Task> {
        self.read(|store, _| store.tasks_with_status(status))
    }

    pub fn search_tasks(&self, query: &str) -> Vec<Task> {
        self.read(|store, _| store.search_tasks(query))
    }

    pub fn current_task_remaining_time(&self) -> Duration {
        self.read(|store, now| store.current_task_remaining_time(now))
    }

    /// Resolve a full id or a unique prefix of one
    pub fn resolve_id(&self, needle: &str) -> Option<Uuid> {
        if let Ok(id) = Uuid::parse_str(needle) {
            return Some(id);
        }
        let needle = needle.to_lowercase();
        self.read(|store, _| {
            let mut matches = store
                .tasks()
                .iter()
                .filter(|task| task.id.to_string().starts_with(&needle));
            match (matches.next(), matches.next()) {
                (Some(task), None) => Some(task.id),
                _ => None,
            }
        })
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
