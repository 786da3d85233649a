use crate::domain::timing::whole_millis;
use crate::domain::views::{self, WorkloadTotals};
use crate::domain::{DailyStatistics, Task, TaskStatus};
use crate::error::{Result, TaskError};
use crate::events::ChangeEvent;
use crate::persistence::PersistenceGateway;
use chrono::{DateTime, Duration, Local};
use std::collections::HashSet;
use std::mem;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// In-memory task collection, today's statistics and the active-task pointer.
///
/// Every operation takes the current time explicitly; the manager supplies it
/// from its clock and serializes access behind a single lock.
pub struct TaskStore {
    tasks: Vec<Task>,
    stats: DailyStatistics,
    active: Option<Uuid>,
    gateway: Arc<dyn PersistenceGateway>,
    pending_events: Vec<ChangeEvent>,
}

impl TaskStore {
    /// Load tasks and today's statistics through the gateway
    pub fn load(gateway: Arc<dyn PersistenceGateway>, now: DateTime<Local>) -> Result<Self> {
        let tasks = Self::accept_loaded(gateway.load_tasks()?);
        let today = now.date_naive();
        let stats = gateway
            .load_daily_statistics(&DailyStatistics::date_key(today))?
            .unwrap_or_else(|| DailyStatistics::new(today));

        let mut store = Self {
            tasks,
            stats,
            active: None,
            gateway,
            pending_events: Vec::new(),
        };
        store.restore_active(now);
        info!(
            "loaded {} tasks, statistics for {}",
            store.tasks.len(),
            store.stats.date
        );
        Ok(store)
    }

    /// Drop stored tasks that break the entity invariants or repeat an id
    fn accept_loaded(loaded: Vec<Task>) -> Vec<Task> {
        let mut seen = HashSet::new();
        loaded
            .into_iter()
            .filter(|task| {
                if let Err(e) = task.validate() {
                    warn!("skipping stored task {}: {}", task.id, e);
                    return false;
                }
                if !seen.insert(task.id) {
                    warn!("skipping stored task with duplicate id {}", task.id);
                    return false;
                }
                true
            })
            .collect()
    }

    /// Re-establish the single active task after loading; extra running tasks are paused
    fn restore_active(&mut self, now: DateTime<Local>) {
        for task in &mut self.tasks {
            if task.status != TaskStatus::InProgress {
                continue;
            }
            if self.active.is_none() {
                self.active = Some(task.id);
            } else if task.pause(now).is_ok() {
                warn!("paused extra running task '{}' on load", task.title);
            }
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn statistics(&self) -> &DailyStatistics {
        &self.stats
    }

    pub fn active_task_id(&self) -> Option<Uuid> {
        self.active
    }

    pub fn active_task(&self) -> Option<&Task> {
        self.active.and_then(|id| self.task(id))
    }

    /// Events produced since the last drain, in order
    pub fn drain_events(&mut self) -> Vec<ChangeEvent> {
        mem::take(&mut self.pending_events)
    }

    fn index_of(&self, id: Uuid) -> Result<usize> {
        self.tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or(TaskError::TaskNotFound(id))
    }

    fn emit(&mut self, event: ChangeEvent) {
        self.pending_events.push(event);
    }

    fn emit_stats(&mut self) {
        let date = self.stats.date;
        self.emit(ChangeEvent::StatsChanged(date));
    }

    fn persist_tasks(&self) -> Result<()> {
        self.gateway.save_tasks(&self.tasks).map_err(|e| {
            warn!("failed to save tasks: {}", e);
            TaskError::from(e)
        })
    }

    fn persist_stats(&self) -> Result<()> {
        self.gateway
            .save_daily_statistics(&self.stats, &self.stats.key())
            .map_err(|e| {
                warn!("failed to save statistics for {}: {}", self.stats.date, e);
                TaskError::from(e)
            })
    }

    /// Attempt both saves; report the first failure
    fn persist_all(&self) -> Result<()> {
        let tasks = self.persist_tasks();
        let stats = self.persist_stats();
        tasks.and(stats)
    }

    /// Switch to a fresh aggregate when the calendar date has moved on
    pub fn roll_over(&mut self, now: DateTime<Local>) -> Result<bool> {
        let today = now.date_naive();
        if today == self.stats.date {
            return Ok(false);
        }

        if let Err(e) = self.persist_stats() {
            warn!("statistics for {} may be incomplete: {}", self.stats.date, e);
        }
        let next = self
            .gateway
            .load_daily_statistics(&DailyStatistics::date_key(today))?
            .unwrap_or_else(|| DailyStatistics::new(today));
        info!("day rolled over from {} to {}", self.stats.date, today);
        self.stats = next;
        self.emit_stats();
        Ok(true)
    }

    /// Pause the active task unless it is `keep`, and clear the pointer
    fn pause_active(&mut self, keep: Uuid, now: DateTime<Local>) {
        let Some(previous) = self.active.take() else {
            return;
        };
        if previous == keep {
            return;
        }
        if let Some(task) = self.tasks.iter_mut().find(|task| task.id == previous) {
            if task.pause(now).is_ok() {
                debug!("paused '{}' to switch tasks", task.title);
                self.pending_events.push(ChangeEvent::TaskUpdated(previous));
            }
        }
    }

    fn clear_active_if(&mut self, id: Uuid) {
        if self.active == Some(id) {
            self.active = None;
        }
    }

    /// Insert a new task, stamping its creation time
    pub fn add_task(&mut self, mut task: Task, now: DateTime<Local>) -> Result<Uuid> {
        self.roll_over(now)?;
        task.validate()?;
        if self.task(task.id).is_some() {
            return Err(TaskError::InvalidTask(format!(
                "a task with id {} already exists",
                task.id
            )));
        }
        if task.status == TaskStatus::InProgress {
            return Err(TaskError::InvalidTask(
                "new tasks cannot be in progress; start them instead".to_string(),
            ));
        }

        task.created_at = Some(now);
        task.estimated_duration = whole_millis(task.estimated_duration);
        let id = task.id;
        info!("added task '{}'", task.title);
        self.tasks.push(task);
        self.stats.record_created();

        self.emit(ChangeEvent::TaskAdded(id));
        self.emit_stats();
        self.persist_all()?;
        Ok(id)
    }

    /// Replace a task by identity
    pub fn update_task(&mut self, mut task: Task, now: DateTime<Local>) -> Result<()> {
        self.roll_over(now)?;
        task.validate()?;
        let idx = self.index_of(task.id)?;
        let id = task.id;

        task.estimated_duration = whole_millis(task.estimated_duration);
        if task.due_date != self.tasks[idx].due_date {
            task.overdue_flagged = false;
        }

        if task.status == TaskStatus::InProgress {
            if task.started_at.is_none() {
                return Err(TaskError::InvalidTask(
                    "a task in progress needs a start time".to_string(),
                ));
            }
            self.pause_active(id, now);
            self.active = Some(id);
        } else {
            self.clear_active_if(id);
        }

        debug!("updated task '{}'", task.title);
        self.tasks[idx] = task;
        self.emit(ChangeEvent::TaskUpdated(id));
        self.persist_tasks()
    }

    /// Remove a task by identity, returning it
    pub fn delete_task(&mut self, id: Uuid) -> Result<Task> {
        let idx = self.index_of(id)?;
        let task = self.tasks.remove(idx);
        self.clear_active_if(id);
        info!("deleted task '{}'", task.title);

        self.emit(ChangeEvent::TaskRemoved(id));
        self.persist_tasks()?;
        Ok(task)
    }

    /// Start a fresh session; any other active task is paused first
    pub fn start_task(&mut self, id: Uuid, now: DateTime<Local>) -> Result<()> {
        self.roll_over(now)?;
        let idx = self.index_of(id)?;
        let status = self.tasks[idx].status;
        if !status.can_start() {
            return Err(TaskError::InvalidTransition {
                id,
                from: status,
                action: "start",
            });
        }

        self.pause_active(id, now);
        self.tasks[idx].start(now)?;
        self.active = Some(id);
        info!("started '{}'", self.tasks[idx].title);

        self.emit(ChangeEvent::TaskUpdated(id));
        self.persist_tasks()
    }

    pub fn pause_task(&mut self, id: Uuid, now: DateTime<Local>) -> Result<()> {
        self.roll_over(now)?;
        let idx = self.index_of(id)?;
        self.tasks[idx].pause(now)?;
        self.clear_active_if(id);
        debug!("paused '{}'", self.tasks[idx].title);

        self.emit(ChangeEvent::TaskUpdated(id));
        self.persist_tasks()
    }

    /// Resume a paused task; any other active task is paused first
    pub fn resume_task(&mut self, id: Uuid, now: DateTime<Local>) -> Result<()> {
        self.roll_over(now)?;
        let idx = self.index_of(id)?;
        let status = self.tasks[idx].status;
        if status != TaskStatus::Paused {
            return Err(TaskError::InvalidTransition {
                id,
                from: status,
                action: "resume",
            });
        }

        self.pause_active(id, now);
        self.tasks[idx].resume(now)?;
        self.active = Some(id);
        debug!("resumed '{}'", self.tasks[idx].title);

        self.emit(ChangeEvent::TaskUpdated(id));
        self.persist_tasks()
    }

    /// Complete a task, update today's statistics and spawn the next
    /// occurrence of a repeating task. Returns the successor's id.
    pub fn complete_task(&mut self, id: Uuid, now: DateTime<Local>) -> Result<Option<Uuid>> {
        self.roll_over(now)?;
        let idx = self.index_of(id)?;
        self.tasks[idx].complete(now)?;
        self.clear_active_if(id);

        let (elapsed, estimated) = {
            let task = &self.tasks[idx];
            (task.actual_duration, task.estimated_duration)
        };
        self.stats.record_completed(elapsed, estimated);
        info!(
            "completed '{}' in {}s",
            self.tasks[idx].title,
            elapsed.num_seconds()
        );
        self.emit(ChangeEvent::TaskUpdated(id));

        let successor = self.tasks[idx].next_occurrence().map(|mut next| {
            next.created_at = Some(now);
            next
        });
        let successor_id = successor.as_ref().map(|next| next.id);
        if let Some(next) = successor {
            debug!("scheduled next '{}' for {:?}", next.title, next.due_date);
            self.emit(ChangeEvent::TaskAdded(next.id));
            self.tasks.push(next);
            self.stats.record_created();
        }

        let score = self.stats.update_productivity_score();
        debug!("productivity score now {:.1}", score);
        self.emit_stats();
        self.persist_all()?;
        Ok(successor_id)
    }

    /// Return a task to pending with all timing cleared
    pub fn reset_task(&mut self, id: Uuid, now: DateTime<Local>) -> Result<()> {
        self.roll_over(now)?;
        let idx = self.index_of(id)?;
        self.tasks[idx].reset();
        self.clear_active_if(id);
        debug!("reset '{}'", self.tasks[idx].title);

        self.emit(ChangeEvent::TaskUpdated(id));
        self.persist_tasks()
    }

    /// Hide a task from the day views, pausing it if it is running
    pub fn archive_task(&mut self, id: Uuid, now: DateTime<Local>) -> Result<()> {
        self.roll_over(now)?;
        let idx = self.index_of(id)?;
        if self.tasks[idx].status == TaskStatus::InProgress {
            self.tasks[idx].pause(now)?;
        }
        self.clear_active_if(id);
        self.tasks[idx].archived = true;

        self.emit(ChangeEvent::TaskUpdated(id));
        self.persist_tasks()
    }

    pub fn unarchive_task(&mut self, id: Uuid, now: DateTime<Local>) -> Result<()> {
        self.roll_over(now)?;
        let idx = self.index_of(id)?;
        self.tasks[idx].archived = false;

        self.emit(ChangeEvent::TaskUpdated(id));
        self.persist_tasks()
    }

    /// Move newly overdue tasks to `Overdue`. Returns how many changed.
    ///
    /// Saves only when something changed. A tick event is always emitted.
    pub fn sweep(&mut self, now: DateTime<Local>) -> Result<usize> {
        let rolled = self.roll_over(now);

        let mut transitioned = Vec::new();
        for task in &mut self.tasks {
            if task.status == TaskStatus::Completed
                || task.status == TaskStatus::Overdue
                || task.overdue_flagged
                || !task.is_overdue(now)
            {
                continue;
            }
            task.mark_overdue(now);
            info!("'{}' is overdue", task.title);
            transitioned.push(task.id);
        }

        for id in &transitioned {
            self.clear_active_if(*id);
            self.stats.record_overdue();
            self.emit(ChangeEvent::TaskUpdated(*id));
        }

        let count = transitioned.len();
        let saved = if count > 0 {
            self.emit_stats();
            self.persist_all()
        } else {
            Ok(())
        };
        self.emit(ChangeEvent::Tick {
            transitioned: count,
        });

        rolled?;
        saved.map(|_| count)
    }

    pub fn tasks_for_today(&self, now: DateTime<Local>) -> Vec<Task> {
        views::tasks_for_today(&self.tasks, now)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn workload(&self, now: DateTime<Local>) -> WorkloadTotals {
        let today = views::tasks_for_today(&self.tasks, now);
        views::compute_totals(&today, now)
    }

    pub fn free_time(&self, now: DateTime<Local>, workday: Duration) -> Duration {
        self.workload(now).free_time(workday)
    }

    pub fn slack_time(&self, now: DateTime<Local>) -> Duration {
        self.workload(now).slack_time()
    }

    pub fn overdue_tasks(&self, now: DateTime<Local>) -> Vec<Task> {
        views::overdue_tasks(&self.tasks, now)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn upcoming_tasks(&self, now: DateTime<Local>, days: u32) -> Vec<Task> {
        views::upcoming_tasks(&self.tasks, now, days)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn tasks_with_status(&self, status: TaskStatus) -> Vec<Task> {
        views::tasks_with_status(&self.tasks, status)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn search_tasks(&self, query: &str) -> Vec<Task> {
        views::search_tasks(&self.tasks, query)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Remaining time of the active task, zero when nothing is running
    pub fn current_task_remaining_time(&self, now: DateTime<Local>) -> Duration {
        self.active_task()
            .map(|task| task.remaining_time(now))
            .unwrap_or_else(Duration::zero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RepeatKind, RepeatRule};
    use crate::persistence::MemoryGateway;
    use chrono::{Days, TimeZone};
    use pretty_assertions::assert_eq;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, day, hour, minute, 0).unwrap()
    }

    fn create_test_store() -> (TaskStore, MemoryGateway) {
        let gateway = MemoryGateway::new();
        let store = TaskStore::load(Arc::new(gateway.clone()), at(2, 8, 0)).unwrap();
        (store, gateway)
    }

    fn add(store: &mut TaskStore, title: &str, estimate: Duration) -> Uuid {
        let task = Task::new(title, estimate).unwrap();
        store.add_task(task, at(2, 8, 0)).unwrap()
    }

    #[test]
    fn test_add_task_stamps_and_counts() {
        let (mut store, gateway) = create_test_store();
        let id = add(&mut store, "Task 1", Duration::hours(1));

        let task = store.task(id).unwrap();
        assert_eq!(task.created_at, Some(at(2, 8, 0)));
        assert_eq!(store.statistics().tasks_created, 1);
        assert_eq!(gateway.load_tasks().unwrap().len(), 1);
        assert_eq!(
            gateway
                .load_daily_statistics("stats-2026-03-02")
                .unwrap()
                .map(|s| s.tasks_created),
            Some(1)
        );
        assert_eq!(
            store.drain_events(),
            vec![
                ChangeEvent::TaskAdded(id),
                ChangeEvent::StatsChanged(at(2, 8, 0).date_naive())
            ]
        );
    }

    #[test]
    fn test_add_task_allows_duplicate_titles() {
        let (mut store, _) = create_test_store();
        add(&mut store, "Same", Duration::hours(1));
        add(&mut store, "Same", Duration::hours(1));
        assert_eq!(store.tasks().len(), 2);
    }

    #[test]
    fn test_add_task_rejects_invalid() {
        let (mut store, _) = create_test_store();
        let mut task = Task::new("Valid", Duration::hours(1)).unwrap();
        task.title = String::new();
        assert!(matches!(
            store.add_task(task, at(2, 8, 0)),
            Err(TaskError::InvalidTask(_))
        ));
        assert!(store.tasks().is_empty());
        assert_eq!(store.statistics().tasks_created, 0);
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let (mut store, _) = create_test_store();
        let missing = Uuid::new_v4();
        let now = at(2, 9, 0);

        assert!(matches!(store.start_task(missing, now), Err(TaskError::TaskNotFound(id)) if id == missing));
        assert!(matches!(store.pause_task(missing, now), Err(TaskError::TaskNotFound(_))));
        assert!(matches!(store.resume_task(missing, now), Err(TaskError::TaskNotFound(_))));
        assert!(matches!(store.complete_task(missing, now), Err(TaskError::TaskNotFound(_))));
        assert!(matches!(store.reset_task(missing, now), Err(TaskError::TaskNotFound(_))));
        assert!(matches!(store.delete_task(missing), Err(TaskError::TaskNotFound(_))));

        let ghost = Task::new("Ghost", Duration::hours(1)).unwrap();
        assert!(matches!(store.update_task(ghost, now), Err(TaskError::TaskNotFound(_))));
    }

    #[test]
    fn test_starting_second_task_pauses_first() {
        let (mut store, _) = create_test_store();
        let a = add(&mut store, "A", Duration::hours(1));
        let b = add(&mut store, "B", Duration::hours(1));

        store.start_task(a, at(2, 9, 0)).unwrap();
        assert_eq!(store.active_task_id(), Some(a));

        store.start_task(b, at(2, 9, 30)).unwrap();
        assert_eq!(store.task(a).unwrap().status, TaskStatus::Paused);
        assert_eq!(store.task(b).unwrap().status, TaskStatus::InProgress);
        assert_eq!(store.active_task_id(), Some(b));
        assert_eq!(store.tasks_with_status(TaskStatus::InProgress).len(), 1);
    }

    #[test]
    fn test_resume_pauses_other_active_task() {
        let (mut store, _) = create_test_store();
        let a = add(&mut store, "A", Duration::hours(1));
        let b = add(&mut store, "B", Duration::hours(1));

        store.start_task(a, at(2, 9, 0)).unwrap();
        store.pause_task(a, at(2, 9, 10)).unwrap();
        assert_eq!(store.active_task_id(), None);

        store.start_task(b, at(2, 9, 15)).unwrap();
        store.resume_task(a, at(2, 9, 20)).unwrap();

        assert_eq!(store.task(b).unwrap().status, TaskStatus::Paused);
        assert_eq!(store.active_task_id(), Some(a));
        assert_eq!(
            store.task(a).unwrap().elapsed_time(at(2, 9, 30)),
            Duration::minutes(20)
        );
    }

    #[test]
    fn test_failed_start_keeps_current_active() {
        let (mut store, _) = create_test_store();
        let a = add(&mut store, "A", Duration::hours(1));
        let b = add(&mut store, "B", Duration::hours(1));
        store.start_task(a, at(2, 9, 0)).unwrap();
        store.complete_task(b, at(2, 9, 5)).unwrap();

        assert!(matches!(
            store.start_task(b, at(2, 9, 10)),
            Err(TaskError::InvalidTransition { action: "start", .. })
        ));
        assert_eq!(store.active_task_id(), Some(a));
        assert_eq!(store.task(a).unwrap().status, TaskStatus::InProgress);
    }

    #[test]
    fn test_complete_updates_statistics() {
        let (mut store, _) = create_test_store();
        let ids: Vec<Uuid> = (0..4)
            .map(|i| add(&mut store, &format!("Task {}", i), Duration::hours(1)))
            .collect();

        store.start_task(ids[0], at(2, 9, 0)).unwrap();
        store.complete_task(ids[0], at(2, 10, 0)).unwrap();
        store.start_task(ids[1], at(2, 10, 0)).unwrap();
        store.complete_task(ids[1], at(2, 11, 0)).unwrap();

        let stats = store.statistics();
        assert_eq!(stats.tasks_completed, 2);
        assert_eq!(stats.tasks_created, 4);
        assert_eq!(stats.total_time_spent, Duration::hours(2));
        assert_eq!(stats.efficiency(), 1.0);
        assert_eq!(stats.completion_rate(), 0.5);
        assert_eq!(stats.productivity_score, 75.0);
        assert_eq!(store.active_task_id(), None);
    }

    #[test]
    fn test_complete_daily_repeat_spawns_one_successor() {
        let (mut store, _) = create_test_store();
        let due = at(2, 18, 0);
        let task = Task::new("Stretch", Duration::minutes(15))
            .unwrap()
            .with_due_date(due)
            .with_repeat(RepeatRule::new(RepeatKind::Daily, 1));
        let id = store.add_task(task, at(2, 8, 0)).unwrap();

        store.start_task(id, at(2, 9, 0)).unwrap();
        let successor = store.complete_task(id, at(2, 9, 15)).unwrap().unwrap();

        assert_eq!(store.tasks().len(), 2);
        let next = store.task(successor).unwrap();
        assert_ne!(next.id, id);
        assert_eq!(next.status, TaskStatus::Pending);
        assert_eq!(next.due_date, due.checked_add_days(Days::new(1)));
        assert!(next.started_at.is_none());
        assert!(next.paused_at.is_none());
        assert!(next.completed_at.is_none());
        assert_eq!(next.actual_duration, Duration::zero());
        assert_eq!(next.created_at, Some(at(2, 9, 15)));
        assert_eq!(store.statistics().tasks_created, 2);
        assert_eq!(store.task(id).unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn test_complete_without_repeat_spawns_nothing() {
        let (mut store, _) = create_test_store();
        let id = add(&mut store, "Once", Duration::hours(1));
        assert_eq!(store.complete_task(id, at(2, 9, 0)).unwrap(), None);
        assert_eq!(store.tasks().len(), 1);
    }

    #[test]
    fn test_delete_clears_active() {
        let (mut store, gateway) = create_test_store();
        let id = add(&mut store, "Doomed", Duration::hours(1));
        store.start_task(id, at(2, 9, 0)).unwrap();

        let removed = store.delete_task(id).unwrap();
        assert_eq!(removed.id, id);
        assert_eq!(store.active_task_id(), None);
        assert!(gateway.load_tasks().unwrap().is_empty());
    }

    #[test]
    fn test_reset_clears_active_and_timing() {
        let (mut store, _) = create_test_store();
        let id = add(&mut store, "Again", Duration::hours(1));
        store.start_task(id, at(2, 9, 0)).unwrap();
        store.reset_task(id, at(2, 9, 30)).unwrap();

        let task = store.task(id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.started_at.is_none());
        assert_eq!(store.active_task_id(), None);
    }

    #[test]
    fn test_update_task_replaces_by_identity() {
        let (mut store, _) = create_test_store();
        let id = add(&mut store, "Draft", Duration::hours(1));

        let mut edited = store.task(id).unwrap().clone();
        edited.title = "Final".to_string();
        edited.estimated_duration = Duration::hours(2);
        store.update_task(edited, at(2, 9, 0)).unwrap();

        let task = store.task(id).unwrap();
        assert_eq!(task.title, "Final");
        assert_eq!(task.estimated_duration, Duration::hours(2));
    }

    #[test]
    fn test_update_to_in_progress_takes_over_active() {
        let (mut store, _) = create_test_store();
        let a = add(&mut store, "A", Duration::hours(1));
        let b = add(&mut store, "B", Duration::hours(1));
        store.start_task(a, at(2, 9, 0)).unwrap();

        let mut running_b = store.task(b).unwrap().clone();
        running_b.start(at(2, 9, 5)).unwrap();
        store.update_task(running_b, at(2, 9, 5)).unwrap();

        assert_eq!(store.active_task_id(), Some(b));
        assert_eq!(store.task(a).unwrap().status, TaskStatus::Paused);
    }

    #[test]
    fn test_sweep_marks_overdue_once() {
        let (mut store, gateway) = create_test_store();
        let task = Task::new("Late", Duration::hours(1))
            .unwrap()
            .with_due_date(at(2, 8, 59));
        let id = store.add_task(task, at(2, 8, 0)).unwrap();
        let saves_before = gateway.task_save_count();

        assert_eq!(store.sweep(at(2, 9, 0)).unwrap(), 1);
        assert_eq!(store.task(id).unwrap().status, TaskStatus::Overdue);
        assert_eq!(store.statistics().overdue_transitions, 1);
        assert_eq!(gateway.task_save_count(), saves_before + 1);

        assert_eq!(store.sweep(at(2, 9, 1)).unwrap(), 0);
        assert_eq!(store.statistics().overdue_transitions, 1);
        assert_eq!(gateway.task_save_count(), saves_before + 1);
    }

    #[test]
    fn test_sweep_does_not_flip_a_restarted_overdue_task() {
        let (mut store, _) = create_test_store();
        let task = Task::new("Late", Duration::hours(1))
            .unwrap()
            .with_due_date(at(2, 8, 30));
        let id = store.add_task(task, at(2, 8, 0)).unwrap();

        store.sweep(at(2, 9, 0)).unwrap();
        store.start_task(id, at(2, 9, 5)).unwrap();
        store.sweep(at(2, 9, 6)).unwrap();

        assert_eq!(store.task(id).unwrap().status, TaskStatus::InProgress);
        assert_eq!(store.active_task_id(), Some(id));
        assert_eq!(store.statistics().overdue_transitions, 1);
    }

    #[test]
    fn test_due_date_change_lets_sweep_flag_again() {
        let (mut store, _) = create_test_store();
        let task = Task::new("Slipping", Duration::hours(1))
            .unwrap()
            .with_due_date(at(2, 8, 30));
        let id = store.add_task(task, at(2, 8, 0)).unwrap();

        assert_eq!(store.sweep(at(2, 9, 0)).unwrap(), 1);
        store.start_task(id, at(2, 9, 5)).unwrap();

        let mut moved = store.task(id).unwrap().clone();
        moved.due_date = Some(at(2, 12, 0));
        store.update_task(moved, at(2, 9, 10)).unwrap();
        assert!(!store.task(id).unwrap().overdue_flagged);
        assert_eq!(store.sweep(at(2, 11, 0)).unwrap(), 0);

        assert_eq!(store.sweep(at(2, 12, 1)).unwrap(), 1);
        assert_eq!(store.task(id).unwrap().status, TaskStatus::Overdue);
        assert_eq!(store.statistics().overdue_transitions, 2);
    }

    #[test]
    fn test_estimates_are_kept_to_whole_milliseconds() {
        let (mut store, gateway) = create_test_store();
        let id = add(&mut store, "Precise", Duration::hours(1));

        let mut edited = store.task(id).unwrap().clone();
        edited.estimated_duration = Duration::microseconds(1500);
        store.update_task(edited, at(2, 9, 0)).unwrap();

        assert_eq!(store.task(id).unwrap().estimated_duration, Duration::milliseconds(1));
        assert_eq!(gateway.load_tasks().unwrap(), store.tasks().to_vec());
    }

    #[test]
    fn test_load_skips_invalid_and_duplicate_tasks() {
        let gateway = MemoryGateway::new();
        let good = Task::new("Good", Duration::hours(1)).unwrap();
        let mut untitled = Task::new("Untitled", Duration::hours(1)).unwrap();
        untitled.title = "  ".to_string();
        let mut negative = Task::new("Negative", Duration::hours(1)).unwrap();
        negative.estimated_duration = Duration::minutes(-5);
        let mut twin = Task::new("Twin", Duration::hours(1)).unwrap();
        twin.id = good.id;
        gateway
            .save_tasks(&[good.clone(), untitled, negative, twin])
            .unwrap();

        let store = TaskStore::load(Arc::new(gateway), at(2, 9, 0)).unwrap();
        assert_eq!(store.tasks(), &[good][..]);
    }

    #[test]
    fn test_sweep_clears_active_overdue_task() {
        let (mut store, _) = create_test_store();
        let task = Task::new("Running late", Duration::hours(2))
            .unwrap()
            .with_due_date(at(2, 10, 0));
        let id = store.add_task(task, at(2, 8, 0)).unwrap();
        store.start_task(id, at(2, 9, 0)).unwrap();

        store.sweep(at(2, 10, 1)).unwrap();
        assert_eq!(store.active_task_id(), None);
        assert_eq!(store.task(id).unwrap().status, TaskStatus::Overdue);
    }

    #[test]
    fn test_sweep_ignores_completed() {
        let (mut store, _) = create_test_store();
        let task = Task::new("Done early", Duration::hours(1))
            .unwrap()
            .with_due_date(at(2, 9, 0));
        let id = store.add_task(task, at(2, 8, 0)).unwrap();
        store.complete_task(id, at(2, 8, 30)).unwrap();

        assert_eq!(store.sweep(at(2, 10, 0)).unwrap(), 0);
        assert_eq!(store.task(id).unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn test_sweep_always_emits_tick() {
        let (mut store, _) = create_test_store();
        store.drain_events();
        store.sweep(at(2, 9, 0)).unwrap();
        assert_eq!(
            store.drain_events(),
            vec![ChangeEvent::Tick { transitioned: 0 }]
        );
    }

    #[test]
    fn test_persistence_failure_is_surfaced_but_state_kept() {
        let (mut store, gateway) = create_test_store();
        gateway.set_fail_writes(true);

        let task = Task::new("Unsaved", Duration::hours(1)).unwrap();
        let result = store.add_task(task, at(2, 8, 0));
        assert!(matches!(result, Err(TaskError::Persistence(_))));
        assert_eq!(store.tasks().len(), 1);

        gateway.set_fail_writes(false);
        let id = store.tasks()[0].id;
        store.start_task(id, at(2, 9, 0)).unwrap();
        assert_eq!(gateway.load_tasks().unwrap().len(), 1);
    }

    #[test]
    fn test_sweep_reports_persistence_failure() {
        let (mut store, gateway) = create_test_store();
        let task = Task::new("Late", Duration::hours(1))
            .unwrap()
            .with_due_date(at(2, 8, 30));
        let id = store.add_task(task, at(2, 8, 0)).unwrap();

        gateway.set_fail_writes(true);
        assert!(matches!(store.sweep(at(2, 9, 0)), Err(TaskError::Persistence(_))));
        assert_eq!(store.task(id).unwrap().status, TaskStatus::Overdue);
    }

    #[test]
    fn test_day_rollover_starts_fresh_statistics() {
        let (mut store, gateway) = create_test_store();
        add(&mut store, "Yesterday's", Duration::hours(1));

        let next_day = at(3, 9, 0);
        assert!(store.roll_over(next_day).unwrap());
        assert_eq!(store.statistics().date, next_day.date_naive());
        assert_eq!(store.statistics().tasks_created, 0);
        assert_eq!(
            gateway
                .load_daily_statistics("stats-2026-03-02")
                .unwrap()
                .map(|s| s.tasks_created),
            Some(1)
        );
        assert!(!store.roll_over(at(3, 10, 0)).unwrap());
    }

    #[test]
    fn test_load_restores_single_active_task() {
        let gateway = MemoryGateway::new();
        let mut a = Task::new("A", Duration::hours(1)).unwrap();
        let mut b = Task::new("B", Duration::hours(1)).unwrap();
        a.start(at(2, 8, 0)).unwrap();
        b.start(at(2, 8, 10)).unwrap();
        gateway.save_tasks(&[a.clone(), b.clone()]).unwrap();

        let store = TaskStore::load(Arc::new(gateway), at(2, 9, 0)).unwrap();
        assert_eq!(store.active_task_id(), Some(a.id));
        assert_eq!(store.task(b.id).unwrap().status, TaskStatus::Paused);
    }

    #[test]
    fn test_archive_pauses_and_hides() {
        let (mut store, _) = create_test_store();
        let id = add(&mut store, "Someday", Duration::hours(1));
        store.start_task(id, at(2, 9, 0)).unwrap();

        store.archive_task(id, at(2, 9, 30)).unwrap();
        assert_eq!(store.task(id).unwrap().status, TaskStatus::Paused);
        assert_eq!(store.active_task_id(), None);
        assert!(store.tasks_for_today(at(2, 10, 0)).is_empty());

        store.unarchive_task(id, at(2, 10, 0)).unwrap();
        assert_eq!(store.tasks_for_today(at(2, 10, 0)).len(), 1);
    }

    #[test]
    fn test_current_task_remaining_time() {
        let (mut store, _) = create_test_store();
        assert_eq!(store.current_task_remaining_time(at(2, 9, 0)), Duration::zero());

        let id = add(&mut store, "Focus", Duration::hours(1));
        store.start_task(id, at(2, 9, 0)).unwrap();
        assert_eq!(
            store.current_task_remaining_time(at(2, 9, 20)),
            Duration::minutes(40)
        );
    }
}
