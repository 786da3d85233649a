use super::enums::{Priority, RepeatKind, RepeatRule, TaskStatus};
use super::timing::{as_secs_f64, duration_ms, non_negative, unit_ratio, whole_millis};
use crate::error::TaskError;
use chrono::{DateTime, Days, Duration, Local, Months};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A closed pause-to-resume interval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseInterval {
    pub started: DateTime<Local>,
    pub ended: DateTime<Local>,
}

impl PauseInterval {
    pub fn duration(&self) -> Duration {
        non_negative(self.ended.signed_duration_since(self.started))
    }
}

/// One unit of work and its timing state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique ID, immutable after creation
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "estimated_ms", with = "duration_ms")]
    pub estimated_duration: Duration,
    /// Snapshot of elapsed time taken on completion
    #[serde(rename = "actual_ms", with = "duration_ms")]
    pub actual_duration: Duration,
    pub due_date: Option<DateTime<Local>>,
    /// Stamped when the task is handed to the manager
    #[serde(default)]
    pub created_at: Option<DateTime<Local>>,
    pub completed_at: Option<DateTime<Local>>,
    pub started_at: Option<DateTime<Local>>,
    /// Start of the currently open pause, if any
    pub paused_at: Option<DateTime<Local>>,
    /// Closed pause intervals since the last start
    #[serde(default)]
    pub pauses: Vec<PauseInterval>,
    pub status: TaskStatus,
    #[serde(default)]
    pub repeat: RepeatRule,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub priority: Priority,
    /// Set once the sweep has moved this task to overdue
    #[serde(default)]
    pub overdue_flagged: bool,
}

impl Task {
    pub fn new(title: impl Into<String>, estimated_duration: Duration) -> Result<Self, TaskError> {
        let task = Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: String::new(),
            estimated_duration: whole_millis(estimated_duration),
            actual_duration: Duration::zero(),
            due_date: None,
            created_at: None,
            completed_at: None,
            started_at: None,
            paused_at: None,
            pauses: Vec::new(),
            status: TaskStatus::Pending,
            repeat: RepeatRule::NONE,
            archived: false,
            tags: BTreeSet::new(),
            priority: Priority::Low,
            overdue_flagged: false,
        };
        task.validate()?;
        Ok(task)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_due_date(mut self, due_date: DateTime<Local>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_repeat(mut self, repeat: RepeatRule) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Reject tasks that break the entity invariants
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.title.trim().is_empty() {
            return Err(TaskError::InvalidTask("title must not be empty".to_string()));
        }
        if self.estimated_duration < Duration::zero() {
            return Err(TaskError::InvalidTask(
                "estimated duration must not be negative".to_string(),
            ));
        }
        if self.repeat.is_repeating() && self.repeat.interval == 0 {
            return Err(TaskError::InvalidTask(
                "repeat interval must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Total pause time: closed intervals plus the open one up to `now`
    /// (or up to the completion time for completed tasks)
    pub fn paused_duration(&self, now: DateTime<Local>) -> Duration {
        let closed = self
            .pauses
            .iter()
            .fold(Duration::zero(), |acc, pause| acc + pause.duration());

        let open_until = self.completed_at.unwrap_or(now);
        let open = self
            .paused_at
            .map(|paused| non_negative(open_until.signed_duration_since(paused)))
            .unwrap_or_else(Duration::zero);

        closed + open
    }

    /// Time actually worked on this task
    pub fn elapsed_time(&self, now: DateTime<Local>) -> Duration {
        let Some(started) = self.started_at else {
            return Duration::zero();
        };

        let elapsed = match (self.status, self.completed_at) {
            (TaskStatus::InProgress | TaskStatus::Paused | TaskStatus::Overdue, _) => {
                now.signed_duration_since(started) - self.paused_duration(now)
            }
            (TaskStatus::Completed, Some(completed)) => {
                completed.signed_duration_since(started) - self.paused_duration(completed)
            }
            _ => self.actual_duration,
        };

        non_negative(elapsed)
    }

    /// Estimate minus elapsed while running; the full estimate otherwise
    pub fn remaining_time(&self, now: DateTime<Local>) -> Duration {
        if self.status != TaskStatus::InProgress {
            return non_negative(self.estimated_duration);
        }
        non_negative(self.estimated_duration - self.elapsed_time(now))
    }

    pub fn is_overdue(&self, now: DateTime<Local>) -> bool {
        match self.due_date {
            Some(due) => now > due && self.status != TaskStatus::Completed,
            None => false,
        }
    }

    /// Elapsed over estimate, clamped to `[0, 1]`
    pub fn progress(&self, now: DateTime<Local>) -> f64 {
        if self.estimated_duration <= Duration::zero() {
            return 0.0;
        }
        unit_ratio(
            as_secs_f64(self.elapsed_time(now)),
            as_secs_f64(self.estimated_duration),
        )
    }

    fn invalid(&self, action: &'static str) -> TaskError {
        TaskError::InvalidTransition {
            id: self.id,
            from: self.status,
            action,
        }
    }

    fn close_open_pause(&mut self, now: DateTime<Local>) {
        if let Some(paused) = self.paused_at.take() {
            self.pauses.push(PauseInterval {
                started: paused,
                ended: now.max(paused),
            });
        }
    }

    /// Start a fresh work session
    pub fn start(&mut self, now: DateTime<Local>) -> Result<(), TaskError> {
        if !self.status.can_start() {
            return Err(self.invalid("start"));
        }
        self.status = TaskStatus::InProgress;
        self.started_at = Some(now);
        self.paused_at = None;
        self.pauses.clear();
        Ok(())
    }

    pub fn pause(&mut self, now: DateTime<Local>) -> Result<(), TaskError> {
        if self.status != TaskStatus::InProgress {
            return Err(self.invalid("pause"));
        }
        self.status = TaskStatus::Paused;
        self.paused_at = Some(now);
        Ok(())
    }

    pub fn resume(&mut self, now: DateTime<Local>) -> Result<(), TaskError> {
        if self.status != TaskStatus::Paused {
            return Err(self.invalid("resume"));
        }
        self.close_open_pause(now);
        self.status = TaskStatus::InProgress;
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Local>) -> Result<(), TaskError> {
        if self.status == TaskStatus::Completed {
            return Err(self.invalid("complete"));
        }
        self.close_open_pause(now);
        self.status = TaskStatus::Completed;
        self.completed_at = Some(now);
        self.actual_duration = whole_millis(self.elapsed_time(now));
        Ok(())
    }

    /// Back to pending with all timing state cleared
    pub fn reset(&mut self) {
        self.status = TaskStatus::Pending;
        self.started_at = None;
        self.paused_at = None;
        self.completed_at = None;
        self.pauses.clear();
        self.actual_duration = Duration::zero();
        self.overdue_flagged = false;
    }

    /// Sweep transition; a running timer is frozen at `now`
    pub fn mark_overdue(&mut self, now: DateTime<Local>) {
        if self.status == TaskStatus::InProgress {
            self.paused_at = Some(now);
        }
        self.status = TaskStatus::Overdue;
        self.overdue_flagged = true;
    }

    /// Due date of the next occurrence under this task's repeat rule
    pub fn next_due_date(&self) -> Option<DateTime<Local>> {
        let due = self.due_date?;
        let n = self.repeat.interval;
        match self.repeat.kind {
            RepeatKind::None => None,
            RepeatKind::Daily | RepeatKind::Custom => due.checked_add_days(Days::new(u64::from(n))),
            RepeatKind::Weekly => due.checked_add_days(Days::new(7 * u64::from(n))),
            RepeatKind::Monthly => due.checked_add_months(Months::new(n)),
            RepeatKind::Yearly => due.checked_add_months(Months::new(n.checked_mul(12)?)),
        }
    }

    /// Successor spawned when a repeating task is completed
    pub fn next_occurrence(&self) -> Option<Task> {
        let next_due = self.next_due_date()?;
        let mut successor = self.clone();
        successor.id = Uuid::new_v4();
        successor.due_date = Some(next_due);
        successor.reset();
        Some(successor)
    }
}
