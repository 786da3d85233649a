use super::enums::TaskStatus;
use super::task::Task;
use super::timing::non_negative;
use chrono::{DateTime, Days, Duration, Local, NaiveTime, TimeZone};
use std::cmp::Ordering;

/// Assumed length of a working day, in minutes
pub const DEFAULT_WORKDAY_MINUTES: i64 = 8 * 60;

pub fn default_workday() -> Duration {
    Duration::minutes(DEFAULT_WORKDAY_MINUTES)
}

/// Aggregate workload over today's tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadTotals {
    /// Remaining time of tasks not yet completed
    pub remaining: Duration,
    /// Actual duration of completed tasks
    pub completed: Duration,
    /// Estimates of all of today's tasks
    pub estimated: Duration,
}

impl WorkloadTotals {
    /// Time left in the workday after the remaining workload
    pub fn free_time(&self, workday: Duration) -> Duration {
        non_negative(workday - self.remaining)
    }

    /// Estimated work not yet covered by completed work
    pub fn slack_time(&self) -> Duration {
        non_negative(self.estimated - self.completed)
    }
}

/// Local midnight at the start of `now`'s calendar day
pub fn start_of_day(now: DateTime<Local>) -> DateTime<Local> {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .unwrap_or(now)
}

/// Ordering for today's list: priority descending, then due date ascending,
/// tasks with a due date before those without
pub fn today_order(a: &Task, b: &Task) -> Ordering {
    b.priority.cmp(&a.priority).then_with(|| match (a.due_date, b.due_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    })
}

/// Non-archived tasks with no due date or due within today, sorted
pub fn tasks_for_today(tasks: &[Task], now: DateTime<Local>) -> Vec<&Task> {
    let today = start_of_day(now);
    let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);

    let mut list: Vec<&Task> = tasks
        .iter()
        .filter(|task| !task.archived)
        .filter(|task| match task.due_date {
            None => true,
            Some(due) => due >= today && due < tomorrow,
        })
        .collect();
    list.sort_by(|a, b| today_order(a, b));
    list
}

pub fn compute_totals(today: &[&Task], now: DateTime<Local>) -> WorkloadTotals {
    let mut totals = WorkloadTotals {
        remaining: Duration::zero(),
        completed: Duration::zero(),
        estimated: Duration::zero(),
    };

    for task in today {
        if task.status == TaskStatus::Completed {
            totals.completed = totals.completed + task.actual_duration;
        } else {
            totals.remaining = totals.remaining + task.remaining_time(now);
        }
        totals.estimated = totals.estimated + task.estimated_duration;
    }

    totals
}

pub fn overdue_tasks(tasks: &[Task], now: DateTime<Local>) -> Vec<&Task> {
    tasks
        .iter()
        .filter(|task| !task.archived && task.is_overdue(now))
        .collect()
}

/// Non-archived tasks due in `(now, now + days]`, soonest first
pub fn upcoming_tasks(tasks: &[Task], now: DateTime<Local>, days: u32) -> Vec<&Task> {
    let horizon = now
        .checked_add_days(Days::new(u64::from(days)))
        .unwrap_or(now);

    let mut list: Vec<&Task> = tasks
        .iter()
        .filter(|task| !task.archived)
        .filter(|task| matches!(task.due_date, Some(due) if due > now && due <= horizon))
        .collect();
    list.sort_by_key(|task| task.due_date);
    list
}

pub fn tasks_with_status(tasks: &[Task], status: TaskStatus) -> Vec<&Task> {
    tasks
        .iter()
        .filter(|task| !task.archived && task.status == status)
        .collect()
}

/// Case-insensitive substring match over title, description and tags
pub fn search_tasks<'a>(tasks: &'a [Task], query: &str) -> Vec<&'a Task> {
    let needle = query.to_lowercase();
    if needle.is_empty() {
        return tasks.iter().collect();
    }

    tasks
        .iter()
        .filter(|task| {
            task.title.to_lowercase().contains(&needle)
                || task.description.to_lowercase().contains(&needle)
                || task.tags.iter().any(|tag| tag.to_lowercase().contains(&needle))
        })
        .collect()
}
