pub mod enums;
pub mod stats;
pub mod task;
pub mod timing;
pub mod views;

pub use enums::{Priority, RepeatKind, RepeatRule, TaskStatus};
pub use stats::{productivity_score, DailyStatistics};
pub use task::{PauseInterval, Task};
pub use timing::{format_countdown, format_duration};
pub use views::{
    compute_totals, default_workday, overdue_tasks, search_tasks, start_of_day, tasks_for_today,
    tasks_with_status, upcoming_tasks, WorkloadTotals,
};
