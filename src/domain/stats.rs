use super::timing::{as_secs_f64, duration_ms, unit_ratio, whole_millis};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Per-day counters derived from task activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStatistics {
    pub date: NaiveDate,
    #[serde(default)]
    pub tasks_completed: u32,
    /// Sum of elapsed time of tasks completed this day
    #[serde(rename = "total_time_spent_ms", with = "duration_ms")]
    pub total_time_spent: Duration,
    /// Sum of estimates of tasks completed this day
    #[serde(rename = "total_estimated_time_ms", with = "duration_ms")]
    pub total_estimated_time: Duration,
    #[serde(default)]
    pub tasks_created: u32,
    #[serde(default)]
    pub overdue_transitions: u32,
    #[serde(default)]
    pub productivity_score: f64,
}

impl DailyStatistics {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            tasks_completed: 0,
            total_time_spent: Duration::zero(),
            total_estimated_time: Duration::zero(),
            tasks_created: 0,
            overdue_transitions: 0,
            productivity_score: 0.0,
        }
    }

    /// Key the aggregate is persisted under
    pub fn date_key(date: NaiveDate) -> String {
        format!("stats-{}", date.format("%Y-%m-%d"))
    }

    pub fn key(&self) -> String {
        Self::date_key(self.date)
    }

    /// Time spent over time estimated, clamped to `[0, 1]`
    pub fn efficiency(&self) -> f64 {
        unit_ratio(
            as_secs_f64(self.total_time_spent),
            as_secs_f64(self.total_estimated_time),
        )
    }

    /// Completed over created, clamped to `[0, 1]`
    pub fn completion_rate(&self) -> f64 {
        unit_ratio(self.tasks_completed as f64, self.tasks_created as f64)
    }

    pub fn record_created(&mut self) {
        self.tasks_created += 1;
    }

    pub fn record_completed(&mut self, elapsed: Duration, estimated: Duration) {
        self.tasks_completed += 1;
        self.total_time_spent = self.total_time_spent + whole_millis(elapsed);
        self.total_estimated_time = self.total_estimated_time + whole_millis(estimated);
    }

    pub fn record_overdue(&mut self) {
        self.overdue_transitions += 1;
    }

    pub fn update_productivity_score(&mut self) -> f64 {
        self.productivity_score = productivity_score(self.efficiency(), self.completion_rate());
        self.productivity_score
    }
}

/// `((efficiency + completion_rate) / 2) * 100`, clamped to `[0, 100]`
pub fn productivity_score(efficiency: f64, completion_rate: f64) -> f64 {
    let score = (efficiency + completion_rate) / 2.0 * 100.0;
    if score.is_finite() {
        score.clamp(0.0, 100.0)
    } else {
        0.0
    }
}
