use crate::domain::{Task, TaskStatus};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

/// Estimation accuracy over completed tasks
#[derive(Debug, PartialEq)]
pub struct EstimationStats {
    pub over_estimate_count: usize,
    pub over_estimate_time: Duration,
    pub under_estimate_count: usize,
    pub under_estimate_time: Duration,
    pub perfect_count: usize,
    pub avg_accuracy_percent: f64,
}

/// Task completion statistics
#[derive(Debug, PartialEq)]
pub struct CompletionStats {
    pub completed_count: usize,
    pub avg_completion_time: Duration,
    pub fastest_task: Option<(String, Duration)>,
    pub longest_task: Option<(String, Duration)>,
}

/// Per-tag statistics
#[derive(Debug, PartialEq)]
pub struct TagStats {
    pub task_count: usize,
    pub completed_count: usize,
    pub spent: Duration,
    pub estimate: Duration,
    pub accuracy_percent: f64,
}

impl Default for TagStats {
    fn default() -> Self {
        Self {
            task_count: 0,
            completed_count: 0,
            spent: Duration::zero(),
            estimate: Duration::zero(),
            accuracy_percent: 0.0,
        }
    }
}

/// Accuracy as a percentage where 100% is a perfect estimate
fn accuracy_percent(spent: Duration, estimate: Duration) -> Option<f64> {
    if estimate <= Duration::zero() {
        return None;
    }
    let ratio = spent.num_milliseconds() as f64 / estimate.num_milliseconds() as f64;
    Some(if ratio > 1.0 {
        100.0 / ratio
    } else {
        ratio * 100.0
    })
}

/// Tasks completed on `date`
pub fn completed_on(tasks: &[Task], date: NaiveDate) -> Vec<&Task> {
    tasks
        .iter()
        .filter(|task| task.status == TaskStatus::Completed)
        .filter(|task| task.completed_at.map(|at| at.date_naive()) == Some(date))
        .collect()
}

pub fn calculate_estimation_stats(completed: &[&Task]) -> EstimationStats {
    let mut stats = EstimationStats {
        over_estimate_count: 0,
        over_estimate_time: Duration::zero(),
        under_estimate_count: 0,
        under_estimate_time: Duration::zero(),
        perfect_count: 0,
        avg_accuracy_percent: 0.0,
    };
    let mut accuracy_sum = 0.0;
    let mut accuracy_count = 0;

    for task in completed {
        let spent = task.actual_duration;
        let estimate = task.estimated_duration;

        if spent > estimate {
            stats.over_estimate_count += 1;
            stats.over_estimate_time = stats.over_estimate_time + (spent - estimate);
        } else if spent < estimate {
            stats.under_estimate_count += 1;
            stats.under_estimate_time = stats.under_estimate_time + (estimate - spent);
        } else {
            stats.perfect_count += 1;
        }

        if let Some(accuracy) = accuracy_percent(spent, estimate) {
            accuracy_sum += accuracy;
            accuracy_count += 1;
        }
    }

    if accuracy_count > 0 {
        stats.avg_accuracy_percent = accuracy_sum / accuracy_count as f64;
    }
    stats
}

pub fn calculate_completion_stats(completed: &[&Task]) -> CompletionStats {
    let completed_count = completed.len();
    let mut total_time = Duration::zero();
    let mut fastest: Option<(String, Duration)> = None;
    let mut longest: Option<(String, Duration)> = None;

    for task in completed {
        let spent = task.actual_duration;
        total_time = total_time + spent;

        if fastest.as_ref().map_or(true, |(_, time)| spent < *time) {
            fastest = Some((task.title.clone(), spent));
        }
        if longest.as_ref().map_or(true, |(_, time)| spent > *time) {
            longest = Some((task.title.clone(), spent));
        }
    }

    let avg_completion_time = if completed_count > 0 {
        Duration::milliseconds(total_time.num_milliseconds() / completed_count as i64)
    } else {
        Duration::zero()
    };

    CompletionStats {
        completed_count,
        avg_completion_time,
        fastest_task: fastest,
        longest_task: longest,
    }
}

/// Per-tag totals over the given tasks, keyed by tag name
pub fn calculate_tag_stats(tasks: &[&Task]) -> BTreeMap<String, TagStats> {
    let mut tag_map: BTreeMap<String, TagStats> = BTreeMap::new();

    for task in tasks {
        for tag in &task.tags {
            let entry = tag_map.entry(tag.clone()).or_default();
            entry.task_count += 1;
            entry.estimate = entry.estimate + task.estimated_duration;
            if task.status == TaskStatus::Completed {
                entry.completed_count += 1;
                entry.spent = entry.spent + task.actual_duration;
            }
        }
    }

    for stats in tag_map.values_mut() {
        stats.accuracy_percent = accuracy_percent(stats.spent, stats.estimate).unwrap_or(0.0);
    }

    tag_map
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Local, TimeZone};
    use pretty_assertions::assert_eq;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, day, hour, minute, 0).unwrap()
    }

    fn completed(title: &str, estimate_min: i64, spent_min: i64, day: u32) -> Task {
        let mut task = Task::new(title, Duration::minutes(estimate_min)).unwrap();
        task.start(at(day, 9, 0)).unwrap();
        task.complete(at(day, 9, 0) + Duration::minutes(spent_min)).unwrap();
        task
    }

    #[test]
    fn test_completed_on_filters_by_day() {
        let tasks = vec![
            completed("Today", 30, 30, 2),
            completed("Yesterday", 30, 30, 1),
            Task::new("Open", Duration::minutes(30)).unwrap(),
        ];
        let today = completed_on(&tasks, at(2, 0, 0).date_naive());
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].title, "Today");
    }

    #[test]
    fn test_estimation_stats() {
        let tasks = vec![
            completed("Over", 30, 60, 2),
            completed("Under", 60, 30, 2),
            completed("Exact", 45, 45, 2),
        ];
        let refs: Vec<&Task> = tasks.iter().collect();
        let stats = calculate_estimation_stats(&refs);

        assert_eq!(stats.over_estimate_count, 1);
        assert_eq!(stats.over_estimate_time, Duration::minutes(30));
        assert_eq!(stats.under_estimate_count, 1);
        assert_eq!(stats.under_estimate_time, Duration::minutes(30));
        assert_eq!(stats.perfect_count, 1);
        // 50% + 50% + 100%
        assert!((stats.avg_accuracy_percent - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_completion_stats() {
        let tasks = vec![completed("Quick", 30, 10, 2), completed("Slow", 30, 50, 2)];
        let refs: Vec<&Task> = tasks.iter().collect();
        let stats = calculate_completion_stats(&refs);

        assert_eq!(stats.completed_count, 2);
        assert_eq!(stats.avg_completion_time, Duration::minutes(30));
        assert_eq!(stats.fastest_task, Some(("Quick".to_string(), Duration::minutes(10))));
        assert_eq!(stats.longest_task, Some(("Slow".to_string(), Duration::minutes(50))));
    }

    #[test]
    fn test_completion_stats_empty() {
        let stats = calculate_completion_stats(&[]);
        assert_eq!(stats.completed_count, 0);
        assert_eq!(stats.avg_completion_time, Duration::zero());
        assert!(stats.fastest_task.is_none());
    }

    #[test]
    fn test_tag_stats() {
        let done = Task {
            tags: ["docs".to_string()].into_iter().collect(),
            ..completed("Write", 60, 30, 2)
        };
        let open = Task::new("Review", Duration::minutes(30))
            .unwrap()
            .with_tags(["docs", "team"]);
        let tasks = [&done, &open];

        let stats = calculate_tag_stats(&tasks);
        let docs = &stats["docs"];
        assert_eq!(docs.task_count, 2);
        assert_eq!(docs.completed_count, 1);
        assert_eq!(docs.spent, Duration::minutes(30));
        assert_eq!(docs.estimate, Duration::minutes(90));
        assert_eq!(stats["team"].completed_count, 0);
        assert_eq!(stats.keys().collect::<Vec<_>>(), vec!["docs", "team"]);
    }
}
