use crate::domain::views::{self, compute_totals};
use crate::domain::{format_duration, DailyStatistics, Task, TaskStatus};
use crate::persistence::atomic_write;
use crate::report::stats::{
    calculate_completion_stats, calculate_estimation_stats, calculate_tag_stats, completed_on,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, NaiveDate};
use std::path::{Path, PathBuf};

/// Format percentage with 1 decimal place
fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

fn tags_suffix(task: &Task) -> String {
    if task.tags.is_empty() {
        String::new()
    } else {
        let tags: Vec<&str> = task.tags.iter().map(String::as_str).collect();
        format!(" ({})", tags.join(", "))
    }
}

fn status_icon(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::InProgress => "▶",
        TaskStatus::Paused => "⏸",
        TaskStatus::Overdue => "!",
        TaskStatus::Completed => "x",
        TaskStatus::Pending => " ",
    }
}

/// Default location of the report for `date`
pub fn default_report_path(data_dir: &Path, date: NaiveDate) -> PathBuf {
    data_dir.join(format!("report-{}.md", date))
}

/// Render the markdown report for the day `stats` covers.
///
/// The workload section and open-task breakdown only appear when the report
/// is for the current day.
pub fn render_report(
    stats: &DailyStatistics,
    tasks: &[Task],
    now: DateTime<Local>,
    workday: Duration,
) -> String {
    let date = stats.date;
    let is_today = date == now.date_naive();
    let completed = completed_on(tasks, date);
    let estimation = calculate_estimation_stats(&completed);
    let completion = calculate_completion_stats(&completed);

    let mut report = String::new();
    report.push_str(&format!("# Daily Report - {}\n\n", date));

    // Summary
    report.push_str("## Summary\n\n");
    report.push_str(&format!("- **Tasks Created:** {}\n", stats.tasks_created));
    report.push_str(&format!("- **Tasks Completed:** {} ({} completion rate)\n",
        stats.tasks_completed,
        format_percent(stats.completion_rate() * 100.0)));
    report.push_str(&format!("- **Time Spent:** {} / {} estimated ({} efficiency)\n",
        format_duration(stats.total_time_spent),
        format_duration(stats.total_estimated_time),
        format_percent(stats.efficiency() * 100.0)));
    report.push_str(&format!("- **Overdue Transitions:** {}\n", stats.overdue_transitions));
    report.push_str(&format!("- **Productivity Score:** {:.1}\n\n",
        stats.productivity_score));

    let today = views::tasks_for_today(tasks, now);
    if is_today {
        let totals = compute_totals(&today, now);
        report.push_str("## Workload\n\n");
        report.push_str(&format!("- **Remaining:** {}\n", format_duration(totals.remaining)));
        report.push_str(&format!("- **Completed:** {}\n", format_duration(totals.completed)));
        report.push_str(&format!("- **Free Time:** {} of a {} workday\n",
            format_duration(totals.free_time(workday)),
            format_duration(workday)));
        report.push_str(&format!("- **Slack Time:** {}\n\n", format_duration(totals.slack_time())));
    }

    // Estimation Accuracy
    if !completed.is_empty() {
        let done = completed.len() as f64;
        report.push_str("## Estimation Accuracy\n\n");
        report.push_str(&format!("- **Tasks Over Estimate:** {} ({} of completed)\n",
            estimation.over_estimate_count,
            format_percent(estimation.over_estimate_count as f64 / done * 100.0)));
        report.push_str(&format!("- **Time Over Estimate:** {} total\n",
            format_duration(estimation.over_estimate_time)));
        report.push_str(&format!("- **Tasks Under Estimate:** {} ({} of completed)\n",
            estimation.under_estimate_count,
            format_percent(estimation.under_estimate_count as f64 / done * 100.0)));
        report.push_str(&format!("- **Time Under Estimate:** {} saved\n",
            format_duration(estimation.under_estimate_time)));
        report.push_str(&format!("- **Perfect Estimates:** {}\n", estimation.perfect_count));
        report.push_str(&format!("- **Average Accuracy:** {}\n\n",
            format_percent(estimation.avg_accuracy_percent)));

        report.push_str("## Task Completion\n\n");
        report.push_str(&format!("- **Average Time to Complete:** {}\n",
            format_duration(completion.avg_completion_time)));
        if let Some((title, time)) = &completion.fastest_task {
            report.push_str(&format!("- **Fastest Task:** \"{}\" ({})\n", title, format_duration(*time)));
        }
        if let Some((title, time)) = &completion.longest_task {
            report.push_str(&format!("- **Longest Task:** \"{}\" ({})\n", title, format_duration(*time)));
        }
        report.push('\n');
    }

    // Tag Analysis over the day's completed tasks plus today's open ones
    let mut tagged: Vec<&Task> = completed.clone();
    if is_today {
        tagged.extend(
            today
                .iter()
                .copied()
                .filter(|task| task.status != TaskStatus::Completed),
        );
    }
    let tag_stats = calculate_tag_stats(&tagged);
    if !tag_stats.is_empty() {
        report.push_str("## Tag Analysis\n\n");
        let mut tags: Vec<_> = tag_stats.iter().collect();
        tags.sort_by(|a, b| b.1.spent.cmp(&a.1.spent));

        for (tag, stats) in tags {
            report.push_str(&format!("### #{}\n\n", tag));
            report.push_str(&format!("- **Tasks:** {} (Completed: {})\n",
                stats.task_count, stats.completed_count));
            report.push_str(&format!("- **Time:** {} / {} estimated\n",
                format_duration(stats.spent),
                format_duration(stats.estimate)));
            report.push_str(&format!("- **Estimation Accuracy:** {}\n\n",
                format_percent(stats.accuracy_percent)));
        }
    }

    // Tasks Breakdown
    report.push_str("## Tasks Breakdown\n\n");
    if !completed.is_empty() {
        report.push_str("### Completed Tasks\n\n");
        for task in &completed {
            report.push_str(&format!("- [x] **{}**{}\n", task.title, tags_suffix(task)));
            report.push_str(&format!("  - Time: {} / {} estimated\n\n",
                format_duration(task.actual_duration),
                format_duration(task.estimated_duration)));
        }
    }

    if is_today {
        let open: Vec<&Task> = today
            .iter()
            .copied()
            .filter(|task| task.status != TaskStatus::Completed)
            .collect();
        if !open.is_empty() {
            report.push_str("### Open Tasks\n\n");
            for task in open {
                report.push_str(&format!("- [{}] **{}**{}\n",
                    status_icon(task.status),
                    task.title,
                    tags_suffix(task)));
                report.push_str(&format!("  - Time: {} / {} estimated, {} remaining\n\n",
                    format_duration(task.elapsed_time(now)),
                    format_duration(task.estimated_duration),
                    format_duration(task.remaining_time(now))));
            }
        }

        let overdue = views::overdue_tasks(tasks, now);
        if !overdue.is_empty() {
            report.push_str("### Overdue Tasks\n\n");
            for task in overdue {
                let due = task
                    .due_date
                    .map(|due| due.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                report.push_str(&format!("- [!] **{}** (due {})\n", task.title, due));
            }
            report.push('\n');
        }
    }

    report
}

/// Write a rendered report, defaulting to `<data dir>/report-YYYY-MM-DD.md`
pub fn write_report(
    report: &str,
    date: NaiveDate,
    output_path: Option<PathBuf>,
    data_dir: &Path,
) -> Result<PathBuf> {
    let output = output_path.unwrap_or_else(|| default_report_path(data_dir, date));
    atomic_write(&output, report)
        .with_context(|| format!("Failed to write report: {}", output.display()))?;
    Ok(output)
}
