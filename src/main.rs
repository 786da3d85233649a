use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tempo::domain::{format_countdown, format_duration, DailyStatistics};
use tempo::persistence::{ensure_dir, get_data_dir, init_local_data_dir};
use tempo::report::{render_report, write_report};
use tempo::{
    load_config, ChangeEvent, JsonFileGateway, PersistenceGateway, Priority, RepeatKind,
    RepeatRule, SystemClock, Task, TaskManager, CONFIG_FILE,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tempo")]
#[command(about = "Track tasks against their estimates, due dates and your day", long_about = None)]
struct Cli {
    /// Data directory to use instead of ./.tempo or ~/.tempo
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a local .tempo directory in the current directory
    Init,
    /// Add a task
    Add {
        title: String,
        /// Estimate like "90m", "1h30m" or "2h"
        #[arg(short, long, default_value = "30m")]
        estimate: String,
        /// Due date as "YYYY-MM-DD" or "YYYY-MM-DD HH:MM"
        #[arg(short, long)]
        due: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// low, medium or high
        #[arg(short, long)]
        priority: Option<String>,
        /// none, daily, weekly, monthly, yearly or custom
        #[arg(short, long)]
        repeat: Option<String>,
        /// Repeat interval (days for custom)
        #[arg(long, default_value_t = 1)]
        every: u32,
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    /// Edit a task's fields
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(short, long)]
        estimate: Option<String>,
        #[arg(short, long)]
        due: Option<String>,
        /// Remove the due date
        #[arg(long, conflicts_with = "due")]
        no_due: bool,
        #[arg(long)]
        description: Option<String>,
        #[arg(short, long)]
        priority: Option<String>,
        #[arg(short, long)]
        repeat: Option<String>,
        #[arg(long)]
        every: Option<u32>,
        /// Replace the tags
        #[arg(short, long = "tag")]
        tags: Option<Vec<String>>,
    },
    /// Delete a task
    Delete { id: String },
    /// Start a task, pausing whatever is running
    Start { id: String },
    Pause { id: String },
    Resume { id: String },
    Complete { id: String },
    /// Return a task to pending and clear its timing
    Reset { id: String },
    Archive { id: String },
    Unarchive { id: String },
    /// Today's tasks
    List,
    /// Every task, archived included
    All,
    Overdue,
    Upcoming {
        /// Horizon in days (defaults to the configured value)
        #[arg(short, long)]
        days: Option<u32>,
    },
    Search { query: String },
    /// Today's statistics and workload
    Stats,
    /// Generate a daily report
    Report {
        /// Date to generate report for (YYYY-MM-DD format). Defaults to today.
        #[arg(short, long)]
        date: Option<String>,
        /// Output file path. Defaults to <data dir>/report-YYYY-MM-DD.md
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run the overdue sweep and print changes until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        let data_dir = init_local_data_dir()?;
        println!("Initialized tempo directory: {}", data_dir.display());
        println!("tempo will now use this local directory for task storage.");
        return Ok(());
    }

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => get_data_dir()?,
    };
    ensure_dir(&data_dir)?;
    let config = load_config(data_dir.join(CONFIG_FILE))?;

    let default_filter = if cli.verbose {
        "tempo=debug".to_string()
    } else {
        config.log_filter.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let gateway = Arc::new(JsonFileGateway::new(&data_dir));
    let clock = Arc::new(SystemClock);

    if let Commands::Watch = cli.command {
        let manager = TaskManager::spawn(gateway, clock, config)?;
        return watch(manager).await;
    }

    let manager = TaskManager::new(gateway.clone(), clock, config)?;
    if let Err(e) = manager.sweep_now() {
        warn!("overdue sweep failed: {}", e);
    }
    run_command(cli.command, &manager, gateway.as_ref(), &data_dir)
}

fn run_command(
    command: Commands,
    manager: &TaskManager,
    gateway: &dyn PersistenceGateway,
    data_dir: &std::path::Path,
) -> Result<()> {
    let now = manager.now();

    match command {
        // Handled before the manager is loaded
        Commands::Init | Commands::Watch => {}
        Commands::Add {
            title,
            estimate,
            due,
            description,
            priority,
            repeat,
            every,
            tags,
        } => {
            let mut task = Task::new(title, parse_duration(&estimate)?)?.with_tags(tags);
            if let Some(due) = due {
                task = task.with_due_date(parse_due(&due)?);
            }
            if let Some(description) = description {
                task = task.with_description(description);
            }
            if let Some(priority) = priority {
                task = task.with_priority(parse_priority(&priority)?);
            }
            if let Some(repeat) = repeat {
                task = task.with_repeat(RepeatRule::new(parse_repeat(&repeat)?, every));
            }
            let id = manager.add_task(task)?;
            println!("Added {}", short_id(&id));
        }
        Commands::Edit {
            id,
            title,
            estimate,
            due,
            no_due,
            description,
            priority,
            repeat,
            every,
            tags,
        } => {
            let id = resolve(manager, &id)?;
            let mut task = manager
                .task(id)
                .with_context(|| format!("Task {} disappeared", id))?;
            if let Some(title) = title {
                task.title = title;
            }
            if let Some(estimate) = estimate {
                task.estimated_duration = parse_duration(&estimate)?;
            }
            if let Some(due) = due {
                task.due_date = Some(parse_due(&due)?);
            }
            if no_due {
                task.due_date = None;
            }
            if let Some(description) = description {
                task.description = description;
            }
            if let Some(priority) = priority {
                task.priority = parse_priority(&priority)?;
            }
            if let Some(repeat) = repeat {
                task.repeat.kind = parse_repeat(&repeat)?;
            }
            if let Some(every) = every {
                task.repeat.interval = every;
            }
            if let Some(tags) = tags {
                task.tags = tags.into_iter().collect();
            }
            manager.update_task(task)?;
            println!("Updated {}", short_id(&id));
        }
        Commands::Delete { id } => {
            let task = manager.delete_task(resolve(manager, &id)?)?;
            println!("Deleted '{}'", task.title);
        }
        Commands::Start { id } => {
            let id = resolve(manager, &id)?;
            manager.start_task(id)?;
            print_active(manager, now);
        }
        Commands::Pause { id } => {
            manager.pause_task(resolve(manager, &id)?)?;
            println!("Paused");
        }
        Commands::Resume { id } => {
            manager.resume_task(resolve(manager, &id)?)?;
            print_active(manager, now);
        }
        Commands::Complete { id } => {
            let id = resolve(manager, &id)?;
            let next = manager.complete_task(id)?;
            if let Some(task) = manager.task(id) {
                println!(
                    "Completed '{}' in {}",
                    task.title,
                    format_duration(task.actual_duration)
                );
            }
            if let Some(next) = next.and_then(|next| manager.task(next)) {
                println!("Next occurrence {} due {}", short_id(&next.id), format_due(&next));
            }
        }
        Commands::Reset { id } => {
            manager.reset_task(resolve(manager, &id)?)?;
            println!("Reset");
        }
        Commands::Archive { id } => {
            manager.archive_task(resolve(manager, &id)?)?;
            println!("Archived");
        }
        Commands::Unarchive { id } => {
            manager.unarchive_task(resolve(manager, &id)?)?;
            println!("Unarchived");
        }
        Commands::List => print_tasks(&manager.tasks_for_today(), now),
        Commands::All => print_tasks(&manager.tasks(), now),
        Commands::Overdue => print_tasks(&manager.overdue_tasks(), now),
        Commands::Upcoming { days } => {
            let days = days.unwrap_or(manager.config().upcoming_days);
            print_tasks(&manager.upcoming_tasks(days), now);
        }
        Commands::Search { query } => print_tasks(&manager.search_tasks(&query), now),
        Commands::Stats => print_stats(manager),
        Commands::Report { date, output } => {
            let today = now.date_naive();
            let report_date = match date {
                Some(date) => NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                    .map_err(|e| anyhow::anyhow!("Invalid date format. Use YYYY-MM-DD: {}", e))?,
                None => today,
            };
            let stats = if report_date == today {
                manager.statistics()
            } else {
                gateway
                    .load_daily_statistics(&DailyStatistics::date_key(report_date))?
                    .unwrap_or_else(|| DailyStatistics::new(report_date))
            };

            let report = render_report(&stats, &manager.tasks(), now, manager.config().workday());
            let path = write_report(&report, report_date, output, data_dir)?;
            println!("Report generated: {}", path.display());
        }
    }

    Ok(())
}

async fn watch(manager: TaskManager) -> Result<()> {
    let mut rx = manager.subscribe();
    eprintln!("Watching tasks, Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = rx.recv() => match event {
                Ok(ChangeEvent::Tick { .. }) => {
                    if let Some(task) = manager.active_task() {
                        print!(
                            "\r{}  {} left   ",
                            task.title,
                            format_countdown(task.remaining_time(manager.now()))
                        );
                        std::io::stdout().flush()?;
                    }
                }
                Ok(ChangeEvent::TaskUpdated(id)) | Ok(ChangeEvent::TaskAdded(id)) => {
                    if let Some(task) = manager.task(id) {
                        println!("\r{}", describe(&task, manager.now()));
                    }
                }
                Ok(ChangeEvent::TaskRemoved(id)) => println!("\r{} removed", short_id(&id)),
                Ok(ChangeEvent::StatsChanged(_)) => {
                    let stats = manager.statistics();
                    println!(
                        "\rScore {:.1}, {} completed, {} overdue",
                        stats.productivity_score, stats.tasks_completed, stats.overdue_transitions
                    );
                }
                Err(RecvError::Lagged(skipped)) => warn!("missed {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    }

    println!();
    Ok(())
}

fn resolve(manager: &TaskManager, needle: &str) -> Result<uuid::Uuid> {
    manager
        .resolve_id(needle)
        .with_context(|| format!("No single task matches '{}'", needle))
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

fn format_due(task: &Task) -> String {
    task.due_date
        .map(|due| due.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn describe(task: &Task, now: DateTime<Local>) -> String {
    let mut line = format!(
        "{}  {:<11} {}  {} / {}",
        short_id(&task.id),
        task.status.to_tag(),
        task.title,
        format_duration(task.elapsed_time(now)),
        format_duration(task.estimated_duration),
    );
    if task.due_date.is_some() {
        line.push_str(&format!("  due {}", format_due(task)));
    }
    if !task.tags.is_empty() {
        let tags: Vec<String> = task.tags.iter().map(|tag| format!("#{}", tag)).collect();
        line.push_str(&format!("  {}", tags.join(" ")));
    }
    if task.archived {
        line.push_str("  (archived)");
    }
    line
}

fn print_tasks(tasks: &[Task], now: DateTime<Local>) {
    if tasks.is_empty() {
        println!("No tasks");
        return;
    }
    for task in tasks {
        println!("{}", describe(task, now));
    }
}

fn print_active(manager: &TaskManager, now: DateTime<Local>) {
    if let Some(task) = manager.active_task() {
        println!(
            "Working on '{}', {} left",
            task.title,
            format_countdown(task.remaining_time(now))
        );
    }
}

fn print_stats(manager: &TaskManager) {
    let stats = manager.statistics();
    let workload = manager.workload();

    println!("Statistics for {}", stats.date);
    println!("  Created:        {}", stats.tasks_created);
    println!("  Completed:      {}", stats.tasks_completed);
    println!(
        "  Time spent:     {} of {} estimated",
        format_duration(stats.total_time_spent),
        format_duration(stats.total_estimated_time)
    );
    println!("  Overdue:        {}", stats.overdue_transitions);
    println!("  Productivity:   {:.1}", stats.productivity_score);
    println!();
    println!("Workload");
    println!("  Remaining:      {}", format_duration(workload.remaining));
    println!("  Free time:      {}", format_duration(manager.free_time()));
    println!("  Slack:          {}", format_duration(manager.slack_time()));
    if manager.active_task().is_some() {
        println!(
            "  Current task:   {} left",
            format_countdown(manager.current_task_remaining_time())
        );
    }
}

/// Parse "90m", "1h30m", "2h", "1h 15m" or bare minutes
fn parse_duration(input: &str) -> Result<Duration> {
    let too_large = || anyhow::anyhow!("Duration '{}' is too large", input);
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if let Ok(minutes) = compact.parse::<i64>() {
        return Duration::try_minutes(minutes).ok_or_else(too_large);
    }

    let mut total = Duration::zero();
    let mut digits = String::new();
    for c in compact.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let value: i64 = digits
            .parse()
            .with_context(|| format!("Invalid duration '{}'", input))?;
        let part = match c {
            'h' => Duration::try_hours(value),
            'm' => Duration::try_minutes(value),
            's' => Duration::try_seconds(value),
            _ => anyhow::bail!("Invalid duration unit '{}' in '{}'", c, input),
        };
        total = part
            .and_then(|part| total.checked_add(&part))
            .ok_or_else(too_large)?;
        digits.clear();
    }
    if !digits.is_empty() {
        anyhow::bail!("Missing unit in duration '{}'", input);
    }
    Ok(total)
}

/// Parse "YYYY-MM-DD HH:MM"; a bare date means the end of that day
fn parse_due(input: &str) -> Result<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M").or_else(|_| {
        NaiveDate::parse_from_str(input, "%Y-%m-%d").map(|date| {
            date.and_time(NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN))
        })
    });
    let naive = naive.map_err(|e| {
        anyhow::anyhow!("Invalid due date. Use YYYY-MM-DD or 'YYYY-MM-DD HH:MM': {}", e)
    })?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .with_context(|| format!("'{}' does not exist in the local time zone", input))
}

fn parse_priority(input: &str) -> Result<Priority> {
    Priority::from_tag(input).with_context(|| format!("Unknown priority '{}'", input))
}

fn parse_repeat(input: &str) -> Result<RepeatKind> {
    RepeatKind::from_tag(input).with_context(|| format!("Unknown repeat rule '{}'", input))
}
