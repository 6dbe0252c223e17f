use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use laborlog_core::config::{self, LaborlogConfig};
use laborlog_core::history::{EventAction, HistoryLogger};
use laborlog_core::model::*;
use laborlog_core::report::{self, ProductivitySummary};
use laborlog_core::storage::{create_backend, SessionStore, Storage};
use laborlog_core::tracker::{EndedSession, SessionTracker, StartSession};
use laborlog_core::LaborlogError;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "laborlog",
    about = "Laborlog: warehouse work sessions and daily labor logs",
    version
)]
enum Cli {
    /// Write a default .laborlog/config.toml in the current directory
    Init,
    /// Start a new work session
    Start {
        /// Session label (dock, zone, or line name)
        label: String,
        /// Task kind (inbound, outbound, packaging, repacking, other; Korean names accepted)
        #[arg(short, long, default_value = "other")]
        task: String,
        /// Number of workers on the crew
        #[arg(short, long)]
        workers: u32,
        /// Target quantity to distribute across work days when the session ends
        #[arg(short, long, default_value_t = 0)]
        quantity: u64,
        /// Free-form note carried onto every work log
        #[arg(long)]
        memo: Option<String>,
        /// Event time (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<String>,
        /// Output raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Pause a running session
    Pause {
        /// Session id, id prefix, or label
        session: String,
        #[arg(long)]
        at: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Resume a paused session
    Resume {
        /// Session id, id prefix, or label
        session: String,
        #[arg(long)]
        at: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Change the crew size of a live session
    Workers {
        /// Session id, id prefix, or label
        session: String,
        /// New worker count
        count: u32,
        #[arg(long)]
        at: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// End a session and commit its daily work logs
    End {
        /// Session id, id prefix, or label
        session: String,
        #[arg(long)]
        at: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Drop a live session without writing any work logs
    Discard {
        /// Session id, id prefix, or label
        session: String,
        /// Required: discarding cannot be undone
        #[arg(long)]
        confirm: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show live sessions and the labor accumulated so far
    Status {
        #[arg(long)]
        json: bool,
    },
    /// List committed work logs
    Logs {
        /// First work date to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Last work date to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Filter by task kind
        #[arg(short, long)]
        task: Option<String>,
        /// Filter by session label
        #[arg(short, long)]
        label: Option<String>,
        /// Maximum number of logs
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Productivity (units per labor-hour) over committed work logs
    Report {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(short, long)]
        task: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show the event history for a session, or recent events
    History {
        /// Session id, id prefix, or label (omit for recent events)
        id: Option<String>,
        /// Maximum number of events to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .compact()
        .init();

    let cli = Cli::parse();
    let config = LaborlogConfig::load(Some(&std::env::current_dir()?))
        .context("failed to load laborlog config")?;

    let result = run(cli, &config).await;
    if let Err(ref err) = result {
        if let Some(hint) = error_hint(err) {
            eprintln!("{} {:#}\n\n  {}\n", "Error:".red(), err, hint);
            std::process::exit(1);
        }
    }
    result
}

async fn run(cli: Cli, config: &LaborlogConfig) -> Result<()> {
    match cli {
        Cli::Init => cmd_init(),
        Cli::Start {
            label,
            task,
            workers,
            quantity,
            memo,
            at,
            json,
        } => {
            let tracker = make_tracker(config)?;
            let input = StartSession {
                label,
                task_kind: parse_task(&task)?,
                workers,
                target_quantity: quantity,
                memo,
            };
            let session = tracker
                .start(input, parse_at(at.as_deref())?)
                .await
                .context("failed to start session")?;
            print_session("Started:", &session, json, session.updated_at)
        }
        Cli::Pause { session, at, json } => {
            let tracker = make_tracker(config)?;
            let id = resolve_session(&tracker, &session).await?;
            let session = tracker
                .pause(id, parse_at(at.as_deref())?)
                .await
                .context("failed to pause session")?;
            print_session("Paused:", &session, json, session.updated_at)
        }
        Cli::Resume { session, at, json } => {
            let tracker = make_tracker(config)?;
            let id = resolve_session(&tracker, &session).await?;
            let session = tracker
                .resume(id, parse_at(at.as_deref())?)
                .await
                .context("failed to resume session")?;
            print_session("Resumed:", &session, json, session.updated_at)
        }
        Cli::Workers {
            session,
            count,
            at,
            json,
        } => {
            let tracker = make_tracker(config)?;
            let id = resolve_session(&tracker, &session).await?;
            let session = tracker
                .change_workers(id, count, parse_at(at.as_deref())?)
                .await
                .context("failed to change worker count")?;
            print_session("Crew changed:", &session, json, session.updated_at)
        }
        Cli::End { session, at, json } => {
            let tracker = make_tracker(config)?;
            let id = resolve_session(&tracker, &session).await?;
            let ended = tracker
                .end(id, parse_at(at.as_deref())?)
                .await
                .context("failed to end session")?;
            print_ended(&ended, json)
        }
        Cli::Discard {
            session,
            confirm,
            json,
        } => {
            if !confirm {
                anyhow::bail!(
                    "discard requires --confirm. The session's labor will not be logged."
                );
            }
            let tracker = make_tracker(config)?;
            let id = resolve_session(&tracker, &session).await?;
            let session = tracker
                .discard(id, Utc::now())
                .await
                .context("failed to discard session")?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "discarded": session.id.to_string(),
                        "label": session.label,
                    })
                );
            } else {
                println!(
                    "{} {} ({})",
                    "Discarded:".red(),
                    session.label,
                    short_id(session.id).cyan()
                );
            }
            Ok(())
        }
        Cli::Status { json } => {
            let tracker = make_tracker(config)?;
            cmd_status(&tracker, json).await
        }
        Cli::Logs {
            from,
            to,
            task,
            label,
            limit,
            json,
        } => {
            let storage = make_storage(config)?;
            let query = WorkLogQuery {
                from: parse_date(from.as_deref())?,
                to: parse_date(to.as_deref())?,
                task_kind: task.as_deref().map(parse_task).transpose()?,
                label,
                session_id: None,
                limit,
            };
            cmd_logs(&storage, &query, json).await
        }
        Cli::Report {
            from,
            to,
            task,
            json,
        } => {
            let storage = make_storage(config)?;
            let query = WorkLogQuery {
                from: parse_date(from.as_deref())?,
                to: parse_date(to.as_deref())?,
                task_kind: task.as_deref().map(parse_task).transpose()?,
                limit: usize::MAX,
                ..Default::default()
            };
            cmd_report(&storage, &query, json).await
        }
        Cli::History { id, limit, json } => {
            let history = HistoryLogger::from_config(&config.history);
            cmd_history(&history, id, limit, json)
        }
    }
}

fn make_storage(config: &LaborlogConfig) -> Result<Storage> {
    create_backend(config).context("failed to create storage backend")
}

fn make_tracker(config: &LaborlogConfig) -> Result<SessionTracker<Storage>> {
    let storage = make_storage(config)?;
    tracing::debug!(store = %storage.describe(), "using store");
    let offset = config.time.offset().context("invalid [time] configuration")?;
    Ok(SessionTracker::new(storage, offset)
        .with_history(HistoryLogger::from_config(&config.history)))
}

/// A user-facing hint for errors the operator can act on.
fn error_hint(err: &anyhow::Error) -> Option<&'static str> {
    let core = err
        .chain()
        .find_map(|e| e.downcast_ref::<LaborlogError>())?;
    if core.is_conflict() {
        Some("Another terminal updated this session first. Check `laborlog status` and retry.")
    } else if core.is_transient() {
        Some("The database is busy. Retry in a moment.")
    } else {
        None
    }
}

async fn resolve_session(tracker: &SessionTracker<Storage>, key: &str) -> Result<Uuid> {
    let session = tracker
        .resolve(key)
        .await
        .with_context(|| format!("cannot resolve session '{key}'"))?;
    Ok(session.id)
}

/// Resolve a session key against the event log, which also covers ended sessions.
fn resolve_history_session(history: &HistoryLogger, key: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(key.trim()) {
        return Ok(id);
    }
    match history.matching_sessions(key).as_slice() {
        [] => anyhow::bail!("no session in history matching '{key}'"),
        [one] => Ok(*one),
        many => anyhow::bail!(
            "'{key}' matches {} sessions in history; use the session id",
            many.len()
        ),
    }
}

fn parse_at(at: Option<&str>) -> Result<DateTime<Utc>> {
    match at {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("invalid --at timestamp '{s}', expected RFC 3339"))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

fn parse_date(date: Option<&str>) -> Result<Option<NaiveDate>> {
    date.map(|s| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD"))
    })
    .transpose()
}

fn parse_task(s: &str) -> Result<TaskKind> {
    s.parse::<TaskKind>().map_err(|e| anyhow::anyhow!(e))
}

fn short_id(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}

fn task_label(kind: TaskKind) -> String {
    format!("{} ({})", kind, kind.local_name())
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

fn cmd_init() -> Result<()> {
    let cwd = std::env::current_dir()?;
    let path = config::write_project_config(&cwd).context("failed to write project config")?;
    println!("{} {}", "Created".green(), path.display());
    println!(
        "  {}",
        "Put machine-specific overrides in .laborlog/config.local.toml".dimmed()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// session output
// ---------------------------------------------------------------------------

fn print_session(verb: &str, session: &WorkSession, json: bool, now: DateTime<Utc>) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(session)?);
        return Ok(());
    }

    let status = match session.status {
        SessionStatus::Running => session.status.to_string().green().to_string(),
        SessionStatus::Paused => session.status.to_string().yellow().to_string(),
    };
    println!(
        "{} {} ({}) [{}]",
        verb.green(),
        session.label.bold(),
        short_id(session.id).cyan(),
        status
    );
    println!(
        "  {} {}   {} {}   {} {}",
        "task".dimmed(),
        task_label(session.task_kind).magenta(),
        "workers".dimmed(),
        session.worker_count,
        "labor".dimmed(),
        session.labor_at(now)
    );
    Ok(())
}

fn print_ended(ended: &EndedSession, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(ended)?);
        return Ok(());
    }

    let session = &ended.session;
    println!(
        "{} {} ({}) {} total",
        "Ended:".green(),
        session.label.bold(),
        short_id(session.id).cyan(),
        ended.total_labor()
    );
    if ended.records.is_empty() {
        println!("  {}", "No labor recorded; nothing was logged.".dimmed());
        return Ok(());
    }
    print_log_table(&ended.records);
    Ok(())
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

async fn cmd_status(tracker: &SessionTracker<Storage>, json: bool) -> Result<()> {
    let sessions = tracker
        .active()
        .await
        .context("failed to list live sessions")?;
    let now = Utc::now();

    if json {
        let rows: Vec<serde_json::Value> = sessions
            .iter()
            .map(|s| {
                serde_json::json!({
                    "session": s,
                    "labor_hours": s.labor_at(now).as_hours_f64(),
                    "elapsed_secs": (now - s.started_at).num_seconds().max(0),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{}", "Laborlog Status".bold());
    println!("  {} {}", "store".dimmed(), tracker.store().describe());
    println!(
        "  {} UTC{}",
        "timezone".dimmed(),
        tracker.offset()
    );
    println!();

    if sessions.is_empty() {
        println!("No live sessions.");
        return Ok(());
    }

    println!(
        "  {}  {}  {}  {}  {}  {}",
        format!("{:<8}", "ID").dimmed(),
        format!("{:<8}", "Status").dimmed(),
        format!("{:<20}", "Task").dimmed(),
        format!("{:>7}", "Workers").dimmed(),
        format!("{:>9}", "Elapsed").dimmed(),
        "Label".dimmed(),
    );
    println!("{}", "─".repeat(78).dimmed());

    for s in &sessions {
        let status = format!("{:<8}", s.status.to_string());
        let status = match s.status {
            SessionStatus::Running => status.green().to_string(),
            SessionStatus::Paused => status.yellow().to_string(),
        };
        println!(
            "  {}  {}  {:<20}  {:>7}  {:>9}  {}  {}",
            short_id(s.id).cyan(),
            status,
            task_label(s.task_kind),
            s.worker_count,
            format_elapsed(now - s.started_at),
            s.label,
            s.labor_at(now).to_string().dimmed(),
        );
    }

    println!("{}", "─".repeat(78).dimmed());
    println!(
        "  {} live session{}",
        sessions.len(),
        if sessions.len() == 1 { "" } else { "s" }
    );
    Ok(())
}

fn format_elapsed(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
}

// ---------------------------------------------------------------------------
// logs
// ---------------------------------------------------------------------------

async fn cmd_logs(storage: &Storage, query: &WorkLogQuery, json: bool) -> Result<()> {
    let logs = storage
        .list_work_logs(query)
        .await
        .context("failed to list work logs")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&logs)?);
        return Ok(());
    }

    if logs.is_empty() {
        println!("No work logs found.");
        return Ok(());
    }

    print_log_table(&logs);
    println!(
        "  {} log{}",
        logs.len(),
        if logs.len() == 1 { "" } else { "s" }
    );
    Ok(())
}

fn print_log_table(logs: &[WorkLogRecord]) {
    println!(
        "  {}  {}  {}  {}  {}  {}  {}",
        format!("{:<10}", "Date").dimmed(),
        format!("{:<20}", "Task").dimmed(),
        format!("{:>7}", "Workers").dimmed(),
        format!("{:>8}", "Qty").dimmed(),
        format!("{:>8}", "Hours").dimmed(),
        format!("{:>8}", "LPH").dimmed(),
        "Label".dimmed(),
    );
    println!("{}", "─".repeat(78).dimmed());
    for r in logs {
        let lph = r
            .lph()
            .map(|v| format!("{v:.1}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {}  {:<20}  {:>7}  {:>8}  {:>8.2}  {:>8}  {}",
            r.work_date,
            task_label(r.task_kind).magenta(),
            r.workers,
            r.quantity,
            r.duration_hours,
            lph,
            r.label,
        );
    }
    println!("{}", "─".repeat(78).dimmed());
}

// ---------------------------------------------------------------------------
// report
// ---------------------------------------------------------------------------

async fn cmd_report(storage: &Storage, query: &WorkLogQuery, json: bool) -> Result<()> {
    let logs = storage
        .list_work_logs(query)
        .await
        .context("failed to list work logs")?;
    let summary = report::summarize(&logs);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &ProductivitySummary) {
    println!("{}", "Productivity".bold());
    if summary.records == 0 {
        println!("  No work logs in range.");
        return;
    }

    let fmt_lph = |v: Option<f64>| v.map(|v| format!("{v:.1}")).unwrap_or_else(|| "-".into());
    println!(
        "  {} {}   {} {}   {} {:.2}   {} {}",
        "logs".dimmed(),
        summary.records,
        "quantity".dimmed(),
        summary.total_quantity,
        "labor-hours".dimmed(),
        summary.total_labor_hours,
        "mean LPH".dimmed(),
        fmt_lph(summary.mean_lph).green(),
    );
    println!();
    println!(
        "  {}  {}  {}  {}  {}",
        format!("{:<20}", "Task").dimmed(),
        format!("{:>5}", "Logs").dimmed(),
        format!("{:>9}", "Qty").dimmed(),
        format!("{:>9}", "Hours").dimmed(),
        format!("{:>8}", "LPH").dimmed(),
    );
    for t in &summary.by_task {
        println!(
            "  {:<20}  {:>5}  {:>9}  {:>9.2}  {:>8}",
            task_label(t.task_kind),
            t.records,
            t.quantity,
            t.labor_hours,
            fmt_lph(t.lph),
        );
    }
}

// ---------------------------------------------------------------------------
// history
// ---------------------------------------------------------------------------

fn cmd_history(
    history: &HistoryLogger,
    id: Option<String>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let mut events = match id {
        Some(ref key) => history.history_for(resolve_history_session(history, key)?),
        None => history.recent(limit),
    };
    events.truncate(limit);

    if json {
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }

    if events.is_empty() {
        println!("{}", "No history events found.".dimmed());
        return Ok(());
    }

    println!(
        "{:<20} {:<16} {:<8} {}",
        "Timestamp".dimmed(),
        "Action".dimmed(),
        "ID".dimmed(),
        "Label".dimmed()
    );
    for event in &events {
        let label = event.label.as_deref().unwrap_or("-");
        let action_str = format!("{:<16}", event.action.to_string());
        let action_colored = match event.action {
            EventAction::Started => action_str.green().to_string(),
            EventAction::Paused => action_str.yellow().to_string(),
            EventAction::Resumed => action_str.cyan().to_string(),
            EventAction::WorkersChanged => action_str.magenta().to_string(),
            EventAction::Ended => action_str.bold().to_string(),
            EventAction::Discarded => action_str.red().to_string(),
        };
        print!(
            "{:<20} {} {:<8} {}",
            event
                .timestamp
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
                .dimmed(),
            action_colored,
            short_id(event.session_id).cyan(),
            label
        );
        if !event.changes.is_empty() {
            let changes: Vec<String> = event
                .changes
                .iter()
                .map(|c| format!("{}: {} -> {}", c.field, c.old_value, c.new_value))
                .collect();
            print!("  {}", changes.join(", ").dimmed());
        }
        println!();
    }

    Ok(())
}
