use super::format_duration;
use chrono::Utc;
use deploy_core::config::Config;
use deploy_core::events::{Event, EventKind};
use deploy_core::executor::DeploymentExecutor;
use deploy_core::report::RunReport;
use deploy_core::task::{Task, TaskStatus};
use deploy_ssh::SshBackend;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Where run output goes. With `--json` stdout carries only the report, and
/// progress notes move to stderr.
struct Console<O, E> {
    out: O,
    err: E,
    json: bool,
}

impl Console<io::Stdout, io::Stderr> {
    fn stdio(json: bool) -> Self {
        Self {
            out: io::stdout(),
            err: io::stderr(),
            json,
        }
    }
}

impl<O: Write, E: Write> Console<O, E> {
    fn note(&mut self, line: &str) -> io::Result<()> {
        if self.json {
            writeln!(self.err, "{}", line)
        } else {
            writeln!(self.out, "{}", line)
        }
    }

    fn header(&mut self, tasks: usize, nodes: usize, max_concurrent: usize, dry_run: bool) -> io::Result<()> {
        if dry_run {
            self.note("DRY RUN: playbooks run in check mode, nodes are not changed.")?;
        }
        self.note(&format!(
            "Deploying {} tasks to {} nodes (max concurrent: {})",
            tasks, nodes, max_concurrent
        ))
    }

    fn report(&mut self, report: &RunReport) -> anyhow::Result<()> {
        writeln!(self.out, "{}", serde_json::to_string_pretty(report)?)?;
        Ok(())
    }
}

/// Deploy everything in `config`. Returns whether any task failed.
pub async fn run(
    config: &Config,
    dry_run: bool,
    report_dir: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<bool> {
    let backend = Arc::new(SshBackend::from_config(config));
    let executor = DeploymentExecutor::from_config(config, backend, dry_run);
    let registry = executor.registry().clone();
    let mut console = Console::stdio(json);

    if registry.is_empty() {
        if json {
            console.report(&RunReport::collect(&registry, Utc::now(), dry_run))?;
        } else {
            console.note("Nothing to deploy.")?;
        }
        return Ok(false);
    }
    console.header(
        registry.len(),
        config.nodes.len(),
        config.general.max_concurrent_nodes,
        dry_run,
    )?;

    if !json {
        print_events(&executor);
    }

    let control = executor.control();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted: finishing in-flight tasks, skipping the rest...");
            control.stop();
        }
    });

    let started_at = Utc::now();
    executor.execute_all();
    executor.wait_completion(None).await;
    interrupt.abort();

    let report = RunReport::collect(&registry, started_at, dry_run);
    if json {
        console.report(&report)?;
    } else {
        print_summary(&registry.get_all_tasks(), &report);
    }

    let dir = report_dir.unwrap_or_else(|| RunReport::reports_dir(&config.general.data_dir));
    match report.write_to_dir(&dir)? {
        Some(path) => info!("Run report written to {}", path.display()),
        None => warn!("Report {} already exists, not overwritten", report.run_id),
    }

    Ok(report.statistics.has_failures())
}

fn print_events(executor: &DeploymentExecutor) {
    executor.register_callback(EventKind::TaskStart, |event| {
        if let Some(task) = event.task() {
            println!("▶ {}", label(task));
        }
        Ok(())
    });
    executor.register_callback(EventKind::TaskComplete, |event| {
        if let Some(task) = event.task() {
            println!("✓ {} ({})", label(task), format_duration(task.duration()));
        }
        Ok(())
    });
    executor.register_callback(EventKind::TaskFail, |event| {
        if let Event::TaskFail(task, message) = event {
            println!("✗ {}: {}", label(task), message);
        }
        Ok(())
    });
    executor.register_callback(EventKind::TaskSkip, |event| {
        if let Some(task) = event.task() {
            println!("- {} skipped", label(task));
        }
        Ok(())
    });
}

fn label(task: &Task) -> String {
    format!(
        "[{}] {} {}",
        task.node_name(),
        task.software_name(),
        task.software_version()
    )
}

fn status_icon(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Completed => "✓",
        TaskStatus::Failed => "✗",
        TaskStatus::Skipped => "-",
        TaskStatus::Running => "▶",
        TaskStatus::Pending => "·",
    }
}

fn print_summary(tasks: &[Task], report: &RunReport) {
    println!();
    println!(
        "{:<16} {:<12} {:<10} {:<12} {:<9} {}",
        "NODE", "SOFTWARE", "VERSION", "STATUS", "DURATION", "ERROR"
    );
    println!("{}", "-".repeat(80));
    for task in tasks {
        println!(
            "{:<16} {:<12} {:<10} {} {:<10} {:<9} {}",
            task.node_name(),
            task.software_name(),
            task.software_version(),
            status_icon(task.status()),
            task.status(),
            format_duration(task.duration()),
            task.error_message().unwrap_or(""),
        );
    }

    let stats = &report.statistics;
    let elapsed = report.finished_at - report.started_at;
    println!();
    println!(
        "Total: {}  Completed: {}  Failed: {}  Skipped: {}  Pending: {}",
        stats.total, stats.completed, stats.failed, stats.skipped, stats.pending
    );
    println!("Duration: {}", format_duration(Some(elapsed)));
}
