mod cli;
mod config;
mod fs_ops;
mod logging;
mod manifest;
mod paths;
mod task;
mod transition;

use cli::Cli;
use config::Config;
use std::process::ExitCode;
use task::{Task, TaskOptions};
use tracing::{error, info, warn};

struct RunExitCode;

impl RunExitCode {
    /// Exit code used when the run finished but some records failed.
    fn records_failed() -> ExitCode {
        ExitCode::from(1)
    }

    /// Exit code used for errors that stop the whole run (bad config,
    /// unreadable or malformed manifest, unknown task).
    fn any_error() -> ExitCode {
        ExitCode::from(255)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    logging::init_tracing(cli.verbose, cli.log_level.as_deref());

    if let Some(directory) = &cli.directory
        && let Err(e) = std::env::set_current_dir(directory)
    {
        error!(
            "Failed to change directory to {}: {}",
            directory.display(),
            e
        );
        return RunExitCode::any_error();
    }

    match handle_run(cli) {
        Ok(exit_code) => exit_code,
        Err(err) => {
            error!("{err}");
            RunExitCode::any_error()
        }
    }
}

fn handle_run(cli: Cli) -> anyhow::Result<ExitCode> {
    let task: Task = cli.task.parse()?;

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let config = config.with_overrides(cli.staging_root, cli.live_root, cli.backup_root);

    let report = task::run(
        &cli.manifest,
        task,
        &config,
        TaskOptions {
            dry_run: cli.dry_run,
        },
    )?;

    if cli.dry_run {
        info!("DRY RUN - no files were modified");
    }

    if report.skipped > 0 {
        warn!(
            "{} record(s) had no recognized action and were skipped",
            report.skipped
        );
    }

    if !report.is_clean() {
        error!(
            "{} of {} record(s) failed during {}",
            report.failed, report.records, task
        );
        return Ok(RunExitCode::records_failed());
    }

    info!(
        "Finished {}: {} of {} record(s) applied",
        task, report.succeeded, report.records
    );
    Ok(ExitCode::SUCCESS)
}
