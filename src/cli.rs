mod help_text;

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Apply or roll back manifest-driven file upgrades of a WAF install
#[derive(Parser, Debug)]
#[command(
    name = "wafup",
    version,
    about,
    long_about = help_text::ROOT_LONG_ABOUT,
    after_help = help_text::ROOT_AFTER_HELP
)]
pub struct Cli {
    /// YAML manifest listing the file changes
    #[arg(value_name = "MANIFEST")]
    pub manifest: PathBuf,

    /// Task to run: check, upgrade or rollback
    #[arg(value_name = "TASK")]
    pub task: String,

    /// Change to DIR before doing anything else
    #[arg(short = 'C', value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Increase log verbosity (-v for info, -vv for debug). Takes precedence over RUST_LOG.
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "log_level")]
    pub verbose: u8,

    /// Log level filter (e.g. info, debug, wafup=trace). Takes precedence over RUST_LOG.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// TOML file with roots and limits
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the staged upgrade files (default: upgrade/)
    #[arg(long, value_name = "DIR")]
    pub staging_root: Option<String>,

    /// Directory of the deployed install (default: /waf/)
    #[arg(long, value_name = "DIR")]
    pub live_root: Option<String>,

    /// Directory receiving backups for rollback (default: bak/)
    #[arg(long, value_name = "DIR")]
    pub backup_root: Option<String>,

    /// Log what would be done without touching any file
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
