use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "proctor",
    version,
    about = "Face-match verification queue for proctored quiz snapshots"
)]
pub struct Cli {
    /// Log filter; overrides `log_level` from the config file
    #[arg(long, global = true, env = "PROCTOR_LOG")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a starter config and create the database schema
    Init(InitArgs),
    /// Process one batch of queued face-match tasks
    Run(RunArgs),
    /// Queue unscored reports for face matching
    Enqueue(EnqueueArgs),
    /// Score reports immediately, bypassing the queue
    Analyze(AnalyzeArgs),
    /// Show queue and report counters
    Status(StatusArgs),
}

impl Command {
    pub fn config_path(&self) -> Option<&std::path::Path> {
        match self {
            Command::Run(a) => Some(a.config.as_path()),
            Command::Enqueue(a) => Some(a.config.as_path()),
            Command::Analyze(a) => Some(a.config.as_path()),
            Command::Init(_) | Command::Status(_) => None,
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct InitArgs {
    #[arg(long, default_value = "proctor.yaml")]
    pub config: PathBuf,

    #[arg(long, default_value = ".proctor/proctor.db")]
    pub db: PathBuf,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long, default_value = "proctor.yaml")]
    pub config: PathBuf,

    #[arg(long, default_value = ".proctor/proctor.db")]
    pub db: PathBuf,

    /// Reject unknown config keys
    #[arg(long)]
    pub strict: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct EnqueueArgs {
    #[arg(long, default_value = "proctor.yaml")]
    pub config: PathBuf,

    #[arg(long, default_value = ".proctor/proctor.db")]
    pub db: PathBuf,

    #[arg(long)]
    pub strict: bool,

    #[arg(long)]
    pub course: Option<i64>,

    #[arg(long)]
    pub cmid: Option<i64>,

    #[arg(long)]
    pub user: Option<i64>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[arg(long, default_value = "proctor.yaml")]
    pub config: PathBuf,

    #[arg(long, default_value = ".proctor/proctor.db")]
    pub db: PathBuf,

    #[arg(long)]
    pub strict: bool,

    /// Analyze a single report
    #[arg(long, conflicts_with_all = ["course", "cmid", "user"])]
    pub report: Option<i64>,

    #[arg(long, requires_all = ["cmid", "user"])]
    pub course: Option<i64>,

    #[arg(long, requires_all = ["course", "user"])]
    pub cmid: Option<i64>,

    #[arg(long, requires_all = ["course", "cmid"])]
    pub user: Option<i64>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".proctor/proctor.db")]
    pub db: PathBuf,

    #[arg(long, default_value = "text")]
    pub format: String, // text|json
}
