pub mod analyze;
pub mod enqueue;
pub mod init;
pub mod run;
pub mod status;

use crate::cli::args::{Cli, Command};
use proctor_core::config::{load_config, ProctorConfig};
use proctor_core::storage::Store;
use std::path::Path;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const TASK_FAILURE: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Init(a) => init::run(a).await,
        Command::Run(a) => run::run(a).await,
        Command::Enqueue(a) => enqueue::run(a).await,
        Command::Analyze(a) => analyze::run(a).await,
        Command::Status(a) => status::run(a).await,
    }
}

/// Loads config, reporting problems on stderr. `None` means exit with
/// `CONFIG_ERROR`.
pub(crate) fn load_or_report(path: &Path, strict: bool) -> Option<ProctorConfig> {
    match load_config(path, strict) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            tracing::error!(
                event = "proctor.cli.config_error",
                config_path = %path.display(),
                error = %e
            );
            eprintln!("config error: {}", e);
            None
        }
    }
}

pub(crate) fn open_store(db: &Path) -> anyhow::Result<Store> {
    if let Some(parent) = db.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let store = Store::open(db)?;
    store.init_schema()?;
    Ok(store)
}
