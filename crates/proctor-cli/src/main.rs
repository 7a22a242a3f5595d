use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod cli;

use cli::args::Cli;
use cli::commands::{dispatch, exit_codes};

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(std::io::stderr) // stdout carries command output
        .init();
}

/// `--log-level`/`PROCTOR_LOG` first, then the config file, then `info`.
fn resolve_log_level(cli: &Cli) -> String {
    if let Some(level) = &cli.log_level {
        return level.clone();
    }
    cli.cmd
        .config_path()
        .and_then(|p| proctor_core::config::load_config(p, false).ok())
        .map(|cfg| cfg.log_level)
        .unwrap_or_else(|| "info".into())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging(&resolve_log_level(&cli));

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            let detail = format!("{:#}", e);
            tracing::error!(event = "proctor.cli.fatal", error = %detail);
            eprintln!("fatal: {detail}");
            if proctor_core::errors::as_config_error(&e).is_some() {
                exit_codes::CONFIG_ERROR
            } else {
                exit_codes::TASK_FAILURE
            }
        }
    };
    std::process::exit(code);
}
