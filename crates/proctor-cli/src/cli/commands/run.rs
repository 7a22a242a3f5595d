use super::{exit_codes, load_or_report, open_store};
use crate::cli::args::RunArgs;
use proctor_core::engine::worker::run_once;
use proctor_core::images::DefaultImageSource;
use std::sync::Arc;

pub async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let Some(cfg) = load_or_report(&args.config, args.strict) else {
        return Ok(exit_codes::CONFIG_ERROR);
    };
    let store = open_store(&args.db)?;
    let images = DefaultImageSource::new(std::time::Duration::from_secs(cfg.timeout_seconds))?;

    match run_once(Arc::new(store), Arc::new(images), &cfg).await {
        Ok(Some(summary)) => {
            println!("{}", serde_json::to_string(&summary)?);
            Ok(exit_codes::OK)
        }
        // Already reported by the worker; tasks stay queued.
        Ok(None) => Ok(exit_codes::CONFIG_ERROR),
        Err(e) => {
            eprintln!("run failed: {:#}", e);
            Ok(exit_codes::TASK_FAILURE)
        }
    }
}
