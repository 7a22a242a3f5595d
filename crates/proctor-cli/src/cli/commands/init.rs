use super::{exit_codes, open_store};
use crate::cli::args::InitArgs;
use proctor_core::config::write_sample_config;

pub async fn run(args: InitArgs) -> anyhow::Result<i32> {
    if args.config.exists() {
        eprintln!("config exists, leaving it alone: {}", args.config.display());
    } else {
        if let Err(e) = write_sample_config(&args.config) {
            eprintln!("config error: {}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
        eprintln!("wrote config: {}", args.config.display());
    }

    open_store(&args.db)?;
    eprintln!("database ready: {}", args.db.display());
    Ok(exit_codes::OK)
}
