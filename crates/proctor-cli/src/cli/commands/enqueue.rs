use super::{exit_codes, load_or_report, open_store};
use crate::cli::args::EnqueueArgs;
use proctor_core::engine::producer::TaskProducer;
use proctor_core::model::ReportFilter;
use std::sync::Arc;

pub async fn run(args: EnqueueArgs) -> anyhow::Result<i32> {
    let Some(cfg) = load_or_report(&args.config, args.strict) else {
        return Ok(exit_codes::CONFIG_ERROR);
    };
    let store = open_store(&args.db)?;

    let producer = match TaskProducer::from_config(Arc::new(store), &cfg) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("config error: {}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let filter = ReportFilter {
        courseid: args.course,
        cmid: args.cmid,
        userid: args.user,
        flag: None,
    };
    match producer.enqueue_unscored(&filter) {
        Ok(summary) => {
            println!("{}", serde_json::to_string(&summary)?);
            Ok(exit_codes::OK)
        }
        Err(e) => {
            eprintln!("enqueue failed: {:#}", e);
            Ok(exit_codes::TASK_FAILURE)
        }
    }
}
