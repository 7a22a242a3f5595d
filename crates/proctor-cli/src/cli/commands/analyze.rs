use super::{exit_codes, load_or_report, open_store};
use crate::cli::args::AnalyzeArgs;
use proctor_core::engine::analyze::Analyzer;
use proctor_core::engine::worker::log_misconfigured;
use proctor_core::images::DefaultImageSource;
use proctor_core::model::ActivityKey;
use std::sync::Arc;

pub async fn run(args: AnalyzeArgs) -> anyhow::Result<i32> {
    let Some(cfg) = load_or_report(&args.config, args.strict) else {
        return Ok(exit_codes::CONFIG_ERROR);
    };
    let store = open_store(&args.db)?;
    let images = DefaultImageSource::new(std::time::Duration::from_secs(cfg.timeout_seconds))?;

    let analyzer = match Analyzer::from_config(Arc::new(store), Arc::new(images), &cfg) {
        Ok(a) => a,
        Err(e) => {
            log_misconfigured(&cfg, &e);
            eprintln!("config error: {}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let outcomes = match (args.report, args.course, args.cmid, args.user) {
        (Some(id), _, _, _) => analyzer.analyze_report(id).await.map(|o| vec![o]),
        (None, Some(courseid), Some(cmid), Some(userid)) => {
            analyzer
                .analyze_activity(ActivityKey {
                    courseid,
                    cmid,
                    userid,
                })
                .await
        }
        _ => {
            eprintln!("analyze needs --report or all of --course, --cmid and --user");
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    match outcomes {
        Ok(outcomes) => {
            for o in &outcomes {
                println!(
                    "{}",
                    serde_json::json!({
                        "reportid": o.reportid,
                        "similarity": o.similarity,
                        "result": o.result,
                        "warned": o.warned,
                    })
                );
            }
            Ok(exit_codes::OK)
        }
        Err(e) => {
            eprintln!("analyze failed: {:#}", e);
            Ok(exit_codes::TASK_FAILURE)
        }
    }
}
