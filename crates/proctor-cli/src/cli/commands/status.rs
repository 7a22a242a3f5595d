use super::{exit_codes, open_store};
use crate::cli::args::StatusArgs;

fn count(v: Option<u64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_else(|| "?".into())
}

pub async fn run(args: StatusArgs) -> anyhow::Result<i32> {
    let store = open_store(&args.db)?;
    let stats = store.stats_best_effort()?;

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(exit_codes::OK);
    }

    let mut s = String::new();
    s.push_str(&format!("Proctor status ({})\n", args.db.display()));
    s.push_str(&format!(
        "Reports: {} (unscored {}, pending {}, scored {})\n",
        count(stats.reports),
        count(stats.unscored),
        count(stats.pending),
        count(stats.scored)
    ));
    s.push_str(&format!(
        "Queue: {} task(s), {} leased\n",
        count(stats.queued_tasks),
        count(stats.leased_tasks)
    ));
    if let Some(ts) = stats.oldest_task_at {
        let when = chrono::DateTime::from_timestamp(ts, 0)
            .map(|d| d.to_rfc3339())
            .unwrap_or_else(|| ts.to_string());
        s.push_str(&format!("Oldest task: {}\n", when));
    }
    s.push_str(&format!(
        "Warnings: {}  API calls logged: {}\n",
        count(stats.warnings),
        count(stats.api_calls)
    ));
    print!("{}", s);
    Ok(exit_codes::OK)
}
