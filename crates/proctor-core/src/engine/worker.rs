use super::{MatchContext, ScoreOutcome};
use crate::config::ProctorConfig;
use crate::errors::ConfigError;
use crate::images::ImageSource;
use crate::model::{MatchResult, MatchTask};
use crate::providers::{build_backend, MatchBackend};
use crate::storage::MatchStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub batch_size: usize,
    pub parallel: usize,
    pub lease_seconds: i64,
    pub threshold: u8,
    pub timeout: Duration,
}

impl WorkerSettings {
    pub fn from_config(cfg: &ProctorConfig) -> Self {
        Self {
            batch_size: cfg.batch_size.max(1),
            parallel: cfg.worker_parallel.max(1),
            lease_seconds: cfg.lease_seconds,
            threshold: cfg.threshold(),
            timeout: Duration::from_secs(cfg.timeout_seconds),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            parallel: 1,
            lease_seconds: 300,
            threshold: 80,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct BatchSummary {
    pub claimed: usize,
    pub matched: usize,
    pub not_matched: usize,
    pub backend_errors: usize,
    pub warnings: usize,
    pub orphaned: usize,
    /// Claimed tasks taken over by another run before this one reached them.
    pub lost_leases: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Orphaned => self.orphaned += 1,
            TaskOutcome::LeaseLost => self.lost_leases += 1,
            TaskOutcome::Scored(s) => {
                match s.result {
                    MatchResult::Matched { .. } => self.matched += 1,
                    MatchResult::NotMatched => self.not_matched += 1,
                    MatchResult::BackendError { .. } => self.backend_errors += 1,
                }
                if s.warned {
                    self.warnings += 1;
                }
            }
        }
    }
}

#[derive(Debug)]
enum TaskOutcome {
    Scored(ScoreOutcome),
    Orphaned,
    LeaseLost,
}

/// Drains a bounded batch of match tasks per invocation.
pub struct MatchWorker {
    ctx: Arc<MatchContext>,
    settings: WorkerSettings,
    owner: String,
}

impl MatchWorker {
    pub fn new(
        store: Arc<dyn MatchStore>,
        backend: Arc<dyn MatchBackend>,
        images: Arc<dyn ImageSource>,
        settings: WorkerSettings,
    ) -> Self {
        let ctx = MatchContext {
            store,
            backend,
            images,
            threshold: settings.threshold,
            timeout: settings.timeout,
        };
        Self {
            ctx: Arc::new(ctx),
            settings,
            owner: format!(
                "worker-{}-{}",
                std::process::id(),
                chrono::Utc::now().timestamp_millis()
            ),
        }
    }

    /// Resolves the backend from configuration. Nothing touches the queue
    /// when this fails.
    pub fn from_config(
        store: Arc<dyn MatchStore>,
        images: Arc<dyn ImageSource>,
        cfg: &ProctorConfig,
    ) -> Result<Self, ConfigError> {
        let backend = build_backend(cfg)?;
        Ok(Self::new(store, backend, images, WorkerSettings::from_config(cfg)))
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Claims up to `batch_size` tasks and scores each one. Every claimed
    /// task is attempted; a store failure on one task releases its lease and
    /// is reported as `Err` after the rest of the batch has finished.
    pub async fn process_pending(&self) -> anyhow::Result<BatchSummary> {
        let tasks = self.ctx.store.claim_tasks(
            &self.owner,
            self.settings.batch_size,
            self.settings.lease_seconds,
        )?;

        let mut summary = BatchSummary {
            claimed: tasks.len(),
            ..Default::default()
        };
        if tasks.is_empty() {
            tracing::debug!(event = "proctor.worker.idle", owner = %self.owner);
            return Ok(summary);
        }
        tracing::info!(
            event = "proctor.worker.batch_claimed",
            owner = %self.owner,
            claimed = tasks.len(),
            backend = self.ctx.backend.backend_name()
        );

        let sem = Arc::new(Semaphore::new(self.settings.parallel));
        let mut handles = Vec::new();

        for task in tasks {
            let permit = sem.clone().acquire_owned().await?;
            let ctx = self.ctx.clone();
            let owner = self.owner.clone();
            let lease_seconds = self.settings.lease_seconds;
            let task_id = task.id;
            let h = tokio::spawn(async move {
                let _permit = permit;
                run_task(&ctx, &owner, lease_seconds, task).await
            });
            handles.push((task_id, h));
        }

        let mut first_error: Option<anyhow::Error> = None;
        for (task_id, h) in handles {
            let err = match h.await {
                Ok(Ok(outcome)) => {
                    summary.record(&outcome);
                    continue;
                }
                Ok(Err(e)) => e,
                Err(e) => anyhow::anyhow!("task {} join error: {}", task_id, e),
            };
            summary.failed += 1;
            if first_error.is_none() {
                first_error = Some(err);
            }
        }

        tracing::info!(
            event = "proctor.worker.batch_done",
            owner = %self.owner,
            claimed = summary.claimed,
            matched = summary.matched,
            not_matched = summary.not_matched,
            backend_errors = summary.backend_errors,
            warnings = summary.warnings,
            orphaned = summary.orphaned,
            lost_leases = summary.lost_leases,
            failed = summary.failed
        );

        match first_error {
            Some(e) => Err(e.context(format!(
                "{} of {} claimed task(s) could not be persisted",
                summary.failed, summary.claimed
            ))),
            None => Ok(summary),
        }
    }
}

async fn run_task(
    ctx: &MatchContext,
    owner: &str,
    lease_seconds: i64,
    task: MatchTask,
) -> anyhow::Result<TaskOutcome> {
    let task_id = task.id;
    let reportid = task.reportid;

    // The batch lease may have run out while earlier tasks were processed;
    // only go ahead if this run still owns the task.
    if !ctx.store.renew_lease(task_id, owner, lease_seconds)? {
        tracing::warn!(
            event = "proctor.worker.lease_lost",
            task_id,
            reportid,
            owner,
            "task was claimed by another run; skipping"
        );
        return Ok(TaskOutcome::LeaseLost);
    }

    match score_task(ctx, task).await {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            let detail = format!("{:#}", e);
            tracing::error!(
                event = "proctor.worker.task_failed",
                task_id,
                reportid,
                error = %detail,
                "task left in queue for retry"
            );
            if let Err(release_err) = ctx.store.release_task(task_id, owner) {
                tracing::warn!(
                    event = "proctor.worker.release_failed",
                    task_id,
                    error = %release_err,
                    "lease will expire on its own"
                );
            }
            Err(e)
        }
    }
}

async fn score_task(ctx: &MatchContext, task: MatchTask) -> anyhow::Result<TaskOutcome> {
    let Some(report) = ctx.store.get_report(task.reportid)? else {
        tracing::warn!(
            event = "proctor.worker.orphan_task",
            task_id = task.id,
            reportid = task.reportid,
            "report no longer exists; dropping task"
        );
        ctx.store.complete_task(task.id)?;
        return Ok(TaskOutcome::Orphaned);
    };

    let outcome = ctx
        .score_report(&report, &task.reference_image_uri, &task.target_image_uri)
        .await?;

    if !ctx.store.complete_task(task.id)? {
        tracing::warn!(
            event = "proctor.worker.task_vanished",
            task_id = task.id,
            "task was already removed"
        );
    }

    tracing::info!(
        event = "proctor.worker.task_scored",
        task_id = task.id,
        reportid = report.id,
        similarity = outcome.similarity,
        warned = outcome.warned
    );
    Ok(TaskOutcome::Scored(outcome))
}

/// Operator-visible notice that a run was skipped because the backend
/// could not be built. The queue is left as it was.
pub fn log_misconfigured(cfg: &ProctorConfig, err: &ConfigError) {
    tracing::warn!(
        event = "proctor.worker.misconfigured",
        match_method = %cfg.match_method,
        reason = %err,
        action = "skipped",
        "face-match run skipped: {}",
        err
    );
}

/// Scheduled entry point: builds the worker from config and drains one batch.
/// Returns `Ok(None)` when the configuration cannot produce a backend.
pub async fn run_once(
    store: Arc<dyn MatchStore>,
    images: Arc<dyn ImageSource>,
    cfg: &ProctorConfig,
) -> anyhow::Result<Option<BatchSummary>> {
    let worker = match MatchWorker::from_config(store, images, cfg) {
        Ok(w) => w,
        Err(e) => {
            log_misconfigured(cfg, &e);
            return Ok(None);
        }
    };
    worker.process_pending().await.map(Some)
}
