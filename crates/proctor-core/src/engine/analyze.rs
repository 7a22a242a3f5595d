use super::sampling::{rng_for, sample};
use super::worker::WorkerSettings;
use super::{MatchContext, ScoreOutcome};
use crate::config::{ProctorConfig, SamplingPolicy};
use crate::errors::ConfigError;
use crate::images::{ImageSource, ReferenceImages};
use crate::model::{ActivityKey, MatchFlag, Report, ReportFilter};
use crate::providers::{build_backend, MatchBackend};
use crate::storage::MatchStore;
use anyhow::Context;
use std::sync::Arc;

/// Scores reports directly, without going through the task queue.
pub struct Analyzer {
    ctx: MatchContext,
    references: ReferenceImages,
    policy: SamplingPolicy,
    seed: Option<u64>,
}

impl Analyzer {
    pub fn new(
        store: Arc<dyn MatchStore>,
        backend: Arc<dyn MatchBackend>,
        images: Arc<dyn ImageSource>,
        references: ReferenceImages,
        settings: &WorkerSettings,
    ) -> Self {
        Self {
            ctx: MatchContext {
                store,
                backend,
                images,
                threshold: settings.threshold,
                timeout: settings.timeout,
            },
            references,
            policy: SamplingPolicy::All,
            seed: None,
        }
    }

    pub fn with_sampling(mut self, policy: SamplingPolicy, seed: Option<u64>) -> Self {
        self.policy = policy;
        self.seed = seed;
        self
    }

    pub fn from_config(
        store: Arc<dyn MatchStore>,
        images: Arc<dyn ImageSource>,
        cfg: &ProctorConfig,
    ) -> Result<Self, ConfigError> {
        let template = cfg
            .reference_image_template
            .as_deref()
            .ok_or_else(|| ConfigError("reference_image_template is required to analyze".into()))?;
        let backend = build_backend(cfg)?;
        Ok(Self::new(
            store,
            backend,
            images,
            ReferenceImages::new(template),
            &WorkerSettings::from_config(cfg),
        )
        .with_sampling(cfg.sampling_policy(), cfg.sampling_seed))
    }

    pub async fn analyze_report(&self, reportid: i64) -> anyhow::Result<ScoreOutcome> {
        let report = self
            .ctx
            .store
            .get_report(reportid)?
            .with_context(|| format!("report {} not found", reportid))?;
        if !report.has_snapshot() {
            anyhow::bail!("report {} has no snapshot to compare", reportid);
        }
        self.analyze(&report).await
    }

    /// Samples the student's snapshots for one activity and scores each,
    /// whatever their current flag. The activity's remaining unscored reports
    /// are marked PENDING so a later enqueue does not pick them up.
    pub async fn analyze_activity(&self, key: ActivityKey) -> anyhow::Result<Vec<ScoreOutcome>> {
        let candidates: Vec<Report> = self
            .ctx
            .store
            .find_reports(&ReportFilter::for_activity(key))?
            .into_iter()
            .filter(Report::has_snapshot)
            .collect();
        let picked = sample(candidates, self.policy, &mut rng_for(self.seed));
        let marked = self.ctx.store.mark_unscored(key, MatchFlag::Pending)?;

        let mut outcomes = Vec::with_capacity(picked.len());
        for report in &picked {
            outcomes.push(self.analyze(report).await?);
        }
        tracing::info!(
            event = "proctor.analyze.activity_done",
            courseid = key.courseid,
            cmid = key.cmid,
            userid = key.userid,
            analyzed = outcomes.len(),
            marked
        );
        Ok(outcomes)
    }

    async fn analyze(&self, report: &Report) -> anyhow::Result<ScoreOutcome> {
        let reference = self.references.for_user(report.userid);
        let outcome = self
            .ctx
            .score_report(report, &reference, &report.snapshot_reference)
            .await?;
        tracing::info!(
            event = "proctor.analyze.report_scored",
            reportid = report.id,
            similarity = outcome.similarity,
            warned = outcome.warned
        );
        Ok(outcome)
    }
}
