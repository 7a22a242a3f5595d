use super::sampling::{rng_for, sample};
use crate::config::{ProctorConfig, SamplingPolicy};
use crate::errors::ConfigError;
use crate::images::ReferenceImages;
use crate::model::{ActivityKey, MatchFlag, Report, ReportFilter};
use crate::storage::MatchStore;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ProducerSummary {
    pub groups: usize,
    pub enqueued: usize,
    pub duplicates: usize,
    pub sampled_out: usize,
    pub marked_pending: usize,
}

/// Turns unscored reports into match tasks, sampling per student and activity.
pub struct TaskProducer {
    store: Arc<dyn MatchStore>,
    references: ReferenceImages,
    policy: SamplingPolicy,
    seed: Option<u64>,
}

impl TaskProducer {
    pub fn new(
        store: Arc<dyn MatchStore>,
        references: ReferenceImages,
        policy: SamplingPolicy,
        seed: Option<u64>,
    ) -> Self {
        Self {
            store,
            references,
            policy,
            seed,
        }
    }

    pub fn from_config(store: Arc<dyn MatchStore>, cfg: &ProctorConfig) -> Result<Self, ConfigError> {
        let template = cfg
            .reference_image_template
            .as_deref()
            .ok_or_else(|| ConfigError("reference_image_template is required to enqueue".into()))?;
        Ok(Self::new(
            store,
            ReferenceImages::new(template),
            cfg.sampling_policy(),
            cfg.sampling_seed,
        ))
    }

    /// Tasks are written before the group flips to PENDING, so a crash in
    /// between leaves a queued task and never a PENDING report without one.
    pub fn enqueue_unscored(&self, filter: &ReportFilter) -> anyhow::Result<ProducerSummary> {
        let mut groups: BTreeMap<ActivityKey, Vec<Report>> = BTreeMap::new();
        for report in self.store.find_unscored(filter)? {
            groups.entry(report.key()).or_default().push(report);
        }

        let mut rng = rng_for(self.seed);
        let mut summary = ProducerSummary {
            groups: groups.len(),
            ..Default::default()
        };

        for (key, reports) in groups {
            let candidates: Vec<Report> = reports.into_iter().filter(Report::has_snapshot).collect();
            let available = candidates.len();
            let picked = sample(candidates, self.policy, &mut rng);
            summary.sampled_out += available - picked.len();

            let reference = self.references.for_user(key.userid);
            for report in &picked {
                match self
                    .store
                    .enqueue(report.id, &reference, &report.snapshot_reference)?
                {
                    Some(_) => summary.enqueued += 1,
                    None => summary.duplicates += 1,
                }
            }

            let marked = self.store.mark_unscored(key, MatchFlag::Pending)?;
            summary.marked_pending += marked;
            tracing::debug!(
                event = "proctor.producer.group_enqueued",
                courseid = key.courseid,
                cmid = key.cmid,
                userid = key.userid,
                sampled = picked.len(),
                marked
            );
        }

        tracing::info!(
            event = "proctor.producer.done",
            groups = summary.groups,
            enqueued = summary.enqueued,
            duplicates = summary.duplicates,
            sampled_out = summary.sampled_out
        );
        Ok(summary)
    }
}
