pub mod analyze;
pub mod producer;
pub mod sampling;
pub mod worker;

use crate::images::ImageSource;
use crate::model::{MatchFlag, MatchResult, Report};
use crate::providers::{Comparison, MatchBackend};
use crate::storage::MatchStore;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

/// Collaborators shared by the queue worker and on-demand analysis.
pub struct MatchContext {
    pub store: Arc<dyn MatchStore>,
    pub backend: Arc<dyn MatchBackend>,
    pub images: Arc<dyn ImageSource>,
    pub threshold: u8,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    pub reportid: i64,
    pub result: MatchResult,
    pub similarity: i64,
    /// A new warning row was written (false when deduplicated or matched).
    pub warned: bool,
    pub audited: bool,
}

impl MatchContext {
    /// Fetches both images and runs the backend, bounded by `timeout`.
    /// Never fails: fetch errors and timeouts come back as backend errors.
    pub async fn compare_uris(&self, reference_uri: &str, target_uri: &str) -> Comparison {
        match tokio::time::timeout(self.timeout, self.fetch_and_compare(reference_uri, target_uri))
            .await
        {
            Ok(cmp) => cmp,
            Err(_) => Comparison::error(format!(
                "face match timed out after {}s",
                self.timeout.as_secs()
            )),
        }
    }

    async fn fetch_and_compare(&self, reference_uri: &str, target_uri: &str) -> Comparison {
        let reference = match self.images.fetch(reference_uri).await {
            Ok(b) => b,
            Err(e) => return Comparison::error(format!("reference image: {:#}", e)),
        };
        let target = match self.images.fetch(target_uri).await {
            Ok(b) => b,
            Err(e) => return Comparison::error(format!("target image: {:#}", e)),
        };
        self.backend.compare(&reference, &target, self.threshold).await
    }

    /// Compares, audits, warns and scores one report. Store errors propagate;
    /// everything the backend side can throw has already become a score of 0.
    pub async fn score_report(
        &self,
        report: &Report,
        reference_uri: &str,
        target_uri: &str,
    ) -> anyhow::Result<ScoreOutcome> {
        let cmp = self.compare_uris(reference_uri, target_uri).await;

        let audited = self.backend.audits_raw_response();
        if audited {
            let raw = serde_json::to_string(&cmp.raw)?;
            self.store
                .log_api_call(report.id, &raw)
                .with_context(|| format!("audit log for report {}", report.id))?;
        }

        let similarity = cmp.result.similarity();
        let mut warned = false;
        if cmp.result.needs_warning() {
            warned = self
                .store
                .insert_warning_if_absent(report.id, report.key())
                .with_context(|| format!("warning for report {}", report.id))?;
        }

        let updated = self
            .store
            .set_score(report.id, similarity, MatchFlag::Scored)
            .with_context(|| format!("score for report {}", report.id))?;
        if !updated {
            tracing::warn!(
                event = "proctor.match.report_vanished",
                reportid = report.id,
                "report disappeared before its score was written"
            );
        }

        if let MatchResult::BackendError { detail } = &cmp.result {
            tracing::warn!(
                event = "proctor.match.backend_error",
                reportid = report.id,
                backend = self.backend.backend_name(),
                detail = %detail,
                "face match failed; scored as non-match"
            );
        }

        Ok(ScoreOutcome {
            reportid: report.id,
            result: cmp.result,
            similarity,
            warned,
            audited,
        })
    }
}
