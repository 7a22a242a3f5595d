mod common;

use common::{add_report, store, StubImages};
use proctor_core::config::SamplingPolicy;
use proctor_core::engine::analyze::Analyzer;
use proctor_core::engine::worker::WorkerSettings;
use proctor_core::images::ReferenceImages;
use proctor_core::model::{ActivityKey, MatchFlag, MatchResult};
use proctor_core::providers::fake::FakeBackend;
use proctor_core::storage::{ReportStore, Store, TaskQueue, WarningLog};
use std::sync::Arc;

fn analyzer(s: &Store, backend: Arc<FakeBackend>) -> Analyzer {
    Analyzer::new(
        Arc::new(s.clone()),
        backend,
        Arc::new(StubImages),
        ReferenceImages::new("ref-{userid}.png"),
        &WorkerSettings::default(),
    )
}

#[tokio::test]
async fn single_report_is_scored_in_place() -> anyhow::Result<()> {
    let s = store();
    let id = add_report(&s, 10, 20, 4, "snap.png");
    let backend = Arc::new(FakeBackend::always(MatchResult::NotMatched).auditing());

    let outcome = analyzer(&s, backend).analyze_report(id).await?;
    assert_eq!(outcome.similarity, 0);
    assert!(outcome.warned);
    assert!(outcome.audited);

    let report = s.get_report(id)?.unwrap();
    assert_eq!(report.match_flag, MatchFlag::Scored);
    assert!(s.warning_exists(report.key())?);
    assert_eq!(s.api_calls_for(id)?.len(), 1);
    assert_eq!(s.queued_tasks()?, 0);
    Ok(())
}

#[tokio::test]
async fn missing_or_empty_reports_are_rejected() -> anyhow::Result<()> {
    let s = store();
    let blank = add_report(&s, 10, 20, 4, "");
    let backend = Arc::new(FakeBackend::always(MatchResult::NotMatched));
    let a = analyzer(&s, backend.clone());

    assert!(a.analyze_report(9999).await.is_err());
    assert!(a.analyze_report(blank).await.is_err());
    assert_eq!(backend.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn activity_analysis_samples_scored_reports_too() -> anyhow::Result<()> {
    let s = store();
    let key = ActivityKey {
        courseid: 10,
        cmid: 20,
        userid: 6,
    };
    for i in 0..4 {
        let id = add_report(&s, 10, 20, 6, &format!("snap-{}.png", i));
        if i == 0 {
            s.set_score(id, 75, MatchFlag::Scored)?;
        }
    }
    add_report(&s, 10, 21, 6, "elsewhere.png");

    let backend = Arc::new(FakeBackend::always(MatchResult::Matched { similarity: 97 }));
    let outcomes = analyzer(&s, backend.clone())
        .with_sampling(SamplingPolicy::Random(3), Some(5))
        .analyze_activity(key)
        .await?;
    assert_eq!(outcomes.len(), 3);
    assert_eq!(backend.calls(), 3);
    assert!(outcomes.iter().all(|o| o.similarity == 97));
    Ok(())
}

#[tokio::test]
async fn activity_analysis_marks_unsampled_reports_attempted() -> anyhow::Result<()> {
    let s = store();
    let key = ActivityKey {
        courseid: 10,
        cmid: 20,
        userid: 8,
    };
    let ids: Vec<i64> = (0..4)
        .map(|i| add_report(&s, 10, 20, 8, &format!("snap-{}.png", i)))
        .collect();
    let other_activity = add_report(&s, 10, 22, 8, "snap.png");

    let backend = Arc::new(FakeBackend::always(MatchResult::Matched { similarity: 90 }));
    analyzer(&s, backend)
        .with_sampling(SamplingPolicy::Random(2), Some(9))
        .analyze_activity(key)
        .await?;

    let flags: Vec<MatchFlag> = ids
        .iter()
        .map(|id| s.get_report(*id).unwrap().unwrap().match_flag)
        .collect();
    assert_eq!(flags.iter().filter(|f| **f == MatchFlag::Scored).count(), 2);
    assert_eq!(flags.iter().filter(|f| **f == MatchFlag::Pending).count(), 2);
    assert_eq!(
        s.get_report(other_activity)?.unwrap().match_flag,
        MatchFlag::Unscored
    );
    Ok(())
}
