#![allow(dead_code)]

use async_trait::async_trait;
use proctor_core::images::ImageSource;
use proctor_core::model::{ActivityKey, MatchFlag, MatchTask, NewReport, Report, ReportFilter};
use proctor_core::storage::{AuditLog, ReportStore, Store, TaskQueue, WarningLog};
use std::sync::atomic::{AtomicBool, Ordering};

pub fn store() -> Store {
    let s = Store::memory().unwrap();
    s.init_schema().unwrap();
    s
}

pub fn add_report(s: &Store, courseid: i64, cmid: i64, userid: i64, snapshot: &str) -> i64 {
    s.insert_report(&NewReport {
        courseid,
        cmid,
        userid,
        snapshot_reference: snapshot.into(),
    })
    .unwrap()
}

/// Inserts a report and queues a task for it.
pub fn queued_report(s: &Store, userid: i64) -> i64 {
    let id = add_report(s, 10, 20, userid, &format!("snap-{}.png", userid));
    s.enqueue(id, &format!("ref-{}.png", userid), &format!("snap-{}.png", userid))
        .unwrap()
        .unwrap();
    id
}

/// Serves fixed bytes; any URI containing "missing" fails.
pub struct StubImages;

#[async_trait]
impl ImageSource for StubImages {
    async fn fetch(&self, uri: &str) -> anyhow::Result<Vec<u8>> {
        if uri.contains("missing") {
            anyhow::bail!("no such image: {}", uri);
        }
        Ok(uri.as_bytes().to_vec())
    }
}

/// Delegates to a real store but fails score writes while `broken` is set.
pub struct FlakyStore {
    pub inner: Store,
    pub broken: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Store) -> Self {
        Self {
            inner,
            broken: AtomicBool::new(true),
        }
    }
}

impl TaskQueue for FlakyStore {
    fn enqueue(&self, reportid: i64, reference_uri: &str, target_uri: &str) -> anyhow::Result<Option<i64>> {
        self.inner.enqueue(reportid, reference_uri, target_uri)
    }
    fn claim_tasks(&self, owner: &str, limit: usize, lease_seconds: i64) -> anyhow::Result<Vec<MatchTask>> {
        self.inner.claim_tasks(owner, limit, lease_seconds)
    }
    fn release_task(&self, task_id: i64, owner: &str) -> anyhow::Result<()> {
        self.inner.release_task(task_id, owner)
    }
    fn renew_lease(&self, task_id: i64, owner: &str, lease_seconds: i64) -> anyhow::Result<bool> {
        self.inner.renew_lease(task_id, owner, lease_seconds)
    }
    fn complete_task(&self, task_id: i64) -> anyhow::Result<bool> {
        self.inner.complete_task(task_id)
    }
    fn queued_tasks(&self) -> anyhow::Result<usize> {
        self.inner.queued_tasks()
    }
}

impl ReportStore for FlakyStore {
    fn insert_report(&self, report: &NewReport) -> anyhow::Result<i64> {
        self.inner.insert_report(report)
    }
    fn get_report(&self, id: i64) -> anyhow::Result<Option<Report>> {
        self.inner.get_report(id)
    }
    fn set_score(&self, id: i64, score: i64, flag: MatchFlag) -> anyhow::Result<bool> {
        if self.broken.load(Ordering::SeqCst) {
            anyhow::bail!("database is locked");
        }
        self.inner.set_score(id, score, flag)
    }
    fn mark_unscored(&self, key: ActivityKey, flag: MatchFlag) -> anyhow::Result<usize> {
        self.inner.mark_unscored(key, flag)
    }
    fn find_reports(&self, filter: &ReportFilter) -> anyhow::Result<Vec<Report>> {
        self.inner.find_reports(filter)
    }
}

impl WarningLog for FlakyStore {
    fn warning_exists(&self, key: ActivityKey) -> anyhow::Result<bool> {
        self.inner.warning_exists(key)
    }
    fn insert_warning_if_absent(&self, reportid: i64, key: ActivityKey) -> anyhow::Result<bool> {
        self.inner.insert_warning_if_absent(reportid, key)
    }
}

impl AuditLog for FlakyStore {
    fn log_api_call(&self, reportid: i64, raw_response: &str) -> anyhow::Result<i64> {
        self.inner.log_api_call(reportid, raw_response)
    }
}
