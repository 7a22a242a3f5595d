//! Persistence contracts for the face-match pipeline and their SQLite
//! implementation.
//!
//! The engine only sees the traits below. Each write is independent: there is
//! no transaction spanning a report, its task, its audit rows and warnings.

pub mod schema;
pub mod store;

pub use store::{Store, StoreStats};

use crate::model::{ActivityKey, MatchFlag, MatchTask, NewReport, Report, ReportFilter};

/// Durable queue of pending face comparisons.
pub trait TaskQueue: Send + Sync {
    /// Adds a task unless one is already live for `reportid`.
    /// Returns the new task id, or `None` for a duplicate.
    fn enqueue(
        &self,
        reportid: i64,
        reference_uri: &str,
        target_uri: &str,
    ) -> anyhow::Result<Option<i64>>;

    /// Leases up to `limit` unclaimed (or lease-expired) tasks to `owner`,
    /// oldest first.
    fn claim_tasks(
        &self,
        owner: &str,
        limit: usize,
        lease_seconds: i64,
    ) -> anyhow::Result<Vec<MatchTask>>;

    fn release_task(&self, task_id: i64, owner: &str) -> anyhow::Result<()>;

    /// Pushes the lease out by `lease_seconds` from now. Returns false when
    /// `owner` no longer holds the task.
    fn renew_lease(&self, task_id: i64, owner: &str, lease_seconds: i64) -> anyhow::Result<bool>;

    /// Deletes a finished task. Returns false if it was already gone.
    fn complete_task(&self, task_id: i64) -> anyhow::Result<bool>;

    fn queued_tasks(&self) -> anyhow::Result<usize>;
}

pub trait ReportStore: Send + Sync {
    fn insert_report(&self, report: &NewReport) -> anyhow::Result<i64>;

    fn get_report(&self, id: i64) -> anyhow::Result<Option<Report>>;

    /// Returns false if no report has that id.
    fn set_score(&self, id: i64, score: i64, flag: MatchFlag) -> anyhow::Result<bool>;

    /// Moves the activity's UNSCORED reports to `flag`; returns rows touched.
    fn mark_unscored(&self, key: ActivityKey, flag: MatchFlag) -> anyhow::Result<usize>;

    fn find_reports(&self, filter: &ReportFilter) -> anyhow::Result<Vec<Report>>;

    fn find_unscored(&self, filter: &ReportFilter) -> anyhow::Result<Vec<Report>> {
        self.find_reports(&filter.clone().with_flag(MatchFlag::Unscored))
    }
}

pub trait WarningLog: Send + Sync {
    fn warning_exists(&self, key: ActivityKey) -> anyhow::Result<bool>;

    /// Records a warning for the activity unless one is already there.
    /// Returns true when a row was written.
    fn insert_warning_if_absent(&self, reportid: i64, key: ActivityKey) -> anyhow::Result<bool>;
}

pub trait AuditLog: Send + Sync {
    fn log_api_call(&self, reportid: i64, raw_response: &str) -> anyhow::Result<i64>;
}

/// Everything the worker needs from the store.
pub trait MatchStore: TaskQueue + ReportStore + WarningLog + AuditLog {}

impl<T: TaskQueue + ReportStore + WarningLog + AuditLog> MatchStore for T {}
