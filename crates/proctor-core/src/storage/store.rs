use super::{AuditLog, ReportStore, TaskQueue, WarningLog};
use crate::model::{
    ActivityKey, ApiCallLog, MatchFlag, MatchTask, NewReport, Report, ReportFilter, Warning,
};
use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub struct Store {
    pub conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StoreStats {
    pub reports: Option<u64>,
    pub unscored: Option<u64>,
    pub pending: Option<u64>,
    pub scored: Option<u64>,
    pub queued_tasks: Option<u64>,
    pub leased_tasks: Option<u64>,
    pub warnings: Option<u64>,
    pub api_calls: Option<u64>,
    pub oldest_task_at: Option<i64>,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path).context("failed to open sqlite db")?;
        // Scheduler runs may overlap; wait on the write lock instead of failing.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("sqlite connection mutex poisoned"))
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(crate::storage::schema::DDL)?;

        // Tables created by older plugin versions lack the lease columns.
        migrate_lease_columns(&conn)?;

        if let Err(e) = conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_match_tasks_report ON match_tasks(reportid)",
            [],
        ) {
            tracing::warn!(
                event = "proctor.store.duplicate_tasks",
                error = %e,
                "match_tasks holds duplicate reportids; relying on enqueue guard"
            );
        }
        Ok(())
    }

    pub fn api_calls_for(&self, reportid: i64) -> anyhow::Result<Vec<ApiCallLog>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, reportid, raw_response, timecreated FROM api_call_log
             WHERE reportid = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![reportid], |row| {
                Ok(ApiCallLog {
                    id: row.get(0)?,
                    reportid: row.get(1)?,
                    raw_response: row.get(2)?,
                    timecreated: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn warnings(&self) -> anyhow::Result<Vec<Warning>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, reportid, courseid, cmid, userid FROM warnings ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Warning {
                    id: row.get(0)?,
                    reportid: row.get(1)?,
                    courseid: row.get(2)?,
                    cmid: row.get(3)?,
                    userid: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn tasks(&self) -> anyhow::Result<Vec<MatchTask>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, reportid, reference_image_uri, target_image_uri, timemodified
             FROM match_tasks ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_rows(&self, table: &str) -> anyhow::Result<i64> {
        let conn = self.lock()?;
        if !["reports", "match_tasks", "api_call_log", "warnings"].contains(&table) {
            anyhow::bail!("Invalid table name for count_rows: {}", table);
        }
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let n: i64 = conn.query_row(&sql, [], |r| r.get(0))?;
        Ok(n)
    }

    pub fn stats_best_effort(&self) -> anyhow::Result<StoreStats> {
        let conn = self.lock()?;
        let count = |sql: &str| -> Option<u64> {
            conn.query_row(sql, [], |r| r.get::<_, i64>(0).map(|x| x as u64))
                .ok()
        };
        let now = now_unix();

        let leased: Option<u64> = conn
            .query_row(
                "SELECT COUNT(*) FROM match_tasks WHERE claimed_by IS NOT NULL AND claim_expires >= ?1",
                params![now],
                |r| r.get::<_, i64>(0).map(|x| x as u64),
            )
            .ok();

        let oldest: Option<i64> = conn
            .query_row("SELECT MIN(timemodified) FROM match_tasks", [], |r| {
                r.get::<_, Option<i64>>(0)
            })
            .ok()
            .flatten();

        Ok(StoreStats {
            reports: count("SELECT COUNT(*) FROM reports"),
            unscored: count("SELECT COUNT(*) FROM reports WHERE match_flag = 0"),
            pending: count("SELECT COUNT(*) FROM reports WHERE match_flag = 1"),
            scored: count("SELECT COUNT(*) FROM reports WHERE match_flag = 2"),
            queued_tasks: count("SELECT COUNT(*) FROM match_tasks"),
            leased_tasks: leased,
            warnings: count("SELECT COUNT(*) FROM warnings"),
            api_calls: count("SELECT COUNT(*) FROM api_call_log"),
            oldest_task_at: oldest,
        })
    }
}

impl TaskQueue for Store {
    fn enqueue(
        &self,
        reportid: i64,
        reference_uri: &str,
        target_uri: &str,
    ) -> anyhow::Result<Option<i64>> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "INSERT OR IGNORE INTO match_tasks(reportid, reference_image_uri, target_image_uri, timemodified)
                 SELECT ?1, ?2, ?3, ?4
                 WHERE NOT EXISTS (SELECT 1 FROM match_tasks WHERE reportid = ?1)",
                params![reportid, reference_uri, target_uri, now_unix()],
            )
            .context("enqueue match task")?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(conn.last_insert_rowid()))
    }

    fn claim_tasks(
        &self,
        owner: &str,
        limit: usize,
        lease_seconds: i64,
    ) -> anyhow::Result<Vec<MatchTask>> {
        let mut conn = self.lock()?;
        let now = now_unix();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let ids: Vec<i64> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM match_tasks
                 WHERE claimed_by IS NULL OR claim_expires IS NULL OR claim_expires < ?1
                 ORDER BY id ASC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![now, limit as i64], |r| r.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
            tx.execute(
                "UPDATE match_tasks SET claimed_by = ?1, claim_expires = ?2 WHERE id = ?3",
                params![owner, now + lease_seconds, id],
            )
            .context("lease match task")?;
            let task = tx.query_row(
                "SELECT id, reportid, reference_image_uri, target_image_uri, timemodified
                 FROM match_tasks WHERE id = ?1",
                params![id],
                task_from_row,
            )?;
            claimed.push(task);
        }
        tx.commit()?;
        Ok(claimed)
    }

    fn release_task(&self, task_id: i64, owner: &str) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE match_tasks SET claimed_by = NULL, claim_expires = NULL
             WHERE id = ?1 AND claimed_by = ?2",
            params![task_id, owner],
        )?;
        Ok(())
    }

    fn renew_lease(&self, task_id: i64, owner: &str, lease_seconds: i64) -> anyhow::Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE match_tasks SET claim_expires = ?1 WHERE id = ?2 AND claimed_by = ?3",
                params![now_unix() + lease_seconds, task_id, owner],
            )
            .context("renew match task lease")?;
        Ok(n == 1)
    }

    fn complete_task(&self, task_id: i64) -> anyhow::Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute("DELETE FROM match_tasks WHERE id = ?1", params![task_id])
            .context("delete match task")?;
        Ok(n > 0)
    }

    fn queued_tasks(&self) -> anyhow::Result<usize> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM match_tasks", [], |r| r.get(0))?;
        Ok(n as usize)
    }
}

impl ReportStore for Store {
    fn insert_report(&self, report: &NewReport) -> anyhow::Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO reports(courseid, cmid, userid, snapshot_reference, match_score, match_flag, timemodified)
             VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6)",
            params![
                report.courseid,
                report.cmid,
                report.userid,
                report.snapshot_reference,
                MatchFlag::Unscored.as_i64(),
                now_unix()
            ],
        )
        .context("insert report")?;
        Ok(conn.last_insert_rowid())
    }

    fn get_report(&self, id: i64) -> anyhow::Result<Option<Report>> {
        let conn = self.lock()?;
        let report = conn
            .query_row(
                "SELECT id, courseid, cmid, userid, snapshot_reference, match_score, match_flag, timemodified
                 FROM reports WHERE id = ?1",
                params![id],
                report_from_row,
            )
            .optional()
            .context("load report")?;
        Ok(report)
    }

    fn set_score(&self, id: i64, score: i64, flag: MatchFlag) -> anyhow::Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE reports SET match_score = ?1, match_flag = ?2, timemodified = ?3 WHERE id = ?4",
                params![score, flag.as_i64(), now_unix(), id],
            )
            .context("update report score")?;
        Ok(n > 0)
    }

    fn mark_unscored(&self, key: ActivityKey, flag: MatchFlag) -> anyhow::Result<usize> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE reports SET match_flag = ?1
                 WHERE courseid = ?2 AND cmid = ?3 AND userid = ?4 AND match_flag = ?5",
                params![
                    flag.as_i64(),
                    key.courseid,
                    key.cmid,
                    key.userid,
                    MatchFlag::Unscored.as_i64()
                ],
            )
            .context("mark reports")?;
        Ok(n)
    }

    fn find_reports(&self, filter: &ReportFilter) -> anyhow::Result<Vec<Report>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, courseid, cmid, userid, snapshot_reference, match_score, match_flag, timemodified
             FROM reports
             WHERE (?1 IS NULL OR courseid = ?1)
               AND (?2 IS NULL OR cmid = ?2)
               AND (?3 IS NULL OR userid = ?3)
               AND (?4 IS NULL OR match_flag = ?4)
             ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(
                params![
                    filter.courseid,
                    filter.cmid,
                    filter.userid,
                    filter.flag.map(MatchFlag::as_i64)
                ],
                report_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl WarningLog for Store {
    fn warning_exists(&self, key: ActivityKey) -> anyhow::Result<bool> {
        let conn = self.lock()?;
        warning_exists_on(&conn, key)
    }

    fn insert_warning_if_absent(&self, reportid: i64, key: ActivityKey) -> anyhow::Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if warning_exists_on(&tx, key)? {
            return Ok(false);
        }
        tx.execute(
            "INSERT INTO warnings(reportid, courseid, cmid, userid) VALUES (?1, ?2, ?3, ?4)",
            params![reportid, key.courseid, key.cmid, key.userid],
        )
        .context("insert warning")?;
        tx.commit()?;
        Ok(true)
    }
}

impl AuditLog for Store {
    fn log_api_call(&self, reportid: i64, raw_response: &str) -> anyhow::Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO api_call_log(reportid, raw_response, timecreated) VALUES (?1, ?2, ?3)",
            params![reportid, raw_response, now_unix()],
        )
        .context("insert api call log")?;
        Ok(conn.last_insert_rowid())
    }
}

fn warning_exists_on(conn: &Connection, key: ActivityKey) -> anyhow::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM warnings WHERE userid = ?1 AND courseid = ?2 AND cmid = ?3 LIMIT 1",
            params![key.userid, key.courseid, key.cmid],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn report_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Report> {
    let flag: i64 = row.get(6)?;
    Ok(Report {
        id: row.get(0)?,
        courseid: row.get(1)?,
        cmid: row.get(2)?,
        userid: row.get(3)?,
        snapshot_reference: row.get(4)?,
        match_score: row.get(5)?,
        match_flag: MatchFlag::from_i64(flag).unwrap_or(MatchFlag::Unscored),
        timemodified: row.get(7)?,
    })
}

fn task_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MatchTask> {
    Ok(MatchTask {
        id: row.get(0)?,
        reportid: row.get(1)?,
        reference_image_uri: row.get(2)?,
        target_image_uri: row.get(3)?,
        timemodified: row.get(4)?,
    })
}

pub(crate) fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

fn migrate_lease_columns(conn: &Connection) -> anyhow::Result<()> {
    let cols = get_columns(conn, "match_tasks")?;
    add_column_if_missing(conn, &cols, "match_tasks", "claimed_by", "TEXT")?;
    add_column_if_missing(conn, &cols, "match_tasks", "claim_expires", "INTEGER")?;
    Ok(())
}

fn get_columns(conn: &Connection, table: &str) -> anyhow::Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut out = HashSet::new();
    for r in rows {
        out.insert(r?);
    }
    Ok(out)
}

fn add_column_if_missing(
    conn: &Connection,
    cols: &HashSet<String>,
    table: &str,
    col: &str,
    ty: &str,
) -> anyhow::Result<()> {
    if !cols.contains(col) {
        let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, col, ty);
        conn.execute(&sql, [])?;
    }
    Ok(())
}
