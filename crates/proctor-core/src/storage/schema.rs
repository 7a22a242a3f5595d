pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS reports (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  courseid INTEGER NOT NULL,
  cmid INTEGER NOT NULL,
  userid INTEGER NOT NULL,
  snapshot_reference TEXT NOT NULL DEFAULT '',
  match_score INTEGER,
  match_flag INTEGER NOT NULL DEFAULT 0,
  timemodified INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reports_flag ON reports(match_flag);
CREATE INDEX IF NOT EXISTS idx_reports_activity ON reports(courseid, cmid, userid);

CREATE TABLE IF NOT EXISTS match_tasks (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  reportid INTEGER NOT NULL,
  reference_image_uri TEXT NOT NULL,
  target_image_uri TEXT NOT NULL,
  timemodified INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS api_call_log (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  reportid INTEGER NOT NULL,
  raw_response TEXT NOT NULL,
  timecreated INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS warnings (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  reportid INTEGER NOT NULL,
  courseid INTEGER NOT NULL,
  cmid INTEGER NOT NULL,
  userid INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_warnings_activity ON warnings(userid, courseid, cmid);
"#;
