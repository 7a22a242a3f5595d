use serde::{Deserialize, Serialize};

/// Face-match state of a proctoring report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchFlag {
    Unscored = 0,
    Pending = 1,
    Scored = 2,
}

impl MatchFlag {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(MatchFlag::Unscored),
            1 => Some(MatchFlag::Pending),
            2 => Some(MatchFlag::Scored),
            _ => None,
        }
    }
}

/// One proctoring snapshot event for a user in a quiz activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub courseid: i64,
    pub cmid: i64,
    pub userid: i64,
    pub snapshot_reference: String,
    pub match_score: Option<i64>,
    pub match_flag: MatchFlag,
    pub timemodified: i64,
}

impl Report {
    pub fn key(&self) -> ActivityKey {
        ActivityKey {
            courseid: self.courseid,
            cmid: self.cmid,
            userid: self.userid,
        }
    }

    pub fn has_snapshot(&self) -> bool {
        !self.snapshot_reference.trim().is_empty()
    }
}

/// Fields the capture subsystem supplies when it records a snapshot.
#[derive(Debug, Clone, Default)]
pub struct NewReport {
    pub courseid: i64,
    pub cmid: i64,
    pub userid: i64,
    pub snapshot_reference: String,
}

/// A (course, activity, student) triple. Warnings and sampling are keyed on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivityKey {
    pub courseid: i64,
    pub cmid: i64,
    pub userid: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchTask {
    pub id: i64,
    pub reportid: i64,
    pub reference_image_uri: String,
    pub target_image_uri: String,
    pub timemodified: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCallLog {
    pub id: i64,
    pub reportid: i64,
    pub raw_response: String,
    pub timecreated: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub id: i64,
    pub reportid: i64,
    pub courseid: i64,
    pub cmid: i64,
    pub userid: i64,
}

/// Optional narrowing for report scans. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportFilter {
    pub courseid: Option<i64>,
    pub cmid: Option<i64>,
    pub userid: Option<i64>,
    pub flag: Option<MatchFlag>,
}

impl ReportFilter {
    pub fn for_activity(key: ActivityKey) -> Self {
        Self {
            courseid: Some(key.courseid),
            cmid: Some(key.cmid),
            userid: Some(key.userid),
            flag: None,
        }
    }

    pub fn with_flag(mut self, flag: MatchFlag) -> Self {
        self.flag = Some(flag);
        self
    }
}

/// Outcome of one face comparison as seen by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum MatchResult {
    Matched { similarity: u8 },
    NotMatched,
    BackendError { detail: String },
}

impl MatchResult {
    /// Similarity to persist. Anything short of a match scores 0.
    pub fn similarity(&self) -> i64 {
        match self {
            MatchResult::Matched { similarity } => i64::from(*similarity),
            MatchResult::NotMatched | MatchResult::BackendError { .. } => 0,
        }
    }

    pub fn needs_warning(&self) -> bool {
        !matches!(self, MatchResult::Matched { .. })
    }
}

/// Truncates a backend similarity to an integer percentage in 0..=100.
pub fn to_percentage(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.clamp(0.0, 100.0).trunc() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_roundtrips_through_integer_column() {
        for flag in [MatchFlag::Unscored, MatchFlag::Pending, MatchFlag::Scored] {
            assert_eq!(MatchFlag::from_i64(flag.as_i64()), Some(flag));
        }
        assert_eq!(MatchFlag::from_i64(7), None);
    }

    #[test]
    fn percentage_truncates_and_clamps() {
        assert_eq!(to_percentage(87.9), 87);
        assert_eq!(to_percentage(99.999), 99);
        assert_eq!(to_percentage(140.0), 100);
        assert_eq!(to_percentage(-3.0), 0);
        assert_eq!(to_percentage(f64::NAN), 0);
    }

    #[test]
    fn only_matches_skip_the_warning() {
        assert!(!MatchResult::Matched { similarity: 0 }.needs_warning());
        assert!(MatchResult::NotMatched.needs_warning());
        assert!(MatchResult::BackendError {
            detail: "timeout".into()
        }
        .needs_warning());
        assert_eq!(
            MatchResult::BackendError {
                detail: "x".into()
            }
            .similarity(),
            0
        );
    }
}
