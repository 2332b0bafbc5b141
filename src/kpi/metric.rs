use std::fmt;
use std::str::FromStr;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::level::Level;
use super::types::MetricRow;
use crate::error::Error;

/// The six per-node KPIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    StudentAttendance,
    ExamPass,
    SportsParticipation,
    ActivityEngagement,
    TeacherAttendance,
    Inspection,
}

impl MetricKind {
    pub const ALL: [MetricKind; 6] = [
        MetricKind::StudentAttendance,
        MetricKind::ExamPass,
        MetricKind::SportsParticipation,
        MetricKind::ActivityEngagement,
        MetricKind::TeacherAttendance,
        MetricKind::Inspection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::StudentAttendance => "student_attendance",
            MetricKind::ExamPass => "exam_pass",
            MetricKind::SportsParticipation => "sports_participation",
            MetricKind::ActivityEngagement => "activity_engagement",
            MetricKind::TeacherAttendance => "teacher_attendance",
            MetricKind::Inspection => "inspection",
        }
    }

    /// Output column name, shared with the SQL views.
    pub fn column(&self) -> &'static str {
        match self {
            MetricKind::StudentAttendance => "attendance_percentage",
            MetricKind::ExamPass => "pass_percentage",
            MetricKind::SportsParticipation => "sports_participation_rate",
            MetricKind::ActivityEngagement => "activity_engagement_rate",
            MetricKind::TeacherAttendance => "teacher_attendance_percentage",
            MetricKind::Inspection => "avg_inspection_score",
        }
    }

    /// Upper bound of the value domain. Ratios are percentages, inspection is 0-10.
    pub fn max_value(&self) -> f64 {
        match self {
            MetricKind::Inspection => 10.0,
            _ => 100.0,
        }
    }

    fn sql(&self, level: Level) -> String {
        let node = level.node_columns();
        let chain = level.join_chain();
        match self {
            MetricKind::StudentAttendance => format!(
                "SELECT {node},
                        COUNT(CASE WHEN sa.status = 'Present' THEN 1 END),
                        COUNT(sa.attendance_id)
                 FROM student_attendance sa
                 JOIN student st ON st.student_id = sa.student_id
                 JOIN school sc ON sc.school_id = st.school_id
                 {chain}
                 GROUP BY {node}"
            ),
            MetricKind::ExamPass => format!(
                "SELECT {node},
                        COUNT(CASE WHEN er.pass_status = 1 THEN 1 END),
                        COUNT(er.result_id)
                 FROM exam_result er
                 JOIN student st ON st.student_id = er.student_id
                 JOIN school sc ON sc.school_id = st.school_id
                 {chain}
                 GROUP BY {node}"
            ),
            MetricKind::SportsParticipation => format!(
                "SELECT {node},
                        COUNT(DISTINCT sp.student_id),
                        COUNT(DISTINCT st.student_id)
                 FROM student st
                 JOIN school sc ON sc.school_id = st.school_id
                 {chain}
                 LEFT JOIN sports_participation sp ON sp.student_id = st.student_id
                 GROUP BY {node}"
            ),
            MetricKind::ActivityEngagement => format!(
                "SELECT {node},
                        COUNT(DISTINCT ap.student_id),
                        COUNT(DISTINCT st.student_id)
                 FROM student st
                 JOIN school sc ON sc.school_id = st.school_id
                 {chain}
                 LEFT JOIN activity_participation ap ON ap.student_id = st.student_id
                 GROUP BY {node}"
            ),
            MetricKind::TeacherAttendance => format!(
                "SELECT {node},
                        COUNT(CASE WHEN ta.status = 'Present' THEN 1 END),
                        COUNT(ta.attendance_id)
                 FROM teacher_attendance ta
                 JOIN teacher t ON t.teacher_id = ta.teacher_id
                 JOIN school sc ON sc.school_id = t.school_id
                 {chain}
                 GROUP BY {node}"
            ),
            MetricKind::Inspection => format!(
                "SELECT {node},
                        SUM(i.overall_score),
                        COUNT(i.inspection_id)
                 FROM inspection i
                 JOIN school sc ON sc.school_id = i.school_id
                 {chain}
                 GROUP BY {node}"
            ),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        MetricKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized || k.column() == normalized)
            .ok_or_else(|| Error::InvalidMetric(s.to_string()))
    }
}

/// `positive / eligible × 100`, or `None` when nothing was eligible.
pub fn percentage(positive: u64, eligible: u64) -> Option<f64> {
    if eligible == 0 {
        return None;
    }
    Some(positive as f64 * 100.0 / eligible as f64)
}

/// Arithmetic mean, or `None` over an empty set.
pub fn mean(sum: f64, count: u64) -> Option<f64> {
    if count == 0 {
        return None;
    }
    Some(sum / count as f64)
}

/// One metric for every node of `level` that has a join path from the
/// metric's fact table. Nodes without facts are absent, ordered by node id.
pub fn metric_rows(
    conn: &Connection,
    level: Level,
    kind: MetricKind,
) -> Result<Vec<MetricRow>, rusqlite::Error> {
    let sql = format!("{} ORDER BY 1", kind.sql(level));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        let node_id: i64 = row.get(0)?;
        let node_name: String = row.get(1)?;
        let eligible = row.get::<_, i64>(3)?.max(0) as u64;
        let value = match kind {
            MetricKind::Inspection => {
                let sum: Option<f64> = row.get(2)?;
                mean(sum.unwrap_or(0.0), eligible)
            }
            _ => percentage(row.get::<_, i64>(2)?.max(0) as u64, eligible),
        };
        Ok(MetricRow {
            node_id,
            node_name,
            value,
            observations: eligible,
        })
    })?;
    let rows = rows.collect::<Result<Vec<_>, _>>()?;
    log::debug!("{kind} at {level} level: {} node(s)", rows.len());
    Ok(rows)
}
