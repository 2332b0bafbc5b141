use serde::Serialize;

use super::level::Level;
use super::metric::MetricKind;

/// One metric value for one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    pub node_id: i64,
    pub node_name: String,
    /// `None` when the node had nothing eligible; never coerced to 0 here.
    pub value: Option<f64>,
    /// Size of the denominator: eligible facts, students, or inspections.
    pub observations: u64,
}

/// All rows of one metric at one level.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSeries {
    pub level: Level,
    pub metric: MetricKind,
    pub rows: Vec<MetricRow>,
}

/// The six metrics of one node, before any missing-data policy applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricSet {
    pub attendance_percentage: Option<f64>,
    pub pass_percentage: Option<f64>,
    pub sports_participation_rate: Option<f64>,
    pub activity_engagement_rate: Option<f64>,
    pub teacher_attendance_percentage: Option<f64>,
    pub avg_inspection_score: Option<f64>,
}

impl MetricSet {
    pub fn get(&self, kind: MetricKind) -> Option<f64> {
        match kind {
            MetricKind::StudentAttendance => self.attendance_percentage,
            MetricKind::ExamPass => self.pass_percentage,
            MetricKind::SportsParticipation => self.sports_participation_rate,
            MetricKind::ActivityEngagement => self.activity_engagement_rate,
            MetricKind::TeacherAttendance => self.teacher_attendance_percentage,
            MetricKind::Inspection => self.avg_inspection_score,
        }
    }

    pub fn set(&mut self, kind: MetricKind, value: Option<f64>) {
        let slot = match kind {
            MetricKind::StudentAttendance => &mut self.attendance_percentage,
            MetricKind::ExamPass => &mut self.pass_percentage,
            MetricKind::SportsParticipation => &mut self.sports_participation_rate,
            MetricKind::ActivityEngagement => &mut self.activity_engagement_rate,
            MetricKind::TeacherAttendance => &mut self.teacher_attendance_percentage,
            MetricKind::Inspection => &mut self.avg_inspection_score,
        };
        *slot = value;
    }

    pub fn missing(&self) -> Vec<MetricKind> {
        MetricKind::ALL
            .into_iter()
            .filter(|k| self.get(*k).is_none())
            .collect()
    }
}

/// Composite output for one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeRow {
    pub node_id: i64,
    pub node_name: String,
    /// Raw metric values; `None` entries were filled by the missing-data policy.
    pub metrics: MetricSet,
    pub performance_index: f64,
}
