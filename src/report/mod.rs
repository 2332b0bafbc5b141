//! Consumer-facing tables built from the KPI engine's output.

pub mod at_risk;

use std::fmt;

use serde::Serialize;

use crate::error::Result;
use crate::kpi::{self, level, CompositeOptions, CompositeRow, Level};
use crate::storage::Database;

pub use at_risk::{AtRiskQuery, AtRiskStudent};

/// Qualitative band for a performance index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PerformanceBand {
    Excellent,
    Good,
    Average,
    NeedsImprovement,
}

impl PerformanceBand {
    pub fn from_index(index: f64) -> Self {
        if index >= 80.0 {
            PerformanceBand::Excellent
        } else if index >= 70.0 {
            PerformanceBand::Good
        } else if index >= 60.0 {
            PerformanceBand::Average
        } else {
            PerformanceBand::NeedsImprovement
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PerformanceBand::Excellent => "Excellent",
            PerformanceBand::Good => "Good",
            PerformanceBand::Average => "Average",
            PerformanceBand::NeedsImprovement => "Needs Improvement",
        }
    }
}

impl fmt::Display for PerformanceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One node of a level report. Metrics are display values: missing ones
/// read 0 and everything is rounded to two decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub node_id: i64,
    pub node_name: String,
    pub parent_name: Option<String>,
    pub performance_index: f64,
    pub band: PerformanceBand,
    pub student_attendance: f64,
    pub pass_rate: f64,
    pub sports_participation: f64,
    pub activity_engagement: f64,
    pub teacher_attendance: f64,
    pub inspection_score: f64,
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn display(v: Option<f64>) -> f64 {
    round2(v.unwrap_or(0.0))
}

impl ReportRow {
    fn from_composite(row: CompositeRow, parent_name: Option<String>) -> Self {
        let m = row.metrics;
        Self {
            node_id: row.node_id,
            node_name: row.node_name,
            parent_name,
            performance_index: round2(row.performance_index),
            band: PerformanceBand::from_index(row.performance_index),
            student_attendance: display(m.attendance_percentage),
            pass_rate: display(m.pass_percentage),
            sports_participation: display(m.sports_participation_rate),
            activity_engagement: display(m.activity_engagement_rate),
            teacher_attendance: display(m.teacher_attendance_percentage),
            inspection_score: display(m.avg_inspection_score),
        }
    }
}

/// Every node of `level` with its parent, metrics, index and band, best first.
pub async fn level_report(
    db: &Database,
    level: Level,
    opts: &CompositeOptions,
) -> Result<Vec<ReportRow>> {
    let opts = *opts;
    let (mut rows, parents) = kpi::run_pass(db, opts.validate_domains, move |conn| {
        let rows = kpi::composite::composite_rows(conn, level, &opts)?;
        let parents = level::parent_names(conn, level)?;
        Ok((rows, parents))
    })
    .await?;

    rows.sort_by(|a, b| {
        b.performance_index
            .total_cmp(&a.performance_index)
            .then(a.node_id.cmp(&b.node_id))
    });

    Ok(rows
        .into_iter()
        .map(|row| {
            let parent = parents.get(&row.node_id).cloned();
            ReportRow::from_composite(row, parent)
        })
        .collect())
}

pub fn report_to_csv(rows: &[ReportRow]) -> String {
    let mut out = String::new();
    out.push_str("node_id,node_name,parent_name,performance_index,band,student_attendance,pass_rate,sports_participation,activity_engagement,teacher_attendance,inspection_score\n");
    for row in rows {
        out.push_str(&format!(
            "{},{},{},{:.2},{},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2}\n",
            row.node_id,
            csv_escape(&row.node_name),
            csv_escape(row.parent_name.as_deref().unwrap_or("")),
            row.performance_index,
            csv_escape(row.band.label()),
            row.student_attendance,
            row.pass_rate,
            row.sports_participation,
            row.activity_engagement,
            row.teacher_attendance,
            row.inspection_score,
        ));
    }
    out
}

pub fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
