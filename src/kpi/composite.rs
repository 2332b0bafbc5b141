use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rusqlite::Connection;
use serde::Serialize;

use super::level::{node_universe, Level};
use super::metric::{metric_rows, MetricKind};
use super::types::{CompositeRow, MetricSet};
use crate::error::Error;

/// Composite weights in basis points, in summation order. They sum to
/// exactly 10_000.
pub const WEIGHTS_BP: [(MetricKind, u32); 6] = [
    (MetricKind::ExamPass, 3000),
    (MetricKind::StudentAttendance, 2000),
    (MetricKind::SportsParticipation, 1500),
    (MetricKind::ActivityEngagement, 1500),
    (MetricKind::TeacherAttendance, 1000),
    (MetricKind::Inspection, 1000),
];

/// Inspection scores are 0-10; everything else is already a percentage.
pub const INSPECTION_SCALE: f64 = 10.0;

pub fn weight(kind: MetricKind) -> f64 {
    WEIGHTS_BP
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, bp)| *bp as f64 / 10_000.0)
        .unwrap_or(0.0)
}

/// Which nodes get a composite row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorPolicy {
    /// Every node of the level, from the hierarchy table.
    #[default]
    Universe,
    /// Only nodes with student attendance facts. Nodes without attendance
    /// drop out of the composite entirely.
    Attendance,
}

impl AnchorPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorPolicy::Universe => "universe",
            AnchorPolicy::Attendance => "attendance",
        }
    }
}

impl fmt::Display for AnchorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnchorPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "universe" => Ok(AnchorPolicy::Universe),
            "attendance" => Ok(AnchorPolicy::Attendance),
            other => Err(Error::Config(format!(
                "unknown anchor policy: {other} (expected universe or attendance)"
            ))),
        }
    }
}

/// What a missing metric means to the composite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingDataPolicy {
    /// A missing metric contributes 0.
    #[default]
    #[serde(rename = "zero")]
    ZeroFill,
    /// A node missing any metric gets no composite row.
    #[serde(rename = "exclude")]
    ExcludeNode,
}

impl MissingDataPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissingDataPolicy::ZeroFill => "zero",
            MissingDataPolicy::ExcludeNode => "exclude",
        }
    }

    /// The value a metric contributes, or `None` if the node must be dropped.
    pub fn resolve(&self, value: Option<f64>) -> Option<f64> {
        match self {
            MissingDataPolicy::ZeroFill => Some(value.unwrap_or(0.0)),
            MissingDataPolicy::ExcludeNode => value,
        }
    }
}

impl fmt::Display for MissingDataPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MissingDataPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zero" | "zero-fill" | "zero_fill" => Ok(MissingDataPolicy::ZeroFill),
            "exclude" | "exclude-node" | "exclude_node" => Ok(MissingDataPolicy::ExcludeNode),
            other => Err(Error::Config(format!(
                "unknown missing-data policy: {other} (expected zero or exclude)"
            ))),
        }
    }
}

/// Knobs for one composite pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompositeOptions {
    pub anchor: AnchorPolicy,
    pub missing_data: MissingDataPolicy,
    /// Fail the pass on out-of-domain inputs instead of letting them
    /// propagate arithmetically.
    pub validate_domains: bool,
}

impl CompositeOptions {
    pub const ANCHOR_KEY: &'static str = "kpi_anchor";
    pub const MISSING_DATA_KEY: &'static str = "kpi_missing_data";

    /// Build options from stored config values, falling back to defaults.
    pub fn from_config(anchor: Option<&str>, missing_data: Option<&str>) -> Result<Self, Error> {
        let mut opts = Self::default();
        if let Some(a) = anchor {
            opts.anchor = a.parse()?;
        }
        if let Some(m) = missing_data {
            opts.missing_data = m.parse()?;
        }
        Ok(opts)
    }
}

/// Weighted sum over a node's metrics, or `None` when the policy drops it.
pub fn performance_index(metrics: &MetricSet, policy: MissingDataPolicy) -> Option<f64> {
    let mut index = 0.0;
    for (kind, bp) in WEIGHTS_BP {
        let mut value = policy.resolve(metrics.get(kind))?;
        if kind == MetricKind::Inspection {
            value *= INSPECTION_SCALE;
        }
        index += bp as f64 / 10_000.0 * value;
    }
    Some(index)
}

/// The composite for every anchored node of `level`, ordered by node id.
pub fn composite_rows(
    conn: &Connection,
    level: Level,
    opts: &CompositeOptions,
) -> Result<Vec<CompositeRow>, rusqlite::Error> {
    let mut by_node: HashMap<i64, MetricSet> = HashMap::new();
    let mut attendance_nodes = Vec::new();

    for kind in MetricKind::ALL {
        for row in metric_rows(conn, level, kind)? {
            if kind == MetricKind::StudentAttendance {
                attendance_nodes.push((row.node_id, row.node_name.clone()));
            }
            by_node.entry(row.node_id).or_default().set(kind, row.value);
        }
    }

    let anchors = match opts.anchor {
        AnchorPolicy::Universe => node_universe(conn, level)?,
        AnchorPolicy::Attendance => attendance_nodes,
    };

    let mut rows = Vec::with_capacity(anchors.len());
    let mut dropped = 0usize;
    for (node_id, node_name) in anchors {
        let metrics = by_node.get(&node_id).copied().unwrap_or_default();
        match performance_index(&metrics, opts.missing_data) {
            Some(performance_index) => rows.push(CompositeRow {
                node_id,
                node_name,
                metrics,
                performance_index,
            }),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        log::info!(
            "{dropped} {level} node(s) excluded from the composite for missing metrics"
        );
    }
    log::debug!("composite at {level} level: {} node(s)", rows.len());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_set(v: f64, inspection: f64) -> MetricSet {
        MetricSet {
            attendance_percentage: Some(v),
            pass_percentage: Some(v),
            sports_participation_rate: Some(v),
            activity_engagement_rate: Some(v),
            teacher_attendance_percentage: Some(v),
            avg_inspection_score: Some(inspection),
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        let bp: u32 = WEIGHTS_BP.iter().map(|(_, bp)| bp).sum();
        assert_eq!(bp, 10_000);

        let total: f64 = MetricKind::ALL.into_iter().map(weight).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_every_metric_is_weighted() {
        for kind in MetricKind::ALL {
            assert!(weight(kind) > 0.0, "{kind} has no weight");
        }
    }

    #[test]
    fn test_weights_match_published_formula() {
        assert_eq!(weight(MetricKind::ExamPass), 0.30);
        assert_eq!(weight(MetricKind::StudentAttendance), 0.20);
        assert_eq!(weight(MetricKind::SportsParticipation), 0.15);
        assert_eq!(weight(MetricKind::ActivityEngagement), 0.15);
        assert_eq!(weight(MetricKind::TeacherAttendance), 0.10);
        assert_eq!(weight(MetricKind::Inspection), 0.10);
    }

    #[test]
    fn test_all_maxed_metrics_score_100() {
        let index = performance_index(&full_set(100.0, 10.0), MissingDataPolicy::ZeroFill).unwrap();
        assert!((index - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_fill_vs_exclude() {
        let mut metrics = full_set(50.0, 5.0);
        metrics.avg_inspection_score = None;

        let zero = performance_index(&metrics, MissingDataPolicy::ZeroFill).unwrap();
        assert!((zero - 45.0).abs() < 1e-9);
        assert_eq!(
            performance_index(&metrics, MissingDataPolicy::ExcludeNode),
            None
        );
        assert_eq!(metrics.missing(), vec![MetricKind::Inspection]);
    }

    #[test]
    fn test_options_from_config() {
        let opts = CompositeOptions::from_config(Some("attendance"), Some("exclude")).unwrap();
        assert_eq!(opts.anchor, AnchorPolicy::Attendance);
        assert_eq!(opts.missing_data, MissingDataPolicy::ExcludeNode);

        assert_eq!(
            CompositeOptions::from_config(None, None).unwrap(),
            CompositeOptions::default()
        );
        assert!(matches!(
            CompositeOptions::from_config(Some("everything"), None),
            Err(Error::Config(_))
        ));
    }
}
