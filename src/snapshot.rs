//! Point-in-time copies of composite output.
//!
//! The engine itself never stores KPI state; materializing is a separate,
//! explicit step that writes one pass's rows under a single timestamp.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::kpi::{self, CompositeOptions, Level};
use crate::storage::repository::{self, SnapshotRow};
use crate::storage::Database;

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotSummary {
    pub snapshot_at: String,
    pub level: Level,
    pub nodes: usize,
}

/// Compute the composite for `level` and store it under the current time.
pub async fn materialize(
    db: &Database,
    level: Level,
    opts: &CompositeOptions,
) -> Result<SnapshotSummary> {
    let snapshot_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    materialize_at(db, level, opts, snapshot_at).await
}

async fn materialize_at(
    db: &Database,
    level: Level,
    opts: &CompositeOptions,
    snapshot_at: String,
) -> Result<SnapshotSummary> {
    let rows = kpi::compute_composite(db, level, opts).await?;
    let stored: Vec<SnapshotRow> = rows
        .into_iter()
        .map(|r| SnapshotRow {
            snapshot_at: snapshot_at.clone(),
            level: level.as_str().to_string(),
            node_id: r.node_id,
            node_name: r.node_name,
            attendance_percentage: r.metrics.attendance_percentage,
            pass_percentage: r.metrics.pass_percentage,
            sports_participation_rate: r.metrics.sports_participation_rate,
            activity_engagement_rate: r.metrics.activity_engagement_rate,
            teacher_attendance_percentage: r.metrics.teacher_attendance_percentage,
            avg_inspection_score: r.metrics.avg_inspection_score,
            performance_index: r.performance_index,
        })
        .collect();

    let nodes = stored.len();
    db.writer()
        .call(move |conn| {
            let tx = conn.transaction()?;
            for row in &stored {
                repository::insert_snapshot_row(&tx, row)?;
            }
            tx.commit()?;
            Ok::<(), rusqlite::Error>(())
        })
        .await?;

    log::info!("Stored {level} snapshot {snapshot_at} ({nodes} node(s))");
    Ok(SnapshotSummary {
        snapshot_at,
        level,
        nodes,
    })
}

/// Every stored snapshot row for one node, oldest first.
pub async fn history(db: &Database, level: Level, node_id: i64) -> Result<Vec<SnapshotRow>> {
    let level = level.as_str();
    let rows = db
        .reader()
        .call(move |conn| repository::list_snapshots(conn, level, node_id))
        .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[tokio::test]
    async fn test_materialize_and_history() {
        let db = Database::open_memory().await.unwrap();
        let (district, student) = db
            .writer()
            .call(|conn| {
                let mut f = Fixture::new(conn);
                let st = f.state("S")?;
                let d = f.district(st, "D")?;
                let b = f.block(d, "B")?;
                let sc = f.school(b, "Sc")?;
                let s = f.student(sc)?;
                f.student_attendance(s, 5, 5)?;
                Ok::<_, rusqlite::Error>((d, s))
            })
            .await
            .unwrap();

        let opts = CompositeOptions::default();
        let july = "2025-07-01T00:00:00.000Z".to_string();
        let first = materialize_at(&db, Level::District, &opts, july)
            .await
            .unwrap();
        assert_eq!(first.nodes, 1);

        db.writer()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO student_attendance (student_id, attendance_date, status)
                     VALUES (?1, '2025-12-01', 'Present')",
                    [student],
                )?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
        let august = "2025-08-01T00:00:00.000Z".to_string();
        materialize_at(&db, Level::District, &opts, august)
            .await
            .unwrap();

        let series = history(&db, Level::District, district).await.unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].attendance_percentage, Some(50.0));
        assert!(series[1].performance_index > series[0].performance_index);
        assert_eq!(series[0].pass_percentage, None);

        let state_rows = history(&db, Level::State, district).await.unwrap();
        assert!(state_rows.is_empty());
    }

    #[tokio::test]
    async fn test_materialize_uses_rfc3339_key() {
        let db = Database::open_memory().await.unwrap();
        let summary = materialize(&db, Level::State, &CompositeOptions::default())
            .await
            .unwrap();
        assert_eq!(summary.nodes, 0);
        let parsed = chrono::DateTime::parse_from_rfc3339(&summary.snapshot_at);
        assert!(parsed.is_ok());
    }
}
