use std::sync::Arc;

use rusqlite::Connection;

use crate::error::{Error, Result};
use crate::ingest::{Dataset, IngestProgress, IngestReport, Rejection, TableReport};
use crate::storage::schema::PARENT_REFS;
use crate::storage::{repository, Database};

/// Number of tables in a dataset, for progress totals.
const TABLE_COUNT: usize = 12;

/// Accumulates per-table results while a dataset loads.
struct Loader<'a> {
    conn: &'a Connection,
    progress: &'a dyn IngestProgress,
    tables: Vec<TableReport>,
    rejected: Vec<Rejection>,
}

impl<'a> Loader<'a> {
    /// Load `rows` into `table`, rejecting any row whose parent id does not
    /// resolve. `parent_of` yields that id; root tables have none.
    fn load<T>(
        &mut self,
        table: &'static str,
        rows: &[T],
        parent_of: impl Fn(&T) -> Option<i64>,
        insert: impl Fn(&Connection, &T) -> rusqlite::Result<()>,
    ) -> rusqlite::Result<()> {
        self.progress
            .on_table_start(table, self.tables.len(), TABLE_COUNT);
        let parent_ref = PARENT_REFS.iter().find(|r| r.table == table);

        let mut report = TableReport {
            table,
            loaded: 0,
            rejected: 0,
        };
        for (index, row) in rows.iter().enumerate() {
            if let (Some(r), Some(parent_id)) = (parent_ref, parent_of(row)) {
                if !repository::row_exists(self.conn, r.parent, r.parent_key, parent_id)? {
                    let rejection = Rejection {
                        table,
                        index,
                        reason: format!("{} {parent_id} not found in {}", r.column, r.parent),
                    };
                    log::warn!("Rejected {table}[{index}]: {}", rejection.reason);
                    self.progress.on_row_rejected(&rejection);
                    self.rejected.push(rejection);
                    report.rejected += 1;
                    continue;
                }
            }
            insert(self.conn, row)?;
            report.loaded += 1;
        }

        log::debug!(
            "Loaded {table}: {} row(s), {} rejected",
            report.loaded,
            report.rejected
        );
        self.progress.on_table_complete(&report);
        self.tables.push(report);
        Ok(())
    }
}

/// Load every table of `dataset` in dependency order, parents first.
fn load_dataset(
    conn: &Connection,
    dataset: &Dataset,
    progress: &dyn IngestProgress,
) -> rusqlite::Result<IngestReport> {
    let mut loader = Loader {
        conn,
        progress,
        tables: Vec::with_capacity(TABLE_COUNT),
        rejected: Vec::new(),
    };

    loader.load("state", &dataset.state, |_| None, repository::upsert_state)?;
    loader.load(
        "district",
        &dataset.district,
        |r| Some(r.state_id),
        repository::upsert_district,
    )?;
    loader.load(
        "block",
        &dataset.block,
        |r| Some(r.district_id),
        repository::upsert_block,
    )?;
    loader.load(
        "school",
        &dataset.school,
        |r| Some(r.block_id),
        repository::upsert_school,
    )?;
    loader.load(
        "student",
        &dataset.student,
        |r| Some(r.school_id),
        repository::upsert_student,
    )?;
    loader.load(
        "teacher",
        &dataset.teacher,
        |r| Some(r.school_id),
        repository::upsert_teacher,
    )?;
    loader.load(
        "student_attendance",
        &dataset.student_attendance,
        |r| Some(r.student_id),
        repository::upsert_student_attendance,
    )?;
    loader.load(
        "teacher_attendance",
        &dataset.teacher_attendance,
        |r| Some(r.teacher_id),
        repository::upsert_teacher_attendance,
    )?;
    loader.load(
        "exam_result",
        &dataset.exam_result,
        |r| Some(r.student_id),
        repository::upsert_exam_result,
    )?;
    loader.load(
        "sports_participation",
        &dataset.sports_participation,
        |r| Some(r.student_id),
        repository::upsert_sports_participation,
    )?;
    loader.load(
        "activity_participation",
        &dataset.activity_participation,
        |r| Some(r.student_id),
        repository::upsert_activity_participation,
    )?;
    loader.load(
        "inspection",
        &dataset.inspection,
        |r| Some(r.school_id),
        repository::upsert_inspection,
    )?;

    Ok(IngestReport::from_tables(loader.tables, loader.rejected))
}

/// Load a dataset in one write transaction. Rows with unresolvable parents
/// are rejected and listed in the report; any storage error rolls the whole
/// load back.
pub async fn ingest(
    db: &Database,
    dataset: Dataset,
    progress: Arc<dyn IngestProgress>,
) -> Result<IngestReport> {
    log::info!("Ingesting {} row(s)", dataset.total_rows());
    let report = db
        .writer()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let report = load_dataset(&tx, &dataset, progress.as_ref())?;
            tx.commit()?;
            Ok::<IngestReport, rusqlite::Error>(report)
        })
        .await
        .map_err(|e| Error::Import(e.to_string()))?;

    log::info!(
        "Ingest finished: {} loaded, {} rejected",
        report.rows_loaded,
        report.rows_rejected
    );
    Ok(report)
}
