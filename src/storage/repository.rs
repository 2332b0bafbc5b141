use rusqlite::{params, Connection, OptionalExtension};

use crate::model::{
    ActivityParticipation, Block, District, ExamResult, Inspection, School, SportsParticipation,
    State, Student, StudentAttendance, Teacher, TeacherAttendance,
};

// ── Hierarchy ──────────────────────────────────────────────────────

pub fn upsert_state(conn: &Connection, state: &State) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO state (state_id, state_name) VALUES (?1, ?2)
         ON CONFLICT(state_id) DO UPDATE SET state_name = excluded.state_name",
        params![state.state_id, state.state_name],
    )?;
    Ok(())
}

pub fn upsert_district(conn: &Connection, district: &District) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO district (district_id, district_name, state_id) VALUES (?1, ?2, ?3)
         ON CONFLICT(district_id) DO UPDATE SET
            district_name = excluded.district_name, state_id = excluded.state_id",
        params![district.district_id, district.district_name, district.state_id],
    )?;
    Ok(())
}

pub fn upsert_block(conn: &Connection, block: &Block) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO block (block_id, block_name, district_id) VALUES (?1, ?2, ?3)
         ON CONFLICT(block_id) DO UPDATE SET
            block_name = excluded.block_name, district_id = excluded.district_id",
        params![block.block_id, block.block_name, block.district_id],
    )?;
    Ok(())
}

pub fn upsert_school(conn: &Connection, school: &School) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO school (school_id, school_name, block_id, udise_code) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(school_id) DO UPDATE SET
            school_name = excluded.school_name, block_id = excluded.block_id,
            udise_code = COALESCE(excluded.udise_code, school.udise_code)",
        params![school.school_id, school.school_name, school.block_id, school.udise_code],
    )?;
    Ok(())
}

// ── People ─────────────────────────────────────────────────────────

pub fn upsert_student(conn: &Connection, student: &Student) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO student (student_id, student_name, gender, school_id, status)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(student_id) DO UPDATE SET
            student_name = excluded.student_name, gender = excluded.gender,
            school_id = excluded.school_id, status = excluded.status",
        params![
            student.student_id,
            student.student_name,
            student.gender,
            student.school_id,
            student.status,
        ],
    )?;
    Ok(())
}

pub fn upsert_teacher(conn: &Connection, teacher: &Teacher) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO teacher (teacher_id, teacher_name, school_id) VALUES (?1, ?2, ?3)
         ON CONFLICT(teacher_id) DO UPDATE SET
            teacher_name = excluded.teacher_name, school_id = excluded.school_id",
        params![teacher.teacher_id, teacher.teacher_name, teacher.school_id],
    )?;
    Ok(())
}

// ── Facts ──────────────────────────────────────────────────────────

/// A second mark for the same student and day replaces the first.
pub fn upsert_student_attendance(
    conn: &Connection,
    record: &StudentAttendance,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO student_attendance (student_id, attendance_date, status) VALUES (?1, ?2, ?3)
         ON CONFLICT(student_id, attendance_date) DO UPDATE SET status = excluded.status",
        params![
            record.student_id,
            record.attendance_date.format("%Y-%m-%d").to_string(),
            record.status.as_str(),
        ],
    )?;
    Ok(())
}

pub fn upsert_teacher_attendance(
    conn: &Connection,
    record: &TeacherAttendance,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO teacher_attendance (teacher_id, attendance_date, status) VALUES (?1, ?2, ?3)
         ON CONFLICT(teacher_id, attendance_date) DO UPDATE SET status = excluded.status",
        params![
            record.teacher_id,
            record.attendance_date.format("%Y-%m-%d").to_string(),
            record.status.as_str(),
        ],
    )?;
    Ok(())
}

pub fn upsert_exam_result(conn: &Connection, result: &ExamResult) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO exam_result (student_id, exam_id, subject_id, marks_obtained, pass_status)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(student_id, exam_id, subject_id) DO UPDATE SET
            marks_obtained = excluded.marks_obtained, pass_status = excluded.pass_status",
        params![
            result.student_id,
            result.exam_id,
            result.subject_id,
            result.marks_obtained,
            result.pass_status as i32,
        ],
    )?;
    Ok(())
}

pub fn upsert_sports_participation(
    conn: &Connection,
    record: &SportsParticipation,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO sports_participation (student_id, sport_name, level, achievement)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(student_id, sport_name) DO UPDATE SET
            level = excluded.level, achievement = excluded.achievement",
        params![record.student_id, record.sport_name, record.level, record.achievement],
    )?;
    Ok(())
}

pub fn upsert_activity_participation(
    conn: &Connection,
    record: &ActivityParticipation,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO activity_participation (student_id, activity_name, role)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(student_id, activity_name) DO UPDATE SET role = excluded.role",
        params![record.student_id, record.activity_name, record.role],
    )?;
    Ok(())
}

/// Keyed on `(school_id, inspection_date)`. Undated inspections are appended.
pub fn upsert_inspection(
    conn: &Connection,
    inspection: &Inspection,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO inspection (school_id, inspection_date, overall_score)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(school_id, inspection_date) DO UPDATE SET
            overall_score = excluded.overall_score",
        params![
            inspection.school_id,
            inspection
                .inspection_date
                .map(|d| d.format("%Y-%m-%d").to_string()),
            inspection.overall_score,
        ],
    )?;
    Ok(())
}

/// Whether `table` has a row whose `key` column equals `id`.
/// Table and column names must come from the static schema map, never from input.
pub fn row_exists(
    conn: &Connection,
    table: &str,
    key: &str,
    id: i64,
) -> Result<bool, rusqlite::Error> {
    let found: Option<i64> = conn
        .query_row(
            &format!("SELECT 1 FROM {table} WHERE {key} = ?1"),
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Snapshots ──────────────────────────────────────────────────────

/// One stored composite row. Metric columns keep the null-vs-zero distinction.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SnapshotRow {
    pub snapshot_at: String,
    pub level: String,
    pub node_id: i64,
    pub node_name: String,
    pub attendance_percentage: Option<f64>,
    pub pass_percentage: Option<f64>,
    pub sports_participation_rate: Option<f64>,
    pub activity_engagement_rate: Option<f64>,
    pub teacher_attendance_percentage: Option<f64>,
    pub avg_inspection_score: Option<f64>,
    pub performance_index: f64,
}

pub fn insert_snapshot_row(conn: &Connection, row: &SnapshotRow) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO kpi_snapshots (
            snapshot_at, level, node_id, node_name,
            attendance_percentage, pass_percentage, sports_participation_rate,
            activity_engagement_rate, teacher_attendance_percentage, avg_inspection_score,
            performance_index
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            row.snapshot_at,
            row.level,
            row.node_id,
            row.node_name,
            row.attendance_percentage,
            row.pass_percentage,
            row.sports_participation_rate,
            row.activity_engagement_rate,
            row.teacher_attendance_percentage,
            row.avg_inspection_score,
            row.performance_index,
        ],
    )?;
    Ok(())
}

pub fn list_snapshots(
    conn: &Connection,
    level: &str,
    node_id: i64,
) -> Result<Vec<SnapshotRow>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT snapshot_at, level, node_id, node_name,
                attendance_percentage, pass_percentage, sports_participation_rate,
                activity_engagement_rate, teacher_attendance_percentage, avg_inspection_score,
                performance_index
         FROM kpi_snapshots WHERE level = ?1 AND node_id = ?2 ORDER BY snapshot_at",
    )?;
    let rows = stmt.query_map(params![level, node_id], |row| {
        Ok(SnapshotRow {
            snapshot_at: row.get(0)?,
            level: row.get(1)?,
            node_id: row.get(2)?,
            node_name: row.get(3)?,
            attendance_percentage: row.get(4)?,
            pass_percentage: row.get(5)?,
            sports_participation_rate: row.get(6)?,
            activity_engagement_rate: row.get(7)?,
            teacher_attendance_percentage: row.get(8)?,
            avg_inspection_score: row.get(9)?,
            performance_index: row.get(10)?,
        })
    })?;
    rows.collect()
}

// ── Analysis Reports ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StoredAnalysis {
    pub id: i64,
    pub analysis_type: String,
    pub model: String,
    pub prompt_version: String,
    pub records_analyzed: i64,
    pub execution_time_seconds: f64,
    pub analysis: String,
    pub generated_at: String,
}

#[allow(clippy::too_many_arguments)]
pub fn insert_analysis_report(
    conn: &Connection,
    analysis_type: &str,
    model: &str,
    prompt_version: &str,
    records_analyzed: u64,
    execution_time_seconds: f64,
    analysis: &str,
    generated_at: &str,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO analysis_reports (
            analysis_type, model, prompt_version, records_analyzed,
            execution_time_seconds, analysis, generated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            analysis_type,
            model,
            prompt_version,
            records_analyzed as i64,
            execution_time_seconds,
            analysis,
            generated_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn latest_analysis_report(
    conn: &Connection,
    analysis_type: &str,
) -> Result<Option<StoredAnalysis>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, analysis_type, model, prompt_version, records_analyzed,
                execution_time_seconds, analysis, generated_at
         FROM analysis_reports WHERE analysis_type = ?1
         ORDER BY generated_at DESC, id DESC LIMIT 1",
        params![analysis_type],
        |row| {
            Ok(StoredAnalysis {
                id: row.get(0)?,
                analysis_type: row.get(1)?,
                model: row.get(2)?,
                prompt_version: row.get(3)?,
                records_analyzed: row.get(4)?,
                execution_time_seconds: row.get(5)?,
                analysis: row.get(6)?,
                generated_at: row.get(7)?,
            })
        },
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttendanceStatus;
    use crate::storage::Database;
    use chrono::NaiveDate;

    fn seed_school(conn: &Connection) -> Result<(), rusqlite::Error> {
        upsert_state(
            conn,
            &State {
                state_id: 1,
                state_name: "Karnataka".into(),
            },
        )?;
        upsert_district(
            conn,
            &District {
                district_id: 10,
                district_name: "Mysuru".into(),
                state_id: 1,
            },
        )?;
        upsert_block(
            conn,
            &Block {
                block_id: 100,
                block_name: "Hunsur".into(),
                district_id: 10,
            },
        )?;
        upsert_school(
            conn,
            &School {
                school_id: 1000,
                school_name: "GHPS Hunsur".into(),
                block_id: 100,
                udise_code: Some("29260101".into()),
            },
        )?;
        upsert_student(
            conn,
            &Student {
                student_id: 1,
                student_name: "Asha".into(),
                gender: Some("F".into()),
                school_id: 1000,
                status: "Active".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_config_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                set_config(conn, "llm_provider", "anthropic")?;
                let val = get_config(conn, "llm_provider")?;
                assert_eq!(val, Some("anthropic".to_string()));

                let missing = get_config(conn, "nonexistent")?;
                assert_eq!(missing, None);

                set_config(conn, "kpi_anchor", "universe")?;
                let all = list_config(conn)?;
                assert_eq!(all.len(), 2);
                assert_eq!(all[0].0, "kpi_anchor");
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_hierarchy_upsert_updates_in_place() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                seed_school(conn)?;
                upsert_school(
                    conn,
                    &School {
                        school_id: 1000,
                        school_name: "GHPS Hunsur (renamed)".into(),
                        block_id: 100,
                        udise_code: None,
                    },
                )?;

                let (name, udise): (String, Option<String>) = conn.query_row(
                    "SELECT school_name, udise_code FROM school WHERE school_id = 1000",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                assert_eq!(name, "GHPS Hunsur (renamed)");
                // A missing code in the update keeps the stored one
                assert_eq!(udise, Some("29260101".to_string()));
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_attendance_unique_per_day() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                seed_school(conn)?;
                let day = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
                upsert_student_attendance(
                    conn,
                    &StudentAttendance {
                        student_id: 1,
                        attendance_date: day,
                        status: AttendanceStatus::Absent,
                    },
                )?;
                upsert_student_attendance(
                    conn,
                    &StudentAttendance {
                        student_id: 1,
                        attendance_date: day,
                        status: AttendanceStatus::Present,
                    },
                )?;

                let (n, status): (i64, String) = conn.query_row(
                    "SELECT COUNT(*), MAX(status) FROM student_attendance WHERE student_id = 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                assert_eq!(n, 1);
                assert_eq!(status, "Present");
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_inspection_keyed_by_school_and_date() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                seed_school(conn)?;
                let visit = |date: Option<NaiveDate>, overall_score: f64| Inspection {
                    school_id: 1000,
                    inspection_date: date,
                    overall_score,
                };
                let day = NaiveDate::from_ymd_opt(2025, 6, 15);
                upsert_inspection(conn, &visit(day, 6.0))?;
                upsert_inspection(conn, &visit(day, 8.5))?;
                upsert_inspection(conn, &visit(None, 5.0))?;
                upsert_inspection(conn, &visit(None, 5.0))?;

                let dated: f64 = conn.query_row(
                    "SELECT overall_score FROM inspection WHERE inspection_date = '2025-06-15'",
                    [],
                    |row| row.get(0),
                )?;
                assert_eq!(dated, 8.5);

                let undated: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM inspection WHERE inspection_date IS NULL",
                    [],
                    |row| row.get(0),
                )?;
                assert_eq!(undated, 2);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_foreign_keys_reject_dangling_student() {
        let db = Database::open_memory().await.unwrap();

        let result = db
            .writer()
            .call(|conn| {
                upsert_student(
                    conn,
                    &Student {
                        student_id: 9,
                        student_name: "Nobody".into(),
                        gender: None,
                        school_id: 4242,
                        status: "Active".into(),
                    },
                )
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_row_exists() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                seed_school(conn)?;
                assert!(row_exists(conn, "school", "school_id", 1000)?);
                assert!(!row_exists(conn, "school", "school_id", 1001)?);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let row = SnapshotRow {
                    snapshot_at: "2025-07-01T00:00:00+00:00".into(),
                    level: "district".into(),
                    node_id: 10,
                    node_name: "Mysuru".into(),
                    attendance_percentage: Some(80.0),
                    pass_percentage: None,
                    sports_participation_rate: Some(50.0),
                    activity_engagement_rate: Some(25.0),
                    teacher_attendance_percentage: Some(90.0),
                    avg_inspection_score: None,
                    performance_index: 36.75,
                };
                insert_snapshot_row(conn, &row)?;

                let rows = list_snapshots(conn, "district", 10)?;
                assert_eq!(rows, vec![row]);
                assert!(list_snapshots(conn, "state", 10)?.is_empty());
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_latest_analysis_report() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                assert!(latest_analysis_report(conn, "quick_summary")?.is_none());
                insert_analysis_report(
                    conn, "quick_summary", "haiku", "analysis-v1", 3, 1.5, "first",
                    "2025-07-01T00:00:00+00:00",
                )?;
                insert_analysis_report(
                    conn, "quick_summary", "sonnet", "analysis-v1", 3, 2.5, "second",
                    "2025-07-02T00:00:00+00:00",
                )?;

                let latest = latest_analysis_report(conn, "quick_summary")?.unwrap();
                assert_eq!(latest.analysis, "second");
                assert_eq!(latest.model, "sonnet");
                assert_eq!(latest.records_analyzed, 3);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }
}
