use rusqlite::params;
use serde::Serialize;

use super::{csv_escape, round2};
use crate::error::Result;
use crate::storage::Database;

/// An active student below the marks or attendance threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AtRiskStudent {
    pub student_id: i64,
    pub student_name: String,
    pub gender: Option<String>,
    pub school_name: String,
    pub district_name: String,
    /// Mean of recorded marks, `None` without any marked results.
    pub avg_marks: Option<f64>,
    /// `None` without any attendance marks.
    pub attendance_pct: Option<f64>,
}

/// Builder for at-risk student lookups.
#[derive(Debug, Clone)]
pub struct AtRiskQuery {
    marks_below: f64,
    attendance_below: f64,
    district_id: Option<i64>,
    limit: u32,
}

impl Default for AtRiskQuery {
    fn default() -> Self {
        Self {
            marks_below: 60.0,
            attendance_below: 70.0,
            district_id: None,
            limit: 20,
        }
    }
}

impl AtRiskQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marks_below(mut self, threshold: f64) -> Self {
        self.marks_below = threshold;
        self
    }

    pub fn attendance_below(mut self, threshold: f64) -> Self {
        self.attendance_below = threshold;
        self
    }

    pub fn district(mut self, district_id: i64) -> Self {
        self.district_id = Some(district_id);
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit = n;
        self
    }

    /// Marks and attendance are aggregated in separate subqueries so that
    /// neither inflates the other's row count.
    const SQL: &'static str = "
        SELECT st.student_id, st.student_name, st.gender, sc.school_name, d.district_name,
               m.avg_marks, a.attendance_pct
        FROM student st
        JOIN school sc ON sc.school_id = st.school_id
        JOIN block b ON b.block_id = sc.block_id
        JOIN district d ON d.district_id = b.district_id
        LEFT JOIN (
            SELECT student_id, AVG(marks_obtained) AS avg_marks
            FROM exam_result
            GROUP BY student_id
        ) m ON m.student_id = st.student_id
        LEFT JOIN (
            SELECT student_id,
                   COUNT(CASE WHEN status = 'Present' THEN 1 END) * 100.0
                       / NULLIF(COUNT(attendance_id), 0) AS attendance_pct
            FROM student_attendance
            GROUP BY student_id
        ) a ON a.student_id = st.student_id
        WHERE st.status = 'Active'
          AND (m.avg_marks < ?1 OR a.attendance_pct < ?2)
          AND (?3 IS NULL OR d.district_id = ?3)
        ORDER BY m.avg_marks ASC, a.attendance_pct ASC, st.student_id
        LIMIT ?4";

    pub async fn students(self, db: &Database) -> Result<Vec<AtRiskStudent>> {
        let students = db
            .reader()
            .call(move |conn| {
                let mut stmt = conn.prepare(Self::SQL)?;
                let rows = stmt.query_map(
                    params![
                        self.marks_below,
                        self.attendance_below,
                        self.district_id,
                        self.limit
                    ],
                    |row| {
                        Ok(AtRiskStudent {
                            student_id: row.get(0)?,
                            student_name: row.get(1)?,
                            gender: row.get(2)?,
                            school_name: row.get(3)?,
                            district_name: row.get(4)?,
                            avg_marks: row.get::<_, Option<f64>>(5)?.map(round2),
                            attendance_pct: row.get::<_, Option<f64>>(6)?.map(round2),
                        })
                    },
                )?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await?;
        log::info!("Identified {} at-risk student(s)", students.len());
        Ok(students)
    }

    pub async fn to_csv(self, db: &Database) -> Result<String> {
        Ok(students_to_csv(&self.students(db).await?))
    }
}

pub fn students_to_csv(students: &[AtRiskStudent]) -> String {
    let opt = |v: Option<f64>| v.map_or(String::new(), |v| format!("{v:.2}"));
    let mut out = String::new();
    out.push_str("student_id,student_name,gender,school_name,district_name,avg_marks,attendance_pct\n");
    for s in students {
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            s.student_id,
            csv_escape(&s.student_name),
            csv_escape(s.gender.as_deref().unwrap_or("")),
            csv_escape(&s.school_name),
            csv_escape(&s.district_name),
            opt(s.avg_marks),
            opt(s.attendance_pct),
        ));
    }
    out
}
