pub mod loader;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    ActivityParticipation, Block, District, ExamResult, Inspection, School, SportsParticipation,
    State, Student, StudentAttendance, Teacher, TeacherAttendance,
};

pub use loader::ingest;

/// An upstream export: one array per table. Missing arrays are empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub state: Vec<State>,
    pub district: Vec<District>,
    pub block: Vec<Block>,
    pub school: Vec<School>,
    pub student: Vec<Student>,
    pub teacher: Vec<Teacher>,
    pub student_attendance: Vec<StudentAttendance>,
    pub teacher_attendance: Vec<TeacherAttendance>,
    pub exam_result: Vec<ExamResult>,
    pub sports_participation: Vec<SportsParticipation>,
    pub activity_participation: Vec<ActivityParticipation>,
    pub inspection: Vec<Inspection>,
}

impl Dataset {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Import(e.to_string()))
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Import(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    pub fn total_rows(&self) -> usize {
        self.state.len()
            + self.district.len()
            + self.block.len()
            + self.school.len()
            + self.student.len()
            + self.teacher.len()
            + self.student_attendance.len()
            + self.teacher_attendance.len()
            + self.exam_result.len()
            + self.sports_participation.len()
            + self.activity_participation.len()
            + self.inspection.len()
    }
}

/// Receives progress as tables are loaded. Called from the database thread.
pub trait IngestProgress: Send + Sync {
    fn on_table_start(&self, _table: &str, _index: usize, _total: usize) {}
    fn on_row_rejected(&self, _rejection: &Rejection) {}
    fn on_table_complete(&self, _report: &TableReport) {}
}

/// Progress sink that ignores everything.
pub struct NoopProgress;

impl IngestProgress for NoopProgress {}

/// A row that was not loaded, and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub table: &'static str,
    /// Position of the row in its input array.
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableReport {
    pub table: &'static str,
    pub loaded: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IngestStatus {
    Success,
    PartialFailure,
    Failed,
}

/// Report returned after an ingest completes.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub status: IngestStatus,
    pub rows_loaded: u64,
    pub rows_rejected: u64,
    pub tables: Vec<TableReport>,
    pub rejected: Vec<Rejection>,
}

impl IngestReport {
    /// Derive the overall status from per-table counts.
    pub fn from_tables(tables: Vec<TableReport>, rejected: Vec<Rejection>) -> Self {
        let rows_loaded = tables.iter().map(|t| t.loaded).sum();
        let rows_rejected = tables.iter().map(|t| t.rejected).sum();
        let status = if rows_rejected == 0 {
            IngestStatus::Success
        } else if rows_loaded > 0 {
            IngestStatus::PartialFailure
        } else {
            IngestStatus::Failed
        };
        Self {
            status,
            rows_loaded,
            rows_rejected,
            tables,
            rejected,
        }
    }
}
