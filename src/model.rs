//! Upstream records: the hierarchy, the people in it, and the facts the
//! KPI engine aggregates. Field names match the warehouse columns.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Present" => Ok(AttendanceStatus::Present),
            "Absent" => Ok(AttendanceStatus::Absent),
            other => Err(Error::Import(format!("unknown attendance status: {other}"))),
        }
    }
}

// ── Hierarchy ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub state_id: i64,
    pub state_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct District {
    pub district_id: i64,
    pub district_name: String,
    pub state_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub block_id: i64,
    pub block_name: String,
    pub district_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct School {
    pub school_id: i64,
    pub school_name: String,
    pub block_id: i64,
    #[serde(default)]
    pub udise_code: Option<String>,
}

// ── People ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub student_id: i64,
    pub student_name: String,
    #[serde(default)]
    pub gender: Option<String>,
    pub school_id: i64,
    #[serde(default = "default_student_status")]
    pub status: String,
}

fn default_student_status() -> String {
    "Active".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teacher {
    pub teacher_id: i64,
    pub teacher_name: String,
    pub school_id: i64,
}

// ── Facts ──────────────────────────────────────────────────────────

/// One attendance mark. `(student_id, attendance_date)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentAttendance {
    pub student_id: i64,
    pub attendance_date: NaiveDate,
    pub status: AttendanceStatus,
}

/// One attendance mark. `(teacher_id, attendance_date)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherAttendance {
    pub teacher_id: i64,
    pub attendance_date: NaiveDate,
    pub status: AttendanceStatus,
}

/// `(student_id, exam_id, subject_id)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamResult {
    pub student_id: i64,
    pub exam_id: i64,
    pub subject_id: i64,
    #[serde(default)]
    pub marks_obtained: Option<f64>,
    pub pass_status: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SportsParticipation {
    pub student_id: i64,
    pub sport_name: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub achievement: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityParticipation {
    pub student_id: i64,
    pub activity_name: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// School inspection. `overall_score` is on a 0-10 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inspection {
    pub school_id: i64,
    #[serde(default)]
    pub inspection_date: Option<NaiveDate>,
    pub overall_score: f64,
}
