//! Test-only builder for small hierarchies and their facts.

use chrono::{Duration, NaiveDate};
use rusqlite::Connection;

use crate::model::{
    ActivityParticipation, AttendanceStatus, Block, District, ExamResult, Inspection, School,
    SportsParticipation, State, Student, StudentAttendance, Teacher, TeacherAttendance,
};
use crate::storage::repository;

pub struct Fixture<'a> {
    conn: &'a Connection,
    next_id: i64,
    next_day: i64,
}

impl<'a> Fixture<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            next_id: 1,
            next_day: 0,
        }
    }

    fn id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn day(&mut self) -> NaiveDate {
        let base = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let day = base + Duration::days(self.next_day);
        self.next_day += 1;
        day
    }

    pub fn state(&mut self, name: &str) -> Result<i64, rusqlite::Error> {
        let state_id = self.id();
        repository::upsert_state(
            self.conn,
            &State {
                state_id,
                state_name: name.into(),
            },
        )?;
        Ok(state_id)
    }

    pub fn district(&mut self, state_id: i64, name: &str) -> Result<i64, rusqlite::Error> {
        let district_id = self.id();
        repository::upsert_district(
            self.conn,
            &District {
                district_id,
                district_name: name.into(),
                state_id,
            },
        )?;
        Ok(district_id)
    }

    pub fn block(&mut self, district_id: i64, name: &str) -> Result<i64, rusqlite::Error> {
        let block_id = self.id();
        repository::upsert_block(
            self.conn,
            &Block {
                block_id,
                block_name: name.into(),
                district_id,
            },
        )?;
        Ok(block_id)
    }

    pub fn school(&mut self, block_id: i64, name: &str) -> Result<i64, rusqlite::Error> {
        let school_id = self.id();
        repository::upsert_school(
            self.conn,
            &School {
                school_id,
                school_name: name.into(),
                block_id,
                udise_code: None,
            },
        )?;
        Ok(school_id)
    }

    pub fn student(&mut self, school_id: i64) -> Result<i64, rusqlite::Error> {
        let student_id = self.id();
        repository::upsert_student(
            self.conn,
            &Student {
                student_id,
                student_name: format!("Student {student_id}"),
                gender: None,
                school_id,
                status: "Active".into(),
            },
        )?;
        Ok(student_id)
    }

    pub fn teacher(&mut self, school_id: i64) -> Result<i64, rusqlite::Error> {
        let teacher_id = self.id();
        repository::upsert_teacher(
            self.conn,
            &Teacher {
                teacher_id,
                teacher_name: format!("Teacher {teacher_id}"),
                school_id,
            },
        )?;
        Ok(teacher_id)
    }

    /// `present` Present marks followed by `absent` Absent marks, one per day.
    pub fn student_attendance(
        &mut self,
        student_id: i64,
        present: u32,
        absent: u32,
    ) -> Result<(), rusqlite::Error> {
        for i in 0..present + absent {
            let status = if i < present {
                AttendanceStatus::Present
            } else {
                AttendanceStatus::Absent
            };
            let attendance_date = self.day();
            repository::upsert_student_attendance(
                self.conn,
                &StudentAttendance {
                    student_id,
                    attendance_date,
                    status,
                },
            )?;
        }
        Ok(())
    }

    pub fn teacher_attendance(
        &mut self,
        teacher_id: i64,
        present: u32,
        absent: u32,
    ) -> Result<(), rusqlite::Error> {
        for i in 0..present + absent {
            let status = if i < present {
                AttendanceStatus::Present
            } else {
                AttendanceStatus::Absent
            };
            let attendance_date = self.day();
            repository::upsert_teacher_attendance(
                self.conn,
                &TeacherAttendance {
                    teacher_id,
                    attendance_date,
                    status,
                },
            )?;
        }
        Ok(())
    }

    pub fn exam(
        &mut self,
        student_id: i64,
        marks: f64,
        passed: bool,
    ) -> Result<(), rusqlite::Error> {
        let exam_id = self.id();
        repository::upsert_exam_result(
            self.conn,
            &ExamResult {
                student_id,
                exam_id,
                subject_id: 1,
                marks_obtained: Some(marks),
                pass_status: passed,
            },
        )
    }

    /// `passed` passing results followed by `failed` failing ones.
    pub fn exams(
        &mut self,
        student_id: i64,
        passed: u32,
        failed: u32,
    ) -> Result<(), rusqlite::Error> {
        for i in 0..passed + failed {
            if i < passed {
                self.exam(student_id, 75.0, true)?;
            } else {
                self.exam(student_id, 20.0, false)?;
            }
        }
        Ok(())
    }

    /// Each call records a new sport name.
    pub fn sports(&mut self, student_id: i64) -> Result<(), rusqlite::Error> {
        let sport_name = format!("Sport {}", self.id());
        repository::upsert_sports_participation(
            self.conn,
            &SportsParticipation {
                student_id,
                sport_name,
                level: None,
                achievement: None,
            },
        )
    }

    pub fn activity(&mut self, student_id: i64) -> Result<(), rusqlite::Error> {
        let activity_name = format!("Club {}", self.id());
        repository::upsert_activity_participation(
            self.conn,
            &ActivityParticipation {
                student_id,
                activity_name,
                role: None,
            },
        )
    }

    pub fn inspection(
        &mut self,
        school_id: i64,
        overall_score: f64,
    ) -> Result<(), rusqlite::Error> {
        let inspection_date = Some(self.day());
        repository::upsert_inspection(
            self.conn,
            &Inspection {
                school_id,
                inspection_date,
                overall_score,
            },
        )
    }
}
