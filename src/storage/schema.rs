use rusqlite::Connection;

/// A child → parent reference. Every row of `table` must resolve through
/// `column` to an existing `parent` row for it to have a path to the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentRef {
    pub table: &'static str,
    pub key: &'static str,
    pub column: &'static str,
    pub parent: &'static str,
    pub parent_key: &'static str,
}

const fn parent_ref(
    table: &'static str,
    key: &'static str,
    column: &'static str,
    parent: &'static str,
    parent_key: &'static str,
) -> ParentRef {
    ParentRef {
        table,
        key,
        column,
        parent,
        parent_key,
    }
}

/// Ordered from the root down, so the first dangling reference reported is
/// the highest one in the tree.
#[rustfmt::skip]
pub const PARENT_REFS: &[ParentRef] = &[
    parent_ref("district", "district_id", "state_id", "state", "state_id"),
    parent_ref("block", "block_id", "district_id", "district", "district_id"),
    parent_ref("school", "school_id", "block_id", "block", "block_id"),
    parent_ref("student", "student_id", "school_id", "school", "school_id"),
    parent_ref("teacher", "teacher_id", "school_id", "school", "school_id"),
    parent_ref("student_attendance", "attendance_id", "student_id", "student", "student_id"),
    parent_ref("teacher_attendance", "attendance_id", "teacher_id", "teacher", "teacher_id"),
    parent_ref("exam_result", "result_id", "student_id", "student", "student_id"),
    parent_ref("sports_participation", "participation_id", "student_id", "student", "student_id"),
    parent_ref("activity_participation", "participation_id", "student_id", "student", "student_id"),
    parent_ref("inspection", "inspection_id", "school_id", "school", "school_id"),
];

pub const HIERARCHY_TABLES: &[&str] = &["state", "district", "block", "school"];

pub const PEOPLE_TABLES: &[&str] = &["student", "teacher"];

pub const FACT_TABLES: &[&str] = &[
    "student_attendance",
    "teacher_attendance",
    "exam_result",
    "sports_participation",
    "activity_participation",
    "inspection",
];

/// Row counts for every hierarchy, people and fact table, in that order.
pub fn table_counts(conn: &Connection) -> Result<Vec<(&'static str, i64)>, rusqlite::Error> {
    let mut counts = Vec::new();
    for table in HIERARCHY_TABLES
        .iter()
        .chain(PEOPLE_TABLES)
        .chain(FACT_TABLES)
    {
        let n: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        counts.push((*table, n));
    }
    Ok(counts)
}
