//! Referential and domain checks run before any aggregation pass.
//!
//! A fact whose owning entity has no path to the root would be silently
//! dropped by the inner joins in the KPI queries. The scan finds those rows
//! up front so a pass can refuse to run instead.

use rusqlite::Connection;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::storage::schema::{ParentRef, PARENT_REFS};
use crate::storage::Database;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub table: &'static str,
    pub row_id: i64,
    pub reason: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} #{}: {}", self.table, self.row_id, self.reason)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IntegrityReport {
    /// Rows whose parent reference does not resolve, highest in the tree first.
    pub dangling: Vec<Violation>,
    /// Inspection scores outside 0-10.
    pub out_of_domain: Vec<Violation>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.dangling.is_empty() && self.out_of_domain.is_empty()
    }

    /// The error a pass should fail with, if any. Dangling references always
    /// block; domain violations only when `validate_domains` is set.
    pub fn blocking_error(&self, validate_domains: bool) -> Option<Error> {
        if let Some(first) = self.dangling.first() {
            return Some(Error::Integrity {
                count: self.dangling.len(),
                first: first.to_string(),
            });
        }
        if validate_domains {
            if let Some(first) = self.out_of_domain.first() {
                return Some(Error::OutOfDomain {
                    count: self.out_of_domain.len(),
                    first: first.to_string(),
                });
            }
        }
        None
    }
}

fn dangling_rows(conn: &Connection, r: &ParentRef) -> rusqlite::Result<Vec<Violation>> {
    let sql = format!(
        "SELECT c.{key}, c.{column}
         FROM {table} c
         LEFT JOIN {parent} p ON p.{parent_key} = c.{column}
         WHERE p.{parent_key} IS NULL
         ORDER BY c.{key}",
        key = r.key,
        column = r.column,
        table = r.table,
        parent = r.parent,
        parent_key = r.parent_key
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        let row_id: i64 = row.get(0)?;
        let missing: Option<i64> = row.get(1)?;
        Ok(Violation {
            table: r.table,
            row_id,
            reason: match missing {
                Some(id) => format!("{} {id} not found in {}", r.column, r.parent),
                None => format!("{} is null", r.column),
            },
        })
    })?;
    rows.collect()
}

fn out_of_domain_inspections(conn: &Connection) -> rusqlite::Result<Vec<Violation>> {
    let mut stmt = conn.prepare(
        "SELECT inspection_id, overall_score FROM inspection
         WHERE overall_score < 0 OR overall_score > 10
         ORDER BY inspection_id",
    )?;
    let rows = stmt.query_map([], |row| {
        let score: f64 = row.get(1)?;
        Ok(Violation {
            table: "inspection",
            row_id: row.get(0)?,
            reason: format!("overall_score {score} outside 0-10"),
        })
    })?;
    rows.collect()
}

/// Scan every parent reference and value domain on one connection.
pub fn scan(conn: &Connection) -> rusqlite::Result<IntegrityReport> {
    let mut report = IntegrityReport::default();
    for r in PARENT_REFS {
        report.dangling.extend(dangling_rows(conn, r)?);
    }
    report.out_of_domain = out_of_domain_inspections(conn)?;

    for v in &report.dangling {
        log::warn!("Dangling reference: {v}");
    }
    if !report.out_of_domain.is_empty() {
        log::warn!(
            "{} out-of-domain inspection score(s)",
            report.out_of_domain.len()
        );
    }
    Ok(report)
}

pub async fn check(db: &Database) -> Result<IntegrityReport> {
    let report = db.reader().call(|conn| scan(conn)).await?;
    Ok(report)
}
