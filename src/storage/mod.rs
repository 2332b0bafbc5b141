pub mod repository;
pub mod schema;

use rusqlite_migration::{Migrations, M};

use crate::error::{Error, Result};

/// Database wraps two `tokio_rusqlite::Connection` instances (writer + reader)
/// using WAL mode for concurrent access. The writer serializes writes via
/// `tokio_rusqlite`'s internal channel; the reader can proceed without blocking.
#[derive(Clone)]
pub struct Database {
    writer: tokio_rusqlite::Connection,
    reader: tokio_rusqlite::Connection,
}

impl Database {
    /// Open the database at the default path (`~/.schoolkpi/schoolkpi.db`).
    pub async fn open() -> Result<Self> {
        let dir = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?
            .join(".schoolkpi");
        std::fs::create_dir_all(&dir).map_err(|e| Error::Config(e.to_string()))?;
        Self::open_at(dir.join("schoolkpi.db")).await
    }

    /// Open the database at the given path.
    pub async fn open_at(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        log::debug!("Opening warehouse at {}", path.display());

        let writer = tokio_rusqlite::Connection::open(&path).await?;
        Self::init_writer(&writer).await?;

        let reader = tokio_rusqlite::Connection::open(&path).await?;
        Self::init_reader(&reader).await?;

        Ok(Self { writer, reader })
    }

    /// Open an in-memory database (for testing).
    pub async fn open_memory() -> Result<Self> {
        let writer = tokio_rusqlite::Connection::open_in_memory().await?;
        Self::init_writer(&writer).await?;

        // For in-memory, we share the same connection for reader/writer
        // since in-memory DBs are per-connection.
        Ok(Self {
            reader: writer.clone(),
            writer,
        })
    }

    async fn init_writer(conn: &tokio_rusqlite::Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;\
                 PRAGMA foreign_keys=ON;\
                 PRAGMA busy_timeout=5000;",
            )
            .map_err(|e| e.to_string())?;
            migrations().to_latest(conn).map_err(|e| e.to_string())?;
            Ok::<(), String>(())
        })
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn init_reader(conn: &tokio_rusqlite::Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;\
                 PRAGMA foreign_keys=ON;\
                 PRAGMA busy_timeout=5000;",
            )?;
            Ok::<(), rusqlite::Error>(())
        })
        .await?;
        Ok(())
    }

    /// Get a reference to the writer connection.
    pub fn writer(&self) -> &tokio_rusqlite::Connection {
        &self.writer
    }

    /// Get a reference to the reader connection.
    pub fn reader(&self) -> &tokio_rusqlite::Connection {
        &self.reader
    }
}

fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(include_str!("migrations/001_initial.sql")),
        M::up(include_str!("migrations/002_kpi_views.sql")),
        M::up(include_str!("migrations/003_snapshots_and_reports.sql")),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn sqlite_objects(db: &Database, kind: &'static str) -> Vec<String> {
        db.reader()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = ?1 ORDER BY name",
                )?;
                let rows = stmt.query_map([kind], |row| row.get(0))?;
                Ok::<Vec<String>, rusqlite::Error>(rows.filter_map(|r| r.ok()).collect())
            })
            .await
            .unwrap()
    }

    #[test]
    fn test_migrations_validate() {
        assert!(migrations().validate().is_ok());
    }

    #[tokio::test]
    async fn test_open_memory() {
        let db = Database::open_memory().await.unwrap();
        let tables = sqlite_objects(&db, "table").await;

        for t in [
            "state",
            "district",
            "block",
            "school",
            "student",
            "teacher",
            "student_attendance",
            "teacher_attendance",
            "exam_result",
            "sports_participation",
            "activity_participation",
            "inspection",
            "app_config",
            "kpi_snapshots",
            "analysis_reports",
        ] {
            assert!(tables.contains(&t.to_string()), "missing table {t}");
        }
    }

    #[tokio::test]
    async fn test_kpi_views_created() {
        let db = Database::open_memory().await.unwrap();
        let views = sqlite_objects(&db, "view").await;

        for level in ["district", "state"] {
            for suffix in [
                "student_attendance_kpi",
                "exam_pass_kpi",
                "sports_participation_kpi",
                "activity_engagement_kpi",
                "teacher_attendance_kpi",
                "inspection_kpi",
                "composite_kpi",
            ] {
                let name = format!("{level}_{suffix}");
                assert!(views.contains(&name), "missing view {name}");
            }
        }
    }

    #[tokio::test]
    async fn test_open_at_file_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kpi.db");

        {
            let db = Database::open_at(&path).await.unwrap();
            db.writer()
                .call(|conn| {
                    repository::set_config(conn, "kpi_anchor", "attendance")?;
                    Ok::<(), rusqlite::Error>(())
                })
                .await
                .unwrap();
        }

        // Migrations must be a no-op the second time around.
        let db = Database::open_at(&path).await.unwrap();
        let val = db
            .reader()
            .call(|conn| repository::get_config(conn, "kpi_anchor"))
            .await
            .unwrap();
        assert_eq!(val, Some("attendance".to_string()));
    }
}
