use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A level of the administrative hierarchy, leaf first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    School,
    Block,
    District,
    State,
}

impl Level {
    pub const ALL: [Level; 4] = [Level::School, Level::Block, Level::District, Level::State];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::School => "school",
            Level::Block => "block",
            Level::District => "district",
            Level::State => "state",
        }
    }

    /// The hierarchy table holding this level's nodes.
    pub fn table(&self) -> &'static str {
        self.as_str()
    }

    /// Alias of this level's table inside the join chain.
    pub fn alias(&self) -> &'static str {
        match self {
            Level::School => "sc",
            Level::Block => "b",
            Level::District => "d",
            Level::State => "s",
        }
    }

    pub fn id_column(&self) -> &'static str {
        match self {
            Level::School => "school_id",
            Level::Block => "block_id",
            Level::District => "district_id",
            Level::State => "state_id",
        }
    }

    pub fn name_column(&self) -> &'static str {
        match self {
            Level::School => "school_name",
            Level::Block => "block_name",
            Level::District => "district_name",
            Level::State => "state_name",
        }
    }

    /// The level directly above, if any.
    pub fn parent(&self) -> Option<Level> {
        match self {
            Level::School => Some(Level::Block),
            Level::Block => Some(Level::District),
            Level::District => Some(Level::State),
            Level::State => None,
        }
    }

    /// Joins that lift a row aliased `sc` (school) up to this level.
    /// Facts always enter through their school, so every level sees the
    /// same people exactly once.
    pub fn join_chain(&self) -> &'static str {
        match self {
            Level::School => "",
            Level::Block => "JOIN block b ON b.block_id = sc.block_id",
            Level::District => {
                "JOIN block b ON b.block_id = sc.block_id
                 JOIN district d ON d.district_id = b.district_id"
            }
            Level::State => {
                "JOIN block b ON b.block_id = sc.block_id
                 JOIN district d ON d.district_id = b.district_id
                 JOIN state s ON s.state_id = d.state_id"
            }
        }
    }

    /// `alias.id, alias.name` for SELECT and GROUP BY lists.
    pub fn node_columns(&self) -> String {
        format!(
            "{a}.{id}, {a}.{name}",
            a = self.alias(),
            id = self.id_column(),
            name = self.name_column()
        )
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "school" => Ok(Level::School),
            "block" => Ok(Level::Block),
            "district" => Ok(Level::District),
            "state" => Ok(Level::State),
            other => Err(Error::InvalidLevel(format!(
                "{other} (expected school, block, district or state)"
            ))),
        }
    }
}

/// Every node of a level, by id.
pub fn node_universe(
    conn: &Connection,
    level: Level,
) -> Result<Vec<(i64, String)>, rusqlite::Error> {
    let sql = format!(
        "SELECT {id}, {name} FROM {table} ORDER BY {id}",
        id = level.id_column(),
        name = level.name_column(),
        table = level.table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

/// Node id → name of its parent node. Empty at the root level.
pub fn parent_names(
    conn: &Connection,
    level: Level,
) -> Result<HashMap<i64, String>, rusqlite::Error> {
    let Some(parent) = level.parent() else {
        return Ok(HashMap::new());
    };
    let sql = format!(
        "SELECT c.{id}, p.{pname}
         FROM {table} c
         JOIN {ptable} p ON p.{pid} = c.{pid}",
        id = level.id_column(),
        table = level.table(),
        pname = parent.name_column(),
        ptable = parent.table(),
        pid = parent.id_column()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use crate::testing::Fixture;

    #[test]
    fn test_parse_level() {
        assert_eq!("district".parse::<Level>().unwrap(), Level::District);
        assert_eq!(" State ".parse::<Level>().unwrap(), Level::State);
        assert!(matches!(
            "village".parse::<Level>(),
            Err(Error::InvalidLevel(_))
        ));
    }

    #[test]
    fn test_parent_chain_reaches_root() {
        let mut level = Level::School;
        let mut steps = 0;
        while let Some(parent) = level.parent() {
            level = parent;
            steps += 1;
        }
        assert_eq!(level, Level::State);
        assert_eq!(steps, 3);
    }

    #[test]
    fn test_join_chain_introduces_own_alias() {
        for level in Level::ALL {
            if level == Level::School {
                assert!(level.join_chain().is_empty());
            } else {
                let needle = format!("JOIN {} {} ON", level.table(), level.alias());
                assert!(level.join_chain().contains(&needle), "{level}");
            }
        }
    }

    #[tokio::test]
    async fn test_universe_and_parent_names() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                let mut f = Fixture::new(conn);
                let st = f.state("Karnataka")?;
                let d1 = f.district(st, "Mysuru")?;
                f.district(st, "Mandya")?;
                let b = f.block(d1, "Hunsur")?;
                f.school(b, "GHPS Hunsur")?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();

        let (districts, parents) = db
            .reader()
            .call(|conn| {
                Ok::<_, rusqlite::Error>((
                    node_universe(conn, Level::District)?,
                    parent_names(conn, Level::School)?,
                ))
            })
            .await
            .unwrap();

        let names: Vec<&str> = districts.iter().map(|(_, n)| n.as_str()).collect();
        assert_eq!(names, vec!["Mysuru", "Mandya"]);
        assert_eq!(parents.values().next().map(String::as_str), Some("Hunsur"));
    }
}
