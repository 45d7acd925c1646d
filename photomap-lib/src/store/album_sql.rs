use rusqlite::{named_params, Connection, Error};

use super::converters::AlbumIdSql;

/// Low level type for interacting with album rows, one per stored album whether or not it has
/// photos
#[derive(Debug)]
pub(crate) struct AlbumSql {
    pub name: AlbumIdSql,
}

impl AlbumSql {
    pub fn create_table(conn: &Connection) -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS album (
                    name TEXT PRIMARY KEY NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    pub fn insert(&self, conn: &Connection) -> Result<(), Error> {
        conn.execute(
            "INSERT OR IGNORE INTO album (name) VALUES (:name)",
            named_params! { ":name": self.name },
        )?;
        Ok(())
    }

    pub fn all(conn: &Connection) -> Result<Vec<AlbumIdSql>, Error> {
        let mut stmt = conn.prepare("SELECT name FROM album ORDER BY name")?;
        let albums = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(albums)
    }
}
