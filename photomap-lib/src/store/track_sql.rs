use rusqlite::{named_params, Connection, Error, OptionalExtension};

use super::converters::{AlbumIdSql, TrackOverlaySql};

/// Low level type for interacting with track overlay rows
#[derive(Debug)]
pub(crate) struct TrackSql {
    pub album: AlbumIdSql,
    pub geojson: TrackOverlaySql,
}

impl TrackSql {
    pub fn create_table(conn: &Connection) -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS track (
                    album TEXT PRIMARY KEY NOT NULL,
                    geojson TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    pub fn upsert(&self, conn: &Connection) -> Result<(), Error> {
        conn.execute(
            "INSERT INTO track (album, geojson) VALUES (:album, :geojson) \
            ON CONFLICT (album) DO UPDATE SET geojson = excluded.geojson",
            named_params! {
                ":album": self.album,
                ":geojson": self.geojson,
            },
        )?;
        Ok(())
    }

    pub fn delete(conn: &Connection, album: &AlbumIdSql) -> Result<usize, Error> {
        conn.execute(
            "DELETE FROM track WHERE album = :album",
            named_params! { ":album": album },
        )
    }

    pub fn get(conn: &Connection, album: &AlbumIdSql) -> Result<Option<TrackOverlaySql>, Error> {
        conn.query_row(
            "SELECT geojson FROM track WHERE album = :album",
            named_params! { ":album": album },
            |row| row.get(0),
        )
        .optional()
    }
}
