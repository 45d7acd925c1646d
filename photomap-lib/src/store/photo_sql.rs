use const_format::formatcp;
use rusqlite::{named_params, Connection, Error, Row, Statement, ToSql};

use super::converters::AlbumIdSql;
use crate::photo::{PhotoEntry, PhotoRecord};

const COLUMNS: &str = "album, position, filename, path, latitude, longitude, datetime";

/// Low level type for interacting with photo rows
#[derive(Debug)]
pub(crate) struct PhotoSql {
    pub album: AlbumIdSql,
    /// Index of the photo in its album, keeps the manifest order stable.
    pub position: i64,
    pub filename: String,
    pub path: String,
    pub latitude: f64,
    pub longitude: f64,
    pub datetime: Option<String>,
}

#[derive(Default)]
pub struct PhotoFilter {
    pub(crate) album: Option<AlbumIdSql>,
}

impl PhotoFilter {
    pub fn album(album: crate::photo::AlbumId) -> Self {
        Self {
            album: Some(album.into()),
        }
    }

    /// Convert the photo filters into a type that can impl `Params`.
    ///
    /// We cannot impl `Params` directly because it is sealed and we cannot use `named_params`
    /// because we do not know at compile time which params will be set.
    fn to_params(&self) -> Vec<(&'static str, &dyn ToSql)> {
        let mut result = Vec::new();
        if let Some(album) = &self.album {
            result.push((":album", album as &dyn ToSql))
        }
        result
    }
}

pub(crate) struct PhotoSearch<'conn> {
    statement: Statement<'conn>,
    filter: PhotoFilter,
}

impl PhotoSql {
    pub fn create_table(conn: &Connection) -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS photo (
                    album TEXT NOT NULL,
                    position INTEGER NOT NULL,
                    filename TEXT NOT NULL,
                    path TEXT NOT NULL,
                    latitude REAL NOT NULL,
                    longitude REAL NOT NULL,
                    datetime TEXT,
                    UNIQUE (album, filename)
            )",
            [],
        )?;
        Ok(())
    }

    pub fn from_record(album: AlbumIdSql, position: i64, record: &PhotoRecord) -> Self {
        Self {
            album,
            position,
            filename: record.filename().to_string(),
            path: record.path().to_string(),
            latitude: record.latitude(),
            longitude: record.longitude(),
            datetime: record.datetime().map(str::to_string),
        }
    }

    pub fn insert(&self, conn: &Connection) -> Result<i64, Error> {
        let mut stmt = conn.prepare(formatcp!(
            "INSERT INTO photo ({COLUMNS}) \
            VALUES (:album, :position, :filename, :path, :latitude, :longitude, :datetime)"
        ))?;
        stmt.insert(named_params! {
            ":album": self.album,
            ":position": self.position,
            ":filename": self.filename,
            ":path": self.path,
            ":latitude": self.latitude,
            ":longitude": self.longitude,
            ":datetime": self.datetime,
        })
    }

    pub fn delete_album(conn: &Connection, album: &AlbumIdSql) -> Result<usize, Error> {
        conn.execute(
            "DELETE FROM photo WHERE album = :album",
            named_params! { ":album": album },
        )
    }
}

impl From<PhotoSql> for PhotoEntry {
    fn from(value: PhotoSql) -> Self {
        Self {
            filename: Some(value.filename),
            path: Some(value.path),
            latitude: Some(value.latitude),
            longitude: Some(value.longitude),
            datetime: value.datetime,
            presigned_url: None,
        }
    }
}

impl<'conn> PhotoSearch<'conn> {
    pub fn new(conn: &'conn Connection, filter: PhotoFilter) -> Result<Self, Error> {
        let statement = match &filter.album {
            Some(_) => conn.prepare(formatcp!(
                "SELECT {COLUMNS} FROM photo \
                    WHERE album = :album \
                    ORDER BY position"
            ))?,
            None => conn.prepare(formatcp!(
                "SELECT {COLUMNS} FROM photo \
                    ORDER BY album, position"
            ))?,
        };
        Ok(PhotoSearch { statement, filter })
    }

    pub fn iter(&mut self) -> Result<impl Iterator<Item = Result<PhotoSql, Error>> + '_, Error> {
        let params = self.filter.to_params();
        let iter = self
            .statement
            .query_map(params.as_slice(), |row| PhotoSql::try_from(row))?;
        Ok(iter)
    }
}

impl TryFrom<&Row<'_>> for PhotoSql {
    type Error = Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            album: row.get(0)?,
            position: row.get(1)?,
            filename: row.get(2)?,
            path: row.get(3)?,
            latitude: row.get(4)?,
            longitude: row.get(5)?,
            datetime: row.get(6)?,
        })
    }
}
