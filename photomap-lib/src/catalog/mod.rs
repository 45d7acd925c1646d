//! SQLite catalog of albums, an alternative to a directory of manifests.

use std::path::Path;

use displaydoc::Display;
use rusqlite::{Connection, MAIN_DB};
use slog::{debug, info, o, Discard, Logger};
use thiserror::Error;

use crate::{
    album::{AlbumCollection, AlbumLoader, TrackOverlay},
    photo::{retain_displayable, AlbumId, PhotoEntry, PhotoRecord},
    store::{
        album_sql::AlbumSql,
        converters::AlbumIdSql,
        photo_sql::{PhotoSearch, PhotoSql},
        track_sql::TrackSql,
    },
};

pub use crate::store::photo_sql::PhotoFilter;

#[cfg(test)]
mod tests;

#[derive(Debug, Error, Display)]
pub enum Error {
    /// rusqlite: {0}
    Rusqlite(#[from] rusqlite::Error),
}

pub struct Catalog {
    connection: Connection,
    logger: Logger,
}

impl Catalog {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, Error> {
        let connection = Connection::open(path)?;
        Self::new_impl(connection)
    }

    pub fn new_in_memory() -> Result<Self, Error> {
        let connection = Connection::open_in_memory()?;
        Self::new_impl(connection)
    }

    fn new_impl(connection: Connection) -> Result<Self, Error> {
        AlbumSql::create_table(&connection)?;
        PhotoSql::create_table(&connection)?;
        TrackSql::create_table(&connection)?;
        Ok(Self {
            connection,
            logger: Logger::root(Discard, o!()),
        })
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Stores an album, replacing whatever was stored under the same name. Albums without
    /// photos are kept so they are still listed.
    pub fn add_album(&mut self, collection: &AlbumCollection) -> Result<(), Error> {
        let album = AlbumIdSql::from(collection.id.clone());
        let transaction = self.connection.transaction()?;
        AlbumSql {
            name: album.clone(),
        }
        .insert(&transaction)?;
        let replaced = PhotoSql::delete_album(&transaction, &album)?;
        TrackSql::delete(&transaction, &album)?;
        for (position, photo) in collection.photos.iter().enumerate() {
            PhotoSql::from_record(album.clone(), position as i64, photo).insert(&transaction)?;
        }
        if let Some(overlay) = &collection.overlay {
            TrackSql {
                album: album.clone(),
                geojson: overlay.clone().into(),
            }
            .upsert(&transaction)?;
        }
        transaction.commit()?;
        info!(self.logger, "stored album";
            "album" => %collection.id,
            "photos" => collection.photos.len(),
            "replaced" => replaced,
            "overlay" => collection.overlay.is_some());
        Ok(())
    }

    pub fn photos(&self, filter: PhotoFilter) -> Result<Vec<PhotoRecord>, Error> {
        let mut search = PhotoSearch::new(&self.connection, filter)?;
        let entries = search
            .iter()?
            .map(|row| row.map(PhotoEntry::from))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(retain_displayable(entries, &self.logger))
    }

    pub fn backup(&self, dst_path: impl AsRef<Path>) -> Result<(), Error> {
        self.connection.backup(MAIN_DB, dst_path, None)?;
        debug!(self.logger, "backed up catalog");
        Ok(())
    }
}

impl AlbumLoader for Catalog {
    type Error = Error;

    fn album_ids(&self) -> Result<Vec<AlbumId>, Error> {
        Ok(AlbumSql::all(&self.connection)?
            .into_iter()
            .map(AlbumId::from)
            .collect())
    }

    fn load_album(&self, id: &AlbumId) -> Result<Vec<PhotoRecord>, Error> {
        self.photos(PhotoFilter::album(id.clone()))
    }

    fn load_track_overlay(&self, id: &AlbumId) -> Result<Option<TrackOverlay>, Error> {
        let album = AlbumIdSql::from(id.clone());
        Ok(TrackSql::get(&self.connection, &album)?.map(TrackOverlay::from))
    }
}
