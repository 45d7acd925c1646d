//! Album loading: photo manifests and ground-track overlays.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use displaydoc::Display;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use slog::{debug, o, warn, Discard, Logger};
use thiserror::Error;

use crate::photo::{retain_displayable, AlbumId, PhotoEntry, PhotoRecord};

/// Overlay file looked up next to an album's photos.
pub const DEFAULT_OVERLAY_FILE_NAME: &str = "avenza.geojson";

const GEOJSON_TYPES: &[&str] = &[
    "FeatureCollection",
    "Feature",
    "Point",
    "MultiPoint",
    "LineString",
    "MultiLineString",
    "Polygon",
    "MultiPolygon",
    "GeometryCollection",
];

#[derive(Debug, Error, Display)]
pub enum Error {
    /// io error on {path}: {source}
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// invalid manifest {path}: {source}
    Manifest {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// invalid track overlay {path}: {source}
    Overlay {
        path: PathBuf,
        source: InvalidOverlay,
    },
    /// unknown album {0}
    UnknownAlbum(AlbumId),
}

#[derive(Debug, Error, Display)]
pub enum InvalidOverlay {
    /// not json: {0}
    Json(#[from] serde_json::Error),
    /// missing or unknown geojson type {0:?}
    UnknownType(Option<String>),
}

/// A GeoJSON document drawn with an album, typically a recorded track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct TrackOverlay(Value);

impl TrackOverlay {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, InvalidOverlay> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::try_from(value)
    }

    pub fn geojson_type(&self) -> &str {
        self.0["type"].as_str().unwrap_or_default()
    }

    pub fn feature_count(&self) -> usize {
        match self.geojson_type() {
            "FeatureCollection" => self.0["features"].as_array().map_or(0, Vec::len),
            _ => 1,
        }
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }
}

impl TryFrom<Value> for TrackOverlay {
    type Error = InvalidOverlay;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value.get("type").and_then(Value::as_str) {
            Some(t) if GEOJSON_TYPES.contains(&t) => Ok(Self(value)),
            other => Err(InvalidOverlay::UnknownType(other.map(str::to_string))),
        }
    }
}

impl From<TrackOverlay> for Value {
    fn from(overlay: TrackOverlay) -> Self {
        overlay.0
    }
}

/// Photos and overlay of one album, loaded and discarded as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct AlbumCollection {
    pub id: AlbumId,
    pub photos: Vec<PhotoRecord>,
    pub overlay: Option<TrackOverlay>,
}

impl AlbumCollection {
    pub fn empty(id: AlbumId) -> Self {
        Self {
            id,
            photos: Vec::new(),
            overlay: None,
        }
    }
}

/// Source of album data.
pub trait AlbumLoader {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Known albums in ascending name order.
    fn album_ids(&self) -> Result<Vec<AlbumId>, Self::Error>;

    /// Displayable photos of an album, in stored order.
    fn load_album(&self, id: &AlbumId) -> Result<Vec<PhotoRecord>, Self::Error>;

    fn load_track_overlay(&self, id: &AlbumId) -> Result<Option<TrackOverlay>, Self::Error>;
}

/// Loads an album, treating a failed photo load as an empty album and a failed overlay load as
/// no overlay.
pub fn load_collection<L: AlbumLoader + ?Sized>(
    loader: &L,
    id: &AlbumId,
    logger: &Logger,
) -> AlbumCollection {
    let photos = loader.load_album(id).unwrap_or_else(|e| {
        warn!(logger, "failed to load album photos"; "album" => %id, "error" => %e);
        Vec::new()
    });
    let overlay = loader.load_track_overlay(id).unwrap_or_else(|e| {
        warn!(logger, "failed to load track overlay"; "album" => %id, "error" => %e);
        None
    });
    AlbumCollection {
        id: id.clone(),
        photos,
        overlay,
    }
}

/// Directory of `<album>.json` manifests, each a JSON array of photos, with overlays stored as
/// `<album>/<overlay file name>`.
pub struct ManifestDir {
    root: PathBuf,
    overlay_file_name: String,
    logger: Logger,
}

impl ManifestDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            overlay_file_name: DEFAULT_OVERLAY_FILE_NAME.to_string(),
            logger: Logger::root(Discard, o!()),
        }
    }

    pub fn with_overlay_file_name(mut self, name: impl Into<String>) -> Self {
        self.overlay_file_name = name.into();
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn manifest_path(&self, id: &AlbumId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    fn overlay_path(&self, id: &AlbumId) -> PathBuf {
        self.root.join(id.as_str()).join(&self.overlay_file_name)
    }

    /// Writes the album's manifest and, when present, its overlay. Display URLs are not
    /// persisted.
    pub fn write_album(&self, collection: &AlbumCollection) -> Result<(), Error> {
        fs::create_dir_all(&self.root).map_err(|source| Error::Io {
            path: self.root.clone(),
            source,
        })?;
        let photos: Vec<PhotoRecord> = collection
            .photos
            .iter()
            .cloned()
            .map(PhotoRecord::without_presigned_url)
            .collect();
        let path = self.manifest_path(&collection.id);
        let json = serde_json::to_vec_pretty(&photos).map_err(|source| Error::Manifest {
            path: path.clone(),
            source,
        })?;
        write(&path, &json)?;

        if let Some(overlay) = &collection.overlay {
            let path = self.overlay_path(&collection.id);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|source| Error::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            let json = serde_json::to_vec(overlay).map_err(|source| Error::Manifest {
                path: path.clone(),
                source,
            })?;
            write(&path, &json)?;
        }
        debug!(self.logger, "wrote album manifest";
            "album" => %collection.id, "photos" => photos.len());
        Ok(())
    }
}

fn write(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    fs::write(path, bytes).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl AlbumLoader for ManifestDir {
    type Error = Error;

    fn album_ids(&self) -> Result<Vec<AlbumId>, Error> {
        let io_error = |source: std::io::Error| Error::Io {
            path: self.root.clone(),
            source,
        };
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") || !path.is_file() {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match AlbumId::new(stem) {
                Ok(id) => ids.push(id),
                Err(e) => debug!(self.logger, "skipping manifest"; "reason" => %e),
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn load_album(&self, id: &AlbumId) -> Result<Vec<PhotoRecord>, Error> {
        let path = self.manifest_path(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::UnknownAlbum(id.clone()))
            }
            Err(source) => return Err(Error::Io { path, source }),
        };
        let entries: Vec<PhotoEntry> =
            serde_json::from_slice(&bytes).map_err(|source| Error::Manifest {
                path: path.clone(),
                source,
            })?;
        let total = entries.len();
        let photos = retain_displayable(entries, &self.logger);
        debug!(self.logger, "loaded album";
            "album" => %id, "photos" => photos.len(), "dropped" => total - photos.len());
        Ok(photos)
    }

    fn load_track_overlay(&self, id: &AlbumId) -> Result<Option<TrackOverlay>, Error> {
        let path = self.overlay_path(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(Error::Io { path, source }),
        };
        TrackOverlay::from_slice(&bytes)
            .map(Some)
            .map_err(|source| Error::Overlay { path, source })
    }
}
