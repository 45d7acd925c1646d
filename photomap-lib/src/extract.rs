//! Builds albums from a folder of photos: one album per subdirectory, GPS and capture time
//! read from EXIF.

use std::{
    collections::HashSet,
    fs::{self, File},
    io::BufReader,
    path::Path,
};

use displaydoc::Display;
use exif::{In, Tag, Value};
use exiftool::ExiftoolData;
use file_format::{FileFormat, Kind};
use slog::{debug, info, o, warn, Discard, Logger};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

use crate::{
    album::{AlbumCollection, TrackOverlay, DEFAULT_OVERLAY_FILE_NAME},
    photo::{AlbumId, PhotoRecord},
};

#[derive(Debug, Error, Display)]
pub enum Error {
    /// io: {0}
    Io(#[from] std::io::Error),
    /// walkdir: {0}
    Walkdir(#[from] walkdir::Error),
}

#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Prefix of every photo's storage path, `<prefix>/<album>/<filename>`.
    pub storage_prefix: String,
    pub overlay_file_name: String,
    /// Ask the `exiftool` binary when the built-in EXIF reader finds no GPS position.
    pub use_exiftool: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            storage_prefix: "photos".to_string(),
            overlay_file_name: DEFAULT_OVERLAY_FILE_NAME.to_string(),
            use_exiftool: false,
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct PhotoMetadata {
    datetime: Option<String>,
    coordinates: Option<(f64, f64)>,
}

pub struct Extractor {
    config: ExtractConfig,
    logger: Logger,
}

impl Extractor {
    pub fn new(config: ExtractConfig) -> Self {
        Self {
            config,
            logger: Logger::root(Discard, o!()),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Every non-hidden subdirectory of `photos_root` becomes an album, in name order.
    pub fn extract_albums(&self, photos_root: &Path) -> Result<Vec<AlbumCollection>, Error> {
        let mut dirs = Vec::new();
        for entry in fs::read_dir(photos_root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match AlbumId::new(name) {
                Ok(id) => dirs.push((id, entry.path())),
                Err(e) => debug!(self.logger, "skipping directory"; "reason" => %e),
            }
        }
        dirs.sort();
        dirs.into_iter()
            .map(|(id, dir)| self.extract_album(id, &dir))
            .collect()
    }

    pub fn extract_album(&self, id: AlbumId, dir: &Path) -> Result<AlbumCollection, Error> {
        let mut photos = Vec::new();
        let mut seen = HashSet::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() || entry.file_name() == self.overlay_file_name() {
                continue;
            }
            match self.file_to_photo(&entry, &id) {
                Ok(Some(photo)) => {
                    if seen.insert(photo.filename().to_string()) {
                        photos.push(photo);
                    } else {
                        warn!(self.logger, "duplicate filename in album, keeping the first";
                            "album" => %id, "path" => %entry.path().display());
                    }
                }
                Ok(None) => (),
                Err(e) => {
                    warn!(self.logger, "failed to process file";
                        "path" => %entry.path().display(), "error" => %e)
                }
            }
        }
        let overlay = self.read_overlay(&dir.join(&self.config.overlay_file_name));
        info!(self.logger, "extracted album";
            "album" => %id, "photos" => photos.len(), "overlay" => overlay.is_some());
        Ok(AlbumCollection {
            id,
            photos,
            overlay,
        })
    }

    fn overlay_file_name(&self) -> &std::ffi::OsStr {
        self.config.overlay_file_name.as_ref()
    }

    fn read_overlay(&self, path: &Path) -> Option<TrackOverlay> {
        let bytes = fs::read(path).ok()?;
        TrackOverlay::from_slice(&bytes)
            .map_err(|e| {
                warn!(self.logger, "ignoring invalid track overlay";
                    "path" => %path.display(), "error" => %e)
            })
            .ok()
    }

    /// Returns `None` for files that are not images or carry no GPS position.
    fn file_to_photo(
        &self,
        entry: &DirEntry,
        album: &AlbumId,
    ) -> Result<Option<PhotoRecord>, Error> {
        let path = entry.path();
        let format = FileFormat::from_file(path)?;
        if format.kind() != Kind::Image {
            return Ok(None);
        }

        let mut metadata = read_exif(path).unwrap_or_default();
        if metadata.coordinates.is_none() && self.config.use_exiftool {
            match ExiftoolData::get(path, &self.logger) {
                Ok(data) => {
                    metadata.coordinates = data.coordinates();
                    if metadata.datetime.is_none() {
                        metadata.datetime = data.datetime().map(str::to_string);
                    }
                }
                Err(e) => debug!(self.logger, "exiftool failed";
                    "path" => %path.display(), "error" => %e),
            }
        }
        let Some((latitude, longitude)) = metadata.coordinates else {
            debug!(self.logger, "no gps position"; "path" => %path.display());
            return Ok(None);
        };

        let filename = entry.file_name().to_string_lossy().into_owned();
        let storage_path = format!(
            "{}/{album}/{filename}",
            self.config.storage_prefix.trim_end_matches('/')
        );
        match PhotoRecord::new(filename, storage_path, latitude, longitude) {
            Ok(photo) => Ok(Some(match metadata.datetime {
                Some(datetime) => photo.with_datetime(datetime),
                None => photo,
            })),
            Err(e) => {
                debug!(self.logger, "skipping photo"; "reason" => %e);
                Ok(None)
            }
        }
    }
}

fn read_exif(path: &Path) -> Option<PhotoMetadata> {
    let file = File::open(path).ok()?;
    let mut bufreader = BufReader::new(&file);
    let exif = exif::Reader::new().read_from_container(&mut bufreader).ok()?;
    Some(metadata_from_exif(&exif))
}

fn metadata_from_exif(exif: &exif::Exif) -> PhotoMetadata {
    let datetime = [Tag::DateTime, Tag::DateTimeOriginal]
        .into_iter()
        .find_map(|tag| exif.get_field(tag, In::PRIMARY).and_then(|f| ascii(&f.value)));
    let coordinates = match (
        coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, b'S'),
        coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, b'W'),
    ) {
        (Some(lat), Some(lon)) => Some((lat, lon)),
        _ => None,
    };
    PhotoMetadata {
        datetime,
        coordinates,
    }
}

/// The raw text of an ASCII field, so dates keep their `YYYY:MM:DD HH:MM:SS` form.
fn ascii(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

/// Degrees/minutes/seconds to signed decimal degrees.
fn coordinate(exif: &exif::Exif, tag: Tag, ref_tag: Tag, negative_ref: u8) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let Value::Rational(ref dms) = field.value else {
        return None;
    };
    let [degrees, minutes, seconds] = dms.get(..3)? else {
        return None;
    };
    let value = degrees.to_f64() + minutes.to_f64() / 60.0 + seconds.to_f64() / 3600.0;
    let negative = exif
        .get_field(ref_tag, In::PRIMARY)
        .and_then(|f| ascii(&f.value))
        .is_some_and(|r| r.as_bytes().first() == Some(&negative_ref));
    let value = if negative { -value } else { value };
    value.is_finite().then_some(value)
}
