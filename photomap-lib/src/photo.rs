//! Photo records as listed in album manifests.

use std::str::FromStr;

use derive_more::{Display, Into};
use displaydoc::Display as DisplayDoc;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, skip_serializing_none, DefaultOnError};
use slog::{debug, Logger};
use thiserror::Error;

/// Name of an album, as used for its manifest file and storage folder.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Into, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AlbumId(String);

#[derive(Debug, Error, DisplayDoc, PartialEq, Eq)]
/// invalid album name {0:?}: must be non-empty, not start with '.', and not contain path separators
pub struct InvalidAlbumId(pub String);

impl AlbumId {
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidAlbumId> {
        let name = name.into();
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(InvalidAlbumId(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human readable title, `july_9_trail_run` becomes `July 9 Trail Run`.
    pub fn title(&self) -> String {
        self.0
            .split(['_', '-'])
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<String>>()
            .join(" ")
    }
}

impl AsRef<str> for AlbumId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for AlbumId {
    type Err = InvalidAlbumId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A photo entry exactly as found in a manifest. Every field may be missing or malformed.
#[serde_as]
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PhotoEntry {
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub filename: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub path: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default, rename = "presignedUrl")]
    pub presigned_url: Option<String>,
}

#[derive(Debug, Error, DisplayDoc, Clone, PartialEq)]
pub enum Ineligible {
    /// photo has no filename
    MissingFilename,
    /// photo {0} has no storage path
    MissingPath(String),
    /// photo {filename} has invalid coordinates ({latitude:?}, {longitude:?})
    InvalidCoordinates {
        filename: String,
        latitude: Option<f64>,
        longitude: Option<f64>,
    },
}

/// One displayable photo: finite coordinates, non-empty filename and path.
///
/// The only mutation allowed after construction is attaching a display URL.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PhotoEntry", rename_all = "camelCase")]
pub struct PhotoRecord {
    filename: String,
    path: String,
    latitude: f64,
    longitude: f64,
    datetime: Option<String>,
    presigned_url: Option<String>,
}

impl PhotoRecord {
    pub fn new(
        filename: impl Into<String>,
        path: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Result<Self, Ineligible> {
        PhotoEntry {
            filename: Some(filename.into()),
            path: Some(path.into()),
            latitude: Some(latitude),
            longitude: Some(longitude),
            ..Default::default()
        }
        .try_into()
    }

    pub fn with_datetime(mut self, datetime: impl Into<String>) -> Self {
        self.datetime = Some(datetime.into());
        self
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn position(&self) -> LatLon {
        LatLon {
            lat: self.latitude,
            lon: self.longitude,
        }
    }

    pub fn datetime(&self) -> Option<&str> {
        self.datetime.as_deref()
    }

    pub fn presigned_url(&self) -> Option<&str> {
        self.presigned_url.as_deref()
    }

    pub fn attach_presigned_url(&mut self, url: String) {
        self.presigned_url = Some(url);
    }

    /// Drops the display URL, used before persisting a record.
    pub fn without_presigned_url(mut self) -> Self {
        self.presigned_url = None;
        self
    }
}

impl TryFrom<PhotoEntry> for PhotoRecord {
    type Error = Ineligible;

    fn try_from(entry: PhotoEntry) -> Result<Self, Self::Error> {
        let filename = entry
            .filename
            .filter(|f| !f.is_empty())
            .ok_or(Ineligible::MissingFilename)?;
        let Some(path) = entry.path.filter(|p| !p.is_empty()) else {
            return Err(Ineligible::MissingPath(filename));
        };
        let (latitude, longitude) = match (entry.latitude, entry.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => (lat, lon),
            (latitude, longitude) => {
                return Err(Ineligible::InvalidCoordinates {
                    filename,
                    latitude,
                    longitude,
                })
            }
        };
        Ok(Self {
            filename,
            path,
            latitude,
            longitude,
            datetime: entry.datetime,
            presigned_url: entry.presigned_url,
        })
    }
}

/// Converts manifest entries to records, dropping the ones that cannot be displayed.
pub fn retain_displayable(
    entries: impl IntoIterator<Item = PhotoEntry>,
    logger: &Logger,
) -> Vec<PhotoRecord> {
    entries
        .into_iter()
        .filter_map(|entry| match PhotoRecord::try_from(entry) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(logger, "dropping photo"; "reason" => %e);
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// Geographic bounding box of a set of photos.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub south_west: LatLon,
    pub north_east: LatLon,
}

impl Bounds {
    /// Returns `None` for an empty slice. The result does not depend on the order of `photos`.
    pub fn from_photos(photos: &[PhotoRecord]) -> Option<Self> {
        let first = photos.first()?.position();
        let mut bounds = Bounds {
            south_west: first,
            north_east: first,
        };
        for photo in &photos[1..] {
            bounds.south_west.lat = bounds.south_west.lat.min(photo.latitude);
            bounds.south_west.lon = bounds.south_west.lon.min(photo.longitude);
            bounds.north_east.lat = bounds.north_east.lat.max(photo.latitude);
            bounds.north_east.lon = bounds.north_east.lon.max(photo.longitude);
        }
        Some(bounds)
    }
}
