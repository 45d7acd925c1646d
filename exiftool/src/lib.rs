use displaydoc::Display;
use serde::{Deserialize, Serialize};
use slog::{debug, warn, Logger};
use std::{
    collections::VecDeque,
    path::Path,
    process::{Command, ExitStatus},
};
use thiserror::Error;

/// Tags requested from exiftool. `-n` keeps GPS values as signed decimal degrees.
const TAGS: &[&str] = &[
    "-DateTimeOriginal",
    "-CreateDate",
    "-ModifyDate",
    "-GPSLatitude",
    "-GPSLongitude",
];

#[derive(Error, Debug, Display)]
pub enum Error {
    /// exiftool returned failed status code: {0}
    ExiftoolCommandFailed(ExitStatus),
    /// io: {0}
    Io(#[from] std::io::Error),
    /// no exif data found
    MissingExifData,
    /// serde_json: {0}
    JsonParseError(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ExiftoolData {
    #[serde(rename = "DateTimeOriginal", deserialize_with = "deserialize_text", default)]
    pub date_time_original: Option<String>,
    #[serde(rename = "CreateDate", deserialize_with = "deserialize_text", default)]
    pub create_date: Option<String>,
    #[serde(rename = "ModifyDate", deserialize_with = "deserialize_text", default)]
    pub modify_date: Option<String>,
    #[serde(rename = "GPSLatitude", deserialize_with = "deserialize_degrees", default)]
    pub gps_latitude: Option<f64>,
    #[serde(rename = "GPSLongitude", deserialize_with = "deserialize_degrees", default)]
    pub gps_longitude: Option<f64>,
}

impl ExiftoolData {
    pub fn get(path: &Path, logger: &Logger) -> Result<ExiftoolData, Error> {
        let output = Command::new("exiftool")
            .arg("-json")
            .arg("-n")
            .args(TAGS)
            .arg(path)
            .output()?;
        if !output.status.success() {
            return Err(Error::ExiftoolCommandFailed(output.status));
        }
        let data = Self::from_json(&output.stdout, path, logger)?;
        debug!(logger, "read metadata with exiftool"; "path" => %path.display());
        Ok(data)
    }

    fn from_json(json: &[u8], path: &Path, logger: &Logger) -> Result<ExiftoolData, Error> {
        let mut exiftool_data_list = serde_json::from_slice::<VecDeque<ExiftoolData>>(json)?;
        let first = exiftool_data_list.pop_front();
        if !exiftool_data_list.is_empty() {
            warn!(logger, "multiple exif data returned, ignoring all but first";
                "path" => %path.display());
        }
        first.ok_or(Error::MissingExifData)
    }

    /// The capture timestamp in exif form (`YYYY:MM:DD HH:MM:SS`), preferring the original
    /// capture time over later edits.
    pub fn datetime(&self) -> Option<&str> {
        self.date_time_original
            .as_deref()
            .or(self.create_date.as_deref())
            .or(self.modify_date.as_deref())
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.gps_latitude, self.gps_longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Number(f64),
}

fn deserialize_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = <Option<String>>::deserialize(deserializer)?;
    // exiftool reports unset dates as all zeros
    Ok(s.filter(|s| !s.trim().is_empty() && !s.starts_with("0000:00:00")))
}

fn deserialize_degrees<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = <Option<TextOrNumber>>::deserialize(deserializer)?;
    Ok(match value {
        Some(TextOrNumber::Number(n)) => Some(n),
        Some(TextOrNumber::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}
