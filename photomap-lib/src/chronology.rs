//! Best-effort capture time of a photo.
//!
//! Resolution goes through three sources, most reliable first:
//!
//! 1. the embedded `datetime` (`YYYY:MM:DD HH:MM:SS`), with the date colons rewritten as hyphens
//! 2. a `YYYY-MM-DD HH-MM-SS` timestamp at the very start of the filename
//! 3. the Unix epoch, so unresolvable photos sort first
//!
//! Naive times are read in the resolver's time zone. Resolution never fails.

use std::sync::LazyLock;

use chrono::{
    DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc,
};
use regex::Regex;
use serde::Serialize;

use crate::photo::PhotoRecord;

static EXIF_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4}):(\d{2}):(\d{2}) ").expect("exif date regex is valid")
});

static FILENAME_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-(\d{2})-(\d{2}) (\d{2})-(\d{2})-(\d{2})")
        .expect("filename timestamp regex is valid")
});

/// Sort position of photos with no usable timestamp.
pub const EPOCH: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%.f%:z"];

/// Which source a resolved timestamp came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSource {
    Metadata,
    Filename,
    EpochFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDate {
    pub instant: DateTime<Utc>,
    pub source: DateSource,
}

#[derive(Debug, Clone)]
pub struct DateResolver<Tz = Local> {
    tz: Tz,
}

impl Default for DateResolver<Local> {
    fn default() -> Self {
        Self { tz: Local }
    }
}

impl<Tz: TimeZone> DateResolver<Tz> {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn time_zone(&self) -> &Tz {
        &self.tz
    }

    pub fn resolve(&self, photo: &PhotoRecord) -> DateTime<Utc> {
        self.resolve_with_source(photo).instant
    }

    pub fn resolve_with_source(&self, photo: &PhotoRecord) -> ResolvedDate {
        if let Some(instant) = photo.datetime().and_then(|raw| self.from_datetime(raw)) {
            return ResolvedDate {
                instant,
                source: DateSource::Metadata,
            };
        }
        if let Some(instant) = self.from_filename(photo.filename()) {
            return ResolvedDate {
                instant,
                source: DateSource::Filename,
            };
        }
        ResolvedDate {
            instant: EPOCH,
            source: DateSource::EpochFallback,
        }
    }

    /// Parses an embedded timestamp after rewriting its first `YYYY:MM:DD ` date as `YYYY-MM-DD `.
    pub fn from_datetime(&self, raw: &str) -> Option<DateTime<Utc>> {
        let rewritten = EXIF_DATE.replacen(raw, 1, "$1-$2-$3 ");
        let rewritten = rewritten.trim();

        if let Ok(t) = DateTime::parse_from_rfc3339(rewritten) {
            return Some(t.with_timezone(&Utc));
        }
        for format in OFFSET_FORMATS {
            if let Ok(t) = DateTime::<FixedOffset>::parse_from_str(rewritten, format) {
                return Some(t.with_timezone(&Utc));
            }
        }
        for format in NAIVE_FORMATS {
            if let Ok(t) = NaiveDateTime::parse_from_str(rewritten, format) {
                return self.localize(t);
            }
        }
        // a bare ISO date is a UTC midnight, as in browsers
        NaiveDate::parse_from_str(rewritten, "%Y-%m-%d")
            .ok()
            .map(|d| d.and_time(NaiveTime::MIN).and_utc())
    }

    /// Reads a `YYYY-MM-DD HH-MM-SS` prefix. Text anywhere else in the name is ignored.
    pub fn from_filename(&self, filename: &str) -> Option<DateTime<Utc>> {
        let captures = FILENAME_TIMESTAMP.captures(filename)?;
        let field = |i: usize| captures[i].parse::<u32>().ok();
        let year = captures[1].parse::<i32>().ok()?;
        let date = NaiveDate::from_ymd_opt(year, field(2)?, field(3)?)?;
        let time = NaiveTime::from_hms_opt(field(4)?, field(5)?, field(6)?)?;
        self.localize(date.and_time(time))
    }

    fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        // times skipped by a DST change move forward by the size of the gap
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| {
                let shifted = naive.checked_add_signed(TimeDelta::hours(1))?;
                self.tz.from_local_datetime(&shifted).earliest()
            })
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Resolves a photo's capture time in the local time zone.
pub fn resolve_date(photo: &PhotoRecord) -> DateTime<Utc> {
    DateResolver::default().resolve(photo)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo(filename: &str, datetime: Option<&str>) -> PhotoRecord {
        let record = PhotoRecord::new(filename, format!("photos/{filename}"), 40.0, -111.0)
            .expect("valid photo");
        match datetime {
            Some(d) => record.with_datetime(d),
            None => record,
        }
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn exif_datetime_matches_hyphenated_parse() {
        let resolver = DateResolver::new(Utc);
        let resolved = resolver.resolve_with_source(&photo("x.jpg", Some("2025:07:09 17:54:13")));
        assert_eq!(resolved.instant, utc(2025, 7, 9, 17, 54, 13));
        assert_eq!(resolved.source, DateSource::Metadata);
        assert_eq!(
            resolver.from_datetime("2025:07:09 17:54:13"),
            resolver.from_datetime("2025-07-09 17:54:13")
        );
    }

    #[test]
    fn exif_datetime_uses_resolver_zone() {
        let mountain = FixedOffset::west_opt(6 * 3600).unwrap();
        let resolver = DateResolver::new(mountain);
        assert_eq!(
            resolver.resolve(&photo("x.jpg", Some("2025:07:09 17:54:13"))),
            utc(2025, 7, 9, 23, 54, 13)
        );
    }

    #[test]
    fn default_resolver_reads_local_time() {
        let expected = Local
            .with_ymd_and_hms(2025, 7, 9, 17, 54, 13)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            resolve_date(&photo("x.jpg", Some("2025:07:09 17:54:13"))),
            expected
        );
    }

    #[test]
    fn explicit_offsets_are_honored() {
        let resolver = DateResolver::new(Utc);
        assert_eq!(
            resolver.from_datetime("2025:07:09 17:54:13-06:00"),
            Some(utc(2025, 7, 9, 23, 54, 13))
        );
        assert_eq!(
            resolver.from_datetime("2025-07-09T17:54:13Z"),
            Some(utc(2025, 7, 9, 17, 54, 13))
        );
    }

    #[test]
    fn only_date_colons_are_rewritten() {
        let resolver = DateResolver::new(Utc);
        // the time part keeps its colons, so a hyphenated time does not parse
        assert_eq!(resolver.from_datetime("2025:07:09 17-54-13"), None);
        assert_eq!(
            resolver.from_datetime("2025:07:09 17:54:13.250"),
            Some(utc(2025, 7, 9, 17, 54, 13) + TimeDelta::milliseconds(250))
        );
    }

    #[test]
    fn filename_timestamp_is_second_tier() {
        let resolver = DateResolver::new(Utc);
        let resolved = resolver.resolve_with_source(&photo("2025-07-09 17-56-18.webp", None));
        assert_eq!(resolved.instant, utc(2025, 7, 9, 17, 56, 18));
        assert_eq!(resolved.source, DateSource::Filename);
    }

    #[test]
    fn filename_timestamp_is_local_time() {
        let expected = Local
            .with_ymd_and_hms(2025, 7, 9, 17, 56, 18)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(resolve_date(&photo("2025-07-09 17-56-18.webp", None)), expected);
    }

    #[test]
    fn malformed_datetime_falls_through_to_filename() {
        let resolver = DateResolver::new(Utc);
        for bad in ["2025:07:09 25:99:99", "not a date", "", "2025:13:40 10:00:00"] {
            let resolved =
                resolver.resolve_with_source(&photo("2024-01-02 03-04-05 trail.jpg", Some(bad)));
            assert_eq!(resolved.source, DateSource::Filename, "input {bad:?}");
            assert_eq!(resolved.instant, utc(2024, 1, 2, 3, 4, 5));
        }
    }

    #[test]
    fn filename_timestamp_must_lead() {
        let resolver = DateResolver::new(Utc);
        assert_eq!(resolver.from_filename("IMG 2025-07-09 17-56-18.jpg"), None);
        assert_eq!(resolver.from_filename("2025-07-09.jpg"), None);
        assert_eq!(resolver.from_filename("2025-07-09 17:56:18.jpg"), None);
    }

    #[test]
    fn out_of_range_filename_fields_fall_back_to_epoch() {
        let resolver = DateResolver::new(Utc);
        for name in [
            "2025-13-09 17-56-18.jpg",
            "2025-02-30 10-00-00.jpg",
            "2025-07-09 24-00-00.jpg",
        ] {
            let resolved = resolver.resolve_with_source(&photo(name, None));
            assert_eq!(resolved.source, DateSource::EpochFallback, "input {name:?}");
            assert_eq!(resolved.instant, EPOCH);
        }
    }

    #[test]
    fn unresolvable_photo_is_epoch() {
        let resolver = DateResolver::new(Utc);
        assert_eq!(
            resolver.resolve(&photo("IMG_0001.jpg", Some("garbage"))),
            utc(1970, 1, 1, 0, 0, 0)
        );
        assert_eq!(resolve_date(&photo("IMG_0001.jpg", None)), EPOCH);
    }

    #[test]
    fn skipped_local_times_move_forward_an_hour() {
        // 02:00 to 03:00 does not exist in Denver on 2025-03-09
        let resolver = DateResolver::new(chrono_tz::America::Denver);
        let expected = Some(utc(2025, 3, 9, 9, 30, 0));
        assert_eq!(resolver.from_datetime("2025:03:09 02:30:00"), expected);
        assert_eq!(resolver.from_filename("2025-03-09 02-30-00.jpg"), expected);
        assert_eq!(resolver.from_datetime("2025:03:09 03:30:00"), expected);
    }

    #[test]
    fn repeated_local_times_take_the_earlier_instant() {
        // 01:00 to 02:00 happens twice in Denver on 2025-11-02, first at UTC-6
        let resolver = DateResolver::new(chrono_tz::America::Denver);
        let expected = Some(utc(2025, 11, 2, 7, 30, 0));
        assert_eq!(resolver.from_datetime("2025:11:02 01:30:00"), expected);
        assert_eq!(resolver.from_filename("2025-11-02 01-30-00 hike.jpg"), expected);
        assert_eq!(
            resolver.from_datetime("2025:11:02 02:30:00"),
            Some(utc(2025, 11, 2, 9, 30, 0))
        );
    }

    #[test]
    fn bare_date_is_utc_midnight() {
        let resolver = DateResolver::new(FixedOffset::east_opt(9 * 3600).unwrap());
        assert_eq!(
            resolver.from_datetime("2025:07:09 "),
            Some(utc(2025, 7, 9, 0, 0, 0))
        );
    }
}
