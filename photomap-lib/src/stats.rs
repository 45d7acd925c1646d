//! Date and location summary of an album.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use photomap_util::CountByKey;
use serde::Serialize;

use crate::{
    chronology::{DateResolver, DateSource},
    photo::{Bounds, PhotoRecord},
};

#[derive(Debug, Serialize)]
pub struct AlbumStats {
    pub count: usize,
    /// Photos per calendar day in the resolver's zone; epoch fallbacks count as unknown.
    pub count_by_day: CountByKey<NaiveDate>,
    pub from_metadata: usize,
    pub from_filename: usize,
    pub epoch_fallbacks: usize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
    pub bounds: Option<Bounds>,
}

pub fn album_stats<Tz: TimeZone>(
    photos: &[PhotoRecord],
    resolver: &DateResolver<Tz>,
) -> AlbumStats {
    let mut stats = AlbumStats {
        count: photos.len(),
        count_by_day: CountByKey::default(),
        from_metadata: 0,
        from_filename: 0,
        epoch_fallbacks: 0,
        first: None,
        last: None,
        bounds: Bounds::from_photos(photos),
    };
    for photo in photos {
        let resolved = resolver.resolve_with_source(photo);
        match resolved.source {
            DateSource::Metadata => stats.from_metadata += 1,
            DateSource::Filename => stats.from_filename += 1,
            DateSource::EpochFallback => {
                stats.epoch_fallbacks += 1;
                stats.count_by_day.increment(None);
                continue;
            }
        }
        let day = resolved
            .instant
            .with_timezone(resolver.time_zone())
            .date_naive();
        stats.count_by_day.increment(Some(day));
        let instant = resolved.instant;
        stats.first = Some(stats.first.map_or(instant, |t| t.min(instant)));
        stats.last = Some(stats.last.map_or(instant, |t| t.max(instant)));
    }
    stats
}
