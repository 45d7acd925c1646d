//! Chronological ordering shared by the map and the gallery.

use chrono::{DateTime, Local, TimeZone, Utc};

use crate::chronology::DateResolver;
use crate::photo::PhotoRecord;

#[derive(Debug, Clone)]
pub struct Sequencer<Tz = Local> {
    resolver: DateResolver<Tz>,
}

impl Default for Sequencer<Local> {
    fn default() -> Self {
        Self::new(DateResolver::default())
    }
}

impl<Tz: TimeZone> Sequencer<Tz> {
    pub fn new(resolver: DateResolver<Tz>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &DateResolver<Tz> {
        &self.resolver
    }

    /// Returns the photos ordered earliest first, leaving `photos` untouched.
    ///
    /// Photos with equal timestamps, including every photo that fell back to the epoch, keep
    /// their relative input order.
    pub fn sequence(&self, photos: &[PhotoRecord]) -> Vec<PhotoRecord> {
        self.order(photos.iter()).into_iter().cloned().collect()
    }

    /// Same ordering as [`Sequencer::sequence`] for an owned batch.
    pub fn sequence_owned(&self, photos: Vec<PhotoRecord>) -> Vec<PhotoRecord> {
        let mut keyed: Vec<(DateTime<Utc>, PhotoRecord)> = photos
            .into_iter()
            .map(|photo| (self.resolver.resolve(&photo), photo))
            .collect();
        keyed.sort_by_key(|(instant, _)| *instant);
        keyed.into_iter().map(|(_, photo)| photo).collect()
    }

    fn order<'a>(&self, photos: impl Iterator<Item = &'a PhotoRecord>) -> Vec<&'a PhotoRecord> {
        // resolve once per photo; `sort_by_key` is stable
        let mut keyed: Vec<(DateTime<Utc>, &PhotoRecord)> = photos
            .map(|photo| (self.resolver.resolve(photo), photo))
            .collect();
        keyed.sort_by_key(|(instant, _)| *instant);
        keyed.into_iter().map(|(_, photo)| photo).collect()
    }
}

/// Orders photos chronologically, reading naive timestamps as local time.
pub fn sequence(photos: &[PhotoRecord]) -> Vec<PhotoRecord> {
    Sequencer::default().sequence(photos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_yaml_snapshot;

    fn photo(filename: &str, datetime: Option<&str>) -> PhotoRecord {
        let record = PhotoRecord::new(filename, format!("photos/{filename}"), 40.0, -111.0)
            .expect("valid photo");
        match datetime {
            Some(d) => record.with_datetime(d),
            None => record,
        }
    }

    fn names(photos: &[PhotoRecord]) -> Vec<&str> {
        photos.iter().map(PhotoRecord::filename).collect()
    }

    fn utc_sequencer() -> Sequencer<Utc> {
        Sequencer::new(DateResolver::new(Utc))
    }

    #[test]
    fn empty_and_single() {
        assert!(sequence(&[]).is_empty());
        let only = photo("a.jpg", None);
        assert_eq!(sequence(std::slice::from_ref(&only)), vec![only]);
    }

    #[test]
    fn orders_by_embedded_datetime() {
        let input = vec![
            photo("b.jpg", Some("2025:01:02 10:00:00")),
            photo("a.jpg", Some("2025:01:01 09:00:00")),
        ];
        let ordered = sequence(&input);
        assert_yaml_snapshot!(names(&ordered), @r###"
        - a.jpg
        - b.jpg
        "###);
        // input is left as it was
        assert_eq!(names(&input), ["b.jpg", "a.jpg"]);
    }

    #[test]
    fn mixes_sources_and_keeps_epoch_photos_first_in_input_order() {
        let input = vec![
            photo("2025-07-09 17-56-18.webp", None),
            photo("no-date-2.jpg", None),
            photo("summit.jpg", Some("2025:07:09 12:00:00")),
            photo("no-date-1.jpg", Some("broken")),
            photo("trailhead.jpg", Some("2025:07:09 07:30:00")),
        ];
        let ordered = utc_sequencer().sequence(&input);
        assert_eq!(
            names(&ordered),
            [
                "no-date-2.jpg",
                "no-date-1.jpg",
                "trailhead.jpg",
                "summit.jpg",
                "2025-07-09 17-56-18.webp",
            ]
        );
    }

    #[test]
    fn equal_timestamps_keep_input_order() {
        let input = vec![
            photo("second.jpg", Some("2025:01:01 09:00:00")),
            photo("first.jpg", Some("2025:01:01 09:00:00")),
            photo("2025-01-01 09-00-00.jpg", None),
        ];
        let ordered = utc_sequencer().sequence(&input);
        assert_eq!(
            names(&ordered),
            ["second.jpg", "first.jpg", "2025-01-01 09-00-00.jpg"]
        );
    }

    #[test]
    fn output_is_a_permutation_regardless_of_input_order() {
        let base = vec![
            photo("c.jpg", Some("2025:03:01 00:00:00")),
            photo("a.jpg", Some("2025:01:01 00:00:00")),
            photo("2025-02-01 00-00-00.jpg", None),
            photo("d.jpg", None),
        ];
        let sequencer = utc_sequencer();
        let expected = ["d.jpg", "a.jpg", "2025-02-01 00-00-00.jpg", "c.jpg"];
        for rotation in 0..base.len() {
            let mut input = base.clone();
            input.rotate_left(rotation);
            let ordered = sequencer.sequence(&input);
            assert_eq!(ordered.len(), input.len());
            assert_eq!(names(&ordered), expected);
        }
    }

    #[test]
    fn owned_and_borrowed_orders_agree() {
        let input = vec![
            photo("late.jpg", Some("2025:05:05 05:05:05")),
            photo("undated.jpg", None),
            photo("early.jpg", Some("2020:01:01 00:00:00")),
        ];
        let sequencer = utc_sequencer();
        assert_eq!(
            sequencer.sequence(&input),
            sequencer.sequence_owned(input.clone())
        );
    }
}
