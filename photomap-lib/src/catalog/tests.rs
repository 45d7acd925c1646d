use anyhow::Result;
use serde_json::json;

use crate::album::{AlbumCollection, AlbumLoader, TrackOverlay};
use crate::catalog::{Catalog, PhotoFilter};
use crate::photo::{AlbumId, PhotoRecord};

fn album(name: &str, photos: &[(&str, Option<&str>)]) -> AlbumCollection {
    let id: AlbumId = name.parse().unwrap();
    AlbumCollection {
        photos: photos
            .iter()
            .enumerate()
            .map(|(i, (filename, datetime))| {
                let path = format!("photos/{id}/{filename}");
                let record = PhotoRecord::new(*filename, path, 40.0, -111.0 + i as f64).unwrap();
                match datetime {
                    Some(d) => record.with_datetime(*d),
                    None => record,
                }
            })
            .collect(),
        id,
        overlay: None,
    }
}

#[test]
fn add_album_preserves_manifest_order() -> Result<()> {
    let mut catalog = Catalog::new_in_memory()?;
    let trail = album(
        "trail_run",
        &[("z.jpg", Some("2025:07:09 10:00:00")), ("a.jpg", None), ("m.jpg", None)],
    );
    catalog.add_album(&trail)?;
    catalog.add_album(&album("roadtrip_2025", &[("x.jpg", None)]))?;

    assert_eq!(
        catalog.album_ids()?,
        vec!["roadtrip_2025".parse::<AlbumId>()?, "trail_run".parse()?]
    );
    assert_eq!(catalog.load_album(&trail.id)?, trail.photos);
    assert_eq!(catalog.photos(PhotoFilter::default())?.len(), 4);
    Ok(())
}

#[test]
fn re_adding_an_album_replaces_it() -> Result<()> {
    let mut catalog = Catalog::new_in_memory()?;
    let mut trail = album("trail_run", &[("a.jpg", None), ("b.jpg", None)]);
    trail.overlay = Some(TrackOverlay::try_from(json!({
        "type": "LineString",
        "coordinates": [[-111.0, 40.0], [-111.1, 40.1]]
    }))?);
    catalog.add_album(&trail)?;
    assert_eq!(catalog.load_track_overlay(&trail.id)?, trail.overlay);

    let smaller = album("trail_run", &[("c.jpg", None)]);
    catalog.add_album(&smaller)?;
    assert_eq!(catalog.load_album(&smaller.id)?, smaller.photos);
    assert_eq!(catalog.load_track_overlay(&smaller.id)?, None);
    Ok(())
}

#[test]
fn unknown_album_is_empty() -> Result<()> {
    let catalog = Catalog::new_in_memory()?;
    let id: AlbumId = "nothing_here".parse()?;
    assert!(catalog.load_album(&id)?.is_empty());
    assert_eq!(catalog.load_track_overlay(&id)?, None);
    Ok(())
}

#[test]
fn backup_can_be_reopened() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut catalog = Catalog::new_in_memory()?;
    let trail = album("trail_run", &[("a.jpg", Some("2025:07:09 10:00:00"))]);
    catalog.add_album(&trail)?;

    let path = dir.path().join("backup.db");
    catalog.backup(&path)?;
    let reopened = Catalog::new(&path)?;
    assert_eq!(reopened.load_album(&trail.id)?, trail.photos);
    Ok(())
}

#[test]
fn albums_without_photos_are_listed() -> Result<()> {
    let mut catalog = Catalog::new_in_memory()?;
    let mut tracked = album("trail_run", &[]);
    tracked.overlay = Some(TrackOverlay::try_from(json!({
        "type": "LineString",
        "coordinates": [[-111.0, 40.0], [-111.1, 40.1]]
    }))?);
    catalog.add_album(&tracked)?;
    catalog.add_album(&album("bare", &[]))?;
    catalog.add_album(&album("bare", &[]))?;

    assert_eq!(
        catalog.album_ids()?,
        vec!["bare".parse::<AlbumId>()?, "trail_run".parse()?]
    );
    assert!(catalog.load_album(&tracked.id)?.is_empty());
    assert_eq!(catalog.load_track_overlay(&tracked.id)?, tracked.overlay);
    Ok(())
}
