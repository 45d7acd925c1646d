//! Toolkit independent presentation: render plans and the view controller.
//!
//! The controller owns all view state and publishes [`ViewEvent`]s to subscribers. Every album
//! switch starts with [`ViewEvent::Cleared`], so a renderer drops prior markers and overlays
//! before anything new arrives.

use std::sync::mpsc::{channel, Receiver, Sender};

use chrono::{Local, TimeZone};
use serde::Serialize;
use slog::{debug, info, o, warn, Discard, Logger};

use crate::{
    album::{AlbumCollection, AlbumLoader, TrackOverlay},
    gate::{attach_display_urls, AccessGate, GateError, SessionToken},
    photo::{AlbumId, Bounds, LatLon, PhotoRecord},
    sequence::Sequencer,
};

pub const SINGLE_PHOTO_ZOOM: u8 = 15;
pub const FIT_PADDING: u32 = 20;
pub const NO_PHOTOS_MESSAGE: &str = "No photos with GPS data found in this album";
pub const NO_ALBUM_MESSAGE: &str = "Select an album to view photos";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Viewport {
    Centered { center: LatLon, zoom: u8 },
    Fit { bounds: Bounds, padding: u32 },
}

impl Viewport {
    pub fn for_photos(photos: &[PhotoRecord]) -> Option<Self> {
        match photos {
            [] => None,
            [only] => Some(Viewport::Centered {
                center: only.position(),
                zoom: SINGLE_PHOTO_ZOOM,
            }),
            _ => Bounds::from_photos(photos).map(|bounds| Viewport::Fit {
                bounds,
                padding: FIT_PADDING,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "url", rename_all = "snake_case")]
pub enum ImageSource {
    Url(String),
    /// No display URL could be obtained; renderers show a placeholder.
    Unavailable,
}

impl From<&PhotoRecord> for ImageSource {
    fn from(photo: &PhotoRecord) -> Self {
        match photo.presigned_url() {
            Some(url) => ImageSource::Url(url.to_string()),
            None => ImageSource::Unavailable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub position: LatLon,
    pub filename: String,
    pub image: ImageSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GalleryTile {
    pub filename: String,
    pub image: ImageSource,
    /// `lat, lon` with four decimals.
    pub coordinates: String,
}

/// Everything a renderer needs to draw one album. Markers and tiles share one order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderPlan {
    pub album: Option<AlbumId>,
    pub title: Option<String>,
    pub markers: Vec<Marker>,
    pub tiles: Vec<GalleryTile>,
    pub overlay: Option<TrackOverlay>,
    pub viewport: Option<Viewport>,
    pub photo_count: String,
    pub placeholder: Option<String>,
}

impl RenderPlan {
    /// Builds a plan from photos that are already in display order.
    pub fn build(album: AlbumId, photos: &[PhotoRecord], overlay: Option<TrackOverlay>) -> Self {
        let markers = photos
            .iter()
            .map(|photo| Marker {
                position: photo.position(),
                filename: photo.filename().to_string(),
                image: photo.into(),
            })
            .collect();
        let tiles = photos
            .iter()
            .map(|photo| GalleryTile {
                filename: photo.filename().to_string(),
                image: photo.into(),
                coordinates: format!("{:.4}, {:.4}", photo.latitude(), photo.longitude()),
            })
            .collect();
        Self {
            title: Some(album.title()),
            album: Some(album),
            markers,
            tiles,
            overlay,
            viewport: Viewport::for_photos(photos),
            photo_count: photo_count(photos.len()),
            placeholder: photos.is_empty().then(|| NO_PHOTOS_MESSAGE.to_string()),
        }
    }

    /// Plan shown while no album is selected.
    pub fn empty() -> Self {
        Self {
            album: None,
            title: None,
            markers: Vec::new(),
            tiles: Vec::new(),
            overlay: None,
            viewport: None,
            photo_count: photo_count(0),
            placeholder: Some(NO_ALBUM_MESSAGE.to_string()),
        }
    }
}

fn photo_count(count: usize) -> String {
    format!("{count} photos with GPS data")
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    AlbumsListed(Vec<AlbumId>),
    /// Remove all markers, overlays and tiles.
    Cleared,
    LoadingStarted(AlbumId),
    MarkersPlaced {
        markers: Vec<Marker>,
        viewport: Option<Viewport>,
    },
    OverlayShown(TrackOverlay),
    GalleryRendered {
        tiles: Vec<GalleryTile>,
        placeholder: Option<String>,
    },
    PhotoCount(String),
    LoadFailed {
        album: AlbumId,
        message: String,
    },
    LoadingFinished(AlbumId),
    CredentialsRequired,
    SignedIn,
    SignedOut,
}

struct ViewState {
    album: Option<AlbumCollection>,
    plan: RenderPlan,
    session: Option<SessionToken>,
}

/// Owns the current album, the session and the rendered plan.
pub struct ViewController<L, G, Tz = Local> {
    loader: L,
    gate: G,
    sequencer: Sequencer<Tz>,
    state: ViewState,
    subscribers: Vec<Sender<ViewEvent>>,
    logger: Logger,
}

impl<L: AlbumLoader, G: AccessGate> ViewController<L, G, Local> {
    pub fn new(loader: L, gate: G) -> Self {
        Self::with_sequencer(loader, gate, Sequencer::default())
    }
}

impl<L: AlbumLoader, G: AccessGate, Tz: TimeZone> ViewController<L, G, Tz> {
    pub fn with_sequencer(loader: L, gate: G, sequencer: Sequencer<Tz>) -> Self {
        Self {
            loader,
            gate,
            sequencer,
            state: ViewState {
                album: None,
                plan: RenderPlan::empty(),
                session: None,
            },
            subscribers: Vec::new(),
            logger: Logger::root(Discard, o!()),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_session(mut self, session: SessionToken) -> Self {
        self.state.session = Some(session);
        self
    }

    pub fn subscribe(&mut self) -> Receiver<ViewEvent> {
        let (sender, receiver) = channel();
        self.subscribers.push(sender);
        receiver
    }

    fn publish(&mut self, event: ViewEvent) {
        // subscribers that hung up are dropped
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    pub fn plan(&self) -> &RenderPlan {
        &self.state.plan
    }

    pub fn current_album(&self) -> Option<&AlbumCollection> {
        self.state.album.as_ref()
    }

    pub fn session(&self) -> Option<&SessionToken> {
        self.state.session.as_ref()
    }

    /// Lists albums and opens the first one.
    pub fn start(&mut self) -> Vec<AlbumId> {
        let ids = self.loader.album_ids().unwrap_or_else(|e| {
            warn!(self.logger, "failed to list albums"; "error" => %e);
            Vec::new()
        });
        self.publish(ViewEvent::AlbumsListed(ids.clone()));
        match ids.first() {
            Some(first) => {
                self.select_album(first);
            }
            None => self.clear(),
        }
        ids
    }

    /// Replaces the whole view with the given album.
    pub fn select_album(&mut self, id: &AlbumId) -> &RenderPlan {
        self.publish(ViewEvent::Cleared);
        self.state.album = None;
        self.state.plan = RenderPlan::empty();
        self.publish(ViewEvent::LoadingStarted(id.clone()));

        let photos = match self.loader.load_album(id) {
            Ok(photos) => photos,
            Err(e) => {
                warn!(self.logger, "failed to load album"; "album" => %id, "error" => %e);
                self.publish(ViewEvent::LoadFailed {
                    album: id.clone(),
                    message: e.to_string(),
                });
                Vec::new()
            }
        };
        let overlay = self.loader.load_track_overlay(id).unwrap_or_else(|e| {
            warn!(self.logger, "failed to load track overlay"; "album" => %id, "error" => %e);
            None
        });

        let batch = attach_display_urls(
            photos,
            &self.gate,
            self.state.session.as_ref(),
            &self.logger,
        );
        if batch.credentials_required {
            // an expired or rejected token is of no further use
            self.state.session = None;
            self.publish(ViewEvent::CredentialsRequired);
        }
        let photos = self.sequencer.sequence_owned(batch.photos);
        let plan = RenderPlan::build(id.clone(), &photos, overlay.clone());

        self.publish(ViewEvent::MarkersPlaced {
            markers: plan.markers.clone(),
            viewport: plan.viewport.clone(),
        });
        if let Some(overlay) = &plan.overlay {
            self.publish(ViewEvent::OverlayShown(overlay.clone()));
        }
        self.publish(ViewEvent::GalleryRendered {
            tiles: plan.tiles.clone(),
            placeholder: plan.placeholder.clone(),
        });
        self.publish(ViewEvent::PhotoCount(plan.photo_count.clone()));
        info!(self.logger, "album displayed";
            "album" => %id, "photos" => photos.len(), "without_url" => batch.failures);

        self.state.album = Some(AlbumCollection {
            id: id.clone(),
            photos,
            overlay,
        });
        self.state.plan = plan;
        self.publish(ViewEvent::LoadingFinished(id.clone()));
        &self.state.plan
    }

    /// Drops the current album and shows the album prompt.
    pub fn clear(&mut self) {
        self.state.album = None;
        self.state.plan = RenderPlan::empty();
        self.publish(ViewEvent::Cleared);
        self.publish(ViewEvent::GalleryRendered {
            tiles: Vec::new(),
            placeholder: self.state.plan.placeholder.clone(),
        });
        self.publish(ViewEvent::PhotoCount(self.state.plan.photo_count.clone()));
    }

    /// Signs in and reloads the current album so its photos get display URLs.
    pub fn login(&mut self, password: &str) -> Result<(), GateError> {
        match self.gate.login(password) {
            Ok(token) => {
                self.state.session = Some(token);
                debug!(self.logger, "signed in");
                self.publish(ViewEvent::SignedIn);
                if let Some(id) = self.state.album.as_ref().map(|album| album.id.clone()) {
                    self.select_album(&id);
                }
                Ok(())
            }
            Err(e) => {
                self.publish(ViewEvent::CredentialsRequired);
                Err(e)
            }
        }
    }

    pub fn logout(&mut self) {
        self.state.session = None;
        self.publish(ViewEvent::SignedOut);
        self.publish(ViewEvent::CredentialsRequired);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album::{ManifestDir, DEFAULT_OVERLAY_FILE_NAME};
    use crate::chronology::DateResolver;
    use crate::gate::{GateConfig, Locked, PhotoProxy};
    use anyhow::Result;
    use chrono::Utc;
    use insta::assert_yaml_snapshot;
    use std::fs;

    const PASSWORD: &str = "open sesame";

    fn write_albums(root: &std::path::Path) -> Result<()> {
        fs::write(
            root.join("trail_run.json"),
            r#"[
                {"filename": "summit.jpg", "path": "photos/trail_run/summit.jpg",
                 "latitude": 40.7, "longitude": -110.9, "datetime": "2025:07:09 12:00:00"},
                {"filename": "2025-07-09 07-30-00.jpg", "path": "photos/trail_run/start.jpg",
                 "latitude": 40.6, "longitude": -111.0},
                {"filename": "no-gps.jpg", "path": "photos/trail_run/no-gps.jpg"},
                {"filename": "descent.jpg", "path": "photos/trail_run/descent.jpg",
                 "latitude": 40.65, "longitude": -110.95, "datetime": "2025:07:09 15:15:00"}
            ]"#,
        )?;
        fs::create_dir(root.join("trail_run"))?;
        fs::write(
            root.join("trail_run").join(DEFAULT_OVERLAY_FILE_NAME),
            r#"{"type": "LineString", "coordinates": [[-111.0, 40.6], [-110.9, 40.7]]}"#,
        )?;
        fs::write(
            root.join("single.json"),
            r#"[{"filename": "only.jpg", "path": "photos/single/only.jpg",
                 "latitude": 39.5, "longitude": -98.25}]"#,
        )?;
        fs::write(root.join("broken.json"), "not json")?;
        Ok(())
    }

    fn proxy() -> PhotoProxy {
        PhotoProxy::from_config(
            &GateConfig::default(),
            "secret",
            PASSWORD,
            &Logger::root(Discard, o!()),
        )
        .unwrap()
    }

    fn controller<G: AccessGate>(
        root: &std::path::Path,
        gate: G,
    ) -> ViewController<ManifestDir, G, Utc> {
        ViewController::with_sequencer(
            ManifestDir::new(root),
            gate,
            Sequencer::new(DateResolver::new(Utc)),
        )
    }

    fn event_names(receiver: &Receiver<ViewEvent>) -> Vec<String> {
        receiver
            .try_iter()
            .map(|event| match event {
                ViewEvent::AlbumsListed(ids) => format!("albums listed ({})", ids.len()),
                ViewEvent::Cleared => "cleared".to_string(),
                ViewEvent::LoadingStarted(id) => format!("loading {id}"),
                ViewEvent::MarkersPlaced { markers, .. } => format!("markers ({})", markers.len()),
                ViewEvent::OverlayShown(_) => "overlay".to_string(),
                ViewEvent::GalleryRendered { tiles, .. } => format!("gallery ({})", tiles.len()),
                ViewEvent::PhotoCount(label) => label,
                ViewEvent::LoadFailed { album, .. } => format!("failed {album}"),
                ViewEvent::LoadingFinished(id) => format!("loaded {id}"),
                ViewEvent::CredentialsRequired => "credentials required".to_string(),
                ViewEvent::SignedIn => "signed in".to_string(),
                ViewEvent::SignedOut => "signed out".to_string(),
            })
            .collect()
    }

    #[test]
    fn album_renders_in_sequence_order_with_urls() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_albums(dir.path())?;
        let mut view = controller(dir.path(), proxy());
        view.login(PASSWORD)?;
        let events = view.subscribe();

        let plan = view.select_album(&"trail_run".parse()?).clone();
        let tiles: Vec<&str> = plan.tiles.iter().map(|t| t.filename.as_str()).collect();
        assert_eq!(tiles, ["2025-07-09 07-30-00.jpg", "summit.jpg", "descent.jpg"]);
        let markers: Vec<&str> = plan.markers.iter().map(|m| m.filename.as_str()).collect();
        assert_eq!(markers, tiles);
        assert!(plan
            .tiles
            .iter()
            .all(|t| matches!(&t.image, ImageSource::Url(url) if url.contains("expires="))));
        assert_eq!(plan.tiles[1].coordinates, "40.7000, -110.9000");
        assert_eq!(plan.title.as_deref(), Some("Trail Run"));
        assert_eq!(plan.overlay.as_ref().map(TrackOverlay::geojson_type), Some("LineString"));
        assert!(matches!(plan.viewport, Some(Viewport::Fit { padding: 20, .. })));

        assert_yaml_snapshot!(event_names(&events), @r###"
        - cleared
        - loading trail_run
        - markers (3)
        - overlay
        - gallery (3)
        - 3 photos with GPS data
        - loaded trail_run
        "###);
        Ok(())
    }

    #[test]
    fn switching_albums_replaces_state() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_albums(dir.path())?;
        let mut view = controller(dir.path(), proxy());
        view.select_album(&"trail_run".parse()?);
        let plan = view.select_album(&"single".parse()?);
        assert_eq!(plan.markers.len(), 1);
        assert_eq!(plan.overlay, None);
        assert_eq!(
            plan.viewport,
            Some(Viewport::Centered {
                center: LatLon { lat: 39.5, lon: -98.25 },
                zoom: 15
            })
        );
        assert_eq!(view.current_album().map(|a| a.id.as_str()), Some("single"));
        Ok(())
    }

    #[test]
    fn without_session_images_are_unavailable_and_login_is_requested() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_albums(dir.path())?;
        let mut view = controller(dir.path(), Locked);
        let events = view.subscribe();
        let plan = view.select_album(&"single".parse()?);
        assert_eq!(plan.tiles[0].image, ImageSource::Unavailable);
        assert!(event_names(&events).contains(&"credentials required".to_string()));
        assert!(view.login("anything").is_err());
        Ok(())
    }

    #[test]
    fn plans_serialize_to_tagged_json() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_albums(dir.path())?;
        let mut view = controller(dir.path(), Locked);
        let plan = serde_json::to_value(view.select_album(&"single".parse()?))?;
        assert_eq!(plan["album"], "single");
        assert_eq!(plan["viewport"]["kind"], "centered");
        assert_eq!(plan["viewport"]["center"]["lat"], 39.5);
        assert_eq!(plan["tiles"][0]["image"]["kind"], "unavailable");
        assert_eq!(plan["markers"][0]["filename"], "only.jpg");

        assert_yaml_snapshot!(RenderPlan::empty(), @r###"
        album: ~
        title: ~
        markers: []
        tiles: []
        overlay: ~
        viewport: ~
        photo_count: 0 photos with GPS data
        placeholder: Select an album to view photos
        "###);
        Ok(())
    }

    #[test]
    fn load_failure_is_an_empty_album() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_albums(dir.path())?;
        let mut view = controller(dir.path(), Locked);
        let events = view.subscribe();
        let plan = view.select_album(&"broken".parse()?).clone();
        assert!(plan.markers.is_empty());
        assert_eq!(plan.viewport, None);
        assert_eq!(plan.placeholder.as_deref(), Some(NO_PHOTOS_MESSAGE));
        assert_eq!(plan.photo_count, "0 photos with GPS data");
        assert_yaml_snapshot!(event_names(&events), @r###"
        - cleared
        - loading broken
        - failed broken
        - markers (0)
        - gallery (0)
        - 0 photos with GPS data
        - loaded broken
        "###);
        Ok(())
    }

    #[test]
    fn start_opens_first_album_and_clear_resets() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_albums(dir.path())?;
        let mut view = controller(dir.path(), proxy());
        let ids = view.start();
        assert_eq!(ids.len(), 3);
        assert_eq!(view.current_album().map(|a| a.id.as_str()), Some("broken"));

        let events = view.subscribe();
        view.clear();
        assert_eq!(view.plan(), &RenderPlan::empty());
        assert_eq!(view.plan().placeholder.as_deref(), Some(NO_ALBUM_MESSAGE));
        assert_eq!(
            event_names(&events),
            ["cleared", "gallery (0)", "0 photos with GPS data"]
        );
        Ok(())
    }

    #[test]
    fn login_reloads_current_album() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_albums(dir.path())?;
        let mut view = controller(dir.path(), proxy());
        view.select_album(&"single".parse()?);
        assert_eq!(view.plan().tiles[0].image, ImageSource::Unavailable);

        view.login(PASSWORD)?;
        assert!(matches!(view.plan().tiles[0].image, ImageSource::Url(_)));

        view.logout();
        assert!(view.session().is_none());
        Ok(())
    }

    #[test]
    fn dropped_subscribers_are_forgotten() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_albums(dir.path())?;
        let mut view = controller(dir.path(), Locked);
        drop(view.subscribe());
        let kept = view.subscribe();
        view.clear();
        assert_eq!(view.subscribers.len(), 1);
        assert_eq!(kept.try_iter().count(), 3);
        Ok(())
    }
}
