//! Access gate: shared-password sessions and short-lived signed display URLs.
//!
//! Session tokens carry their issue and expiry time and a keyed BLAKE3 MAC over both, so the
//! gate holds no session table. Display URLs are signed the same way with a separate key.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, TimeDelta, Utc};
use derive_more::Display;
use displaydoc::Display as DisplayDoc;
use percent_encoding::percent_decode_str;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use slog::{debug, o, warn, Discard, Logger};
use thiserror::Error;
use url::Url;

use crate::photo::PhotoRecord;

const SESSION_KEY_CONTEXT: &str = "photomap 2025-07 session token v1";
const URL_KEY_CONTEXT: &str = "photomap 2025-07 display url v1";

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub session_ttl: TimeDelta,
    pub url_ttl: TimeDelta,
    pub storage_base_url: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            session_ttl: TimeDelta::hours(12),
            url_ttl: TimeDelta::seconds(900),
            storage_base_url: "http://localhost:8888/photos".to_string(),
        }
    }
}

#[derive(Debug, Error, DisplayDoc, Clone, PartialEq, Eq)]
pub enum GateError {
    /// not signed in
    Unauthenticated,
    /// access denied: {0}
    Unauthorized(Rejection),
    /// invalid storage key {0:?}
    InvalidKey(String),
    /// invalid storage base url {0:?}
    InvalidBaseUrl(String),
    /// time to live must be positive and in range
    InvalidTtl,
}

impl GateError {
    /// Both "no session" and "session rejected" send the user back to the password prompt.
    pub fn requires_credentials(&self) -> bool {
        matches!(self, GateError::Unauthenticated | GateError::Unauthorized(_))
    }
}

#[derive(Debug, DisplayDoc, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// wrong password
    WrongPassword,
    /// malformed token
    Malformed,
    /// bad signature
    BadSignature,
    /// expired
    Expired,
}

/// Opaque bearer token handed out after a successful login.
#[derive(Clone, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SessionToken(String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionToken {
    fn from(value: String) -> Self {
        Self(value.trim().to_string())
    }
}

impl From<SessionToken> for String {
    fn from(token: SessionToken) -> Self {
        token.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

/// A verified session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub issued: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

/// Checks the shared password and issues and verifies session tokens.
pub struct SessionAuthority {
    key: [u8; 32],
    password_digest: blake3::Hash,
    ttl: TimeDelta,
    logger: Logger,
}

impl SessionAuthority {
    pub fn new(secret: &str, password: &str, ttl: TimeDelta) -> Self {
        Self {
            key: blake3::derive_key(SESSION_KEY_CONTEXT, secret.as_bytes()),
            password_digest: blake3::hash(password.as_bytes()),
            ttl,
            logger: Logger::root(Discard, o!()),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn login(&self, password: &str) -> Result<SessionToken, GateError> {
        self.login_at(password, Utc::now())
    }

    pub fn login_at(&self, password: &str, now: DateTime<Utc>) -> Result<SessionToken, GateError> {
        // `Hash` equality is constant time
        if blake3::hash(password.as_bytes()) != self.password_digest {
            warn!(self.logger, "rejected login");
            return Err(GateError::Unauthorized(Rejection::WrongPassword));
        }
        self.issue_at(now)
    }

    pub fn issue_at(&self, now: DateTime<Utc>) -> Result<SessionToken, GateError> {
        let expires = expiry(now, self.ttl)?;
        let claims = format!(
            "{}.{}",
            now.timestamp_micros(),
            expires.timestamp_micros()
        );
        let mac = blake3::keyed_hash(&self.key, claims.as_bytes());
        debug!(self.logger, "issued session"; "expires" => %expires);
        Ok(SessionToken(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&claims),
            mac.to_hex()
        )))
    }

    pub fn verify(&self, token: &SessionToken) -> Result<Session, GateError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(
        &self,
        token: &SessionToken,
        now: DateTime<Utc>,
    ) -> Result<Session, GateError> {
        let malformed = GateError::Unauthorized(Rejection::Malformed);
        let (encoded, mac) = token.as_str().split_once('.').ok_or(malformed.clone())?;
        let claims = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| malformed.clone())?;
        let mac = blake3::Hash::from_hex(mac).map_err(|_| malformed.clone())?;
        if blake3::keyed_hash(&self.key, &claims) != mac {
            return Err(GateError::Unauthorized(Rejection::BadSignature));
        }
        let claims = String::from_utf8(claims).map_err(|_| malformed.clone())?;
        let (issued, expires) = claims.split_once('.').ok_or(malformed.clone())?;
        let micros = |s: &str| {
            s.parse::<i64>()
                .ok()
                .and_then(DateTime::<Utc>::from_timestamp_micros)
        };
        let session = Session {
            issued: micros(issued).ok_or(malformed.clone())?,
            expires: micros(expires).ok_or(malformed)?,
        };
        if session.expires <= now {
            return Err(GateError::Unauthorized(Rejection::Expired));
        }
        Ok(session)
    }
}

/// Mints time-limited URLs for stored images.
pub trait UrlSigner: Send + Sync {
    fn presign(&self, key: &str, ttl: TimeDelta) -> Result<String, GateError>;
}

/// Signs `<base>/<key>?expires=<unix seconds>&signature=<mac>` with a key shared with the
/// storage server.
pub struct KeyedUrlSigner {
    base_url: Url,
    key: [u8; 32],
}

impl KeyedUrlSigner {
    pub fn new(base_url: &str, secret: &str) -> Result<Self, GateError> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| GateError::InvalidBaseUrl(base_url.to_string()))?;
        Ok(Self {
            base_url,
            key: blake3::derive_key(URL_KEY_CONTEXT, secret.as_bytes()),
        })
    }

    pub fn presign_at(
        &self,
        key: &str,
        ttl: TimeDelta,
        now: DateTime<Utc>,
    ) -> Result<String, GateError> {
        let key = normalize_key(key)?;
        let expires = expiry(now, ttl)?.timestamp();
        let signature = self.signature(key, expires);
        let mut url = self.locate(key);
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", signature.to_hex().as_str());
        Ok(url.into())
    }

    /// Checks a URL minted by this signer and returns the storage key it grants.
    ///
    /// Only the exact encoding this signer produces is accepted.
    pub fn verify_url(&self, url: &str, now: DateTime<Utc>) -> Result<String, GateError> {
        let malformed = || GateError::Unauthorized(Rejection::Malformed);
        let url = Url::parse(url).map_err(|_| malformed())?;
        if url.origin() != self.base_url.origin() {
            return Err(malformed());
        }
        let encoded_key = url
            .path()
            .strip_prefix(self.base_url.path().trim_end_matches('/'))
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(malformed)?;
        let key = percent_decode_str(encoded_key)
            .decode_utf8()
            .map_err(|_| malformed())?
            .into_owned();
        if normalize_key(&key)? != key || self.locate(&key).path() != url.path() {
            return Err(malformed());
        }

        let mut expires = None;
        let mut signature = None;
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "expires" => expires = value.parse::<i64>().ok(),
                "signature" => signature = blake3::Hash::from_hex(value.as_bytes()).ok(),
                _ => return Err(malformed()),
            }
        }
        let (Some(expires), Some(signature)) = (expires, signature) else {
            return Err(malformed());
        };
        if self.signature(&key, expires) != signature {
            return Err(GateError::Unauthorized(Rejection::BadSignature));
        }
        if expires <= now.timestamp() {
            return Err(GateError::Unauthorized(Rejection::Expired));
        }
        Ok(key)
    }

    /// The base URL with the key's segments appended, each percent-encoded.
    fn locate(&self, key: &str) -> Url {
        let mut url = self.base_url.clone();
        // the base was checked to have a hierarchical path in `new`
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(key.split('/'));
        }
        url
    }

    fn signature(&self, key: &str, expires: i64) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
        hasher.update(expires.to_string().as_bytes());
        hasher.finalize()
    }
}

impl UrlSigner for KeyedUrlSigner {
    fn presign(&self, key: &str, ttl: TimeDelta) -> Result<String, GateError> {
        self.presign_at(key, ttl, Utc::now())
    }
}

/// `now + ttl` for a positive ttl that stays within the representable range.
fn expiry(now: DateTime<Utc>, ttl: TimeDelta) -> Result<DateTime<Utc>, GateError> {
    if ttl <= TimeDelta::zero() {
        return Err(GateError::InvalidTtl);
    }
    now.checked_add_signed(ttl).ok_or(GateError::InvalidTtl)
}

/// Strips an `s3://bucket/` prefix and rejects keys that could escape the storage root.
fn normalize_key(key: &str) -> Result<&str, GateError> {
    let key = match key.strip_prefix("s3://") {
        Some(rest) => rest.split_once('/').map_or("", |(_bucket, key)| key),
        None => key,
    };
    let key = key.trim_start_matches('/');
    if key.is_empty() || key.split('/').any(|segment| segment == ".." || segment == ".") {
        return Err(GateError::InvalidKey(key.to_string()));
    }
    Ok(key)
}

/// Session check in front of display URL minting.
pub trait AccessGate: Send + Sync {
    fn login(&self, password: &str) -> Result<SessionToken, GateError>;

    /// Returns a display URL for the storage key, or why the session cannot have one.
    fn authorized_fetch(&self, session: Option<&SessionToken>, key: &str)
        -> Result<String, GateError>;
}

impl<G: AccessGate + ?Sized> AccessGate for Box<G> {
    fn login(&self, password: &str) -> Result<SessionToken, GateError> {
        (**self).login(password)
    }

    fn authorized_fetch(
        &self,
        session: Option<&SessionToken>,
        key: &str,
    ) -> Result<String, GateError> {
        (**self).authorized_fetch(session, key)
    }
}

/// Gate that never grants access, for running without credentials configured.
pub struct Locked;

impl AccessGate for Locked {
    fn login(&self, _password: &str) -> Result<SessionToken, GateError> {
        Err(GateError::Unauthorized(Rejection::WrongPassword))
    }

    fn authorized_fetch(
        &self,
        _session: Option<&SessionToken>,
        _key: &str,
    ) -> Result<String, GateError> {
        Err(GateError::Unauthenticated)
    }
}

/// Verifies the session, then asks the signer for a URL.
pub struct PhotoProxy<S = KeyedUrlSigner> {
    authority: SessionAuthority,
    signer: S,
    url_ttl: TimeDelta,
}

impl PhotoProxy<KeyedUrlSigner> {
    pub fn from_config(
        config: &GateConfig,
        secret: &str,
        password: &str,
        logger: &Logger,
    ) -> Result<Self, GateError> {
        let authority = SessionAuthority::new(secret, password, config.session_ttl)
            .with_logger(logger.new(o!("component" => "session")));
        let signer = KeyedUrlSigner::new(&config.storage_base_url, secret)?;
        Ok(Self::new(authority, signer, config.url_ttl))
    }
}

impl<S: UrlSigner> PhotoProxy<S> {
    pub fn new(authority: SessionAuthority, signer: S, url_ttl: TimeDelta) -> Self {
        Self {
            authority,
            signer,
            url_ttl,
        }
    }

    pub fn authority(&self) -> &SessionAuthority {
        &self.authority
    }
}

impl<S: UrlSigner> AccessGate for PhotoProxy<S> {
    fn login(&self, password: &str) -> Result<SessionToken, GateError> {
        self.authority.login(password)
    }

    fn authorized_fetch(
        &self,
        session: Option<&SessionToken>,
        key: &str,
    ) -> Result<String, GateError> {
        let session = session.ok_or(GateError::Unauthenticated)?;
        self.authority.verify(session)?;
        self.signer.presign(key, self.url_ttl)
    }
}

/// Photos after a round of display URL requests.
#[derive(Debug)]
pub struct UrlBatch {
    pub photos: Vec<PhotoRecord>,
    pub failures: usize,
    pub credentials_required: bool,
}

/// Requests a display URL for every photo concurrently and waits for all of them.
///
/// Photos keep their input order. A failed request leaves the photo without a URL.
pub fn attach_display_urls<G: AccessGate + ?Sized>(
    photos: Vec<PhotoRecord>,
    gate: &G,
    session: Option<&SessionToken>,
    logger: &Logger,
) -> UrlBatch {
    if session.is_none() {
        let failures = photos.len();
        return UrlBatch {
            photos,
            failures,
            credentials_required: failures > 0,
        };
    }
    let results: Vec<(PhotoRecord, Option<GateError>)> = photos
        .into_par_iter()
        .map(|mut photo| match gate.authorized_fetch(session, photo.path()) {
            Ok(url) => {
                photo.attach_presigned_url(url);
                (photo, None)
            }
            Err(e) => (photo, Some(e)),
        })
        .collect();

    let mut batch = UrlBatch {
        photos: Vec::with_capacity(results.len()),
        failures: 0,
        credentials_required: false,
    };
    for (photo, error) in results {
        if let Some(e) = error {
            warn!(logger, "no display url"; "photo" => photo.filename(), "error" => %e);
            batch.failures += 1;
            batch.credentials_required |= e.requires_credentials();
        }
        batch.photos.push(photo);
    }
    batch
}
