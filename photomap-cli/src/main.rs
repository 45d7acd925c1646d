use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use chrono::TimeDelta;
use clap::{value_parser, Args as ClapArgs, Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;
use photomap_lib::{
    album::{load_collection, AlbumLoader, ManifestDir, DEFAULT_OVERLAY_FILE_NAME},
    catalog::Catalog,
    chronology::DateResolver,
    extract::{ExtractConfig, Extractor},
    gate::{AccessGate, GateConfig, Locked, PhotoProxy, SessionToken},
    stats::album_stats,
    view::ViewController,
    AlbumId,
};
use photomap_util::ExistingDir;
use slog::{info, o, Logger};
use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::Build;

/// Chronological photo maps from GPS-tagged albums
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Log verbosity
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan album folders for GPS-tagged photos and store the albums
    Extract {
        /// Directory with one subdirectory per album
        #[arg(long)]
        photos_dir: ExistingDir,
        #[command(flatten)]
        source: SourceArgs,
        /// Prefix of the storage path recorded for every photo
        #[arg(long, default_value = "photos")]
        storage_prefix: String,
        /// Fall back to the exiftool binary for files without readable GPS data
        #[arg(long)]
        exiftool: bool,
    },
    /// List known albums
    Albums {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Print the render plan of an album as JSON
    Show {
        album: AlbumId,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        gate: GateArgs,
        /// Session token from `login`
        #[arg(long, env = "PHOTOMAP_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
    /// Print date and location statistics of an album as JSON
    Stats {
        album: AlbumId,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Exchange the shared password for a session token
    Login {
        #[command(flatten)]
        gate: GateArgs,
        #[arg(long, env = "PHOTOMAP_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Print a display URL for a storage key
    Presign {
        key: String,
        #[command(flatten)]
        gate: GateArgs,
        #[arg(long, env = "PHOTOMAP_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
}

#[derive(ClapArgs, Debug)]
struct SourceArgs {
    /// Directory of album manifests (defaults to the user data directory)
    #[arg(long)]
    manifest_dir: Option<PathBuf>,
    /// SQLite catalog to use instead of manifests
    #[arg(long, conflicts_with = "manifest_dir")]
    db_path: Option<PathBuf>,
    /// Name of the track overlay file stored next to each album
    #[arg(long, default_value = DEFAULT_OVERLAY_FILE_NAME)]
    overlay_file_name: String,
}

/// One week.
const MAX_URL_TTL_SECS: i64 = 7 * 24 * 3600;
/// One year.
const MAX_SESSION_TTL_HOURS: i64 = 365 * 24;

#[derive(ClapArgs, Debug)]
struct GateArgs {
    /// Secret shared with the storage server, used to sign sessions and URLs
    #[arg(long, env = "PHOTOMAP_SECRET", hide_env_values = true)]
    secret: Option<String>,
    /// The site's shared password
    #[arg(long, env = "PHOTOMAP_SITE_PASSWORD", hide_env_values = true)]
    site_password: Option<String>,
    /// Base URL images are served from
    #[arg(long, default_value_t = GateConfig::default().storage_base_url)]
    storage_url: String,
    /// Lifetime of display URLs in seconds
    #[arg(
        long,
        default_value_t = 900,
        value_parser = value_parser!(i64).range(1..=MAX_URL_TTL_SECS)
    )]
    url_ttl_secs: i64,
    /// Lifetime of sessions in hours
    #[arg(
        long,
        default_value_t = 12,
        value_parser = value_parser!(i64).range(1..=MAX_SESSION_TTL_HOURS)
    )]
    session_ttl_hours: i64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Severity {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Error => Severity::Error,
            LogLevel::Warning => Severity::Warning,
            LogLevel::Info => Severity::Info,
            LogLevel::Debug => Severity::Debug,
            LogLevel::Trace => Severity::Trace,
        }
    }
}

enum Source {
    Manifests(ManifestDir),
    Catalog(Catalog),
}

impl SourceArgs {
    fn open(&self, logger: &Logger) -> Result<Source> {
        if let Some(db_path) = &self.db_path {
            let catalog = Catalog::new(db_path)
                .with_context(|| format!("failed to open catalog {}", db_path.display()))?
                .with_logger(logger.new(o!("component" => "catalog")));
            return Ok(Source::Catalog(catalog));
        }
        let root = match &self.manifest_dir {
            Some(dir) => dir.clone(),
            None => default_manifest_dir()?,
        };
        Ok(Source::Manifests(
            ManifestDir::new(root)
                .with_overlay_file_name(self.overlay_file_name.clone())
                .with_logger(logger.new(o!("component" => "manifests"))),
        ))
    }
}

impl GateArgs {
    fn config(&self) -> Result<GateConfig> {
        Ok(GateConfig {
            session_ttl: TimeDelta::try_hours(self.session_ttl_hours)
                .context("session lifetime out of range")?,
            url_ttl: TimeDelta::try_seconds(self.url_ttl_secs)
                .context("url lifetime out of range")?,
            storage_base_url: self.storage_url.clone(),
        })
    }

    fn proxy(&self, logger: &Logger) -> Result<PhotoProxy> {
        let (Some(secret), Some(password)) = (&self.secret, &self.site_password) else {
            bail!(
                "--secret and --site-password (or PHOTOMAP_SECRET and PHOTOMAP_SITE_PASSWORD) \
                are required"
            );
        };
        Ok(PhotoProxy::from_config(
            &self.config()?,
            secret,
            password,
            logger,
        )?)
    }

    /// Like [`GateArgs::proxy`], but without credentials every request is refused.
    fn gate(&self, logger: &Logger) -> Result<Box<dyn AccessGate>> {
        if self.secret.is_none() || self.site_password.is_none() {
            return Ok(Box::new(Locked));
        }
        Ok(Box::new(self.proxy(logger)?))
    }
}

fn default_manifest_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "photomap")
        .ok_or_else(|| anyhow!("no home directory, pass --manifest-dir"))?;
    Ok(dirs.data_dir().join("albums"))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let logger = TerminalLoggerBuilder::new()
        .level(args.log_level.into())
        .destination(Destination::Stderr)
        .build()
        .map_err(|e| anyhow!("failed to build logger: {e}"))?;

    match args.command {
        Command::Extract {
            photos_dir,
            source,
            storage_prefix,
            exiftool,
        } => {
            let config = ExtractConfig {
                storage_prefix,
                overlay_file_name: source.overlay_file_name.clone(),
                use_exiftool: exiftool,
            };
            let albums = Extractor::new(config)
                .with_logger(logger.new(o!("component" => "extract")))
                .extract_albums(photos_dir.as_ref())?;
            match source.open(&logger)? {
                Source::Manifests(manifests) => {
                    for album in &albums {
                        manifests.write_album(album)?;
                    }
                }
                Source::Catalog(mut catalog) => {
                    for album in &albums {
                        catalog.add_album(album)?;
                    }
                }
            }
            for album in &albums {
                println!("{}: {} photos with GPS data", album.id, album.photos.len());
            }
            info!(logger, "extraction complete"; "albums" => albums.len());
        }
        Command::Albums { source } => {
            let ids = match source.open(&logger)? {
                Source::Manifests(manifests) => manifests.album_ids()?,
                Source::Catalog(catalog) => catalog.album_ids()?,
            };
            for id in ids {
                println!("{id}\t{}", id.title());
            }
        }
        Command::Show {
            album,
            source,
            gate,
            token,
        } => {
            let gate = gate.gate(&logger)?;
            let token = token.map(SessionToken::from);
            let plan = match source.open(&logger)? {
                Source::Manifests(manifests) => show(manifests, gate, token, &album, &logger)?,
                Source::Catalog(catalog) => show(catalog, gate, token, &album, &logger)?,
            };
            println!("{plan}");
        }
        Command::Stats { album, source } => {
            let collection = match source.open(&logger)? {
                Source::Manifests(manifests) => load_collection(&manifests, &album, &logger),
                Source::Catalog(catalog) => load_collection(&catalog, &album, &logger),
            };
            let stats = album_stats(&collection.photos, &DateResolver::default());
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Login { gate, password } => {
            let token = gate.proxy(&logger)?.login(&password)?;
            println!("{token}");
        }
        Command::Presign { key, gate, token } => {
            let token = token.map(SessionToken::from);
            let url = gate.proxy(&logger)?.authorized_fetch(token.as_ref(), &key)?;
            println!("{url}");
        }
    }

    Ok(())
}

fn show<L: AlbumLoader>(
    loader: L,
    gate: Box<dyn AccessGate>,
    token: Option<SessionToken>,
    album: &AlbumId,
    logger: &Logger,
) -> Result<String> {
    let mut view =
        ViewController::new(loader, gate).with_logger(logger.new(o!("component" => "view")));
    if let Some(token) = token {
        view = view.with_session(token);
    }
    let plan = view.select_album(album);
    Ok(serde_json::to_string_pretty(plan)?)
}
