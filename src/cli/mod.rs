//! Command-line interface for anigato.
//!
//! Provides commands for importing manifests, browsing the library, and
//! resolving what a player or reader would show for a work.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::adapters::{Fetcher, HttpFetcher};
use crate::config::{self, ResolvedConfig};
use crate::domain::{PageIndex, Work, WorkType};
use crate::library::{
    validate_slice, IngestOutcome, Library, LibraryDb, LibrarySnapshot, RejectReason,
};
use crate::playback::{
    display_title, quality_rank, resolve_media, subtitles_for, ComicCursor, MediaPreferences,
    OverlaySynchronizer, OverlayView, ResolvedMedia,
};

/// anigato - Decentralized multimedia library
#[derive(Parser, Debug)]
#[command(name = "anigato")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import a manifest from a URL or a local JSON file
    Import {
        /// http(s) URL or file path
        source: String,
    },

    /// List works in the library
    List {
        /// Filter by work type
        #[arg(short = 't', long = "type", value_enum)]
        work_type: Option<TypeArg>,

        /// Maximum number of works to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// List imported manifests
    Manifests,

    /// Show details of a work
    Show {
        /// Work ID
        work_id: String,
    },

    /// Resolve the video source and subtitles for a work
    Play {
        /// Work ID
        work_id: String,

        /// Stream key (e.g. episode_3)
        #[arg(short, long)]
        stream: Option<String>,

        /// Locale (e.g. pt-BR)
        #[arg(short, long, env = "ANIGATO_LOCALE")]
        locale: Option<String>,

        /// Highest quality to pick (e.g. 720p)
        #[arg(short, long)]
        quality: Option<String>,
    },

    /// Show a comic page with its localized balloons
    Read {
        /// Work ID
        work_id: String,

        /// Stream key (e.g. chapter_2)
        #[arg(short, long)]
        stream: Option<String>,

        /// Locale (e.g. pt-BR)
        #[arg(short, long, env = "ANIGATO_LOCALE")]
        locale: Option<String>,

        /// Page to show (1-based)
        #[arg(short, long, default_value = "1")]
        page: u32,
    },

    /// Remove every manifest and work
    Clear {
        /// Skip the confirmation check
        #[arg(long)]
        yes: bool,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Work type for CLI (maps to WorkType)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TypeArg {
    Video,
    Comic,
    Book,
}

impl From<TypeArg> for WorkType {
    fn from(t: TypeArg) -> Self {
        match t {
            TypeArg::Video => WorkType::Video,
            TypeArg::Comic => WorkType::Comic,
            TypeArg::Book => WorkType::Book,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Import { source } => import_manifest(&source).await,
            Commands::List { work_type, limit } => list_works(work_type, limit).await,
            Commands::Manifests => list_manifests().await,
            Commands::Show { work_id } => show_work(&work_id).await,
            Commands::Play {
                work_id,
                stream,
                locale,
                quality,
            } => play_work(&work_id, stream, locale, quality).await,
            Commands::Read {
                work_id,
                stream,
                locale,
                page,
            } => read_work(&work_id, stream, locale, page).await,
            Commands::Clear { yes } => clear_library(yes).await,
            Commands::Config => show_config(),
        }
    }
}

fn build_fetcher(config: &ResolvedConfig) -> Result<Arc<dyn Fetcher>> {
    let fetcher = match &config.user_agent {
        Some(ua) => HttpFetcher::with_user_agent(ua)?,
        None => HttpFetcher::new(),
    };
    Ok(Arc::new(fetcher))
}

/// Open and load the configured library
async fn open_library() -> Result<(Library, Arc<dyn Fetcher>)> {
    let config = config::config()?;
    let db = LibraryDb::open(&config.database)
        .with_context(|| format!("Failed to open library: {}", config.database.display()))?;

    let fetcher = build_fetcher(config)?;
    let library = Library::new(db, fetcher.clone());
    library.init().await?;

    Ok((library, fetcher))
}

fn find_work<'a>(snapshot: &'a LibrarySnapshot, work_id: &str) -> Result<&'a Work> {
    snapshot
        .work(work_id)
        .with_context(|| format!("Work not found: {}", work_id))
}

/// Import a manifest from a URL or a file
async fn import_manifest(source: &str) -> Result<()> {
    let (library, _) = open_library().await?;

    let outcome = if source.starts_with("http://") || source.starts_with("https://") {
        library.ingest_manifest_from_url(source).await?
    } else {
        let path = Path::new(source);
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read manifest file: {}", path.display()))?;
        let manifest = validate_slice(&bytes)?;
        library.ingest_manifest(manifest).await?
    };

    match outcome {
        IngestOutcome::Accepted { manifest_id, works } => {
            println!("Imported manifest {} ({} works)", manifest_id, works);
        }
        IngestOutcome::Rejected(RejectReason::DuplicateManifest(key)) => {
            println!("Manifest {} is already in the library", key);
        }
    }

    Ok(())
}

/// List works in the library
async fn list_works(work_type: Option<TypeArg>, limit: usize) -> Result<()> {
    let (library, _) = open_library().await?;
    let snapshot = library.snapshot();

    let works: Vec<&Work> = match work_type {
        Some(t) => snapshot.works_of_type(t.into()),
        None => snapshot.works.iter().collect(),
    };

    if works.is_empty() {
        println!("Your library is empty. Import a manifest to start.");
        return Ok(());
    }

    println!("{:<24} {:<8} {:<40}", "ID", "TYPE", "TITLE");
    println!("{}", "-".repeat(74));

    for work in works.iter().take(limit) {
        println!(
            "{:<24} {:<8} {:<40}",
            work.id, work.work_type, work.original_title
        );
    }

    if works.len() > limit {
        println!("\n... and {} more", works.len() - limit);
    }

    Ok(())
}

/// List imported manifests
async fn list_manifests() -> Result<()> {
    let (library, _) = open_library().await?;
    let snapshot = library.snapshot();

    if snapshot.manifests.is_empty() {
        println!("No manifests imported");
        return Ok(());
    }

    println!("{:<30} {:<10} {:<6} {:<25}", "MAINTAINER", "VERSION", "WORKS", "UPDATED");
    println!("{}", "-".repeat(74));

    for stored in &snapshot.manifests {
        let updated = stored
            .manifest
            .last_updated_at()
            .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| stored.manifest.last_updated.clone());
        println!(
            "{:<30} {:<10} {:<6} {:<25}",
            stored.manifest.maintainer,
            stored.manifest.version,
            stored.manifest.works.len(),
            updated
        );
    }

    Ok(())
}

/// Show details of a work
async fn show_work(work_id: &str) -> Result<()> {
    let (library, _) = open_library().await?;
    let snapshot = library.snapshot();
    let work = find_work(&snapshot, work_id)?;

    println!("ID: {}", work.id);
    println!("Title: {}", work.original_title);
    println!("Type: {}", work.work_type);
    if let Some(description) = &work.description {
        println!("Description: {}", description);
    }
    if let Some(cover) = &work.cover_url {
        println!("Cover: {}", cover);
    }
    if let Some(stored) = snapshot.manifest_of(work_id) {
        println!("Manifest: {}", stored.key());
    }

    if !work.external_ids.is_empty() {
        println!("\nExternal IDs:");
        for (namespace, id) in work.external_ids.iter() {
            println!("  {}: {}", namespace, id);
        }
    }

    let streams = work.stream_keys();
    if !streams.is_empty() {
        println!("\nStreams:");
        for key in streams {
            println!("  {}", key);
        }
    }

    if !work.localizations().is_empty() {
        println!("\nLocalizations:");
        for loc in work.localizations() {
            println!(
                "  {} - {}",
                loc.locale,
                loc.title.as_deref().unwrap_or(&work.original_title)
            );
        }
    }

    Ok(())
}

/// Resolve video playback for a work
async fn play_work(
    work_id: &str,
    stream: Option<String>,
    locale: Option<String>,
    quality: Option<String>,
) -> Result<()> {
    let (library, _) = open_library().await?;
    let snapshot = library.snapshot();
    let work = find_work(&snapshot, work_id)?;
    let playback = &config::config()?.playback;

    if work.work_type != WorkType::Video {
        anyhow::bail!("{} is a {}, use `anigato read`", work.id, work.work_type);
    }

    let prefs = MediaPreferences {
        stream,
        locale: locale.or_else(|| playback.locale.clone()),
        max_height: quality.as_deref().and_then(quality_rank).or(playback.max_height),
    };

    let ResolvedMedia::Video {
        stream_key,
        rendition,
        renditions,
    } = resolve_media(work, &prefs)?
    else {
        anyhow::bail!("No video source found for {}", work.id);
    };

    println!("{} [{}]", display_title(work, prefs.locale.as_deref()), stream_key);
    println!(
        "Source: {} ({}, {})",
        rendition.url,
        rendition.quality,
        rendition.format.mime_type()
    );
    if renditions.len() > 1 {
        let others: Vec<&str> = renditions.iter().map(|r| r.quality.as_str()).collect();
        println!("Available: {}", others.join(", "));
    }

    let subtitles = subtitles_for(work, stream_key, prefs.locale.as_deref());
    if subtitles.is_empty() {
        println!("Subtitles: none");
    } else {
        println!("Subtitles:");
        for (idx, track) in subtitles.iter().enumerate() {
            let default = if idx == 0 { " (default)" } else { "" };
            println!("  {} [{}] {}{}", track.label, track.language, track.url, default);
        }
    }

    Ok(())
}

/// Show one page of a comic with its overlay
async fn read_work(
    work_id: &str,
    stream: Option<String>,
    locale: Option<String>,
    page: u32,
) -> Result<()> {
    let (library, fetcher) = open_library().await?;
    let snapshot = library.snapshot();
    let work = find_work(&snapshot, work_id)?;

    let prefs = MediaPreferences {
        stream,
        locale: locale.or_else(|| config::config().ok().and_then(|c| c.playback.locale.clone())),
        max_height: None,
    };

    let ResolvedMedia::Pages {
        stream_key,
        chapter,
    } = resolve_media(work, &prefs)?
    else {
        anyhow::bail!("{} is a {}, use `anigato play`", work.id, work.work_type);
    };

    let mut cursor = ComicCursor::new(&chapter.pages)
        .with_context(|| format!("No pages in {}", stream_key))?;
    let index = PageIndex::from_page_number(page).context("Pages start at 1")?;
    cursor.seek(index);

    let (number, total) = cursor.position();
    let title = chapter.title.as_deref().unwrap_or(stream_key);
    println!("{} - {}", display_title(work, prefs.locale.as_deref()), title);
    println!("Page {} / {}: {}", number, total, cursor.current().url);

    let overlays = OverlaySynchronizer::new(fetcher);
    let view = overlays
        .overlay_for_page(
            work,
            stream_key,
            prefs.locale.as_deref(),
            cursor.index(),
            snapshot.origin_of(work_id),
        )
        .await;

    match view {
        OverlayView::Balloons(balloons) if balloons.is_empty() => println!("(no dialogue)"),
        OverlayView::Balloons(balloons) => {
            for balloon in balloons {
                println!("  [{:>5.1}%, {:>5.1}%] {}", balloon.x, balloon.y, balloon.text);
            }
        }
        OverlayView::NoOverlay | OverlayView::Superseded => println!("(no overlay)"),
    }

    Ok(())
}

/// Remove everything from the library
async fn clear_library(yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!("This removes every manifest and work. Re-run with --yes to confirm");
    }

    let (library, _) = open_library().await?;
    library.clear().await?;
    println!("Library cleared");

    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let config = config::config()?;

    println!("Home: {}", config.home.display());
    println!("Database: {}", config.database.display());
    match &config.config_file {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (none)"),
    }
    println!(
        "Locale: {}",
        config.playback.locale.as_deref().unwrap_or("(first available)")
    );
    match config.playback.max_height {
        Some(height) => println!("Max quality: {}p", height),
        None => println!("Max quality: (best available)"),
    }

    Ok(())
}
