//! anigato - Decentralized multimedia library
//!
//! Ingests maintainer-published manifests cataloguing videos, comics and
//! books, merges them into a local library without duplication, and resolves
//! what to play or show for a work: the raw asset, its subtitles, and the
//! localized dialogue balloons for a comic page.
//!
//! # Architecture
//!
//! ```text
//! manifest JSON → schema → Library (SQLite + read model) → resolver → overlay
//! ```
//!
//! - Manifests are keyed by (maintainer, version) and never replaced
//! - Works are keyed by id and replaced by later manifests
//! - Each ingestion is one transaction; observers see only committed states
//!
//! # Modules
//!
//! - `adapters`: Fetching documents by URL (HTTP)
//! - `domain`: Data structures (Manifest, Work, OverlayScript)
//! - `library`: Validation, dedup and the persistent store
//! - `playback`: Media resolution and overlay synchronization
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Import a manifest
//! anigato import https://example.org/manifest.json
//!
//! # Resolve playback for a work
//! anigato play <work-id> --locale pt-BR
//!
//! # Show a comic page with its balloons
//! anigato read <work-id> --page 3
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod library;
pub mod playback;

// Re-export main types at crate root for convenience
pub use adapters::{FetchError, Fetcher, HttpFetcher};
pub use domain::{Manifest, OverlayScript, PageIndex, Work, WorkType};
pub use library::{IngestOutcome, Library, LibraryDb, LibraryError, LibrarySnapshot};
pub use playback::{resolve_media, MediaPreferences, OverlaySynchronizer, OverlayView, ResolvedMedia};
