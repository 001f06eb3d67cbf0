//! Domain types for the anigato library.
//!
//! This module contains the core data structures:
//! - Manifest: Maintainer catalogs and the works they list
//! - Overlay: Per-page localization scripts

pub mod manifest;
pub mod overlay;

// Re-export commonly used types
pub use manifest::{
    ComicChapter, ComicPage, ExternalId, ExternalIds, Localization, Manifest, RawMedia, Track,
    TrackKind, VideoFormat, VideoRendition, Work, WorkType,
};
pub use overlay::{Balloon, BalloonStyle, OverlayScript, PageIndex, ScriptPage};
