//! Per-work derived views for playback and reading.
//!
//! - `resolver`: active stream, rendition, page sequence and subtitles
//! - `overlay`: localized balloons for a page, with a per-view script cache
//!
//! Presentation re-queries these on every navigation; nothing is pushed.

pub mod overlay;
pub mod resolver;

pub use overlay::{
    balloons_for_page, resolve_overlay_url, Navigation, OverlayContext, OverlaySynchronizer,
    OverlayView,
};
pub use resolver::{
    display_title, quality_rank, resolve_media, select_localization, select_rendition,
    select_stream_key, subtitles_for, ComicCursor, MediaPreferences, ResolveError, ResolvedMedia,
};
