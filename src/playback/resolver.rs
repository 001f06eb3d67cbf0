//! Media resolution: which stream, which rendition, which pages, which subtitles.
//!
//! Every function here is a pure query over a [`Work`]. Stream keys are
//! sorted before the "first key" rule applies, so the result never depends
//! on the order a manifest happened to list them in.

use thiserror::Error;
use tracing::debug;

use crate::domain::{
    ComicChapter, ComicPage, Localization, PageIndex, RawMedia, Track, TrackKind, VideoRendition,
    Work,
};

/// No usable content for a work
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("work `{0}` has no raw media")]
    NoRawMedia(String),

    #[error("stream `{stream_key}` of work `{work_id}` has no playable content")]
    NoContent { work_id: String, stream_key: String },
}

/// Caller preferences for resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaPreferences {
    /// Preferred stream key, e.g. "episode_3"
    pub stream: Option<String>,

    /// Preferred locale, e.g. "pt-BR"
    pub locale: Option<String>,

    /// Highest acceptable vertical resolution, e.g. 720
    pub max_height: Option<u32>,
}

/// Resolved playable content, discriminated once by work type
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedMedia<'a> {
    Video {
        stream_key: &'a str,
        rendition: &'a VideoRendition,
        /// Every rendition of the stream, in manifest order
        renditions: &'a [VideoRendition],
    },
    Pages {
        stream_key: &'a str,
        chapter: &'a ComicChapter,
    },
}

impl<'a> ResolvedMedia<'a> {
    pub fn stream_key(&self) -> &'a str {
        match self {
            ResolvedMedia::Video { stream_key, .. } | ResolvedMedia::Pages { stream_key, .. } => {
                *stream_key
            }
        }
    }
}

/// Pick the active stream key.
///
/// A preference naming an existing key wins, otherwise the
/// lexicographically smallest key.
pub fn select_stream_key<'a, I>(keys: I, preference: Option<&str>) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut keys: Vec<&'a str> = keys.into_iter().collect();
    keys.sort_unstable();

    if let Some(preferred) = preference {
        if let Some(key) = keys.iter().find(|k| **k == preferred) {
            return Some(*key);
        }
    }

    keys.first().copied()
}

/// Vertical resolution implied by a quality label ("1080p", "720", "4K").
///
/// `None` when no ranking can be derived.
pub fn quality_rank(quality: &str) -> Option<u32> {
    let label = quality.trim().to_ascii_lowercase();

    let named = match label.as_str() {
        "8k" => Some(4320),
        "4k" | "uhd" => Some(2160),
        "2k" | "qhd" => Some(1440),
        "fhd" | "full hd" => Some(1080),
        "hd" => Some(720),
        "sd" => Some(480),
        _ => None,
    };
    if named.is_some() {
        return named;
    }

    let digits: String = label.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Pick a rendition: highest ranked quality, earliest position on ties.
///
/// With `max_height`, renditions above the cap are skipped unless nothing
/// ranked fits under it. When no label ranks at all, the first rendition wins.
pub fn select_rendition(
    renditions: &[VideoRendition],
    max_height: Option<u32>,
) -> Option<&VideoRendition> {
    let ranked: Vec<(u32, usize)> = renditions
        .iter()
        .enumerate()
        .filter_map(|(pos, r)| quality_rank(&r.quality).map(|rank| (rank, pos)))
        .collect();

    if ranked.is_empty() {
        return renditions.first();
    }

    let capped = max_height.and_then(|cap| best_ranked(ranked.iter().filter(|(rank, _)| *rank <= cap)));
    let pos = capped.or_else(|| best_ranked(ranked.iter()))?;

    renditions.get(pos)
}

/// Highest rank, lowest position among equals
fn best_ranked<'r>(candidates: impl Iterator<Item = &'r (u32, usize)>) -> Option<usize> {
    candidates
        .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
        .map(|&(_, pos)| pos)
}

/// Resolve the active stream of a work to its playable content
pub fn resolve_media<'a>(
    work: &'a Work,
    prefs: &MediaPreferences,
) -> Result<ResolvedMedia<'a>, ResolveError> {
    let media = work
        .raw_media
        .as_ref()
        .filter(|media| !media.is_empty())
        .ok_or_else(|| ResolveError::NoRawMedia(work.id.clone()))?;

    let stream_key = select_stream_key(media.keys().map(String::as_str), prefs.stream.as_deref())
        .ok_or_else(|| ResolveError::NoRawMedia(work.id.clone()))?;

    let no_content = || ResolveError::NoContent {
        work_id: work.id.clone(),
        stream_key: stream_key.to_string(),
    };

    match media.get(stream_key) {
        Some(RawMedia::Video(renditions)) if !work.work_type.is_paged() => {
            let rendition = select_rendition(renditions, prefs.max_height).ok_or_else(no_content)?;
            Ok(ResolvedMedia::Video {
                stream_key,
                rendition,
                renditions,
            })
        }
        Some(RawMedia::Comic(chapter)) if work.work_type.is_paged() => {
            if chapter.pages.is_empty() {
                return Err(no_content());
            }
            Ok(ResolvedMedia::Pages {
                stream_key,
                chapter,
            })
        }
        _ => {
            debug!(work = %work.id, stream = stream_key, work_type = %work.work_type, "Raw media shape does not match work type");
            Err(no_content())
        }
    }
}

/// Pick the localization for a locale preference.
///
/// Exact tag first (case-insensitive), then same primary language
/// ("pt" vs "pt-BR"). Without a preference, the first localization.
pub fn select_localization<'a>(work: &'a Work, locale: Option<&str>) -> Option<&'a Localization> {
    let localizations = work.localizations();

    let Some(wanted) = locale else {
        return localizations.first();
    };

    localizations
        .iter()
        .find(|l| l.locale.eq_ignore_ascii_case(wanted))
        .or_else(|| {
            let language = primary_language(wanted);
            localizations
                .iter()
                .find(|l| primary_language(&l.locale).eq_ignore_ascii_case(language))
        })
}

fn primary_language(locale: &str) -> &str {
    locale.split(['-', '_']).next().unwrap_or(locale)
}

/// Subtitle tracks for a stream. Empty means "play without subtitles".
///
/// Tracks keyed by a stream the work does not have are ignored.
pub fn subtitles_for<'a>(work: &'a Work, stream_key: &str, locale: Option<&str>) -> Vec<&'a Track> {
    if !work.has_stream(stream_key) {
        return Vec::new();
    }

    select_localization(work, locale)
        .map(|l| {
            l.tracks_for(stream_key)
                .iter()
                .filter(|t| t.kind == TrackKind::Subtitle)
                .collect()
        })
        .unwrap_or_default()
}

/// Localized title, falling back to the original
pub fn display_title<'a>(work: &'a Work, locale: Option<&str>) -> &'a str {
    select_localization(work, locale)
        .and_then(|l| l.title.as_deref())
        .unwrap_or(&work.original_title)
}

/// Page navigation over a resolved page sequence.
///
/// Movement is clamped to the sequence; it never wraps.
#[derive(Debug, Clone)]
pub struct ComicCursor<'a> {
    pages: &'a [ComicPage],
    index: usize,
}

impl<'a> ComicCursor<'a> {
    /// `None` for an empty sequence
    pub fn new(pages: &'a [ComicPage]) -> Option<Self> {
        if pages.is_empty() {
            None
        } else {
            Some(Self { pages, index: 0 })
        }
    }

    pub fn current(&self) -> &'a ComicPage {
        &self.pages[self.index]
    }

    pub fn index(&self) -> PageIndex {
        PageIndex::new(self.index)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 == self.pages.len()
    }

    /// Advance one page; `false` at the end
    pub fn next_page(&mut self) -> bool {
        if self.is_last() {
            return false;
        }
        self.index += 1;
        true
    }

    /// Go back one page; `false` at the start
    pub fn prev_page(&mut self) -> bool {
        if self.is_first() {
            return false;
        }
        self.index -= 1;
        true
    }

    /// Jump to a page, clamped to the last one
    pub fn seek(&mut self, index: PageIndex) {
        self.index = index.get().min(self.pages.len() - 1);
    }

    /// "Page n / total" as shown to readers
    pub fn position(&self) -> (u32, usize) {
        (self.index().page_number(), self.pages.len())
    }
}
