//! Overlay synchronization: which localized balloons are visible on a page.
//!
//! Scripts are fetched at most once per URL while the same
//! (work, stream, locale) is being viewed, and concurrent loads of one URL
//! share a single fetch. Switching any of the three evicts the cache. Every
//! navigation bumps a generation counter; a page whose script arrives after a
//! newer navigation is not rendered, though the script stays cached for the
//! view it was loaded for.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use crate::adapters::{resolve_url, FetchError, Fetcher};
use crate::domain::{Balloon, OverlayScript, PageIndex, Work};

use super::resolver::select_localization;

/// Overlay script URL for a stream in a locale.
///
/// `None` when the locale has no overlay for the stream, or when the overlay
/// points at a stream the work does not have.
pub fn resolve_overlay_url<'a>(work: &'a Work, stream_key: &str, locale: Option<&str>) -> Option<&'a str> {
    if !work.has_stream(stream_key) {
        return None;
    }
    select_localization(work, locale)?.overlay_for(stream_key)
}

/// Balloons on a 0-based page; empty when the page has no dialogue
pub fn balloons_for_page(script: &OverlayScript, page: impl Into<PageIndex>) -> &[Balloon] {
    script
        .page(page.into())
        .map(|p| p.balloons.as_slice())
        .unwrap_or_default()
}

/// What is currently viewed; a change evicts cached scripts
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OverlayContext {
    pub work_id: String,
    pub stream_key: String,
    pub locale: Option<String>,
}

impl OverlayContext {
    pub fn new(work: &Work, stream_key: &str, locale: Option<&str>) -> Self {
        Self {
            work_id: work.id.clone(),
            stream_key: stream_key.to_string(),
            locale: locale.map(str::to_string),
        }
    }
}

/// Token for one navigation; stale once a newer navigation happens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigation {
    generation: u64,
}

/// Overlay answer for one page
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayView {
    /// Balloons to draw (possibly none for this page)
    Balloons(Vec<Balloon>),

    /// No overlay for this stream/locale, or it could not be loaded
    NoOverlay,

    /// A newer navigation happened while this one was loading
    Superseded,
}

/// One script per URL; empty until a load succeeds
type ScriptSlot = Arc<OnceCell<Arc<OverlayScript>>>;

#[derive(Debug, Default)]
struct SyncState {
    context: Option<OverlayContext>,
    generation: u64,
    cache: HashMap<String, ScriptSlot>,
}

/// Cache of overlay scripts for the current view
pub struct OverlaySynchronizer {
    fetcher: Arc<dyn Fetcher>,
    state: Mutex<SyncState>,
}

impl OverlaySynchronizer {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            state: Mutex::new(SyncState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        // The state stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a navigation, evicting the cache if the context changed
    pub fn navigate(&self, context: OverlayContext) -> Navigation {
        let mut state = self.state();
        if state.context.as_ref() != Some(&context) {
            if !state.cache.is_empty() {
                debug!(evicted = state.cache.len(), "Overlay context changed, evicting scripts");
            }
            state.cache.clear();
            state.context = Some(context);
        }
        state.generation += 1;
        Navigation {
            generation: state.generation,
        }
    }

    /// Whether no navigation happened since `nav`
    pub fn is_current(&self, nav: Navigation) -> bool {
        self.state().generation == nav.generation
    }

    /// Drop all cached scripts and forget the current view
    pub fn reset(&self) {
        let mut state = self.state();
        state.cache.clear();
        state.context = None;
        state.generation += 1;
    }

    /// Number of cached scripts
    pub fn cached_scripts(&self) -> usize {
        self.state()
            .cache
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    /// Slot for `url` in the current view, or a detached one for any other view
    fn slot(&self, context: &OverlayContext, url: &str) -> ScriptSlot {
        let mut state = self.state();
        if state.context.as_ref() == Some(context) {
            state.cache.entry(url.to_string()).or_default().clone()
        } else {
            ScriptSlot::default()
        }
    }

    async fn fetch_script(&self, url: &str) -> Result<Arc<OverlayScript>, FetchError> {
        let bytes = self.fetcher.fetch_bytes(url).await?;
        let script: OverlayScript = serde_json::from_slice(&bytes).map_err(|source| FetchError::Parse {
            url: url.to_string(),
            source,
        })?;
        Ok(Arc::new(script))
    }

    /// Load a script for `context`.
    ///
    /// Cached only while `context` is the current view; failures are never
    /// cached.
    pub async fn load_script(&self, context: &OverlayContext, url: &str) -> Result<Arc<OverlayScript>, FetchError> {
        let slot = self.slot(context, url);
        let script = slot.get_or_try_init(|| self.fetch_script(url)).await?;
        Ok(script.clone())
    }

    /// Balloons visible on `page` of `stream_key`.
    ///
    /// `base_url` is where the work's manifest came from; relative overlay
    /// URLs resolve against it. Load failures degrade to `NoOverlay`.
    #[instrument(skip(self, work, base_url), fields(work = %work.id))]
    pub async fn overlay_for_page(
        &self,
        work: &Work,
        stream_key: &str,
        locale: Option<&str>,
        page: PageIndex,
        base_url: Option<&str>,
    ) -> OverlayView {
        let context = OverlayContext::new(work, stream_key, locale);
        let nav = self.navigate(context.clone());

        let Some(href) = resolve_overlay_url(work, stream_key, locale) else {
            return OverlayView::NoOverlay;
        };

        let url = match resolve_url(base_url, href) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Cannot resolve overlay URL");
                return OverlayView::NoOverlay;
            }
        };

        let script = match self.load_script(&context, &url).await {
            Ok(script) => script,
            Err(e) => {
                if !self.is_current(nav) {
                    return OverlayView::Superseded;
                }
                warn!(error = %e, "Failed to load overlay script");
                return OverlayView::NoOverlay;
            }
        };

        if !self.is_current(nav) {
            debug!(page = page.get(), "Discarding overlay for superseded navigation");
            return OverlayView::Superseded;
        }

        OverlayView::Balloons(balloons_for_page(&script, page).to_vec())
    }
}
