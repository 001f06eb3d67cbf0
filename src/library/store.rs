//! The library: persisted manifests and works plus the read model consumers observe.
//!
//! All mutation goes through [`Library::ingest_manifest`] (and its URL /
//! raw-JSON front doors) or [`Library::clear`]. Writers are serialized by an
//! async mutex around the database handle, so the duplicate check and the
//! write of one ingestion can never interleave with another. SQLite work
//! itself runs on the blocking pool.
//!
//! After every successful mutation a fresh [`LibrarySnapshot`] is published
//! on a `watch` channel. Observers only ever see committed states.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, instrument, warn};

use crate::adapters::{FetchError, Fetcher};
use crate::domain::{Manifest, Work, WorkType};

use super::db::{CommitOutcome, LibraryDb, StorageError, StoredLibrary, StoredManifest};
use super::identity::{collapse_works, ManifestKey};
use super::schema::{validate, ValidationError};

/// Errors that can occur while mutating the library
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to fetch manifest: {0}")]
    Fetch(#[from] FetchError),

    #[error("another import is already in progress")]
    Busy,

    #[error("library has not been initialized")]
    NotInitialized,
}

impl LibraryError {
    /// Returns `true` if retrying might succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            LibraryError::Storage(_) | LibraryError::Busy => true,
            LibraryError::Fetch(e) => e.is_retryable(),
            LibraryError::Validation(_) | LibraryError::NotInitialized => false,
        }
    }
}

/// Why an ingestion was turned away without error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    DuplicateManifest(ManifestKey),
}

/// Result of a successful ingestion call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The manifest was stored and its works upserted
    Accepted { manifest_id: String, works: usize },

    /// Nothing changed
    Rejected(RejectReason),
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, IngestOutcome::Accepted { .. })
    }
}

/// Immutable view of the library at one point in time
#[derive(Debug, Clone, Default)]
pub struct LibrarySnapshot {
    /// Ordered by work id
    pub works: Vec<Work>,

    /// In insertion order
    pub manifests: Vec<StoredManifest>,

    /// True until the first load completes, and while any URL import runs
    pub is_loading: bool,

    /// Message of the last failed operation
    pub error: Option<String>,

    /// work id -> id of the manifest that last wrote it
    sources: HashMap<String, String>,
}

impl LibrarySnapshot {
    fn loading() -> Self {
        Self {
            is_loading: true,
            ..Self::default()
        }
    }

    fn from_stored(stored: StoredLibrary) -> Self {
        let mut snapshot = Self::default();
        for stored_work in stored.works {
            snapshot
                .sources
                .insert(stored_work.work.id.clone(), stored_work.manifest_id);
            snapshot.works.push(stored_work.work);
        }
        snapshot.manifests = stored.manifests;
        snapshot
    }

    /// Apply a committed manifest: append it and upsert its works by id
    fn with_committed(&self, stored: &StoredManifest) -> Self {
        let mut next = self.clone();
        for work in collapse_works(&stored.manifest.works) {
            match next.works.binary_search_by(|w| w.id.as_str().cmp(work.id.as_str())) {
                Ok(pos) => next.works[pos] = work.clone(),
                Err(pos) => next.works.insert(pos, work.clone()),
            }
            next.sources.insert(work.id.clone(), stored.id.clone());
        }
        next.manifests.push(stored.clone());
        next
    }

    /// Get a work by id
    pub fn work(&self, id: &str) -> Option<&Work> {
        self.works
            .binary_search_by(|w| w.id.as_str().cmp(id))
            .ok()
            .map(|pos| &self.works[pos])
    }

    pub fn works_of_type(&self, work_type: WorkType) -> Vec<&Work> {
        self.works
            .iter()
            .filter(|w| w.work_type == work_type)
            .collect()
    }

    /// The manifest that last wrote a work
    pub fn manifest_of(&self, work_id: &str) -> Option<&StoredManifest> {
        let manifest_id = self.sources.get(work_id)?;
        self.manifests.iter().find(|m| &m.id == manifest_id)
    }

    /// URL relative overlay references of a work resolve against
    pub fn origin_of(&self, work_id: &str) -> Option<&str> {
        self.manifest_of(work_id)?.source_url.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitState {
    Pending,
    Ready,
    Failed,
}

struct Inner {
    db: Arc<std::sync::Mutex<LibraryDb>>,
    init: InitState,
}

impl Inner {
    /// Run a database operation on the blocking pool
    async fn run<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut LibraryDb) -> Result<T, StorageError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut db = db.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            op(&mut db)
        })
        .await?
    }
}

/// Keeps `is_loading` raised while a URL import is in flight
struct ImportGuard<'a> {
    library: &'a Library,
}

impl<'a> ImportGuard<'a> {
    fn start(library: &'a Library) -> Self {
        library.imports.fetch_add(1, Ordering::SeqCst);
        library.publish(|s| s.error = None);
        Self { library }
    }
}

impl Drop for ImportGuard<'_> {
    fn drop(&mut self) {
        self.library.imports.fetch_sub(1, Ordering::SeqCst);
        self.library.publish(|_| {});
    }
}

/// Owned handle to the library. Share it by reference or `Arc`.
pub struct Library {
    inner: Mutex<Inner>,
    fetcher: Arc<dyn Fetcher>,
    state: watch::Sender<Arc<LibrarySnapshot>>,
    /// Set once the first load has finished, successfully or not
    loaded: AtomicBool,
    imports: AtomicUsize,
}

impl Library {
    /// Wrap an open database. Call [`Library::init`] before ingesting.
    pub fn new(db: LibraryDb, fetcher: Arc<dyn Fetcher>) -> Self {
        let (state, _) = watch::channel(Arc::new(LibrarySnapshot::loading()));
        Self {
            inner: Mutex::new(Inner {
                db: Arc::new(std::sync::Mutex::new(db)),
                init: InitState::Pending,
            }),
            fetcher,
            state,
            loaded: AtomicBool::new(false),
            imports: AtomicUsize::new(0),
        }
    }

    fn is_loading(&self) -> bool {
        !self.loaded.load(Ordering::SeqCst) || self.imports.load(Ordering::SeqCst) > 0
    }

    /// Current read model
    pub fn snapshot(&self) -> Arc<LibrarySnapshot> {
        self.state.borrow().clone()
    }

    /// Observe read model changes
    pub fn subscribe(&self) -> watch::Receiver<Arc<LibrarySnapshot>> {
        self.state.subscribe()
    }

    /// Load persisted state into the read model.
    ///
    /// Calling it again reloads; it never writes.
    #[instrument(skip(self))]
    pub async fn init(&self) -> Result<Arc<LibrarySnapshot>, LibraryError> {
        let mut inner = self.inner.lock().await;
        let loaded = inner.run(|db| db.load()).await;
        self.loaded.store(true, Ordering::SeqCst);

        match loaded {
            Ok(stored) => {
                inner.init = InitState::Ready;
                let snapshot = self.publish(|s| *s = LibrarySnapshot::from_stored(stored));
                info!(
                    works = snapshot.works.len(),
                    manifests = snapshot.manifests.len(),
                    "Library loaded"
                );
                Ok(snapshot)
            }
            Err(e) => {
                error!(error = %e, "Failed to load library");
                inner.init = InitState::Failed;
                self.publish(|s| s.error = Some(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Ingest an already-parsed manifest, waiting for any in-flight ingestion
    pub async fn ingest_manifest(&self, manifest: Manifest) -> Result<IngestOutcome, LibraryError> {
        let inner = self.inner.lock().await;
        let result = self.commit(&inner, manifest, None).await;
        self.record(&result);
        result
    }

    /// Like [`Library::ingest_manifest`] but fails with `Busy` instead of waiting
    pub async fn try_ingest_manifest(&self, manifest: Manifest) -> Result<IngestOutcome, LibraryError> {
        let inner = self.inner.try_lock().map_err(|_| LibraryError::Busy)?;
        let result = self.commit(&inner, manifest, None).await;
        self.record(&result);
        result
    }

    /// Validate and ingest an in-memory JSON document (bundled content)
    pub async fn ingest_value(&self, raw: &Value) -> Result<IngestOutcome, LibraryError> {
        let result = match validate(raw) {
            Ok(manifest) => {
                let inner = self.inner.lock().await;
                self.commit(&inner, manifest, None).await
            }
            Err(e) => Err(e.into()),
        };
        self.record(&result);
        result
    }

    /// Fetch, validate and ingest the manifest at `url`
    #[instrument(skip(self))]
    pub async fn ingest_manifest_from_url(&self, url: &str) -> Result<IngestOutcome, LibraryError> {
        let import = ImportGuard::start(self);
        let result = self.fetch_and_ingest(url).await;
        drop(import);

        self.record(&result);
        result
    }

    async fn fetch_and_ingest(&self, url: &str) -> Result<IngestOutcome, LibraryError> {
        let raw = self.fetcher.fetch_json(url).await?;
        let manifest = validate(&raw)?;

        let inner = self.inner.lock().await;
        self.commit(&inner, manifest, Some(url.to_string())).await
    }

    /// Empty both collections and the read model
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<(), LibraryError> {
        let mut inner = self.inner.lock().await;
        inner.run(|db| db.clear()).await?;
        // The read model now matches the (empty) store
        inner.init = InitState::Ready;
        self.loaded.store(true, Ordering::SeqCst);

        info!("Library cleared");
        self.publish(|s| *s = LibrarySnapshot::default());
        Ok(())
    }

    /// The duplicate check and write happen under the caller's lock
    async fn commit(
        &self,
        inner: &Inner,
        manifest: Manifest,
        source_url: Option<String>,
    ) -> Result<IngestOutcome, LibraryError> {
        if inner.init == InitState::Pending {
            return Err(LibraryError::NotInitialized);
        }

        let committed = inner
            .run(move |db| db.commit_manifest(&manifest, source_url.as_deref()))
            .await?;
        match committed {
            CommitOutcome::Duplicate(key) => {
                info!(manifest = %key, "Manifest already in library, skipping");
                Ok(IngestOutcome::Rejected(RejectReason::DuplicateManifest(key)))
            }
            CommitOutcome::Committed(stored) => {
                info!(
                    manifest = %stored.key(),
                    works = stored.manifest.works.len(),
                    "Manifest ingested"
                );
                let outcome = IngestOutcome::Accepted {
                    manifest_id: stored.id.clone(),
                    works: collapse_works(&stored.manifest.works).len(),
                };
                self.publish(|s| *s = s.with_committed(&stored));
                Ok(outcome)
            }
        }
    }

    /// Surface the outcome of an import attempt in the read model
    fn record(&self, result: &Result<IngestOutcome, LibraryError>) {
        match result {
            Ok(_) => {
                if self.state.borrow().error.is_some() {
                    self.publish(|s| s.error = None);
                }
            }
            Err(e) => {
                warn!(error = %e, "Import failed");
                self.publish(|s| s.error = Some(e.to_string()));
            }
        }
    }

    /// Replace the read model; `is_loading` always reflects the live counters
    fn publish(&self, update: impl FnOnce(&mut LibrarySnapshot)) -> Arc<LibrarySnapshot> {
        let mut published = Arc::default();
        self.state.send_modify(|current| {
            let mut next = (**current).clone();
            update(&mut next);
            next.is_loading = self.is_loading();
            published = Arc::new(next);
            *current = published.clone();
        });
        published
    }
}
