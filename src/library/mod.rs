//! Persistent library of manifests and works.
//!
//! # Layout
//!
//! - `schema`: structural validation of incoming manifest JSON
//! - `identity`: dedup keys (manifest rejected, work upserted)
//! - `db`: SQLite tables and transactions
//! - `store`: the owned [`Library`] handle and its observable read model
//!
//! # Storage
//!
//! ```text
//! ~/.anigato/
//! └── library.db     # manifests + works tables
//! ```

pub mod db;
pub mod identity;
pub mod schema;
pub mod store;

pub use db::{LibraryDb, StorageError, StoredLibrary, StoredManifest, StoredWork};
pub use identity::{is_duplicate_manifest, manifest_key, ManifestKey};
pub use schema::{validate, validate_slice, ValidationError};
pub use store::{IngestOutcome, Library, LibraryError, LibrarySnapshot, RejectReason};
