//! SQLite persistence for manifests and works.
//!
//! Two tables, each row holding the record as a JSON body plus the columns
//! needed to look it up:
//!
//! ```text
//! manifests(seq, id, maintainer, version, source_url, ingested_at, body)
//! works(id, manifest_id, work_type, original_title, body)
//! ```
//!
//! Manifest rows get an opaque UUID at insert time. The (maintainer, version)
//! pair is indexed but not unique: uniqueness is the dedup engine's call,
//! made inside the same transaction as the write.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Manifest, Work};

use super::identity::{collapse_works, is_duplicate_manifest, manifest_key, ManifestKey};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS manifests (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    maintainer TEXT NOT NULL,
    version TEXT NOT NULL,
    source_url TEXT,
    ingested_at TEXT NOT NULL,
    body TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_manifests_identity ON manifests (maintainer, version);
CREATE TABLE IF NOT EXISTS works (
    id TEXT PRIMARY KEY,
    manifest_id TEXT NOT NULL,
    work_type TEXT NOT NULL,
    original_title TEXT NOT NULL,
    body TEXT NOT NULL
);
";

/// Errors from the persistent store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("corrupt {table} record `{id}`: {reason}")]
    Corrupt {
        table: &'static str,
        id: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A manifest as persisted, with its storage identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredManifest {
    /// Opaque id assigned at insert time
    pub id: String,

    /// Where the manifest was fetched from, if it came from a URL
    pub source_url: Option<String>,

    pub ingested_at: DateTime<Utc>,

    pub manifest: Manifest,
}

impl StoredManifest {
    pub fn key(&self) -> ManifestKey {
        manifest_key(&self.manifest)
    }
}

/// A work as persisted, with the manifest that last wrote it
#[derive(Debug, Clone, PartialEq)]
pub struct StoredWork {
    pub manifest_id: String,
    pub work: Work,
}

/// Full contents of the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredLibrary {
    /// In insertion order
    pub manifests: Vec<StoredManifest>,

    /// Ordered by work id
    pub works: Vec<StoredWork>,
}

/// Result of a manifest write
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Committed(StoredManifest),
    Duplicate(ManifestKey),
}

/// Handle to the library database
pub struct LibraryDb {
    conn: Connection,
}

impl LibraryDb {
    /// Open (or create) the database file, creating parent directories
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open a throwaway in-memory database
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Read both collections
    pub fn load(&self) -> Result<StoredLibrary, StorageError> {
        Ok(StoredLibrary {
            manifests: read_manifests(&self.conn)?,
            works: read_works(&self.conn)?,
        })
    }

    /// Dedup keys of every persisted manifest
    pub fn manifest_keys(&self) -> Result<HashSet<ManifestKey>, StorageError> {
        read_manifest_keys(&self.conn)
    }

    /// Persist a manifest and upsert its works as one transaction.
    ///
    /// The duplicate check runs inside the same IMMEDIATE transaction as the
    /// write, so no other writer can slip in between. A duplicate rolls back
    /// without touching anything.
    pub fn commit_manifest(
        &mut self,
        manifest: &Manifest,
        source_url: Option<&str>,
    ) -> Result<CommitOutcome, StorageError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = read_manifest_keys(&tx)?;
        if is_duplicate_manifest(&existing, manifest) {
            return Ok(CommitOutcome::Duplicate(manifest_key(manifest)));
        }

        let stored = StoredManifest {
            id: Uuid::new_v4().to_string(),
            source_url: source_url.map(str::to_string),
            ingested_at: Utc::now(),
            manifest: manifest.clone(),
        };

        tx.execute(
            "INSERT INTO manifests (id, maintainer, version, source_url, ingested_at, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                stored.id,
                manifest.maintainer,
                manifest.version,
                stored.source_url,
                stored.ingested_at.to_rfc3339(),
                serde_json::to_string(manifest)?,
            ],
        )?;

        {
            let mut upsert = tx.prepare(
                "INSERT INTO works (id, manifest_id, work_type, original_title, body)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     manifest_id = excluded.manifest_id,
                     work_type = excluded.work_type,
                     original_title = excluded.original_title,
                     body = excluded.body",
            )?;

            for work in collapse_works(&manifest.works) {
                upsert.execute(params![
                    work.id,
                    stored.id,
                    work.work_type.as_str(),
                    work.original_title,
                    serde_json::to_string(work)?,
                ])?;
            }
        }

        tx.commit()?;
        debug!(manifest_id = %stored.id, works = manifest.works.len(), "Committed manifest");

        Ok(CommitOutcome::Committed(stored))
    }

    /// Empty both tables in one transaction
    pub fn clear(&mut self) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM works", [])?;
        tx.execute("DELETE FROM manifests", [])?;
        tx.commit()?;
        Ok(())
    }
}

fn read_manifest_keys(conn: &Connection) -> Result<HashSet<ManifestKey>, StorageError> {
    let mut stmt = conn.prepare("SELECT maintainer, version FROM manifests")?;
    let keys = stmt
        .query_map([], |row| Ok(ManifestKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(keys)
}

fn read_manifests(conn: &Connection) -> Result<Vec<StoredManifest>, StorageError> {
    let mut stmt =
        conn.prepare("SELECT id, source_url, ingested_at, body FROM manifests ORDER BY seq")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, source_url, ingested_at, body)| -> Result<StoredManifest, StorageError> {
            let ingested_at = DateTime::parse_from_rfc3339(&ingested_at)
                .map_err(|e| corrupt("manifests", &id, e))?
                .with_timezone(&Utc);
            let manifest = serde_json::from_str(&body).map_err(|e| corrupt("manifests", &id, e))?;
            Ok(StoredManifest {
                id,
                source_url,
                ingested_at,
                manifest,
            })
        })
        .collect()
}

fn read_works(conn: &Connection) -> Result<Vec<StoredWork>, StorageError> {
    let mut stmt = conn.prepare("SELECT id, manifest_id, body FROM works ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, manifest_id, body)| -> Result<StoredWork, StorageError> {
            let work = serde_json::from_str(&body).map_err(|e| corrupt("works", &id, e))?;
            Ok(StoredWork { manifest_id, work })
        })
        .collect()
}

fn corrupt(table: &'static str, id: &str, reason: impl std::fmt::Display) -> StorageError {
    StorageError::Corrupt {
        table,
        id: id.to_string(),
        reason: reason.to_string(),
    }
}
