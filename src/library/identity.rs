//! Identity keys and deduplication policy.
//!
//! Manifests and works deduplicate differently:
//! - Manifest: keyed by (maintainer, version); a known key is rejected
//! - Work: keyed by `id`; a known id is replaced (upsert)

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::{Manifest, Work};

/// Dedup key of a manifest
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManifestKey {
    pub maintainer: String,
    pub version: String,
}

impl ManifestKey {
    pub fn new(maintainer: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            maintainer: maintainer.into(),
            version: version.into(),
        }
    }
}

impl std::fmt::Display for ManifestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.maintainer, self.version)
    }
}

pub fn manifest_key(manifest: &Manifest) -> ManifestKey {
    ManifestKey::new(&manifest.maintainer, &manifest.version)
}

/// Whether `manifest` is already known and must be rejected
pub fn is_duplicate_manifest(existing: &HashSet<ManifestKey>, manifest: &Manifest) -> bool {
    existing.contains(&manifest_key(manifest))
}

/// Dedup key of a work
pub fn work_key(work: &Work) -> &str {
    &work.id
}

/// Collapse works sharing an id into one entry per id.
///
/// The last occurrence wins (same as applying the upserts in order) and
/// keeps the position of the first occurrence.
pub fn collapse_works(works: &[Work]) -> Vec<&Work> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut collapsed: Vec<&Work> = Vec::with_capacity(works.len());

    for work in works {
        let seen = positions.get(work_key(work)).copied();
        match seen {
            Some(pos) => collapsed[pos] = work,
            None => {
                positions.insert(work_key(work), collapsed.len());
                collapsed.push(work);
            }
        }
    }

    collapsed
}
