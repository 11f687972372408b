//! Precomputed standard-library index.
//!
//! Deployments ship a static table of content hashes for every standard
//! package, keyed by minification mode, plus the prelude hashes the loader
//! needs. Packages present in the table are served from the CDN instead of
//! being compiled, unless the caller forces source compilation for them.
//!
//! Precompiled archives themselves live in a separate [`StandardArchives`]
//! set; the hash index alone is enough to assemble a program, the archive
//! set is additionally needed to satisfy imports of standard packages.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::codegen::Archive;
use crate::error::{BuildError, BuildResult};

/// A pair of hex content hashes, one per minification mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashPair {
    /// Hash of the minified rendering.
    pub min: String,
    /// Hash of the non-minified rendering.
    pub max: String,
}

impl HashPair {
    pub fn new(min: impl Into<String>, max: impl Into<String>) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
        }
    }

    /// Selects the hash for a minification mode.
    pub fn for_minified(&self, minify: bool) -> &str {
        if minify {
            &self.min
        } else {
            &self.max
        }
    }
}

/// Static mapping of standard import paths to precomputed hashes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardIndex {
    /// Import path → hash pair.
    pub packages: HashMap<String, HashPair>,
    /// Hashes of the runtime prelude, referenced by every loader.
    pub prelude: HashPair,
}

impl StandardIndex {
    /// Returns true if `import_path` has a precomputed entry.
    pub fn contains(&self, import_path: &str) -> bool {
        self.packages.contains_key(import_path)
    }

    /// The hex hash for `import_path` in the given minification mode.
    pub fn hash_hex(&self, import_path: &str, minify: bool) -> Option<&str> {
        self.packages
            .get(import_path)
            .map(|pair| pair.for_minified(minify))
    }

    /// The decoded hash bytes for `import_path`.
    pub fn hash_bytes(&self, import_path: &str, minify: bool) -> BuildResult<Option<Vec<u8>>> {
        match self.hash_hex(import_path, minify) {
            None => Ok(None),
            Some(hex_hash) => hex::decode(hex_hash)
                .map(Some)
                .map_err(|_| BuildError::InvalidIndexHash {
                    import_path: import_path.to_string(),
                }),
        }
    }
}

/// A pair of precompiled archives, one per minification mode.
#[derive(Debug, Clone)]
pub struct ArchivePair {
    pub min: Arc<Archive>,
    pub max: Arc<Archive>,
}

impl ArchivePair {
    pub fn for_minified(&self, minify: bool) -> &Arc<Archive> {
        if minify {
            &self.min
        } else {
            &self.max
        }
    }
}

/// Precompiled standard-library archives, keyed by import path.
#[derive(Debug, Clone, Default)]
pub struct StandardArchives {
    archives: HashMap<String, ArchivePair>,
}

impl StandardArchives {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, import_path: impl Into<String>, pair: ArchivePair) {
        self.archives.insert(import_path.into(), pair);
    }

    pub fn get(&self, import_path: &str) -> Option<&ArchivePair> {
        self.archives.get(import_path)
    }

    pub fn is_empty(&self) -> bool {
        self.archives.is_empty()
    }
}
