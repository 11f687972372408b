//! Routing of logical build paths to their backing stores.
//!
//! The package resolver sees a single unified tree in which the standard
//! library lives under `goroot/…` and user code under `gopath/…`. The
//! router picks the backing filesystem from the first path element and
//! passes the path through verbatim, so the same logical path is valid on
//! both sides of the seam.

use std::io::{self, Read, Write};
use std::sync::Arc;

use super::{DirEntry, FileStat, Filesystem};

/// Dispatches logical paths to the goroot or gopath filesystem.
pub struct FsRouter {
    root: Arc<dyn Filesystem>,
    path: Arc<dyn Filesystem>,
}

impl FsRouter {
    /// Creates a router over the given goroot and gopath stores.
    pub fn new(root: Arc<dyn Filesystem>, path: Arc<dyn Filesystem>) -> Self {
        Self { root, path }
    }

    /// Selects the backing store for a logical path.
    ///
    /// # Panics
    ///
    /// Panics if the first path element is neither `goroot` nor `gopath`.
    /// Such a path can only be produced by a bug in the caller, never by
    /// user input.
    pub fn filesystem(&self, fpath: &str) -> &Arc<dyn Filesystem> {
        let first = fpath
            .split('/')
            .find(|seg| !seg.is_empty() && *seg != ".")
            .unwrap_or("");
        match first {
            "goroot" => &self.root,
            "gopath" => &self.path,
            other => panic!("top-level directory must be goroot or gopath, got {other:?}"),
        }
    }
}

impl Filesystem for FsRouter {
    fn stat(&self, path: &str) -> io::Result<FileStat> {
        self.filesystem(path).stat(path)
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        self.filesystem(path).open(path)
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        self.filesystem(path).read_dir(path)
    }

    fn create(&self, path: &str) -> io::Result<Box<dyn Write + Send>> {
        self.filesystem(path).create(path)
    }

    fn mkdir_all(&self, path: &str) -> io::Result<()> {
        self.filesystem(path).mkdir_all(path)
    }
}
