//! Filesystem abstraction for build inputs and scratch output.
//!
//! The build session never touches the host filesystem directly. Source
//! trees, the scratch area for compiled archives, and the bundled overlay
//! all implement the [`Filesystem`] trait, and logical paths are dispatched
//! to a backing store by the [`FsRouter`].
//!
//! The interface is byte-oriented and object-safe so stores can be handed
//! around as `Arc<dyn Filesystem>`. Read-only stores keep the default
//! `create`/`mkdir_all` implementations, which fail with `Unsupported`.

mod memory;
mod router;

pub use memory::MemoryFs;
pub use router::FsRouter;

use std::io::{self, Read, Write};

/// Metadata for a single path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// True if the path names a directory.
    pub is_dir: bool,
    /// File size in bytes. Zero for directories.
    pub size: u64,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Base name of the entry, without any directory components.
    pub name: String,
    /// True if the entry is a directory.
    pub is_dir: bool,
}

/// A byte-oriented filesystem.
///
/// Implementations must be safe to share across threads. Directory listings
/// are sorted by name so callers observe deterministic order.
pub trait Filesystem: Send + Sync {
    /// Returns metadata for `path`, or `NotFound`.
    fn stat(&self, path: &str) -> io::Result<FileStat>;

    /// Opens the file at `path` for reading. Directories cannot be opened.
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>>;

    /// Lists the entries of the directory at `path`, sorted by name.
    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>>;

    /// Creates (or truncates) the file at `path` for writing.
    ///
    /// The contents become visible when the writer is dropped. Read-only
    /// stores return `Unsupported`.
    fn create(&self, path: &str) -> io::Result<Box<dyn Write + Send>> {
        let _ = path;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "filesystem is read-only",
        ))
    }

    /// Creates the directory at `path` along with any missing parents.
    fn mkdir_all(&self, path: &str) -> io::Result<()> {
        let _ = path;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "filesystem is read-only",
        ))
    }

    /// Returns true if `path` names a directory.
    fn is_dir(&self, path: &str) -> bool {
        self.stat(path).map(|s| s.is_dir).unwrap_or(false)
    }
}

/// Reads the whole file at `path` into a byte vector.
pub fn read_file(fs: &dyn Filesystem, path: &str) -> io::Result<Vec<u8>> {
    let mut r = fs.open(path)?;
    let mut buf = Vec::new();
    r.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Joins two slash-separated path fragments.
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Returns the directory portion of a slash-separated path, or `""` if the
/// path has a single component.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..i],
        None => "",
    }
}
