//! Thread-safe in-memory filesystem.
//!
//! Used as the default gopath, the default scratch area for compiled
//! archives, the materialized overlay tree, and throughout the tests.
//! Directories are implicit: a directory exists whenever a file lives
//! somewhere beneath it.

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, RwLock};

use super::{DirEntry, FileStat, Filesystem};

/// An in-memory filesystem keyed by slash-separated paths.
///
/// Cloning is cheap; clones share the same underlying file map.
#[derive(Clone, Default)]
pub struct MemoryFs {
    files: Arc<RwLock<BTreeMap<String, Arc<Vec<u8>>>>>,
}

impl MemoryFs {
    /// Creates an empty filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `contents` to `path`, replacing any existing file.
    pub fn write_file(&self, path: &str, contents: impl Into<Vec<u8>>) {
        let path = normalize(path);
        self.files
            .write()
            .expect("memory fs lock poisoned")
            .insert(path, Arc::new(contents.into()));
    }

    /// Returns the contents of the file at `path`, if present.
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        let path = normalize(path);
        self.files
            .read()
            .expect("memory fs lock poisoned")
            .get(&path)
            .map(|data| data.as_ref().clone())
    }

    /// Returns the number of files stored.
    pub fn len(&self) -> usize {
        self.files.read().expect("memory fs lock poisoned").len()
    }

    /// Returns true if no files are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Trims leading/trailing separators and collapses empty segments, so that
/// `/goroot/src/fmt/` and `goroot/src/fmt` address the same entry.
fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect::<Vec<_>>()
        .join("/")
}

impl Filesystem for MemoryFs {
    fn stat(&self, path: &str) -> io::Result<FileStat> {
        let path = normalize(path);
        let files = self.files.read().expect("memory fs lock poisoned");
        if let Some(data) = files.get(&path) {
            return Ok(FileStat {
                is_dir: false,
                size: data.len() as u64,
            });
        }
        let prefix = format!("{path}/");
        if path.is_empty() && !files.is_empty() {
            return Ok(FileStat {
                is_dir: true,
                size: 0,
            });
        }
        if files.range(prefix.clone()..).next().is_some_and(|(k, _)| k.starts_with(&prefix)) {
            return Ok(FileStat {
                is_dir: true,
                size: 0,
            });
        }
        Err(io::Error::new(io::ErrorKind::NotFound, path))
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        let path = normalize(path);
        let files = self.files.read().expect("memory fs lock poisoned");
        match files.get(&path) {
            Some(data) => Ok(Box::new(Cursor::new(data.as_ref().clone()))),
            None => Err(io::Error::new(io::ErrorKind::NotFound, path)),
        }
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        let path = normalize(path);
        let files = self.files.read().expect("memory fs lock poisoned");
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };

        let mut entries: Vec<DirEntry> = Vec::new();
        let mut seen_dirs: Vec<String> = Vec::new();
        for (key, _) in files.range(prefix.clone()..) {
            if !key.starts_with(&prefix) {
                break;
            }
            let rest = &key[prefix.len()..];
            match rest.find('/') {
                None => entries.push(DirEntry {
                    name: rest.to_string(),
                    is_dir: false,
                }),
                Some(i) => {
                    let dir = rest[..i].to_string();
                    if seen_dirs.last() != Some(&dir) {
                        seen_dirs.push(dir.clone());
                        entries.push(DirEntry {
                            name: dir,
                            is_dir: true,
                        });
                    }
                }
            }
        }
        if entries.is_empty() && !path.is_empty() && files.get(&path).is_none() {
            return Err(io::Error::new(io::ErrorKind::NotFound, path));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn create(&self, path: &str) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(MemoryFileWriter {
            path: normalize(path),
            buf: Vec::new(),
            files: Arc::clone(&self.files),
        }))
    }

    fn mkdir_all(&self, _path: &str) -> io::Result<()> {
        // Directories are implicit; creating them is a no-op.
        Ok(())
    }
}

/// Pending write into a [`MemoryFs`]. The file becomes visible on drop.
struct MemoryFileWriter {
    path: String,
    buf: Vec<u8>,
    files: Arc<RwLock<BTreeMap<String, Arc<Vec<u8>>>>>,
}

impl Write for MemoryFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MemoryFileWriter {
    fn drop(&mut self) {
        self.files
            .write()
            .expect("memory fs lock poisoned")
            .insert(self.path.clone(), Arc::new(std::mem::take(&mut self.buf)));
    }
}
