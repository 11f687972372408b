//! Build context: the target environment description fed to the package
//! resolver.
//!
//! The JavaScript target masquerades as `darwin/js` so the standard
//! library's platform-specific file selection picks the files the overlay
//! expects. Cgo stays enabled by default so an `import "C"` is detected and
//! rejected with a proper error instead of silently selecting the non-cgo
//! file set.

mod fixups;

pub use fixups::{apply_context_fixups, apply_file_fixups, host_goarch};

use std::io::{self, Read};
use std::sync::Arc;

use crate::vfs::{DirEntry, Filesystem};

/// Go release the toolchain presents as.
pub const GO_VERSION: &str = "go1.12";

/// Target environment for a single import operation.
///
/// A fresh context is built per import so per-package fixups never leak
/// between packages.
pub struct BuildContext {
    pub goos: String,
    pub goarch: String,
    pub compiler: String,
    pub install_suffix: String,
    pub build_tags: Vec<String>,
    pub release_tags: Vec<String>,
    pub cgo_enabled: bool,
    fs: Arc<dyn Filesystem>,
}

impl BuildContext {
    /// Creates the standard context bound to the goroot/gopath router.
    ///
    /// `netgo` is always appended to the caller's build tags: the pure-Go
    /// network stack is the only one that can run in a browser.
    pub fn new(fs: Arc<dyn Filesystem>, install_suffix: &str, build_tags: &[String]) -> Self {
        let mut tags = build_tags.to_vec();
        tags.push("netgo".to_string());
        Self {
            goos: "darwin".to_string(),
            goarch: "js".to_string(),
            compiler: "gc".to_string(),
            install_suffix: install_suffix.to_string(),
            build_tags: tags,
            release_tags: release_tags(),
            cgo_enabled: true,
            fs,
        }
    }

    /// Creates the overlay context bound to the bundled natives tree.
    /// No user build tags apply and cgo is off.
    pub fn natives(fs: Arc<dyn Filesystem>) -> Self {
        Self {
            goos: "darwin".to_string(),
            goarch: "js".to_string(),
            compiler: "gc".to_string(),
            install_suffix: String::new(),
            build_tags: Vec::new(),
            release_tags: release_tags(),
            cgo_enabled: false,
            fs,
        }
    }

    pub fn fs(&self) -> &Arc<dyn Filesystem> {
        &self.fs
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.fs.is_dir(path)
    }

    pub fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        self.fs.read_dir(path)
    }

    pub fn open_file(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        self.fs.open(path)
    }

    /// Returns true if a single build tag is satisfied by this context.
    pub fn matches_tag(&self, tag: &str) -> bool {
        tag == self.goos
            || tag == self.goarch
            || tag == self.compiler
            || (tag == "cgo" && self.cgo_enabled)
            || self.build_tags.iter().any(|t| t == tag)
            || self.release_tags.iter().any(|t| t == tag)
    }
}

fn release_tags() -> Vec<String> {
    // go1.12 implies every earlier release tag.
    (1..=12).map(|minor| format!("go1.{minor}")).collect()
}
