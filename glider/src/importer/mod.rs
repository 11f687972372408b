//! Package importer: resolves an import path to a package record.
//!
//! A [`Package`] describes what the session needs to know about one
//! directory of source: which files compile, which auxiliary scripts ride
//! along, and which import paths the package declares. Records are
//! immutable once produced.

mod constraints;
mod resolve;

pub(crate) use resolve::Resolver;

use std::sync::Arc;

use tracing::debug;

use crate::context::{apply_context_fixups, apply_file_fixups, BuildContext};
use crate::error::{BuildError, BuildResult};
use crate::natives::SUPPORT_PACKAGE;
use crate::vfs::{Filesystem, FsRouter};

/// Source roots probed by the importer, in order.
pub(crate) const SRC_ROOTS: &[&str] = &["goroot/src", "gopath/src"];

/// Resolution mode flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportMode {
    /// Stop after locating the package directory; leave the file lists
    /// empty.
    pub find_only: bool,
}

/// Everything the session knows about one resolved package.
#[derive(Debug, Clone, Default)]
pub struct Package {
    /// Import path the package resolved to. Vendored packages keep their
    /// `vendor/` segment here.
    pub import_path: String,
    /// Directory the package was loaded from.
    pub dir: String,
    /// Package name from the package clauses (`main` for commands).
    pub name: String,
    /// Compilable source files, ordered by name.
    pub go_files: Vec<String>,
    /// Internal test files (`package p` in `*_test.go`).
    pub test_go_files: Vec<String>,
    /// External test files (`package p_test`).
    pub xtest_go_files: Vec<String>,
    /// Files that import "C". Non-empty means the package is rejected.
    pub cgo_files: Vec<String>,
    /// Auxiliary scripts (`*.inc.js`), ordered by name.
    pub js_files: Vec<String>,
    /// Import paths declared across the compilable files, sorted.
    pub imports: Vec<String>,
    /// Where the compiled archive is persisted in the scratch filesystem.
    /// Empty for commands and ad-hoc file sets.
    pub pkg_obj: String,
    /// True when the record was produced for a test build.
    pub is_test: bool,
}

impl Package {
    /// Returns true if this package is a command (package `main`).
    pub fn is_command(&self) -> bool {
        self.name == "main"
    }
}

/// Resolves import paths against the goroot/gopath router.
pub struct PackageImporter {
    router: Arc<FsRouter>,
}

impl PackageImporter {
    pub fn new(router: Arc<FsRouter>) -> Self {
        Self { router }
    }

    /// Resolves `import_path` to a package record.
    ///
    /// `src_dir` is the directory of the importing package and anchors
    /// vendor-directory probing; pass `""` for top-level imports. In the
    /// resolved directory, `.go` and `.inc.js` files are considered part of
    /// the package except files starting with `_` or `.` and files whose
    /// build constraints are not satisfied.
    pub fn import(
        &self,
        import_path: &str,
        src_dir: &str,
        mode: ImportMode,
        install_suffix: &str,
        build_tags: &[String],
    ) -> BuildResult<Package> {
        let fs: Arc<dyn Filesystem> = Arc::clone(&self.router) as Arc<dyn Filesystem>;
        let mut ctx = BuildContext::new(fs, install_suffix, build_tags);
        apply_context_fixups(&mut ctx, import_path);

        let resolver = Resolver::new(&ctx, SRC_ROOTS, true);
        let (resolved, dir) = resolver.resolve(import_path, src_dir)?;

        if resolved.ends_with(&format!("/vendor/{SUPPORT_PACKAGE}")) {
            return Err(BuildError::VendoredOverlay {
                import_path: resolved,
            });
        }

        let mut pkg = resolver.load(&resolved, &dir, mode)?;
        pkg.pkg_obj = pkg_obj_path(&ctx, &pkg);
        apply_file_fixups(&ctx, &mut pkg);

        if !pkg.cgo_files.is_empty() {
            return Err(BuildError::CgoNotSupported {
                import_path: import_path.to_string(),
            });
        }

        pkg.js_files = self.js_files_from_dir(&dir)?;
        debug!(import_path = %resolved, dir = %dir, files = pkg.go_files.len(), "imported package");
        Ok(pkg)
    }

    /// Like [`PackageImporter::import`], but starts from a directory.
    /// No per-package fixups apply.
    pub fn import_dir(
        &self,
        dir: &str,
        mode: ImportMode,
        install_suffix: &str,
        build_tags: &[String],
    ) -> BuildResult<Package> {
        let fs: Arc<dyn Filesystem> = Arc::clone(&self.router) as Arc<dyn Filesystem>;
        let ctx = BuildContext::new(fs, install_suffix, build_tags);
        if !ctx.is_dir(dir) {
            return Err(BuildError::PackageNotFound {
                import_path: dir.to_string(),
            });
        }

        let import_path = SRC_ROOTS
            .iter()
            .find_map(|root| dir.strip_prefix(&format!("{root}/")))
            .unwrap_or(dir)
            .to_string();

        let resolver = Resolver::new(&ctx, SRC_ROOTS, false);
        let mut pkg = resolver.load(&import_path, dir, mode)?;
        pkg.pkg_obj = pkg_obj_path(&ctx, &pkg);
        pkg.js_files = self.js_files_from_dir(dir)?;
        Ok(pkg)
    }

    /// Auxiliary scripts in `dir`: files ending `.inc.js` whose name does
    /// not start with `_` or `.`.
    fn js_files_from_dir(&self, dir: &str) -> BuildResult<Vec<String>> {
        let entries = self.router.read_dir(dir)?;
        Ok(entries
            .into_iter()
            .filter(|e| {
                !e.is_dir
                    && e.name.ends_with(".inc.js")
                    && !e.name.starts_with('_')
                    && !e.name.starts_with('.')
            })
            .map(|e| e.name)
            .collect())
    }
}

/// Scratch-filesystem location for a package's compiled archive. Commands
/// are not persisted.
fn pkg_obj_path(ctx: &BuildContext, pkg: &Package) -> String {
    if pkg.is_command() {
        return String::new();
    }
    let top = match pkg.dir.split('/').next() {
        Some("goroot") => "goroot",
        Some("gopath") => "gopath",
        _ => return String::new(),
    };
    let suffix = if ctx.install_suffix.is_empty() {
        String::new()
    } else {
        format!("_{}", ctx.install_suffix)
    };
    format!(
        "{top}/pkg/{}_{}{suffix}/{}.a",
        ctx.goos, ctx.goarch, pkg.import_path
    )
}
