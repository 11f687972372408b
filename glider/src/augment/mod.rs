//! Source augmentation: merging overlay sources into standard packages.
//!
//! For every imported package the augmentor parses the package's own files
//! and, if the overlay tree carries sources for the same import path, merges
//! them in: overlay files come first, and any original top-level declaration
//! whose name collides with an overlay declaration is renamed to the blank
//! identifier so the code generator treats it as unreachable.
//!
//! Overlay files are re-homed under the package directory with a `__` name
//! prefix so diagnostics distinguish them from the originals.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::context::BuildContext;
use crate::error::BuildResult;
use crate::importer::{ImportMode, Package, Resolver};
use crate::natives::NOSYNC_PACKAGE;
use crate::syntax::{parse_file, ParseError, ParseErrors, SourceFile};
use crate::vfs::{self, Filesystem, FsRouter};

/// Standard packages whose `sync` import is rewritten to the lock-free
/// substitute: their initialization paths must not block.
pub const NOSYNC_PACKAGES: &[&str] = &[
    "crypto/rand",
    "encoding/gob",
    "encoding/json",
    "expvar",
    "go/token",
    "log",
    "math/big",
    "math/rand",
    "regexp",
    "testing",
    "time",
];

/// Parses the sources of `pkg` and merges overlay files.
///
/// With `is_test` set, internal test files join the originals and the
/// overlay's test files join the overlay set. A package whose import path
/// ends in `_test` is treated as an external test build of the base
/// package.
///
/// Parse errors are aggregated across all files (capped per file) rather
/// than stopping at the first failing file.
pub fn parse_and_augment(
    pkg: &Package,
    is_test: bool,
    router: &Arc<FsRouter>,
    natives_fs: &Arc<dyn Filesystem>,
) -> BuildResult<Vec<SourceFile>> {
    let is_xtest = pkg.import_path.ends_with("_test");
    let effective = if is_xtest {
        &pkg.import_path[..pkg.import_path.len() - "_test".len()]
    } else {
        pkg.import_path.as_str()
    };

    let mut files = Vec::new();
    let mut replaced: HashSet<String> = HashSet::new();

    let nctx = BuildContext::natives(Arc::clone(natives_fs));
    let nresolver = Resolver::new(&nctx, &["src"], false);
    if let Ok((npath, ndir)) = nresolver.resolve(effective, "") {
        if let Ok(npkg) = nresolver.load(&npath, &ndir, ImportMode::default()) {
            let mut names = npkg.go_files.clone();
            if is_test {
                names.extend(npkg.test_go_files.iter().cloned());
            }
            if is_xtest {
                names = npkg.xtest_go_files.clone();
            }
            for name in names {
                let full = vfs::join(&ndir, &name);
                let src = vfs::read_file(natives_fs.as_ref(), &full)
                    .expect("bundled overlay file must be readable");
                let text = String::from_utf8_lossy(&src).into_owned();
                let rehomed = vfs::join(&pkg.dir, &format!("__{name}"));
                let file = parse_file(&rehomed, &text)
                    .expect("bundled overlay source must parse");
                for decl in &file.decls {
                    replaced.insert(decl.qualified_name());
                }
                files.push(file);
            }
            debug!(
                import_path = %effective,
                overlays = files.len(),
                replaced = replaced.len(),
                "merged overlay sources"
            );
        }
    }
    // Overlays may define additional initializers alongside the originals.
    replaced.remove("init");

    let mut original_names = pkg.go_files.clone();
    if is_test && !is_xtest {
        original_names.extend(pkg.test_go_files.iter().cloned());
    }

    let mut errors: Vec<ParseError> = Vec::new();
    for name in &original_names {
        let full = vfs::join(&pkg.dir, name);
        let src = vfs::read_file(router.as_ref(), &full)?;
        let text = String::from_utf8_lossy(&src).into_owned();
        match parse_file(&full, &text) {
            Ok(file) => {
                let file = if NOSYNC_PACKAGES.contains(&effective) {
                    file.rewrite_import("sync", NOSYNC_PACKAGE)
                } else {
                    file
                };
                files.push(file.redact(&replaced));
            }
            Err(list) => errors.extend(list.0),
        }
    }

    if !errors.is_empty() {
        return Err(ParseErrors(errors).into());
    }
    Ok(files)
}
