//! Import path resolution and package loading.
//!
//! The resolver probes vendor directories (walking up from the importing
//! package) and then each source root in order, reads the resolved
//! directory, and filters its files against the build context.

use std::collections::BTreeSet;

use crate::context::BuildContext;
use crate::error::{BuildError, BuildResult};
use crate::syntax::parse_file;
use crate::vfs;

use super::constraints;
use super::{ImportMode, Package};

pub(crate) struct Resolver<'a> {
    ctx: &'a BuildContext,
    src_roots: &'a [&'a str],
    use_vendor: bool,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(ctx: &'a BuildContext, src_roots: &'a [&'a str], use_vendor: bool) -> Self {
        Self {
            ctx,
            src_roots,
            use_vendor,
        }
    }

    /// Resolves `import_path` to `(resolved_import_path, directory)`.
    ///
    /// Vendor directories are probed first, starting at the importing
    /// package's directory and walking up to the source root; the resolved
    /// import path of a vendored package keeps its `vendor/` segment.
    pub(crate) fn resolve(&self, import_path: &str, src_dir: &str) -> BuildResult<(String, String)> {
        if import_path.is_empty() {
            return Err(BuildError::PackageNotFound {
                import_path: import_path.to_string(),
            });
        }

        if self.use_vendor && !src_dir.is_empty() {
            for root in self.src_roots {
                let prefix = format!("{root}/");
                let Some(rel) = src_dir.strip_prefix(&prefix) else {
                    continue;
                };
                let mut ancestor = rel.trim_matches('/').to_string();
                loop {
                    let candidate = if ancestor.is_empty() {
                        format!("vendor/{import_path}")
                    } else {
                        format!("{ancestor}/vendor/{import_path}")
                    };
                    let dir = format!("{prefix}{candidate}");
                    if self.ctx.is_dir(&dir) {
                        return Ok((candidate, dir));
                    }
                    if ancestor.is_empty() {
                        break;
                    }
                    ancestor = vfs::parent(&ancestor).to_string();
                }
            }
        }

        for root in self.src_roots {
            let dir = format!("{root}/{import_path}");
            if self.ctx.is_dir(&dir) {
                return Ok((import_path.to_string(), dir));
            }
        }

        Err(BuildError::PackageNotFound {
            import_path: import_path.to_string(),
        })
    }

    /// Reads `dir` and builds the package record for `import_path`.
    pub(crate) fn load(
        &self,
        import_path: &str,
        dir: &str,
        mode: ImportMode,
    ) -> BuildResult<Package> {
        let mut pkg = Package {
            import_path: import_path.to_string(),
            dir: dir.to_string(),
            ..Default::default()
        };
        if mode.find_only {
            return Ok(pkg);
        }

        let entries = self.ctx.read_dir(dir)?;
        let mut imports = BTreeSet::new();
        for entry in entries {
            if entry.is_dir
                || !entry.name.ends_with(".go")
                || entry.name.starts_with('_')
                || entry.name.starts_with('.')
            {
                continue;
            }
            let full = vfs::join(dir, &entry.name);
            let src = vfs::read_file(self.ctx.fs().as_ref(), &full)?;
            let src = String::from_utf8_lossy(&src).into_owned();
            let file = parse_file(&full, &src)?;

            if file.package == "documentation" {
                continue;
            }
            if !constraints::file_name_matches(self.ctx, &entry.name)
                || !constraints::constraints_satisfied(self.ctx, &file.constraints)
            {
                continue;
            }

            if entry.name.ends_with("_test.go") {
                if file.package.ends_with("_test") {
                    pkg.xtest_go_files.push(entry.name);
                } else {
                    pkg.test_go_files.push(entry.name);
                }
                continue;
            }

            if pkg.name.is_empty() {
                pkg.name = file.package.clone();
            } else if pkg.name != file.package {
                return Err(BuildError::MultiplePackages {
                    dir: dir.to_string(),
                    first: pkg.name,
                    second: file.package,
                });
            }

            if file.import_paths().any(|p| p == "C") {
                // With cgo disabled the file is simply excluded; with cgo
                // enabled it is recorded so the importer can reject the
                // package cleanly.
                if self.ctx.cgo_enabled {
                    pkg.cgo_files.push(entry.name);
                }
                continue;
            }

            for path in file.import_paths() {
                imports.insert(path.to_string());
            }
            pkg.go_files.push(entry.name);
        }

        if pkg.go_files.is_empty() && pkg.cgo_files.is_empty() {
            return Err(BuildError::NoGoFiles {
                dir: dir.to_string(),
            });
        }
        pkg.imports = imports.into_iter().collect();
        Ok(pkg)
    }
}
