//! The build session: archive cache, build drivers, and artifact output.
//!
//! A session owns the options, the per-import-path archive cache, and the
//! type cache for one build. Sessions are process-scoped values: create
//! one, run builds on it, drop it when done. Building minified and
//! non-minified variants concurrently requires two independent sessions,
//! since a shared cache would make entries ambiguous between the modes.

mod driver;
mod program;
mod update;

pub use driver::{compile_program, CompileOutput};
pub use program::{get_package_code, script_name, CommandOutput, PackageOutput};
pub use update::{update, ArchiveMessage, IndexItem, MessageSink, UpdateMessage};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::augment::parse_and_augment;
use crate::cancel::{with_cancel, CancellationToken};
use crate::codegen::{Archive, CodeGen, Importer, TypeCache};
use crate::error::{BuildError, BuildResult};
use crate::importer::{ImportMode, Package, PackageImporter};
use crate::natives;
use crate::stdlib::{StandardArchives, StandardIndex};
use crate::vfs::{self, Filesystem, FsRouter, MemoryFs};

/// Default host serving package scripts.
pub const DEFAULT_PKG_HOST: &str = "pkg.glider.dev";

/// Per-archive callback fired once for every archive installed in the
/// session cache, in installation order.
pub type ArchiveCallback = Box<dyn FnMut(&Arc<Archive>) -> BuildResult<()> + Send>;

/// Session configuration. Immutable for the session's lifetime.
#[derive(Clone)]
pub struct Options {
    /// Filesystem mounted as `goroot/…`. Must contain the full standard
    /// library source.
    pub root: Arc<dyn Filesystem>,
    /// Filesystem mounted as `gopath/…`.
    pub path: Arc<dyn Filesystem>,
    /// Scratch filesystem for compiled archives.
    pub temp: Arc<dyn Filesystem>,
    /// Overlay tree used by augmentation.
    pub natives: Arc<dyn Filesystem>,
    /// Strip the rightmost `vendor/` segment from archive keys and
    /// rendered paths.
    pub unvendor: bool,
    /// Wrap rendered package code in a deferred initializer stub.
    pub initializer: bool,
    /// Compact output.
    pub minify: bool,
    /// Extra build tags.
    pub build_tags: Vec<String>,
    /// Precomputed standard-library hashes.
    pub standard: Option<Arc<StandardIndex>>,
    /// Precompiled standard-library archives.
    pub archives: Option<Arc<StandardArchives>>,
    /// Import paths that must be compiled from source even when they have
    /// a standard-index entry.
    pub source: HashSet<String>,
    /// Emit a progress event per compiled package.
    pub verbose: bool,
    /// Optional progress sink, called with each compiled import path.
    pub progress: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    /// Host name used in loader and index URLs.
    pub pkg_host: String,
}

impl Options {
    /// Creates options with the given goroot filesystem and defaults for
    /// everything else: empty in-memory gopath and scratch area, the
    /// bundled overlay tree, and the default package host.
    pub fn new(root: Arc<dyn Filesystem>) -> Self {
        Self {
            root,
            path: Arc::new(MemoryFs::new()),
            temp: Arc::new(MemoryFs::new()),
            natives: natives::bundled(),
            unvendor: false,
            initializer: false,
            minify: false,
            build_tags: Vec::new(),
            standard: None,
            archives: None,
            source: HashSet::new(),
            verbose: false,
            progress: None,
            pkg_host: DEFAULT_PKG_HOST.to_string(),
        }
    }
}

/// One build session.
pub struct Session {
    options: Options,
    router: Arc<FsRouter>,
    importer: PackageImporter,
    gen: Arc<dyn CodeGen>,
    archives: HashMap<String, Arc<Archive>>,
    order: Vec<String>,
    building: HashSet<String>,
    types: TypeCache,
    callback: Option<ArchiveCallback>,
}

impl Session {
    /// Creates a session over `options`, compiling with `gen`.
    pub fn new(options: Options, gen: Arc<dyn CodeGen>) -> Self {
        let router = Arc::new(FsRouter::new(
            Arc::clone(&options.root),
            Arc::clone(&options.path),
        ));
        let importer = PackageImporter::new(Arc::clone(&router));
        Self {
            options,
            router,
            importer,
            gen,
            archives: HashMap::new(),
            order: Vec::new(),
            building: HashSet::new(),
            types: TypeCache::new(),
            callback: None,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The archive cached under `key`, if any.
    pub fn archive(&self, key: &str) -> Option<&Arc<Archive>> {
        self.archives.get(key)
    }

    /// Cache keys in installation order.
    pub fn archive_order(&self) -> &[String] {
        &self.order
    }

    pub fn types(&self) -> &TypeCache {
        &self.types
    }

    /// Installs the per-archive callback. It fires exactly once per cached
    /// archive, in installation order.
    pub fn set_callback(&mut self, callback: ArchiveCallback) {
        self.callback = Some(callback);
    }

    /// Install suffix for the session's minification mode.
    pub fn install_suffix(&self) -> &'static str {
        if self.options.minify {
            "min"
        } else {
            ""
        }
    }

    /// Imports and builds `import_path` with its transitive dependencies.
    pub fn build_import_path(
        &mut self,
        cancel: &CancellationToken,
        import_path: &str,
    ) -> BuildResult<(Package, Arc<Archive>)> {
        self.build_import_path_with_src_dir(cancel, import_path, "")
    }

    fn build_import_path_with_src_dir(
        &mut self,
        cancel: &CancellationToken,
        import_path: &str,
        src_dir: &str,
    ) -> BuildResult<(Package, Arc<Archive>)> {
        let suffix = self.install_suffix();
        let tags = self.options.build_tags.clone();
        let importer = &self.importer;
        let pkg = with_cancel(cancel, || {
            importer.import(import_path, src_dir, ImportMode::default(), suffix, &tags)
        })??;
        let archive = self.build_package(cancel, &pkg)?;
        Ok((pkg, archive))
    }

    /// Builds the package in `package_dir` and assembles its program
    /// output. Fails unless the directory holds a command.
    pub fn build_dir(
        &mut self,
        cancel: &CancellationToken,
        package_dir: &str,
        import_path: &str,
    ) -> BuildResult<CommandOutput> {
        let suffix = self.install_suffix();
        let tags = self.options.build_tags.clone();
        let importer = &self.importer;
        let mut pkg = with_cancel(cancel, || {
            importer.import_dir(package_dir, ImportMode::default(), suffix, &tags)
        })??;
        if !import_path.is_empty() {
            pkg.import_path = import_path.to_string();
        }
        let archive = self.build_package(cancel, &pkg)?;
        if !pkg.is_command() {
            return Err(BuildError::NotMainPackage { name: pkg.name });
        }
        self.write_command_package(cancel, &archive)
    }

    /// Builds a synthesized `main` package from a literal file list rooted
    /// at `package_path`. Files ending `.inc.js` become auxiliary scripts,
    /// everything else compiles.
    pub fn build_files(
        &mut self,
        cancel: &CancellationToken,
        filenames: &[String],
        package_path: &str,
    ) -> BuildResult<CommandOutput> {
        let mut pkg = Package {
            name: "main".to_string(),
            import_path: "main".to_string(),
            dir: package_path.to_string(),
            ..Default::default()
        };
        for file in filenames {
            if file.ends_with(".inc.js") {
                pkg.js_files.push(file.clone());
            } else {
                pkg.go_files.push(file.clone());
            }
        }
        let archive = self.build_package(cancel, &pkg)?;
        if !archive.is_command() {
            return Err(BuildError::NotMainPackage {
                name: archive.name.clone(),
            });
        }
        self.write_command_package(cancel, &archive)
    }

    /// Builds one package, reusing the session cache. Dependencies build
    /// recursively as the code generator resolves them.
    pub fn build_package(
        &mut self,
        cancel: &CancellationToken,
        pkg: &Package,
    ) -> BuildResult<Arc<Archive>> {
        let key = if self.options.unvendor {
            unvendor_path(&pkg.import_path).to_string()
        } else {
            pkg.import_path.clone()
        };

        if let Some(archive) = self.archives.get(&key) {
            return Ok(Arc::clone(archive));
        }

        if !self.options.source.contains(&key) {
            if let Some(archive) = self.import_standard_archive(cancel, &key)? {
                return Ok(archive);
            }
        }

        if !self.building.insert(key.clone()) {
            return Err(BuildError::ImportCycle { import_path: key });
        }
        let result = self.compile_package(cancel, pkg, &key);
        self.building.remove(&key);
        result
    }

    fn compile_package(
        &mut self,
        cancel: &CancellationToken,
        pkg: &Package,
        key: &str,
    ) -> BuildResult<Arc<Archive>> {
        let mut files = parse_and_augment(pkg, pkg.is_test, &self.router, &self.options.natives)?;
        // Descending name order keeps the generator's output reproducible
        // regardless of how the files were discovered.
        files.sort_by(|a, b| b.name.cmp(&a.name));

        let gen = Arc::clone(&self.gen);
        let minify = self.options.minify;
        let mut archive = {
            let mut importer = SessionImporter {
                cancel,
                src_dir: pkg.dir.clone(),
                local: HashMap::new(),
                session: self,
            };
            with_cancel(cancel, || gen.compile(key, &files, &mut importer, minify))??
        };

        for js_file in &pkg.js_files {
            let full = vfs::join(&pkg.dir, js_file);
            let code = vfs::read_file(self.router.as_ref(), &full)?;
            // The wrapper keeps top-level identifiers from leaking into the
            // page scope.
            archive.inc_js.extend_from_slice(b"\t(function() {\n");
            archive.inc_js.extend_from_slice(&code);
            archive.inc_js.extend_from_slice(b"\n\t}).call($global);\n");
        }

        let in_standard = self
            .options
            .standard
            .as_ref()
            .is_some_and(|idx| idx.contains(key));
        if self.options.verbose && !in_standard {
            info!(import_path = %key, "compiled");
            if let Some(progress) = &self.options.progress {
                (**progress)(key);
            }
        }

        let archive = Arc::new(archive);
        self.archives.insert(key.to_string(), Arc::clone(&archive));
        self.order.push(key.to_string());

        if let Some(callback) = self.callback.as_mut() {
            callback(&archive)?;
        }

        if pkg.pkg_obj.is_empty() {
            debug!(import_path = %key, "no object path, skipping archive write");
        } else {
            self.write_library_package(cancel, &archive, &pkg.pkg_obj)?;
        }

        Ok(archive)
    }

    /// Loads a precompiled standard archive for `import_path`, rebinding
    /// its type information and recursing into its declared imports.
    /// Returns `None` when no precompiled archive is available.
    pub fn import_standard_archive(
        &mut self,
        cancel: &CancellationToken,
        import_path: &str,
    ) -> BuildResult<Option<Arc<Archive>>> {
        let Some(set) = self.options.archives.clone() else {
            return Ok(None);
        };
        let Some(pair) = set.get(import_path) else {
            return Ok(None);
        };
        let archive = Arc::clone(pair.for_minified(self.options.minify));

        let gen = Arc::clone(&self.gen);
        let types = &mut self.types;
        let info = with_cancel(cancel, || {
            gen.import_export_data(types, &archive.export_data, import_path)
        })??;
        self.types.insert(import_path.to_string(), info);

        self.archives
            .insert(import_path.to_string(), Arc::clone(&archive));
        self.order.push(import_path.to_string());
        if let Some(callback) = self.callback.as_mut() {
            callback(&archive)?;
        }

        for dep in archive.imports.clone() {
            if self.archives.contains_key(&dep) {
                continue;
            }
            self.import_standard_archive(cancel, &dep)?;
        }

        Ok(Some(archive))
    }

    /// Transitive dependencies of `archive` in load order, main last.
    pub fn get_dependencies(
        &mut self,
        cancel: &CancellationToken,
        archive: &Arc<Archive>,
    ) -> BuildResult<Vec<Arc<Archive>>> {
        let gen = Arc::clone(&self.gen);
        let mut importer = SessionImporter {
            cancel,
            src_dir: String::new(),
            local: HashMap::new(),
            session: self,
        };
        with_cancel(cancel, || gen.import_dependencies(archive, &mut importer))?
    }

    /// Assembles the program output for a command archive: its transitive
    /// dependencies in load order, rendered or referenced from the
    /// standard index.
    pub fn write_command_package(
        &mut self,
        cancel: &CancellationToken,
        archive: &Arc<Archive>,
    ) -> BuildResult<CommandOutput> {
        if !archive.is_command() {
            return Err(BuildError::NotMainPackage {
                name: archive.name.clone(),
            });
        }
        let deps = self.get_dependencies(cancel, archive)?;
        let (path, packages) = program::get_program_code(
            cancel,
            &deps,
            self.options.initializer,
            self.options.standard.as_deref(),
            &self.options.source,
            &self.gen,
        )?;
        Ok(CommandOutput { path, packages })
    }

    /// Persists a compiled archive to the scratch filesystem.
    fn write_library_package(
        &self,
        cancel: &CancellationToken,
        archive: &Arc<Archive>,
        pkg_obj: &str,
    ) -> BuildResult<()> {
        self.options.temp.mkdir_all(vfs::parent(pkg_obj))?;
        let mut out = self.options.temp.create(pkg_obj)?;
        let gen = Arc::clone(&self.gen);
        with_cancel(cancel, || gen.write_archive(archive, out.as_mut()))??;
        Ok(())
    }

    /// Reads an archive previously persisted to the scratch filesystem.
    pub fn read_stored_archive(
        &mut self,
        cancel: &CancellationToken,
        pkg_obj: &str,
        import_path: &str,
    ) -> BuildResult<Archive> {
        let mut input = self.options.temp.open(pkg_obj)?;
        let gen = Arc::clone(&self.gen);
        let types = &mut self.types;
        with_cancel(cancel, || {
            gen.read_archive(pkg_obj, import_path, input.as_mut(), types)
        })?
    }
}

/// Import seam handed to the code generator during one compile: resolves
/// through a per-compile cache, then the session.
struct SessionImporter<'a> {
    session: &'a mut Session,
    cancel: &'a CancellationToken,
    src_dir: String,
    local: HashMap<String, Arc<Archive>>,
}

impl Importer for SessionImporter<'_> {
    fn import_archive(&mut self, import_path: &str) -> BuildResult<Arc<Archive>> {
        if let Some(archive) = self.local.get(import_path) {
            return Ok(Arc::clone(archive));
        }
        let (_, archive) = self
            .session
            .build_import_path_with_src_dir(self.cancel, import_path, &self.src_dir)
            .map_err(|err| err.for_path(import_path))?;
        self.local
            .insert(import_path.to_string(), Arc::clone(&archive));
        Ok(archive)
    }

    fn type_cache(&mut self) -> &mut TypeCache {
        &mut self.session.types
    }
}

/// Strips the rightmost non-terminating `vendor/` segment from an import
/// path, yielding its canonical form.
pub fn unvendor_path(path: &str) -> &str {
    if let Some(i) = path.rfind("/vendor/") {
        &path[i + "/vendor/".len()..]
    } else if let Some(rest) = path.strip_prefix("vendor/") {
        rest
    } else {
        path
    }
}

#[cfg(test)]
mod tests;
