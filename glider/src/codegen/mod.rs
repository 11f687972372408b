//! Contract with the external code generator.
//!
//! The per-declaration compiler that turns a parsed file set into an
//! [`Archive`] is an external collaborator. The session only depends on the
//! operations declared here; everything else about archives is opaque.
//!
//! The [`Importer`] trait is the seam through which the generator resolves
//! the imports it discovers while compiling: the session implements it on
//! top of its archive cache, so recursive builds and at-most-once
//! compilation stay under session control.

use std::collections::{HashMap, HashSet};
use std::io::{self, Read, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::BuildResult;
use crate::syntax::SourceFile;

/// Per-session cache of type information, keyed by import path.
pub type TypeCache = HashMap<String, TypeInfo>;

/// Type information for a compiled package, rebound when a precompiled
/// archive is loaded from the standard index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub path: String,
    pub name: String,
}

/// One renderable declaration of an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decl {
    /// Declaration name; methods are qualified by receiver type.
    pub name: String,
    /// Generated code for the declaration.
    pub code: Vec<u8>,
}

/// Compiled output for a single package.
///
/// Archives are cached per session behind `Arc` and treated as values keyed
/// by import path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Archive {
    /// Import path the archive was compiled under.
    pub import_path: String,
    /// Package name (`main` for commands).
    pub name: String,
    /// Import paths this archive depends on, in declaration order.
    pub imports: Vec<String>,
    /// Renderable declarations in generation order.
    pub declarations: Vec<Decl>,
    /// True if the archive was compiled with minification.
    pub minified: bool,
    /// Auxiliary script code appended from `.inc.js` files, already wrapped
    /// in scope guards.
    pub inc_js: Vec<u8>,
    /// Binary export data used to rebind type information.
    pub export_data: Vec<u8>,
}

impl Archive {
    /// Returns true if this archive is a command (package `main`).
    pub fn is_command(&self) -> bool {
        self.name == "main"
    }
}

/// Set of declarations selected by dead-code elimination.
///
/// The session always renders with a full selection; the type exists so the
/// generator's writer keeps the same shape as a real elimination pass.
/// Declarations are visited in archive order regardless of selection.
#[derive(Debug, Clone)]
pub struct DceSelection {
    included: Vec<bool>,
}

impl DceSelection {
    /// A selection covering every declaration of `archive`.
    pub fn all(archive: &Archive) -> Self {
        Self {
            included: vec![true; archive.declarations.len()],
        }
    }

    /// Returns true if the declaration at `index` is selected.
    pub fn includes(&self, index: usize) -> bool {
        self.included.get(index).copied().unwrap_or(false)
    }

    /// Number of selected declarations.
    pub fn len(&self) -> usize {
        self.included.iter().filter(|inc| **inc).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Import resolution seam offered to the generator during compilation.
///
/// Implementations resolve an import path to a compiled archive, building
/// it first if necessary, and expose the session's type cache so the
/// generator can record and look up type information.
pub trait Importer {
    /// Resolves `import_path` to its archive, building on first use.
    fn import_archive(&mut self, import_path: &str) -> BuildResult<Arc<Archive>>;

    /// The session's type cache.
    fn type_cache(&mut self) -> &mut TypeCache;
}

/// Operations consumed from the external code generator.
pub trait CodeGen: Send + Sync {
    /// Compiles a parsed file set into an archive.
    ///
    /// The generator resolves imports through `importer` as it encounters
    /// them and records the package's type information in the importer's
    /// type cache.
    fn compile(
        &self,
        import_path: &str,
        files: &[SourceFile],
        importer: &mut dyn Importer,
        minify: bool,
    ) -> BuildResult<Archive>;

    /// Renders the selected declarations of `archive`, followed by its
    /// auxiliary script buffer. The output always ends with a newline.
    fn write_pkg_code(
        &self,
        archive: &Archive,
        dce: &DceSelection,
        minify: bool,
        out: &mut dyn Write,
    ) -> io::Result<()>;

    /// Serializes `archive` for storage.
    fn write_archive(&self, archive: &Archive, out: &mut dyn Write) -> io::Result<()>;

    /// Deserializes an archive previously written with
    /// [`CodeGen::write_archive`], rebinding its type information into
    /// `types`.
    fn read_archive(
        &self,
        filename: &str,
        import_path: &str,
        input: &mut dyn Read,
        types: &mut TypeCache,
    ) -> BuildResult<Archive>;

    /// Rebinds type information from an archive's binary export data.
    fn import_export_data(
        &self,
        types: &mut TypeCache,
        export_data: &[u8],
        import_path: &str,
    ) -> BuildResult<TypeInfo>;

    /// Returns the transitive dependencies of `archive` in load order:
    /// every dependency precedes its dependents and `archive` itself is
    /// last. The runtime package is an implicit dependency of every
    /// program and is visited first.
    fn import_dependencies(
        &self,
        archive: &Arc<Archive>,
        importer: &mut dyn Importer,
    ) -> BuildResult<Vec<Arc<Archive>>> {
        fn visit(
            path: &str,
            importer: &mut dyn Importer,
            seen: &mut HashSet<String>,
            out: &mut Vec<Arc<Archive>>,
        ) -> BuildResult<()> {
            if !seen.insert(path.to_string()) {
                return Ok(());
            }
            let archive = importer.import_archive(path)?;
            for dep in archive.imports.clone() {
                visit(&dep, importer, seen, out)?;
            }
            out.push(archive);
            Ok(())
        }

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        seen.insert(archive.import_path.clone());
        visit("runtime", importer, &mut seen, &mut out)?;
        for dep in archive.imports.clone() {
            visit(&dep, importer, &mut seen, &mut out)?;
        }
        out.push(Arc::clone(archive));
        Ok(out)
    }
}
