//! Shared test fixtures: a deterministic stand-in code generator and
//! canned filesystem layouts.

use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::codegen::{Archive, CodeGen, DceSelection, Decl, Importer, TypeCache, TypeInfo};
use crate::error::{BuildError, BuildResult};
use crate::natives::{NOSYNC_PACKAGE, SUPPORT_PACKAGE};
use crate::session::Options;
use crate::syntax::SourceFile;
use crate::vfs::{Filesystem, MemoryFs};

/// Deterministic code generator for tests.
///
/// Declarations render as one line naming the declaration and its source
/// file, so tests can assert on provenance. Archives serialize as JSON.
pub(crate) struct FakeGen;

impl FakeGen {
    pub(crate) fn shared() -> Arc<dyn CodeGen> {
        Arc::new(FakeGen)
    }
}

impl CodeGen for FakeGen {
    fn compile(
        &self,
        import_path: &str,
        files: &[SourceFile],
        importer: &mut dyn Importer,
        minify: bool,
    ) -> BuildResult<Archive> {
        let name = files
            .iter()
            .map(|f| f.package.clone())
            .next()
            .unwrap_or_default();

        let mut imports: Vec<String> = Vec::new();
        for file in files {
            for path in file.import_paths() {
                if path == "C" || imports.iter().any(|p| p == path) {
                    continue;
                }
                imports.push(path.to_string());
            }
        }
        for path in &imports {
            importer.import_archive(path)?;
        }

        let mut declarations = Vec::new();
        for file in files {
            for decl in &file.decls {
                if decl.is_blank() {
                    continue;
                }
                declarations.push(Decl {
                    name: decl.qualified_name(),
                    code: format!("{} [{}]\n", decl.qualified_name(), file.name).into_bytes(),
                });
            }
        }

        importer.type_cache().insert(
            import_path.to_string(),
            TypeInfo {
                path: import_path.to_string(),
                name: name.clone(),
            },
        );

        Ok(Archive {
            import_path: import_path.to_string(),
            name: name.clone(),
            imports,
            declarations,
            minified: minify,
            inc_js: Vec::new(),
            export_data: name.into_bytes(),
        })
    }

    fn write_pkg_code(
        &self,
        archive: &Archive,
        dce: &DceSelection,
        _minify: bool,
        out: &mut dyn Write,
    ) -> io::Result<()> {
        let mut wrote = false;
        for (i, decl) in archive.declarations.iter().enumerate() {
            if dce.includes(i) {
                out.write_all(&decl.code)?;
                wrote = true;
            }
        }
        if !archive.inc_js.is_empty() {
            out.write_all(&archive.inc_js)?;
            wrote = true;
        }
        if !wrote {
            out.write_all(b"\n")?;
        }
        Ok(())
    }

    fn write_archive(&self, archive: &Archive, out: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer(out, archive).map_err(io::Error::other)
    }

    fn read_archive(
        &self,
        filename: &str,
        import_path: &str,
        input: &mut dyn Read,
        types: &mut TypeCache,
    ) -> BuildResult<Archive> {
        let archive: Archive =
            serde_json::from_reader(input).map_err(|err| BuildError::Compile {
                import_path: import_path.to_string(),
                message: format!("reading {filename}: {err}"),
            })?;
        types.insert(
            import_path.to_string(),
            TypeInfo {
                path: import_path.to_string(),
                name: archive.name.clone(),
            },
        );
        Ok(archive)
    }

    fn import_export_data(
        &self,
        _types: &mut TypeCache,
        export_data: &[u8],
        import_path: &str,
    ) -> BuildResult<TypeInfo> {
        Ok(TypeInfo {
            path: import_path.to_string(),
            name: String::from_utf8_lossy(export_data).into_owned(),
        })
    }
}

/// A goroot with a buildable runtime package.
pub(crate) fn std_goroot() -> MemoryFs {
    let fs = MemoryFs::new();
    fs.write_file(
        "goroot/src/runtime/error.go",
        "package runtime\n\ntype Error interface {\n\tRuntimeError()\n}\n",
    );
    fs
}

/// A gopath carrying the overlay support packages every build reaches.
pub(crate) fn support_gopath() -> MemoryFs {
    let fs = MemoryFs::new();
    fs.write_file(
        &format!("gopath/src/{SUPPORT_PACKAGE}/js.go"),
        "package js\n\ntype Object struct{}\n\nvar Global Object\n",
    );
    fs.write_file(
        &format!("gopath/src/{NOSYNC_PACKAGE}/mutex.go"),
        "package nosync\n\ntype Mutex struct{}\n",
    );
    fs
}

/// Options over the standard fixtures, with an empty overlay tree so tests
/// control augmentation explicitly.
pub(crate) fn base_options(root: MemoryFs, path: MemoryFs) -> Options {
    let mut options = Options::new(Arc::new(root) as Arc<dyn Filesystem>);
    options.path = Arc::new(path) as Arc<dyn Filesystem>;
    options.natives = Arc::new(MemoryFs::new()) as Arc<dyn Filesystem>;
    options
}
