//! Parsed representation of a Go source file.
//!
//! Only the surface the build session needs is modeled: the package clause,
//! the import table, and the names of top-level declarations. Declaration
//! bodies are carried verbatim in the source text and consumed opaquely by
//! the code generator.
//!
//! Files are immutable values. The augmentation passes ([`SourceFile::redact`],
//! [`SourceFile::rewrite_import`]) return new files rather than mutating
//! shared nodes.

use std::collections::HashSet;

/// The blank identifier. A declaration renamed to this is treated as
/// unreachable by the code generator.
pub const BLANK: &str = "_";

/// One import in a file's import table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    /// Local name, when the import is aliased (`name "path"`).
    pub name: Option<String>,
    /// Unquoted import path.
    pub path: String,
}

/// The kind of a top-level declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclKind {
    /// A function, or a method when `receiver` names the receiver base type.
    Func { receiver: Option<String> },
    /// A type declaration (one entry per spec in grouped declarations).
    Type,
    /// A variable (one entry per declared name).
    Var,
    /// A constant (one entry per declared name).
    Const,
}

/// A single top-level declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopDecl {
    pub kind: DeclKind,
    pub name: String,
    /// 1-based line of the declaring keyword, for diagnostics.
    pub line: u32,
}

impl TopDecl {
    /// The name used for override matching: methods are qualified by their
    /// receiver base type (`Type.Method`), everything else by plain name.
    pub fn qualified_name(&self) -> String {
        match &self.kind {
            DeclKind::Func {
                receiver: Some(recv),
            } => format!("{recv}.{}", self.name),
            _ => self.name.clone(),
        }
    }

    /// Returns true if the declaration has been renamed to the blank
    /// identifier.
    pub fn is_blank(&self) -> bool {
        self.name == BLANK
    }
}

/// A parsed source file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Logical path of the file, used for diagnostics and output ordering.
    pub name: String,
    /// Package name from the package clause.
    pub package: String,
    /// Build constraint comment lines found above the package clause,
    /// verbatim (`//go:build …` or `// +build …`).
    pub constraints: Vec<String>,
    /// Import table in source order.
    pub imports: Vec<ImportSpec>,
    /// Top-level declarations in source order.
    pub decls: Vec<TopDecl>,
    /// The raw source text.
    pub src: String,
}

impl SourceFile {
    /// Returns a copy of the file in which every declaration whose
    /// qualified name appears in `names` has been renamed to the blank
    /// identifier.
    pub fn redact(&self, names: &HashSet<String>) -> SourceFile {
        let mut out = self.clone();
        for decl in &mut out.decls {
            if names.contains(&decl.qualified_name()) {
                decl.name = BLANK.to_string();
            }
        }
        out
    }

    /// Returns a copy of the file in which imports of `from` point at `to`.
    ///
    /// The local import name is retained; an unaliased import gains an
    /// explicit alias equal to the last segment of `from`, so references in
    /// the file body keep resolving.
    pub fn rewrite_import(&self, from: &str, to: &str) -> SourceFile {
        let default_name = from.rsplit('/').next().unwrap_or(from).to_string();
        let mut out = self.clone();
        for spec in &mut out.imports {
            if spec.path == from {
                if spec.name.is_none() {
                    spec.name = Some(default_name.clone());
                }
                spec.path = to.to_string();
            }
        }
        out
    }

    /// Import paths declared by this file, in source order.
    pub fn import_paths(&self) -> impl Iterator<Item = &str> {
        self.imports.iter().map(|spec| spec.path.as_str())
    }
}
