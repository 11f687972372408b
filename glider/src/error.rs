//! Error types for the build session.
//!
//! All public operations return [`BuildResult`]. Errors that cross the
//! session boundary are variants of [`BuildError`]; importer failures are
//! wrapped in [`BuildError::ImportFailed`] with the failing import path so
//! callers can display a dependency chain.

use std::io;

use thiserror::Error;

use crate::syntax::ParseErrors;

/// Result type for build operations.
pub type BuildResult<T> = Result<T, BuildError>;

/// Errors that can occur while building packages.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The package contains cgo source files, which cannot be compiled to
    /// JavaScript.
    #[error("{import_path}: importing \"C\" is not supported")]
    CgoNotSupported { import_path: String },

    /// The import path resolves inside a vendored copy of the overlay
    /// support package.
    #[error("vendoring {import_path} is not supported")]
    VendoredOverlay { import_path: String },

    /// A package could not be resolved to a directory of source files.
    #[error("cannot find package {import_path} in goroot or gopath")]
    PackageNotFound { import_path: String },

    /// A directory contains files from more than one package.
    #[error("found packages {first} and {second} in {dir}")]
    MultiplePackages {
        dir: String,
        first: String,
        second: String,
    },

    /// A directory contains no buildable source files.
    #[error("no buildable source files in {dir}")]
    NoGoFiles { dir: String },

    /// An import failed while building a dependency. Wraps the underlying
    /// error with the import path that was being resolved.
    #[error("{import_path}: {source}")]
    ImportFailed {
        import_path: String,
        #[source]
        source: Box<BuildError>,
    },

    /// The package imports itself, directly or through its dependencies.
    #[error("import cycle through {import_path}")]
    ImportCycle { import_path: String },

    /// One or more source files failed to parse.
    #[error(transparent)]
    Parse(#[from] ParseErrors),

    /// The code generator rejected the package.
    #[error("compiling {import_path}: {message}")]
    Compile {
        import_path: String,
        message: String,
    },

    /// A command build was requested for a package that is not `main`.
    #[error("cannot build non-main package {name}")]
    NotMainPackage { name: String },

    /// A stored hash in the standard index is not valid hex.
    #[error("invalid hash for {import_path} in standard index")]
    InvalidIndexHash { import_path: String },

    /// The per-archive callback returned an error.
    #[error("archive callback failed: {0}")]
    Callback(String),

    /// The cancellation signal fired before the operation completed.
    #[error("build cancelled")]
    Cancelled,

    /// An underlying filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl BuildError {
    /// Wraps an error with the import path that was being resolved when it
    /// occurred. `Cancelled` is passed through unchanged so cancellation
    /// stays observable at the driver.
    pub fn for_path(self, import_path: &str) -> BuildError {
        match self {
            BuildError::Cancelled => BuildError::Cancelled,
            other => BuildError::ImportFailed {
                import_path: import_path.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Returns true if this error (or its cause chain) is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            BuildError::Cancelled => true,
            BuildError::ImportFailed { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}
