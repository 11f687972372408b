//! Glider compiles Go packages to content-addressed JavaScript for
//! browser delivery.
//!
//! Programs are built on demand from a virtual, overlayed filesystem and
//! emitted as a cluster of small content-addressed scripts: one per
//! package, plus a loader that fetches them in dependency order and an
//! index page that bootstraps the loader. Standard-library packages with a
//! precomputed hash are referenced instead of recompiled, so browsers
//! reuse their CDN cache across programs.
//!
//! The entry point is [`session::Session`]: create one per build from
//! [`session::Options`], then drive it with `build_import_path`,
//! `build_files`, or `write_command_package`. Update mode
//! ([`session::update`]) streams only the archives a client cache is
//! missing.

pub mod augment;
pub mod cancel;
pub mod codegen;
pub mod context;
pub mod error;
pub mod importer;
pub mod natives;
pub mod session;
pub mod stdlib;
pub mod syntax;
pub mod vfs;

pub use cancel::CancellationToken;
pub use error::{BuildError, BuildResult};
pub use session::{CommandOutput, Options, PackageOutput, Session};

#[cfg(test)]
pub(crate) mod testutil;
