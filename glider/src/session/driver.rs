//! Program driver: build the minified and non-minified variants of a
//! command and its artifacts.
//!
//! The two variants run on independent sessions so neither archive cache
//! sees entries from the other minification mode. They may run on separate
//! threads; the sessions share nothing but the read-only filesystems and
//! the code generator.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::cancel::CancellationToken;
use crate::codegen::CodeGen;
use crate::error::{BuildError, BuildResult};

use super::{CommandOutput, Options, Session};

/// Artifacts of one build variant.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub output: CommandOutput,
    /// Rendered loader script and its hash.
    pub loader: Vec<u8>,
    pub loader_hash: Vec<u8>,
    /// Rendered index page and its hash.
    pub index: Vec<u8>,
    pub index_hash: Vec<u8>,
}

/// Builds `import_path` as a program, keyed by minification mode.
///
/// With `minified_only` set, only the minified variant builds (ad-hoc
/// playground compiles never serve the readable variant); otherwise both
/// variants build concurrently on independent sessions.
pub fn compile_program(
    cancel: &CancellationToken,
    options: &Options,
    gen: &Arc<dyn CodeGen>,
    import_path: &str,
    minified_only: bool,
) -> BuildResult<HashMap<bool, CompileOutput>> {
    let variants: &[bool] = if minified_only {
        &[true]
    } else {
        &[true, false]
    };
    info!(import_path, variants = variants.len(), "building program");

    let mut results = HashMap::new();
    std::thread::scope(|scope| -> BuildResult<()> {
        let mut handles = Vec::new();
        for &minify in variants {
            let mut variant_options = options.clone();
            variant_options.minify = minify;
            let gen = Arc::clone(gen);
            let cancel = cancel.clone();
            handles.push((
                minify,
                scope.spawn(move || build_variant(&cancel, variant_options, gen, import_path)),
            ));
        }
        for (minify, handle) in handles {
            let output = handle.join().map_err(|_| BuildError::Compile {
                import_path: import_path.to_string(),
                message: "build variant panicked".to_string(),
            })??;
            results.insert(minify, output);
        }
        Ok(())
    })?;
    Ok(results)
}

fn build_variant(
    cancel: &CancellationToken,
    options: Options,
    gen: Arc<dyn CodeGen>,
    import_path: &str,
) -> BuildResult<CompileOutput> {
    let mut session = Session::new(options, gen);
    let (_, archive) = session.build_import_path(cancel, import_path)?;
    if !archive.is_command() {
        return Err(BuildError::NotMainPackage {
            name: archive.name.clone(),
        });
    }
    let output = session.write_command_package(cancel, &archive)?;
    let (loader, loader_hash) = session.write_loader(&output);
    let (index, index_hash) = session.write_index_page(&output, &loader_hash);
    Ok(CompileOutput {
        output,
        loader,
        loader_hash,
        index,
        index_hash,
    })
}
