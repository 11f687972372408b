//! Update mode: stream only the archives a client cache is missing.
//!
//! An update walks the dependency graph exactly like a program build, but
//! instead of assembling artifacts it compares the render hash of every
//! dependency against a caller-supplied cache of previous hashes and
//! streams one of three outcomes per package: unchanged (index entry
//! only), standard (fetch from the CDN by precomputed hash), or the
//! archive itself, gzip-compressed.
//!
//! The walk covers the runtime first (every program needs it and its
//! dependencies), then the main package. The aggregated index is emitted
//! after the walk completes.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use crate::cancel::CancellationToken;
use crate::codegen::CodeGen;
use crate::error::BuildResult;

use super::program::get_package_code;
use super::{Options, Session};

/// One streamed archive.
#[derive(Debug, Clone)]
pub struct ArchiveMessage {
    pub path: String,
    /// Hex render hash (or the standard-index hash for standard entries).
    pub hash: String,
    /// Gzip-compressed serialized archive; absent for standard entries,
    /// which the client fetches from the CDN.
    pub contents: Option<Vec<u8>>,
    pub standard: bool,
}

/// One entry of the aggregated update index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexItem {
    /// Hex render hash of the dependency.
    pub hash: String,
    /// True if the client cache already holds this hash.
    pub unchanged: bool,
}

/// Messages streamed to the client during an update.
#[derive(Debug, Clone)]
pub enum UpdateMessage {
    Started,
    Archive(ArchiveMessage),
    Index(HashMap<String, IndexItem>),
    Finished,
}

/// Downstream message sink. Must be safe for use from the session's
/// callback path.
pub type MessageSink = Arc<dyn Fn(UpdateMessage) + Send + Sync>;

#[derive(Default)]
struct UpdateState {
    done: HashSet<String>,
    index: HashMap<String, IndexItem>,
}

/// Runs an update against `cache`, the client's map of import path to
/// previously seen render hash.
///
/// Update hashes are always computed from non-minified, initializer-wrapped
/// renderings, so the minify flag of `options` is overridden. Packages in
/// the source set and the main package itself are never reported.
pub fn update(
    cancel: &CancellationToken,
    mut options: Options,
    gen: Arc<dyn CodeGen>,
    cache: HashMap<String, String>,
    send: MessageSink,
) -> BuildResult<()> {
    options.minify = false;
    let source = options.source.clone();
    let standard = options.standard.clone();

    let mut session = Session::new(options, Arc::clone(&gen));
    let state = Arc::new(Mutex::new(UpdateState::default()));

    (*send)(UpdateMessage::Started);

    let callback_cancel = cancel.clone();
    let callback_state = Arc::clone(&state);
    let callback_send = Arc::clone(&send);
    session.set_callback(Box::new(move |archive| {
        let path = archive.import_path.clone();
        let mut state = callback_state.lock().expect("update state lock poisoned");
        if !state.done.insert(path.clone()) {
            return Ok(());
        }
        if path == "main" || source.contains(&path) {
            return Ok(());
        }

        // Archive files are not binary-identical across compiles, so the
        // cache hash is taken over the rendered output instead.
        let (_, hash_bytes) = get_package_code(&callback_cancel, archive, false, true, &gen)?;
        let hash = hex::encode(hash_bytes);

        let unchanged = cache.get(&path) == Some(&hash);
        state.index.insert(
            path.clone(),
            IndexItem {
                hash: hash.clone(),
                unchanged,
            },
        );
        if unchanged {
            debug!(import_path = %path, "client cache is current");
            return Ok(());
        }

        if let Some(idx) = &standard {
            if let Some(pair) = idx.packages.get(&path) {
                // Standard archives are already on the CDN; send the hash
                // and let the browser cache do the rest.
                (*callback_send)(UpdateMessage::Archive(ArchiveMessage {
                    path,
                    hash: pair.for_minified(false).to_string(),
                    contents: None,
                    standard: true,
                }));
                return Ok(());
            }
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        gen.write_archive(archive, &mut encoder)?;
        let contents = encoder.finish()?;
        (*callback_send)(UpdateMessage::Archive(ArchiveMessage {
            path,
            hash,
            contents: Some(contents),
            standard: false,
        }));
        Ok(())
    }));

    // Every program needs the runtime and its dependencies.
    session.build_import_path(cancel, "runtime")?;
    session.build_import_path(cancel, "main")?;

    let index = std::mem::take(&mut state.lock().expect("update state lock poisoned").index);
    (*send)(UpdateMessage::Index(index));
    (*send)(UpdateMessage::Finished);
    Ok(())
}
