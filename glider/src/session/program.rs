//! Program assembly: rendered packages, the loader script, and the index
//! page.
//!
//! Every emitted artifact is content-addressed: package scripts and the
//! loader are published under `{path}.{hexhash}.js`, so a browser cache
//! entry is valid forever and only changed packages are refetched.

use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use sha1::{Digest, Sha1};

use crate::cancel::{with_cancel, CancellationToken};
use crate::codegen::{Archive, CodeGen, DceSelection};
use crate::error::BuildResult;
use crate::stdlib::StandardIndex;

use super::Session;

/// The emitted unit for one package of a program build.
#[derive(Debug, Clone)]
pub struct PackageOutput {
    /// Import path the package is published under.
    pub path: String,
    /// Content hash of the rendered bytes (or the standard-index hash).
    pub hash: Vec<u8>,
    /// Rendered bytes; absent when the package is served from the
    /// standard index.
    pub contents: Option<Vec<u8>>,
    /// True if the package has a standard-index entry.
    pub standard: bool,
    /// True if the storage collaborator must upload this package.
    pub store: bool,
}

/// The full output of a program build: dependencies in load order with the
/// main package last.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Import path of the main package.
    pub path: String,
    pub packages: Vec<PackageOutput>,
}

/// Name of a published artifact: `{path}.{hexhash}.js`.
pub fn script_name(path: &str, hash: &[u8]) -> String {
    format!("{path}.{}.js", hex::encode(hash))
}

/// Renders one archive to its published form.
///
/// With `initializer` set the code is wrapped in a `$load["<path>"]` stub
/// so the loader controls invocation order. Returns the bytes and their
/// 160-bit content hash.
pub fn get_package_code(
    cancel: &CancellationToken,
    archive: &Archive,
    minify: bool,
    initializer: bool,
    gen: &Arc<dyn CodeGen>,
) -> BuildResult<(Vec<u8>, Vec<u8>)> {
    let dce = DceSelection::all(archive);
    let mut buf: Vec<u8> = Vec::new();

    if initializer {
        if minify {
            write!(buf, "$load[\"{}\"]=function(){{", archive.import_path)?;
        } else {
            writeln!(buf, "$load[\"{}\"] = function () {{", archive.import_path)?;
        }
    }

    with_cancel(cancel, || gen.write_pkg_code(archive, &dce, minify, &mut buf))??;

    if minify && buf.last() == Some(&b'\n') {
        // The writer always finishes with a newline; minified output drops
        // it.
        buf.pop();
    }
    if initializer {
        buf.extend_from_slice(b"};");
    }

    let hash = Sha1::digest(&buf).to_vec();
    Ok((buf, hash))
}

/// Produces the ordered package outputs for a dependency list.
///
/// Packages with a standard-index entry are referenced by their
/// precomputed hash instead of being rendered, unless they are in the
/// source set.
pub(super) fn get_program_code(
    cancel: &CancellationToken,
    pkgs: &[Arc<Archive>],
    initializer: bool,
    standard: Option<&StandardIndex>,
    source: &HashSet<String>,
    gen: &Arc<dyn CodeGen>,
) -> BuildResult<(String, Vec<PackageOutput>)> {
    let main_pkg = pkgs
        .last()
        .expect("dependency list always ends with the main package");
    let minify = main_pkg.minified;

    let mut outputs = Vec::with_capacity(pkgs.len());
    for pkg in pkgs {
        let index_entry = standard.filter(|idx| idx.contains(&pkg.import_path));
        let in_standard = index_entry.is_some();

        if let Some(idx) = index_entry {
            if !source.contains(&pkg.import_path) {
                let hash = idx
                    .hash_bytes(&pkg.import_path, minify)?
                    .unwrap_or_default();
                outputs.push(PackageOutput {
                    path: pkg.import_path.clone(),
                    hash,
                    contents: None,
                    standard: true,
                    store: false,
                });
                continue;
            }
        }

        let (contents, hash) = get_package_code(cancel, pkg, minify, initializer, gen)?;
        outputs.push(PackageOutput {
            path: pkg.import_path.clone(),
            hash,
            contents: Some(contents),
            standard: in_standard,
            store: true,
        });
    }

    Ok((main_pkg.import_path.clone(), outputs))
}

#[derive(Serialize)]
struct LoaderEntry {
    path: String,
    hash: String,
}

const LOADER_TEMPLATE: &str = r#""use strict";
var $mainPkg;
var $load = {};
(function(){
	var count = 0;
	var total = 0;
	var path = "__PATH__";
	var info = __INFO__;
	var finished = function() {
		for (var i = 0; i < info.length; i++) {
			$load[info[i].path]();
		}
		$mainPkg = $packages[path];
		$synthesizeMethods();
		$packages["runtime"].$init();
		$go($mainPkg.$init, []);
		$flushConsole();
	}
	var done = function() {
		count++;
		if (window.gliderProgress) { window.gliderProgress(count, total); }
		if (count == total) { finished(); }
	}
	var get = function(url) {
		total++;
		var tag = document.createElement('script');
		tag.src = url;
		tag.onload = done;
		tag.onreadystatechange = done;
		document.head.appendChild(tag);
	}
	for (var i = 0; i < info.length; i++) {
		get("https://__HOST__/" + info[i].path + "." + info[i].hash + ".js");
	}
})();"#;

const LOADER_TEMPLATE_MIN: &str = r#""use strict";var $mainPkg,$load={};!function(){for(var n=0,t=0,e=__INFO__,o=function(){n++,window.gliderProgress&&window.gliderProgress(n,t),n==t&&function(){for(var n=0;n<e.length;n++)$load[e[n].path]();$mainPkg=$packages["__PATH__"],$synthesizeMethods(),$packages.runtime.$init(),$go($mainPkg.$init,[]),$flushConsole()}()},a=function(n){t++;var e=document.createElement("script");e.src=n,e.onload=o,e.onreadystatechange=o,document.head.appendChild(e)},s=0;s<e.length;s++)a("https://__HOST__/"+e[s].path+"."+e[s].hash+".js")}();"#;

const INDEX_TEMPLATE: &str = r#"<html>
	<head>
		<meta charset="utf-8">
	</head>
	<body id="wrapper">
		<span id="glider-progress-span"></span>
		<script>
			window.gliderProgress = function(count, total) {
				if (count === total) {
					document.getElementById("glider-progress-span").style.display = "none";
				} else {
					document.getElementById("glider-progress-span").innerHTML = count + "/" + total;
				}
			}
		</script>
		<script src="__SCRIPT__"></script>
	</body>
</html>
"#;

impl Session {
    /// Renders the loader script for a program build.
    ///
    /// The loader manifest is a JSON array of `{path, hash}` entries
    /// beginning with the synthetic `prelude` entry, followed by every
    /// package in dependency order. Returns the bytes and their hash.
    pub fn write_loader(&self, output: &CommandOutput) -> (Vec<u8>, Vec<u8>) {
        let minify = self.options.minify;
        let prelude_hash = self
            .options
            .standard
            .as_ref()
            .map(|idx| idx.prelude.for_minified(minify).to_string())
            .unwrap_or_default();

        let mut entries = Vec::with_capacity(output.packages.len() + 1);
        entries.push(LoaderEntry {
            path: "prelude".to_string(),
            hash: prelude_hash,
        });
        for pkg in &output.packages {
            entries.push(LoaderEntry {
                path: pkg.path.clone(),
                hash: hex::encode(&pkg.hash),
            });
        }
        let info = serde_json::to_string(&entries).expect("loader manifest serializes");

        let template = if minify {
            LOADER_TEMPLATE_MIN
        } else {
            LOADER_TEMPLATE
        };
        let bytes = template
            .replace("__INFO__", &info)
            .replace("__PATH__", &output.path)
            .replace("__HOST__", &self.options.pkg_host)
            .into_bytes();
        let hash = Sha1::digest(&bytes).to_vec();
        (bytes, hash)
    }

    /// Renders the index page referencing the loader by absolute URL.
    pub fn write_index_page(&self, output: &CommandOutput, loader_hash: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let script = format!(
            "https://{}/{}",
            self.options.pkg_host,
            script_name(&output.path, loader_hash)
        );
        let bytes = INDEX_TEMPLATE.replace("__SCRIPT__", &script).into_bytes();
        let hash = Sha1::digest(&bytes).to_vec();
        (bytes, hash)
    }
}
