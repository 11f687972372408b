use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::*;
use crate::codegen::Decl;
use crate::natives::SUPPORT_PACKAGE;
use crate::stdlib::{ArchivePair, HashPair, StandardArchives, StandardIndex};
use crate::testutil::{base_options, std_goroot, support_gopath, FakeGen};

fn token() -> CancellationToken {
    CancellationToken::new()
}

fn main_gopath(src: &str) -> MemoryFs {
    let fs = MemoryFs::new();
    fs.write_file("gopath/src/main/main.go", src);
    fs
}

fn session_with(root: MemoryFs, path: MemoryFs) -> Session {
    Session::new(base_options(root, path), FakeGen::shared())
}

fn std_runtime() -> (Arc<StandardIndex>, Arc<StandardArchives>) {
    let make = |minified: bool| {
        Arc::new(Archive {
            import_path: "runtime".to_string(),
            name: "runtime".to_string(),
            imports: vec![],
            declarations: vec![Decl {
                name: "init".to_string(),
                code: b"runtime init\n".to_vec(),
            }],
            minified,
            inc_js: vec![],
            export_data: b"runtime".to_vec(),
        })
    };
    let mut archives = StandardArchives::new();
    archives.insert(
        "runtime",
        ArchivePair {
            min: make(true),
            max: make(false),
        },
    );
    let mut index = StandardIndex {
        prelude: HashPair::new("ee01", "ff02"),
        ..Default::default()
    };
    index
        .packages
        .insert("runtime".to_string(), HashPair::new("0a0b", "0c0d"));
    (Arc::new(index), Arc::new(archives))
}

#[test]
fn test_build_package_is_idempotent() {
    let mut session = session_with(std_goroot(), MemoryFs::new());
    let cancel = token();
    let (_, first) = session.build_import_path(&cancel, "runtime").unwrap();
    let (_, second) = session.build_import_path(&cancel, "runtime").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(session.archive_order(), ["runtime"]);
}

#[test]
fn test_dependencies_install_before_dependents() {
    let path = MemoryFs::new();
    path.write_file(
        "gopath/src/main/main.go",
        "package main\n\nimport \"example.com/util\"\n\nfunc main() { util.Do() }\n",
    );
    path.write_file(
        "gopath/src/example.com/util/util.go",
        "package util\n\nfunc Do() {}\n",
    );
    let mut session = session_with(std_goroot(), path);
    session.build_import_path(&token(), "main").unwrap();

    assert_eq!(session.archive_order(), ["example.com/util", "main"]);
    // Every import of a cached archive was inserted before it.
    for (pos, key) in session.archive_order().iter().enumerate() {
        let archive = session.archive(key).unwrap();
        for dep in &archive.imports {
            let dep_pos = session
                .archive_order()
                .iter()
                .position(|k| k == dep)
                .unwrap();
            assert!(dep_pos < pos, "{dep} must be installed before {key}");
        }
    }
}

#[test]
fn test_unvendor_strips_cache_key() {
    let path = MemoryFs::new();
    path.write_file(
        "gopath/src/github.com/a/b/main.go",
        "package main\n\nimport \"x/y\"\n\nfunc main() { y.Do() }\n",
    );
    path.write_file(
        "gopath/src/github.com/a/b/vendor/x/y/y.go",
        "package y\n\nfunc Do() {}\n",
    );
    let mut options = base_options(std_goroot(), path);
    options.unvendor = true;
    let mut session = Session::new(options, FakeGen::shared());
    session.build_import_path(&token(), "github.com/a/b").unwrap();

    let vendored = Arc::clone(session.archive("x/y").expect("unvendored key cached"));
    assert_eq!(vendored.import_path, "x/y");
    assert!(session.archive("github.com/a/b/vendor/x/y").is_none());

    // A subsequent request for the canonical path is a cache hit.
    let pkg = Package {
        import_path: "x/y".to_string(),
        ..Default::default()
    };
    let again = session.build_package(&token(), &pkg).unwrap();
    assert!(Arc::ptr_eq(&vendored, &again));
}

#[test]
fn test_standard_archive_short_circuit() {
    let (index, archives) = std_runtime();
    let mut options = base_options(std_goroot(), MemoryFs::new());
    options.standard = Some(index);
    options.archives = Some(Arc::clone(&archives));
    let mut session = Session::new(options, FakeGen::shared());

    let (_, archive) = session.build_import_path(&token(), "runtime").unwrap();
    let std_archive = archives.get("runtime").unwrap().for_minified(false);
    assert!(Arc::ptr_eq(&archive, std_archive));
    // Type info was rebound from the export data.
    assert_eq!(session.types()["runtime"].name, "runtime");
}

#[test]
fn test_minified_session_selects_minified_standard_archive() {
    let (index, archives) = std_runtime();
    let mut options = base_options(std_goroot(), MemoryFs::new());
    options.standard = Some(index);
    options.archives = Some(Arc::clone(&archives));
    options.minify = true;
    let mut session = Session::new(options, FakeGen::shared());

    let (_, archive) = session.build_import_path(&token(), "runtime").unwrap();
    assert!(Arc::ptr_eq(
        &archive,
        archives.get("runtime").unwrap().for_minified(true)
    ));
}

#[test]
fn test_source_set_bypasses_standard_archives() {
    let (index, archives) = std_runtime();
    let mut options = base_options(std_goroot(), MemoryFs::new());
    options.standard = Some(index);
    options.archives = Some(Arc::clone(&archives));
    options.source.insert("runtime".to_string());
    let mut session = Session::new(options, FakeGen::shared());

    let (_, archive) = session.build_import_path(&token(), "runtime").unwrap();
    let std_archive = archives.get("runtime").unwrap().for_minified(false);
    assert!(!Arc::ptr_eq(&archive, std_archive));
    // Compiled from source: declarations come from error.go.
    assert!(archive.declarations.iter().any(|d| d.name == "Error"));
}

#[test]
fn test_callback_fires_once_per_archive_in_order() {
    let path = MemoryFs::new();
    path.write_file(
        "gopath/src/main/main.go",
        "package main\n\nimport \"example.com/util\"\n\nfunc main() { util.Do() }\n",
    );
    path.write_file(
        "gopath/src/example.com/util/util.go",
        "package util\n\nfunc Do() {}\n",
    );
    let mut session = session_with(std_goroot(), path);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = Arc::clone(&seen);
    session.set_callback(Box::new(move |archive| {
        seen_cb.lock().unwrap().push(archive.import_path.clone());
        Ok(())
    }));

    session.build_import_path(&token(), "main").unwrap();
    session.build_import_path(&token(), "main").unwrap();
    assert_eq!(*seen.lock().unwrap(), ["example.com/util", "main"]);
}

#[test]
fn test_cancellation_before_build_leaves_cache_untouched() {
    let mut session = session_with(std_goroot(), MemoryFs::new());
    let cancel = token();
    cancel.cancel();
    let err = session.build_import_path(&cancel, "runtime").unwrap_err();
    assert!(matches!(err, BuildError::Cancelled));
    assert!(session.archive_order().is_empty());
}

/// Filesystem that sleeps on every read, so cancellation can land while an
/// import is in flight.
struct SlowFs {
    inner: MemoryFs,
    delay: Duration,
}

impl Filesystem for SlowFs {
    fn stat(&self, path: &str) -> std::io::Result<crate::vfs::FileStat> {
        std::thread::sleep(self.delay);
        self.inner.stat(path)
    }

    fn open(&self, path: &str) -> std::io::Result<Box<dyn std::io::Read + Send>> {
        std::thread::sleep(self.delay);
        self.inner.open(path)
    }

    fn read_dir(&self, path: &str) -> std::io::Result<Vec<crate::vfs::DirEntry>> {
        std::thread::sleep(self.delay);
        self.inner.read_dir(path)
    }
}

#[test]
fn test_cancellation_mid_import_discards_result() {
    let slow = SlowFs {
        inner: std_goroot(),
        delay: Duration::from_millis(50),
    };
    let mut options = base_options(MemoryFs::new(), MemoryFs::new());
    options.root = Arc::new(slow);
    let mut session = Session::new(options, FakeGen::shared());

    let cancel = token();
    let trigger = cancel.clone();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(5));
        trigger.cancel();
    });

    let err = session.build_import_path(&cancel, "runtime").unwrap_err();
    canceller.join().unwrap();
    assert!(err.is_cancelled());
    assert!(session.archive_order().is_empty());
}

#[test]
fn test_import_cycle_surfaces_as_import_failed() {
    let path = MemoryFs::new();
    path.write_file(
        "gopath/src/example.com/p/p.go",
        "package p\n\nimport \"example.com/q\"\n\nvar _ = q.V\n",
    );
    path.write_file(
        "gopath/src/example.com/q/q.go",
        "package q\n\nimport \"example.com/p\"\n\nvar V = p.W\n",
    );
    let mut session = session_with(std_goroot(), path);
    let err = session.build_import_path(&token(), "example.com/p").unwrap_err();
    assert!(matches!(err, BuildError::ImportFailed { .. }));
    assert!(err.to_string().contains("import cycle"));
    assert!(session.archive("example.com/p").is_none());
    assert!(session.archive("example.com/q").is_none());
}

#[test]
fn test_inc_js_files_are_scope_wrapped() {
    let path = main_gopath("package main\n\nfunc main() {}\n");
    path.write_file("gopath/src/main/extra.inc.js", "alert(1);");
    let mut session = session_with(std_goroot(), path);
    let (_, archive) = session.build_import_path(&token(), "main").unwrap();
    assert_eq!(
        String::from_utf8_lossy(&archive.inc_js),
        "\t(function() {\nalert(1);\n\t}).call($global);\n"
    );
}

#[test]
fn test_library_archives_persist_to_scratch() {
    let temp = MemoryFs::new();
    let path = MemoryFs::new();
    path.write_file(
        "gopath/src/example.com/util/util.go",
        "package util\n\nfunc Do() {}\n",
    );
    let mut options = base_options(std_goroot(), path);
    options.temp = Arc::new(temp.clone());
    let mut session = Session::new(options, FakeGen::shared());

    session
        .build_import_path(&token(), "example.com/util")
        .unwrap();
    assert!(temp.get("gopath/pkg/darwin_js/example.com/util.a").is_some());
}

#[test]
fn test_commands_are_not_persisted() {
    let temp = MemoryFs::new();
    let path = main_gopath("package main\n\nfunc main() {}\n");
    let mut options = base_options(std_goroot(), path);
    options.temp = Arc::new(temp.clone());
    let mut session = Session::new(options, FakeGen::shared());

    session.build_import_path(&token(), "main").unwrap();
    assert!(temp.is_empty());
}

#[test]
fn test_read_stored_archive_round_trips() {
    let temp = MemoryFs::new();
    let path = MemoryFs::new();
    path.write_file(
        "gopath/src/example.com/util/util.go",
        "package util\n\nfunc Do() {}\n",
    );
    let mut options = base_options(std_goroot(), path);
    options.temp = Arc::new(temp.clone());
    let mut session = Session::new(options, FakeGen::shared());

    let (pkg, _) = session
        .build_import_path(&token(), "example.com/util")
        .unwrap();
    let archive = session
        .read_stored_archive(&token(), &pkg.pkg_obj, "example.com/util")
        .unwrap();
    assert_eq!(archive.name, "util");
    assert_eq!(session.types()["example.com/util"].name, "util");
}

#[test]
fn test_build_files_synthesizes_main_package() {
    let path = MemoryFs::new();
    path.write_file("gopath/src/play/main.go", "package main\n\nfunc main() {}\n");
    path.write_file("gopath/src/play/extra.inc.js", "alert(2);");
    let mut session = session_with(std_goroot(), path);

    let output = session
        .build_files(
            &token(),
            &["main.go".to_string(), "extra.inc.js".to_string()],
            "gopath/src/play",
        )
        .unwrap();
    assert_eq!(output.path, "main");
    assert_eq!(output.packages.last().unwrap().path, "main");
    let archive = session.archive("main").unwrap();
    assert!(!archive.inc_js.is_empty());
}

#[test]
fn test_build_files_rejects_non_main() {
    let path = MemoryFs::new();
    path.write_file("gopath/src/play/lib.go", "package lib\n\nfunc Do() {}\n");
    let mut session = session_with(std_goroot(), path);
    let err = session
        .build_files(&token(), &["lib.go".to_string()], "gopath/src/play")
        .unwrap_err();
    match err {
        BuildError::NotMainPackage { name } => assert_eq!(name, "lib"),
        other => panic!("expected NotMainPackage, got {other}"),
    }
}

#[test]
fn test_build_dir_builds_command() {
    let path = MemoryFs::new();
    path.write_file(
        "gopath/src/example.com/cmd/main.go",
        "package main\n\nfunc main() {}\n",
    );
    let mut session = session_with(std_goroot(), path);
    let output = session
        .build_dir(&token(), "gopath/src/example.com/cmd", "")
        .unwrap();
    assert_eq!(output.path, "example.com/cmd");
}

#[test]
fn test_build_dir_rejects_library() {
    let path = MemoryFs::new();
    path.write_file(
        "gopath/src/example.com/util/util.go",
        "package util\n\nfunc Do() {}\n",
    );
    let mut session = session_with(std_goroot(), path);
    let err = session
        .build_dir(&token(), "gopath/src/example.com/util", "")
        .unwrap_err();
    assert!(matches!(err, BuildError::NotMainPackage { .. }));
}

#[test]
fn test_write_command_package_rejects_non_main() {
    let path = MemoryFs::new();
    path.write_file(
        "gopath/src/example.com/util/util.go",
        "package util\n\nfunc Do() {}\n",
    );
    let mut session = session_with(std_goroot(), path);
    let (_, archive) = session
        .build_import_path(&token(), "example.com/util")
        .unwrap();
    let err = session.write_command_package(&token(), &archive).unwrap_err();
    assert!(matches!(err, BuildError::NotMainPackage { .. }));
}

#[test]
fn test_minimal_main_program() {
    // A single-file main with no imports still pulls in the runtime, which
    // is served from the standard index rather than stored.
    let (index, archives) = std_runtime();
    let path = main_gopath("package main\n\nfunc main() {}\n");
    let mut options = base_options(std_goroot(), path);
    options.standard = Some(index);
    options.archives = Some(archives);
    options.initializer = true;
    let mut session = Session::new(options, FakeGen::shared());

    let (_, archive) = session.build_import_path(&token(), "main").unwrap();
    let output = session.write_command_package(&token(), &archive).unwrap();

    assert_eq!(output.path, "main");
    let paths: Vec<_> = output.packages.iter().map(|p| p.path.as_str()).collect();
    assert_eq!(paths, ["runtime", "main"]);

    let runtime = &output.packages[0];
    assert!(runtime.standard);
    assert!(!runtime.store);
    assert!(runtime.contents.is_none());
    assert_eq!(runtime.hash, vec![0x0c, 0x0d]);

    let main = &output.packages[1];
    assert!(!main.standard);
    assert!(main.store);
    assert!(main.contents.is_some());

    let (loader, _) = session.write_loader(&output);
    let loader = String::from_utf8(loader).unwrap();
    let prelude_at = loader.find("\"path\":\"prelude\"").unwrap();
    let runtime_at = loader.find("\"path\":\"runtime\"").unwrap();
    let main_at = loader.find("\"path\":\"main\"").unwrap();
    assert!(prelude_at < runtime_at && runtime_at < main_at);
    assert!(loader.contains("\"hash\":\"ff02\""), "prelude hash present");
}

#[test]
fn test_loader_is_bit_identical_across_builds() {
    let build = || {
        let (index, archives) = std_runtime();
        let path = main_gopath("package main\n\nfunc main() {}\n");
        let mut options = base_options(std_goroot(), path);
        options.standard = Some(index);
        options.archives = Some(archives);
        options.initializer = true;
        let mut session = Session::new(options, FakeGen::shared());
        let (_, archive) = session.build_import_path(&token(), "main").unwrap();
        let output = session.write_command_package(&token(), &archive).unwrap();
        session.write_loader(&output)
    };
    let (first, first_hash) = build();
    let (second, second_hash) = build();
    assert_eq!(first, second);
    assert_eq!(first_hash, second_hash);
}

#[test]
fn test_overlay_override_reaches_archive() {
    // A package with an overlay entry compiles with exactly one definition
    // of the overridden function, sourced from the overlay file.
    let path = MemoryFs::new();
    path.write_file(
        "gopath/src/example.com/p/a.go",
        "package p\n\nfunc f() int { return 1 }\n",
    );
    let natives = MemoryFs::new();
    natives.write_file(
        "src/example.com/p/f.go",
        "package p\n\nfunc f() int { return 2 }\n",
    );
    let mut options = base_options(std_goroot(), path);
    options.natives = Arc::new(natives);
    let mut session = Session::new(options, FakeGen::shared());

    let (_, archive) = session.build_import_path(&token(), "example.com/p").unwrap();
    let defs: Vec<_> = archive
        .declarations
        .iter()
        .filter(|d| d.name == "f")
        .collect();
    assert_eq!(defs.len(), 1);
    let code = String::from_utf8_lossy(&defs[0].code);
    assert!(code.contains("__f.go"), "definition must come from the overlay");
}

#[test]
fn test_bundled_runtime_overlay() {
    // Default options use the bundled overlay tree: the runtime gains the
    // overlay's declarations and pulls in the interop support package.
    let mut options = Options::new(Arc::new(std_goroot()));
    options.path = Arc::new(support_gopath());
    let mut session = Session::new(options, FakeGen::shared());

    let (_, archive) = session.build_import_path(&token(), "runtime").unwrap();
    assert!(archive.declarations.iter().any(|d| d.name == "throw"));
    assert_eq!(archive.imports, vec![SUPPORT_PACKAGE.to_string()]);
    assert_eq!(session.archive_order(), [SUPPORT_PACKAGE, "runtime"]);
}

#[test]
fn test_unvendor_path() {
    assert_eq!(unvendor_path("github.com/a/b/vendor/x/y"), "x/y");
    assert_eq!(unvendor_path("vendor/x/y"), "x/y");
    assert_eq!(
        unvendor_path("a/vendor/b/vendor/c"),
        "c",
        "the rightmost vendor segment wins"
    );
    assert_eq!(unvendor_path("x/y"), "x/y");
}
