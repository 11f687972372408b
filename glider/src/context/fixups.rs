//! Per-package workarounds for standard-library quirks.
//!
//! A handful of standard packages need their build context or file list
//! adjusted before they compile for the browser. The workarounds live in a
//! single data-driven table so new entries are data edits, not logic edits.
//!
//! Context fixups run before the resolver sees the package; file fixups run
//! on the resolved record, after file selection.

use super::BuildContext;
use crate::importer::Package;

struct Fixup {
    import_path: &'static str,
    context: Option<fn(&mut BuildContext)>,
    files: Option<fn(&BuildContext, &mut Package)>,
}

static FIXUPS: &[Fixup] = &[
    Fixup {
        // syscall needs a typical GOARCH to pick up definitions for
        // Timeval, Flock_t, SYS_FCNTL and friends.
        import_path: "syscall",
        context: Some(|ctx| {
            ctx.goarch = host_goarch().to_string();
            let caller_suffix = std::mem::take(&mut ctx.install_suffix);
            ctx.install_suffix = if caller_suffix.is_empty() {
                "js".to_string()
            } else {
                format!("js_{caller_suffix}")
            };
        }),
        files: None,
    },
    Fixup {
        // Assembly-backed arithmetic cannot run in the browser.
        import_path: "math/big",
        context: Some(|ctx| ctx.build_tags.push("math_big_pure_go".to_string())),
        files: None,
    },
    Fixup {
        import_path: "crypto/x509",
        context: Some(|ctx| ctx.cgo_enabled = false),
        files: None,
    },
    Fixup {
        import_path: "os/user",
        context: Some(|ctx| ctx.cgo_enabled = false),
        files: None,
    },
    Fixup {
        // Executable implementation files have package-scope variables that
        // perform syscalls on init.
        import_path: "os",
        context: None,
        files: Some(|_, pkg| {
            pkg.go_files
                .retain(|name| !name.starts_with("executable_"));
        }),
    },
    Fixup {
        import_path: "runtime",
        context: None,
        files: Some(|_, pkg| pkg.go_files = vec!["error.go".to_string()]),
    },
    Fixup {
        import_path: "runtime/internal/sys",
        context: None,
        files: Some(|ctx, pkg| {
            pkg.go_files = vec![format!("zgoos_{}.go", ctx.goos), "zversion.go".to_string()];
        }),
    },
    Fixup {
        import_path: "runtime/pprof",
        context: None,
        files: Some(|_, pkg| pkg.go_files.clear()),
    },
    Fixup {
        import_path: "internal/poll",
        context: None,
        files: Some(|_, pkg| pkg.go_files.retain(|name| name != "fd_poll_runtime.go")),
    },
    Fixup {
        import_path: "crypto/rand",
        context: None,
        files: Some(|_, pkg| {
            pkg.go_files = vec!["rand.go".to_string(), "util.go".to_string()];
            // Linux-specific package files are excluded, so their tests
            // must go too.
            pkg.test_go_files.retain(|name| name != "rand_linux_test.go");
        }),
    },
];

/// Adjusts the build context for `import_path` before resolution.
pub fn apply_context_fixups(ctx: &mut BuildContext, import_path: &str) {
    for fixup in FIXUPS {
        if fixup.import_path == import_path {
            if let Some(apply) = fixup.context {
                apply(ctx);
            }
        }
    }
}

/// Adjusts the resolved file lists of `pkg` after resolution.
pub fn apply_file_fixups(ctx: &BuildContext, pkg: &mut Package) {
    for fixup in FIXUPS {
        if fixup.import_path == pkg.import_path {
            if let Some(apply) = fixup.files {
                apply(ctx, pkg);
            }
        }
    }
}

/// Maps the host architecture to its Go name.
pub fn host_goarch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        other => other,
    }
}
