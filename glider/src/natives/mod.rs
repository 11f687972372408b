//! Bundled overlay sources for standard-library packages.
//!
//! The overlay tree mirrors the layout of a source root: package `p` lives
//! under `src/p/`. Declarations defined here replace same-named
//! declarations of the original package during augmentation.
//!
//! The tree ships inside the binary and is materialized into a read-only
//! in-memory filesystem on first use.

use std::sync::{Arc, OnceLock};

use crate::vfs::{Filesystem, MemoryFs};

/// Import path of the JavaScript interop support package. Vendored copies
/// of this package are rejected by the importer.
pub const SUPPORT_PACKAGE: &str = "github.com/glider-lang/glider/js";

/// Import path of the lock-free `sync` substitute used by standard
/// packages that must not block.
pub const NOSYNC_PACKAGE: &str = "github.com/glider-lang/glider/nosync";

static OVERLAY_FILES: &[(&str, &str)] = &[
    (
        "src/runtime/runtime.go",
        r#"package runtime

import "github.com/glider-lang/glider/js"

func throw(s string) {
	js.Global.Call("$throwRuntimeError", s)
}

func nanotime() int64 {
	return js.Global.Get("Date").New().Call("getTime").Int64() * int64(1000000)
}

func Goexit() {
	js.Global.Call("$goexit")
}
"#,
    ),
    (
        "src/time/time.go",
        r#"package time

import "github.com/glider-lang/glider/js"

func now() (sec int64, nsec int32, mono int64) {
	msec := js.Global.Get("Date").New().Call("getTime").Int64()
	return msec / 1000, int32(msec%1000) * 1000000, 0
}

func Sleep(d Duration) {
	c := make(chan struct{})
	js.Global.Call("setTimeout", js.InternalObject(func() { close(c) }), int(d/Millisecond))
	<-c
}

func (t *Timer) Stop() bool {
	if t.r.f == nil {
		panic("time: Stop called on uninitialized Timer")
	}
	return stopTimer(&t.r)
}
"#,
    ),
    (
        "src/sync/pool.go",
        r#"package sync

type Pool struct {
	store []interface{}

	New func() interface{}
}

func (p *Pool) Get() interface{} {
	if len(p.store) == 0 {
		if p.New != nil {
			return p.New()
		}
		return nil
	}
	x := p.store[len(p.store)-1]
	p.store = p.store[:len(p.store)-1]
	return x
}

func (p *Pool) Put(x interface{}) {
	if x == nil {
		return
	}
	p.store = append(p.store, x)
}
"#,
    ),
];

/// The bundled overlay tree.
pub fn bundled() -> Arc<dyn Filesystem> {
    static BUNDLED: OnceLock<Arc<MemoryFs>> = OnceLock::new();
    let fs = BUNDLED.get_or_init(|| {
        let fs = MemoryFs::new();
        for (path, src) in OVERLAY_FILES {
            fs.write_file(path, *src);
        }
        Arc::new(fs)
    });
    Arc::clone(fs) as Arc<dyn Filesystem>
}
