//! Build constraint evaluation.
//!
//! Files are filtered two ways: by the `_goos`/`_goarch` suffix convention
//! in the file name, and by `//go:build` / `// +build` comment lines above
//! the package clause. Individual tags are matched by
//! [`BuildContext::matches_tag`].

use crate::context::BuildContext;

const KNOWN_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "linux", "nacl", "netbsd", "openbsd",
    "plan9", "solaris", "windows", "zos",
];

const KNOWN_ARCH: &[&str] = &[
    "386", "amd64", "arm", "arm64", "js", "mips", "mips64", "mips64le", "mipsle", "ppc64",
    "ppc64le", "riscv64", "s390x", "wasm",
];

/// Applies the file-name suffix convention: `name_GOOS.go`,
/// `name_GOARCH.go`, or `name_GOOS_GOARCH.go` restrict the file to that
/// platform. A `_test` suffix is ignored for matching purposes.
pub(crate) fn file_name_matches(ctx: &BuildContext, name: &str) -> bool {
    let base = name.strip_suffix(".go").unwrap_or(name);
    let base = base.strip_suffix("_test").unwrap_or(base);
    let parts: Vec<&str> = base.split('_').collect();
    let n = parts.len();

    if n >= 3 && KNOWN_OS.contains(&parts[n - 2]) && KNOWN_ARCH.contains(&parts[n - 1]) {
        return parts[n - 2] == ctx.goos && parts[n - 1] == ctx.goarch;
    }
    if n >= 2 && KNOWN_OS.contains(&parts[n - 1]) {
        return parts[n - 1] == ctx.goos;
    }
    if n >= 2 && KNOWN_ARCH.contains(&parts[n - 1]) {
        return parts[n - 1] == ctx.goarch;
    }
    true
}

/// Evaluates every constraint comment line. All lines must be satisfied
/// for the file to be included.
pub(crate) fn constraints_satisfied(ctx: &BuildContext, lines: &[String]) -> bool {
    for line in lines {
        if let Some(expr) = line.strip_prefix("//go:build") {
            if !eval_build_expr(ctx, expr) {
                return false;
            }
        } else if let Some(rest) = line.strip_prefix("//") {
            let rest = rest.trim_start();
            if let Some(groups) = rest.strip_prefix("+build") {
                if !eval_plus_build(ctx, groups) {
                    return false;
                }
            }
        }
    }
    true
}

/// `// +build` lines: whitespace-separated groups are OR-ed, comma-joined
/// terms inside a group are AND-ed, `!` negates a term.
fn eval_plus_build(ctx: &BuildContext, groups: &str) -> bool {
    let mut any = false;
    let mut seen_group = false;
    for group in groups.split_whitespace() {
        seen_group = true;
        let ok = group.split(',').all(|term| eval_term(ctx, term));
        any = any || ok;
    }
    // A bare "// +build" line constrains nothing.
    !seen_group || any
}

fn eval_term(ctx: &BuildContext, term: &str) -> bool {
    match term.strip_prefix('!') {
        Some(tag) => !ctx.matches_tag(tag),
        None => ctx.matches_tag(term),
    }
}

/// `//go:build` expressions: `!`, `&&`, `||` and parentheses over tags.
/// A malformed expression excludes the file.
fn eval_build_expr(ctx: &BuildContext, expr: &str) -> bool {
    let tokens = tokenize(expr);
    let mut parser = ExprParser {
        ctx,
        tokens,
        pos: 0,
    };
    match parser.or_expr() {
        Some(value) if parser.pos == parser.tokens.len() => value,
        _ => false,
    }
}

fn tokenize(expr: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | ')' | '!' => {
                tokens.push(c.to_string());
                chars.next();
            }
            '&' | '|' => {
                let first = c;
                chars.next();
                if chars.peek() == Some(&first) {
                    chars.next();
                    tokens.push(format!("{first}{first}"));
                } else {
                    tokens.push(first.to_string());
                }
            }
            _ => {
                let mut tag = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '.' || c == '-' {
                        tag.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if tag.is_empty() {
                    // Unrecognized character; poison the token stream.
                    tokens.push("\u{0}".to_string());
                    chars.next();
                } else {
                    tokens.push(tag);
                }
            }
        }
    }
    tokens
}

struct ExprParser<'a> {
    ctx: &'a BuildContext,
    tokens: Vec<String>,
    pos: usize,
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn or_expr(&mut self) -> Option<bool> {
        let mut value = self.and_expr()?;
        while self.peek() == Some("||") {
            self.pos += 1;
            let rhs = self.and_expr()?;
            value = value || rhs;
        }
        Some(value)
    }

    fn and_expr(&mut self) -> Option<bool> {
        let mut value = self.unary()?;
        while self.peek() == Some("&&") {
            self.pos += 1;
            let rhs = self.unary()?;
            value = value && rhs;
        }
        Some(value)
    }

    fn unary(&mut self) -> Option<bool> {
        match self.peek()? {
            "!" => {
                self.pos += 1;
                Some(!self.unary()?)
            }
            "(" => {
                self.pos += 1;
                let value = self.or_expr()?;
                if self.peek() != Some(")") {
                    return None;
                }
                self.pos += 1;
                Some(value)
            }
            "&&" | "||" | ")" | "\u{0}" => None,
            _ => {
                let tag = self.tokens[self.pos].clone();
                self.pos += 1;
                Some(self.ctx.matches_tag(&tag))
            }
        }
    }
}
