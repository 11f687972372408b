//! Top-level parser.
//!
//! Tokenizes a file and recognizes the package clause, import declarations,
//! and `func`/`type`/`var`/`const` declarations, including methods and
//! grouped specs. Declaration bodies are skipped with bracket matching.
//! Errors are collected per file, capped at [`MAX_ERRORS_PER_FILE`] with a
//! trailing sentinel.

use super::ast::{DeclKind, ImportSpec, SourceFile, TopDecl};

/// Maximum number of errors reported for a single file. Further errors are
/// replaced by a single "too many errors" sentinel.
pub const MAX_ERRORS_PER_FILE: usize = 10;

/// A single scan or parse error with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.file, self.line, self.column, self.message
        )
    }
}

/// A non-empty list of parse errors, aggregated across the files of a
/// package.
#[derive(Debug, Clone)]
pub struct ParseErrors(pub Vec<ParseError>);

impl std::error::Error for ParseErrors {}

impl std::fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_slice() {
            [] => write!(f, "no errors"),
            [first] => write!(f, "{first}"),
            [first, rest @ ..] => write!(f, "{first} (and {} more errors)", rest.len()),
        }
    }
}

impl ParseErrors {
    /// Caps `errors` at [`MAX_ERRORS_PER_FILE`], replacing the tail with a
    /// sentinel positioned at the last reported error.
    pub fn capped(mut errors: Vec<ParseError>) -> ParseErrors {
        if errors.len() > MAX_ERRORS_PER_FILE {
            errors.truncate(MAX_ERRORS_PER_FILE);
            let last = errors[MAX_ERRORS_PER_FILE - 1].clone();
            errors.push(ParseError {
                message: "too many errors".to_string(),
                ..last
            });
        }
        ParseErrors(errors)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Parses `src`, returning the file's top-level shape or the capped error
/// list.
pub fn parse_file(name: &str, src: &str) -> Result<SourceFile, ParseErrors> {
    Parser::new(name, src).parse()
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Punct(char),
    Other,
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: u32,
    column: u32,
}

struct Scanner<'a> {
    file: String,
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    column: u32,
    collect_constraints: bool,
    constraints: Vec<String>,
    errors: Vec<ParseError>,
}

impl<'a> Scanner<'a> {
    fn new(file: &str, src: &'a str) -> Self {
        Self {
            file: file.to_string(),
            chars: src.chars().peekable(),
            line: 1,
            column: 1,
            collect_constraints: true,
            constraints: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&mut self, line: u32, column: u32, message: impl Into<String>) {
        self.errors.push(ParseError {
            file: self.file.clone(),
            line,
            column,
            message: message.into(),
        });
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.chars.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => {
                    let (line, column) = (self.line, self.column);
                    let mut probe = self.chars.clone();
                    probe.next();
                    match probe.peek() {
                        Some('/') => {
                            self.bump();
                            self.bump();
                            let mut text = String::new();
                            while let Some(&c) = self.chars.peek() {
                                if c == '\n' {
                                    break;
                                }
                                text.push(c);
                                self.bump();
                            }
                            let trimmed = text.trim_start();
                            if self.collect_constraints
                                && (text.starts_with("go:build ")
                                    || trimmed.starts_with("+build ")
                                    || trimmed == "+build")
                            {
                                self.constraints.push(format!("//{text}"));
                            }
                        }
                        Some('*') => {
                            self.bump();
                            self.bump();
                            let mut closed = false;
                            while let Some(c) = self.bump() {
                                if c == '*' && self.chars.peek() == Some(&'/') {
                                    self.bump();
                                    closed = true;
                                    break;
                                }
                            }
                            if !closed {
                                self.error(line, column, "comment not terminated");
                            }
                        }
                        _ => return,
                    }
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self) -> Token {
        self.skip_trivia();
        let (line, column) = (self.line, self.column);
        let make = |tok| Token { tok, line, column };

        let Some(&c) = self.chars.peek() else {
            return make(Tok::Eof);
        };

        if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&c) = self.chars.peek() {
                if c.is_alphanumeric() || c == '_' {
                    ident.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            return make(Tok::Ident(ident));
        }

        if c == '"' {
            self.bump();
            let mut value = String::new();
            loop {
                match self.chars.peek() {
                    None | Some('\n') => {
                        self.error(line, column, "string literal not terminated");
                        break;
                    }
                    Some('"') => {
                        self.bump();
                        break;
                    }
                    Some('\\') => {
                        self.bump();
                        if let Some(esc) = self.bump() {
                            value.push('\\');
                            value.push(esc);
                        }
                    }
                    Some(&c) => {
                        value.push(c);
                        self.bump();
                    }
                }
            }
            return make(Tok::Str(value));
        }

        if c == '`' {
            self.bump();
            let mut value = String::new();
            let mut closed = false;
            while let Some(c) = self.bump() {
                if c == '`' {
                    closed = true;
                    break;
                }
                value.push(c);
            }
            if !closed {
                self.error(line, column, "raw string literal not terminated");
            }
            return make(Tok::Str(value));
        }

        if c == '\'' {
            self.bump();
            loop {
                match self.chars.peek() {
                    None | Some('\n') => {
                        self.error(line, column, "rune literal not terminated");
                        break;
                    }
                    Some('\'') => {
                        self.bump();
                        break;
                    }
                    Some('\\') => {
                        self.bump();
                        self.bump();
                    }
                    Some(_) => {
                        self.bump();
                    }
                }
            }
            return make(Tok::Other);
        }

        if c.is_ascii_digit() {
            while let Some(&c) = self.chars.peek() {
                if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
                    self.bump();
                } else {
                    break;
                }
            }
            return make(Tok::Other);
        }

        self.bump();
        make(Tok::Punct(c))
    }
}

struct Parser<'a> {
    scan: Scanner<'a>,
    tok: Token,
    prev_line: u32,
    errors: Vec<ParseError>,
    src: &'a str,
    name: String,
}

const DECL_KEYWORDS: [&str; 5] = ["import", "func", "type", "var", "const"];

impl<'a> Parser<'a> {
    fn new(name: &str, src: &'a str) -> Self {
        let mut scan = Scanner::new(name, src);
        let tok = scan.next_token();
        Self {
            scan,
            tok,
            prev_line: 0,
            errors: Vec::new(),
            src,
            name: name.to_string(),
        }
    }

    fn next(&mut self) {
        self.prev_line = self.tok.line;
        self.tok = self.scan.next_token();
    }

    fn error_here(&mut self, message: impl Into<String>) {
        self.errors.push(ParseError {
            file: self.name.clone(),
            line: self.tok.line,
            column: self.tok.column,
            message: message.into(),
        });
    }

    fn overflowed(&self) -> bool {
        self.errors.len() + self.scan.errors.len() > MAX_ERRORS_PER_FILE
    }

    fn is_ident(&self, word: &str) -> bool {
        matches!(&self.tok.tok, Tok::Ident(s) if s == word)
    }

    fn at_decl_keyword(&self) -> bool {
        matches!(&self.tok.tok, Tok::Ident(s) if DECL_KEYWORDS.contains(&s.as_str()))
    }

    fn parse(mut self) -> Result<SourceFile, ParseErrors> {
        let mut file = SourceFile {
            name: self.name.clone(),
            package: String::new(),
            constraints: Vec::new(),
            imports: Vec::new(),
            decls: Vec::new(),
            src: self.src.to_string(),
        };

        if self.is_ident("package") {
            self.next();
            if let Tok::Ident(name) = &self.tok.tok {
                file.package = name.clone();
                self.next();
            } else {
                self.error_here("expected package name");
            }
        } else {
            self.error_here("expected 'package' clause");
        }
        self.scan.collect_constraints = false;

        while !matches!(self.tok.tok, Tok::Eof) && !self.overflowed() {
            match &self.tok.tok {
                Tok::Ident(kw) if kw == "import" => self.parse_import(&mut file),
                Tok::Ident(kw) if kw == "func" => self.parse_func(&mut file),
                Tok::Ident(kw) if kw == "type" => self.parse_gen(&mut file, DeclKind::Type),
                Tok::Ident(kw) if kw == "var" => self.parse_gen(&mut file, DeclKind::Var),
                Tok::Ident(kw) if kw == "const" => self.parse_gen(&mut file, DeclKind::Const),
                Tok::Punct(';') => self.next(),
                _ => {
                    self.error_here("expected declaration");
                    self.next();
                    self.skip_decl_tail();
                }
            }
        }

        file.constraints = self.scan.constraints.clone();
        let mut errors = std::mem::take(&mut self.scan.errors);
        errors.append(&mut self.errors);
        errors.sort_by_key(|e| (e.line, e.column));
        if errors.is_empty() {
            Ok(file)
        } else {
            Err(ParseErrors::capped(errors))
        }
    }

    fn parse_import(&mut self, file: &mut SourceFile) {
        self.next();
        if matches!(self.tok.tok, Tok::Punct('(')) {
            self.next();
            loop {
                match &self.tok.tok {
                    Tok::Punct(')') => {
                        self.next();
                        break;
                    }
                    Tok::Punct(';') => self.next(),
                    Tok::Eof => {
                        self.error_here("import block not closed");
                        break;
                    }
                    _ => {
                        self.parse_import_spec(file);
                        if self.overflowed() {
                            break;
                        }
                    }
                }
            }
        } else {
            self.parse_import_spec(file);
        }
    }

    /// Parses `["." | name] "path"`. Always consumes at least one token.
    fn parse_import_spec(&mut self, file: &mut SourceFile) {
        let name = match &self.tok.tok {
            Tok::Ident(alias) => {
                let alias = alias.clone();
                self.next();
                Some(alias)
            }
            Tok::Punct('.') => {
                self.next();
                Some(".".to_string())
            }
            _ => None,
        };
        if let Tok::Str(path) = &self.tok.tok {
            file.imports.push(ImportSpec {
                name,
                path: path.clone(),
            });
        } else {
            self.error_here("expected import path string");
        }
        self.next();
    }

    fn parse_func(&mut self, file: &mut SourceFile) {
        let line = self.tok.line;
        self.next();

        // Optional receiver. The base type is the last identifier outside
        // any type-parameter brackets, with a leading star unwrapped.
        let mut receiver = None;
        if matches!(self.tok.tok, Tok::Punct('(')) {
            self.next();
            let mut depth = 1usize;
            let mut brackets = 0usize;
            let mut last_ident = None;
            while depth > 0 {
                match &self.tok.tok {
                    Tok::Eof => {
                        self.error_here("receiver not closed");
                        break;
                    }
                    Tok::Punct('(') => depth += 1,
                    Tok::Punct(')') => depth -= 1,
                    Tok::Punct('[') => brackets += 1,
                    Tok::Punct(']') => brackets = brackets.saturating_sub(1),
                    Tok::Ident(name) if depth == 1 && brackets == 0 => {
                        last_ident = Some(name.clone());
                    }
                    _ => {}
                }
                self.next();
            }
            receiver = last_ident;
        }

        match &self.tok.tok {
            Tok::Ident(name) => {
                file.decls.push(TopDecl {
                    kind: DeclKind::Func { receiver },
                    name: name.clone(),
                    line,
                });
                self.next();
            }
            _ => self.error_here("expected function name"),
        }
        self.skip_decl_tail();
    }

    fn parse_gen(&mut self, file: &mut SourceFile, kind: DeclKind) {
        self.next();
        if matches!(self.tok.tok, Tok::Punct('(')) {
            self.next();
            loop {
                match &self.tok.tok {
                    Tok::Punct(')') => {
                        self.next();
                        break;
                    }
                    Tok::Punct(';') => self.next(),
                    Tok::Eof => {
                        self.error_here("declaration block not closed");
                        break;
                    }
                    Tok::Ident(_) => {
                        self.parse_spec_names(file, &kind);
                        self.skip_spec_tail();
                    }
                    _ => {
                        self.error_here("expected declaration name");
                        self.next();
                        self.skip_spec_tail();
                    }
                }
                if self.overflowed() {
                    break;
                }
            }
        } else {
            match &self.tok.tok {
                Tok::Ident(_) => self.parse_spec_names(file, &kind),
                _ => self.error_here("expected declaration name"),
            }
            self.skip_decl_tail();
        }
    }

    /// Parses `name` or, for var/const specs, `name, name, …`.
    fn parse_spec_names(&mut self, file: &mut SourceFile, kind: &DeclKind) {
        let line = self.tok.line;
        let mut names = Vec::new();
        if let Tok::Ident(name) = &self.tok.tok {
            names.push(name.clone());
            self.next();
        }
        if !matches!(kind, DeclKind::Type) {
            while matches!(self.tok.tok, Tok::Punct(',')) {
                self.next();
                match &self.tok.tok {
                    Tok::Ident(name) => {
                        names.push(name.clone());
                        self.next();
                    }
                    _ => {
                        self.error_here("expected declaration name after comma");
                        break;
                    }
                }
            }
        }
        for name in names {
            file.decls.push(TopDecl {
                kind: kind.clone(),
                name,
                line,
            });
        }
    }

    /// Consumes the remainder of a spec inside a grouped declaration: stops
    /// at the group's closing parenthesis or at the start of the next line
    /// once all opened brackets are balanced.
    fn skip_spec_tail(&mut self) {
        let start_line = self.prev_line;
        let mut depth = 0usize;
        loop {
            match &self.tok.tok {
                Tok::Eof => return,
                Tok::Punct(')') if depth == 0 => return,
                Tok::Punct(')') | Tok::Punct(']') | Tok::Punct('}') => {
                    depth = depth.saturating_sub(1);
                    self.next();
                }
                tok => {
                    if depth == 0 && self.tok.line > start_line {
                        return;
                    }
                    if matches!(tok, Tok::Punct('(') | Tok::Punct('[') | Tok::Punct('{')) {
                        depth += 1;
                    }
                    self.next();
                }
            }
        }
    }

    /// Consumes the remainder of a top-level declaration: stops at the next
    /// declaration keyword that starts a fresh line with all brackets
    /// balanced.
    fn skip_decl_tail(&mut self) {
        let mut depth = 0usize;
        loop {
            match &self.tok.tok {
                Tok::Eof => return,
                Tok::Punct('(') | Tok::Punct('[') | Tok::Punct('{') => {
                    depth += 1;
                    self.next();
                }
                Tok::Punct(')') | Tok::Punct(']') | Tok::Punct('}') => {
                    depth = depth.saturating_sub(1);
                    self.next();
                }
                _ => {
                    if depth == 0 && self.at_decl_keyword() && self.tok.line > self.prev_line {
                        return;
                    }
                    self.next();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(file: &SourceFile) -> Vec<String> {
        file.decls.iter().map(|d| d.qualified_name()).collect()
    }

    #[test]
    fn test_parse_package_clause() {
        let file = parse_file("main.go", "package main\n").unwrap();
        assert_eq!(file.package, "main");
        assert!(file.decls.is_empty());
    }

    #[test]
    fn test_parse_functions_and_methods() {
        let src = r#"package time

func Now() Time {
	return Time{sec: runtimeNano()}
}

func (t *Timer) Stop() bool {
	if t.r.f == nil {
		panic("time: Stop called on uninitialized Timer")
	}
	return stopTimer(&t.r)
}

func (d Duration) String() string { return format(d) }

func runtimeNano() int64
"#;
        let file = parse_file("time.go", src).unwrap();
        assert_eq!(
            names(&file),
            vec!["Now", "Timer.Stop", "Duration.String", "runtimeNano"]
        );
    }

    #[test]
    fn test_parse_imports() {
        let src = r#"package log

import (
	"fmt"
	"sync"
	u "unicode/utf8"
	. "strings"
	_ "unsafe"
)

import "os"
"#;
        let file = parse_file("log.go", src).unwrap();
        let paths: Vec<_> = file.import_paths().collect();
        assert_eq!(
            paths,
            vec!["fmt", "sync", "unicode/utf8", "strings", "unsafe", "os"]
        );
        assert_eq!(file.imports[2].name.as_deref(), Some("u"));
        assert_eq!(file.imports[3].name.as_deref(), Some("."));
        assert_eq!(file.imports[4].name.as_deref(), Some("_"));
        assert_eq!(file.imports[5].name, None);
    }

    #[test]
    fn test_parse_grouped_specs() {
        let src = r#"package p

const (
	a, b = 1, 2
	c    = iota
	d
)

var (
	x = map[string]int{
		"multi": 1,
		"line":  2,
	}
	y, z int
)

type (
	Reader struct{ r io.Reader }
	Writer interface {
		Write(p []byte) (int, error)
	}
)
"#;
        let file = parse_file("p.go", src).unwrap();
        assert_eq!(
            names(&file),
            vec!["a", "b", "c", "d", "x", "y", "z", "Reader", "Writer"]
        );
    }

    #[test]
    fn test_parse_var_with_func_literal() {
        let src = "package p\n\nvar handler = func() int {\n\treturn 1\n}\n\nfunc g() {}\n";
        let file = parse_file("p.go", src).unwrap();
        assert_eq!(names(&file), vec!["handler", "g"]);
    }

    #[test]
    fn test_collects_build_constraints() {
        let src = "//go:build js && !windows\n// +build js,!windows\n\npackage p\n";
        let file = parse_file("p.go", src).unwrap();
        assert_eq!(
            file.constraints,
            vec!["//go:build js && !windows", "// +build js,!windows"]
        );
    }

    #[test]
    fn test_constraints_after_package_clause_ignored() {
        let src = "package p\n\n// +build ignored\nfunc f() {}\n";
        let file = parse_file("p.go", src).unwrap();
        assert!(file.constraints.is_empty());
    }

    #[test]
    fn test_missing_package_clause() {
        let err = parse_file("p.go", "func f() {}\n").unwrap_err();
        assert!(err.to_string().contains("package"));
    }

    #[test]
    fn test_error_cap_with_sentinel() {
        // Each malformed func declaration produces one error.
        let mut src = String::from("package p\n");
        for _ in 0..30 {
            src.push_str("func 1\n");
        }
        let err = parse_file("p.go", &src).unwrap_err();
        assert_eq!(err.len(), MAX_ERRORS_PER_FILE + 1);
        assert_eq!(err.0.last().unwrap().message, "too many errors");
    }

    #[test]
    fn test_unterminated_string() {
        let err = parse_file("p.go", "package p\n\nvar s = \"oops\n").unwrap_err();
        assert!(err.to_string().contains("not terminated"));
    }

    #[test]
    fn test_strings_and_comments_hide_braces() {
        let src = "package p\n\nvar s = \"}{\" // }\nvar t = `{`\n/* { */\nfunc f() {}\n";
        let file = parse_file("p.go", src).unwrap();
        assert_eq!(names(&file), vec!["s", "t", "f"]);
    }

    #[test]
    fn test_display_lists_first_error_and_count() {
        let errors = ParseErrors(vec![
            ParseError {
                file: "a.go".into(),
                line: 1,
                column: 2,
                message: "bad".into(),
            },
            ParseError {
                file: "a.go".into(),
                line: 3,
                column: 4,
                message: "worse".into(),
            },
        ]);
        assert_eq!(errors.to_string(), "a.go:1:2: bad (and 1 more errors)");
    }
}
