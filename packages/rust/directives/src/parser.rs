//! Directive expression parser.
//!
//! A directive is the text after `//@` on a leading comment line, shaped like
//! a function call whose arguments are string literals:
//! `include("a.js", "vendor/b.js")`. Literals are double-quoted with the
//! usual backslash escapes, or backquoted raw strings.

use regex::Regex;
use std::sync::LazyLock;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A parsed source directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Concatenate the named files, relative to the source's directory.
    Include(Vec<String>),
}

/// Matches `name(args)`, capturing the name and the raw argument text.
static CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*\((.*)\)$").expect("call regex")
});

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse one directive expression. Errors are plain messages; the caller
/// attaches the source path.
pub(crate) fn parse_directive(text: &str) -> Result<Directive, String> {
    let text = text.trim();
    let caps = CALL_RE
        .captures(text)
        .ok_or_else(|| format!("expected call expression: {text}"))?;

    let name = &caps[1];
    let args = parse_args(&caps[2])?;

    match name {
        "include" => {
            if args.is_empty() {
                return Err("include needs at least one file".into());
            }
            Ok(Directive::Include(args))
        }
        _ => Err(format!("undefined directive: {name}")),
    }
}

/// Parse a comma-separated list of string literals.
fn parse_args(raw: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut chars = raw.chars().peekable();

    loop {
        skip_ws(&mut chars);
        let Some(&c) = chars.peek() else {
            break;
        };

        let value = match c {
            '"' => {
                chars.next();
                quoted(&mut chars)?
            }
            '`' => {
                chars.next();
                raw_string(&mut chars)?
            }
            _ => {
                let rest: String = chars.collect();
                return Err(format!("expected string literal: {}", rest.trim()));
            }
        };
        args.push(value);

        skip_ws(&mut chars);
        match chars.next() {
            None => break,
            Some(',') => {
                skip_ws(&mut chars);
                if chars.peek().is_none() {
                    return Err("trailing comma in argument list".into());
                }
            }
            Some(other) => return Err(format!("unexpected '{other}' after argument")),
        }
    }

    Ok(args)
}

type Chars<'a> = std::iter::Peekable<std::str::Chars<'a>>;

fn skip_ws(chars: &mut Chars<'_>) {
    while chars.next_if(|c| c.is_whitespace()).is_some() {}
}

fn quoted(chars: &mut Chars<'_>) -> Result<String, String> {
    let mut out = String::new();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Ok(out),
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(e @ ('\\' | '"' | '\'')) => out.push(e),
                Some(other) => return Err(format!("unknown escape \\{other}")),
                None => break,
            },
            _ => out.push(c),
        }
    }
    Err("unterminated string literal".into())
}

fn raw_string(chars: &mut Chars<'_>) -> Result<String, String> {
    let mut out = String::new();
    for c in chars.by_ref() {
        if c == '`' {
            return Ok(out);
        }
        out.push(c);
    }
    Err("unterminated raw string literal".into())
}
