//! Source directive expansion.
//!
//! Sources may start with a block of `//` comment lines. Lines of the form
//! `//@include("file", ...)` in that block name files that are copied
//! verbatim into the output, in argument order. Scanning stops at the first
//! line that is neither blank nor a comment.
//!
//! Every directive is parsed before anything is written, so a malformed
//! directive leaves the output untouched.

mod parser;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use tracing::{debug, instrument};

use kiln_shared::{KilnError, Result};

pub use parser::Directive;

/// Read the leading comment block of `source` and parse its directives.
pub fn scan_directives(source: &Path) -> Result<Vec<Directive>> {
    let file = File::open(source).map_err(|e| KilnError::io(source, e))?;
    let mut reader = BufReader::new(file);
    let mut directives = Vec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| KilnError::io(source, e))?;
        if n == 0 {
            break;
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !line.starts_with("//") {
            break;
        }
        if let Some(expr) = line.strip_prefix("//@") {
            let directive =
                parser::parse_directive(expr).map_err(|msg| KilnError::directive(source, msg))?;
            directives.push(directive);
        }
    }

    Ok(directives)
}

/// Expand every directive of `source` into `w`. Returns the number of bytes
/// written.
#[instrument(skip_all, fields(source = %source.display()))]
pub fn expand_directives(source: &Path, w: &mut dyn Write) -> Result<u64> {
    let directives = scan_directives(source)?;
    let base = source.parent().unwrap_or(Path::new(""));

    let mut written = 0;
    for directive in &directives {
        match directive {
            Directive::Include(files) => {
                for name in files {
                    written += include_file(source, &base.join(name), w)?;
                }
            }
        }
    }

    if !directives.is_empty() {
        debug!(count = directives.len(), bytes = written, "expanded directives");
    }
    Ok(written)
}

fn include_file(source: &Path, path: &Path, w: &mut dyn Write) -> Result<u64> {
    let mut file = File::open(path).map_err(|e| {
        KilnError::directive(source, format!("cannot include {}: {e}", path.display()))
    })?;
    io::copy(&mut file, w).map_err(|e| KilnError::io(path, e))
}
