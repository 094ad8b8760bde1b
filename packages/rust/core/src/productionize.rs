//! Batch export of every source root into a static output tree.
//!
//! Compiled kinds are written under the destination with their output
//! extension; other files are copied; include-only fragments are skipped.
//! After the pass the destination becomes the first root, so requests see
//! pre-built output before compiling anything live.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument};

use kiln_shared::{KilnError, Result, SourceKind};

use crate::compile::Compiler;
use crate::content::Content;

/// Counts from one export pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub compiled: usize,
    pub copied: usize,
    /// Fragments and files that were already in place.
    pub skipped: usize,
    pub elapsed: Duration,
}

/// Progress callback for export passes.
pub trait BuildProgress: Send + Sync {
    /// Called when a root's walk starts.
    fn root(&self, root: &Path);
    /// Called after each file is written.
    fn file(&self, source: &Path, output: &Path, kind: SourceKind);
    fn done(&self, report: &BuildReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl BuildProgress for SilentProgress {
    fn root(&self, _root: &Path) {}
    fn file(&self, _source: &Path, _output: &Path, _kind: SourceKind) {}
    fn done(&self, _report: &BuildReport) {}
}

// ---------------------------------------------------------------------------
// Content entry points
// ---------------------------------------------------------------------------

/// Repeats the export that created it.
#[derive(Debug, Clone)]
pub struct Rebuild {
    content: Arc<Content>,
    dest: PathBuf,
}

impl Rebuild {
    pub fn destination(&self) -> &Path {
        &self.dest
    }

    pub fn run(&self, progress: &dyn BuildProgress) -> Result<BuildReport> {
        self.content.export(&self.dest, progress)
    }
}

impl Content {
    /// Export every source root into `dest`, then put `dest` first in the
    /// root list. Returns the report and a handle that repeats the export.
    pub fn productionize(
        self: &Arc<Self>,
        dest: impl Into<PathBuf>,
        progress: &dyn BuildProgress,
    ) -> Result<(BuildReport, Rebuild)> {
        let dest = dest.into();
        let report = self.export(&dest, progress)?;
        let rebuild = Rebuild {
            content: Arc::clone(self),
            dest,
        };
        Ok((report, rebuild))
    }

    /// Walk and root-list update run under one write lock.
    fn export(&self, dest: &Path, progress: &dyn BuildProgress) -> Result<BuildReport> {
        let mut state = self.lock_roots_mut()?;
        let sources = state.sources();
        let report = export_tree(&sources, dest, &self.compiler(), progress)?;

        let already_root = state.roots.iter().any(|r| same_path(r, dest));
        if !already_root {
            state.roots.insert(0, dest.to_path_buf());
            state.exports.push(dest.to_path_buf());
            info!(dest = %dest.display(), "export root prepended");
        }
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tree walk
// ---------------------------------------------------------------------------

/// Export `roots` into `dest`. Entries are visited in name order. A
/// directory that is `dest` itself is never descended into. Output already
/// written is kept when a later file fails.
#[instrument(skip_all, fields(dest = %dest.display(), roots = roots.len()))]
pub fn export_tree(
    roots: &[PathBuf],
    dest: &Path,
    compiler: &Compiler<'_>,
    progress: &dyn BuildProgress,
) -> Result<BuildReport> {
    let start = Instant::now();
    std::fs::create_dir_all(dest).map_err(|e| KilnError::io(dest, e))?;
    let canonical_dest = dest
        .canonicalize()
        .map_err(|e| KilnError::io(dest, e))?;

    let mut export = Export {
        dest,
        canonical_dest,
        compiler,
        progress,
        report: BuildReport::default(),
    };

    for root in roots {
        progress.root(root);
        info!(root = %root.display(), "exporting root");
        export.walk(root, root)?;
    }

    let mut report = export.report;
    report.elapsed = start.elapsed();
    info!(
        compiled = report.compiled,
        copied = report.copied,
        skipped = report.skipped,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "export complete"
    );
    progress.done(&report);
    Ok(report)
}

struct Export<'a> {
    dest: &'a Path,
    canonical_dest: PathBuf,
    compiler: &'a Compiler<'a>,
    progress: &'a dyn BuildProgress,
    report: BuildReport,
}

impl Export<'_> {
    fn walk(&mut self, root: &Path, dir: &Path) -> Result<()> {
        let mut entries = std::fs::read_dir(dir)
            .and_then(|rd| rd.collect::<std::io::Result<Vec<_>>>())
            .map_err(|e| KilnError::io(dir, e))?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| KilnError::io(&path, e))?;

            if file_type.is_dir() {
                if path.canonicalize().is_ok_and(|p| p == self.canonical_dest) {
                    debug!(path = %path.display(), "skipping export destination");
                    continue;
                }
                self.walk(root, &path)?;
            } else if path.is_file() {
                self.file(root, &path)?;
            }
        }
        Ok(())
    }

    fn file(&mut self, root: &Path, source: &Path) -> Result<()> {
        let rel = source.strip_prefix(root).map_err(|_| {
            KilnError::validation(format!("{} is outside {}", source.display(), root.display()))
        })?;
        let target = self.dest.join(rel);
        let kind = SourceKind::of(source);

        match kind {
            SourceKind::Unknown => {
                self.report.skipped += 1;
            }
            SourceKind::Passthrough => {
                if same_path(source, &target) {
                    self.report.skipped += 1;
                    return Ok(());
                }
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| KilnError::io(parent, e))?;
                }
                std::fs::copy(source, &target).map_err(|e| KilnError::io(source, e))?;
                self.report.copied += 1;
                self.progress.file(source, &target, kind);
            }
            _ => {
                let Some(output) = kind.output_name(&target) else {
                    self.report.skipped += 1;
                    return Ok(());
                };
                debug!(source = %source.display(), output = %output.display(), %kind, "compiling");
                self.compiler.compile_to_file(kind, source, &output)?;
                self.report.compiled += 1;
                self.progress.file(source, &output, kind);
            }
        }
        Ok(())
    }
}

/// Whether two paths name the same existing file or directory.
fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
