//! Bundle ("barrel") manifests: several units compiled into one stream.
//!
//! ```json
//! {
//!   "Externs": ["externs/jquery.js"],
//!   "Includes": ["lib"],
//!   "Units": [
//!     { "File": "vendor.main.js", "Level": "Basic" },
//!     { "File": "app.main.jsx", "Externs": ["externs/app.js"] }
//!   ]
//! }
//! ```
//!
//! Paths are relative to the manifest's directory. A unit compiles at its
//! own level capped by the global one; a missing or unrecognized level means
//! `Advanced`. Units run one after another in manifest order.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, instrument};

use kiln_shared::{BuildSettings, KilnError, OptimizationLevel, Result, SourceKind};

use crate::compile::Compiler;

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Manifest {
    #[serde(default)]
    pub externs: Vec<String>,
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub units: Vec<Unit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Unit {
    pub file: String,
    #[serde(default)]
    pub level: Option<String>,
    /// Extra externs for this unit only.
    #[serde(default)]
    pub externs: Vec<String>,
    /// Extra include directories for this unit only.
    #[serde(default)]
    pub includes: Vec<String>,
}

impl Unit {
    /// Declared level. Names are matched exactly; anything else is `Advanced`.
    pub fn level(&self) -> OptimizationLevel {
        match self.level.as_deref() {
            Some("None") => OptimizationLevel::None,
            Some("Basic") => OptimizationLevel::Basic,
            _ => OptimizationLevel::Advanced,
        }
    }
}

impl Manifest {
    /// Read and decode a manifest. Read fresh on every call.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path).map_err(|e| KilnError::io(path, e))?;
        serde_json::from_slice(&raw).map_err(|e| KilnError::manifest(path, e.to_string()))
    }

    /// Settings for one unit: the global settings plus this manifest's and
    /// the unit's externs and includes, at the unit's capped level.
    pub fn unit_settings(&self, unit: &Unit, base: &BuildSettings, dir: &Path) -> BuildSettings {
        let mut settings = base.at_level(unit.level().capped_by(base.level));

        let rel = |p: &String| -> PathBuf { dir.join(p) };
        settings
            .externs
            .extend(self.externs.iter().chain(&unit.externs).map(rel));

        let includes: Vec<PathBuf> = self.includes.iter().chain(&unit.includes).map(rel).collect();
        settings.component_includes.extend(includes.iter().cloned());
        settings.preprocessor_includes.extend(includes.iter().cloned());
        settings.stylesheet_includes.extend(includes);
        settings
    }
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Compile every unit of the manifest at `path` into `w`, in order. The
/// first failing unit stops the bundle.
#[instrument(skip_all, fields(manifest = %path.display()))]
pub fn compile_bundle(path: &Path, compiler: &Compiler<'_>, w: &mut dyn Write) -> Result<u64> {
    let manifest = Manifest::load(path)?;
    let dir = path.parent().unwrap_or(Path::new(""));
    let base = compiler.settings();

    let mut written = 0;
    for (index, unit) in manifest.units.iter().enumerate() {
        let source = dir.join(&unit.file);
        let kind = SourceKind::of(&source);
        match kind {
            SourceKind::Bundle => {
                return Err(KilnError::manifest(
                    path,
                    format!("unit {index} ({}) is itself a bundle", unit.file),
                ));
            }
            SourceKind::Passthrough | SourceKind::Unknown => {
                return Err(KilnError::UnsupportedKind {
                    kind: kind.to_string(),
                    path: source,
                });
            }
            _ => {}
        }

        let settings = manifest.unit_settings(unit, base, dir);
        info!(index, unit = %unit.file, level = %settings.level, "compiling bundle unit");
        written += Compiler::new(compiler.tools(), &settings).compile(kind, &source, w)?;
    }

    Ok(written)
}
