//! Build recipes: which external tools turn each source kind into output.
//!
//! The recipe table maps a [`SourceKind`] to a front end and says whether the
//! optimizer is appended above `None`. Adding a kind means adding a row.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use kiln_process::{CommandSpec, Pipeline};
use kiln_shared::{BuildSettings, KilnError, OptimizationLevel, Result, SourceKind, Toolchain};

// ---------------------------------------------------------------------------
// Recipe table
// ---------------------------------------------------------------------------

/// The first tool a source passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontEnd {
    /// Bytes are streamed unchanged.
    Copy,
    Component,
    /// Emits to a scratch file instead of stdout.
    TypeScript,
    Stylesheet,
    Preprocessor,
    /// Handled by the bundle aggregator, one recipe per unit.
    Manifest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recipe {
    pub kind: SourceKind,
    pub front_end: FrontEnd,
    /// Append the optimizer stage at `Basic` and `Advanced`.
    pub optimized: bool,
}

pub const RECIPES: &[Recipe] = &[
    Recipe {
        kind: SourceKind::Passthrough,
        front_end: FrontEnd::Copy,
        optimized: false,
    },
    Recipe {
        kind: SourceKind::Component,
        front_end: FrontEnd::Component,
        optimized: true,
    },
    Recipe {
        kind: SourceKind::TypedSuperset,
        front_end: FrontEnd::TypeScript,
        optimized: true,
    },
    Recipe {
        kind: SourceKind::Stylesheet,
        front_end: FrontEnd::Stylesheet,
        optimized: false,
    },
    Recipe {
        kind: SourceKind::PreprocessedScript,
        front_end: FrontEnd::Preprocessor,
        optimized: true,
    },
    Recipe {
        kind: SourceKind::Bundle,
        front_end: FrontEnd::Manifest,
        optimized: false,
    },
];

/// Look up the recipe for `kind`. `None` for [`SourceKind::Unknown`].
pub fn recipe_for(kind: SourceKind) -> Option<&'static Recipe> {
    RECIPES.iter().find(|r| r.kind == kind)
}

// ---------------------------------------------------------------------------
// Build plans
// ---------------------------------------------------------------------------

/// Everything needed to produce one source's output.
#[derive(Debug)]
pub enum BuildPlan {
    Passthrough {
        source: PathBuf,
    },
    /// The last stage's stdout is the output.
    Stream(Pipeline),
    /// `compile` writes `artifact`; the output is the artifact, optionally
    /// run through `optimize`. The scratch dir is removed when the plan drops.
    Intermediate {
        compile: Pipeline,
        artifact: PathBuf,
        optimize: Option<Pipeline>,
        scratch: TempDir,
    },
    Bundle {
        manifest: PathBuf,
    },
}

/// Turns a source kind and file into a [`BuildPlan`].
#[derive(Debug, Clone, Copy)]
pub struct PipelineBuilder<'a> {
    pub tools: &'a Toolchain,
    pub settings: &'a BuildSettings,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(tools: &'a Toolchain, settings: &'a BuildSettings) -> Self {
        Self { tools, settings }
    }

    /// Build the plan for `source`. Every tool the plan needs is located
    /// before this returns, so a missing executable fails here and not
    /// halfway through a run. Stages name their tools by absolute path.
    pub fn plan(&self, kind: SourceKind, source: &Path) -> Result<BuildPlan> {
        let recipe = recipe_for(kind).ok_or_else(|| KilnError::UnsupportedKind {
            kind: kind.to_string(),
            path: source.to_path_buf(),
        })?;
        let level = self.settings.level;
        debug!(%kind, %level, source = %source.display(), "building plan");

        let optimizer = (recipe.optimized && level.optimizes()).then(|| self.optimizer());

        let plan = match recipe.front_end {
            FrontEnd::Copy => BuildPlan::Passthrough {
                source: source.to_path_buf(),
            },
            FrontEnd::Manifest => BuildPlan::Bundle {
                manifest: source.to_path_buf(),
            },
            FrontEnd::TypeScript => {
                let scratch = tempfile::Builder::new()
                    .prefix("kiln-tsc")
                    .tempdir()
                    .map_err(|e| KilnError::io(std::env::temp_dir(), e))?;
                let artifact = scratch.path().join("out.js");
                let mut compile = Pipeline::new(self.typescript(source, &artifact));
                compile.resolve_tools()?;
                let mut optimize = optimizer.map(Pipeline::new);
                if let Some(p) = &mut optimize {
                    p.resolve_tools()?;
                }
                BuildPlan::Intermediate {
                    compile,
                    artifact,
                    optimize,
                    scratch,
                }
            }
            FrontEnd::Component | FrontEnd::Stylesheet | FrontEnd::Preprocessor => {
                let first = match recipe.front_end {
                    FrontEnd::Component => self.component(source),
                    FrontEnd::Stylesheet => self.stylesheet(source),
                    _ => self.preprocessor(source),
                };
                let mut pipeline = Pipeline::new(first);
                if let Some(opt) = optimizer {
                    pipeline = pipeline.then(opt);
                }
                pipeline.resolve_tools()?;
                BuildPlan::Stream(pipeline)
            }
        };
        Ok(plan)
    }

    // -----------------------------------------------------------------------
    // Stage command lines
    // -----------------------------------------------------------------------

    /// Runs in the source's directory with the bare file name, so generated
    /// output never embeds absolute paths.
    fn component(&self, source: &Path) -> CommandSpec {
        let mut cmd = CommandSpec::for_tool(&self.tools.component);
        // Relative search paths would be read against the changed cwd.
        for dir in &self.settings.component_includes {
            let dir = std::path::absolute(dir).unwrap_or_else(|_| dir.clone());
            cmd = cmd.arg("--add-search-path").arg(dir);
        }
        match self.settings.level {
            OptimizationLevel::None => {}
            OptimizationLevel::Basic => cmd = cmd.arg("--release"),
            OptimizationLevel::Advanced => {
                cmd = cmd
                    .arg("--release")
                    .arg("--optimize")
                    .arg("no-assert,no-log,inline,return-if");
            }
        }
        match (source.parent(), source.file_name()) {
            (Some(dir), Some(name)) if !dir.as_os_str().is_empty() => {
                cmd.current_dir(dir).arg(name)
            }
            _ => cmd.arg(source),
        }
    }

    fn typescript(&self, source: &Path, artifact: &Path) -> CommandSpec {
        CommandSpec::for_tool(&self.tools.typescript)
            .arg("--out")
            .arg(artifact)
            .arg(source)
    }

    fn stylesheet(&self, source: &Path) -> CommandSpec {
        let mut cmd = CommandSpec::for_tool(&self.tools.stylesheet);
        match self.settings.level {
            OptimizationLevel::None => {}
            OptimizationLevel::Basic => cmd = cmd.arg("--style").arg("compact"),
            OptimizationLevel::Advanced => cmd = cmd.arg("--style").arg("compressed"),
        }
        for dir in &self.settings.stylesheet_includes {
            cmd = cmd.arg("-I").arg(dir);
        }
        cmd.arg(source)
    }

    fn preprocessor(&self, source: &Path) -> CommandSpec {
        let mut cmd =
            CommandSpec::for_tool(&self.tools.preprocessor).args(&self.settings.preprocessor_flags);
        for dir in &self.settings.preprocessor_includes {
            let mut flag = std::ffi::OsString::from("-I");
            flag.push(dir);
            cmd = cmd.arg(flag);
        }
        cmd.arg(source)
    }

    /// Reads the script on stdin.
    fn optimizer(&self) -> CommandSpec {
        let level = match self.settings.level {
            OptimizationLevel::Advanced => "ADVANCED",
            _ => "SIMPLE",
        };
        let mut cmd = CommandSpec::for_tool(&self.tools.optimizer)
            .arg("--compilation_level")
            .arg(level);
        for externs in &self.settings.externs {
            cmd = cmd.arg("--externs").arg(externs);
        }
        cmd
    }
}
