//! Runs a build plan: pipeline output first, then the source's directives.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::{debug, instrument};

use kiln_directives::expand_directives;
use kiln_process::PipelineInput;
use kiln_shared::{BuildSettings, KilnError, Result, SourceKind, Toolchain};

use crate::bundle;
use crate::recipe::{BuildPlan, PipelineBuilder};

/// Compiles single sources with a fixed toolchain and settings.
#[derive(Debug, Clone, Copy)]
pub struct Compiler<'a> {
    tools: &'a Toolchain,
    settings: &'a BuildSettings,
}

impl<'a> Compiler<'a> {
    pub fn new(tools: &'a Toolchain, settings: &'a BuildSettings) -> Self {
        Self { tools, settings }
    }

    pub fn tools(&self) -> &'a Toolchain {
        self.tools
    }

    pub fn settings(&self) -> &'a BuildSettings {
        self.settings
    }

    /// Write the compiled form of `source` into `w`. Returns bytes written.
    #[instrument(skip_all, fields(kind = %kind, source = %source.display(), level = %self.settings.level))]
    pub fn compile(&self, kind: SourceKind, source: &Path, w: &mut dyn Write) -> Result<u64> {
        let plan = PipelineBuilder::new(self.tools, self.settings).plan(kind, source)?;

        let compiled = match plan {
            BuildPlan::Passthrough { source } => return copy_file(&source, w),
            BuildPlan::Bundle { manifest } => return bundle::compile_bundle(&manifest, self, w),
            BuildPlan::Stream(pipeline) => pipeline.run_into(PipelineInput::Null, w)?,
            BuildPlan::Intermediate {
                compile,
                artifact,
                optimize,
                scratch: _scratch,
            } => {
                // Anything the compiler prints is diagnostics, not output.
                compile.run_into(PipelineInput::Null, &mut io::stderr())?;
                match optimize {
                    Some(pipeline) => pipeline.run_into(PipelineInput::File(artifact), w)?,
                    None => copy_file(&artifact, w)?,
                }
            }
        };

        let expanded = expand_directives(source, w)?;
        debug!(compiled, expanded, "compiled");
        Ok(compiled + expanded)
    }

    /// Compile `source` into a newly created file at `dest`, creating parent
    /// directories as needed. A failed compile leaves the partial file.
    pub fn compile_to_file(&self, kind: SourceKind, source: &Path, dest: &Path) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| KilnError::io(parent, e))?;
        }
        let file = File::create(dest).map_err(|e| KilnError::io(dest, e))?;
        let mut w = BufWriter::new(file);
        let n = self.compile(kind, source, &mut w)?;
        w.flush().map_err(|e| KilnError::io(dest, e))?;
        Ok(n)
    }
}

pub(crate) fn copy_file(path: &Path, w: &mut dyn Write) -> Result<u64> {
    let mut file = File::open(path).map_err(|e| KilnError::io(path, e))?;
    io::copy(&mut file, w).map_err(|e| KilnError::io(path, e))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testing::{fake_tools, write};
    use kiln_shared::OptimizationLevel;

    fn compile(
        tools: &Toolchain,
        level: OptimizationLevel,
        kind: SourceKind,
        source: &Path,
    ) -> Result<String> {
        let settings = BuildSettings {
            level,
            ..BuildSettings::default()
        };
        let mut out = Vec::new();
        Compiler::new(tools, &settings).compile(kind, source, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn component_at_none_is_compiler_output_only() {
        let fake = fake_tools();
        let src = write(fake.dir.path(), "site/app.main.jsx", "class App {}\n");

        let out = compile(&fake.tools, OptimizationLevel::None, SourceKind::Component, &src).unwrap();
        assert_eq!(out, "/* jsx app.main.jsx */\nclass App {}\n");
    }

    #[test]
    fn optimizer_follows_front_end_above_none() {
        let fake = fake_tools();
        let src = write(fake.dir.path(), "app.main.js", "var a;\n");

        let out = compile(
            &fake.tools,
            OptimizationLevel::Advanced,
            SourceKind::PreprocessedScript,
            &src,
        )
        .unwrap();
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("/* opt --compilation_level ADVANCED */"));
        assert!(lines.next().unwrap().starts_with("/* cpp "));
    }

    #[test]
    fn every_kind_produces_output_at_every_level() {
        let fake = fake_tools();
        let dir = fake.dir.path();
        let sources = [
            (SourceKind::Component, write(dir, "a.main.jsx", "class A {}\n")),
            (SourceKind::TypedSuperset, write(dir, "b.main.ts", "let b = 1;\n")),
            (SourceKind::Stylesheet, write(dir, "c.main.scss", "c { }\n")),
            (SourceKind::PreprocessedScript, write(dir, "d.main.js", "var d;\n")),
        ];

        for level in OptimizationLevel::ALL {
            for (kind, src) in &sources {
                let out = compile(&fake.tools, level, *kind, src).unwrap();
                assert!(!out.is_empty(), "{kind} at {level}");
            }
        }
    }

    #[test]
    fn typescript_output_comes_from_artifact() {
        let fake = fake_tools();
        let src = write(fake.dir.path(), "b.main.ts", "let b = 1;\n");

        let out = compile(&fake.tools, OptimizationLevel::None, SourceKind::TypedSuperset, &src)
            .unwrap();
        assert_eq!(out, "/* tsc */\nlet b = 1;\n");

        let out = compile(&fake.tools, OptimizationLevel::Basic, SourceKind::TypedSuperset, &src)
            .unwrap();
        assert_eq!(out, "/* opt --compilation_level SIMPLE */\n/* tsc */\nlet b = 1;\n");
    }

    #[test]
    fn directives_follow_compiled_output_at_every_level() {
        let fake = fake_tools();
        let dir = fake.dir.path();
        write(dir, "a.txt", "INCLUDED-A\n");
        let src = write(
            dir,
            "app.main.js",
            "//@include(\"a.txt\")\n//@include(\"a.txt\")\nvar x = 1;\n",
        );

        for level in OptimizationLevel::ALL {
            let out = compile(&fake.tools, level, SourceKind::PreprocessedScript, &src).unwrap();
            assert!(out.contains("var x = 1;"), "{level}");
            assert!(out.ends_with("INCLUDED-A\nINCLUDED-A\n"), "{level}: {out}");
        }
    }

    #[test]
    fn failing_stage_is_reported() {
        let mut fake = fake_tools();
        fake.tools.stylesheet = fake.failing("stylesheet compiler");
        let src = write(fake.dir.path(), "c.main.scss", "c { }\n");

        let err = compile(&fake.tools, OptimizationLevel::None, SourceKind::Stylesheet, &src)
            .unwrap_err();
        assert!(matches!(err, KilnError::StageFailed { stage: 0, .. }));
    }

    #[test]
    fn passthrough_copies_bytes() {
        let fake = fake_tools();
        let src = write(fake.dir.path(), "logo.svg", "<svg/>");
        let out = compile(&fake.tools, OptimizationLevel::Advanced, SourceKind::Passthrough, &src)
            .unwrap();
        assert_eq!(out, "<svg/>");
    }

    #[test]
    fn compile_to_file_creates_parents() {
        let fake = fake_tools();
        let src = write(fake.dir.path(), "src/c.main.scss", "c { }\n");
        let dest = fake.dir.path().join("out/css/c.css");
        let settings = BuildSettings::default();

        Compiler::new(&fake.tools, &settings)
            .compile_to_file(SourceKind::Stylesheet, &src, &dest)
            .unwrap();
        let written = std::fs::read_to_string(&dest).unwrap();
        assert!(written.starts_with("/* sass "));
    }
}
