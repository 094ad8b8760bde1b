//! Core build logic for Kiln.
//!
//! This crate ties together resolution, build recipes, the process pipeline
//! executor and directive expansion into the two entry points of the content
//! surface: serving a request on demand and productionizing a whole tree.

pub mod bundle;
pub mod compile;
pub mod content;
pub mod productionize;
pub mod recipe;
pub mod resolver;

pub use compile::Compiler;
pub use content::{BufferedResponse, Content, ResponseSink, ServeOutcome, ServeRequest};
pub use productionize::{BuildProgress, BuildReport, Rebuild, SilentProgress};

#[cfg(all(test, unix))]
pub(crate) mod testing {
    //! Stand-in tools: small `sh` scripts that tag their output with their
    //! own name and arguments, then echo the source.

    use std::path::{Path, PathBuf};

    use kiln_shared::{Tool, Toolchain};
    use tempfile::TempDir;

    /// Echoes `/* <name> <args> */` then the last argument's contents.
    const FRONT_END: &str = r#"for last in "$@"; do :; done
echo "/* $TOOL $* */"
cat "$last"
"#;

    /// `--out <artifact> <source>`
    const TSC: &str = r#"{ echo "/* tsc */"; cat "$3"; } > "$2"
"#;

    /// Tags stdin with its flags.
    const OPTIMIZER: &str = r#"echo "/* opt $* */"
cat
"#;

    const FAIL: &str = "exit 1\n";

    pub struct FakeTools {
        pub dir: TempDir,
        pub tools: Toolchain,
    }

    impl FakeTools {
        /// A tool that exits non-zero without output.
        pub fn failing(&self, name: &'static str) -> Tool {
            script_tool(self.dir.path(), name, "fail.sh", FAIL)
        }
    }

    /// Tools are run as `/bin/sh <script> ...`, so nothing is exec'd from
    /// the scratch dir.
    fn script_tool(dir: &Path, name: &'static str, file: &str, body: &str) -> Tool {
        let path = dir.join(file);
        std::fs::write(&path, body).unwrap();
        let mut tool = Tool::new(name, "/bin/sh");
        tool.args = vec![path.to_string_lossy().into_owned()];
        tool
    }

    fn front_end(dir: &Path, name: &'static str, tag: &str) -> Tool {
        let body = format!("TOOL={tag}\n{FRONT_END}");
        script_tool(dir, name, &format!("{tag}.sh"), &body)
    }

    pub fn fake_tools() -> FakeTools {
        let dir = tempfile::tempdir().unwrap();
        let tools = Toolchain {
            component: front_end(dir.path(), "component compiler", "jsx"),
            typescript: script_tool(dir.path(), "typescript compiler", "tsc.sh", TSC),
            stylesheet: front_end(dir.path(), "stylesheet compiler", "sass"),
            preprocessor: front_end(dir.path(), "preprocessor", "cpp"),
            optimizer: script_tool(dir.path(), "optimizer", "opt.sh", OPTIMIZER),
        };
        FakeTools { dir, tools }
    }

    /// Write `content` at `dir/rel`, creating parents.
    pub fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }
}
