//! Chains of external processes joined by anonymous pipes.
//!
//! Stage `i`'s stdout feeds stage `i + 1`'s stdin; the caller sees only the
//! first stage's input and the last stage's output. Every stderr goes to the
//! parent's stderr.
//!
//! Pipe ends are owned values: the read end handed to a child lives inside
//! the `std::process::Command` that spawns it and is closed when that
//! command is dropped, right after the spawn. Children are reaped either by
//! [`RunningPipeline::wait`] or, on any early exit, by its `Drop`.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Stdio};
use std::thread::JoinHandle;

use tracing::{debug, warn};

use kiln_shared::{KilnError, Result};

use crate::command::CommandSpec;
use crate::tool;

/// What stage 0 reads from.
#[derive(Debug, Clone, Default)]
pub enum PipelineInput {
    /// Stdin is connected to the null device.
    #[default]
    Null,
    /// Bytes written to stdin from a helper thread.
    Bytes(Vec<u8>),
    /// Stdin is the given file.
    File(PathBuf),
}

/// An ordered, non-empty list of stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<CommandSpec>,
}

impl Pipeline {
    pub fn new(first: CommandSpec) -> Self {
        Self {
            stages: vec![first],
        }
    }

    /// Append a stage reading the previous stage's output.
    pub fn then(mut self, next: CommandSpec) -> Self {
        self.stages.push(next);
        self
    }

    pub fn stages(&self) -> &[CommandSpec] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Locate every stage's executable without starting anything, and pin
    /// each stage to the absolute path found. A stage with its own working
    /// directory then runs the same file the lookup saw.
    pub fn resolve_tools(&mut self) -> Result<()> {
        for stage in &mut self.stages {
            let Some(found) = tool::locate(stage.program()) else {
                return Err(KilnError::ToolNotFound {
                    tool: stage.name(),
                    path: stage.program().to_path_buf(),
                });
            };
            stage.set_program(found);
        }
        Ok(())
    }

    /// Start every stage. The returned handle must be drained and waited.
    pub fn spawn(&self, input: PipelineInput) -> Result<RunningPipeline> {
        let mut running = RunningPipeline {
            stages: Vec::with_capacity(self.stages.len()),
            output: None,
            feeder: None,
        };

        let mut upstream: Option<ChildStdout> = None;
        let mut input = Some(input);

        for (index, spec) in self.stages.iter().enumerate() {
            let mut feed = None;
            let stdin = match upstream.take() {
                Some(out) => Stdio::from(out),
                None => match input.take().unwrap_or_default() {
                    PipelineInput::Null => Stdio::null(),
                    PipelineInput::Bytes(bytes) => {
                        feed = Some(bytes);
                        Stdio::piped()
                    }
                    PipelineInput::File(path) => {
                        // `running` is empty here; nothing to unwind.
                        let file = File::open(&path).map_err(|e| KilnError::io(&path, e))?;
                        Stdio::from(file)
                    }
                },
            };

            debug!(stage = index, command = %spec, "starting stage");

            // The command (and the upstream read end it owns) is dropped at
            // the end of this statement, so only the child holds that end.
            let spawned = {
                let mut cmd = spec.to_command();
                cmd.stdin(stdin)
                    .stdout(Stdio::piped())
                    .stderr(Stdio::inherit());
                cmd.spawn()
            };

            let mut child = match spawned {
                Ok(child) => child,
                Err(source) => {
                    warn!(stage = index, program = %spec.name(), error = %source, "stage failed to start");
                    running.abort();
                    return Err(KilnError::Spawn {
                        stage: index,
                        program: spec.name(),
                        source,
                    });
                }
            };

            if let (Some(bytes), Some(mut stdin)) = (feed, child.stdin.take()) {
                running.feeder = Some(std::thread::spawn(move || {
                    match stdin.write_all(&bytes) {
                        // The stage stopped reading early; its exit status decides.
                        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                        other => other,
                    }
                }));
            }

            upstream = child.stdout.take();
            running.stages.push(Stage {
                index,
                program: spec.name(),
                child,
            });
        }

        running.output = upstream;
        Ok(running)
    }

    /// Spawn, copy the final output into `w`, then wait for every stage.
    /// Returns the number of bytes copied.
    pub fn run_into(&self, input: PipelineInput, w: &mut dyn Write) -> Result<u64> {
        let mut running = self.spawn(input)?;
        let copied = running.drain_into(w);
        let waited = running.wait();
        let n = copied?;
        waited?;
        Ok(n)
    }
}

struct Stage {
    index: usize,
    program: String,
    child: Child,
}

/// A started pipeline: the final output stream plus the processes to reap.
pub struct RunningPipeline {
    stages: Vec<Stage>,
    output: Option<ChildStdout>,
    feeder: Option<JoinHandle<io::Result<()>>>,
}

impl RunningPipeline {
    /// Take the last stage's stdout to read it directly. It must be read to
    /// the end (or dropped) before [`Self::wait`] can return.
    pub fn take_output(&mut self) -> Option<ChildStdout> {
        self.output.take()
    }

    /// Copy the whole output stream into `w`.
    pub fn drain_into(&mut self, w: &mut dyn Write) -> Result<u64> {
        match self.output.as_mut() {
            Some(out) => io::copy(out, w).map_err(KilnError::PipeIo),
            None => Ok(0),
        }
    }

    /// Wait for every stage. All stages are reaped even when one fails; the
    /// first failing stage is the one reported.
    pub fn wait(mut self) -> Result<()> {
        // Closing our read end unblocks a producer nobody is draining.
        drop(self.output.take());

        let mut first_failure: Option<KilnError> = None;
        for mut stage in std::mem::take(&mut self.stages) {
            let result = match stage.child.wait() {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => Err(KilnError::StageFailed {
                    stage: stage.index,
                    program: stage.program.clone(),
                    status,
                }),
                Err(e) => Err(KilnError::PipeIo(e)),
            };
            if let Err(e) = result {
                warn!(stage = stage.index, program = %stage.program, error = %e, "stage failed");
                first_failure.get_or_insert(e);
            }
        }

        if let Some(feeder) = self.feeder.take() {
            match feeder.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_failure.get_or_insert(KilnError::PipeIo(e));
                }
                Err(_) => {
                    first_failure.get_or_insert(KilnError::PipeIo(io::Error::other(
                        "stdin feeder thread panicked",
                    )));
                }
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => {
                debug!("pipeline finished");
                Ok(())
            }
        }
    }

    /// Terminate and reap every started stage.
    fn abort(&mut self) {
        drop(self.output.take());
        for mut stage in std::mem::take(&mut self.stages) {
            let _ = stage.child.kill();
            let _ = stage.child.wait();
        }
        if let Some(feeder) = self.feeder.take() {
            let _ = feeder.join();
        }
    }
}

impl Drop for RunningPipeline {
    fn drop(&mut self) {
        if !self.stages.is_empty() {
            self.abort();
        }
    }
}
