//! External process pipelines for Kiln.
//!
//! This crate provides:
//! - [`CommandSpec`] — an immutable argv/cwd/env description of one stage
//! - [`Pipeline`] — stages chained stdout → stdin, spawned as one unit
//! - [`RunningPipeline`] — the output stream plus the handle that reaps every stage
//! - [`tool::locate`] — executable lookup used to fail before spawning

pub mod command;
pub mod pipeline;
pub mod tool;

pub use command::CommandSpec;
pub use pipeline::{Pipeline, PipelineInput, RunningPipeline};
