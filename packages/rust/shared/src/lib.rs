//! Shared types, error model, and configuration for Kiln.
//!
//! This crate is the foundation depended on by all other Kiln crates.
//! It provides:
//! - [`KilnError`] — the unified error type
//! - Domain types ([`OptimizationLevel`], [`SourceKind`], [`Destination`])
//! - Configuration ([`AppConfig`], [`Toolchain`], [`BuildSettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BuildConfig, BuildSettings, ServerConfig, Tool, ToolConfig, Toolchain, ToolsConfig,
    apply_env_overrides, config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{ErrorClass, KilnError, Result};
pub use types::{
    Destination, FRAGMENT_SUFFIXES, OptimizationLevel, SOURCE_SUFFIXES, SourceKind,
};
