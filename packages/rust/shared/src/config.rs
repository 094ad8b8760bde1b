//! Application configuration for Kiln.
//!
//! User config lives at `~/.kiln/kiln.toml`.
//! CLI flags override config file values, which override defaults.
//! Tool paths can additionally be overridden from the environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{KilnError, Result};
use crate::types::OptimizationLevel;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "kiln.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".kiln";

/// Environment variables that override tool paths.
pub const ENV_COMPONENT: &str = "KILN_JSX";
pub const ENV_TYPESCRIPT: &str = "KILN_TSC";
pub const ENV_STYLESHEET: &str = "KILN_SASS";
pub const ENV_PREPROCESSOR: &str = "KILN_CPP";
pub const ENV_OPTIMIZER: &str = "KILN_OPTIMIZER";

// ---------------------------------------------------------------------------
// Config structs (matching kiln.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// External tool locations.
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Compilation defaults.
    #[serde(default)]
    pub build: BuildConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
}

/// One external tool: executable plus leading arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Executable name (looked up on `PATH`) or path.
    pub path: String,

    /// Arguments placed before any generated ones, e.g. `["-jar", "compiler.jar"]`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl ToolConfig {
    fn named(path: &str) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
        }
    }
}

/// `[tools]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_component")]
    pub component: ToolConfig,

    #[serde(default = "default_typescript")]
    pub typescript: ToolConfig,

    #[serde(default = "default_stylesheet")]
    pub stylesheet: ToolConfig,

    #[serde(default = "default_preprocessor")]
    pub preprocessor: ToolConfig,

    #[serde(default = "default_optimizer")]
    pub optimizer: ToolConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            component: default_component(),
            typescript: default_typescript(),
            stylesheet: default_stylesheet(),
            preprocessor: default_preprocessor(),
            optimizer: default_optimizer(),
        }
    }
}

fn default_component() -> ToolConfig {
    ToolConfig::named("jsx")
}
fn default_typescript() -> ToolConfig {
    ToolConfig::named("tsc")
}
fn default_stylesheet() -> ToolConfig {
    ToolConfig::named("sass")
}
fn default_preprocessor() -> ToolConfig {
    ToolConfig::named("cpp")
}
fn default_optimizer() -> ToolConfig {
    ToolConfig::named("closure-compiler")
}

/// `[build]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Global optimization level.
    #[serde(default)]
    pub level: OptimizationLevel,

    /// Search paths handed to the component compiler.
    #[serde(default)]
    pub component_includes: Vec<String>,

    /// `-I` directories for the macro preprocessor.
    #[serde(default)]
    pub preprocessor_includes: Vec<String>,

    /// `-I` directories for the stylesheet compiler.
    #[serde(default)]
    pub stylesheet_includes: Vec<String>,

    /// Extern declaration files for the optimizer.
    #[serde(default)]
    pub externs: Vec<String>,

    /// Flags always passed to the preprocessor ahead of `-I` paths.
    #[serde(default = "default_preprocessor_flags")]
    pub preprocessor_flags: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            level: OptimizationLevel::None,
            component_includes: Vec::new(),
            preprocessor_includes: Vec::new(),
            stylesheet_includes: Vec::new(),
            externs: Vec::new(),
            preprocessor_flags: default_preprocessor_flags(),
        }
    }
}

fn default_preprocessor_flags() -> Vec<String> {
    vec!["-P".into(), "-CC".into()]
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address.
    #[serde(default = "default_addr")]
    pub addr: String,

    /// URL prefix the content is mounted at.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Content roots, highest precedence first.
    #[serde(default = "default_roots")]
    pub roots: Vec<String>,

    /// Headers added to every response.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// HTML file served with status 404 instead of a plain body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_found_page: Option<String>,

    /// Gzip responses for clients that accept it.
    #[serde(default = "default_true")]
    pub gzip: bool,

    /// Path that triggers a re-export when serving with `--export`.
    #[serde(default = "default_rebuild_path")]
    pub rebuild_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            prefix: default_prefix(),
            roots: default_roots(),
            headers: BTreeMap::new(),
            not_found_page: None,
            gzip: true,
            rebuild_path: default_rebuild_path(),
        }
    }
}

fn default_addr() -> String {
    "127.0.0.1:8082".into()
}
fn default_prefix() -> String {
    "/".into()
}
fn default_roots() -> Vec<String> {
    vec![".".into()]
}
fn default_true() -> bool {
    true
}
fn default_rebuild_path() -> String {
    "/_kiln/rebuild".into()
}

// ---------------------------------------------------------------------------
// Runtime config (merged from config + env + CLI flags)
// ---------------------------------------------------------------------------

/// A resolved external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tool {
    /// Human-readable role, used in logs and errors.
    pub name: &'static str,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Tool {
    pub fn new(name: &'static str, program: impl Into<PathBuf>) -> Self {
        Self {
            name,
            program: program.into(),
            args: Vec::new(),
        }
    }

    fn from_config(name: &'static str, config: &ToolConfig) -> Self {
        Self {
            name,
            program: PathBuf::from(&config.path),
            args: config.args.clone(),
        }
    }
}

/// The set of external tools the build recipes invoke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub component: Tool,
    pub typescript: Tool,
    pub stylesheet: Tool,
    pub preprocessor: Tool,
    pub optimizer: Tool,
}

impl From<&AppConfig> for Toolchain {
    fn from(config: &AppConfig) -> Self {
        let t = &config.tools;
        Self {
            component: Tool::from_config("component compiler", &t.component),
            typescript: Tool::from_config("typescript compiler", &t.typescript),
            stylesheet: Tool::from_config("stylesheet compiler", &t.stylesheet),
            preprocessor: Tool::from_config("preprocessor", &t.preprocessor),
            optimizer: Tool::from_config("optimizer", &t.optimizer),
        }
    }
}

/// Per-compilation settings: level plus include and extern lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSettings {
    pub level: OptimizationLevel,
    pub component_includes: Vec<PathBuf>,
    pub preprocessor_includes: Vec<PathBuf>,
    pub stylesheet_includes: Vec<PathBuf>,
    pub externs: Vec<PathBuf>,
    pub preprocessor_flags: Vec<String>,
}

impl BuildSettings {
    /// Copy of these settings at another level.
    pub fn at_level(&self, level: OptimizationLevel) -> Self {
        Self {
            level,
            ..self.clone()
        }
    }
}

impl From<&AppConfig> for BuildSettings {
    fn from(config: &AppConfig) -> Self {
        let b = &config.build;
        let paths = |v: &[String]| v.iter().map(PathBuf::from).collect::<Vec<_>>();
        Self {
            level: b.level,
            component_includes: paths(&b.component_includes),
            preprocessor_includes: paths(&b.preprocessor_includes),
            stylesheet_includes: paths(&b.stylesheet_includes),
            externs: paths(&b.externs),
            preprocessor_flags: b.preprocessor_flags.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.kiln/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| KilnError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.kiln/kiln.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk, then apply environment overrides.
/// Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    let mut config = if path.exists() {
        load_config_from(&path)?
    } else {
        tracing::debug!(?path, "config file not found, using defaults");
        AppConfig::default()
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| KilnError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| KilnError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Replace tool paths with values found by `lookup` (normally the process
/// environment). Empty values are ignored.
pub fn apply_env_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    let tools = &mut config.tools;
    let slots: [(&str, &mut ToolConfig); 5] = [
        (ENV_COMPONENT, &mut tools.component),
        (ENV_TYPESCRIPT, &mut tools.typescript),
        (ENV_STYLESHEET, &mut tools.stylesheet),
        (ENV_PREPROCESSOR, &mut tools.preprocessor),
        (ENV_OPTIMIZER, &mut tools.optimizer),
    ];
    for (var, tool) in slots {
        if let Some(value) = lookup(var).filter(|v| !v.is_empty()) {
            tracing::debug!(var, path = %value, "tool path overridden from environment");
            tool.path = value;
        }
    }
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| KilnError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| KilnError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| KilnError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
