//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use kiln_core::{BuildProgress, BuildReport, Content};
use kiln_shared::{
    AppConfig, BuildSettings, OptimizationLevel, SourceKind, Toolchain, init_config, load_config,
};

use crate::server::{self, ServerOptions};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Kiln — compile front-end assets on demand or ahead of time.
#[derive(Parser)]
#[command(
    name = "kiln",
    version,
    about = "Serve and export front-end assets compiled by external toolchains.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Serve content roots over HTTP, compiling sources per request.
    Serve {
        /// Content roots, highest precedence first (defaults to config).
        roots: Vec<PathBuf>,

        /// Listen address (defaults to config).
        #[arg(long)]
        addr: Option<String>,

        /// URL prefix to mount the roots at.
        #[arg(long)]
        prefix: Option<String>,

        /// Optimization level: none, basic or advanced.
        #[arg(short, long)]
        level: Option<OptimizationLevel>,

        /// Export every root here before serving, and serve the export first.
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Compile every source under the given directories.
    Build {
        /// Source directories.
        #[arg(required = true)]
        dirs: Vec<PathBuf>,

        /// Output directory (defaults to building in place).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Optimization level: none, basic or advanced.
        #[arg(short, long)]
        level: Option<OptimizationLevel>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "kiln=info",
        1 => "kiln=debug",
        _ => "kiln=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Serve {
            roots,
            addr,
            prefix,
            level,
            export,
        } => cmd_serve(roots, addr, prefix, level, export).await,
        Command::Build { dirs, out, level } => cmd_build(dirs, out, level).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Build settings from config, with the CLI level taking precedence.
fn build_settings(config: &AppConfig, level: Option<OptimizationLevel>) -> BuildSettings {
    let settings = BuildSettings::from(config);
    match level {
        Some(level) => settings.at_level(level),
        None => settings,
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| eyre!("cannot resolve {}: {e}", path.display()))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_serve(
    roots: Vec<PathBuf>,
    addr: Option<String>,
    prefix: Option<String>,
    level: Option<OptimizationLevel>,
    export: Option<PathBuf>,
) -> Result<()> {
    let config = load_config()?;
    let settings = build_settings(&config, level);
    let tools = Toolchain::from(&config);

    let roots = if roots.is_empty() {
        config.server.roots.iter().map(PathBuf::from).collect()
    } else {
        roots
    };
    let roots = roots
        .iter()
        .map(|r| absolute(r))
        .collect::<Result<Vec<_>>>()?;

    let mut options = ServerOptions::from_config(&config.server)?;
    if let Some(prefix) = prefix {
        options.prefix = prefix;
    }
    let addr = addr.unwrap_or_else(|| config.server.addr.clone());

    info!(
        roots = ?roots,
        level = %settings.level,
        prefix = %options.prefix,
        "starting content server"
    );
    let content = Arc::new(Content::new(roots, settings, tools));

    let rebuild = match export {
        Some(dest) => {
            let dest = absolute(&dest)?;
            let content = Arc::clone(&content);
            let (report, rebuild) = tokio::task::spawn_blocking(move || {
                let progress = CliProgress::new();
                content.productionize(dest, &progress)
            })
            .await??;
            print_report(&report, rebuild.destination());
            Some(rebuild)
        }
        None => None,
    };

    let app = server::router(content, rebuild, &options);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| eyre!("cannot listen on {addr}: {e}"))?;
    info!(addr = %addr, "listening");
    println!("Serving on http://{addr}{}", options.prefix);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn cmd_build(
    dirs: Vec<PathBuf>,
    out: Option<PathBuf>,
    level: Option<OptimizationLevel>,
) -> Result<()> {
    let config = load_config()?;
    let settings = build_settings(&config, level);
    let tools = Toolchain::from(&config);

    for dir in dirs {
        let dir = absolute(&dir)?;
        if !dir.is_dir() {
            return Err(eyre!("not a directory: {}", dir.display()));
        }
        let dest = match &out {
            Some(out) => absolute(out)?,
            None => dir.clone(),
        };

        info!(dir = %dir.display(), dest = %dest.display(), level = %settings.level, "building");
        let content = Arc::new(Content::new(vec![dir], settings.clone(), tools.clone()));
        let (report, rebuild) = tokio::task::spawn_blocking(move || {
            let progress = CliProgress::new();
            content.productionize(dest, &progress)
        })
        .await??;
        print_report(&report, rebuild.destination());
    }
    Ok(())
}

fn print_report(report: &BuildReport, dest: &Path) {
    println!();
    println!("  Export complete: {}", dest.display());
    println!("  Compiled: {}", report.compiled);
    println!("  Copied:   {}", report.copied);
    println!("  Skipped:  {}", report.skipped);
    println!("  Time:     {:.2}s", report.elapsed.as_secs_f64());
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl BuildProgress for CliProgress {
    fn root(&self, root: &Path) {
        self.spinner.set_message(format!("Exporting {}", root.display()));
    }

    fn file(&self, source: &Path, _output: &Path, kind: SourceKind) {
        let name = source.file_name().unwrap_or(source.as_os_str());
        self.spinner
            .set_message(format!("[{kind}] {}", name.to_string_lossy()));
    }

    fn done(&self, _report: &BuildReport) {
        self.spinner.finish_and_clear();
    }
}
