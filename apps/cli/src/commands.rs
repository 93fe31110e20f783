//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Report, Result, eyre};
use filesmith_core::Filesmith;
use filesmith_core::pipeline::{BuildSummary, ProgressReporter};
use filesmith_shared::{ConfigDocument, find_config, init_config, load_config_from};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::plugins;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Filesmith: build a directory of files through a plugin pipeline.
#[derive(Parser)]
#[command(
    name = "filesmith",
    version,
    about = "Read a source tree, run it through plugins, write the result.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Configuration file (defaults to ./filesmith.json).
    #[arg(short, long, global = true, env = "FILESMITH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Defaults to `build`.
    #[command(subcommand)]
    pub command: Option<Command>,
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
    /// Build the site described by the configuration file.
    Build,

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
    /// Write a default filesmith.json in the current directory.
    Init,
    /// Show the configuration document that would be used.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so stdout
/// carries only command output.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "filesmith=info",
        1 => "filesmith=debug",
        _ => "filesmith=trace",
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
    let cwd = std::env::current_dir().map_err(|e| eyre!("cannot determine working directory: {e}"))?;
    let config = cli.config.as_deref();

    match cli.command.unwrap_or(Command::Build) {
        Command::Build => cmd_build(&cwd, config).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(&cwd),
            ConfigAction::Show => cmd_config_show(&cwd, config),
        },
    }
}

/// Render a failure as one line: the message followed by its causes.
pub(crate) fn render_failure(err: &Report) -> String {
    let message = format!("{err:#}");
    let flat = message.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("filesmith · {flat}")
}

async fn cmd_build(cwd: &Path, config: Option<&Path>) -> Result<()> {
    let reporter = CliProgress::new();
    let destination = build_site(cwd, config, &reporter).await?;
    println!("successfully built to {}", destination.display());
    Ok(())
}

/// Load the configuration, resolve plugins, and build. The configuration
/// file's directory becomes the working directory. Returns the resolved
/// destination.
pub(crate) async fn build_site(
    cwd: &Path,
    config: Option<&Path>,
    progress: &dyn ProgressReporter,
) -> Result<PathBuf> {
    let path = find_config(cwd, config)?;
    let doc = load_config_from(&path)?;
    let root = path.parent().unwrap_or(cwd);

    let mut smith = Filesmith::new(root)?;
    smith.configure(&doc)?;
    for spec in doc.plugins()? {
        let plugin = plugins::resolve(&spec, root)?;
        smith.use_plugin(plugin);
    }

    info!(
        config = %path.display(),
        plugins = smith.plugins().len(),
        "building"
    );
    smith.build_with(progress).await?;
    Ok(smith.destination())
}

fn cmd_config_init(cwd: &Path) -> Result<()> {
    let path = init_config(cwd)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(cwd: &Path, config: Option<&Path>) -> Result<()> {
    let path = find_config(cwd, config)?;
    let doc: ConfigDocument = load_config_from(&path)?;
    let is_toml = path.extension().is_some_and(|ext| ext == "toml");
    let rendered = if is_toml {
        toml::to_string_pretty(&doc)?
    } else {
        serde_json::to_string_pretty(&doc)?
    };
    println!("{rendered}");
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
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn plugin_started(&self, name: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Running plugins [{current}/{total}] {name}"));
    }

    fn done(&self, _summary: &BuildSummary) {
        self.spinner.finish_and_clear();
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        // A failed build never reaches `done`.
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}
