//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use nsxconv_archive::discover_archives;
use nsxconv_core::{ExportContext, ProgressReporter, RunReport, export_archives};
use nsxconv_geocode::{NominatimGeocoder, ReverseGeocoder};
use nsxconv_markup::converter_for;
use nsxconv_shared::{
    AppConfig, ConvertError, ExportConfig, MarkupFormat, init_config, load_config,
    load_config_from,
};

/// Exit code when no archives were found.
const EXIT_NO_ARCHIVES: u8 = 2;
/// Exit code when the markup converter cannot be run.
const EXIT_CONVERTER_MISSING: u8 = 3;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// nsxconv: convert note-station exports into plain-text notes.
#[derive(Parser)]
#[command(
    name = "nsxconv",
    version,
    about = "Convert .nsx note exports into Org or Markdown files.",
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

/// Document format selectable on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum Target {
    Org,
    Markdown,
}

impl From<Target> for MarkupFormat {
    fn from(target: Target) -> Self {
        match target {
            Target::Org => MarkupFormat::Org,
            Target::Markdown => MarkupFormat::Markdown,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Convert archives into a directory of notes.
    Convert(ConvertArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct ConvertArgs {
    /// Archives (or directories of archives) to convert. Defaults to every
    /// `.nsx` file in the working directory.
    pub archives: Vec<PathBuf>,

    /// Output directory (overrides `output.dir`).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file to use instead of ~/.nsxconv/nsxconv.toml.
    #[arg(long, env = "NSXCONV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Target markup (overrides `output.target`).
    #[arg(long)]
    pub target: Option<Target>,

    /// Skip reverse geocoding of note coordinates.
    #[arg(long)]
    pub no_geocode: bool,

    /// Write notes without the metadata header.
    #[arg(long)]
    pub no_header: bool,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show {
        /// Config file to show instead of the default one.
        #[arg(long, env = "NSXCONV_CONFIG")]
        config: Option<PathBuf>,
    },
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "nsxconv=info",
        1 => "nsxconv=debug",
        _ => "nsxconv=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

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
pub(crate) async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Convert(args) => cmd_convert(args).await,
        Command::Config { action } => {
            match action {
                ConfigAction::Init => cmd_config_init()?,
                ConfigAction::Show { config } => cmd_config_show(config.as_deref())?,
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Exit code for errors that end the run with a dedicated status.
fn fatal_exit_code(err: &ConvertError) -> Option<u8> {
    match err {
        ConvertError::NoArchives { .. } => Some(EXIT_NO_ARCHIVES),
        ConvertError::ConverterMissing { .. } => Some(EXIT_CONVERTER_MISSING),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// convert
// ---------------------------------------------------------------------------

async fn cmd_convert(args: ConvertArgs) -> Result<ExitCode> {
    match convert(&args).await {
        Ok(reports) => {
            print_reports(&reports);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => match fatal_exit_code(&e) {
            Some(code) => {
                eprintln!("error: {e}");
                if matches!(e, ConvertError::ConverterMissing { .. }) {
                    eprintln!(
                        "Install pandoc, point `converter.program` at it, or use the builtin engine for markdown."
                    );
                }
                Ok(ExitCode::from(code))
            }
            None => Err(e.into()),
        },
    }
}

async fn convert(args: &ConvertArgs) -> std::result::Result<Vec<RunReport>, ConvertError> {
    let mut app = match &args.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    apply_overrides(&mut app, args);

    let archives = resolve_archives(&args.archives)?;
    info!(archives = archives.len(), "starting conversion");

    let converter = converter_for(&app.converter, app.output.target).await?;

    let geocoder = if app.geocoding.enabled {
        Some(NominatimGeocoder::new(&app.geocoding)?)
    } else {
        None
    };

    let config = ExportConfig::from(&app);
    let dest_root = PathBuf::from(&app.output.dir);
    let reporter = CliProgress::new();

    let ctx = ExportContext {
        config: &config,
        converter: converter.as_ref(),
        geocoder: geocoder.as_ref().map(|g| g as &dyn ReverseGeocoder),
        progress: &reporter,
    };

    let result = export_archives(&archives, &dest_root, &ctx).await;
    reporter.finish();
    result
}

/// Fold CLI flags into the loaded config.
fn apply_overrides(app: &mut AppConfig, args: &ConvertArgs) {
    if let Some(output) = &args.output {
        app.output.dir = output.to_string_lossy().into_owned();
    }
    if let Some(target) = args.target {
        app.output.target = target.into();
    }
    if args.no_geocode {
        app.geocoding.enabled = false;
    }
    if args.no_header {
        app.metadata.header = false;
    }
}

/// Explicit archive paths, with directories expanded; the working directory
/// when none are given.
fn resolve_archives(paths: &[PathBuf]) -> std::result::Result<Vec<PathBuf>, ConvertError> {
    if paths.is_empty() {
        return discover_archives(Path::new("."));
    }

    let mut archives = Vec::new();
    for path in paths {
        if path.is_dir() {
            archives.extend(discover_archives(path)?);
        } else {
            archives.push(path.clone());
        }
    }
    Ok(archives)
}

fn print_reports(reports: &[RunReport]) {
    for report in reports {
        let name = report
            .archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| report.archive.display().to_string());

        println!();
        println!("  {name}");
        println!("{report}");
    }
    println!();
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

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn archive_started(&self, path: &Path, notes: usize) {
        self.spinner.set_message(format!(
            "Extracting {notes} notes from {}",
            path.display()
        ));
    }

    fn note_finished(&self, title: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Converting [{current}/{total}] {title}"));
    }

    fn archive_finished(&self, report: &RunReport) {
        self.spinner.set_message(report.summary_line());
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config: AppConfig = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
