//! Command-line interface for rain-rtti.

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::ast::CppProvider;
use crate::cache;
use crate::config::Config;
use crate::pipeline::{RunReport, Runner};
use crate::report;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Reflection metadata extractor and registration code generator.
///
/// Classes deriving (directly or not) from the marker class are reflected
/// into per-file JSON caches; `generate` merges the caches, links the
/// inheritance graph, and writes one C++ registration unit.
#[derive(Parser)]
#[command(name = "rain-rtti")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Only reflect declarations under this directory
    #[arg(long, global = true)]
    pub source_root: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract one translation unit into its cache file
    Extract(ExtractArgs),
    /// Mark a translation unit's cache entry as stale
    MarkStale(MarkStaleArgs),
    /// Merge caches and write the registration source
    Generate(GenerateArgs),
    /// Extract everything under a directory, then generate
    Scan(ScanArgs),
}

#[derive(Parser)]
pub struct ExtractArgs {
    /// Translation unit to parse
    pub source: PathBuf,
    /// Cache file to write (extension is replaced with .json)
    pub cache: PathBuf,
}

#[derive(Parser)]
pub struct MarkStaleArgs {
    pub source: PathBuf,
    pub cache: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Format {
    Pretty,
    Json,
}

#[derive(Parser)]
pub struct GenerateArgs {
    /// Cache files to merge
    #[arg(required = true)]
    pub caches: Vec<PathBuf>,

    /// Generated source file
    #[arg(short, long)]
    pub output: PathBuf,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Parser)]
pub struct ScanArgs {
    /// Directory to walk for translation units (default: the source root)
    pub dir: Option<PathBuf>,

    /// Directory holding the cache files
    #[arg(long, default_value = ".rtti-cache")]
    pub cache_dir: PathBuf,

    /// Generated source file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Re-extract every file, ignoring timestamps
    #[arg(long)]
    pub force: bool,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args)]
pub struct RunArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "pretty")]
    pub format: Format,

    /// Exit non-zero when caches are missing, files failed, or bases are unresolved
    #[arg(long)]
    pub deny_warnings: bool,
}

/// Load the config named on the command line, or the one in the current
/// directory, then apply flag overrides.
pub fn load_config(global: &GlobalArgs) -> anyhow::Result<Config> {
    let path = match &global.config {
        Some(p) => Some(p.clone()),
        None => Config::discover(Path::new(".")),
    };
    let mut config = match path {
        Some(p) => {
            debug!(config = %p.display(), "loading config");
            Config::parse_file(&p).with_context(|| format!("error parsing config {}", p.display()))?
        }
        None => Config::default(),
    };
    if let Some(root) = &global.source_root {
        config.source_root = root.clone();
    }
    Ok(config)
}

fn runner(config: Config) -> anyhow::Result<Runner<CppProvider>> {
    let provider = CppProvider::from_config(&config)?;
    Ok(Runner::new(config, provider).show_progress(true))
}

/// Run one command and map its outcome to an exit code.
pub fn run(cli: &Cli) -> anyhow::Result<i32> {
    let config = load_config(&cli.global)?;
    match &cli.command {
        Commands::Extract(args) => run_extract(config, args),
        Commands::MarkStale(args) => run_mark_stale(args),
        Commands::Generate(args) => run_generate(config, args),
        Commands::Scan(args) => run_scan(config, args),
    }
}

pub fn run_extract(config: Config, args: &ExtractArgs) -> anyhow::Result<i32> {
    runner(config)?
        .extract_to_cache(&args.source, &args.cache)
        .with_context(|| format!("extracting {}", args.source.display()))?;
    Ok(EXIT_SUCCESS)
}

pub fn run_mark_stale(args: &MarkStaleArgs) -> anyhow::Result<i32> {
    cache::mark_stale(&args.source, &args.cache)?;
    Ok(EXIT_SUCCESS)
}

pub fn run_generate(config: Config, args: &GenerateArgs) -> anyhow::Result<i32> {
    let report = runner(config)?.generate(&args.caches, &args.output)?;
    finish(&report, &args.run)
}

pub fn run_scan(config: Config, args: &ScanArgs) -> anyhow::Result<i32> {
    let dir = args.dir.clone().unwrap_or_else(|| config.source_root.clone());
    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }
    let report = runner(config)?.scan(&dir, &args.cache_dir, &args.output, args.force)?;
    finish(&report, &args.run)
}

fn finish(report: &RunReport, args: &RunArgs) -> anyhow::Result<i32> {
    match args.format {
        Format::Json => report::write_json(report)?,
        Format::Pretty => report::write_pretty(report),
    }

    if args.deny_warnings && !report.is_complete() {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}
