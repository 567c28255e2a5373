//! oparl-validator main entry point
//!
//! This is the command-line interface for the OParl conformance validator.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use oparl_validator::config::{
    load_config_with_hash, normalize_protocol_version, validate as validate_config, Config,
    OutputFormat,
};
use oparl_validator::output::{write_report, Progress, Report};
use oparl_validator::CrawlEngine;
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// oparl-validator: conformance checks for OParl endpoints
///
/// Crawls an OParl system starting at URL, validates every document against
/// the protocol's schemas and HTTP rules and prints a report. Without a URL
/// a single JSON document is read from stdin and validated on its own.
#[derive(Parser, Debug)]
#[command(name = "oparl-validator")]
#[command(version)]
#[command(about = "Conformance validator for OParl endpoints", long_about = None)]
struct Cli {
    /// Entry point of the system to validate (reads stdin when omitted)
    #[arg(value_name = "URL")]
    url: Option<String>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Only validate documents of this type (repeatable)
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    types: Vec<String>,

    /// Follow links and validate the whole system
    #[arg(short, long)]
    recursive: bool,

    /// Validate at most this many documents of each type
    #[arg(short = 'n', long, value_name = "N")]
    max_documents: Option<usize>,

    /// Leave affected document ids out of the report
    #[arg(long)]
    compact: bool,

    /// Protocol version to validate against
    #[arg(long, value_name = "VERSION")]
    oparl_version: Option<String>,

    /// Report format
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Stream progress as JSON-patch lines on stderr (requires --result)
    #[arg(long)]
    porcelain: bool,

    /// Write the JSON report to this file
    #[arg(long, value_name = "FILE")]
    result: Option<PathBuf>,

    /// Render a previously saved JSON report and exit
    #[arg(long, value_name = "FILE", conflicts_with = "url")]
    read: Option<PathBuf>,

    /// Number of validation workers
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Capacity of the work queue
    #[arg(long, value_name = "N")]
    queue_size: Option<usize>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Text => OutputFormat::Text,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = build_config(&cli)?;

    if let Some(directives) = log_directives(cli.verbose, cli.quiet, config.output.porcelain) {
        setup_logging(directives);
    }

    if let Some(path) = &cli.read {
        let report = Report::from_file(path)
            .with_context(|| format!("Failed to read report {}", path.display()))?;
        let mut output = config.output.clone();
        output.result_path = None;
        write_report(&report, &output)?;
        return Ok(());
    }

    let progress = if config.output.porcelain {
        Progress::porcelain_stderr()
    } else {
        Progress::log()
    };
    let engine = CrawlEngine::new(config.clone())?.with_progress(progress);

    let report = match &cli.url {
        Some(url) => handle_crawl(&engine, url).await?,
        None => handle_stdin(&engine).await?,
    };

    write_report(&report, &config.output)?;
    Ok(())
}

/// Picks the log filter for the verbosity flags
///
/// Porcelain owns stderr, so no log lines may appear between its patches.
fn log_directives(verbose: u8, quiet: bool, porcelain: bool) -> Option<&'static str> {
    if porcelain {
        return None;
    }
    if quiet {
        return Some("error");
    }
    Some(match verbose {
        0 => "oparl_validator=info,warn",
        1 => "oparl_validator=debug,info",
        2 => "oparl_validator=trace,debug",
        _ => "trace",
    })
}

/// Sets up the logging/tracing subscriber
///
/// Logs go to stderr so the report on stdout stays clean.
fn setup_logging(directives: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directives))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the configuration file, if any, and applies command-line overrides
fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?;
            tracing::debug!("Configuration loaded (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    if !cli.types.is_empty() {
        config.crawler.types = cli.types.clone();
    }
    if cli.recursive {
        config.crawler.recursive = true;
    }
    if let Some(max) = cli.max_documents {
        config.crawler.max_documents = Some(max);
    }
    if let Some(workers) = cli.workers {
        config.crawler.workers = workers;
    }
    if let Some(queue_size) = cli.queue_size {
        config.crawler.queue_size = queue_size;
    }
    if let Some(version) = &cli.oparl_version {
        config.validator.oparl_version = normalize_protocol_version(version)?.to_string();
    }
    if cli.compact {
        config.output.compact = true;
    }
    if let Some(format) = cli.format {
        config.output.format = format.into();
    }
    if cli.porcelain {
        config.output.porcelain = true;
    }
    if let Some(result) = &cli.result {
        config.output.result_path = Some(result.display().to_string());
    }

    validate_config(&config).context("Invalid configuration")?;
    Ok(config)
}

async fn handle_crawl(engine: &CrawlEngine, url: &str) -> anyhow::Result<Report> {
    tracing::info!("Validating {}", url);
    let report = engine.run(url).await?;
    tracing::info!(
        "{} documents, {} valid, {} failed",
        report.counts.total,
        report.counts.valid,
        report.counts.failed
    );
    Ok(report)
}

async fn handle_stdin(engine: &CrawlEngine) -> anyhow::Result<Report> {
    tracing::info!("Reading document from stdin");
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("Failed to read stdin")?;
    Ok(engine.validate_standalone(&raw).await?)
}
