//! Metaetl CLI - run metadata-driven ETL dataflows
//!
//! ```bash
//! metaetl run metadata.json                 # Run every dataflow
//! metaetl run metadata.json --report r.json # ...and save the run report
//! metaetl check metadata.json               # Validate metadata without touching data
//! metaetl rules                             # List validation rules and field functions
//! ```

use clap::{Parser, Subcommand};
use metaetl::{MetadataReader, Pipeline, RuleRegistry, RunReport, Settings};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "metaetl")]
#[command(about = "Run metadata-driven ETL dataflows with record-level lineage", long_about = None)]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every dataflow of a metadata file
    Run {
        /// Metadata JSON file
        metadata: PathBuf,

        /// Directory for execution, metrics and lineage records
        #[arg(long)]
        lineage_dir: Option<PathBuf>,

        /// Do not record executions, metrics or lineage
        #[arg(long)]
        no_observability: bool,

        /// Write the run report (JSON) to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Load a metadata file and resolve every rule, function and input reference
    Check {
        /// Metadata JSON file
        metadata: PathBuf,
    },

    /// List registered validation rules and field functions
    Rules,
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Run {
            metadata,
            lineage_dir,
            no_observability,
            report,
        } => cmd_run(&metadata, lineage_dir, no_observability, report.as_deref()),

        Commands::Check { metadata } => cmd_check(&metadata),

        Commands::Rules => {
            cmd_rules();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    let filter = if verbose > 0 || quiet {
        EnvFilter::new(default)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_run(
    metadata: &Path,
    lineage_dir: Option<PathBuf>,
    no_observability: bool,
    report_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = Settings::from_env()?;
    if let Some(dir) = lineage_dir {
        settings.lineage_dir = dir;
    }
    if no_observability {
        settings.observability = false;
    }

    let pipeline = Pipeline::from_settings(RuleRegistry::new(), &settings);
    let report = pipeline.run_file(metadata)?;

    print_summary(&report);
    if let Some(path) = report_path {
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
        eprintln!("Report saved to: {}", path.display());
    }

    Ok(())
}

fn print_summary(report: &RunReport) {
    eprintln!("\nExecution {}", report.execution_id);
    for dataflow in &report.dataflows {
        eprintln!(
            "  {}: {} valid, {} invalid, {} records written ({} ms)",
            dataflow.name,
            dataflow.records_valid,
            dataflow.records_invalid,
            dataflow.records_processed,
            dataflow.duration.as_millis()
        );
        for sink in &dataflow.sinks {
            eprintln!("    {} -> {} ({} records)", sink.input, sink.output_file.display(), sink.records);
        }
    }
}

fn cmd_check(metadata: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = MetadataReader::load(metadata)?;
    let pipeline = Pipeline::new(RuleRegistry::new());

    for dataflow in &config.dataflows {
        let plan = pipeline
            .engine()
            .compile(dataflow)
            .map_err(|e| format!("dataflow '{}': {}", dataflow.name, e))?;
        eprintln!(
            "  {}: {} sources, {} transformations, {} sinks",
            dataflow.name,
            dataflow.sources.len(),
            plan.len(),
            dataflow.sinks.len()
        );
    }

    eprintln!("Metadata OK: {} dataflows", config.dataflows.len());
    Ok(())
}

fn cmd_rules() {
    let registry = RuleRegistry::new();

    println!("Validation rules:");
    for rule in registry.validation_rules() {
        println!("  {:<20} {:<20} {}", rule.name, rule.error_code(), rule.message);
    }

    println!("\nField functions:");
    for name in registry.function_names() {
        println!("  {}", name);
    }
}
