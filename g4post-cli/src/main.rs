//! g4post command-line interface.
//!
//! Runs pipeline configurations over folders of packed event files,
//! validates configurations and inspects packed files.

mod progress;

use clap::{ArgAction, Parser, Subcommand};
use g4post_io::{read_packed, PackedColumn, Runner};
use g4post_pipeline::{load_run_registry, Mode, Resources, RunConfig};
use progress::BarProgress;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("{0}")]
    G4postIo(#[from] g4post_io::Error),

    #[error("{0}")]
    Pipeline(#[from] g4post_pipeline::Error),

    #[error("{failed} of {total} file(s) failed")]
    FilesFailed { failed: usize, total: usize },
}

/// Post-processing of simulated detector hit data.
#[derive(Parser)]
#[command(name = "g4post")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline configuration over its input folder
    Run {
        /// Pipeline configuration (JSON)
        config: PathBuf,

        /// Reprocess files whose output already exists
        #[arg(long)]
        overwrite: bool,

        /// Worker threads, overriding `para.threads`
        #[arg(short, long)]
        threads: Option<usize>,

        /// Run registry for `detector_active_time` (JSON)
        #[arg(long)]
        registry: Option<PathBuf>,

        /// Hide progress bars
        #[arg(short, long)]
        quiet: bool,
    },

    /// Load and validate a configuration without processing files
    Check {
        /// Pipeline configuration (JSON)
        config: PathBuf,

        /// Also load and validate a run registry
        #[arg(long)]
        registry: Option<PathBuf>,
    },

    /// Show the columns of a packed file
    Inspect {
        /// Packed file (.json, .hdf5)
        file: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn resources(registry: Option<&Path>) -> Result<Resources> {
    let mut resources = Resources::new();
    if let Some(path) = registry {
        let table = load_run_registry(path)?;
        log::info!("run registry {}: {} runs", path.display(), table.runs().len());
        resources = resources.with_registry(Arc::new(table));
    }
    Ok(resources)
}

fn run(
    config: &Path,
    overwrite: bool,
    threads: Option<usize>,
    registry: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    let config = RunConfig::from_file(config)?;
    let resources = resources(registry)?;

    let mut runner = Runner::new(&config, &resources).with_overwrite(overwrite);
    if let Some(threads) = threads {
        runner = runner.with_threads(threads);
    }
    let files = runner.input_files()?.len();
    let progress = BarProgress::new(files, quiet || !std::io::stderr().is_terminal());
    let runner = runner.with_progress(&progress);

    let start = Instant::now();
    let report = runner.run()?;
    progress.complete();

    println!(
        "Processed {} file(s) in {:.2}s: {} written, {} skipped, {} failed",
        report.outcomes.len(),
        start.elapsed().as_secs_f64(),
        report.written(),
        report.skipped(),
        report.failed()
    );
    println!("Total events: {}", report.rows());
    if let Some(combined) = &report.combined {
        println!("Combined output: {}", combined.display());
    }

    if report.failed() > 0 {
        return Err(CliError::FilesFailed {
            failed: report.failed(),
            total: report.outcomes.len(),
        });
    }
    Ok(())
}

fn check(config: &Path, registry: Option<&Path>) -> Result<()> {
    let config = RunConfig::from_file(config)?;
    let resources = resources(registry)?;

    println!(
        "Input: {}/*.{} (tree `{}`)",
        config.input_folder.display(),
        config.input_format,
        config.input.tree
    );
    for (variable, branch) in config.input.branches() {
        println!("  {variable} <- {branch}");
    }
    let mode = match config.mode {
        Mode::PerFile => "per file",
        Mode::Summarize => "summarize",
    };
    println!("Output: {} ({mode})", config.output.display());
    println!("  {}", config.outputs.join(", "));
    match config.step_size {
        Some(step_size) => println!("Batches: {step_size} events"),
        None => println!(
            "Batches: sized to {:.0}% of available memory",
            config.memory_fraction * 100.0
        ),
    }

    println!("Modules: {}", config.pipeline.len());
    for module in config.pipeline.modules() {
        println!("  {:<24} {}", module.name(), module.kind().name());
    }

    if config.pipeline.requires_registry() && registry.is_none() {
        println!("Note: `detector_active_time` needs --registry when running");
    } else {
        config.pipeline.prepare(&resources)?;
    }
    println!("Configuration OK");
    Ok(())
}

fn inspect(file: &Path) -> Result<()> {
    let packed = read_packed(file)?;
    println!("File: {}", file.display());
    println!("Events: {}", packed.length);
    println!("column                   dtype    depth       values");
    for (name, column) in &packed.columns {
        let values = match column {
            PackedColumn::Float64(b) => b.data.len(),
            PackedColumn::Int64(b) => b.data.len(),
            PackedColumn::Bool(b) => b.data.len(),
        };
        println!(
            "{:<24} {:<8} {:>5} {:>12}",
            name,
            column.dtype().name(),
            column.depth(),
            values
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            overwrite,
            threads,
            registry,
            quiet,
        } => run(&config, overwrite, threads, registry.as_deref(), quiet),
        Commands::Check { config, registry } => check(&config, registry.as_deref()),
        Commands::Inspect { file } => inspect(&file),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "g4post", "-vv", "run", "cfg.json", "--overwrite", "--threads", "4",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run {
                config,
                overwrite,
                threads,
                registry,
                quiet,
            } => {
                assert_eq!(config, PathBuf::from("cfg.json"));
                assert!(overwrite);
                assert_eq!(threads, Some(4));
                assert!(registry.is_none());
                assert!(!quiet);
            }
            _ => panic!("expected run"),
        }
    }
}
