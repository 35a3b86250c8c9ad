use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;
mod error;
mod input;
mod output;

use config::Config;
use error::CliError;

#[derive(Parser)]
#[command(name = "dompart")]
#[command(about = "dompart - evidence-driven protein domain partitioning")]
#[command(version)]
#[command(long_about = "
dompart splits protein chains into structural domains using homology evidence
(chain BLAST, domain BLAST and HHsearch hits) and reference domain definitions.

Examples:
  dompart partition jobs/ --references domain_definitions.csv --out-dir results/
  dompart partition 8ovp_A.json --blacklist reference_blacklist.csv -vv
  dompart config --example > dompart.toml
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of threads to use
    #[arg(short, long, global = true)]
    pub threads: Option<usize>,

    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Partition one or more proteins described by JSON job files
    Partition {
        /// Job files, or directories of `.json` job files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Reference domain definitions (CSV)
        #[arg(long)]
        references: Option<PathBuf>,

        /// Reference chains to exclude (CSV)
        #[arg(long)]
        blacklist: Option<PathBuf>,

        /// Directory for `<protein>.domains.json` results
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Minimum domain size in residues
        #[arg(long)]
        min_domain_size: Option<usize>,

        /// Skip per-type quality thresholds
        #[arg(long)]
        no_quality_filter: bool,

        /// Write every supporting evidence item per domain
        #[arg(long)]
        include_evidence: bool,
    },

    /// Show the effective configuration or an example file
    Config {
        /// Print the default configuration instead of the effective one
        #[arg(long)]
        example: bool,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn setup_logging(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    let threads = cli.threads.unwrap_or(config.general.threads);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("Failed to set thread count")?;

    match cli.command {
        Commands::Partition {
            inputs,
            references,
            blacklist,
            out_dir,
            min_domain_size,
            no_quality_filter,
            include_evidence,
        } => {
            commands::partition::execute(
                &config,
                inputs,
                references,
                blacklist,
                out_dir,
                min_domain_size,
                no_quality_filter,
                include_evidence,
            )?;
        }

        Commands::Config { example, output } => {
            commands::config::execute(&config, example, output)?;
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet)?;

    if let Err(err) = run(cli) {
        if let Some(cli_error) = err.downcast_ref::<CliError>() {
            log::error!("{:#}", err);
            error::print_error_and_exit(cli_error);
        }
        return Err(err);
    }

    Ok(())
}
