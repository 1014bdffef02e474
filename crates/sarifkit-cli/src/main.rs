mod cmd_consolidate;
mod cmd_filter;
mod cmd_partition;
mod cmd_upgrade;
mod cmd_validate;
mod files;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sarifkit")]
#[command(about = "Upgrade, consolidate, and split SARIF logs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upgrade a log written against a prerelease schema to SARIF 2.1.0
    Upgrade {
        /// Input file (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Apply every patch even when the log claims to be current
        #[arg(long)]
        force: bool,

        /// Print a unified diff of the changes instead of the upgraded log
        #[arg(long)]
        diff: bool,
    },
    /// Trim and deduplicate every run of a log
    Consolidate {
        #[command(flatten)]
        args: cmd_consolidate::ConsolidateArgs,
    },
    /// Keep only the results matching every given criterion
    Filter {
        /// Input file (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep results with this rule id (repeatable)
        #[arg(long = "rule-id")]
        rule_ids: Vec<String>,

        /// Keep results with this level (repeatable)
        #[arg(long = "level")]
        levels: Vec<String>,
    },
    /// Split a log into one file per key
    Partition {
        /// Input file (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// What to split on
        #[arg(long, value_enum, default_value_t = cmd_partition::PartitionKey::RuleId)]
        by: cmd_partition::PartitionKey,

        /// Directory for the partition files
        #[arg(long)]
        output_dir: PathBuf,
    },
    /// Check that a log parses and every table reference is in bounds
    Validate {
        /// Input file (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the JSON.
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Upgrade {
            input,
            output,
            force,
            diff,
        } => cmd_upgrade::run(input, output, force, diff, cli.pretty),
        Commands::Consolidate { args } => cmd_consolidate::run(args, cli.pretty),
        Commands::Filter {
            input,
            output,
            rule_ids,
            levels,
        } => cmd_filter::run(input, output, rule_ids, levels, cli.pretty),
        Commands::Partition {
            input,
            by,
            output_dir,
        } => cmd_partition::run(input, by, output_dir, cli.pretty),
        Commands::Validate { input } => cmd_validate::run(input),
    }
}
