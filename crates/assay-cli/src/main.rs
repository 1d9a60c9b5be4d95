//! assay CLI — the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{ArgGroup, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "assay", version, about = "Assessment scoring and processing engine")]
struct Cli {
    /// Config file path (defaults to ./assay.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Statically validate an item or a test and its items
    #[command(group(ArgGroup::new("target").required(true).args(["item", "test"])))]
    Validate {
        /// Path to an item definition
        #[arg(long)]
        item: Option<PathBuf>,

        /// Path to a test definition
        #[arg(long)]
        test: Option<PathBuf>,
    },

    /// Run one attempt at an item
    Run {
        /// Path to an item definition
        #[arg(long)]
        item: PathBuf,

        /// Submitted response, repeatable (e.g. RESPONSE=A)
        #[arg(long = "response", value_name = "ID=VALUE")]
        responses: Vec<String>,

        /// External template default, repeatable (e.g. A=3)
        #[arg(long = "template", value_name = "ID=VALUE")]
        templates: Vec<String>,

        /// Seed for the attempt's random source
        #[arg(long)]
        seed: Option<u64>,

        /// Print the attempt summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Assemble a test and print the delivered structure
    Assemble {
        /// Path to a test definition
        #[arg(long)]
        test: PathBuf,

        /// Seed for selection and ordering
        #[arg(long)]
        seed: Option<u64>,

        /// Print the runtime tree as JSON
        #[arg(long)]
        json: bool,
    },

    /// Simulate many independent attempts at an item
    Simulate {
        /// Path to an item definition
        #[arg(long)]
        item: PathBuf,

        /// Number of attempts
        #[arg(long, default_value = "100")]
        attempts: usize,

        /// Max concurrent attempts (overrides config)
        #[arg(long)]
        parallelism: Option<usize>,

        /// Submitted response, repeatable (e.g. RESPONSE=A)
        #[arg(long = "response", value_name = "ID=VALUE")]
        responses: Vec<String>,

        /// Base seed; attempt i uses seed + i
        #[arg(long)]
        seed: Option<u64>,

        /// Write the JSON report to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Create a starter config and sample definitions
    Init,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match assay_session::load_config_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("assay=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Validate { item, test } => commands::validate::execute(item, test),
        Commands::Run {
            item,
            responses,
            templates,
            seed,
            json,
        } => commands::run::execute(item, responses, templates, seed, json, config),
        Commands::Assemble { test, seed, json } => {
            commands::assemble::execute(test, seed, json, config)
        }
        Commands::Simulate {
            item,
            attempts,
            parallelism,
            responses,
            seed,
            output,
        } => {
            commands::simulate::execute(item, attempts, parallelism, responses, seed, output, config)
                .await
        }
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
