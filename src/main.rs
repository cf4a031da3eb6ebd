//! depgraph CLI entry point

use clap::{Parser, Subcommand};
use depgraph_core::Confidence;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "depgraph")]
#[command(about = "Dependency graph and change impact analysis for Python and JS/TS projects", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Engine configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer line-delimited JSON requests on stdin/stdout
    Serve {
        /// Parse JS/TS files in a separate worker process
        #[arg(long)]
        brace_worker: bool,
    },
    /// Analyse a project and print its graph as JSON
    Analyse {
        root: PathBuf,

        /// Pretty-print the output
        #[arg(short, long)]
        pretty: bool,
    },
    /// Print what a change to a file (or one function in it) would affect
    Impact {
        root: PathBuf,

        /// Path of the changed file, or its module id
        file: String,

        /// Qualified name of the changed function within the file
        #[arg(short, long)]
        function: Option<String>,

        /// Stop after this many dependency hops
        #[arg(long)]
        max_depth: Option<usize>,

        /// Ignore edges below this confidence (high, medium, low, unsafe)
        #[arg(long, value_parser = parse_confidence)]
        min_confidence: Option<Confidence>,
    },
    /// Run as a JS/TS parse worker on stdin/stdout
    ParseWorker,
    /// Show version
    Version,
}

fn parse_confidence(value: &str) -> Result<Confidence, String> {
    Confidence::ALL
        .into_iter()
        .find(|c| c.as_str().eq_ignore_ascii_case(value))
        .ok_or_else(|| format!("unknown confidence tier: {}", value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries protocol traffic, so logs go to stderr
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            ["depgraph", "depgraph_core", "depgraph_indexer", "depgraph_engine", "depgraph_server"]
                .map(|target| format!("{}={}", target, log_level))
                .join(","),
        )
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { brace_worker } => commands::serve(config, brace_worker).await,
        Commands::Analyse { root, pretty } => commands::analyse(config, root, pretty),
        Commands::Impact {
            root,
            file,
            function,
            max_depth,
            min_confidence,
        } => commands::impact(config, root, file, function, max_depth, min_confidence),
        Commands::ParseWorker => commands::parse_worker(),
        Commands::Version => {
            println!("depgraph v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
