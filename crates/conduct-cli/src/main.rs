//! Conduct CLI - run dependency-aware workflows against simulated
//! providers, using the same core engine a host application would embed.

use clap::{Parser, Subcommand};

use conduct_cli::commands;

/// Conduct - dependency-aware task scheduling with resilient provider execution
#[derive(Parser)]
#[command(
    name = "conduct",
    version,
    about = "Conduct — dependency-aware task scheduling with resilient provider execution"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow from a YAML definition file
    Run {
        /// Path to the workflow YAML file
        file: String,
        /// Print every engine event as it fires
        #[arg(long, short = 'v')]
        verbose: bool,
        /// Seconds to wait for the workflow before cancelling it
        #[arg(long, default_value_t = 300, env = "CONDUCT_TIMEOUT_SECS")]
        timeout_secs: u64,
    },

    /// Validate a workflow YAML file without executing it
    Validate {
        /// Path to the workflow YAML file
        file: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conduct_core=warn,conduct_cli=info".into()),
        )
        .init();

    let result = match cli.command {
        Commands::Run {
            file,
            verbose,
            timeout_secs,
        } => commands::run::run(&file, verbose, timeout_secs).await,
        Commands::Validate { file } => commands::validate::run(&file).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
