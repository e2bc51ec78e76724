//! Toolwright CLI: the main entry point.
//!
//! Commands:
//! - `init`: write a starter config file
//! - `tools`: list registered tools and their parameters
//! - `run`: answer one request with the decision and reflection loops

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "toolwright",
    about = "Toolwright: a tool-using, self-reflecting agent",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Init {
        /// Write here instead of ~/.toolwright/config.toml
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List the registered tools
    Tools,

    /// Run the agent on a single request
    Run {
        /// The request to answer
        #[arg(short, long)]
        message: String,

        /// Return the first draft without critique
        #[arg(long)]
        no_reflect: bool,

        /// Config file to load instead of ~/.toolwright/config.toml
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init { config } => commands::init::run(config)?,
        Commands::Tools => commands::tools::run()?,
        Commands::Run {
            message,
            no_reflect,
            config,
        } => commands::run::run(&message, no_reflect, config).await?,
    }

    Ok(())
}
