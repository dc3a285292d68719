//! Flowtrack CLI
//!
//! Operator tool for registering flows and watching their status.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod render;

/// Flowtrack - batch pipeline status monitor
#[derive(Parser)]
#[command(name = "flowtrack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file or directory
    #[arg(short, long, default_value = "flowtrack.yaml", env = "FLOWTRACK_CONFIG")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new Flowtrack deployment
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Deployment name (defaults to directory name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Validate a flow registration payload without registering it
    Validate {
        /// Path to the JSON payload
        file: String,

        /// Print the built graph as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage registered flows
    Flow {
        #[command(subcommand)]
        command: FlowCommands,
    },

    /// Fetch a flow's status once and print it
    Status {
        /// Flow name
        name: String,

        /// Print the annotated graph as JSON
        #[arg(long)]
        json: bool,
    },

    /// Follow a flow's status updates
    Watch {
        /// Flow name
        name: String,

        /// Stop after this many updates
        #[arg(long)]
        ticks: Option<usize>,
    },

    /// Run the status runtime for every registered flow
    Run,
}

#[derive(Subcommand)]
enum FlowCommands {
    /// List registered flows
    List,

    /// Show a flow's stages and sub-stages
    Show {
        /// Flow name
        name: String,

        /// Print the graph as JSON
        #[arg(long)]
        json: bool,
    },

    /// Register (or replace) a flow from a JSON payload
    Register {
        /// Path to the JSON payload
        file: String,
    },

    /// Remove a registered flow
    Remove {
        /// Flow name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Init { path, name } => {
            commands::init::run(&path, name.as_deref()).await?;
        }
        Commands::Validate { file, json } => {
            commands::validate::run(&file, json).await?;
        }
        Commands::Flow { command } => match command {
            FlowCommands::List => {
                commands::flow::list(&cli.config).await?;
            }
            FlowCommands::Show { name, json } => {
                commands::flow::show(&cli.config, &name, json).await?;
            }
            FlowCommands::Register { file } => {
                commands::flow::register(&cli.config, &file).await?;
            }
            FlowCommands::Remove { name } => {
                commands::flow::remove(&cli.config, &name).await?;
            }
        },
        Commands::Status { name, json } => {
            commands::status::run(&cli.config, &name, json).await?;
        }
        Commands::Watch { name, ticks } => {
            commands::watch::run(&cli.config, &name, ticks).await?;
        }
        Commands::Run => {
            commands::run::run(&cli.config).await?;
        }
    }

    Ok(())
}
