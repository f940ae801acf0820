//! Reshape CLI
//!
//! Converts data files through mapping profiles and watches remote sources.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod pipeline;

/// Reshape - tabular data conversion between CSV, JSON, XML and Excel
#[derive(Parser)]
#[command(name = "reshape")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "reshape.yaml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new Reshape project
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Project name (defaults to directory name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Print the detected format of a file
    Detect {
        /// File to inspect
        file: String,
    },

    /// Convert a file through a mapping profile
    Convert {
        /// Input file
        input: String,

        /// Mapping profile to apply
        #[arg(short, long)]
        profile: String,

        /// Output file (JSON Lines); defaults to the configured output directory
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Print the flattened field paths of a template
    Schema {
        /// Template name
        template: String,
    },

    /// Validate configuration, templates and profiles
    Validate,

    /// Watch remote sources and convert them when they change
    Watch {
        /// Scan once, wait for the dispatched conversions and exit
        #[arg(long)]
        once: bool,
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
        Commands::Detect { file } => {
            commands::detect::run(&file).await?;
        }
        Commands::Convert {
            input,
            profile,
            output,
        } => {
            commands::convert::run(&cli.config, &input, &profile, output.as_deref()).await?;
        }
        Commands::Schema { template } => {
            commands::schema::run(&cli.config, &template).await?;
        }
        Commands::Validate => {
            commands::validate::run(&cli.config).await?;
        }
        Commands::Watch { once } => {
            commands::watch::run(&cli.config, once).await?;
        }
    }

    Ok(())
}
