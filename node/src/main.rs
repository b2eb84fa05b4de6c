//! D21 Node Binary

use clap::{Parser, Subcommand};
use d21_core::{Address, NodeConfig};
use d21_election::ElectionSetup;
use d21_node::NodeBuilder;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "d21-node")]
#[command(about = "D21 Node - Janecek method election service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node
    Run {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Election setup file to open at start-up
        #[arg(short, long)]
        setup: Option<PathBuf>,

        /// API listen address
        #[arg(long)]
        api_addr: Option<String>,

        /// Data directory
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Persist election snapshots to disk
        #[arg(long)]
        persistent: bool,

        /// Default voting window in seconds
        #[arg(long)]
        voting_duration_secs: Option<u64>,

        /// Log level, overridden by RUST_LOG
        #[arg(long)]
        log_level: Option<String>,
    },

    /// Write a default node configuration
    InitConfig {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write an election setup template
    SetupTemplate {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Administrator address (hex)
        #[arg(long)]
        administrator: Option<String>,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            setup,
            api_addr,
            data_dir,
            persistent,
            voting_duration_secs,
            log_level,
        } => {
            let mut node_config = match config {
                Some(path) => NodeConfig::load(&path)?,
                None => NodeConfig::default(),
            };
            if let Some(level) = log_level {
                node_config.log_level = level;
            }

            init_logging(&node_config.log_level);
            info!("Starting D21 Node...");

            let mut builder = NodeBuilder::new().config(node_config);

            if let Some(addr) = api_addr {
                builder = builder.api_addr(&addr);
            }
            if let Some(dir) = data_dir {
                builder = builder.data_dir(dir);
            }
            if persistent {
                builder = builder.persistent(true);
            }
            if let Some(secs) = voting_duration_secs {
                anyhow::ensure!(secs > 0, "voting duration must be positive");
                builder = builder.voting_duration_secs(secs);
            }
            if let Some(path) = setup {
                let content = std::fs::read_to_string(&path)?;
                builder = builder.setup(ElectionSetup::from_json(&content)?);
            }

            let node = builder.build();

            // Start node
            node.start().await?;
        }

        Commands::InitConfig { output } => {
            let json = NodeConfig::default().to_json()?;
            std::fs::write(&output, &json)?;

            println!("Node configuration saved to: {}", output.display());
        }

        Commands::SetupTemplate {
            output,
            administrator,
        } => {
            let administrator = match administrator {
                Some(hex) => Address::from_hex(&hex)?,
                None => Address::ZERO,
            };

            let setup = ElectionSetup::new(&administrator)
                .add_subject("Subject A")
                .add_subject("Subject B");

            std::fs::write(&output, setup.to_json()?)?;

            println!("Election setup template saved to: {}", output.display());
        }
    }

    Ok(())
}
