use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use toolsybio::commands::{
    ask_question, build_index, harvest_catalog, init_config, serve_mcp, show_status,
};
use toolsybio::config::{Config, show_config};

#[derive(Parser)]
#[command(name = "toolsybio")]
#[command(about = "Question answering over the bio.tools catalog of bioinformatics software")]
#[command(version)]
struct Cli {
    /// Data directory holding config, catalog, index and logs
    #[arg(long, global = true, env = "TOOLSYBIO_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file, or show the current one
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Harvest tool descriptions from the registry, resuming previous runs
    Harvest {
        /// Stop once the catalog holds this many tools
        #[arg(long)]
        max_tools: Option<usize>,
    },
    /// Chunk the catalog and rebuild the vector index
    BuildIndex,
    /// Answer a question about bioinformatics tools
    Ask {
        /// The question
        query: String,
        /// Number of chunks to retrieve
        #[arg(long, short = 'k', value_parser = clap::value_parser!(u16).range(1..=100))]
        top_k: Option<u16>,
    },
    /// Start MCP server on stdio
    Serve,
    /// Show catalog, index and model status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => Config::default_dir()?,
    };
    let config = Config::load(&data_dir)?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config)?;
            } else {
                init_config(&config)?;
            }
        }
        Commands::Harvest { max_tools } => {
            harvest_catalog(&config, max_tools).await?;
        }
        Commands::BuildIndex => {
            build_index(&config).await?;
        }
        Commands::Ask { query, top_k } => {
            ask_question(&config, &query, top_k.map(usize::from)).await?;
        }
        Commands::Serve => {
            serve_mcp(&config).await?;
        }
        Commands::Status => {
            show_status(&config).await?;
        }
    }

    Ok(())
}
