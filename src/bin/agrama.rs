/// Agrama CLI - Temporal Knowledge Graph Server
///
/// The main entry point for running Agrama as an MCP server and for
/// inspecting a substrate instance from the command line.
///
/// Usage:
///   agrama serve               - Run the MCP JSON-RPC loop over stdio
///   agrama tools               - Print the advertised tool registry
///   agrama stats               - Print engine statistics for a fresh instance
///
/// Logging goes to stderr (stdout belongs to the protocol); control the
/// level with AGRAMA_LOG, and set AGRAMA_DEBUG=1 for raw transport echo.
use agrama::mcp::{McpServer, StdioTransport};
use agrama::{init_logging, AgramaConfig, HashEmbedder, PrimitiveEngine};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "agrama")]
#[command(about = "Temporal knowledge graph substrate for cooperating agents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Embedding dimension for the semantic index
    #[arg(long, default_value_t = 768)]
    dims: usize,

    /// Enable the result cache with this many entries
    #[arg(long)]
    cache: Option<usize>,

    /// Session idle window in seconds
    #[arg(long, default_value_t = 3600)]
    session_idle: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP JSON-RPC 2.0 loop over stdin/stdout
    Serve {
        /// Agent identity for calls that don't carry one
        #[arg(long, default_value = "mcp-client")]
        agent: String,
        /// Maintenance tick interval in seconds
        #[arg(long, default_value_t = 60)]
        maintenance_interval: u64,
    },
    /// Print the tool registry as advertised by tools/list
    Tools,
    /// Print engine statistics for a fresh instance
    Stats,
}

fn build_engine(cli: &Cli) -> Result<PrimitiveEngine> {
    anyhow::ensure!(cli.dims > 0, "--dims must be non-zero");
    let mut config = AgramaConfig::default()
        .vector_dimensions(cli.dims)
        .session_idle_seconds(cli.session_idle);
    config.matryoshka_dims = if cli.dims >= 64 {
        vec![cli.dims / 8, cli.dims / 2, cli.dims]
    } else {
        vec![cli.dims]
    };
    if let Some(size) = cli.cache {
        config = config.with_cache(size);
    }

    let embedder = Arc::new(HashEmbedder::new(cli.dims));
    PrimitiveEngine::with_embedder(config, embedder).context("failed to build primitive engine")
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let engine = build_engine(&cli)?;

    match &cli.command {
        Commands::Serve {
            agent,
            maintenance_interval,
        } => {
            // Maintenance runs on its own task; the stdio loop blocks the
            // main thread until stdin closes.
            let maintenance_engine = engine.clone();
            let interval = Duration::from_secs(*maintenance_interval);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await; // skip the immediate first tick
                loop {
                    ticker.tick().await;
                    maintenance_engine.maintenance_tick();
                }
            });

            let server = McpServer::new(engine).with_default_agent(agent.clone());
            let transport = StdioTransport::new();
            tokio::task::spawn_blocking(move || transport.run(server))
                .await
                .context("transport task panicked")??;
            Ok(())
        }

        Commands::Tools => {
            for spec in agrama::primitives::tool_registry() {
                println!("{}  {}", spec.name.bold().green(), spec.title);
                println!("    {}", spec.description.dimmed());
                println!("    {} {}", "performance:".dimmed(), spec.performance);
            }
            Ok(())
        }

        Commands::Stats => {
            let stats = engine.stats();
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
    }
}
