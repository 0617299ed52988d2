use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scholar_harvester::config::{Config, ConfigOverrides, LogFormat, LoggingConfig};
use scholar_harvester::pipeline::SearchPipeline;
use scholar_harvester::server::{self, AppState, LoggingPublisher, SearchRequest, SearchResult};
use scholar_harvester::storage;

#[derive(Debug, Parser)]
#[command(name = "scholar-harvester", version, about)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the configured log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP search service
    Serve {
        /// Override the configured listen host
        #[arg(long)]
        host: Option<String>,
        /// Override the configured listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run a single search and print the result envelope as JSON
    Search {
        /// Query terms, one per argument
        #[arg(required = true)]
        terms: Vec<String>,
        /// Restrict results to a research domain
        #[arg(long)]
        domain: Option<String>,
        /// Number of papers to deliver
        #[arg(long)]
        batch_size: Option<u32>,
        /// Store downloaded PDFs under this directory
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut overrides = ConfigOverrides {
        log_level: cli.log_level.clone(),
        ..ConfigOverrides::default()
    };
    match &cli.command {
        Command::Serve { host, port } => {
            overrides.host = host.clone();
            overrides.port = *port;
        }
        Command::Search { output, .. } => {
            overrides.storage_directory = output.clone();
        }
    }

    let config =
        Config::load(cli.config.as_deref(), &overrides).context("failed to load configuration")?;
    init_logging(&config.logging);

    match cli.command {
        Command::Serve { .. } => run_server(config).await,
        Command::Search {
            terms,
            domain,
            batch_size,
            ..
        } => run_search(config, terms, domain, batch_size).await,
    }
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let store = storage::from_config(&config.storage);
    let pipeline =
        SearchPipeline::from_config(&config, store).context("failed to build search pipeline")?;
    let state = Arc::new(AppState::new(
        Arc::new(config),
        Arc::new(pipeline),
        Arc::new(LoggingPublisher),
    ));
    server::serve(state).await.context("server terminated")
}

async fn run_search(
    config: Config,
    terms: Vec<String>,
    domain: Option<String>,
    batch_size: Option<u32>,
) -> anyhow::Result<()> {
    let store = storage::from_config(&config.storage);
    let pipeline =
        SearchPipeline::from_config(&config, store).context("failed to build search pipeline")?;

    let request = SearchRequest {
        project_id: None,
        correlation_id: None,
        query_terms: terms,
        domain,
        batch_size,
    };
    let job = request.validate(&config.search)?;
    let outcome = pipeline.run(&job).await;
    let result = SearchResult::from_outcome(&request, outcome);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Logs go to stderr so the `search` subcommand can print clean JSON
/// on stdout.
fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.clone()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}
