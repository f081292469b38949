//! Finance Analyst - Main Entry Point
//!
//! `run` serves the HTTP surface, `config` validates a configuration file,
//! and `ask` runs a single task from the command line.

use clap::{Parser, Subcommand};
use finance_analyst::agent::TaskDispatcher;
use finance_analyst::config::AnalystConfig;
use finance_analyst::llm::provider::LlmProvider;
use finance_analyst::llm::providers::{OpenAiConfig, OpenAiProvider};
use finance_analyst::observability::{init_cli_logging, init_default_logging};
use finance_analyst::protocol::TaskRequest;
use finance_analyst::transport::{serve, ServerState};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// 10-K financial analyst agent
#[derive(Parser)]
#[command(name = "finance-analyst")]
#[command(about = "LLM-backed 10-K analyst: risk classification, business summary, consistency check")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (ask and config commands)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Run {
        /// Override [server].host
        #[arg(long)]
        host: Option<String>,
        /// Override [server].port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Run one task and print the JSON result
    Ask {
        /// Task type, e.g. risk_classification
        #[arg(long)]
        task: String,
        /// Company context, or @path to read it from a file
        #[arg(long)]
        context: String,
        /// Auxiliary data as key=value, e.g. prior_risks=@risks.txt
        #[arg(long = "aux", value_name = "KEY=VALUE")]
        aux: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { .. } => init_default_logging(),
        _ => init_cli_logging(cli.verbose),
    }

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("Failed to load configuration: {e}");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run { host, port } => run_server(config, host, port).await,
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::Ask { task, context, aux } => ask(&config, task, &context, &aux).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        eprintln!("{e}");
        process::exit(1);
    }
}

fn load_configuration(config_path: Option<&Path>) -> Result<AnalystConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(AnalystConfig::load_from_file(path)?);
    }

    for path_str in ["analyst.toml", "config/analyst.toml"] {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(AnalystConfig::load_from_file(&path)?);
        }
    }

    Err("No configuration file found. Provide one with -c/--config or create analyst.toml".into())
}

/// Provider factory for creating LLM providers from configuration
struct LlmProviderFactory;

impl LlmProviderFactory {
    fn create_provider(
        config: &AnalystConfig,
    ) -> Result<Arc<dyn LlmProvider>, Box<dyn std::error::Error>> {
        match config.llm.provider.as_str() {
            "openai" | "openrouter" => {
                let api_key = config.get_llm_api_key()?;
                let provider_config = OpenAiConfig::from_section(&config.llm, api_key)
                    .with_app_title(config.agent.name.clone());
                Ok(Arc::new(OpenAiProvider::new(provider_config)?))
            }
            provider => Err(format!("Unsupported LLM provider: {provider}").into()),
        }
    }
}

async fn run_server(
    mut config: AnalystConfig,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    info!(
        agent_id = %config.agent.id,
        provider = %config.llm.provider,
        model = %config.llm.model,
        "Starting finance analyst v{}",
        env!("CARGO_PKG_VERSION")
    );

    let provider = LlmProviderFactory::create_provider(&config)?;
    let dispatcher = TaskDispatcher::from_config(&config, provider);
    let state = Arc::new(ServerState::new(&config, dispatcher));

    let ip: IpAddr = config
        .server
        .host
        .parse()
        .map_err(|e| format!("Invalid server.host '{}': {e}", config.server.host))?;
    let addr = SocketAddr::new(ip, config.server.port);

    serve(state, addr, shutdown_signal()).await?;

    info!("Application shutdown complete");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down gracefully..."),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully..."),
    }
}

fn handle_config_command(config: &AnalystConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    println!("Configuration is valid");
    Ok(())
}

/// Inline text, or the contents of a file when prefixed with `@`
fn read_text_argument(value: &str) -> Result<String, Box<dyn std::error::Error>> {
    match value.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {path}: {e}").into()),
        None => Ok(value.to_string()),
    }
}

async fn ask(
    config: &AnalystConfig,
    task: String,
    context: &str,
    aux: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut request = TaskRequest::new(task, read_text_argument(context)?);
    for pair in aux {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("Auxiliary data '{pair}' must be KEY=VALUE"))?;
        request = request.with_auxiliary(key.trim(), read_text_argument(value)?);
    }

    let provider = LlmProviderFactory::create_provider(config)?;
    let dispatcher = TaskDispatcher::from_config(config, provider);

    match dispatcher
        .handle_with_deadline(&request, config.server.request_deadline())
        .await
    {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&e.to_error_response())?);
            Err(e.into())
        }
    }
}
