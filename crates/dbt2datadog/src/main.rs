use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dbt2datadog_config::RuntimeConfig;
use dbt2datadog_core::WebhookVerifier;
use std::path::{Path, PathBuf};

/// Relay dbt Cloud job-run webhooks to Datadog logs
#[derive(Parser)]
#[command(name = "dbt2datadog")]
#[command(version)]
#[command(about = "Relay dbt Cloud job-run webhooks to Datadog logs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// HTTP listen port (overrides config file)
    #[arg(short, long, value_name = "PORT", global = true)]
    port: Option<u16>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default if no subcommand given)
    Serve,
    /// Print the authorization header value for a payload file
    Sign {
        /// JSON payload to sign
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Sign { file }) = &cli.command {
        return run_sign(&cli, file);
    }

    run_server(cli)
}

fn load_config(cli: &Cli) -> Result<RuntimeConfig> {
    let mut config = if let Some(config_path) = &cli.config {
        RuntimeConfig::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        RuntimeConfig::load().context("Failed to load configuration")?
    };

    apply_cli_overrides(&mut config, cli);
    Ok(config)
}

fn run_sign(cli: &Cli, file: &Path) -> Result<()> {
    let config = load_config(cli)?;
    let body = std::fs::read(file)
        .with_context(|| format!("Failed to read payload file: {}", file.display()))?;

    let verifier = WebhookVerifier::new(config.webhook.secret.as_bytes());
    println!("{}", verifier.sign(&body));
    Ok(())
}

fn run_server(cli: Cli) -> Result<()> {
    // Build tokio runtime and run async server
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    // Initialize tracing early; run_with_config calls it again (idempotent)
    dbt2datadog::init_tracing(&config);
    display_startup_info(&config);

    dbt2datadog::run_with_config(config).await
}

fn apply_cli_overrides(config: &mut RuntimeConfig, cli: &Cli) {
    if let Some(port) = cli.port {
        config.server.listen_addr = format!("0.0.0.0:{}", port);
    }

    if let Some(level) = &cli.log_level {
        config.server.log_level = level.clone();
    }
}

fn display_startup_info(config: &RuntimeConfig) {
    use tracing::info;

    info!("╭─────────────────────────────────────────────────");
    info!("│ dbt2datadog v{}", env!("CARGO_PKG_VERSION"));
    info!("├─────────────────────────────────────────────────");
    info!("│ Listen address: http://{}", config.server.listen_addr);
    info!("│ Metadata API: {}", config.metadata.endpoint);
    info!("│ Datadog intake: {}", config.datadog.intake_base_url());
    info!("│ Log level: {}", config.server.log_level);
    info!("│ Max batch size: {}", config.datadog.max_batch_size);
    info!("╰─────────────────────────────────────────────────");
}
