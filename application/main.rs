use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gemvault::api::build_router;
use gemvault::app_state::AppState;
use gemvault::auth::StaticOracle;
use gemvault::config::{AppConfig, LogFormat};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Private gem repository server
#[derive(Parser, Debug)]
#[command(name = "gemvault")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "GEMVAULT_CONFIG")]
    config: Option<PathBuf>,

    /// Repository directory, overriding the configured one
    #[arg(short, long)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the repository server (the default)
    Serve,
    /// Read a password from standard input and print its `auth.users` entry
    HashPassword,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if let Some(Command::HashPassword) = args.command {
        return hash_password();
    }

    if let Some(path) = &args.config {
        if !path.exists() {
            bail!("configuration file {} does not exist", path.display());
        }
    }
    let mut config =
        AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(root) = args.root {
        config.repository.root = root;
    }

    init_tracing(config.server.log_format);
    info!("gemvault v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        info!(config_path = %path.display(), "loaded configuration from file");
    }

    if config.auth.users.is_empty() {
        warn!("no users are configured, uploads will only be possible with existing api keys");
    }
    let oracle = Arc::new(StaticOracle::new(config.auth.users.clone()));

    let bind = config.server.bind.clone();
    let app_state = AppState::new(config, oracle).await?;
    info!(
        root = %app_state.config.repository.root.display(),
        "serving gems"
    );

    let index = app_state
        .index
        .regenerate()
        .await
        .context("failed to build the initial index")?;
    info!(gems = index.len(), "initial index ready");

    let app = build_router(app_state);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind to {bind}"))?;
    info!("listening on {bind}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("shut down");

    Ok(())
}

fn hash_password() -> Result<()> {
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("failed to read the password from standard input")?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("no password given on standard input");
    }
    println!("{}", StaticOracle::password_hash(password));

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
