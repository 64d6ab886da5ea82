pub mod cli;
pub mod config;
pub mod credentials;
pub mod db;
pub mod entities;
pub mod mail;
pub mod services;
pub mod validation;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
pub use config::Config;
use credentials::CredentialAuthority;
use db::Store;
use mail::Mailer;
use services::SeaOrmAccountService;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Open the store, apply migrations and wire the account service.
pub async fn build_account_service(
    config: &Config,
    mailer: Arc<dyn Mailer>,
) -> anyhow::Result<SeaOrmAccountService> {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await
    .context("Failed to open database")?;

    let authority =
        CredentialAuthority::new(&config.security).context("Invalid security configuration")?;

    Ok(SeaOrmAccountService::new(store, authority, mailer))
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = cli::Cli::parse();

    init_tracing(&config.general.log_level);
    config.validate()?;

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        debug!("Prometheus metrics recorder initialized");
        Some(handle)
    } else {
        None
    };

    let Some(command) = cli.command else {
        use clap::CommandFactory;
        cli::Cli::command().print_help()?;
        return Ok(());
    };

    if matches!(command, cli::Commands::Init) {
        if Config::create_default_if_missing()? {
            println!("Created config.toml");
        } else {
            println!("config.toml already exists");
        }
        return Ok(());
    }

    info!("latchkey v{} starting", env!("CARGO_PKG_VERSION"));

    let mailer = mail::mailer_from_config(&config.mail);
    let accounts = build_account_service(&config, mailer).await?;

    let result = cli::dispatch(&accounts, command).await;

    if let Some(handle) = prometheus_handle {
        debug!(metrics = %handle.render(), "Account counters");
    }

    result
}
