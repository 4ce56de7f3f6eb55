use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use texgen_client::config::ClientConfig;

mod cli;
mod commands;
mod printer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "texgen=info,texgen_client=info".into());
    let json = std::env::var("TEXGEN_LOG_JSON")
        .is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let cli = cli::Cli::parse();

    // --- Configuration ---
    let config = ClientConfig::from_env()?;
    tracing::info!(api_url = %config.api_url, plan = %config.plan, "Loaded client configuration");

    commands::run(cli.command, config).await
}
