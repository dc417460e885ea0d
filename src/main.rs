use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod completion;
mod config;
mod constant;
mod dispatch;
mod error;
mod handler;
mod lifecycle;
mod util;

use config::{Args, Configuration};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the environment may already be set.
    dotenvy::dotenv().ok();
    init_tracing()?;

    let config = Configuration::from_args(Args::parse())?;
    tracing::debug!(?config, "configuration loaded");

    if let Err(err) = lifecycle::run(config).await {
        tracing::error!(error = %err, "gptcord stopped");
        return Err(err.into());
    }

    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,gptcord=debug"));
    let log_format = std::env::var("LOG_FORMAT")
        .unwrap_or_else(|_| "pretty".to_string())
        .to_ascii_lowercase();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);
    match log_format.as_str() {
        "json" => builder.json().flatten_event(true).init(),
        "pretty" => builder.pretty().init(),
        "compact" => builder.compact().init(),
        other => {
            anyhow::bail!("unsupported LOG_FORMAT={other:?}; expected one of: json, pretty, compact")
        }
    }

    Ok(())
}
