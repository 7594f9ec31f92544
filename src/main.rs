mod auth;
mod config;
mod console;
mod error;
mod flows;
mod grading;
mod session;
mod stream;
mod transport;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::load()?;

    let api = Arc::new(transport::HttpApi::new(&config)?);
    if let Some(ctx) = auth::load(&config.data_dir).await {
        info!("Signed in as {}", ctx.name);
        api.set_auth(ctx);
    }

    let flow = std::env::args().nth(1).unwrap_or_else(|| "rag".into());

    tokio::select! {
        result = console::run(&config, api, &flow) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    Ok(())
}
