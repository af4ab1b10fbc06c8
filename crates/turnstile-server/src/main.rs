//! Standalone Turnstile server.
//!
//! Configured through `TURNSTILE_*` environment variables (see
//! [`ServerConfig::from_env`]) and `RUST_LOG` for log filtering. Runs
//! with the demo user table until interrupted with Ctrl-C.

use tracing_subscriber::EnvFilter;
use turnstile::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!(
        bind = %config.bind_addr,
        expire_secs = config.session.expire_duration.as_secs(),
        "starting"
    );

    let server = TurnstileServer::builder()
        .config(config)
        .directory(StaticDirectory::demo())
        .build()
        .await?;
    tracing::info!(addr = %server.local_addr()?, "listening");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}
