use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use watchparty::prelude::*;

mod config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,watchparty=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;
    tracing::info!(
        ws = %config.ws_addr,
        http = %config.http_addr,
        max_participants = config.room.max_participants,
        "starting watch-party server"
    );

    let server = WatchPartyServer::builder()
        .bind(&config.ws_addr)
        .http_bind(&config.http_addr)
        .room_config(config.room)
        .build()
        .await?;
    let registry = server.registry();

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            registry.shutdown().await;
        }
    }
    Ok(())
}
