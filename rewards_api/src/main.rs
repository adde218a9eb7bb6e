//! CurrentX rewards API server

use anyhow::{Context, Result};
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, warn};

use currentx_rewards_api::{
    build_router,
    config::Config,
    store::{KvStore, MemoryStore, RedisStore, RedisStoreConfig},
    tracing_logger::TracingLogger,
    AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    TracingLogger::init_subscriber();

    let config = Config::from_env().context("invalid configuration")?;
    info!(
        whitelist_season = ?config.rewards.season_id,
        points_season = ?config.points.season_id,
        key_prefix = %config.server.key_prefix,
        "Configuration loaded"
    );

    let store: Arc<dyn KvStore> = match config.server.redis_url.clone() {
        Some(redis_url) => {
            let store = RedisStore::connect(RedisStoreConfig {
                redis_url,
                ..RedisStoreConfig::default()
            })
            .await
            .context("failed to connect to Redis")?;
            Arc::new(store)
        }
        None => {
            warn!("REDIS_URL not set; using in-process memory store (data is lost on restart)");
            Arc::new(MemoryStore::new())
        }
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid SERVER_HOST/SERVER_PORT")?;

    let state = AppState::new(config, store).context("failed to register metrics")?;
    let app = build_router(state);

    info!("Rewards API listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let std_listener = listener.into_std()?;

    axum::Server::from_tcp(std_listener)?
        .tcp_nodelay(true)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Rewards API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
