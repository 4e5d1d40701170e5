use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use kiosk_db::Database;
use kiosk_engine::{Engine, EngineConfig, run_sweep_loop};
use kiosk_server::config::Config;
use kiosk_server::{AppStateInner, app};

const DEFAULT_LOG_FILTER: &str =
    "kiosk=debug,kiosk_server=info,kiosk_engine=debug,kiosk_db=info,tower_http=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path, config.owner)?);

    let engine = Engine::new(
        db,
        EngineConfig {
            session_ttl: config.session_ttl,
            bot_username: config.bot_username.clone(),
        },
    );

    // Drop idle conversations in the background
    tokio::spawn(run_sweep_loop(engine.sessions(), config.sweep_secs));

    let state = Arc::new(AppStateInner {
        engine,
        bridge_secret: config.bridge_secret.clone(),
    });

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Kiosk server listening on {} (owner {})", addr, config.owner);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
