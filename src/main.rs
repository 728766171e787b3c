use std::sync::Arc;

use chalkboard::config::Config;
use chalkboard::db;
use chalkboard::routes;
use chalkboard::state::AppState;
use chalkboard::store::{MemoryStore, PgSnapshotStore, SnapshotStore};

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("database init failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("server failed: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();

    let store: Arc<dyn SnapshotStore> = match &config.database_url {
        Some(url) => {
            let pool = db::init_pool(url, config.database_max_connections).await?;
            Arc::new(PgSnapshotStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; snapshots are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let port = config.port;
    let app = routes::app(AppState::new(store, config));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;

    tracing::info!(%port, "chalkboard relay listening");
    axum::serve(listener, app).await?;
    Ok(())
}
