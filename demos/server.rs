//! Example server: loads entities from CONFIG_PATH, picks PostgreSQL when DATABASE_URL is set
//! (in-memory store otherwise), and mounts common routes plus CRUD routes for every entity.

use crud_scaffold::{
    app_router, apply_migrations, ensure_database_exists, load_from_path, logging, resolve, resource_routes,
    AppState, MemoryStore, PgStore, Settings, Store,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let settings = Settings::from_env()?;
    let _log_guard = logging::init(&settings)?;

    let config = load_from_path(&settings.config_path, settings.db_schema.clone()).await?;
    let model = resolve(&config)?;

    let store: Arc<dyn Store> = match &settings.database_url {
        Some(url) => {
            ensure_database_exists(url).await?;
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await?;
            apply_migrations(&pool, &model).await?;
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let bind_addr = settings.bind_addr.clone();
    let state = AppState::new(store, model, settings);
    let api = resource_routes(&state)?;
    let app = app_router(state, api);

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
