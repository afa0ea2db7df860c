use dotenvy::dotenv;
use std::sync::Arc;

use roteiro::{
    app::{create_router, AppState},
    config::Config,
    database::{create_database_pool, run_migrations},
    store::PgStore,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    let config = Config::from_env()?;

    let db = create_database_pool(&config.database_url).await?;
    run_migrations(&db).await?;

    tokio::fs::create_dir_all(&config.uploads_dir).await?;

    let state = AppState::new(
        Arc::new(PgStore::new(db)),
        config.uploads_dir.clone(),
        config.secure_cookies,
    );
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    log::info!("Roteiro server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
