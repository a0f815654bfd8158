//! sticky-wall - anonymous collaborative sticky-note wall service
//!
//! Serves the public wall API (submit, list, region query, flag), the
//! moderation endpoints, and the uploaded note images.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sticky_common::config::{CliOverrides, WallConfig};
use sticky_wall::services::{
    DataUriImageStore, HttpVisionBackend, ImageStore, LocalImageStore, VisionBackend,
};
use sticky_wall::AppState;

#[derive(Debug, Parser)]
#[command(name = "sticky-wall", about = "Anonymous collaborative sticky-note wall")]
struct Args {
    /// Path to a TOML config file
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Address to bind, e.g. 127.0.0.1:5850
    #[arg(long)]
    bind: Option<String>,

    /// Root folder for the database and uploaded images
    #[arg(long)]
    data_dir: Option<std::path::PathBuf>,

    /// Local development mode (admin endpoints are not credential-gated)
    #[arg(long)]
    local_dev: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let config = WallConfig::load(&CliOverrides {
        config: args.config,
        bind: args.bind,
        data_dir: args.data_dir,
        local_dev: args.local_dev,
    })?;

    info!("Starting sticky-wall");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Data dir: {}", config.data_dir.display());
    info!("Rate limit strategy: {}", config.rate_limit.strategy.as_str());
    if config.local_dev {
        info!("Local development mode: admin endpoints are OPEN");
    }

    let db_path = config.db_path();
    let db = sticky_wall::db::init_database_pool(&db_path).await?;
    info!("Database: {}", db_path.display());

    let image_store: Arc<dyn ImageStore> = if config.inline_images {
        info!("Image store: inline data URIs (degraded/dev mode)");
        Arc::new(DataUriImageStore)
    } else {
        info!("Image store: {}", config.uploads_dir().display());
        Arc::new(LocalImageStore::new(
            config.uploads_dir(),
            "/uploads".to_string(),
        ))
    };

    let vision_backend: Option<Arc<dyn VisionBackend>> =
        match (&config.moderation.endpoint, &config.moderation.api_key) {
            (Some(endpoint), Some(api_key)) => {
                info!("Moderation backend: {} ({})", endpoint, config.moderation.model);
                Some(Arc::new(HttpVisionBackend::new(
                    endpoint.clone(),
                    api_key.clone(),
                    config.moderation.model.clone(),
                    config.moderation.timeout_secs,
                )?))
            }
            _ => None,
        };

    let uploads_dir = config.uploads_dir();
    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(db, config, image_store, vision_backend);

    let app = sticky_wall::build_router(state)
        .nest_service("/uploads", ServeDir::new(uploads_dir));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
