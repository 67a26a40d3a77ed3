//! # fotostand-server
//!
//! HTTP front end for the photo booth galleries:
//! - **Gallery listing** (`/api/gallery/{id}`) for rendering
//! - **Image download** (`/img/{id}/{file}`) with event-based filenames
//! - **Authenticated upload** (`/api/upload/{id}`) for extra photos
//!
//! All reads and writes go through the gallery store in `fotostand-core`.

mod api;
mod error;

use std::time::Duration;

use fotostand_core::{Config, GalleryStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,fotostand_server=debug,fotostand_core=debug")
            }),
        )
        .init();

    info!("Starting Fotostand server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();
    info!(?config, "Loaded configuration");
    info!(
        event = %config.event_title,
        data_dir = %config.data_dir.display(),
        uploads_enabled = config.upload_token_hash.is_some(),
        "Event settings"
    );

    let store = GalleryStore::open(&config.data_dir, &config.event_title).await?;

    // Evict idle per-gallery write locks every 5 minutes.
    let locks = store.locks().clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            locks.purge_idle().await;
        }
    });

    let http_addr = config.http_addr;
    let app_state = AppState::new(store, config);

    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
