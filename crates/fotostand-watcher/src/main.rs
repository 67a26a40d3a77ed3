//! # fotostand-watcher
//!
//! Watches the booth camera's output directory and creates one gallery per
//! new photo. Each created gallery is printed as a single
//! `FOTOSTAND_OUTPUT: {json}` line so other tooling (receipt printers,
//! displays) can pick it up.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use fotostand_core::{Config, GalleryStore, IdAllocator, IdMode, Watcher, WordList};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Turn photos dropped into the input directory into galleries.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Gallery id for the next new photo (hybrid mode); later photos get random ids.
    #[arg(long)]
    id: Option<String>,

    /// Id strategy: derived, random or hybrid. Overrides ID_MODE.
    #[arg(long)]
    mode: Option<IdMode>,

    /// Directory to watch. Overrides INPUT_DIR.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Gallery data root. Overrides DATA_DIR.
    #[arg(long)]
    data: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(mode) = self.mode {
            config.id_mode = mode;
        }
        if let Some(input) = &self.input {
            config.input_dir = input.clone();
        }
        if let Some(data) = &self.data {
            config.data_dir = data.clone();
        }
        if self.id.is_some() && config.id_mode != IdMode::Hybrid {
            tracing::warn!(mode = %config.id_mode, "--id is only used in hybrid mode");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,fotostand_watcher=debug,fotostand_core=debug")
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    cli.apply(&mut config);
    info!(?config, "Loaded configuration");

    let store = GalleryStore::open(&config.data_dir, &config.event_title).await?;
    let words = Arc::new(WordList::from_config(&config).await?);
    info!(words = words.len(), mode = %config.id_mode, "Id allocator ready");

    let allocator = IdAllocator::from_config(store.clone(), words, &config);
    let watcher = Watcher::new(&config, allocator, store).with_external_id(cli.id.clone());

    let (tx, mut rx) = mpsc::channel(32);
    let mut watch_task = tokio::spawn(watcher.run(tx));

    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                println!("FOTOSTAND_OUTPUT: {}", serde_json::to_string(&event)?);
            }
            result = &mut watch_task => {
                result??;
                return Ok(());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "fotostand-watcher",
            "--mode",
            "derived",
            "--input",
            "/tmp/in",
            "--data",
            "/tmp/data",
        ]);
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.id_mode, IdMode::Derived);
        assert_eq!(config.input_dir, PathBuf::from("/tmp/in"));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/data"));
    }

    #[test]
    fn test_cli_defaults_keep_config() {
        let cli = Cli::parse_from(["fotostand-watcher", "--id", "table-7"]);
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.id_mode, IdMode::Hybrid);
        assert_eq!(cli.id.as_deref(), Some("table-7"));
    }

    #[test]
    fn test_cli_rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["fotostand-watcher", "--mode", "sometimes"]).is_err());
    }
}
