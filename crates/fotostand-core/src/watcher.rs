//! Ingestion watcher: polls the input directory and turns each new photo
//! into its own gallery.
//!
//! Files already present when the watcher starts are ignored. A photo that
//! fails (id taken, I/O error) is logged and not retried.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;
use tokio::fs;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::allocator::IdAllocator;
use crate::config::{Config, IdMode};
use crate::error::{GalleryError, Result};
use crate::metadata::GalleryMetadata;
use crate::naming;
use crate::store::{Gallery, GalleryStore};

/// Emitted once per gallery the watcher creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryCreated {
    pub id: String,
    pub url: String,
    pub photo_count: usize,
    pub timestamp: String,
    pub original_filename: String,
}

pub struct Watcher {
    config: Config,
    external_id: Option<String>,
    allocator: IdAllocator,
    store: GalleryStore,
    seen: HashSet<String>,
}

impl Watcher {
    pub fn new(config: &Config, allocator: IdAllocator, store: GalleryStore) -> Self {
        Self {
            config: config.clone(),
            external_id: None,
            allocator,
            store,
            seen: HashSet::new(),
        }
    }

    /// Id used for the next new photo (hybrid mode); later photos get random ids.
    pub fn with_external_id(mut self, id: Option<String>) -> Self {
        self.external_id = id;
        self
    }

    /// Mark everything currently in the input directory as processed.
    pub async fn prime(&mut self) -> Result<usize> {
        let existing = self.scan().await?;
        let count = existing.len();
        self.seen.extend(existing);
        Ok(count)
    }

    /// Photo filenames in the input directory, sorted.
    async fn scan(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.config.input_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if naming::photo_stem(name).is_some() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Process photos that appeared since the last call.
    pub async fn poll_once(&mut self) -> Result<Vec<GalleryCreated>> {
        let mut created = Vec::new();
        for filename in self.scan().await? {
            if self.seen.contains(&filename) {
                continue;
            }
            info!(file = %filename, "New photo detected");
            match self.process_photo(&filename).await {
                Ok(event) => created.push(event),
                Err(e) => warn!(file = %filename, error = %e, "Skipping photo"),
            }
            self.seen.insert(filename);
        }
        Ok(created)
    }

    /// Allocate an id for one photo and materialize its gallery.
    ///
    /// Consumes the external id, if one is still pending.
    pub async fn process_photo(&mut self, filename: &str) -> Result<GalleryCreated> {
        let external_id = self.external_id.take();
        let id = self.allocator.allocate(filename, external_id.as_deref()).await?;
        debug!(gallery = %id, file = %filename, "Allocated gallery id");

        let metadata =
            GalleryMetadata::new(self.config.event_title.clone()).with_original_filename(filename);
        let source = self.config.input_dir.join(filename);
        let (id, gallery) = self.create_gallery(id, filename, source, &metadata).await?;

        let event = GalleryCreated {
            url: self.config.gallery_url(&id),
            photo_count: gallery.files.len(),
            timestamp: metadata.timestamp_iso(),
            original_filename: filename.to_string(),
            id,
        };
        info!(gallery = %event.id, url = %event.url, "Created gallery");
        Ok(event)
    }

    /// Create the gallery under `id`. Outside derived mode an id claimed
    /// since allocation is replaced by one fresh random id.
    async fn create_gallery(
        &self,
        id: String,
        filename: &str,
        source: PathBuf,
        metadata: &GalleryMetadata,
    ) -> Result<(String, Gallery)> {
        let sources = [source];
        match self.store.create(&id, &sources, metadata).await {
            Ok(gallery) => Ok((id, gallery)),
            Err(GalleryError::AlreadyExists(taken)) if self.allocator.mode() != IdMode::Derived => {
                let retry = self.allocator.allocate(filename, None).await?;
                warn!(
                    taken = %taken,
                    gallery = %retry,
                    file = %filename,
                    "Id claimed concurrently, retrying"
                );
                let gallery = self.store.create(&retry, &sources, metadata).await?;
                Ok((retry, gallery))
            }
            Err(e) => Err(e),
        }
    }

    /// Poll forever, sending each created gallery to `events`.
    ///
    /// Returns once the receiving side is dropped.
    pub async fn run(mut self, events: mpsc::Sender<GalleryCreated>) -> Result<()> {
        let skipped = self.prime().await?;
        info!(
            input = %self.config.input_dir.display(),
            existing = skipped,
            mode = %self.allocator.mode(),
            "Watching for new photos"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);
        loop {
            interval.tick().await;
            let created = match self.poll_once().await {
                Ok(created) => created,
                Err(e) => {
                    warn!(error = %e, "Failed to scan input directory");
                    continue;
                }
            };
            for event in created {
                if events.send(event).await.is_err() {
                    debug!("Event receiver dropped, stopping watcher");
                    return Ok(());
                }
            }
        }
    }
}
