//! File-backed gallery store.
//!
//! Layout: `<root>/<gallery id>/` holding the media files plus a reserved
//! `metadata.json`. This is the only module that builds paths under the data
//! root; every id and filename passes [`is_safe_segment`] first.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::Utc;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{GalleryError, Result};
use crate::locks::GalleryLocks;
use crate::metadata::{self, GalleryMetadata, METADATA_FILE, TEMP_SUFFIX};
use crate::naming;
use crate::security::is_safe_segment;

/// One media file inside a gallery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryFile {
    pub filename: String,
    pub size: u64,
    pub content_type: &'static str,
}

/// A gallery as read back from disk.
#[derive(Debug, Clone)]
pub struct Gallery {
    pub id: String,
    /// Files sorted by name, without the metadata record.
    pub files: Vec<GalleryFile>,
    /// `None` while the gallery is still being written (or was left
    /// incomplete by a crash); readers should not present it as finished.
    pub metadata: Option<GalleryMetadata>,
}

impl Gallery {
    pub fn is_complete(&self) -> bool {
        self.metadata.is_some()
    }
}

/// A file ready to be served.
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    pub data: Vec<u8>,
    /// Name presented to the downloader, derived from gallery metadata.
    pub display_name: String,
    pub content_type: &'static str,
}

/// Every file of a gallery packed into one uncompressed tar archive.
#[derive(Debug, Clone)]
pub struct GalleryArchive {
    pub data: Vec<u8>,
    /// Download name, ending in `.tar`.
    pub file_name: String,
    pub entries: usize,
}

/// A file handed to [`GalleryStore::append_file`].
#[derive(Debug, Clone)]
pub struct IncomingFile<'a> {
    /// Name supplied by the client; only its extension is kept.
    pub original_name: &'a str,
    pub data: &'a [u8],
}

#[derive(Clone)]
pub struct GalleryStore {
    root: PathBuf,
    event_title: String,
    locks: GalleryLocks,
}

impl GalleryStore {
    /// Open (and create if missing) the data root.
    pub async fn open(root: impl Into<PathBuf>, event_title: impl Into<String>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;

        info!(path = %root.display(), "Gallery store initialized");

        Ok(Self {
            root,
            event_title: event_title.into(),
            locks: GalleryLocks::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn locks(&self) -> &GalleryLocks {
        &self.locks
    }

    pub async fn exists(&self, id: &str) -> Result<bool> {
        let dir = self.gallery_dir(id)?;
        match fs::metadata(&dir).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Create a new gallery from files already on disk.
    ///
    /// Steps run in order: directory, files (hard link, copy as fallback),
    /// metadata. A failure part way through is not rolled back.
    pub async fn create(
        &self,
        id: &str,
        initial_files: &[PathBuf],
        metadata: &GalleryMetadata,
    ) -> Result<Gallery> {
        let dir = self.gallery_dir(id)?;
        let mut names = Vec::with_capacity(initial_files.len());
        for source in initial_files {
            let name = source
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| GalleryError::InvalidPath(source.display().to_string()))?;
            names.push(checked_segment(name)?.to_string());
        }

        let _guard = self.locks.lock(id).await;

        match fs::create_dir(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(GalleryError::AlreadyExists(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        for (source, name) in initial_files.iter().zip(&names) {
            let target = dir.join(name);
            if let Err(e) = fs::hard_link(source, &target).await {
                debug!(error = %e, source = %source.display(), "Hard link failed, copying");
                fs::copy(source, &target).await?;
            }
        }

        metadata::write(&dir, metadata).await?;

        info!(gallery = %id, files = names.len(), "Gallery created");
        self.list(id).await
    }

    /// Add an uploaded file, creating the gallery on first use.
    ///
    /// Returns the store-generated filename. The metadata counter is bumped
    /// under the gallery's write lock.
    pub async fn append_file(&self, id: &str, file: IncomingFile<'_>) -> Result<String> {
        let dir = self.gallery_dir(id)?;

        let _guard = self.locks.lock(id).await;
        fs::create_dir_all(&dir).await?;

        let filename = naming::unique_filename(file.original_name);
        fs::write(dir.join(&filename), file.data).await?;

        let previous = match metadata::read(&dir).await {
            Ok(existing) => existing.map(|m| m.uploaded_files).unwrap_or(0),
            Err(e) => {
                warn!(gallery = %id, error = %e, "Unreadable metadata, resetting counter");
                0
            }
        };
        let updated = GalleryMetadata {
            timestamp: Utc::now(),
            event_title: self.event_title.clone(),
            uploaded_files: previous + 1,
            original_filename: None,
        };
        metadata::write(&dir, &updated).await?;

        debug!(gallery = %id, filename = %filename, size = file.data.len(), "Stored upload");
        Ok(filename)
    }

    /// Read a gallery's file list and metadata.
    pub async fn list(&self, id: &str) -> Result<Gallery> {
        let dir = self.existing_gallery_dir(id).await?;

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(GalleryError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name == METADATA_FILE || name.ends_with(TEMP_SUFFIX) {
                continue;
            }
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            files.push(GalleryFile {
                content_type: naming::content_type_for(&name),
                size: meta.len(),
                filename: name,
            });
        }
        files.sort_by(|a, b| a.filename.cmp(&b.filename));

        let metadata = match metadata::read(&dir).await {
            Ok(m) => m,
            Err(e) => {
                warn!(gallery = %id, error = %e, "Unreadable metadata");
                None
            }
        };

        Ok(Gallery {
            id: id.to_string(),
            files,
            metadata,
        })
    }

    /// Load a file for download, naming it after the gallery metadata.
    ///
    /// Missing or broken metadata falls back to the on-disk filename.
    pub async fn resolve_file(&self, id: &str, filename: &str) -> Result<ResolvedFile> {
        self.gallery_dir(id)?;
        let filename = checked_segment(filename)?;
        if filename == METADATA_FILE {
            return Err(GalleryError::NotFound(format!("{id}/{filename}")));
        }
        let dir = self.existing_gallery_dir(id).await?;

        let path = dir.join(filename);
        let is_file = match fs::metadata(&path).await {
            Ok(meta) => meta.is_file(),
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        if !is_file {
            return Err(GalleryError::NotFound(format!("{id}/{filename}")));
        }

        let display_name = match metadata::read(&dir).await {
            Ok(Some(meta)) => naming::display_filename(
                &meta.event_title,
                meta.timestamp,
                naming::extension(filename).unwrap_or("jpg"),
            ),
            Ok(None) => filename.to_string(),
            Err(e) => {
                warn!(
                    gallery = %id,
                    error = %e,
                    "Could not read metadata, using original filename"
                );
                filename.to_string()
            }
        };

        let data = fs::read(&path).await?;
        Ok(ResolvedFile {
            data,
            display_name,
            content_type: naming::content_type_for(filename),
        })
    }

    /// Pack every file of a gallery into a tar archive named after the event.
    ///
    /// The metadata record is left out. A gallery without files is NotFound.
    pub async fn archive(&self, id: &str) -> Result<GalleryArchive> {
        let gallery = self.list(id).await?;
        if gallery.files.is_empty() {
            return Err(GalleryError::NotFound(format!("{id}: no files")));
        }
        let dir = self.gallery_dir(id)?;

        let mut builder = tar::Builder::new(Vec::new());
        for file in &gallery.files {
            let path = dir.join(&file.filename);
            let mtime = fs::metadata(&path)
                .await?
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_secs());
            let data = fs::read(&path).await?;

            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(mtime);
            header.set_entry_type(tar::EntryType::Regular);
            builder.append_data(&mut header, &file.filename, data.as_slice())?;
        }
        let data = builder.into_inner()?;

        let base = match gallery.metadata.as_ref() {
            Some(meta) if !meta.event_title.trim().is_empty() => meta.event_title.clone(),
            _ => format!("gallery-{id}"),
        };

        debug!(gallery = %id, files = gallery.files.len(), bytes = data.len(), "Built archive");
        Ok(GalleryArchive {
            data,
            file_name: naming::archive_filename(&base),
            entries: gallery.files.len(),
        })
    }

    /// Ids of all galleries currently on disk, sorted.
    pub async fn gallery_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn gallery_dir(&self, id: &str) -> Result<PathBuf> {
        Ok(self.root.join(checked_segment(id)?))
    }

    /// Like [`gallery_dir`](Self::gallery_dir), but NotFound unless it is a directory.
    async fn existing_gallery_dir(&self, id: &str) -> Result<PathBuf> {
        let dir = self.gallery_dir(id)?;
        match fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(dir),
            Ok(_) => Err(GalleryError::NotFound(id.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(GalleryError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Guard plus the store's own rule that a segment must not alias its parent.
fn checked_segment(segment: &str) -> Result<&str> {
    if segment.is_empty() || segment == "." || !is_safe_segment(segment) {
        return Err(GalleryError::InvalidPath(segment.to_string()));
    }
    Ok(segment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Read;
    use tempfile::TempDir;

    async fn test_store() -> (GalleryStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = GalleryStore::open(dir.path().join("data"), "Test Event")
            .await
            .unwrap();
        (store, dir)
    }

    async fn write_source(dir: &TempDir, name: &str, body: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let (store, dir) = test_store().await;
        let photo = write_source(&dir, "IMG_0001.jpg", b"jpeg-bytes").await;
        let meta = GalleryMetadata::new("Test Event").with_original_filename("IMG_0001.jpg");

        let gallery = store.create("IMG_0001", &[photo], &meta).await.unwrap();
        assert!(gallery.is_complete());
        assert_eq!(gallery.files.len(), 1);
        assert_eq!(gallery.files[0].filename, "IMG_0001.jpg");
        assert_eq!(gallery.files[0].size, 10);
        assert!(store.exists("IMG_0001").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_existing_fails_and_leaves_contents() {
        let (store, dir) = test_store().await;
        let first = write_source(&dir, "a.jpg", b"first").await;
        let meta = GalleryMetadata::new("Test Event");
        store.create("abc", &[first], &meta).await.unwrap();

        let second = write_source(&dir, "b.jpg", b"second").await;
        let err = store.create("abc", &[second], &meta).await.unwrap_err();
        assert!(matches!(err, GalleryError::AlreadyExists(_)));

        let gallery = store.list("abc").await.unwrap();
        let names: Vec<_> = gallery.files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["a.jpg"]);
    }

    #[tokio::test]
    async fn test_list_missing_gallery() {
        let (store, _dir) = test_store().await;
        assert!(matches!(
            store.list("nope").await.unwrap_err(),
            GalleryError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_gallery_without_metadata_is_incomplete() {
        let (store, _dir) = test_store().await;
        fs::create_dir(store.root().join("half")).await.unwrap();
        fs::write(store.root().join("half/x.jpg"), b"x").await.unwrap();

        let gallery = store.list("half").await.unwrap();
        assert!(!gallery.is_complete());
        assert_eq!(gallery.files.len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_unsafe_segments() {
        let (store, _dir) = test_store().await;
        for id in ["..", "../x", "a/b", "a\\b", "", "."] {
            assert!(matches!(
                store.list(id).await.unwrap_err(),
                GalleryError::InvalidPath(_)
            ));
        }
        assert!(matches!(
            store.resolve_file("abc", "../secret").await.unwrap_err(),
            GalleryError::InvalidPath(_)
        ));
        let file = IncomingFile { original_name: "a.jpg", data: b"x" };
        assert!(matches!(
            store.append_file("..", file).await.unwrap_err(),
            GalleryError::InvalidPath(_)
        ));
    }

    #[tokio::test]
    async fn test_append_then_resolve_round_trip() {
        let (store, _dir) = test_store().await;
        let body: Vec<u8> = (0..=255u8).cycle().take(4096).collect();

        let filename = store
            .append_file("g1", IncomingFile { original_name: "photo.png", data: &body })
            .await
            .unwrap();
        assert!(filename.ends_with(".png"));

        let resolved = store.resolve_file("g1", &filename).await.unwrap();
        assert_eq!(resolved.data, body);
        assert_eq!(resolved.content_type, "image/png");
        assert!(resolved.display_name.starts_with("TestEvent_"));
    }

    #[tokio::test]
    async fn test_append_counts_uploads() {
        let (store, _dir) = test_store().await;
        let mut names = Vec::new();
        for _ in 0..3 {
            let file = IncomingFile { original_name: "same.jpg", data: b"x" };
            names.push(store.append_file("g2", file).await.unwrap());
        }
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 3);

        let gallery = store.list("g2").await.unwrap();
        assert_eq!(gallery.files.len(), 3);
        let meta = gallery.metadata.unwrap();
        assert_eq!(meta.uploaded_files, 3);
        assert_eq!(meta.event_title, "Test Event");
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_lose_updates() {
        let (store, _dir) = test_store().await;
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let file = IncomingFile { original_name: "burst.jpg", data: b"x" };
                store.append_file("burst", file).await.unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let meta = store.list("burst").await.unwrap().metadata.unwrap();
        assert_eq!(meta.uploaded_files, 16);
    }

    #[tokio::test]
    async fn test_resolve_uses_metadata_display_name() {
        let (store, _dir) = test_store().await;
        let gallery = store.root().join("abc");
        fs::create_dir(&gallery).await.unwrap();
        fs::write(gallery.join("photo.jpg"), b"jpeg").await.unwrap();
        let meta = GalleryMetadata {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap(),
            event_title: "My Event".into(),
            uploaded_files: 0,
            original_filename: None,
        };
        metadata::write(&gallery, &meta).await.unwrap();

        let resolved = store.resolve_file("abc", "photo.jpg").await.unwrap();
        assert_eq!(resolved.display_name, "MyEvent_20240315_103000.jpg");
        assert_eq!(resolved.data, b"jpeg");
    }

    #[tokio::test]
    async fn test_resolve_falls_back_without_metadata() {
        let (store, _dir) = test_store().await;
        let gallery = store.root().join("plain");
        fs::create_dir(&gallery).await.unwrap();
        fs::write(gallery.join("photo.jpg"), b"jpeg").await.unwrap();

        let resolved = store.resolve_file("plain", "photo.jpg").await.unwrap();
        assert_eq!(resolved.display_name, "photo.jpg");

        fs::write(gallery.join(METADATA_FILE), b"{not json").await.unwrap();
        let resolved = store.resolve_file("plain", "photo.jpg").await.unwrap();
        assert_eq!(resolved.display_name, "photo.jpg");
    }

    #[tokio::test]
    async fn test_resolve_missing_and_reserved() {
        let (store, _dir) = test_store().await;
        let file = IncomingFile { original_name: "a.jpg", data: b"x" };
        store.append_file("g", file).await.unwrap();

        for name in ["missing.jpg", METADATA_FILE] {
            assert!(matches!(
                store.resolve_file("g", name).await.unwrap_err(),
                GalleryError::NotFound(_)
            ));
        }
        assert!(matches!(
            store.resolve_file("nope", "a.jpg").await.unwrap_err(),
            GalleryError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_stray_file_in_root_is_not_a_gallery() {
        let (store, _dir) = test_store().await;
        fs::write(store.root().join(".DS_Store"), b"junk").await.unwrap();

        assert!(matches!(
            store.list(".DS_Store").await.unwrap_err(),
            GalleryError::NotFound(_)
        ));
        assert!(matches!(
            store.resolve_file(".DS_Store", "a.jpg").await.unwrap_err(),
            GalleryError::NotFound(_)
        ));
        assert!(matches!(
            store.archive(".DS_Store").await.unwrap_err(),
            GalleryError::NotFound(_)
        ));
    }

    fn archive_entries(data: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = tar::Archive::new(data);
        let entries = archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let path = entry.path().unwrap().to_string_lossy().into_owned();
                let mut body = Vec::new();
                entry.read_to_end(&mut body).unwrap();
                (path, body)
            })
            .collect();
        entries
    }

    #[tokio::test]
    async fn test_archive_contains_files_without_metadata() {
        let (store, _dir) = test_store().await;
        let mut names = Vec::new();
        for body in [b"one".as_slice(), b"two".as_slice()] {
            let file = IncomingFile { original_name: "p.jpg", data: body };
            names.push(store.append_file("g", file).await.unwrap());
        }
        names.sort();

        let archive = store.archive("g").await.unwrap();
        assert_eq!(archive.file_name, "Test_Event.tar");
        assert_eq!(archive.entries, 2);

        let entries = archive_entries(&archive.data);
        let paths: Vec<_> = entries.iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(paths, names);
        assert!(entries.iter().all(|(p, _)| p != METADATA_FILE));
        let mut bodies: Vec<_> = entries.into_iter().map(|(_, b)| b).collect();
        bodies.sort();
        assert_eq!(bodies, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[tokio::test]
    async fn test_archive_name_falls_back_to_gallery_id() {
        let (store, _dir) = test_store().await;
        let gallery = store.root().join("bare");
        fs::create_dir(&gallery).await.unwrap();
        fs::write(gallery.join("x.jpg"), b"x").await.unwrap();

        let archive = store.archive("bare").await.unwrap();
        assert_eq!(archive.file_name, "gallery-bare.tar");
        assert_eq!(archive_entries(&archive.data).len(), 1);
    }

    #[tokio::test]
    async fn test_archive_empty_or_missing_gallery() {
        let (store, _dir) = test_store().await;
        store
            .create("empty", &[], &GalleryMetadata::new("Test Event"))
            .await
            .unwrap();

        for id in ["empty", "nope"] {
            assert!(matches!(
                store.archive(id).await.unwrap_err(),
                GalleryError::NotFound(_)
            ));
        }
        assert!(matches!(
            store.archive("..").await.unwrap_err(),
            GalleryError::InvalidPath(_)
        ));
    }

    #[tokio::test]
    async fn test_gallery_ids() {
        let (store, _dir) = test_store().await;
        for id in ["b", "a"] {
            let file = IncomingFile { original_name: "x.jpg", data: b"x" };
            store.append_file(id, file).await.unwrap();
        }
        assert_eq!(store.gallery_ids().await.unwrap(), vec!["a", "b"]);
    }
}
