//! The per-gallery `metadata.json` record.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::fs;
use uuid::Uuid;

use crate::error::Result;

/// Reserved filename inside every gallery directory.
pub const METADATA_FILE: &str = "metadata.json";

/// Suffix of in-flight metadata writes; listing skips these.
pub(crate) const TEMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryMetadata {
    /// Creation time, or time of the most recent upload.
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    /// Snapshot of the configured event title.
    pub event_title: String,
    /// Number of files added through the upload gateway.
    #[serde(default)]
    pub uploaded_files: u64,
    /// Name of the input photo for watcher-created galleries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
}

impl GalleryMetadata {
    pub fn new(event_title: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event_title: event_title.into(),
            uploaded_files: 0,
            original_filename: None,
        }
    }

    pub fn with_original_filename(mut self, filename: impl Into<String>) -> Self {
        self.original_filename = Some(filename.into());
        self
    }

    /// The timestamp as written to disk, e.g. `2024-03-15T10:30:00.000Z`.
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Read `metadata.json` from a gallery directory.
///
/// A missing file is `Ok(None)`; unreadable or malformed content is an error.
pub(crate) async fn read(dir: &Path) -> Result<Option<GalleryMetadata>> {
    match fs::read(dir.join(METADATA_FILE)).await {
        Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Replace `metadata.json` atomically (write a temp file, then rename).
pub(crate) async fn write(dir: &Path, metadata: &GalleryMetadata) -> Result<()> {
    let body = serde_json::to_vec_pretty(metadata)?;
    let tmp = dir.join(format!(".{}.{}{}", METADATA_FILE, Uuid::new_v4(), TEMP_SUFFIX));

    fs::write(&tmp, &body).await?;
    if let Err(e) = fs::rename(&tmp, dir.join(METADATA_FILE)).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
mod iso_millis {
    use super::*;

    pub fn serialize<S>(ts: &DateTime<Utc>, s: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(d: D) -> std::result::Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_wire_format() {
        let meta = GalleryMetadata {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap(),
            event_title: "My Event".into(),
            uploaded_files: 2,
            original_filename: None,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["timestamp"], "2024-03-15T10:30:00.000Z");
        assert_eq!(json["eventTitle"], "My Event");
        assert_eq!(json["uploadedFiles"], 2);
        assert!(json.get("originalFilename").is_none());
    }

    #[test]
    fn test_parses_watcher_metadata_without_counter() {
        let raw = r#"{
            "originalFilename": "IMG_0001.jpg",
            "timestamp": "2024-03-15T10:30:00.000Z",
            "eventTitle": "Booth"
        }"#;
        let meta: GalleryMetadata = serde_json::from_str(raw).unwrap();
        assert_eq!(meta.uploaded_files, 0);
        assert_eq!(meta.original_filename.as_deref(), Some("IMG_0001.jpg"));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        assert!(read(dir.path()).await.unwrap().is_none());

        let meta = GalleryMetadata::new("Booth").with_original_filename("a.jpg");
        write(dir.path(), &meta).await.unwrap();

        let loaded = read(dir.path()).await.unwrap().unwrap();
        assert_eq!(loaded.event_title, "Booth");
        assert_eq!(loaded.original_filename.as_deref(), Some("a.jpg"));

        let mut names = Vec::new();
        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec![METADATA_FILE.to_string()]);
    }
}
