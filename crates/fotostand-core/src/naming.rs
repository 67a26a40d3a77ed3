//! Filename helpers: upload names, download display names, photo detection.

use std::path::Path;

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Extensions the watcher treats as photos.
pub const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "heic", "heif"];

const FALLBACK_EXTENSION: &str = "jpg";
const SUFFIX_LEN: usize = 12;

/// The extension of `filename`, if it has one made of ASCII alphanumerics.
pub fn extension(filename: &str) -> Option<&str> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Returns the filename without its extension if it is a known photo type.
pub fn photo_stem(filename: &str) -> Option<&str> {
    let ext = extension(filename)?;
    if !PHOTO_EXTENSIONS.iter().any(|p| p.eq_ignore_ascii_case(ext)) {
        return None;
    }
    let stem = filename.strip_suffix(ext)?.strip_suffix('.')?;
    (!stem.is_empty()).then_some(stem)
}

/// Store-side name for an uploaded file: `<unix-millis>_<random>.<ext>`.
///
/// The extension is taken from the client-supplied name, falling back to
/// `jpg`; anything but ASCII alphanumerics disqualifies it.
pub fn unique_filename(original: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect();
    let ext = extension(original).unwrap_or(FALLBACK_EXTENSION);
    format!("{}_{}.{}", Utc::now().timestamp_millis(), suffix, ext)
}

/// Download name built from gallery metadata: `<Title>_<YYYYMMDD_HHMMSS>.<ext>`.
///
/// Whitespace and anything outside `[A-Za-z0-9]` is removed from the title.
pub fn display_filename(event_title: &str, timestamp: DateTime<Utc>, extension: &str) -> String {
    let title: String = event_title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    format!("{}_{}.{}", title, timestamp.format("%Y%m%d_%H%M%S"), extension)
}

/// `<base>.tar`, with each run of characters outside `[A-Za-z0-9._-]`
/// collapsed into a single `_`.
pub fn archive_filename(base: &str) -> String {
    let mut name = String::with_capacity(base.len() + 4);
    let mut in_run = false;
    for c in base.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            name.push(c);
            in_run = false;
        } else if !in_run {
            name.push('_');
            in_run = true;
        }
    }
    name.push_str(".tar");
    name
}

/// Content type served for a stored file, by extension.
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = extension(filename).map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        Some("heif") => "image/heif",
        Some("mp4") => "video/mp4",
        _ => "image/jpeg",
    }
}
