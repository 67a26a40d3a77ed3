//! Configuration loaded from environment variables.
//!
//! All settings have defaults so both binaries start with zero
//! configuration for local testing. The resulting [`Config`] is built once
//! and handed to each component at construction time.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Maximum accepted upload size (50 MiB).
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

/// MIME types the upload gateway accepts.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/heic",
    "image/heif",
    "video/mp4",
];

/// How the allocator picks gallery identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdMode {
    /// Use the photo's filename without its extension.
    Derived,
    /// Three random words joined with `-`.
    Random,
    /// Use an externally supplied id when present, otherwise random.
    #[default]
    Hybrid,
}

impl FromStr for IdMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "derived" | "filename" => Ok(Self::Derived),
            "random" | "auto" => Ok(Self::Random),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown id mode: {other}")),
        }
    }
}

impl fmt::Display for IdMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Derived => "derived",
            Self::Random => "random",
            Self::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

/// Size and type constraints applied to uploads.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub max_size: usize,
    pub allowed_mime_types: Vec<String>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_size: MAX_UPLOAD_SIZE,
            allowed_mime_types: ALLOWED_MIME_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl UploadLimits {
    pub fn allows(&self, mime: &str) -> bool {
        self.allowed_mime_types.iter().any(|m| m == mime)
    }
}

/// Photo booth configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Event name shown in galleries and baked into download filenames.
    /// Env: `EVENT_TITLE`
    pub event_title: String,

    /// Public base URL used to build gallery links.
    /// Env: `BASE_URL`
    pub base_url: String,

    /// Socket address for the HTTP server.
    /// Env: `HTTP_ADDR`
    pub http_addr: SocketAddr,

    /// Root directory holding one sub-directory per gallery.
    /// Env: `DATA_DIR`
    pub data_dir: PathBuf,

    /// Directory the watcher polls for new photos.
    /// Env: `INPUT_DIR`
    pub input_dir: PathBuf,

    /// Hex-encoded SHA-256 of the upload bearer token.
    /// Env: `UPLOAD_TOKEN_HASH`
    /// Default: unset (uploads disabled).
    pub upload_token_hash: Option<String>,

    /// Env: `ID_MODE` (derived / random / hybrid)
    pub id_mode: IdMode,

    /// Newline separated word list for random ids.
    /// Env: `WORD_LIST_PATH`
    /// Default: unset (built-in list).
    pub word_list_path: Option<PathBuf>,

    /// Upper bound on random id draws before giving up.
    /// Env: `MAX_ID_ATTEMPTS`
    pub max_id_attempts: usize,

    /// Env: `POLL_INTERVAL_MS`
    pub poll_interval: Duration,

    pub upload_limits: UploadLimits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            event_title: "Photo Booth".to_string(),
            base_url: "http://localhost:8080".to_string(),
            http_addr: ([0, 0, 0, 0], 8080).into(),
            data_dir: PathBuf::from("./data"),
            input_dir: PathBuf::from("./input"),
            upload_token_hash: None,
            id_mode: IdMode::default(),
            word_list_path: None,
            max_id_attempts: 100,
            poll_interval: Duration::from_millis(500),
            upload_limits: UploadLimits::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(title) = lookup("EVENT_TITLE") {
            config.event_title = title;
        }

        if let Some(url) = lookup("BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }

        if let Some(addr) = lookup("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(path) = lookup("DATA_DIR") {
            config.data_dir = PathBuf::from(path);
        }

        if let Some(path) = lookup("INPUT_DIR") {
            config.input_dir = PathBuf::from(path);
        }

        if let Some(hash) = lookup("UPLOAD_TOKEN_HASH") {
            let hash = hash.trim();
            if !hash.is_empty() {
                config.upload_token_hash = Some(hash.to_string());
            }
        }

        if let Some(mode) = lookup("ID_MODE") {
            match mode.parse::<IdMode>() {
                Ok(parsed) => config.id_mode = parsed,
                Err(e) => tracing::warn!(error = %e, "Invalid ID_MODE, using default"),
            }
        }

        if let Some(path) = lookup("WORD_LIST_PATH") {
            if !path.is_empty() {
                config.word_list_path = Some(PathBuf::from(path));
            }
        }

        if let Some(val) = lookup("MAX_ID_ATTEMPTS") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_id_attempts = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_ID_ATTEMPTS, using default"),
            }
        }

        if let Some(val) = lookup("POLL_INTERVAL_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.poll_interval = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "Invalid POLL_INTERVAL_MS, using default"),
            }
        }

        config
    }

    /// Public link to a gallery page.
    pub fn gallery_url(&self, id: &str) -> String {
        format!("{}/gallery/{}", self.base_url, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.id_mode, IdMode::Hybrid);
        assert!(config.upload_token_hash.is_none());
        assert_eq!(config.upload_limits.max_size, 50 * 1024 * 1024);
    }

    #[test]
    fn test_overrides() {
        let config = from_map(&[
            ("EVENT_TITLE", "Winterball"),
            ("BASE_URL", "https://fotos.example.com/"),
            ("ID_MODE", "derived"),
            ("UPLOAD_TOKEN_HASH", "  abcd  "),
            ("POLL_INTERVAL_MS", "250"),
        ]);
        assert_eq!(config.event_title, "Winterball");
        assert_eq!(config.gallery_url("abc"), "https://fotos.example.com/gallery/abc");
        assert_eq!(config.id_mode, IdMode::Derived);
        assert_eq!(config.upload_token_hash.as_deref(), Some("abcd"));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = from_map(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("ID_MODE", "sometimes"),
            ("MAX_ID_ATTEMPTS", "0"),
            ("UPLOAD_TOKEN_HASH", ""),
        ]);
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.id_mode, IdMode::Hybrid);
        assert_eq!(config.max_id_attempts, 100);
        assert!(config.upload_token_hash.is_none());
    }

    #[test]
    fn test_upload_limits_allow_list() {
        let limits = UploadLimits::default();
        assert!(limits.allows("image/jpeg"));
        assert!(limits.allows("video/mp4"));
        assert!(!limits.allows("image/gif"));
        assert!(!limits.allows("application/octet-stream"));
    }
}
