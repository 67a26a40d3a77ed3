//! Gallery identifier allocation.
//!
//! Three strategies, picked per deployment through [`IdMode`]:
//! - **Derived**: the photo's filename minus its extension. An id that is
//!   already taken is rejected, never merged.
//! - **Random**: three words drawn with replacement from a word list, joined
//!   with `-`, redrawn on collision up to a fixed number of attempts.
//! - **Hybrid**: an externally supplied id if there is one, else Random.
//!
//! Every returned id has been checked against the store at allocation time.

use std::path::Path;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use crate::config::{Config, IdMode};
use crate::error::{GalleryError, Result};
use crate::naming;
use crate::security::is_safe_segment;
use crate::store::GalleryStore;

const BUILTIN_WORDS: &str = include_str!("words.txt");
const SEPARATOR: &str = "-";

/// Words used for random three-word codes, lower-cased.
#[derive(Debug, Clone)]
pub struct WordList {
    words: Vec<String>,
}

impl WordList {
    /// The list bundled with the crate.
    pub fn builtin() -> Self {
        Self {
            words: collect_words(BUILTIN_WORDS),
        }
    }

    /// One word per line. Blank lines and words that would not be safe
    /// path segments are skipped.
    pub fn parse(raw: &str) -> Result<Self> {
        let words = collect_words(raw);
        if words.is_empty() {
            return Err(GalleryError::WordList("word list is empty".into()));
        }
        Ok(Self { words })
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::parse(&raw)
    }

    /// Use `WORD_LIST_PATH` if configured, the bundled list otherwise.
    pub async fn from_config(config: &Config) -> Result<Self> {
        match &config.word_list_path {
            Some(path) => Self::load(path).await,
            None => Ok(Self::builtin()),
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Three independent uniform draws joined with `-`.
    pub fn three_words<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let mut picks = Vec::with_capacity(3);
        for _ in 0..3 {
            if let Some(word) = self.words.choose(rng) {
                picks.push(word.as_str());
            }
        }
        picks.join(SEPARATOR)
    }
}

fn collect_words(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|line| line.trim().to_lowercase())
        .filter(|w| !w.is_empty() && !w.contains(SEPARATOR) && is_safe_segment(w))
        .collect()
}

#[derive(Clone)]
pub struct IdAllocator {
    store: GalleryStore,
    words: Arc<WordList>,
    mode: IdMode,
    max_attempts: usize,
}

impl IdAllocator {
    pub fn new(
        store: GalleryStore,
        words: Arc<WordList>,
        mode: IdMode,
        max_attempts: usize,
    ) -> Self {
        Self {
            store,
            words,
            mode,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(store: GalleryStore, words: Arc<WordList>, config: &Config) -> Self {
        Self::new(store, words, config.id_mode, config.max_id_attempts)
    }

    pub fn mode(&self) -> IdMode {
        self.mode
    }

    /// Pick an id for a photo named `filename`.
    ///
    /// `external_id` is only honoured in hybrid mode.
    pub async fn allocate(&self, filename: &str, external_id: Option<&str>) -> Result<String> {
        match self.mode {
            IdMode::Derived => self.derived(filename).await,
            IdMode::Random => {
                if let Some(id) = external_id {
                    debug!(id, "Ignoring external id in random mode");
                }
                self.random().await
            }
            IdMode::Hybrid => match external_id {
                Some(id) => self.external(id).await,
                None => self.random().await,
            },
        }
    }

    /// The filename's stem, verbatim. Fails if the gallery exists.
    pub async fn derived(&self, filename: &str) -> Result<String> {
        let stem = naming::photo_stem(filename)
            .ok_or_else(|| GalleryError::InvalidPath(filename.to_string()))?;
        self.claim(stem).await
    }

    /// An operator-supplied id. Fails if the gallery exists.
    pub async fn external(&self, id: &str) -> Result<String> {
        self.claim(id.trim()).await
    }

    /// A free three-word code.
    pub async fn random(&self) -> Result<String> {
        for attempt in 1..=self.max_attempts {
            let candidate = self.words.three_words(&mut rand::thread_rng());
            if !self.store.exists(&candidate).await? {
                debug!(id = %candidate, attempt, "Allocated random id");
                return Ok(candidate);
            }
            debug!(id = %candidate, attempt, "Random id taken, drawing again");
        }

        warn!(attempts = self.max_attempts, words = self.words.len(), "Random id space exhausted");
        Err(GalleryError::AllocationExhausted(self.max_attempts))
    }

    async fn claim(&self, id: &str) -> Result<String> {
        if self.store.exists(id).await? {
            return Err(GalleryError::AlreadyExists(id.to_string()));
        }
        Ok(id.to_string())
    }
}
