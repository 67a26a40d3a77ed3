//! Authenticated uploads into the gallery store.
//!
//! Checks run in a fixed order and all of them happen before anything is
//! written: gallery id, token configuration, bearer token, file presence,
//! size, MIME type.

use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{Config, UploadLimits};
use crate::error::{GalleryError, Result};
use crate::security::{bearer_token, is_safe_segment, verify_upload_token};
use crate::store::{GalleryStore, IncomingFile};

/// A file as received from a multipart form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub gallery_id: String,
    pub filename: String,
}

#[derive(Clone)]
pub struct UploadGateway {
    store: GalleryStore,
    token_hash: Option<String>,
    limits: UploadLimits,
}

impl UploadGateway {
    pub fn new(store: GalleryStore, token_hash: Option<String>, limits: UploadLimits) -> Self {
        Self {
            store,
            token_hash,
            limits,
        }
    }

    pub fn from_config(store: GalleryStore, config: &Config) -> Self {
        Self::new(store, config.upload_token_hash.clone(), config.upload_limits.clone())
    }

    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    /// Validate the target id and the `Authorization` header value.
    pub fn authorize(&self, gallery_id: &str, authorization: Option<&str>) -> Result<()> {
        if !is_safe_segment(gallery_id) || gallery_id.is_empty() {
            return Err(GalleryError::InvalidPath(gallery_id.to_string()));
        }

        let Some(hash) = self.token_hash.as_deref() else {
            return Err(GalleryError::NotConfigured);
        };

        let Some(token) = bearer_token(authorization) else {
            warn!("Unauthorized upload attempt: missing or malformed Authorization header");
            return Err(GalleryError::Unauthorized);
        };

        if !verify_upload_token(token, hash) {
            warn!("Unauthorized upload attempt: invalid token");
            return Err(GalleryError::Unauthorized);
        }

        Ok(())
    }

    /// Size and type checks for a file that passed [`authorize`](Self::authorize).
    pub fn check_file(&self, file: &UploadedFile) -> Result<()> {
        if file.data.len() > self.limits.max_size {
            return Err(GalleryError::PayloadTooLarge {
                size: file.data.len(),
                max: self.limits.max_size,
            });
        }
        if !self.limits.allows(&file.content_type) {
            return Err(GalleryError::UnsupportedMediaType(file.content_type.clone()));
        }
        Ok(())
    }

    /// Run every check and store the file.
    pub async fn upload(
        &self,
        gallery_id: &str,
        authorization: Option<&str>,
        file: Option<UploadedFile>,
    ) -> Result<UploadReceipt> {
        self.authorize(gallery_id, authorization)?;
        let file = file.ok_or(GalleryError::MissingFile)?;
        self.store_checked(gallery_id, &file).await
    }

    /// Check and store a file for a request that is already authorized.
    pub async fn store_checked(
        &self,
        gallery_id: &str,
        file: &UploadedFile,
    ) -> Result<UploadReceipt> {
        self.check_file(file)?;

        let filename = self
            .store
            .append_file(
                gallery_id,
                IncomingFile {
                    original_name: &file.file_name,
                    data: &file.data,
                },
            )
            .await?;

        info!(
            gallery = %gallery_id,
            filename = %filename,
            size = file.data.len(),
            "File uploaded"
        );

        Ok(UploadReceipt {
            gallery_id: gallery_id.to_string(),
            filename,
        })
    }
}
