use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fotostand_core::{GalleryError, UploadLimits};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Upload not configured")]
    NotConfigured,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<GalleryError> for ServerError {
    fn from(err: GalleryError) -> Self {
        match err {
            GalleryError::InvalidPath(_) => ServerError::BadRequest("Invalid gallery ID".into()),
            GalleryError::NotFound(_) => ServerError::NotFound,
            GalleryError::PayloadTooLarge { max, .. } => ServerError::BadRequest(format!(
                "File too large. Maximum size is {}MB",
                max / 1024 / 1024
            )),
            GalleryError::UnsupportedMediaType(mime) => ServerError::BadRequest(format!(
                "Invalid file type. Only images are allowed, but got {mime}"
            )),
            GalleryError::MissingFile => ServerError::BadRequest("No file provided".into()),
            GalleryError::AlreadyExists(id) => {
                ServerError::BadRequest(format!("Gallery already exists: {id}"))
            }
            GalleryError::Unauthorized => ServerError::Unauthorized,
            GalleryError::NotConfigured => ServerError::NotConfigured,
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl ServerError {
    /// Multipart body errors: an over-long body reads as a size violation.
    pub fn from_multipart(status: StatusCode, detail: String, limits: &UploadLimits) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            return GalleryError::PayloadTooLarge {
                size: limits.max_size + 1,
                max: limits.max_size,
            }
            .into();
        }
        ServerError::BadRequest(format!("Multipart error: {detail}"))
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::NotConfigured => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            ServerError::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
