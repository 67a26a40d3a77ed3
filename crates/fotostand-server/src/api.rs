use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use fotostand_core::{Config, GalleryError, GalleryStore, UploadGateway, UploadedFile};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ServerError;

/// Room for multipart framing on top of the largest accepted file, so the
/// gateway (not the body limit) decides on the exact size.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub store: GalleryStore,
    pub uploads: UploadGateway,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: GalleryStore, config: Config) -> Self {
        Self {
            uploads: UploadGateway::from_config(store.clone(), &config),
            store,
            config: Arc::new(config),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let body_limit = state.config.upload_limits.max_size + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(health_check))
        .route("/api/gallery/{gallery_id}", get(gallery_listing))
        .route("/api/upload/{gallery_id}", post(upload))
        .route("/img/{gallery_id}/download-all.tar", get(download_all))
        .route("/img/{gallery_id}/{filename}", get(image))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    success: bool,
    filename: String,
    gallery_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GalleryResponse {
    gallery_id: String,
    event_title: String,
    timestamp: String,
    files: Vec<GalleryFileResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GalleryFileResponse {
    filename: String,
    url: String,
    size: u64,
    content_type: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn gallery_listing(
    State(state): State<AppState>,
    Path(gallery_id): Path<String>,
) -> Result<Json<GalleryResponse>, ServerError> {
    let gallery = state.store.list(&gallery_id).await.map_err(not_found)?;

    // A gallery without metadata is still being written.
    let Some(metadata) = gallery.metadata else {
        return Err(ServerError::NotFound);
    };

    let timestamp = metadata.timestamp_iso();
    let files = gallery
        .files
        .into_iter()
        .map(|f| GalleryFileResponse {
            url: format!("/img/{}/{}", gallery.id, f.filename),
            filename: f.filename,
            size: f.size,
            content_type: f.content_type,
        })
        .collect();

    Ok(Json(GalleryResponse {
        gallery_id: gallery.id,
        event_title: metadata.event_title,
        timestamp,
        files,
    }))
}

async fn image(
    State(state): State<AppState>,
    Path((gallery_id, filename)): Path<(String, String)>,
) -> Result<Response, ServerError> {
    let resolved = state
        .store
        .resolve_file(&gallery_id, &filename)
        .await
        .map_err(not_found)?;

    let disposition = format!(
        "inline; filename=\"{}\"",
        resolved.display_name.replace('"', "_")
    );

    Ok((
        [
            (header::CONTENT_TYPE, resolved.content_type.to_string()),
            (header::CACHE_CONTROL, "immutable, max-age=360".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        resolved.data,
    )
        .into_response())
}

async fn download_all(
    State(state): State<AppState>,
    Path(gallery_id): Path<String>,
) -> Result<Response, ServerError> {
    let archive = state.store.archive(&gallery_id).await.map_err(not_found)?;
    info!(gallery = %gallery_id, files = archive.entries, "Serving gallery archive");

    Ok((
        [
            (header::CONTENT_TYPE, "application/x-tar".to_string()),
            (header::CACHE_CONTROL, "no-store".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", archive.file_name),
            ),
        ],
        archive.data,
    )
        .into_response())
}

async fn upload(
    State(state): State<AppState>,
    Path(gallery_id): Path<String>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadResponse>), ServerError> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    state.uploads.authorize(&gallery_id, authorization)?;

    let mut multipart = multipart.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let file = read_file_field(&mut multipart, &state).await?;
    let file = file.ok_or(GalleryError::MissingFile)?;

    let receipt = state.uploads.store_checked(&gallery_id, &file).await?;
    info!(gallery = %receipt.gallery_id, filename = %receipt.filename, "Upload accepted");

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            success: true,
            filename: receipt.filename,
            gallery_id: receipt.gallery_id,
        }),
    ))
}

/// The first multipart field named `file`, if any.
async fn read_file_field(
    multipart: &mut Multipart,
    state: &AppState,
) -> Result<Option<UploadedFile>, ServerError> {
    let limits = state.uploads.limits();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::from_multipart(e.status(), e.body_text(), limits))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().unwrap_or("").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ServerError::from_multipart(e.status(), e.body_text(), limits))?;

        return Ok(Some(UploadedFile {
            file_name,
            content_type,
            data,
        }));
    }
    Ok(None)
}

/// Read routes answer 404 for unsafe segments as well as missing ones.
fn not_found(err: GalleryError) -> ServerError {
    match err {
        GalleryError::InvalidPath(_) | GalleryError::NotFound(_) => ServerError::NotFound,
        other => other.into(),
    }
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
