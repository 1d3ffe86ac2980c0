//! HTTP API for managing sources, captures, and archives.
//!
//! All daemon operations do blocking filesystem and source I/O, so every
//! handler moves the call onto the blocking pool before awaiting it.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::capture::{CaptureError, CaptureOutcome, SkipReason};
use crate::daemon::{Daemon, DaemonError, SourceStatus, StoredFile};
use crate::disk::DiskError;
use crate::source::SourceConfig;
use crate::store::StoreError;

/// Errors that can occur when running the API server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
}

/// Daemon error wrapped for HTTP status mapping.
struct ApiError(DaemonError);

impl From<DaemonError> for ApiError {
    fn from(err: DaemonError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

fn status_for(err: &DaemonError) -> StatusCode {
    match err {
        DaemonError::Store(e) => match e {
            StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
            StoreError::DuplicateName(_)
            | StoreError::DuplicateUrl(_)
            | StoreError::FolderExists(_) => StatusCode::CONFLICT,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Io(_) | StoreError::Serialize(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
        DaemonError::Capture(e) => match e {
            CaptureError::Config(_) => StatusCode::BAD_REQUEST,
            CaptureError::Disk(DiskError::InsufficientSpace { .. }) => {
                StatusCode::INSUFFICIENT_STORAGE
            }
            CaptureError::Disk(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CaptureError::Unavailable { .. } => StatusCode::BAD_GATEWAY,
            CaptureError::EncodeFailed { .. } | CaptureError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
        DaemonError::Archive(e) => match e {
            ArchiveError::MissingFolder(_) => StatusCode::NOT_FOUND,
            ArchiveError::Disk(DiskError::InsufficientSpace { .. }) => {
                StatusCode::INSUFFICIENT_STORAGE
            }
            ArchiveError::Disk(_) | ArchiveError::Io(_) | ArchiveError::Zip(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
        DaemonError::Io(_) | DaemonError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Runs a blocking daemon operation on the blocking pool.
async fn run_blocking<T, F>(daemon: Arc<Daemon>, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Daemon) -> Result<T, DaemonError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || op(&daemon))
        .await
        .map_err(|e| ApiError(DaemonError::Server(format!("task panicked: {}", e))))?
        .map_err(ApiError)
}

/// Body returned by the manual-capture endpoint.
#[derive(Debug, Serialize)]
struct CaptureResponse {
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

impl From<CaptureOutcome> for CaptureResponse {
    fn from(outcome: CaptureOutcome) -> Self {
        match outcome {
            CaptureOutcome::Saved(path) => CaptureResponse {
                outcome: "saved",
                path: Some(path),
                reason: None,
            },
            CaptureOutcome::Skipped(reason) => CaptureResponse {
                outcome: "skipped",
                path: None,
                reason: Some(match reason {
                    SkipReason::Disabled => "saving disabled",
                    SkipReason::OutOfWindow => "outside save window",
                }),
            },
        }
    }
}

async fn list_sources(State(daemon): State<Arc<Daemon>>) -> Result<Json<Vec<SourceStatus>>, ApiError> {
    let statuses = run_blocking(daemon, |d| Ok(d.list_sources())).await?;
    Ok(Json(statuses))
}

async fn add_source(
    State(daemon): State<Arc<Daemon>>,
    Json(config): Json<SourceConfig>,
) -> Result<StatusCode, ApiError> {
    run_blocking(daemon, move |d| d.add_source(config)).await?;
    Ok(StatusCode::CREATED)
}

async fn update_source(
    State(daemon): State<Arc<Daemon>>,
    Path(name): Path<String>,
    Json(config): Json<SourceConfig>,
) -> Result<StatusCode, ApiError> {
    run_blocking(daemon, move |d| d.update_source(&name, config)).await?;
    Ok(StatusCode::OK)
}

async fn delete_source(
    State(daemon): State<Arc<Daemon>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    run_blocking(daemon, move |d| d.delete_source(&name)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn capture_now(
    State(daemon): State<Arc<Daemon>>,
    Path(name): Path<String>,
) -> Result<Json<CaptureResponse>, ApiError> {
    let outcome = run_blocking(daemon, move |d| d.trigger_capture_now(&name)).await?;
    Ok(Json(outcome.into()))
}

async fn create_archive(
    State(daemon): State<Arc<Daemon>>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let path = run_blocking(daemon, move |d| d.create_archive_for(&name)).await?;
    Ok(Json(json!({ "path": path })))
}

async fn list_files(
    State(daemon): State<Arc<Daemon>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<StoredFile>>, ApiError> {
    let files = run_blocking(daemon, move |d| d.list_stored_files(&name)).await?;
    Ok(Json(files))
}

async fn clear_files(
    State(daemon): State<Arc<Daemon>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    run_blocking(daemon, move |d| d.clear_folder(&name)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Creates the axum Router with all source and archive endpoints
pub fn create_router(daemon: Arc<Daemon>) -> Router {
    Router::new()
        .route("/sources", get(list_sources).post(add_source))
        .route("/sources/:name", put(update_source).delete(delete_source))
        .route("/sources/:name/capture", post(capture_now))
        .route("/sources/:name/archive", post(create_archive))
        .route("/sources/:name/files", get(list_files).delete(clear_files))
        .with_state(daemon)
}

/// Runs the HTTP server on the daemon's configured listen address until
/// the process exits.
pub async fn run_server(daemon: Arc<Daemon>) -> Result<(), ServerError> {
    let addr = daemon.config().server.listen_addr.clone();
    let app = create_router(daemon);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("API server listening on {}", addr);
    axum::serve(listener, app)
        .await
        .map_err(ServerError::BindError)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ImageRsCodec;
    use crate::jobs::archive_job_id;
    use crate::video::StubVideoSource;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use http_body_util::BodyExt;
    use snapcam_config::Config;
    use std::fs;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_daemon(dir: &TempDir) -> Arc<Daemon> {
        let mut config = Config::default();
        config.storage.image_root = dir.path().join("images");
        config.storage.temp_dir = dir.path().join("tmp");
        config.storage.state_file = dir.path().join("state.json");
        config.storage.min_free_bytes = 0;
        Arc::new(Daemon::new(
            config,
            Arc::new(StubVideoSource::new(16, 12)),
            Arc::new(ImageRsCodec),
        ))
    }

    fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_post_source_creates_and_lists() {
        let dir = TempDir::new().unwrap();
        let daemon = test_daemon(&dir);
        let app = create_router(daemon.clone());

        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/sources",
                json!({ "name": "cam1", "url": "rtsp://x", "interval_minutes": 5 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(daemon.scheduler().contains("cam1"));

        let response = app
            .oneshot(request(Method::GET, "/sources"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body[0]["name"], "cam1");
        assert_eq!(body[0]["screenshots"], 0);
        assert_eq!(body[0]["info"]["reachable"], true);
    }

    #[tokio::test]
    async fn test_post_invalid_source_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_daemon(&dir));

        let response = app
            .oneshot(json_request(
                Method::POST,
                "/sources",
                json!({ "name": "cam1", "url": "rtsp://x", "interval_minutes": 0 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("interval"));
    }

    #[tokio::test]
    async fn test_post_duplicate_source_is_conflict() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_daemon(&dir));
        let payload = json!({ "name": "cam1", "url": "rtsp://x", "interval_minutes": 5 });

        let response = app
            .clone()
            .oneshot(json_request(Method::POST, "/sources", payload.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(json_request(Method::POST, "/sources", payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_put_updates_interval() {
        let dir = TempDir::new().unwrap();
        let daemon = test_daemon(&dir);
        let app = create_router(daemon.clone());

        app.clone()
            .oneshot(json_request(
                Method::POST,
                "/sources",
                json!({ "name": "cam1", "url": "rtsp://x", "interval_minutes": 5 }),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(json_request(
                Method::PUT,
                "/sources/cam1",
                json!({ "name": "cam1", "url": "rtsp://x", "interval_minutes": 10 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(daemon.store().get("cam1").unwrap().interval_minutes, 10);
    }

    #[tokio::test]
    async fn test_delete_unknown_source_is_not_found() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_daemon(&dir));

        let response = app
            .oneshot(request(Method::DELETE, "/sources/ghost"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_capture_endpoint_saves_image() {
        let dir = TempDir::new().unwrap();
        let daemon = test_daemon(&dir);
        let app = create_router(daemon);

        app.clone()
            .oneshot(json_request(
                Method::POST,
                "/sources",
                json!({ "name": "cam1", "url": "rtsp://x", "interval_minutes": 5 }),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(request(Method::POST, "/sources/cam1/capture"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["outcome"], "saved");
        assert!(body["path"].as_str().unwrap().ends_with(".jpg"));
    }

    #[tokio::test]
    async fn test_capture_unreachable_source_is_bad_gateway() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_daemon(&dir));

        app.clone()
            .oneshot(json_request(
                Method::POST,
                "/sources",
                json!({ "name": "cam1", "url": "rtsp://unreachable/x", "interval_minutes": 5 }),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(request(Method::POST, "/sources/cam1/capture"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_capture_skipped_when_saving_disabled() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_daemon(&dir));

        app.clone()
            .oneshot(json_request(
                Method::POST,
                "/sources",
                json!({
                    "name": "cam1",
                    "url": "rtsp://x",
                    "interval_minutes": 5,
                    "save_images": false
                }),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(request(Method::POST, "/sources/cam1/capture"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["outcome"], "skipped");
        assert_eq!(body["reason"], "saving disabled");
    }

    #[tokio::test]
    async fn test_archive_endpoint_schedules_expiry() {
        let dir = TempDir::new().unwrap();
        let daemon = test_daemon(&dir);
        let app = create_router(daemon.clone());

        app.clone()
            .oneshot(json_request(
                Method::POST,
                "/sources",
                json!({ "name": "cam1", "url": "rtsp://x", "interval_minutes": 5 }),
            ))
            .await
            .unwrap();
        fs::write(dir.path().join("images/cam1/a.jpg"), b"img").unwrap();

        let response = app
            .oneshot(request(Method::POST, "/sources/cam1/archive"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["path"].as_str().unwrap().ends_with("cam1.zip"));
        assert!(daemon.scheduler().contains(&archive_job_id("cam1")));
    }

    #[tokio::test]
    async fn test_files_endpoint_lists_and_clears() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_daemon(&dir));

        app.clone()
            .oneshot(json_request(
                Method::POST,
                "/sources",
                json!({ "name": "cam1", "url": "rtsp://x", "interval_minutes": 5 }),
            ))
            .await
            .unwrap();
        fs::write(dir.path().join("images/cam1/a.jpg"), vec![0u8; 10]).unwrap();

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/sources/cam1/files"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body[0]["filename"], "a.jpg");
        assert_eq!(body[0]["size"], 10);

        let response = app
            .clone()
            .oneshot(request(Method::DELETE, "/sources/cam1/files"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(request(Method::GET, "/sources/cam1/files"))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 0);
    }
}
