//! HTTP routes

use axum::extract::{DefaultBodyLimit, Multipart, Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::task;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::handler::{
    list_cells, lookup_hist, open_session, parse_grid, session_or_404, summarize, CellView,
    GridSummary, HistQuery, HistResponse, TokenQuery,
};
use crate::pages;
use crate::session::SessionRegistry;

/// Form field carrying the container
const FILE_FIELD: &str = "rootfile";

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(index))
        .route("/upload", post(upload))
        .route("/grid/:token", get(grid))
        .route("/hist", get(hist))
        .route("/cells", get(cells))
        .route("/session/:token", get(session))
        .route("/healthz", get(healthz))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(pages::index(&state.config.default_grid, None))
}

/// Upload page re-rendered with an error banner
fn form_error(state: &AppState, status: StatusCode, message: &str) -> Response {
    (
        status,
        Html(pages::index(&state.config.default_grid, Some(message))),
    )
        .into_response()
}

/// Stored upload plus the plain form fields that came with it
struct UploadForm {
    upload_name: Option<String>,
    fields: HashMap<String, String>,
}

async fn read_form(mut multipart: Multipart, dest: &Path) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm {
        upload_name: None,
        fields: HashMap::new(),
    };

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if name != FILE_FIELD {
            let value = field.text().await.map_err(multipart_error)?;
            form.fields.insert(name, value);
            continue;
        }

        let upload_name = field.file_name().unwrap_or_default().to_string();
        if upload_name.is_empty() || form.upload_name.is_some() {
            continue;
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to store upload: {}", e)))?;
        let mut written = 0usize;
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            file.write_all(&chunk)
                .await
                .map_err(|e| ApiError::internal(format!("Failed to store upload: {}", e)))?;
            written += chunk.len();
        }
        file.flush()
            .await
            .map_err(|e| ApiError::internal(format!("Failed to store upload: {}", e)))?;

        debug!(upload = %upload_name, bytes = written, "Stored upload");
        form.upload_name = Some(upload_name);
    }

    Ok(form)
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::new(err.status(), err.body_text())
}

async fn remove_upload(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

async fn upload(State(state): State<AppState>, multipart: Multipart) -> Response {
    let token = SessionRegistry::new_token();
    let dest: PathBuf = state.config.uploads.join(format!("{}.hgrid", token));

    let form = match read_form(multipart, &dest).await {
        Ok(form) => form,
        Err(e) => {
            warn!("Upload failed: {}", e);
            remove_upload(&dest).await;
            return e.into_response();
        }
    };

    let Some(upload_name) = form.upload_name else {
        return Redirect::to("/").into_response();
    };

    let grid = match parse_grid(&form.fields, &state.config.default_grid) {
        Ok(grid) => grid,
        Err(message) => {
            remove_upload(&dest).await;
            return form_error(&state, StatusCode::BAD_REQUEST, &message);
        }
    };

    let registry = Arc::clone(&state.registry);
    let capacity = state.config.cache_capacity;
    let path = dest.clone();
    let opened = task::spawn_blocking(move || {
        open_session(&registry, token, &path, upload_name, grid, capacity)
    })
    .await;

    match opened {
        Ok(Ok(session)) => Redirect::to(&format!("/grid/{}", session.token)).into_response(),
        Ok(Err(e)) => {
            warn!("Rejected upload {}: {}", dest.display(), e);
            remove_upload(&dest).await;
            form_error(
                &state,
                StatusCode::UNPROCESSABLE_ENTITY,
                &format!("Failed to read histogram file: {}", e),
            )
        }
        Err(e) => {
            remove_upload(&dest).await;
            ApiError::from(e).into_response()
        }
    }
}

async fn grid(
    State(state): State<AppState>,
    AxumPath(token): AxumPath<String>,
) -> Result<Html<String>, ApiError> {
    let session = session_or_404(&state.registry, Some(&token))?;
    Ok(Html(pages::grid(&summarize(&session))))
}

async fn hist(
    State(state): State<AppState>,
    Query(query): Query<HistQuery>,
) -> Result<Json<HistResponse>, ApiError> {
    let registry = Arc::clone(&state.registry);
    let response = task::spawn_blocking(move || lookup_hist(&registry, &query)).await??;
    Ok(Json(response))
}

async fn cells(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<Vec<CellView>>, ApiError> {
    let session = session_or_404(&state.registry, query.token.as_deref())?;
    Ok(Json(list_cells(&session)))
}

async fn session(
    State(state): State<AppState>,
    AxumPath(token): AxumPath<String>,
) -> Result<Json<GridSummary>, ApiError> {
    let session = session_or_404(&state.registry, Some(&token))?;
    debug!(token = %token, "Session summary requested");
    Ok(Json(summarize(&session)))
}
