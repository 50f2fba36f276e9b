use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::{get, get_service},
    Json, Router,
};
use serde_json::json;
use tower_http::{
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::error;

use crate::content_loader::Templates;
use crate::error::PostError;
use crate::hot_reload::ws_handler;
use crate::models::{PostHtml, PostMarkdown, PostMeta};
use crate::pages::{self, Page};
use crate::state::{AppState, RouterState};

pub fn router(router_state: RouterState) -> Router {
    let static_root = router_state.app_state.content_dir.join("static");
    let static_dir = get_service(ServeDir::new(&static_root));
    let favicon_ico = get_service(ServeFile::new(static_root.join("favicon.ico")));

    Router::new()
        .route("/", get(homepage))
        .route("/post/{slug}", get(render_post))
        .route("/api/posts", get(api_posts))
        .route("/api/posts/{slug}", get(api_post))
        .route("/api/posts/{slug}/markdown", get(api_post_markdown))
        .nest_service("/static", static_dir)
        .route_service("/favicon.ico", favicon_ico)
        .route("/ws", get(ws_handler))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(router_state)
}

fn status_for(err: &PostError) -> StatusCode {
    match err {
        PostError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        PostError::NotFound { .. } => StatusCode::NOT_FOUND,
        PostError::Validation { .. } | PostError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond(state: &AppState, templates: &Templates, status: StatusCode, page: &Page) -> Response {
    let html = pages::render_with_layout(&templates.layout, &state.site, page, state.is_development);
    (status, Html(html)).into_response()
}

async fn render_page(state: &AppState, page: Page) -> Response {
    let templates = state.templates.read().await;
    respond(state, &templates, StatusCode::OK, &page)
}

async fn render_failure(state: &AppState, err: &PostError, requested: &str) -> Response {
    let status = status_for(err);
    if status.is_server_error() {
        error!("Failed to serve {}: {}", requested, err);
    }

    let templates = state.templates.read().await;
    let page = match err {
        PostError::NotFound { .. } => pages::not_found_page(&templates.not_found, requested),
        PostError::InvalidArgument(_) => {
            pages::error_page(&templates.error, "400 Bad Request", &err.to_string())
        }
        _ => pages::error_page(&templates.error, "Error!", &err.to_string()),
    };
    respond(state, &templates, status, &page)
}

async fn homepage(State(state): State<Arc<AppState>>) -> Response {
    match state.posts.list_summaries().await {
        Ok(posts) => {
            let visible: Vec<PostMeta> = posts.into_iter().filter(|post| post.is_show).collect();
            render_page(&state, pages::post_list_page(&state.site, &visible)).await
        }
        Err(e) => render_failure(&state, &e, "/").await,
    }
}

async fn render_post(
    Path(slug): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    match state.posts.get_html(&slug).await {
        Ok(post) => render_page(&state, pages::post_page(&state.site, &post)).await,
        Err(e) => render_failure(&state, &e, &slug).await,
    }
}

async fn not_found(State(state): State<Arc<AppState>>, uri: Uri) -> Response {
    let templates = state.templates.read().await;
    let page = pages::not_found_page(&templates.not_found, uri.path());
    respond(&state, &templates, StatusCode::NOT_FOUND, &page)
}

/// JSON error body: `{ "error": "<message>" }`.
pub struct ApiError(PostError);

impl From<PostError> for ApiError {
    fn from(err: PostError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!("API request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn api_posts(State(state): State<Arc<AppState>>) -> Result<Json<Vec<PostMeta>>, ApiError> {
    let posts = state.posts.list_summaries().await?;
    Ok(Json(posts.into_iter().filter(|post| post.is_show).collect()))
}

async fn api_post(
    Path(slug): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<PostHtml>, ApiError> {
    Ok(Json(state.posts.get_html(&slug).await?))
}

async fn api_post_markdown(
    Path(slug): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<PostMarkdown>, ApiError> {
    Ok(Json(state.posts.get_markdown(&slug).await?))
}
