use crate::{
    config::Config,
    parse_tags,
    prompts::{
        Category, CommentCreate, Prompt, PromptCreate, PromptStore, PromptUpdate, SearchQuery,
    },
    similarity::{SimilarPrompt, SimilarityEngine, DEFAULT_SIMILAR_LIMIT},
    summary::SummaryService,
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    str::FromStr,
    sync::{Arc, RwLock},
};
use tokio::signal;

#[derive(Clone)]
pub struct SharedState {
    pub store: Arc<dyn PromptStore>,
    pub engine: Arc<SimilarityEngine>,
    pub summary: Arc<SummaryService>,
    pub config: Arc<RwLock<Config>>,
}

async fn start_app(state: SharedState) {
    let listen = state.config.read().unwrap().listen.clone();

    // the engine lifecycle belongs to the entry point: pick a backend and
    // warm the index before accepting traffic
    state.engine.initialize().await;
    if let Err(err) = state.engine.build_index().await {
        log::error!("initial index build failed: {err:#}");
    }

    let shared_state = Arc::new(state);

    async fn shutdown_signal() {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    let app = Router::new()
        .route("/api/prompts/search", post(search))
        .route("/api/prompts/create", post(create))
        .route("/api/prompts/update", post(update))
        .route("/api/prompts/delete", post(delete))
        .route("/api/prompts/total", post(total))
        .route("/api/prompts/:id", get(get_prompt))
        .route("/api/prompts/:id/similar", get(similar))
        .route("/api/prompts/:id/like", post(like))
        .route("/api/prompts/:id/comments", post(add_comment))
        .route("/api/index/rebuild", post(rebuild_index))
        .route("/api/summary/generate", post(generate_summary))
        .route("/api/tags", get(tags))
        .route("/api/config", get(get_config))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state);

    let listener = tokio::net::TcpListener::bind(&listen).await.unwrap();
    log::info!("listening on {listen}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}

pub fn start_daemon(state: SharedState) {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async { start_app(state).await });
}

#[derive(Debug)]
enum HttpError {
    NotFound,
    InvalidInput(String),
    Internal(anyhow::Error),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        match self {
            HttpError::NotFound => (
                axum::http::StatusCode::NOT_FOUND,
                json!({"error": "not found"}).to_string(),
            ),
            HttpError::InvalidInput(message) => (
                axum::http::StatusCode::BAD_REQUEST,
                json!({"error": message}).to_string(),
            ),
            HttpError::Internal(err) => {
                log::error!("{err:#}");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": err.to_string()}).to_string(),
                )
            }
        }
        .into_response()
    }
}

impl From<anyhow::Error> for HttpError {
    fn from(err: anyhow::Error) -> Self {
        HttpError::Internal(err)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    pub category: Option<String>,
    pub tag: Option<String>,
    pub keyword: Option<String>,
    pub limit: Option<usize>,
}

fn parse_category(value: Option<String>) -> Result<Option<Category>, HttpError> {
    value
        .map(|c| Category::from_str(&c))
        .transpose()
        .map_err(|err| HttpError::InvalidInput(err.to_string()))
}

async fn search(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<Vec<Prompt>>, HttpError> {
    log::debug!("payload: {payload:?}");

    let query = SearchQuery {
        category: parse_category(payload.category)?,
        tag: payload.tag,
        keyword: payload.keyword,
        limit: payload.limit,
    };

    Ok(Json(state.store.search(query)?))
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PromptCreateRequest {
    pub title: String,
    pub description: Option<String>,
    pub content: String,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub is_public: Option<bool>,

    /// Generate a description when none is supplied
    #[serde(default)]
    pub auto_description: bool,
}

async fn create(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<PromptCreateRequest>,
) -> Result<Json<Prompt>, HttpError> {
    log::debug!("payload: {payload:?}");

    let mut description = payload.description;
    if description.is_none() && payload.auto_description {
        match state.summary.generate(&payload.content).await {
            Ok(generated) => description = Some(generated),
            Err(err) => log::warn!("couldnt generate description: {err:#}"),
        }
    }

    let create = PromptCreate {
        title: payload.title,
        description,
        content: payload.content,
        category: parse_category(payload.category)?.unwrap_or_default(),
        tags: payload.tags.map(parse_tags),
        is_public: payload.is_public,
    };

    Ok(Json(state.store.create(create)?))
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PromptUpdateRequest {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub is_public: Option<bool>,
}

async fn update(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<PromptUpdateRequest>,
) -> Result<Json<Prompt>, HttpError> {
    log::debug!("payload: {payload:?}");

    if state.store.get(&payload.id)?.is_none() {
        return Err(HttpError::NotFound);
    }

    let update = PromptUpdate {
        title: payload.title,
        description: payload.description,
        content: payload.content,
        category: parse_category(payload.category)?,
        tags: payload.tags.map(parse_tags),
        is_public: payload.is_public,
    };

    Ok(Json(state.store.update(&payload.id, update)?))
}

#[derive(Debug, Deserialize)]
pub struct PromptDeleteRequest {
    pub id: String,
}

async fn delete(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<PromptDeleteRequest>,
) -> Result<Json<()>, HttpError> {
    log::debug!("payload: {payload:?}");

    if state.store.get(&payload.id)?.is_none() {
        return Err(HttpError::NotFound);
    }

    state.store.delete(&payload.id)?;
    Ok(Json(()))
}

async fn get_prompt(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
) -> Result<Json<Prompt>, HttpError> {
    state
        .store
        .get(&id)?
        .map(Json)
        .ok_or(HttpError::NotFound)
}

#[derive(Debug, Deserialize)]
pub struct SimilarParams {
    pub limit: Option<usize>,
}

async fn similar(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
    Query(params): Query<SimilarParams>,
) -> Result<Json<Vec<SimilarPrompt>>, HttpError> {
    let target = state.store.get(&id)?.ok_or(HttpError::NotFound)?;

    let limit = params.limit.unwrap_or(DEFAULT_SIMILAR_LIMIT);
    let results = state.engine.find_similar(&target, limit).await?;

    Ok(Json(results))
}

#[derive(Debug, Deserialize)]
pub struct LikeRequest {
    pub user: String,
}

async fn like(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
    Json(payload): Json<LikeRequest>,
) -> Result<Json<Prompt>, HttpError> {
    if state.store.get(&id)?.is_none() {
        return Err(HttpError::NotFound);
    }

    Ok(Json(state.store.like(&id, &payload.user)?))
}

async fn add_comment(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
    Json(payload): Json<CommentCreate>,
) -> Result<impl IntoResponse, HttpError> {
    if payload.body.trim().is_empty() {
        return Err(HttpError::InvalidInput("comment body is required".into()));
    }

    if state.store.get(&id)?.is_none() {
        return Err(HttpError::NotFound);
    }

    Ok(Json(state.store.add_comment(&id, payload)?))
}

async fn rebuild_index(
    State(state): State<Arc<SharedState>>,
) -> Result<Json<serde_json::Value>, HttpError> {
    state.engine.build_index().await?;
    Ok(Json(json!({"success": true})))
}

#[derive(Debug, Deserialize)]
pub struct SummaryRequest {
    pub content: String,
}

async fn generate_summary(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SummaryRequest>,
) -> Result<Json<serde_json::Value>, HttpError> {
    if payload.content.trim().is_empty() {
        return Err(HttpError::InvalidInput("prompt content is required".into()));
    }

    let description = state.summary.generate(&payload.content).await?;
    Ok(Json(json!({"description": description})))
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TotalResponse {
    pub total: usize,
}

async fn total(
    State(state): State<Arc<SharedState>>,
) -> Result<Json<TotalResponse>, HttpError> {
    let total = state.store.total()?;
    Ok(Json(TotalResponse { total }))
}

async fn tags(State(state): State<Arc<SharedState>>) -> Result<Json<Vec<String>>, HttpError> {
    Ok(Json(state.store.tags()?))
}

async fn get_config(State(state): State<Arc<SharedState>>) -> Result<Json<Config>, HttpError> {
    Ok(Json(state.config.read().unwrap().clone()))
}
