use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use clap::Parser;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info, warn};

mod metrics;

use rsml_annotator::access::bearer_token;
use rsml_annotator::api::{
    AllUsersResponse, BatchesResponse, FilesResponse, ListUsersQuery, LoginRequest,
    LoginResponse, MessageResponse, RegisterRequest, SaveRequest, SaveResponse, SelfResponse,
    UserResponse, UsersResponse,
};
use rsml_annotator::catalog::{BatchId, FileId, MemoryCatalog};
use rsml_annotator::segments::Segment;
use rsml_annotator::{Api, Error, ErrorKind, Opts};

#[derive(Parser, Debug)]
#[command(name = "annotator-server")]
#[command(about = "HTTP server for RSML speech transcript annotation")]
struct Params {
    /// Host interface to bind to.
    #[arg(long = "host", default_value = "127.0.0.1")]
    host: String,

    /// TCP port to listen on.
    #[arg(long = "port", default_value_t = 5000)]
    port: u16,

    /// HMAC secret used to sign bearer tokens.
    #[arg(long = "jwt-secret", env = "ANNOTATOR_JWT_SECRET", hide_env_values = true)]
    jwt_secret: String,

    /// JSON catalog seed (`{"batches": {"<batch>": {"<file>": [segments]}}}`).
    #[arg(short = 'c', long = "catalog")]
    catalog: Option<String>,

    /// Directory served under `/data/audio`.
    #[arg(long = "audio-dir", default_value = "data/audio")]
    audio_dir: String,

    /// Upper bound (seconds) on each credential store or catalog call.
    #[arg(long = "upstream-timeout-secs", default_value_t = 10)]
    upstream_timeout_secs: u64,

    /// Email for the bootstrap admin, created at startup if no admin exists.
    #[arg(long = "admin-email", env = "ANNOTATOR_ADMIN_EMAIL")]
    admin_email: Option<String>,

    /// Password for the bootstrap admin.
    #[arg(long = "admin-password", env = "ANNOTATOR_ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: Option<String>,

    /// Display name for the bootstrap admin.
    #[arg(long = "admin-name", default_value = "Admin User")]
    admin_name: String,
}

#[derive(Clone)]
struct AppState {
    api: Arc<Api>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

struct AppError {
    status: StatusCode,
    message: String,
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let kind = err.kind();
        match kind {
            ErrorKind::Unauthorized | ErrorKind::Forbidden => metrics::record_rejection(kind),
            ErrorKind::Upstream => warn!(error = %err, "upstream failure"),
            _ => {}
        }
        Self {
            status: status_for(kind),
            message: err.to_string(),
        }
    }
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

type Reply<T> = std::result::Result<Json<T>, AppError>;

// Extractors are taken as `Result` so their rejections get the same JSON error body.
type JsonBody<T> = std::result::Result<Json<T>, JsonRejection>;
type PathParam<T> = std::result::Result<Path<T>, PathRejection>;

fn token(headers: &HeaderMap) -> Option<&str> {
    bearer_token(
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok()),
    )
}

#[tokio::main]
async fn main() {
    rsml_annotator::init_logging();

    if let Err(err) = run().await {
        error!(error = ?err, "annotator-server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let params = Params::parse();

    if let Err(err) = metrics::init() {
        warn!(error = ?err, "metrics disabled (init failed)");
    }

    let addr: SocketAddr = format!("{}:{}", params.host, params.port)
        .parse()
        .context("invalid host/port bind address")?;

    let catalog = match &params.catalog {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("open catalog '{path}'"))?;
            MemoryCatalog::from_json_reader(BufReader::new(file))
                .with_context(|| format!("load catalog '{path}'"))?
        }
        None => {
            warn!("no catalog seed given; serving an empty catalog");
            MemoryCatalog::new()
        }
    };

    let opts =
        Opts::default().with_upstream_timeout(Duration::from_secs(params.upstream_timeout_secs));
    let api = Api::in_memory(params.jwt_secret.as_bytes(), catalog, &opts);

    match (&params.admin_email, &params.admin_password) {
        (Some(email), Some(password)) => {
            api.accounts()
                .ensure_admin(&params.admin_name, email, password)
                .await
                .context("failed to bootstrap admin account")?;
        }
        _ => warn!("no bootstrap admin configured; nobody can approve registrations"),
    }

    let state = AppState { api: Arc::new(api) };
    let app = router(state, &params.audio_dir);

    let listener = TcpListener::bind(addr).await.context("bind failed")?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

fn router(state: AppState, audio_dir: &str) -> Router {
    let auth = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/pending-users", get(pending_users))
        .route("/all-users", get(all_users))
        .route("/approve/{id}", put(approve))
        .route("/revoke/{id}", put(revoke))
        .route("/reject/{id}", delete(reject))
        .route("/delete/{id}", delete(delete_user));

    let api = Router::new()
        .nest("/auth", auth)
        .route("/batches", get(batches))
        .route("/batch/{batch}/files", get(files))
        .route("/batch/{batch}/file/{file}", get(load_file))
        .route("/save", post(save));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics::prometheus_metrics))
        .nest("/api", api)
        .route_layer(from_fn(metrics::track_http_metrics))
        .nest_service("/data/audio", ServeDir::new(audio_dir))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .level(Level::INFO)
                        .include_headers(false),
                )
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn healthz() -> &'static str {
    "ok"
}

async fn register(
    State(state): State<AppState>,
    body: JsonBody<RegisterRequest>,
) -> std::result::Result<(StatusCode, Json<UserResponse>), AppError> {
    let Json(req) = body?;
    let res = state.api.register(req).await?;
    Ok((StatusCode::CREATED, Json(res)))
}

async fn login(State(state): State<AppState>, body: JsonBody<LoginRequest>) -> Reply<LoginResponse> {
    let Json(req) = body?;
    Ok(Json(state.api.login(req).await?))
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> Reply<SelfResponse> {
    Ok(Json(state.api.get_self(token(&headers)).await?))
}

async fn pending_users(State(state): State<AppState>, headers: HeaderMap) -> Reply<UsersResponse> {
    Ok(Json(state.api.list_pending_users(token(&headers)).await?))
}

async fn all_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: std::result::Result<Query<ListUsersQuery>, QueryRejection>,
) -> Reply<AllUsersResponse> {
    let Query(query) = query?;
    Ok(Json(state.api.list_all_users(token(&headers), query).await?))
}

async fn approve(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: PathParam<String>,
) -> Reply<UserResponse> {
    let Path(id) = id?;
    Ok(Json(state.api.approve_user(token(&headers), &id).await?))
}

async fn revoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: PathParam<String>,
) -> Reply<UserResponse> {
    let Path(id) = id?;
    Ok(Json(state.api.revoke_user(token(&headers), &id).await?))
}

async fn reject(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: PathParam<String>,
) -> Reply<MessageResponse> {
    let Path(id) = id?;
    Ok(Json(state.api.reject_user(token(&headers), &id).await?))
}

async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: PathParam<String>,
) -> Reply<MessageResponse> {
    let Path(id) = id?;
    Ok(Json(state.api.delete_user(token(&headers), &id).await?))
}

async fn batches(State(state): State<AppState>, headers: HeaderMap) -> Reply<BatchesResponse> {
    Ok(Json(state.api.list_batches(token(&headers)).await?))
}

async fn files(
    State(state): State<AppState>,
    headers: HeaderMap,
    batch: PathParam<BatchId>,
) -> Reply<FilesResponse> {
    let Path(batch) = batch?;
    Ok(Json(state.api.list_files(token(&headers), batch).await?))
}

async fn load_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: PathParam<(BatchId, FileId)>,
) -> Reply<Vec<Segment>> {
    let Path((batch, file)) = path?;
    Ok(Json(state.api.load_file(token(&headers), batch, file).await?))
}

async fn save(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: JsonBody<SaveRequest>,
) -> Reply<SaveResponse> {
    let Json(req) = body?;
    Ok(Json(state.api.save_segment(token(&headers), req).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn error_kinds_map_to_distinct_statuses() {
        assert_eq!(status_for(ErrorKind::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::Conflict), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(ErrorKind::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::Upstream), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn app_error_keeps_library_message() {
        let err = AppError::from(Error::Conflict("Email already registered".to_owned()));
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.message, "Email already registered");
    }

    #[test]
    fn malformed_json_body_becomes_json_error() {
        let rejection = match Json::<SaveRequest>::from_bytes(b"{not json") {
            Ok(_) => panic!("malformed body parsed"),
            Err(rejection) => rejection,
        };
        let err = AppError::from(rejection);
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(!err.message.is_empty());
    }

    #[test]
    fn user_filter_query_accepts_empty_and_rejects_unknown() -> anyhow::Result<()> {
        let uri: axum::http::Uri = "/api/auth/all-users?filter=".parse()?;
        let Ok(Query(query)) = Query::<ListUsersQuery>::try_from_uri(&uri) else {
            panic!("empty filter rejected");
        };
        assert_eq!(query.filter, rsml_annotator::accounts::UserFilter::All);

        let uri: axum::http::Uri = "/api/auth/all-users?filter=bogus".parse()?;
        let rejection = match Query::<ListUsersQuery>::try_from_uri(&uri) {
            Ok(_) => panic!("unknown filter accepted"),
            Err(rejection) => rejection,
        };
        assert_eq!(AppError::from(rejection).status, StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[test]
    fn token_reads_bearer_authorization_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(token(&headers), Some("abc.def"));
    }
}
