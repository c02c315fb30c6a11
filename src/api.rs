use crate::account::{is_valid_phone, AccountError, AccountService, Session};
use crate::auth::{require_auth, AuthUser};
use crate::config::HttpConfig;
use crate::ingest::{IngestPipeline, ReceivedUpload};
use crate::media_store::{FileRecord, MediaStore};
use crate::token::TokenService;
use anyhow::{Context, Result};
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountService,
    pub ingest: Arc<IngestPipeline>,
    pub media_store: MediaStore,
    pub token_service: Arc<TokenService>,
}

/// Error envelope crossing the response boundary. Coarse messages only;
/// details stay in server logs.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn internal_error() -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

/// Registration/login request body, email variant
#[derive(Debug, Deserialize)]
pub struct AuthRequestEmail {
    pub email: String,
    pub password: String,
}

/// Registration/login request body, phone variant
#[derive(Debug, Deserialize)]
pub struct AuthRequestPhone {
    pub phone: String,
    pub password: String,
}

/// Registration/login response. An absent contact field renders as "".
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub email: String,
    pub phone: String,
    pub token: String,
}

impl From<Session> for AuthResponse {
    fn from(session: Session) -> Self {
        Self {
            email: session.user.email.unwrap_or_default(),
            phone: session.user.phone.unwrap_or_default(),
            token: session.token,
        }
    }
}

/// Stored media response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResponse {
    pub file_id: String,
    pub file_uri: String,
    pub file_thumbnail_uri: String,
}

impl From<FileRecord> for FileResponse {
    fn from(record: FileRecord) -> Self {
        Self {
            file_id: record.id.to_string(),
            file_uri: record.file_uri,
            file_thumbnail_uri: record.thumbnail_uri,
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &HttpConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    let protected = Router::new()
        .route("/v1/file", post(upload_file))
        .route("/v1/file/:file_id", get(get_file))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/v1/register/email", post(register_email))
        .route("/v1/register/phone", post(register_phone))
        .route("/v1/login/email", post(login_email))
        .route("/v1/login/phone", post(login_phone))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "media-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1")
        .fetch_one(state.media_store.pool())
        .await
    {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 || password.len() > 32 {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Password must be between 8 and 32 characters",
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(api_error(StatusCode::BAD_REQUEST, "Invalid email format"));
    }
    Ok(())
}

fn validate_phone(phone: &str) -> Result<(), ApiError> {
    if !is_valid_phone(phone) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Invalid phone format. It must start with '+' followed by digits.",
        ));
    }
    Ok(())
}

fn account_error_response(err: AccountError, contact_kind: &str) -> ApiError {
    match err {
        AccountError::AlreadyExists => api_error(
            StatusCode::CONFLICT,
            format!("{contact_kind} already exists"),
        ),
        AccountError::ContactNotFound => {
            api_error(StatusCode::NOT_FOUND, format!("{contact_kind} not found"))
        }
        AccountError::InvalidCredentials => {
            api_error(StatusCode::UNAUTHORIZED, "Invalid password")
        }
        AccountError::Store(e) => {
            error!(error = ?e, "Credential store failure");
            internal_error()
        }
    }
}

#[instrument(skip(state, req), fields(email = %req.email))]
async fn register_email(
    State(state): State<AppState>,
    Json(req): Json<AuthRequestEmail>,
) -> Result<Json<AuthResponse>, ApiError> {
    validate_email(&req.email)?;
    validate_password(&req.password)?;

    let session = state
        .accounts
        .register(crate::user_store::Contact::Email(req.email), &req.password)
        .await
        .map_err(|e| account_error_response(e, "Email"))?;

    Ok(Json(session.into()))
}

#[instrument(skip(state, req), fields(phone = %req.phone))]
async fn register_phone(
    State(state): State<AppState>,
    Json(req): Json<AuthRequestPhone>,
) -> Result<Json<AuthResponse>, ApiError> {
    validate_phone(&req.phone)?;
    validate_password(&req.password)?;

    let session = state
        .accounts
        .register(crate::user_store::Contact::Phone(req.phone), &req.password)
        .await
        .map_err(|e| account_error_response(e, "Phone"))?;

    Ok(Json(session.into()))
}

#[instrument(skip(state, req), fields(email = %req.email))]
async fn login_email(
    State(state): State<AppState>,
    Json(req): Json<AuthRequestEmail>,
) -> Result<Json<AuthResponse>, ApiError> {
    validate_email(&req.email)?;
    validate_password(&req.password)?;

    let session = state
        .accounts
        .login(crate::user_store::Contact::Email(req.email), &req.password)
        .await
        .map_err(|e| account_error_response(e, "Email"))?;

    Ok(Json(session.into()))
}

#[instrument(skip(state, req), fields(phone = %req.phone))]
async fn login_phone(
    State(state): State<AppState>,
    Json(req): Json<AuthRequestPhone>,
) -> Result<Json<AuthResponse>, ApiError> {
    validate_phone(&req.phone)?;
    validate_password(&req.password)?;

    let session = state
        .accounts
        .login(crate::user_store::Contact::Phone(req.phone), &req.password)
        .await
        .map_err(|e| account_error_response(e, "Phone"))?;

    Ok(Json(session.into()))
}

/// Protected upload endpoint: multipart form field `file`
#[instrument(skip(state, multipart), fields(user_id = auth.user_id))]
async fn upload_file(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<Json<FileResponse>, ApiError> {
    let mut upload: Option<ReceivedUpload> = None;

    while let Some(field) = multipart.next_field().await.map_err(|_| {
        api_error(StatusCode::BAD_REQUEST, "Malformed multipart body")
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|_| api_error(StatusCode::BAD_REQUEST, "Failed to read file field"))?;

        upload = Some(ReceivedUpload {
            file_name,
            bytes: bytes.to_vec(),
        });
        break;
    }

    let upload = upload.ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "File not found"))?;

    let record = state.ingest.ingest(upload).await.map_err(|e| {
        if e.is_client_error() {
            api_error(StatusCode::BAD_REQUEST, e.to_string())
        } else {
            error!(error = ?e, stage = %e.aborted_from(), "Ingestion failed");
            internal_error()
        }
    })?;

    info!(user_id = auth.user_id, file_id = record.id, "File ingested");

    Ok(Json(record.into()))
}

/// Protected lookup of a stored media record
#[instrument(skip(state), fields(user_id = auth.user_id))]
async fn get_file(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(file_id): Path<i64>,
) -> Result<Json<FileResponse>, ApiError> {
    let record = state
        .media_store
        .get_file(file_id)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to query file");
            internal_error()
        })?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "File not found"))?;

    Ok(Json(record.into()))
}

/// Start the HTTP API server
pub async fn start_api_server(state: AppState, config: &HttpConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user_store::UserRecord;
    use chrono::Utc;

    #[test]
    fn test_auth_response_renders_absent_contact_as_empty() {
        let session = Session {
            user: UserRecord {
                id: 1,
                email: Some("a@b.c".to_string()),
                phone: None,
                password_hash: "hash".to_string(),
                created_at: Utc::now(),
            },
            token: "tok".to_string(),
        };

        let response: AuthResponse = session.into();
        let json: serde_json::Value = serde_json::to_value(&response).unwrap();

        assert_eq!(json["email"], "a@b.c");
        assert_eq!(json["phone"], "");
        assert_eq!(json["token"], "tok");
    }

    #[test]
    fn test_file_response_field_names() {
        let record = FileRecord {
            id: 7,
            file_uri: "https://bucket/a.jpg".to_string(),
            thumbnail_uri: "https://bucket/b.jpg".to_string(),
            created_at: Utc::now(),
        };

        let response: FileResponse = record.into();
        let json: serde_json::Value = serde_json::to_value(&response).unwrap();

        assert_eq!(json["fileId"], "7");
        assert_eq!(json["fileUri"], "https://bucket/a.jpg");
        assert_eq!(json["fileThumbnailUri"], "https://bucket/b.jpg");
    }

    #[test]
    fn test_password_length_bounds() {
        assert!(validate_password("1234567").is_err());
        assert!(validate_password("12345678").is_ok());
        assert!(validate_password(&"x".repeat(32)).is_ok());
        assert!(validate_password(&"x".repeat(33)).is_err());
    }

    #[test]
    fn test_email_validation() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("userexample.com").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
    }
}
