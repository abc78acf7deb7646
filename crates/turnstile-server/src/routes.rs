//! HTTP handlers. Route classes and permission stages are attached in
//! [`crate::server::build_app`].

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use turnstile_auth::{AuthError, CurrentIdentity, IssuedToken, MaybeIdentity, PolicyKind, RateStatus};

use crate::articles::{Article, NewArticle};
use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// -----------------------------------------------------------------------------
// Authentication
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub expires_at: i64,
}

impl From<IssuedToken> for TokenResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            access_token: issued.token,
            token_type: "Bearer",
            expires_in: issued.expires_in,
            expires_at: issued.expires_at,
        }
    }
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let users = state.users.clone();
    let username = req.username.clone();
    // Argon2 verification is CPU-bound
    let principal = tokio::task::spawn_blocking(move || users.authenticate(&req.username, &req.password))
        .await
        .map_err(|e| AuthError::internal(e.to_string()))?;

    let Some(principal) = principal else {
        tracing::info!(username = %username, "Login failed");
        return Err(ApiError::InvalidCredentials);
    };

    let issued = state.gatekeeper.issue_token(&principal)?;
    tracing::info!(user_id = principal.id, jti = %issued.jti, "Login succeeded");
    Ok(Json(issued.into()))
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.username.trim().is_empty() || req.password.len() < 8 {
        return Err(ApiError::BadRequest(
            "username is required and password must be at least 8 characters".into(),
        ));
    }

    let users = state.users.clone();
    let username = req.username.clone();
    let registered =
        tokio::task::spawn_blocking(move || users.register(&req.username, &req.password, &req.email))
            .await
            .map_err(|e| AuthError::internal(e.to_string()))?
            .map_err(|e| AuthError::internal(e.to_string()))?;

    let Some(principal) = registered else {
        return Err(ApiError::BadRequest(format!("username '{username}' is taken")));
    };

    tracing::info!(user_id = principal.id, username = %principal.username, "User registered");
    Ok((StatusCode::CREATED, Json(principal)))
}

pub async fn me(CurrentIdentity(identity): CurrentIdentity) -> Json<Value> {
    Json(json!({
        "id": identity.id(),
        "username": identity.principal.username,
        "email": identity.principal.email,
        "role": identity.role(),
        "expires_at": identity.expires_at,
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> ApiResult<StatusCode> {
    state.gatekeeper.revoke_token(&identity.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn refresh(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> ApiResult<Json<TokenResponse>> {
    let issued = state.gatekeeper.refresh_token(&identity.token).await?;
    Ok(Json(issued.into()))
}

// -----------------------------------------------------------------------------
// Articles
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ArticleList {
    pub articles: Vec<Article>,
    pub viewer: Option<u64>,
}

pub async fn list_articles(
    State(state): State<AppState>,
    MaybeIdentity(identity): MaybeIdentity,
) -> Json<ArticleList> {
    Json(ArticleList {
        articles: state.articles.list(),
        viewer: identity.map(|i| i.id()),
    })
}

pub async fn get_article(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Article>> {
    state
        .articles
        .get(id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Article {id}")))
}

pub async fn create_article(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Json(new): Json<NewArticle>,
) -> ApiResult<impl IntoResponse> {
    if new.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".into()));
    }
    let article = state.articles.create(identity.id(), new);
    Ok((StatusCode::CREATED, Json(article)))
}

pub async fn delete_article(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<StatusCode> {
    state
        .articles
        .remove(id)
        .ok_or_else(|| ApiError::NotFound(format!("Article {id}")))?;
    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------------
// Uploads
// -----------------------------------------------------------------------------

pub async fn upload(CurrentIdentity(identity): CurrentIdentity, body: Bytes) -> impl IntoResponse {
    tracing::debug!(user_id = identity.id(), size = body.len(), "Upload received");
    (
        StatusCode::CREATED,
        Json(json!({ "size": body.len(), "owner": identity.id() })),
    )
}

// -----------------------------------------------------------------------------
// Admin
// -----------------------------------------------------------------------------

pub async fn clear_permission_cache(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
) -> ApiResult<StatusCode> {
    state.gatekeeper.clear_user_permission_cache(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn rate_limit_status(
    State(state): State<AppState>,
    Path((policy, key)): Path<(PolicyKind, String)>,
) -> ApiResult<Json<RateStatus>> {
    Ok(Json(state.gatekeeper.rate_limit_status(policy, &key).await?))
}

pub async fn clear_rate_limit(
    State(state): State<AppState>,
    Path((policy, key)): Path<(PolicyKind, String)>,
) -> ApiResult<Json<Value>> {
    let cleared = state.gatekeeper.clear_rate_limit(policy, &key).await?;
    Ok(Json(json!({ "policy": policy, "key": key, "cleared": cleared })))
}
