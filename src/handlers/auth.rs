use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tower_cookies::Cookies;

use super::{hash_new_password, json_body, non_blank, normalize_email};
use crate::{
    app::AppState,
    error::AppError,
    middleware::{clear_session_cookie, session_cookie, session_token},
    models::{
        LoginRequest, NewUser, RegisterRequest, RegisteredUserResponse, SessionUserResponse,
        ROLE_COMUM,
    },
    services::session::{authenticate, end_session, CurrentUser},
    store::StoreError,
};

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: Option<SessionUserResponse>,
}

pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<SessionUserResponse>, AppError> {
    let form = json_body(payload)?;
    let (email, password) = match (non_blank(form.email), form.password.filter(|p| !p.is_empty())) {
        (Some(email), Some(password)) => (normalize_email(&email), password),
        _ => return Err(AppError::validation("Email and password are required")),
    };

    let outcome = authenticate(state.store.as_ref(), &email, &password, Utc::now()).await?;

    cookies.add(session_cookie(outcome.session.id, state.secure_cookies));

    Ok(Json(outcome.user.into()))
}

pub async fn logout(State(state): State<AppState>, cookies: Cookies) -> Json<Value> {
    if let Some(token) = session_token(&cookies) {
        if let Err(e) = end_session(state.store.as_ref(), &token).await {
            log::warn!("failed to delete session on logout: {}", e);
        }
    }
    clear_session_cookie(&cookies);
    Json(json!({ "ok": true }))
}

pub async fn me(user: Option<CurrentUser>) -> Json<MeResponse> {
    Json(MeResponse {
        user: user.map(SessionUserResponse::from),
    })
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisteredUserResponse>), AppError> {
    let form = json_body(payload)?;
    let (name, email, password) = match (
        non_blank(form.name),
        non_blank(form.email),
        form.password.filter(|p| !p.is_empty()),
    ) {
        (Some(name), Some(email), Some(password)) => (name, normalize_email(&email), password),
        _ => return Err(AppError::validation("Name, email and password are required")),
    };

    let password_hash = hash_new_password(password).await?;

    let comum = state
        .store
        .find_role_by_name(ROLE_COMUM)
        .await?
        .ok_or_else(|| AppError::internal(format!("role {} is missing", ROLE_COMUM)))?;

    let user = state
        .store
        .create_user(
            NewUser {
                name,
                email,
                phone: non_blank(form.phone),
                password_hash: Some(password_hash),
                is_active: true,
            },
            &[comum.id],
        )
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => AppError::Conflict("Email already registered".to_string()),
            other => other.into(),
        })?;

    log::info!("registered user {}", user.id);

    Ok((StatusCode::CREATED, Json(user.into())))
}
