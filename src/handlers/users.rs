use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use super::{hash_new_password, json_body, non_blank, normalize_email};
use crate::{
    app::AppState,
    error::AppError,
    models::{CreateUserRequest, NewUser, UpdateUserRequest, User, UserChanges, UserWithRoles},
    store::{Store, StoreError},
};

async fn with_roles(store: &dyn Store, user: User) -> Result<UserWithRoles, AppError> {
    let roles = store.roles_for_user(user.id).await?;
    Ok(UserWithRoles::new(user, roles))
}

fn email_conflict(err: StoreError) -> AppError {
    match err {
        StoreError::Conflict(_) => AppError::Conflict("Email already registered".to_string()),
        other => other.into(),
    }
}

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserWithRoles>>, AppError> {
    let users = state.store.list_users().await?;
    let mut result = Vec::with_capacity(users.len());
    for user in users {
        result.push(with_roles(state.store.as_ref(), user).await?);
    }
    Ok(Json(result))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<UserWithRoles>, AppError> {
    let user = state
        .store
        .find_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(Json(with_roles(state.store.as_ref(), user).await?))
}

pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserWithRoles>), AppError> {
    let form = json_body(payload)?;
    let (name, email) = match (non_blank(Some(form.name)), non_blank(Some(form.email))) {
        (Some(name), Some(email)) => (name, normalize_email(&email)),
        _ => return Err(AppError::validation("Name and email are required")),
    };

    // Accounts created without a password cannot log in until one is set
    let password_hash = match form.password.filter(|p| !p.is_empty()) {
        Some(password) => Some(hash_new_password(password).await?),
        None => None,
    };

    let user = state
        .store
        .create_user(
            NewUser {
                name,
                email,
                phone: non_blank(form.phone),
                password_hash,
                is_active: form.is_active.unwrap_or(true),
            },
            &form.role_ids,
        )
        .await
        .map_err(email_conflict)?;

    log::info!("created user {}", user.id);
    Ok((StatusCode::CREATED, Json(with_roles(state.store.as_ref(), user).await?)))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<UserWithRoles>, AppError> {
    let form = json_body(payload)?;

    let password_hash = match form.password.filter(|p| !p.is_empty()) {
        Some(password) => Some(hash_new_password(password).await?),
        None => None,
    };

    let changes = UserChanges {
        name: non_blank(form.name),
        email: non_blank(form.email).map(|e| normalize_email(&e)),
        // An empty phone clears it; an absent one leaves it alone
        phone: form.phone.map(|phone| non_blank(Some(phone))),
        password_hash,
        is_active: form.is_active,
    };

    let user = state
        .store
        .update_user(user_id, changes, form.role_ids.as_deref())
        .await
        .map_err(|e| match e {
            StoreError::NotFound => AppError::NotFound("User not found".to_string()),
            other => email_conflict(other),
        })?;

    Ok(Json(with_roles(state.store.as_ref(), user).await?))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    state.store.delete_user(user_id).await.map_err(|e| match e {
        StoreError::NotFound => AppError::NotFound("User not found".to_string()),
        other => other.into(),
    })?;
    log::info!("deleted user {}", user_id);
    Ok(Json(json!({ "ok": true })))
}
