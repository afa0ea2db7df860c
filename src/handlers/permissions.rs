use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use super::{json_body, non_blank};
use crate::{
    app::AppState,
    error::AppError,
    models::{NewPermission, Permission, PermissionRequest},
    store::StoreError,
};

fn permission_error(err: StoreError) -> AppError {
    match err {
        StoreError::NotFound => AppError::NotFound("Permission not found".to_string()),
        StoreError::Conflict(_) => AppError::Conflict("Permission key already exists".to_string()),
        other => other.into(),
    }
}

fn new_permission(form: PermissionRequest) -> Result<NewPermission, AppError> {
    let key = non_blank(Some(form.key)).ok_or_else(|| AppError::validation("Permission key is required"))?;
    Ok(NewPermission {
        key,
        description: non_blank(form.description),
    })
}

pub async fn list_permissions(State(state): State<AppState>) -> Result<Json<Vec<Permission>>, AppError> {
    Ok(Json(state.store.list_permissions().await?))
}

pub async fn get_permission(
    State(state): State<AppState>,
    Path(permission_id): Path<i64>,
) -> Result<Json<Permission>, AppError> {
    state
        .store
        .find_permission(permission_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Permission not found".to_string()))
}

pub async fn create_permission(
    State(state): State<AppState>,
    payload: Result<Json<PermissionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Permission>), AppError> {
    let permission = new_permission(json_body(payload)?)?;
    let permission = state
        .store
        .create_permission(permission)
        .await
        .map_err(permission_error)?;
    Ok((StatusCode::CREATED, Json(permission)))
}

pub async fn update_permission(
    State(state): State<AppState>,
    Path(permission_id): Path<i64>,
    payload: Result<Json<PermissionRequest>, JsonRejection>,
) -> Result<Json<Permission>, AppError> {
    let permission = new_permission(json_body(payload)?)?;
    let permission = state
        .store
        .update_permission(permission_id, permission)
        .await
        .map_err(permission_error)?;
    Ok(Json(permission))
}

pub async fn delete_permission(
    State(state): State<AppState>,
    Path(permission_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    state
        .store
        .delete_permission(permission_id)
        .await
        .map_err(permission_error)?;
    Ok(Json(json!({ "ok": true })))
}
