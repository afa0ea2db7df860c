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
    models::{NewRole, Role, RoleRequest, RoleWithPermissions},
    store::{Store, StoreError},
};

async fn with_permissions(store: &dyn Store, role: Role) -> Result<RoleWithPermissions, AppError> {
    let permissions = store.permissions_for_role(role.id).await?;
    Ok(RoleWithPermissions::new(role, permissions))
}

fn role_error(err: StoreError) -> AppError {
    match err {
        StoreError::NotFound => AppError::NotFound("Role not found".to_string()),
        StoreError::Conflict(_) => AppError::Conflict("Role name already exists".to_string()),
        other => other.into(),
    }
}

fn new_role(form: RoleRequest) -> Result<(NewRole, Option<Vec<i64>>), AppError> {
    let name = non_blank(Some(form.name)).ok_or_else(|| AppError::validation("Role name is required"))?;
    Ok((
        NewRole {
            name,
            description: non_blank(form.description),
        },
        form.permission_ids,
    ))
}

pub async fn list_roles(State(state): State<AppState>) -> Result<Json<Vec<RoleWithPermissions>>, AppError> {
    let roles = state.store.list_roles().await?;
    let mut result = Vec::with_capacity(roles.len());
    for role in roles {
        result.push(with_permissions(state.store.as_ref(), role).await?);
    }
    Ok(Json(result))
}

pub async fn get_role(
    State(state): State<AppState>,
    Path(role_id): Path<i64>,
) -> Result<Json<RoleWithPermissions>, AppError> {
    let role = state
        .store
        .find_role(role_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Role not found".to_string()))?;
    Ok(Json(with_permissions(state.store.as_ref(), role).await?))
}

pub async fn create_role(
    State(state): State<AppState>,
    payload: Result<Json<RoleRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RoleWithPermissions>), AppError> {
    let (role, permission_ids) = new_role(json_body(payload)?)?;

    let role = state
        .store
        .create_role(role, permission_ids.as_deref().unwrap_or_default())
        .await
        .map_err(role_error)?;

    log::info!("created role {} ({})", role.id, role.name);
    Ok((StatusCode::CREATED, Json(with_permissions(state.store.as_ref(), role).await?)))
}

pub async fn update_role(
    State(state): State<AppState>,
    Path(role_id): Path<i64>,
    payload: Result<Json<RoleRequest>, JsonRejection>,
) -> Result<Json<RoleWithPermissions>, AppError> {
    let (role, permission_ids) = new_role(json_body(payload)?)?;

    let role = state
        .store
        .update_role(role_id, role, permission_ids.as_deref())
        .await
        .map_err(role_error)?;

    Ok(Json(with_permissions(state.store.as_ref(), role).await?))
}

pub async fn delete_role(
    State(state): State<AppState>,
    Path(role_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    state.store.delete_role(role_id).await.map_err(role_error)?;
    log::info!("deleted role {}", role_id);
    Ok(Json(json!({ "ok": true })))
}
