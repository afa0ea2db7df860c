use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use super::{json_body, non_blank, normalize_email};
use crate::{
    app::AppState,
    error::AppError,
    models::{Lead, LeadRequest, NewLead},
    store::StoreError,
};

/// Public contact / quote request form.
pub async fn create_lead(
    State(state): State<AppState>,
    payload: Result<Json<LeadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Lead>), AppError> {
    let form = json_body(payload)?;
    let (name, email) = match (non_blank(form.name), non_blank(form.email)) {
        (Some(name), Some(email)) if email.contains('@') => (name, normalize_email(&email)),
        _ => return Err(AppError::validation("Name and a valid email are required")),
    };

    let lead = state
        .store
        .create_lead(NewLead {
            name,
            email,
            phone: non_blank(form.phone),
            destination: non_blank(form.destination),
            notes: non_blank(form.notes),
        })
        .await?;

    log::info!("new lead {}", lead.id);
    Ok((StatusCode::CREATED, Json(lead)))
}

pub async fn list_leads(State(state): State<AppState>) -> Result<Json<Vec<Lead>>, AppError> {
    Ok(Json(state.store.list_leads().await?))
}

pub async fn delete_lead(
    State(state): State<AppState>,
    Path(lead_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    state.store.delete_lead(lead_id).await.map_err(|e| match e {
        StoreError::NotFound => AppError::NotFound("Lead not found".to_string()),
        other => other.into(),
    })?;
    Ok(Json(json!({ "ok": true })))
}
