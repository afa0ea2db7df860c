pub mod auth;
pub mod content;
pub mod leads;
pub mod packages;
pub mod pages;
pub mod permissions;
pub mod roles;
pub mod users;

use axum::extract::rejection::JsonRejection;
use axum::Json;

use crate::{error::AppError, utils::hash_password};

pub const MIN_PASSWORD_LEN: usize = 6;

/// Unwraps a JSON body, answering 400 for malformed payloads.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::validation(rejection.body_text()))
}

/// Trimmed value, or `None` when absent or blank.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// bcrypt on the blocking pool.
pub(crate) async fn hash_new_password(password: String) -> Result<String, AppError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must have at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(AppError::internal)?
        .map_err(AppError::internal)
}
