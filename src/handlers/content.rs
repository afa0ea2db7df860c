use axum::{
    extract::{rejection::JsonRejection, Query, State},
    response::{IntoResponse, Response},
    Extension, Json,
};

use super::{json_body, non_blank};
use crate::{
    app::AppState,
    error::AppError,
    models::{
        normalize_path, ContentBatchRequest, ContentBatchResponse, ContentEntry, ContentQuery,
        ContentUpdate, PageContentResponse, SingleContentResponse,
    },
    services::session::CurrentUser,
};

/// `?path=&key=` returns one field, `?path=` every field of the page.
pub async fn get_content(
    State(state): State<AppState>,
    Query(query): Query<ContentQuery>,
) -> Result<Response, AppError> {
    let path = non_blank(query.path)
        .map(|p| normalize_path(&p))
        .ok_or_else(|| AppError::validation("path is required"))?;

    match non_blank(query.key) {
        Some(key) => {
            let content = state
                .store
                .find_content(&path, &key)
                .await?
                .map(|row| row.content);
            Ok(Json(SingleContentResponse { content }).into_response())
        }
        None => {
            let contents = state
                .store
                .list_content(&path)
                .await?
                .into_iter()
                .map(|row| ContentEntry {
                    key: row.key,
                    content: row.content,
                })
                .collect();
            Ok(Json(PageContentResponse { contents }).into_response())
        }
    }
}

/// Batched upsert. Every triple is replaced wholesale by `(path, key)`; the
/// batch commits together or not at all.
pub async fn save_content(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    payload: Result<Json<ContentBatchRequest>, JsonRejection>,
) -> Result<Json<ContentBatchResponse>, AppError> {
    let updates = json_body(payload)?
        .updates
        .filter(|updates| !updates.is_empty())
        .ok_or_else(|| AppError::validation("updates must be a non-empty list"))?;

    let updates = updates
        .into_iter()
        .map(|update| {
            let key = update.key.trim().to_string();
            if key.is_empty() || update.path.trim().is_empty() {
                return Err(AppError::validation("every update needs a path and a key"));
            }
            Ok(ContentUpdate {
                path: normalize_path(&update.path),
                key,
                content: update.content,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let updated = state.store.upsert_contents(&updates).await?;
    log::info!("user {} saved {} content fields", user.id, updated.len());

    Ok(Json(ContentBatchResponse { updated }))
}
