use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::Multipart;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::path::{Path as FsPath, PathBuf};
use std::str::FromStr;
use tokio::fs;
use uuid::Uuid;

use crate::{
    app::AppState,
    error::AppError,
    models::{NewPackage, NewPackageImage, PackageWithImages, PublicPackage},
    store::StoreError,
    utils::unique_slug,
};

pub const MAX_PACKAGE_IMAGES: usize = 5;
const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];
const UPLOADS_URL_PREFIX: &str = "/uploads/";

/// Active packages for the public site.
pub async fn list_packages(State(state): State<AppState>) -> Result<Json<Vec<PublicPackage>>, AppError> {
    let packages = state.store.list_packages(true).await?;
    Ok(Json(packages.into_iter().map(PublicPackage::from).collect()))
}

pub async fn admin_list_packages(
    State(state): State<AppState>,
) -> Result<Json<Vec<PackageWithImages>>, AppError> {
    Ok(Json(state.store.list_packages(false).await?))
}

pub async fn create_package(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<PackageWithImages>), AppError> {
    let (form, images) = parse_package_multipart(multipart).await?;
    let title = form.title.ok_or_else(|| AppError::validation("title is required"))?;

    let urls = save_images(&state.uploads_dir, images).await?;

    let package = NewPackage {
        slug: unique_slug(&title),
        title,
        price: form.price,
        start_date: form.start_date,
        end_date: form.end_date,
        days: form.days,
        location: form.location,
        description: form.description,
        is_active: form.is_active.unwrap_or(true),
    };
    let image_rows = urls
        .iter()
        .enumerate()
        .map(|(position, url)| NewPackageImage {
            url: url.clone(),
            position: position as i32,
        })
        .collect();

    match state.store.create_package(package, image_rows).await {
        Ok(created) => {
            log::info!("created package {} ({})", created.package.id, created.package.slug);
            Ok((StatusCode::CREATED, Json(created)))
        }
        Err(e) => {
            // Rows were not written, so the files just saved are orphans
            remove_uploads(&state.uploads_dir, &urls).await;
            Err(e.into())
        }
    }
}

/// Deletes the package and its image rows in one transaction, then removes
/// the image files. File removal failures are logged only.
pub async fn delete_package(
    State(state): State<AppState>,
    Path(package_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let (package, urls) = state.store.delete_package(package_id).await.map_err(|e| match e {
        StoreError::NotFound => AppError::NotFound("Package not found".to_string()),
        other => other.into(),
    })?;

    remove_uploads(&state.uploads_dir, &urls).await;
    log::info!("deleted package {} with {} images", package.id, urls.len());

    Ok(Json(json!({ "ok": true, "id": package.id })))
}

#[derive(Default)]
struct PackageFormData {
    title: Option<String>,
    price: Option<Decimal>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    days: Option<i32>,
    location: Option<String>,
    description: Option<String>,
    is_active: Option<bool>,
}

struct ImageData {
    extension: String,
    data: axum::body::Bytes,
}

fn invalid(field: &str) -> AppError {
    AppError::validation(format!("invalid value for {}", field))
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid(field))
}

fn parse_price(value: &str) -> Result<Decimal, AppError> {
    // Accepts both "1234.50" and "1.234,50"
    let normalized = if value.contains(',') {
        value.replace('.', "").replace(',', ".")
    } else {
        value.to_string()
    };
    Decimal::from_str(&normalized)
        .ok()
        .filter(|price| !price.is_sign_negative())
        .ok_or_else(|| invalid("price"))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "on" | "1" | "yes")
}

fn image_extension(file_name: &str) -> Option<String> {
    let extension = PathBuf::from(file_name)
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())?;
    IMAGE_EXTENSIONS.contains(&extension.as_str()).then_some(extension)
}

async fn parse_package_multipart(
    mut multipart: Multipart,
) -> Result<(PackageFormData, Vec<ImageData>), AppError> {
    let mut form = PackageFormData::default();
    let mut images = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(e.to_string()))?
    {
        let name = match field.name() {
            Some(name) => name.to_string(),
            None => continue,
        };

        if name == "images" || name == "images[]" {
            let file_name = field.file_name().map(|s| s.to_string());
            let data = field.bytes().await.map_err(|e| AppError::validation(e.to_string()))?;
            let Some(file_name) = file_name.filter(|_| !data.is_empty()) else {
                continue;
            };
            let extension = image_extension(&file_name)
                .ok_or_else(|| AppError::validation(format!("unsupported image type: {}", file_name)))?;
            images.push(ImageData { extension, data });
            if images.len() > MAX_PACKAGE_IMAGES {
                return Err(AppError::validation(format!(
                    "at most {} images per package",
                    MAX_PACKAGE_IMAGES
                )));
            }
            continue;
        }

        let text = field.text().await.map_err(|e| AppError::validation(e.to_string()))?;
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        match name.as_str() {
            "title" => form.title = Some(text.to_string()),
            "price" => form.price = Some(parse_price(text)?),
            "startDate" => form.start_date = Some(parse_date("startDate", text)?),
            "endDate" => form.end_date = Some(parse_date("endDate", text)?),
            "days" => form.days = Some(text.parse::<i32>().ok().filter(|d| *d > 0).ok_or_else(|| invalid("days"))?),
            "location" => form.location = Some(text.to_string()),
            "description" => form.description = Some(text.to_string()),
            "active" => form.is_active = Some(parse_flag(text)),
            _ => (),
        }
    }

    if let (Some(start), Some(end)) = (form.start_date, form.end_date) {
        if end < start {
            return Err(AppError::validation("endDate must not be before startDate"));
        }
    }

    Ok((form, images))
}

async fn save_images(uploads_dir: &FsPath, images: Vec<ImageData>) -> Result<Vec<String>, AppError> {
    if images.is_empty() {
        return Ok(Vec::new());
    }

    fs::create_dir_all(uploads_dir).await.map_err(AppError::internal)?;

    let mut urls = Vec::with_capacity(images.len());
    for image in images {
        let file_name = format!("{}.{}", Uuid::new_v4(), image.extension);
        if let Err(e) = fs::write(uploads_dir.join(&file_name), &image.data).await {
            remove_uploads(uploads_dir, &urls).await;
            return Err(AppError::internal(e));
        }
        urls.push(format!("{}{}", UPLOADS_URL_PREFIX, file_name));
    }
    Ok(urls)
}

/// Maps an upload URL back to its file, refusing anything outside the uploads dir.
fn upload_path(uploads_dir: &FsPath, url: &str) -> Option<PathBuf> {
    let file_name = url.strip_prefix(UPLOADS_URL_PREFIX)?;
    if file_name.is_empty() || file_name.contains('/') || file_name.contains('\\') || file_name.contains("..") {
        return None;
    }
    Some(uploads_dir.join(file_name))
}

async fn remove_uploads(uploads_dir: &FsPath, urls: &[String]) {
    for url in urls {
        let Some(path) = upload_path(uploads_dir, url) else {
            log::warn!("skipping removal of unexpected image url {}", url);
            continue;
        };
        if let Err(e) = fs::remove_file(&path).await {
            log::warn!("failed to remove image file {}: {}", path.display(), e);
        }
    }
}
