use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub price: Option<Decimal>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub days: Option<i32>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PackageImage {
    pub id: i64,
    pub package_id: i64,
    pub url: String,
    pub position: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageWithImages {
    #[serde(flatten)]
    pub package: Package,
    pub images: Vec<PackageImage>,
}

#[derive(Debug, Clone)]
pub struct NewPackage {
    pub title: String,
    pub slug: String,
    pub price: Option<Decimal>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub days: Option<i32>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct NewPackageImage {
    pub url: String,
    pub position: i32,
}

/// Shape served by the public listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicPackage {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub price: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub days: Option<i32>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub images: Vec<String>,
}

impl From<PackageWithImages> for PublicPackage {
    fn from(item: PackageWithImages) -> Self {
        let mut images = item.images;
        images.sort_by_key(|image| image.position);
        Self {
            id: item.package.id,
            title: item.package.title,
            slug: item.package.slug,
            price: item.package.price.map(format_brl),
            start_date: item.package.start_date,
            end_date: item.package.end_date,
            days: item.package.days,
            location: item.package.location,
            description: item.package.description,
            images: images.into_iter().map(|image| image.url).collect(),
        }
    }
}

/// Formats a price as Brazilian reais, e.g. `R$ 1.234,56`.
pub fn format_brl(value: Decimal) -> String {
    let rounded = value.round_dp(2);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    let text = format!("{:.2}", rounded.abs());
    let (integer, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let digits: Vec<char> = integer.chars().collect();
    let mut grouped = String::new();
    for (i, digit) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(*digit);
    }

    format!("{}R$ {},{}", sign, grouped, fraction)
}
