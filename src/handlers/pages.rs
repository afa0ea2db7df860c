use askama::Template;
use axum::{extract::State, response::Html};
use std::collections::HashMap;

use crate::{
    app::AppState,
    error::AppError,
    models::PublicPackage,
    services::session::CurrentUser,
};

const HOME_PATH: &str = "/";

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
    hero_title: String,
    hero_subtitle: String,
    packages_title: String,
    contact_title: String,
    packages: Vec<PublicPackage>,
    user_name: Option<String>,
    can_edit: bool,
}

fn copy_or(copy: &mut HashMap<String, String>, key: &str, fallback: &str) -> String {
    copy.remove(key).unwrap_or_else(|| fallback.to_string())
}

pub async fn home(
    State(state): State<AppState>,
    user: Option<CurrentUser>,
) -> Result<Html<String>, AppError> {
    let mut copy: HashMap<String, String> = state
        .store
        .list_content(HOME_PATH)
        .await?
        .into_iter()
        .map(|row| (row.key, row.content))
        .collect();

    let packages = state
        .store
        .list_packages(true)
        .await?
        .into_iter()
        .map(PublicPackage::from)
        .collect();

    let template = HomeTemplate {
        hero_title: copy_or(&mut copy, "home.hero.title", "Viaje com a Roteiro"),
        hero_subtitle: copy_or(&mut copy, "home.hero.subtitle", "Pacotes completos para o Brasil e o mundo"),
        packages_title: copy_or(&mut copy, "home.packages.title", "Nossos pacotes"),
        contact_title: copy_or(&mut copy, "home.contact.title", "Fale com a gente"),
        packages,
        can_edit: user.as_ref().map(CurrentUser::is_super_admin).unwrap_or(false),
        user_name: user.map(|u| u.name),
    };

    Ok(Html(template.render().map_err(AppError::internal)?))
}
