//! Session resolution and role checks, applied as route layers so every
//! protected endpoint goes through the same code path.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use time::Duration;
use tower_cookies::{cookie::SameSite, Cookie, Cookies};

use crate::{
    app::AppState,
    error::AppError,
    services::session::{resolve_session, CurrentUser, SESSION_TTL_DAYS},
};

pub const SESSION_COOKIE: &str = "session_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Holds `admin` or `superadmin`.
    AdminTier,
    SuperAdmin,
}

impl Requirement {
    fn allows(self, user: &CurrentUser) -> bool {
        match self {
            Self::AdminTier => user.is_admin_tier(),
            Self::SuperAdmin => user.is_super_admin(),
        }
    }
}

pub fn session_token(cookies: &Cookies) -> Option<String> {
    cookies.get(SESSION_COOKIE).map(|c| c.value().to_string())
}

pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::days(SESSION_TTL_DAYS))
        .build()
}

pub fn clear_session_cookie(cookies: &Cookies) {
    cookies.remove(Cookie::build((SESSION_COOKIE, "")).path("/").build());
}

pub async fn get_current_user(state: &AppState, cookies: &Cookies) -> Option<CurrentUser> {
    let token = session_token(cookies);
    resolve_session(state.store.as_ref(), token.as_deref(), Utc::now()).await
}

pub async fn authorize(
    state: &AppState,
    cookies: &Cookies,
    requirement: Requirement,
) -> Result<CurrentUser, AppError> {
    let user = get_current_user(state, cookies)
        .await
        .ok_or_else(|| AppError::Unauthenticated("Not authenticated".to_string()))?;

    if !requirement.allows(&user) {
        log::debug!("user {} denied: requires {:?}", user.id, requirement);
        return Err(AppError::Forbidden("Insufficient permissions".to_string()));
    }

    Ok(user)
}

async fn enforce(
    state: AppState,
    cookies: Cookies,
    requirement: Requirement,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authorize(&state, &cookies, requirement).await?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

pub async fn require_admin_tier(
    State(state): State<AppState>,
    cookies: Cookies,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    enforce(state, cookies, Requirement::AdminTier, request, next).await
}

pub async fn require_super_admin(
    State(state): State<AppState>,
    cookies: Cookies,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    enforce(state, cookies, Requirement::SuperAdmin, request, next).await
}

/// Uses the user placed in the request by the route layers, falling back to
/// resolving the session cookie. Wrap in `Option` for anonymous-friendly
/// endpoints.
#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let cookies = Cookies::from_request_parts(parts, state)
            .await
            .map_err(|(_, message)| AppError::internal(message))?;

        get_current_user(state, &cookies)
            .await
            .ok_or_else(|| AppError::Unauthenticated("Not authenticated".to_string()))
    }
}
