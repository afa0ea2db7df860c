//! Session authentication and role-name authorization.
//!
//! A session is an opaque token stored server-side with an owning user and an
//! expiry. Resolution fails closed: any lookup problem reads as "not
//! authenticated". Only [`authenticate`] reports distinct failures, so the
//! login endpoint can answer 401 and 403 differently.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    models::{Session, SessionUserResponse, User, ROLE_ADMIN, ROLE_SUPERADMIN},
    store::{role_names_for_user, Store, StoreError},
    utils::{dummy_password_hash, generate_session_token, verify_password},
};

pub const SESSION_TTL_DAYS: i64 = 7;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email, no password set, or wrong password.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is inactive")]
    InactiveAccount,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("password verification failed: {0}")]
    Hashing(String),
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub roles: Vec<String>,
}

impl CurrentUser {
    pub fn from_user_and_roles(user: User, roles: Vec<String>) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            roles,
        }
    }

    pub fn is_admin_tier(&self) -> bool {
        is_admin_tier(&self.roles)
    }

    pub fn is_super_admin(&self) -> bool {
        is_super_admin(&self.roles)
    }
}

impl From<CurrentUser> for SessionUserResponse {
    fn from(user: CurrentUser) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            roles: user.roles,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub session: Session,
    pub user: CurrentUser,
}

pub fn is_admin_tier(roles: &[String]) -> bool {
    roles.iter().any(|r| r == ROLE_ADMIN || r == ROLE_SUPERADMIN)
}

pub fn is_super_admin(roles: &[String]) -> bool {
    roles.iter().any(|r| r == ROLE_SUPERADMIN)
}

/// Resolves a session token to its user and role names. Returns `None` for a
/// missing, unknown or expired token, an inactive user, and any store failure.
pub async fn resolve_session(
    store: &dyn Store,
    token: Option<&str>,
    now: DateTime<Utc>,
) -> Option<CurrentUser> {
    let token = token.filter(|t| !t.is_empty())?;

    let session = match store.find_session(token).await {
        Ok(Some(session)) => session,
        Ok(None) => return None,
        Err(e) => {
            log::warn!("session lookup failed: {}", e);
            return None;
        }
    };

    if !session.is_live_at(now) {
        return None;
    }

    let user = match store.find_user(session.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return None,
        Err(e) => {
            log::warn!("session user lookup failed: {}", e);
            return None;
        }
    };

    if !user.is_active {
        log::debug!("session of inactive user {} rejected", user.id);
        return None;
    }

    match role_names_for_user(store, user.id).await {
        Ok(roles) => Some(CurrentUser::from_user_and_roles(user, roles)),
        Err(e) => {
            log::warn!("role lookup failed for user {}: {}", user.id, e);
            None
        }
    }
}

/// Verifies credentials and opens a new session valid for
/// [`SESSION_TTL_DAYS`] days.
pub async fn authenticate(
    store: &dyn Store,
    email: &str,
    password: &str,
    now: DateTime<Utc>,
) -> Result<LoginOutcome, AuthError> {
    let user = store.find_user_by_email(email).await?;
    let password_hash = user.as_ref().and_then(|u| u.password_hash.clone());

    // Unknown emails and password-less accounts still pay for one bcrypt check
    let password = password.to_string();
    let matches = tokio::task::spawn_blocking(move || match password_hash {
        Some(hash) => verify_password(&password, &hash).unwrap_or(false),
        None => {
            let _ = verify_password(&password, dummy_password_hash());
            false
        }
    })
    .await
    .map_err(|e| AuthError::Hashing(e.to_string()))?;

    let user = match user {
        Some(user) if matches => user,
        _ => return Err(AuthError::InvalidCredentials),
    };

    if !user.is_active {
        return Err(AuthError::InactiveAccount);
    }

    match store.delete_expired_sessions(user.id, now).await {
        Ok(0) => {}
        Ok(purged) => log::debug!("purged {} expired sessions for user {}", purged, user.id),
        Err(e) => log::warn!("stale session cleanup failed for user {}: {}", user.id, e),
    }

    let session = store
        .create_session(Session {
            id: generate_session_token(),
            user_id: user.id,
            expires_at: now + Duration::days(SESSION_TTL_DAYS),
        })
        .await?;

    let roles = role_names_for_user(store, user.id).await?;
    log::info!("user {} logged in", user.id);

    Ok(LoginOutcome {
        session,
        user: CurrentUser::from_user_and_roles(user, roles),
    })
}

/// Deletes the session if it exists.
pub async fn end_session(store: &dyn Store, token: &str) -> Result<(), StoreError> {
    if store.delete_session(token).await? {
        log::debug!("session ended");
    }
    Ok(())
}
