//! Data-mapping layer between the HTTP handlers and the relational store.
//!
//! Each aggregate gets its own trait; [`Store`] bundles them so handlers can
//! hold a single `Arc<dyn Store>`. [`PgStore`] is the PostgreSQL backend.

pub mod postgres;
#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    ContentUpdate, EditableContent, Lead, NewLead, NewPackage, NewPackageImage, NewPermission,
    NewRole, NewUser, Package, PackageWithImages, Permission, Role, Session, User, UserChanges,
};

pub use postgres::PgStore;
#[cfg(test)]
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    /// A unique constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A referenced record does not exist.
    #[error("invalid reference: {0}")]
    Invalid(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, id: i64) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn list_users(&self) -> StoreResult<Vec<User>>;
    /// Inserts the user and its role assignments in one transaction.
    async fn create_user(&self, user: NewUser, role_ids: &[i64]) -> StoreResult<User>;
    /// Applies the changes and, when `role_ids` is given, replaces the role
    /// assignments, all in one transaction.
    async fn update_user(
        &self,
        id: i64,
        changes: UserChanges,
        role_ids: Option<&[i64]>,
    ) -> StoreResult<User>;
    async fn delete_user(&self, id: i64) -> StoreResult<()>;
    async fn roles_for_user(&self, user_id: i64) -> StoreResult<Vec<Role>>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: Session) -> StoreResult<Session>;
    async fn find_session(&self, token: &str) -> StoreResult<Option<Session>>;
    /// Returns `true` when a row was removed.
    async fn delete_session(&self, token: &str) -> StoreResult<bool>;
    /// Purges the user's sessions that expired at or before `now`.
    async fn delete_expired_sessions(&self, user_id: i64, now: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn list_roles(&self) -> StoreResult<Vec<Role>>;
    async fn find_role(&self, id: i64) -> StoreResult<Option<Role>>;
    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>>;
    /// Inserts the role and its permission links in one transaction.
    async fn create_role(&self, role: NewRole, permission_ids: &[i64]) -> StoreResult<Role>;
    async fn update_role(
        &self,
        id: i64,
        role: NewRole,
        permission_ids: Option<&[i64]>,
    ) -> StoreResult<Role>;
    async fn delete_role(&self, id: i64) -> StoreResult<()>;
    async fn permissions_for_role(&self, role_id: i64) -> StoreResult<Vec<Permission>>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn list_permissions(&self) -> StoreResult<Vec<Permission>>;
    async fn find_permission(&self, id: i64) -> StoreResult<Option<Permission>>;
    async fn create_permission(&self, permission: NewPermission) -> StoreResult<Permission>;
    async fn update_permission(&self, id: i64, permission: NewPermission) -> StoreResult<Permission>;
    async fn delete_permission(&self, id: i64) -> StoreResult<()>;
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn find_content(&self, path: &str, key: &str) -> StoreResult<Option<EditableContent>>;
    async fn list_content(&self, path: &str) -> StoreResult<Vec<EditableContent>>;
    /// Upserts every triple by `(path, key)` in one transaction.
    async fn upsert_contents(&self, updates: &[ContentUpdate]) -> StoreResult<Vec<EditableContent>>;
}

#[async_trait]
pub trait PackageStore: Send + Sync {
    async fn list_packages(&self, active_only: bool) -> StoreResult<Vec<PackageWithImages>>;
    async fn find_package(&self, id: i64) -> StoreResult<Option<PackageWithImages>>;
    async fn create_package(
        &self,
        package: NewPackage,
        images: Vec<NewPackageImage>,
    ) -> StoreResult<PackageWithImages>;
    /// Deletes the images and the package in one transaction and hands back
    /// the deleted image URLs.
    async fn delete_package(&self, id: i64) -> StoreResult<(Package, Vec<String>)>;
}

#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn create_lead(&self, lead: NewLead) -> StoreResult<Lead>;
    async fn list_leads(&self) -> StoreResult<Vec<Lead>>;
    async fn delete_lead(&self, id: i64) -> StoreResult<()>;
}

pub trait Store:
    UserStore + SessionStore + RoleStore + PermissionStore + ContentStore + PackageStore + LeadStore
{
}

impl<T> Store for T where
    T: UserStore + SessionStore + RoleStore + PermissionStore + ContentStore + PackageStore + LeadStore
{
}

/// Role names held by the user, the input to every authorization check.
pub async fn role_names_for_user(store: &dyn Store, user_id: i64) -> StoreResult<Vec<String>> {
    let mut names: Vec<String> = store
        .roles_for_user(user_id)
        .await?
        .into_iter()
        .map(|role| role.name)
        .collect();
    names.sort();
    names.dedup();
    Ok(names)
}
