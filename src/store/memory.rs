use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use super::{
    ContentStore, LeadStore, PackageStore, PermissionStore, RoleStore, SessionStore, StoreError,
    StoreResult, UserStore,
};
use crate::models::{
    ContentUpdate, EditableContent, Lead, NewLead, NewPackage, NewPackageImage, NewPermission,
    NewRole, NewUser, Package, PackageImage, PackageWithImages, Permission, Role, Session, User,
    UserChanges, ROLE_ADMIN, ROLE_COMUM, ROLE_SUPERADMIN,
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, User>,
    roles: BTreeMap<i64, Role>,
    user_roles: BTreeSet<(i64, i64)>,
    permissions: BTreeMap<i64, Permission>,
    role_permissions: BTreeSet<(i64, i64)>,
    sessions: BTreeMap<String, Session>,
    contents: BTreeMap<(String, String), EditableContent>,
    packages: BTreeMap<i64, Package>,
    package_images: BTreeMap<i64, PackageImage>,
    leads: BTreeMap<i64, Lead>,
}

impl Tables {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_role_ids(&self, role_ids: &[i64]) -> StoreResult<()> {
        match role_ids.iter().find(|id| !self.roles.contains_key(*id)) {
            Some(missing) => Err(StoreError::Invalid(format!("role {}", missing))),
            None => Ok(()),
        }
    }

    fn check_permission_ids(&self, permission_ids: &[i64]) -> StoreResult<()> {
        match permission_ids.iter().find(|id| !self.permissions.contains_key(*id)) {
            Some(missing) => Err(StoreError::Invalid(format!("permission {}", missing))),
            None => Ok(()),
        }
    }

    fn replace_user_roles(&mut self, user_id: i64, role_ids: &[i64]) {
        self.user_roles.retain(|(u, _)| *u != user_id);
        for role_id in role_ids {
            self.user_roles.insert((user_id, *role_id));
        }
    }

    fn replace_role_permissions(&mut self, role_id: i64, permission_ids: &[i64]) {
        self.role_permissions.retain(|(r, _)| *r != role_id);
        for permission_id in permission_ids {
            self.role_permissions.insert((role_id, *permission_id));
        }
    }
}

/// In-memory store with the same uniqueness and cascade rules as the
/// PostgreSQL schema. Seeded with the three built-in roles.
pub struct MemoryStore {
    tables: Mutex<Tables>,
    /// Index of the triple at which `upsert_contents` fails mid-batch.
    fail_content_write_at: Mutex<Option<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut tables = Tables::default();
        for name in [ROLE_COMUM, ROLE_ADMIN, ROLE_SUPERADMIN] {
            let id = tables.id();
            tables.roles.insert(
                id,
                Role {
                    id,
                    name: name.to_string(),
                    description: None,
                },
            );
        }
        Self {
            tables: Mutex::new(tables),
            fail_content_write_at: Mutex::new(None),
        }
    }

    pub fn fail_content_write_at(&self, index: Option<usize>) {
        *self.fail_content_write_at.lock().unwrap() = index;
    }

    pub fn session_count(&self) -> usize {
        self.tables.lock().unwrap().sessions.len()
    }

    pub fn image_count(&self, package_id: i64) -> usize {
        self.tables
            .lock()
            .unwrap()
            .package_images
            .values()
            .filter(|image| image.package_id == package_id)
            .count()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().unwrap().users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self.tables.lock().unwrap().users.values().cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn create_user(&self, user: NewUser, role_ids: &[i64]) -> StoreResult<User> {
        let mut tables = self.tables.lock().unwrap();
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("users_email_key".to_string()));
        }
        tables.check_role_ids(role_ids)?;
        let id = tables.id();
        let created = User {
            id,
            name: user.name,
            email: user.email,
            phone: user.phone,
            password_hash: user.password_hash,
            is_active: user.is_active,
            created_at: Utc::now(),
        };
        tables.users.insert(id, created.clone());
        tables.replace_user_roles(id, role_ids);
        Ok(created)
    }

    async fn update_user(
        &self,
        id: i64,
        changes: UserChanges,
        role_ids: Option<&[i64]>,
    ) -> StoreResult<User> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.users.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        if let Some(email) = &changes.email {
            if tables.users.values().any(|u| &u.email == email && u.id != id) {
                return Err(StoreError::Conflict("users_email_key".to_string()));
            }
        }
        if let Some(role_ids) = role_ids {
            tables.check_role_ids(role_ids)?;
            tables.replace_user_roles(id, role_ids);
        }
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(phone) = changes.phone {
            user.phone = phone;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = Some(hash);
        }
        if let Some(active) = changes.is_active {
            user.is_active = active;
        }
        Ok(user.clone())
    }

    async fn delete_user(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.tables.lock().unwrap();
        tables.users.remove(&id).ok_or(StoreError::NotFound)?;
        tables.user_roles.retain(|(user_id, _)| *user_id != id);
        tables.sessions.retain(|_, s| s.user_id != id);
        Ok(())
    }

    async fn roles_for_user(&self, user_id: i64) -> StoreResult<Vec<Role>> {
        let tables = self.tables.lock().unwrap();
        let mut roles: Vec<Role> = tables
            .user_roles
            .iter()
            .filter(|(u, _)| *u == user_id)
            .filter_map(|(_, r)| tables.roles.get(r).cloned())
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: Session) -> StoreResult<Session> {
        let mut tables = self.tables.lock().unwrap();
        if tables.sessions.contains_key(&session.id) {
            return Err(StoreError::Conflict("sessions_pkey".to_string()));
        }
        tables.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn find_session(&self, token: &str) -> StoreResult<Option<Session>> {
        Ok(self.tables.lock().unwrap().sessions.get(token).cloned())
    }

    async fn delete_session(&self, token: &str) -> StoreResult<bool> {
        Ok(self.tables.lock().unwrap().sessions.remove(token).is_some())
    }

    async fn delete_expired_sessions(&self, user_id: i64, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.sessions.len();
        tables
            .sessions
            .retain(|_, s| !(s.user_id == user_id && s.expires_at <= now));
        Ok((before - tables.sessions.len()) as u64)
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        let mut roles: Vec<Role> = self.tables.lock().unwrap().roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn find_role(&self, id: i64) -> StoreResult<Option<Role>> {
        Ok(self.tables.lock().unwrap().roles.get(&id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.roles.values().find(|r| r.name == name).cloned())
    }

    async fn create_role(&self, role: NewRole, permission_ids: &[i64]) -> StoreResult<Role> {
        let mut tables = self.tables.lock().unwrap();
        if tables.roles.values().any(|r| r.name == role.name) {
            return Err(StoreError::Conflict("roles_name_key".to_string()));
        }
        tables.check_permission_ids(permission_ids)?;
        let id = tables.id();
        let created = Role {
            id,
            name: role.name,
            description: role.description,
        };
        tables.roles.insert(id, created.clone());
        tables.replace_role_permissions(id, permission_ids);
        Ok(created)
    }

    async fn update_role(
        &self,
        id: i64,
        role: NewRole,
        permission_ids: Option<&[i64]>,
    ) -> StoreResult<Role> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.roles.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        if tables.roles.values().any(|r| r.name == role.name && r.id != id) {
            return Err(StoreError::Conflict("roles_name_key".to_string()));
        }
        if let Some(permission_ids) = permission_ids {
            tables.check_permission_ids(permission_ids)?;
            tables.replace_role_permissions(id, permission_ids);
        }
        let existing = tables.roles.get_mut(&id).ok_or(StoreError::NotFound)?;
        existing.name = role.name;
        existing.description = role.description;
        Ok(existing.clone())
    }

    async fn delete_role(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.tables.lock().unwrap();
        tables.roles.remove(&id).ok_or(StoreError::NotFound)?;
        tables.user_roles.retain(|(_, r)| *r != id);
        tables.role_permissions.retain(|(r, _)| *r != id);
        Ok(())
    }

    async fn permissions_for_role(&self, role_id: i64) -> StoreResult<Vec<Permission>> {
        let tables = self.tables.lock().unwrap();
        let mut permissions: Vec<Permission> = tables
            .role_permissions
            .iter()
            .filter(|(r, _)| *r == role_id)
            .filter_map(|(_, p)| tables.permissions.get(p).cloned())
            .collect();
        permissions.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(permissions)
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn list_permissions(&self) -> StoreResult<Vec<Permission>> {
        let mut permissions: Vec<Permission> =
            self.tables.lock().unwrap().permissions.values().cloned().collect();
        permissions.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(permissions)
    }

    async fn find_permission(&self, id: i64) -> StoreResult<Option<Permission>> {
        Ok(self.tables.lock().unwrap().permissions.get(&id).cloned())
    }

    async fn create_permission(&self, permission: NewPermission) -> StoreResult<Permission> {
        let mut tables = self.tables.lock().unwrap();
        if tables.permissions.values().any(|p| p.key == permission.key) {
            return Err(StoreError::Conflict("permissions_key_key".to_string()));
        }
        let id = tables.id();
        let created = Permission {
            id,
            key: permission.key,
            description: permission.description,
        };
        tables.permissions.insert(id, created.clone());
        Ok(created)
    }

    async fn update_permission(&self, id: i64, permission: NewPermission) -> StoreResult<Permission> {
        let mut tables = self.tables.lock().unwrap();
        if tables.permissions.values().any(|p| p.key == permission.key && p.id != id) {
            return Err(StoreError::Conflict("permissions_key_key".to_string()));
        }
        let existing = tables.permissions.get_mut(&id).ok_or(StoreError::NotFound)?;
        existing.key = permission.key;
        existing.description = permission.description;
        Ok(existing.clone())
    }

    async fn delete_permission(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.tables.lock().unwrap();
        tables.permissions.remove(&id).ok_or(StoreError::NotFound)?;
        tables.role_permissions.retain(|(_, p)| *p != id);
        Ok(())
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn find_content(&self, path: &str, key: &str) -> StoreResult<Option<EditableContent>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .contents
            .get(&(path.to_string(), key.to_string()))
            .cloned())
    }

    async fn list_content(&self, path: &str) -> StoreResult<Vec<EditableContent>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .contents
            .values()
            .filter(|c| c.path == path)
            .cloned()
            .collect())
    }

    /// Writes into a staging copy that replaces the table only once every
    /// triple went through, like the transaction in `PgStore`.
    async fn upsert_contents(&self, updates: &[ContentUpdate]) -> StoreResult<Vec<EditableContent>> {
        let fail_at = *self.fail_content_write_at.lock().unwrap();
        let mut tables = self.tables.lock().unwrap();
        let mut staged = tables.contents.clone();
        let now = Utc::now();
        let mut saved = Vec::with_capacity(updates.len());
        for (index, update) in updates.iter().enumerate() {
            if fail_at == Some(index) {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            let row = EditableContent {
                path: update.path.clone(),
                key: update.key.clone(),
                content: update.content.clone(),
                updated_at: now,
            };
            staged.insert((row.path.clone(), row.key.clone()), row.clone());
            saved.push(row);
        }
        tables.contents = staged;
        Ok(saved)
    }
}

impl MemoryStore {
    fn with_images(tables: &Tables, package: Package) -> PackageWithImages {
        let mut images: Vec<PackageImage> = tables
            .package_images
            .values()
            .filter(|image| image.package_id == package.id)
            .cloned()
            .collect();
        images.sort_by_key(|image| (image.position, image.id));
        PackageWithImages { package, images }
    }
}

#[async_trait]
impl PackageStore for MemoryStore {
    async fn list_packages(&self, active_only: bool) -> StoreResult<Vec<PackageWithImages>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .packages
            .values()
            .rev()
            .filter(|p| !active_only || p.is_active)
            .cloned()
            .map(|p| Self::with_images(&tables, p))
            .collect())
    }

    async fn find_package(&self, id: i64) -> StoreResult<Option<PackageWithImages>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .packages
            .get(&id)
            .cloned()
            .map(|p| Self::with_images(&tables, p)))
    }

    async fn create_package(
        &self,
        package: NewPackage,
        images: Vec<NewPackageImage>,
    ) -> StoreResult<PackageWithImages> {
        let mut tables = self.tables.lock().unwrap();
        if tables.packages.values().any(|p| p.slug == package.slug) {
            return Err(StoreError::Conflict("packages_slug_key".to_string()));
        }
        let id = tables.id();
        let created = Package {
            id,
            title: package.title,
            slug: package.slug,
            price: package.price,
            start_date: package.start_date,
            end_date: package.end_date,
            days: package.days,
            location: package.location,
            description: package.description,
            is_active: package.is_active,
            created_at: Utc::now(),
        };
        tables.packages.insert(id, created.clone());
        for image in images {
            let image_id = tables.id();
            tables.package_images.insert(
                image_id,
                PackageImage {
                    id: image_id,
                    package_id: id,
                    url: image.url,
                    position: image.position,
                },
            );
        }
        Ok(Self::with_images(&tables, created))
    }

    async fn delete_package(&self, id: i64) -> StoreResult<(Package, Vec<String>)> {
        let mut tables = self.tables.lock().unwrap();
        let package = tables.packages.remove(&id).ok_or(StoreError::NotFound)?;
        let urls = tables
            .package_images
            .values()
            .filter(|image| image.package_id == id)
            .map(|image| image.url.clone())
            .collect();
        tables.package_images.retain(|_, image| image.package_id != id);
        Ok((package, urls))
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn create_lead(&self, lead: NewLead) -> StoreResult<Lead> {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.id();
        let created = Lead {
            id,
            name: lead.name,
            email: lead.email,
            phone: lead.phone,
            destination: lead.destination,
            notes: lead.notes,
            created_at: Utc::now(),
        };
        tables.leads.insert(id, created.clone());
        Ok(created)
    }

    async fn list_leads(&self) -> StoreResult<Vec<Lead>> {
        Ok(self.tables.lock().unwrap().leads.values().rev().cloned().collect())
    }

    async fn delete_lead(&self, id: i64) -> StoreResult<()> {
        self.tables
            .lock()
            .unwrap()
            .leads
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}
