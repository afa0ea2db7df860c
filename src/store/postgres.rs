use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use std::collections::HashMap;

use super::{
    ContentStore, LeadStore, PackageStore, PermissionStore, RoleStore, SessionStore, StoreError,
    StoreResult, UserStore,
};
use crate::{
    database::Database,
    models::{
        ContentUpdate, EditableContent, Lead, NewLead, NewPackage, NewPackageImage, NewPermission,
        NewRole, NewUser, Package, PackageImage, PackageWithImages, Permission, Role, Session,
        User, UserChanges,
    },
};

#[derive(Clone)]
pub struct PgStore {
    pool: Database,
}

impl PgStore {
    pub fn new(pool: Database) -> Self {
        Self { pool }
    }
}

fn map_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::Conflict(
                db_err.constraint().unwrap_or("unique constraint").to_string(),
            );
        }
        if db_err.is_foreign_key_violation() {
            return StoreError::Invalid(
                db_err.constraint().unwrap_or("foreign key").to_string(),
            );
        }
    }
    StoreError::Database(err)
}

async fn replace_user_roles(
    conn: &mut PgConnection,
    user_id: i64,
    role_ids: &[i64],
) -> StoreResult<()> {
    sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .map_err(map_err)?;

    for role_id in role_ids {
        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(role_id)
        .execute(&mut *conn)
        .await
        .map_err(map_err)?;
    }
    Ok(())
}

async fn replace_role_permissions(
    conn: &mut PgConnection,
    role_id: i64,
    permission_ids: &[i64],
) -> StoreResult<()> {
    sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
        .bind(role_id)
        .execute(&mut *conn)
        .await
        .map_err(map_err)?;

    for permission_id in permission_ids {
        sqlx::query(
            "INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(role_id)
        .bind(permission_id)
        .execute(&mut *conn)
        .await
        .map_err(map_err)?;
    }
    Ok(())
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user(&self, id: i64) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY name, id")
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
    }

    async fn create_user(&self, user: NewUser, role_ids: &[i64]) -> StoreResult<User> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, phone, password_hash, is_active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_err)?;

        replace_user_roles(&mut tx, created.id, role_ids).await?;

        tx.commit().await.map_err(map_err)?;
        Ok(created)
    }

    async fn update_user(
        &self,
        id: i64,
        changes: UserChanges,
        role_ids: Option<&[i64]>,
    ) -> StoreResult<User> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let clear_or_set_phone = changes.phone.is_some();
        let updated = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                name = COALESCE($1, name),
                email = COALESCE($2, email),
                phone = CASE WHEN $3 THEN $4 ELSE phone END,
                password_hash = COALESCE($5, password_hash),
                is_active = COALESCE($6, is_active)
            WHERE id = $7
            RETURNING *
            "#,
        )
        .bind(changes.name)
        .bind(changes.email)
        .bind(clear_or_set_phone)
        .bind(changes.phone.flatten())
        .bind(changes.password_hash)
        .bind(changes.is_active)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_err)?
        .ok_or(StoreError::NotFound)?;

        if let Some(role_ids) = role_ids {
            replace_user_roles(&mut tx, id, role_ids).await?;
        }

        tx.commit().await.map_err(map_err)?;
        Ok(updated)
    }

    async fn delete_user(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn roles_for_user(&self, user_id: i64) -> StoreResult<Vec<Role>> {
        sqlx::query_as::<_, Role>(
            r#"
            SELECT r.* FROM roles r
            JOIN user_roles ur ON r.id = ur.role_id
            WHERE ur.user_id = $1
            ORDER BY r.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create_session(&self, session: Session) -> StoreResult<Session> {
        sqlx::query_as::<_, Session>(
            "INSERT INTO sessions (id, user_id, expires_at) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(&session.id)
        .bind(session.user_id)
        .bind(session.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_err)
    }

    async fn find_session(&self, token: &str) -> StoreResult<Option<Session>> {
        sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)
    }

    async fn delete_session(&self, token: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired_sessions(&self, user_id: i64, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1 AND expires_at <= $2")
            .bind(user_id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RoleStore for PgStore {
    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        sqlx::query_as::<_, Role>("SELECT * FROM roles ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
    }

    async fn find_role(&self, id: i64) -> StoreResult<Option<Role>> {
        sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)
    }

    async fn create_role(&self, role: NewRole, permission_ids: &[i64]) -> StoreResult<Role> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let created = sqlx::query_as::<_, Role>(
            "INSERT INTO roles (name, description) VALUES ($1, $2) RETURNING *",
        )
        .bind(&role.name)
        .bind(&role.description)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_err)?;

        replace_role_permissions(&mut tx, created.id, permission_ids).await?;

        tx.commit().await.map_err(map_err)?;
        Ok(created)
    }

    async fn update_role(
        &self,
        id: i64,
        role: NewRole,
        permission_ids: Option<&[i64]>,
    ) -> StoreResult<Role> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let updated = sqlx::query_as::<_, Role>(
            "UPDATE roles SET name = $1, description = $2 WHERE id = $3 RETURNING *",
        )
        .bind(&role.name)
        .bind(&role.description)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_err)?
        .ok_or(StoreError::NotFound)?;

        if let Some(permission_ids) = permission_ids {
            replace_role_permissions(&mut tx, id, permission_ids).await?;
        }

        tx.commit().await.map_err(map_err)?;
        Ok(updated)
    }

    async fn delete_role(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn permissions_for_role(&self, role_id: i64) -> StoreResult<Vec<Permission>> {
        sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.* FROM permissions p
            JOIN role_permissions rp ON p.id = rp.permission_id
            WHERE rp.role_id = $1
            ORDER BY p.key
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)
    }
}

#[async_trait]
impl PermissionStore for PgStore {
    async fn list_permissions(&self) -> StoreResult<Vec<Permission>> {
        sqlx::query_as::<_, Permission>("SELECT * FROM permissions ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
    }

    async fn find_permission(&self, id: i64) -> StoreResult<Option<Permission>> {
        sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)
    }

    async fn create_permission(&self, permission: NewPermission) -> StoreResult<Permission> {
        sqlx::query_as::<_, Permission>(
            "INSERT INTO permissions (key, description) VALUES ($1, $2) RETURNING *",
        )
        .bind(&permission.key)
        .bind(&permission.description)
        .fetch_one(&self.pool)
        .await
        .map_err(map_err)
    }

    async fn update_permission(&self, id: i64, permission: NewPermission) -> StoreResult<Permission> {
        sqlx::query_as::<_, Permission>(
            "UPDATE permissions SET key = $1, description = $2 WHERE id = $3 RETURNING *",
        )
        .bind(&permission.key)
        .bind(&permission.description)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?
        .ok_or(StoreError::NotFound)
    }

    async fn delete_permission(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for PgStore {
    async fn find_content(&self, path: &str, key: &str) -> StoreResult<Option<EditableContent>> {
        sqlx::query_as::<_, EditableContent>(
            "SELECT path, key, content, updated_at FROM editable_contents WHERE path = $1 AND key = $2",
        )
        .bind(path)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)
    }

    async fn list_content(&self, path: &str) -> StoreResult<Vec<EditableContent>> {
        sqlx::query_as::<_, EditableContent>(
            "SELECT path, key, content, updated_at FROM editable_contents WHERE path = $1 ORDER BY key",
        )
        .bind(path)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)
    }

    async fn upsert_contents(&self, updates: &[ContentUpdate]) -> StoreResult<Vec<EditableContent>> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;
        let mut saved = Vec::with_capacity(updates.len());

        for update in updates {
            let row = sqlx::query_as::<_, EditableContent>(
                r#"
                INSERT INTO editable_contents (path, key, content, updated_at)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (path, key) DO UPDATE SET
                    content = EXCLUDED.content,
                    updated_at = NOW()
                RETURNING path, key, content, updated_at
                "#,
            )
            .bind(&update.path)
            .bind(&update.key)
            .bind(&update.content)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_err)?;
            saved.push(row);
        }

        tx.commit().await.map_err(map_err)?;
        Ok(saved)
    }
}

impl PgStore {
    async fn attach_images(&self, packages: Vec<Package>) -> StoreResult<Vec<PackageWithImages>> {
        let ids: Vec<i64> = packages.iter().map(|p| p.id).collect();
        let images = sqlx::query_as::<_, PackageImage>(
            "SELECT * FROM package_images WHERE package_id = ANY($1) ORDER BY position, id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        let mut by_package: HashMap<i64, Vec<PackageImage>> = HashMap::new();
        for image in images {
            by_package.entry(image.package_id).or_default().push(image);
        }

        Ok(packages
            .into_iter()
            .map(|package| {
                let images = by_package.remove(&package.id).unwrap_or_default();
                PackageWithImages { package, images }
            })
            .collect())
    }
}

#[async_trait]
impl PackageStore for PgStore {
    async fn list_packages(&self, active_only: bool) -> StoreResult<Vec<PackageWithImages>> {
        let packages = sqlx::query_as::<_, Package>(
            "SELECT * FROM packages WHERE ($1 = FALSE OR is_active = TRUE) ORDER BY created_at DESC, id DESC",
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        self.attach_images(packages).await
    }

    async fn find_package(&self, id: i64) -> StoreResult<Option<PackageWithImages>> {
        let package = sqlx::query_as::<_, Package>("SELECT * FROM packages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;

        match package {
            Some(package) => Ok(self.attach_images(vec![package]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn create_package(
        &self,
        package: NewPackage,
        images: Vec<NewPackageImage>,
    ) -> StoreResult<PackageWithImages> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let created = sqlx::query_as::<_, Package>(
            r#"
            INSERT INTO packages
                (title, slug, price, start_date, end_date, days, location, description, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(&package.title)
        .bind(&package.slug)
        .bind(package.price)
        .bind(package.start_date)
        .bind(package.end_date)
        .bind(package.days)
        .bind(&package.location)
        .bind(&package.description)
        .bind(package.is_active)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_err)?;

        let mut saved_images = Vec::with_capacity(images.len());
        for image in images {
            let row = sqlx::query_as::<_, PackageImage>(
                "INSERT INTO package_images (package_id, url, position) VALUES ($1, $2, $3) RETURNING *",
            )
            .bind(created.id)
            .bind(&image.url)
            .bind(image.position)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_err)?;
            saved_images.push(row);
        }

        tx.commit().await.map_err(map_err)?;

        Ok(PackageWithImages {
            package: created,
            images: saved_images,
        })
    }

    async fn delete_package(&self, id: i64) -> StoreResult<(Package, Vec<String>)> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let urls = sqlx::query_scalar::<_, String>(
            "DELETE FROM package_images WHERE package_id = $1 RETURNING url",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_err)?;

        let package = sqlx::query_as::<_, Package>("DELETE FROM packages WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_err)?;

        let Some(package) = package else {
            tx.rollback().await.map_err(map_err)?;
            return Err(StoreError::NotFound);
        };

        tx.commit().await.map_err(map_err)?;
        Ok((package, urls))
    }
}

#[async_trait]
impl LeadStore for PgStore {
    async fn create_lead(&self, lead: NewLead) -> StoreResult<Lead> {
        sqlx::query_as::<_, Lead>(
            r#"
            INSERT INTO leads (name, email, phone, destination, notes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&lead.name)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(&lead.destination)
        .bind(&lead.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(map_err)
    }

    async fn list_leads(&self) -> StoreResult<Vec<Lead>> {
        sqlx::query_as::<_, Lead>("SELECT * FROM leads ORDER BY created_at DESC, id DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
    }

    async fn delete_lead(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM leads WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
