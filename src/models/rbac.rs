use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const ROLE_COMUM: &str = "comum";
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_SUPERADMIN: &str = "superadmin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

// Permission keys are administrable metadata. Access checks look at role
// names only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Permission {
    pub id: i64,
    pub key: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewRole {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPermission {
    pub key: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRequest {
    pub name: String,
    pub description: Option<String>,
    pub permission_ids: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
pub struct PermissionRequest {
    pub key: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PermissionLink {
    pub permission: Permission,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoleWithPermissions {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<PermissionLink>,
}

impl RoleWithPermissions {
    pub fn new(role: Role, permissions: Vec<Permission>) -> Self {
        Self {
            id: role.id,
            name: role.name,
            description: role.description,
            permissions: permissions
                .into_iter()
                .map(|permission| PermissionLink { permission })
                .collect(),
        }
    }
}
