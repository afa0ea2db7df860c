pub mod user;
pub mod rbac;
pub mod session;
pub mod content;
pub mod package;
pub mod lead;

pub use user::{
    User, NewUser, UserChanges, UserWithRoles, SessionUserResponse, RegisteredUserResponse,
    LoginRequest, RegisterRequest, CreateUserRequest, UpdateUserRequest,
};
pub use rbac::{
    Role, NewRole, RoleRequest, RoleWithPermissions,
    Permission, NewPermission, PermissionRequest,
    ROLE_COMUM, ROLE_ADMIN, ROLE_SUPERADMIN,
};
pub use session::Session;
pub use content::{
    EditableContent, ContentUpdate, ContentQuery, ContentBatchRequest, ContentBatchResponse,
    ContentEntry, PageContentResponse, SingleContentResponse, normalize_path,
};
pub use package::{
    Package, PackageImage, PackageWithImages, NewPackage, NewPackageImage, PublicPackage,
    format_brl,
};
pub use lead::{Lead, NewLead, LeadRequest};
