pub mod permission;

pub use permission::{
    authorize, clear_session_cookie, get_current_user, require_admin_tier, require_super_admin,
    session_cookie, session_token, Requirement, SESSION_COOKIE,
};
