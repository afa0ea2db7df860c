pub mod auth;
pub mod slug;

pub use auth::{
    dummy_password_hash, generate_session_token, hash_password, verify_password, PASSWORD_HASH_COST,
};
pub use slug::{slugify, unique_slug};
