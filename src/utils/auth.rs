use bcrypt::{hash, verify, BcryptError};
use std::sync::OnceLock;
use uuid::Uuid;

/// bcrypt work factor for stored password hashes.
pub const PASSWORD_HASH_COST: u32 = 10;

pub fn hash_password(password: &str) -> Result<String, BcryptError> {
    hash(password, PASSWORD_HASH_COST)
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, BcryptError> {
    verify(password, password_hash)
}

/// A cost-10 hash of a random secret. Logins with no stored hash verify
/// against it so they take as long as a wrong password.
pub fn dummy_password_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| {
        hash_password(&Uuid::new_v4().simple().to_string()).unwrap_or_else(|e| {
            log::error!("dummy password hash failed: {}", e);
            String::new()
        })
    })
}

/// 64 hex characters drawn from two random v4 UUIDs.
pub fn generate_session_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}
