use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Environment variables checked, in order, for the database connection string.
pub const DATABASE_URL_VARS: [&str; 4] = [
    "DATABASE_URL",
    "POSTGRES_URL",
    "POSTGRES_PRISMA_URL",
    "POSTGRES_URL_NON_POOLING",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no database connection string found (checked {})", DATABASE_URL_VARS.join(", "))]
    MissingDatabaseUrl,

    #[error("invalid PORT value: {0}")]
    InvalidPort(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub uploads_dir: PathBuf,
    /// Adds the `Secure` attribute to the session cookie.
    pub secure_cookies: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = DATABASE_URL_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .find(|value| !value.trim().is_empty())
            .ok_or(ConfigError::MissingDatabaseUrl)?;

        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(raw))?,
            None => 3000,
        };

        let uploads_dir = lookup("UPLOADS_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("public/uploads"));

        let secure_cookies = lookup("APP_ENV")
            .map(|value| value.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        Ok(Self {
            database_url,
            port,
            uploads_dir,
            secure_cookies,
        })
    }
}
