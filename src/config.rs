use std::path::PathBuf;

use thiserror::Error;

use crate::res;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub bot_token: String,
    pub bot_api_url: String,
    pub bind_addr: String,
    pub media_dir: PathBuf,
    pub media_base_url: String,
    pub webhook_secret: Option<String>,
    pub privacy_text: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("{key} must be a number, got {value:?}")]
    NotANumber { key: &'static str, value: String },
}

impl Config {
    /// Reads the environment, honouring a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut missing = Vec::new();
        let mut required = |key: &'static str| {
            get(key).unwrap_or_else(|| {
                missing.push(key);
                String::new()
            })
        };
        let database_url = required("DATABASE_URL");
        let bot_token = required("BOT_TOKEN");
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let db_max_connections = match get("DB_MAX_CONNECTIONS") {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::NotANumber { key: "DB_MAX_CONNECTIONS", value })?,
            None => 16,
        };

        Ok(Self {
            database_url,
            db_max_connections,
            bot_token,
            bot_api_url: get("BOT_API_URL").unwrap_or_else(|| "https://api.telegram.org".to_owned()),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_owned()),
            media_dir: get("MEDIA_DIR").unwrap_or_else(|| "./media".to_owned()).into(),
            media_base_url: get("MEDIA_BASE_URL")
                .unwrap_or_else(|| "http://localhost:8080/media".to_owned())
                .trim_end_matches('/')
                .to_owned(),
            webhook_secret: get("WEBHOOK_SECRET"),
            privacy_text: get("PRIVACY_TEXT").unwrap_or_else(|| res::PRIVACY.to_owned()),
        })
    }
}
