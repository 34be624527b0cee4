use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub openai: OpenAiConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origin of the single-page frontend; used for CORS and for the
    /// share links embedded in chat replies (e.g. `{frontend_url}/event/{id}`).
    pub frontend_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Which `EventStore` implementation to wire at startup:
    /// "sqlite" (default) or "memory".
    pub backend: StoreBackend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    /// Absent key is tolerated at startup; the extraction service surfaces
    /// a configuration error on first use instead.
    pub api_key: Option<String>,
    pub model: String,
    /// Number of attempts for transient extraction failures.
    pub max_retries: u32,
    /// Base delay in milliseconds; attempt N waits N * retry_delay_ms.
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for the chat endpoint
    pub chat_per_second: u32,
    /// Burst size for the chat endpoint
    pub chat_burst: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/flock.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                backend: match env::var("STORE_BACKEND") {
                    Ok(v) => match v.to_lowercase().as_str() {
                        "memory" => StoreBackend::Memory,
                        "sqlite" => StoreBackend::Sqlite,
                        _ => return Err(ConfigError::InvalidValue("STORE_BACKEND".to_string())),
                    },
                    Err(_) => StoreBackend::Sqlite,
                },
            },
            openai: OpenAiConfig {
                api_key: env::var("OPENAI_API_KEY").ok(),
                model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                max_retries: env::var("OPENAI_MAX_RETRIES")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .unwrap_or(3),
                retry_delay_ms: env::var("OPENAI_RETRY_DELAY_MS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()
                    .unwrap_or(1000),
            },
            rate_limit: RateLimitConfig {
                chat_per_second: env::var("RATE_LIMIT_CHAT_PER_SECOND")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
                chat_burst: env::var("RATE_LIMIT_CHAT_BURST")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                frontend_url: "http://localhost:3000".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://data/flock.db".to_string(),
                max_connections: 5,
                backend: StoreBackend::Sqlite,
            },
            openai: OpenAiConfig {
                api_key: None,
                model: "gpt-4o-mini".to_string(),
                max_retries: 3,
                retry_delay_ms: 1000,
            },
            rate_limit: RateLimitConfig {
                chat_per_second: 2,
                chat_burst: 10,
            },
        }
    }
}
