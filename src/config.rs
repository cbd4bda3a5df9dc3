//! Configuration management for Engram.
//!
//! Loads configuration from environment variables:
//! - Server bind address
//! - SQLite database path
//! - Qdrant connection and collection name
//! - Embedding providers with fallback priority
//! - Default namespace supplied when callers omit one

use std::env;
use std::sync::OnceLock;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration
pub fn config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Initialize configuration (call once at startup)
pub fn init() -> &'static Config {
    config()
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub qdrant: QdrantConfig,
    pub embedding: EmbeddingConfig,
    pub memory: MemoryConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct QdrantConfig {
    pub url: String,
    pub collection: String,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub providers: Vec<EmbeddingProvider>,
    pub dimension: usize,
}

#[derive(Debug, Clone)]
pub struct EmbeddingProvider {
    pub name: String,
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub priority: u8,
}

#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Namespace supplied by the protocol layer when a caller omits one.
    pub default_namespace: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            server: ServerConfig {
                host: env_or("HOST", "0.0.0.0"),
                port: env_or("PORT", "8970").parse().expect("Invalid PORT"),
            },
            database: DatabaseConfig {
                path: env_or("DATABASE_PATH", "./data/engram.db"),
            },
            qdrant: QdrantConfig {
                url: env_or("QDRANT_URL", "http://localhost:6334"),
                collection: env_or("QDRANT_COLLECTION", "engram_memories"),
            },
            embedding: Self::parse_embedding_config(),
            memory: MemoryConfig {
                default_namespace: env_or("DEFAULT_NAMESPACE", "user:default"),
            },
        }
    }

    /// Parse embedding providers from environment variables.
    ///
    /// `OPENAI_API_KEY` and `GEMINI_API_KEY` each enable a provider;
    /// endpoint and model can be overridden per provider via
    /// `{NAME}_EMBEDDING_URL` / `{NAME}_EMBEDDING_MODEL`.
    fn parse_embedding_config() -> EmbeddingConfig {
        let mut providers = Vec::new();

        if let Ok(key) = env::var("GEMINI_API_KEY") {
            if !key.is_empty() {
                providers.push(EmbeddingProvider {
                    name: "gemini".to_string(),
                    base_url: env_or(
                        "GEMINI_EMBEDDING_URL",
                        "https://generativelanguage.googleapis.com/v1beta",
                    ),
                    model: env_or("GEMINI_EMBEDDING_MODEL", "text-embedding-001"),
                    api_key: key,
                    priority: env_or("GEMINI_EMBEDDING_PRIORITY", "1").parse().unwrap_or(1),
                });
            }
        }

        if let Ok(key) = env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                providers.push(EmbeddingProvider {
                    name: "openai".to_string(),
                    base_url: env_or("OPENAI_EMBEDDING_URL", "https://api.openai.com/v1"),
                    model: env_or("OPENAI_EMBEDDING_MODEL", "text-embedding-3-small"),
                    api_key: key,
                    priority: env_or("OPENAI_EMBEDDING_PRIORITY", "2").parse().unwrap_or(2),
                });
            }
        }

        providers.sort_by_key(|p| p.priority);

        EmbeddingConfig {
            providers,
            dimension: env_or("EMBEDDING_DIMENSION", "384").parse().unwrap_or(384),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
