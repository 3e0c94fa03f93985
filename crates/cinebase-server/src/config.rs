//! Configuration management

use crate::db::DbConfig;
use crate::ingest::IngestConfig;
use crate::sources::imdb_events::EventPageConfig;
use crate::sources::omdb::OmdbConfig;
use crate::sources::tmdb::TmdbConfig;
use crate::sources::universe::ExportConfig;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Default capacity of the notification channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DbConfig,
    pub cors: CorsConfig,
    pub sources: SourcesConfig,
    pub ingest: IngestConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
    pub event_capacity: usize,
}

/// CORS configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// External source clients
#[derive(Debug, Clone, Default)]
pub struct SourcesConfig {
    pub tmdb: TmdbConfig,
    pub omdb: OmdbConfig,
    pub export: ExportConfig,
    pub events: EventPageConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: std::env::var("CINEBASE_HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_parse("CINEBASE_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_parse("CINEBASE_SHUTDOWN_TIMEOUT", DEFAULT_SHUTDOWN_TIMEOUT_SECS),
                event_capacity: env_parse("CINEBASE_EVENT_CAPACITY", DEFAULT_EVENT_CAPACITY),
            },
            database: DbConfig::from_env()?,
            cors: CorsConfig {
                allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                allow_credentials: env_parse("CORS_ALLOW_CREDENTIALS", true),
            },
            sources: SourcesConfig {
                tmdb: TmdbConfig::from_env(),
                omdb: OmdbConfig::from_env(),
                export: ExportConfig::from_env(),
                events: EventPageConfig::from_env(),
            },
            ingest: IngestConfig::from_env()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.server.event_capacity == 0 {
            anyhow::bail!("Event channel capacity must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!("DB_MIN_CONNECTIONS cannot exceed DB_MAX_CONNECTIONS");
        }

        if self.ingest.enabled && self.sources.tmdb.api_key.is_empty() {
            anyhow::bail!("TMDB_API_KEY is required when ingestion is enabled");
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        if !self.sources.omdb.enabled() {
            tracing::warn!("OMDB_API_KEY not set - ratings enrichment will be skipped");
        }

        self.ingest.validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                event_capacity: DEFAULT_EVENT_CAPACITY,
            },
            database: DbConfig::default(),
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: true,
            },
            sources: SourcesConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let mut config = Config::default();
        config.ingest.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = Config::default();
        config.ingest.enabled = false;
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ingest_requires_tmdb_key() {
        let mut config = Config::default();
        config.ingest.enabled = true;
        config.sources.tmdb.api_key = String::new();
        assert!(config.validate().is_err());
    }
}
