//! Layered configuration: defaults, then an optional TOML file, then
//! `CAREDESK__*` environment variables, then `DATABASE_URL`.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use logger_redacted::LoggerConfig;
use serde::Deserialize;

/// Default configuration file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "caredesk.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    #[serde(default)]
    pub logging: LoggerConfig,
    pub cors: CorsSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// `postgres://...` or `memory://`
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// When off, resource routes are reachable without a token.
    pub enforce: bool,
    /// HS256 signing secret. Empty means a random per-process secret.
    pub jwt_secret: String,
    pub token_ttl_seconds: i64,
    pub issuer: String,
    pub bootstrap_admin: BootstrapAdmin,
}

/// Administrator account created when the user collection is empty.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub full_name: String,
    pub email: String,
    /// Seeding is skipped when no password is configured.
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    pub allowed_origins: Vec<String>,
}

impl AppConfig {
    /// Load configuration from `path` (missing file is fine) and the
    /// environment.
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = Self::defaults()?
            .add_source(File::new(path, FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix("CAREDESK")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cors.allowed_origins")
                    .try_parsing(true),
            );

        if let Ok(url) = std::env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", url)?;
        }

        builder
            .build()
            .and_then(|config| config.try_deserialize())
            .with_context(|| format!("Failed to load configuration from {path}"))
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            .set_default("database.url", database_layer::MEMORY_URL)?
            .set_default("auth.enforce", true)?
            .set_default("auth.jwt_secret", "")?
            .set_default("auth.token_ttl_seconds", 8 * 60 * 60)?
            .set_default("auth.issuer", "caredesk")?
            .set_default("auth.bootstrap_admin.username", "admin")?
            .set_default("auth.bootstrap_admin.full_name", "System Administrator")?
            .set_default("auth.bootstrap_admin.email", "admin@caredesk.local")?
            .set_default(
                "cors.allowed_origins",
                vec!["http://localhost:3000", "http://localhost:5173", "http://127.0.0.1:3000"],
            )?)
    }

    /// Configuration for in-process use (tests, tooling): in-memory store,
    /// fixed secret, no file or environment lookups.
    pub fn in_memory(enforce_auth: bool) -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseSettings {
                url: database_layer::MEMORY_URL.to_string(),
            },
            auth: AuthSettings {
                enforce: enforce_auth,
                jwt_secret: "caredesk-test-secret".to_string(),
                token_ttl_seconds: 3600,
                issuer: "caredesk".to_string(),
                bootstrap_admin: BootstrapAdmin {
                    username: "admin".to_string(),
                    full_name: "System Administrator".to_string(),
                    email: "admin@caredesk.local".to_string(),
                    password: Some("admin12345".to_string()),
                },
            },
            logging: LoggerConfig::default(),
            cors: CorsSettings {
                allowed_origins: vec!["http://localhost:3000".to_string()],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = AppConfig::load("does-not-exist.toml").unwrap();
        assert!(config.auth.token_ttl_seconds > 0);
        assert!(!config.cors.allowed_origins.is_empty());
        assert_eq!(config.auth.bootstrap_admin.username, "admin");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = std::env::temp_dir().join(format!("caredesk-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("caredesk.toml");
        std::fs::write(&path, "[server]\nport = 6100\n\n[auth]\nenforce = false\n").unwrap();

        let config = AppConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 6100);
        assert!(!config.auth.enforce);

        std::fs::remove_dir_all(dir).unwrap();
    }
}
