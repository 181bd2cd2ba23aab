use anyhow::{Context, Result};
use database_layer::{DocumentQuery, DocumentStore};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::auth::{SessionRegistry, TokenService};
use crate::config::AppConfig;
use crate::handlers::common::crud::stage_new;
use crate::handlers::common::resource::Resource;
use crate::handlers::users::Users;

/// Main CareDesk server state, shared by every handler.
#[derive(Clone)]
pub struct CareDeskServer {
    /// Loaded configuration
    pub config: Arc<AppConfig>,
    /// Document store holding every resource collection
    pub store: Arc<dyn DocumentStore>,
    /// Access token issuer/validator
    pub tokens: Arc<TokenService>,
    /// Tokens revoked by logout
    pub sessions: Arc<SessionRegistry>,
    started_at: Instant,
}

impl CareDeskServer {
    /// Connect the configured store and build the server state.
    pub async fn new(config: AppConfig) -> Result<Self> {
        let store = database_layer::connect(&config.database.url)
            .await
            .context("Failed to open the document store")?;
        Self::with_store(config, store).await
    }

    /// Build the server state over an existing store and seed the bootstrap
    /// administrator if there are no users yet.
    pub async fn with_store(config: AppConfig, store: Arc<dyn DocumentStore>) -> Result<Self> {
        let secret = if config.auth.jwt_secret.is_empty() {
            warn!("auth.jwt_secret is not set; using a random secret, tokens will not survive a restart");
            format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
        } else {
            config.auth.jwt_secret.clone()
        };
        let tokens = TokenService::new(
            secret.as_bytes(),
            config.auth.token_ttl_seconds,
            &config.auth.issuer,
        );

        let server = Self {
            config: Arc::new(config),
            store,
            tokens: Arc::new(tokens),
            sessions: Arc::new(SessionRegistry::new()),
            started_at: Instant::now(),
        };
        server.seed_bootstrap_admin().await?;
        Ok(server)
    }

    /// Seconds since the server state was created.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    async fn seed_bootstrap_admin(&self) -> Result<()> {
        let admin = &self.config.auth.bootstrap_admin;
        let Some(password) = admin.password.clone() else {
            return Ok(());
        };

        let existing = self
            .store
            .find(Users::COLLECTION, &DocumentQuery::new().window(Some(1), 0))
            .await
            .context("Failed to look up users")?;
        if existing.total > 0 {
            return Ok(());
        }

        let payload = serde_json::json!({
            "username": admin.username,
            "password": password,
            "fullName": admin.full_name,
            "email": admin.email,
            "role": "admin",
            "status": "active",
        });
        let (_, work) = stage_new::<Users>(self, payload)
            .await
            .map_err(|e| anyhow::anyhow!("Invalid bootstrap administrator: {}", e))?;
        self.store
            .commit(work)
            .await
            .context("Failed to create the bootstrap administrator")?;

        info!(username = %admin.username, "Bootstrap administrator created");
        Ok(())
    }
}
