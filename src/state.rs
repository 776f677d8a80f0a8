use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::auth::{
    jwt::TokenCodec,
    password::PasswordHasher,
    repo::{MemoryUserStore, PgUserStore, UserStore},
    services::CredentialService,
};
use crate::config::{AppConfig, JwtConfig};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CredentialService>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        if config.jwt.uses_default_secret() {
            warn!("JWT_SECRET is not set; signing tokens with the built-in development secret");
        }

        let store: Arc<dyn UserStore> = match &config.database_url {
            Some(url) => {
                let db = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?;

                sqlx::migrate!("./migrations")
                    .run(&db)
                    .await
                    .context("run migrations")?;
                info!("using postgres user store");
                Arc::new(PgUserStore::new(db)) as Arc<dyn UserStore>
            }
            None => {
                warn!("DATABASE_URL is not set; users are kept in memory and lost on restart");
                Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>
            }
        };

        let service = CredentialService::new(
            store,
            PasswordHasher::default(),
            TokenCodec::from_config(&config.jwt),
        );
        Ok(Self::from_parts(Arc::new(service)))
    }

    pub fn from_parts(service: Arc<CredentialService>) -> Self {
        Self { service }
    }

    /// In-memory state with cheap hashing, for tests.
    pub fn fake() -> Self {
        let jwt = JwtConfig {
            secret: "test-secret".into(),
            expiration_ms: 3_600_000,
        };
        let service = CredentialService::new(
            Arc::new(MemoryUserStore::new()),
            PasswordHasher::fast_insecure(),
            TokenCodec::from_config(&jwt),
        );
        Self::from_parts(Arc::new(service))
    }
}

impl FromRef<AppState> for TokenCodec {
    fn from_ref(state: &AppState) -> Self {
        state.service.tokens().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_without_database_uses_memory_store() {
        let config = AppConfig::from_lookup(|key| match key {
            "JWT_SECRET" => Some("state-secret".into()),
            _ => None,
        })
        .unwrap();
        let state = AppState::init(config).await.unwrap();
        assert_eq!(state.service.tokens().expires_in_secs(), 3600);

        let codec = TokenCodec::from_ref(&state);
        let token = codec.issue(uuid::Uuid::new_v4(), "ana@example.com").unwrap();
        let other = TokenCodec::new("state-secret", std::time::Duration::from_secs(60));
        assert!(other.verify(&token).is_ok());
    }
}
