use std::fmt;

use anyhow::Context;

/// Placeholder signing secret used when `JWT_SECRET` is not set.
pub const DEFAULT_JWT_SECRET: &str =
    "defaultSecretKeyForDevelopmentOnlyChangeInProduction123456789";

pub const DEFAULT_JWT_EXPIRATION_MS: u64 = 3_600_000;

const MIN_JWT_EXPIRATION_MS: u64 = 1_000;
/// Thirty days.
pub const MAX_JWT_EXPIRATION_MS: u64 = 2_592_000_000;

#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_ms: u64,
}

impl JwtConfig {
    pub fn uses_default_secret(&self) -> bool {
        self.secret == DEFAULT_JWT_SECRET
    }
}

// Keeps the secret out of `{:?}` output in logs.
impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("expiration_ms", &self.expiration_ms)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());

        let expiration_ms = match lookup("JWT_EXPIRATION_MS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("JWT_EXPIRATION_MS is not a number: {raw:?}"))?,
            None => DEFAULT_JWT_EXPIRATION_MS,
        };
        anyhow::ensure!(
            (MIN_JWT_EXPIRATION_MS..=MAX_JWT_EXPIRATION_MS).contains(&expiration_ms),
            "JWT_EXPIRATION_MS must be between {MIN_JWT_EXPIRATION_MS} and \
             {MAX_JWT_EXPIRATION_MS}, got {expiration_ms}"
        );

        let jwt = JwtConfig {
            secret: lookup("JWT_SECRET")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_JWT_SECRET.into()),
            expiration_ms,
        };

        let host = lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = match lookup("APP_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .with_context(|| format!("APP_PORT is not a valid port: {raw:?}"))?,
            None => 8080,
        };

        Ok(Self {
            database_url,
            jwt,
            host,
            port,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
