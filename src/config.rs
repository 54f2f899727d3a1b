use dotenv::dotenv;
use once_cell::sync::Lazy;
use std::env;

use crate::constants::DEFAULT_CONFLICT_RETRY_LIMIT;
use crate::core::matcher::MatchStrategy;

const DEFAULT_JWT_SECRET: &str = "secret";

pub struct Config {
    pub port: u16,
    pub log_level: String,
    pub jwt_secret: String,
    pub jwt_ttl_secs: u64,
    pub settlement_strategy: MatchStrategy,
    pub conflict_retry_limit: usize,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("jwt_secret", &"<redacted>")
            .field("jwt_ttl_secs", &self.jwt_ttl_secs)
            .field("settlement_strategy", &self.settlement_strategy)
            .field("conflict_retry_limit", &self.conflict_retry_limit)
            .finish()
    }
}

impl Config {
    /// True when `JWT_SECRET` was not set and tokens are signed with the development default.
    pub fn uses_default_jwt_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }

    fn from_env() -> Self {
        dotenv().ok();

        Self {
            port: env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(3000),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string()),
            jwt_ttl_secs: env::var("JWT_TTL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(3600),
            settlement_strategy: env::var("SETTLEMENT_STRATEGY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            conflict_retry_limit: env::var("CONFLICT_RETRY_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_CONFLICT_RETRY_LIMIT),
        }
    }
}

pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);
