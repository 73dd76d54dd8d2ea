//! Runtime configuration from the environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid { name: &'static str, value: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv { Development, Production }

impl FromStr for AppEnv {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("expected development or production, got {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// `None` runs on the in-memory store.
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub app_env: AppEnv,
    pub store_timeout: Duration,
    pub order_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub seed_demo_data: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8083,
            database_url: None,
            nats_url: None,
            app_env: AppEnv::Production,
            store_timeout: Duration::from_millis(2000),
            order_max_attempts: 3,
            retry_base_delay: Duration::from_millis(25),
            seed_demo_data: false,
        }
    }
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let config = Self {
            port: parse_or(text("PORT"), "PORT", defaults.port)?,
            database_url: text("DATABASE_URL"),
            nats_url: text("NATS_URL"),
            app_env: parse_or(text("APP_ENV"), "APP_ENV", defaults.app_env)?,
            store_timeout: Duration::from_millis(parse_or(text("STORE_TIMEOUT_MS"), "STORE_TIMEOUT_MS", 2000u64)?),
            order_max_attempts: parse_or(text("ORDER_MAX_ATTEMPTS"), "ORDER_MAX_ATTEMPTS", defaults.order_max_attempts)?,
            retry_base_delay: Duration::from_millis(parse_or(text("RETRY_BASE_DELAY_MS"), "RETRY_BASE_DELAY_MS", 25u64)?),
            seed_demo_data: parse_or(text("SEED_DEMO_DATA"), "SEED_DEMO_DATA", defaults.seed_demo_data)?,
        };
        if config.order_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "ORDER_MAX_ATTEMPTS", value: "0".into(), reason: "must be at least 1".into(),
            });
        }
        if config.store_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                name: "STORE_TIMEOUT_MS", value: "0".into(), reason: "must be at least 1".into(),
            });
        }
        Ok(config)
    }

    pub fn is_development(&self) -> bool { self.app_env == AppEnv::Development }
}

fn parse_or<T>(raw: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse::<T>().map_err(|e| ConfigError::Invalid {
            name, reason: e.to_string(), value,
        }),
    }
}
