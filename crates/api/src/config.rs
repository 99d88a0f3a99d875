//! Process configuration read from the environment.

use std::time::Duration;

use thiserror::Error;

use busline_booking::{BookingPolicy, ReferenceGenerator};
use busline_infra::RetryPolicy;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("{0}")]
    Policy(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub jwt_secret: String,
    /// Selects the Postgres store when built with the `postgres` feature.
    pub database_url: Option<String>,
    pub policy: BookingPolicy,
    pub retry: RetryPolicy,
    pub references: ReferenceGenerator,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            database_url: None,
            policy: BookingPolicy::default(),
            retry: RetryPolicy::default(),
            references: ReferenceGenerator::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = var("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let window: i64 = parse_or(&var, "CANCELLATION_WINDOW_MINUTES", "a whole number of minutes", 120)?;
        let offset: i32 = parse_or(&var, "BOOKING_TZ_OFFSET_MINUTES", "a UTC offset in minutes", 0)?;
        let policy = BookingPolicy::from_minutes(window, offset)
            .map_err(|e| ConfigError::Policy(e.to_string()))?;

        let defaults = RetryPolicy::default();
        let attempts: u32 = parse_or(&var, "BOOKING_RETRY_ATTEMPTS", "a positive integer", defaults.attempts)?;
        let delay_ms: u64 = parse_or(
            &var,
            "BOOKING_RETRY_DELAY_MS",
            "milliseconds",
            defaults.delay.as_millis() as u64,
        )?;
        let timeout_ms: u64 = parse_or(
            &var,
            "STORE_TIMEOUT_MS",
            "milliseconds",
            defaults.timeout.as_millis() as u64,
        )?;
        let retry = RetryPolicy::new(attempts, Duration::from_millis(delay_ms))
            .with_timeout(Duration::from_millis(timeout_ms));

        let references = match var("BOOKING_REFERENCE_PREFIX") {
            Some(prefix) => {
                let max_attempts = ReferenceGenerator::default().max_attempts();
                ReferenceGenerator::new(prefix, max_attempts)
                    .map_err(|e| ConfigError::Policy(e.to_string()))?
            }
            None => ReferenceGenerator::default(),
        };

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            jwt_secret,
            database_url: var("DATABASE_URL"),
            policy,
            retry,
            references,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value,
        }),
    }
}
