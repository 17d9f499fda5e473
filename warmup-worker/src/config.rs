//! Configuration module for environment variable parsing.
//!
//! Reads all configuration from environment variables. Secrets are optional
//! at load time; [`Config::validate`] enforces them at startup.

use std::env;
use std::str::FromStr;

use tracing::warn;
use url::Url;

use crate::error::{Result, WarmupError};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection URL
    pub database_url: Option<String>,

    /// Maximum pooled database connections
    pub database_max_connections: u32,

    /// Resend API key for outbound sends
    pub resend_api_key: Option<String>,

    /// Resend API base URL
    pub resend_api_url: String,

    /// Svix signing secret for inbound webhooks (`whsec_...`)
    pub webhook_secret: Option<String>,

    /// Bearer secret the cron runner must present
    pub cron_secret: Option<String>,

    /// HTTP request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Maximum age in seconds for webhook timestamps
    pub webhook_signature_max_age: u64,

    /// Probability of continuing an open thread instead of starting a new one
    pub reply_probability: f64,

    /// Probability of injecting a typo into a generated subject
    pub typo_probability: f64,

    /// Upper bound of sends per domain per cycle
    pub max_batch: u32,

    /// Port for the web server to listen on
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            database_url: non_empty("DATABASE_URL"),
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5),
            resend_api_key: non_empty("RESEND_API_KEY"),
            resend_api_url: env::var("RESEND_API_URL")
                .unwrap_or_else(|_| "https://api.resend.com".to_string()),
            webhook_secret: non_empty("RESEND_WEBHOOK_SECRET"),
            cron_secret: non_empty("WARMUP_CRON_SECRET"),
            request_timeout_ms: parse_or("REQUEST_TIMEOUT_MS", 8000),
            webhook_signature_max_age: parse_or("WEBHOOK_SIGNATURE_MAX_AGE", 300),
            reply_probability: parse_or("WARMUP_REPLY_PROBABILITY", 0.7),
            typo_probability: parse_or("WARMUP_TYPO_PROBABILITY", 0.2),
            max_batch: parse_or("WARMUP_MAX_BATCH", 2),
            port: parse_or("PORT", 8080),
        }
    }

    /// Check that every credential the web service needs is present.
    pub fn validate(&self) -> Result<()> {
        require(&[
            ("DATABASE_URL", &self.database_url),
            ("RESEND_API_KEY", &self.resend_api_key),
            ("RESEND_WEBHOOK_SECRET", &self.webhook_secret),
            ("WARMUP_CRON_SECRET", &self.cron_secret),
        ])?;
        self.validate_settings()
    }

    /// Check what a one-shot cycle needs: the store, the provider and the
    /// cycle settings. Webhook and cron secrets are not used there.
    pub fn validate_cycle(&self) -> Result<()> {
        require(&[
            ("DATABASE_URL", &self.database_url),
            ("RESEND_API_KEY", &self.resend_api_key),
        ])?;
        self.validate_settings()
    }

    /// Provider URL, probabilities and batch size.
    pub fn validate_settings(&self) -> Result<()> {
        Url::parse(&self.resend_api_url).map_err(|e| {
            WarmupError::Configuration(format!("invalid RESEND_API_URL: {e}"))
        })?;

        for (name, p) in [
            ("WARMUP_REPLY_PROBABILITY", self.reply_probability),
            ("WARMUP_TYPO_PROBABILITY", self.typo_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(WarmupError::Configuration(format!(
                    "{name} must be within 0.0..=1.0, got {p}"
                )));
            }
        }

        if self.max_batch == 0 {
            return Err(WarmupError::Configuration(
                "WARMUP_MAX_BATCH must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// First unset variable among `required`, as a configuration error.
fn require(required: &[(&str, &Option<String>)]) -> Result<()> {
    for (name, value) in required {
        if value.is_none() {
            return Err(WarmupError::Configuration(format!("missing {name}")));
        }
    }
    Ok(())
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: None,
            database_max_connections: 5,
            resend_api_key: None,
            resend_api_url: "https://api.resend.com".to_string(),
            webhook_secret: None,
            cron_secret: None,
            request_timeout_ms: 8000,
            webhook_signature_max_age: 300,
            reply_probability: 0.7,
            typo_probability: 0.2,
            max_batch: 2,
            port: 8080,
        }
    }
}

/// Read a variable, treating blank values as unset.
fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a variable, falling back to `default` when unset or invalid.
fn parse_or<T: FromStr + Copy>(name: &str, default: T) -> T {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}
