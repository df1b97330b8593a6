use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::OnceCell;

use crate::constants::{DEFAULT_SERVER_PORT, DEFAULT_SLA_SCAN_INTERVAL_SECS};

static ENV: LazyLock<OnceCell<Env>> = LazyLock::new(OnceCell::new);

/// Process configuration, read from the environment once and shared for the
/// life of the process.
pub async fn env() -> EnvResult<&'static Env> {
    ENV.get_or_try_init(|| async { Env::load() }).await
}

pub type EnvResult<T> = core::result::Result<T, EnvError>;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("missing required environment variable '{0}'")]
    Missing(&'static str),

    #[error("invalid value for environment variable '{0}'")]
    Invalid(&'static str),
}

#[derive(Debug, Clone)]
pub struct Env {
    pub database_url: String,
    pub server_port: u16,
    pub cors_allow_origins: String,
    pub mail_relay_url: String,
    pub mail_sender: String,
    pub sla_scan_interval: Duration,
}

impl Env {
    pub fn load() -> EnvResult<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            server_port: parsed_or("SERVER_PORT", DEFAULT_SERVER_PORT)?,
            cors_allow_origins: optional("CORS_ALLOW_ORIGINS").unwrap_or_else(|| "*".to_string()),
            mail_relay_url: required("MAIL_RELAY_URL")?,
            mail_sender: required("MAIL_SENDER")?,
            sla_scan_interval: Duration::from_secs(parsed_or(
                "SLA_SCAN_INTERVAL_SECS",
                DEFAULT_SLA_SCAN_INTERVAL_SECS,
            )?),
        })
    }
}

fn optional(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &'static str) -> EnvResult<String> {
    optional(name).ok_or(EnvError::Missing(name))
}

fn parsed_or<T: FromStr>(name: &'static str, default: T) -> EnvResult<T> {
    match optional(name) {
        Some(raw) => raw.parse().map_err(|_| EnvError::Invalid(name)),
        None => Ok(default),
    }
}
