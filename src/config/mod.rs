pub mod policy;
pub mod rate_limits;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::config::policy::PipelinePolicy;
use crate::config::rate_limits::RateLimits;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow!("unknown STORE_BACKEND: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
}

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub endpoint: String,
    pub region: String,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub app_mode: String,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub redis_url: Option<String>,
    pub s3: Option<S3Config>,
    pub media_base_url: String,
    pub queue: Option<QueueConfig>,
    pub triage_endpoint: Option<String>,
    pub policy: PipelinePolicy,
    pub rate_limits: RateLimits,
    pub fingerprint_salt: [u8; 32],
    pub paseto_access_key: [u8; 32],
    pub access_ttl_minutes: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:8080");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;
        let app_mode = env_or("APP_MODE", "api");
        let store_backend: StoreBackend = env_or_parse("STORE_BACKEND", "postgres")?;

        let database_url = std::env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(anyhow!("missing required env var: DATABASE_URL"));
        }

        let s3_region = env_or("S3_REGION", "us-east-1");
        let s3 = match std::env::var("S3_ENDPOINT").ok() {
            Some(endpoint) => Some(S3Config {
                endpoint,
                region: s3_region.clone(),
                bucket: env_or_err("S3_BUCKET")?,
            }),
            None => None,
        };

        let queue = match std::env::var("QUEUE_NAME").ok() {
            Some(name) => Some(QueueConfig {
                endpoint: env_or_err("QUEUE_ENDPOINT")?,
                region: std::env::var("QUEUE_REGION").unwrap_or_else(|_| s3_region.clone()),
                name,
            }),
            None => None,
        };

        let policy = PipelinePolicy {
            triage_timeout_ms: env_or_parse("TRIAGE_TIMEOUT_MS", "5000")?,
            triage_stale_after_seconds: env_or_parse("TRIAGE_STALE_AFTER_SECONDS", "600")?,
            anon_duplicate_window_seconds: env_or_parse("ANON_DUPLICATE_WINDOW_SECONDS", "1800")?,
            anon_duplicate_radius_meters: env_or_parse("ANON_DUPLICATE_RADIUS_METERS", "150")?,
        };

        let defaults = RateLimits::default();
        let rate_limits = RateLimits {
            reports_per_hour: env_or_parse("RATE_REPORTS_PER_HOUR", &defaults.reports_per_hour.to_string())?,
            reports_per_day: env_or_parse("RATE_REPORTS_PER_DAY", &defaults.reports_per_day.to_string())?,
            votes_per_hour: env_or_parse("RATE_VOTES_PER_HOUR", &defaults.votes_per_hour.to_string())?,
            anonymous_reports_per_hour: env_or_parse(
                "RATE_ANON_REPORTS_PER_HOUR",
                &defaults.anonymous_reports_per_hour.to_string(),
            )?,
            anonymous_reports_per_day: env_or_parse(
                "RATE_ANON_REPORTS_PER_DAY",
                &defaults.anonymous_reports_per_day.to_string(),
            )?,
            tracking_lookups_per_hour: env_or_parse(
                "RATE_TRACKING_LOOKUPS_PER_HOUR",
                &defaults.tracking_lookups_per_hour.to_string(),
            )?,
        };

        Ok(Self {
            http_addr,
            app_mode,
            store_backend,
            database_url,
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "25")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            redis_url: std::env::var("REDIS_URL").ok(),
            s3,
            media_base_url: env_or("MEDIA_BASE_URL", "https://media.vigia.local/"),
            queue,
            triage_endpoint: std::env::var("TRIAGE_ENDPOINT").ok(),
            policy,
            rate_limits,
            fingerprint_salt: env_key_32("FINGERPRINT_SALT")?,
            paseto_access_key: env_key_32("PASETO_ACCESS_KEY")?,
            access_ttl_minutes: env_or_parse("ACCESS_TTL_MINUTES", "15")?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}

fn env_key_32(key: &str) -> Result<[u8; 32]> {
    let value = env_or_err(key)?;
    decode_key_32(key, &value)
}

pub fn decode_key_32(key: &str, value: &str) -> Result<[u8; 32]> {
    let decoded = STANDARD
        .decode(value.as_bytes())
        .map_err(|err| anyhow!("invalid {}: {}", key, err))?;
    if decoded.len() != 32 {
        return Err(anyhow!("invalid {}: expected 32 bytes", key));
    }
    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&decoded);
    Ok(key_bytes)
}
