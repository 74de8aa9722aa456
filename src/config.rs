use std::env;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use chrono::{FixedOffset, Offset, Utc};
use dotenvy::dotenv;

#[derive(Clone, Debug)]
pub struct BootstrapAdmin {
    pub id: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: String,
    /// MySQL URL; the in-memory store is used when absent.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub token_ttl: i64,
    pub reset_token_ttl: i64,
    pub api_prefix: String,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_protected_per_min: u32,

    pub trust_proxy_headers: bool,
    pub office_network_ips: Vec<String>,
    pub utc_offset_minutes: i32,
    pub reconcile_interval_secs: u64,
    pub reconcile_lookback_days: u32,
    pub bootstrap_admin: Option<BootstrapAdmin>,
    pub log_dir: String,
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{} has an invalid value `{}`: {}", key, raw, e)),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .context("JWT_SECRET must be set")?;

        let office_network_ips = lookup("OFFICE_NETWORK_IPS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let bootstrap_admin = match (
            lookup("BOOTSTRAP_ADMIN_ID"),
            lookup("BOOTSTRAP_ADMIN_EMAIL"),
            lookup("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(id), Some(email), Some(password)) => Some(BootstrapAdmin { id, email, password }),
            _ => None,
        };

        let config = Self {
            server_addr: lookup("SERVER_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            database_url: lookup("DATABASE_URL").filter(|s| !s.is_empty()),
            jwt_secret,
            token_ttl: parse_or(&lookup, "TOKEN_TTL", 86_400)?, // 24h
            reset_token_ttl: parse_or(&lookup, "RESET_TOKEN_TTL", 1_800)?,
            api_prefix: lookup("API_PREFIX").unwrap_or_else(|| "/api".to_string()),

            rate_login_per_min: parse_or(&lookup, "RATE_LOGIN_PER_MIN", 60)?,
            rate_protected_per_min: parse_or(&lookup, "RATE_PROTECTED_PER_MIN", 1000)?,

            trust_proxy_headers: parse_or(&lookup, "TRUST_PROXY_HEADERS", false)?,
            office_network_ips,
            utc_offset_minutes: parse_or(&lookup, "UTC_OFFSET_MINUTES", 0)?,
            reconcile_interval_secs: parse_or(&lookup, "RECONCILE_INTERVAL_SECS", 3_600)?,
            reconcile_lookback_days: parse_or(&lookup, "RECONCILE_LOOKBACK_DAYS", 7)?,
            bootstrap_admin,
            log_dir: lookup("LOG_DIR").unwrap_or_else(|| "logs".to_string()),
        };

        if config.token_ttl <= 0 || config.reset_token_ttl <= 0 {
            return Err(anyhow!("TOKEN_TTL and RESET_TOKEN_TTL must be positive"));
        }
        if config.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(anyhow!("UTC_OFFSET_MINUTES must be within one day"));
        }

        Ok(config)
    }

    /// Offset of the organisation's local day.
    pub fn utc_offset(&self) -> FixedOffset {
        // validated to lie within one day in `from_lookup`
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or(Utc.fix())
    }
}
