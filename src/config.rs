use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_register_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    // Reason check
    pub ai_api_key: Option<String>,
    pub ai_endpoint: String,
    pub ai_model: String,
    pub ai_timeout_secs: u64,
    pub ai_min_score: u32,
    pub ai_cache_capacity: u64,

    // Attachments
    pub upload_dir: String,
    pub max_attachment_bytes: usize,

    pub seed_demo_users: bool,
    pub log_dir: String,
}

/// Reads `name`, falling back to `default` when unset, and parses it.
fn var_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(name)
        .unwrap_or_else(|| default.to_string())
        .trim()
        .parse()
        .with_context(|| format!("{name} has an invalid value"))
}

fn optional_var(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = &lookup;
        Ok(Self {
            server_addr: var_or(var, "SERVER_ADDR", "0.0.0.0:5000")?,
            database_url: var_or(var, "DATABASE_URL", "sqlite://leave.db")?,
            db_max_connections: var_or(var, "DB_MAX_CONNECTIONS", "5")?,
            jwt_secret: optional_var(var, "JWT_SECRET").context("JWT_SECRET must be set")?,
            access_token_ttl: var_or(var, "ACCESS_TOKEN_TTL", "900")?, // default 15 min
            refresh_token_ttl: var_or(var, "REFRESH_TOKEN_TTL", "604800")?, // default 7 days

            rate_login_per_min: var_or(var, "RATE_LOGIN_PER_MIN", "60")?,
            rate_register_per_min: var_or(var, "RATE_REGISTER_PER_MIN", "30")?,
            rate_refresh_per_min: var_or(var, "RATE_REFRESH_PER_MIN", "30")?,
            rate_protected_per_min: var_or(var, "RATE_PROTECTED_PER_MIN", "1000")?,

            api_prefix: var_or(var, "API_PREFIX", "/api")?,

            ai_api_key: optional_var(var, "DEEPSEEK_API_KEY"),
            ai_endpoint: var_or(var, "AI_ENDPOINT", "https://api.deepseek.com")?,
            ai_model: var_or(var, "AI_MODEL", "deepseek-chat")?,
            ai_timeout_secs: var_or(var, "AI_TIMEOUT_SECS", "20")?,
            ai_min_score: var_or(var, "AI_MIN_SCORE", "12")?,
            ai_cache_capacity: var_or(var, "AI_CACHE_CAPACITY", "100")?,

            upload_dir: var_or(var, "UPLOAD_DIR", "uploads")?,
            max_attachment_bytes: var_or(var, "MAX_ATTACHMENT_BYTES", "10485760")?, // 10 MiB

            seed_demo_users: var_or(var, "SEED_DEMO_USERS", "false")?,
            log_dir: var_or(var, "LOG_DIR", "logs")?,
        })
    }
}

#[cfg(test)]
impl Config {
    /// Config pointing at an in-memory database, with the AI check disabled.
    pub fn for_tests(upload_dir: &str) -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            db_max_connections: 1,
            jwt_secret: "test-secret".to_string(),
            server_addr: "127.0.0.1:0".to_string(),
            access_token_ttl: 900,
            refresh_token_ttl: 3600,
            rate_login_per_min: 1000,
            rate_register_per_min: 1000,
            rate_refresh_per_min: 1000,
            rate_protected_per_min: 1000,
            api_prefix: "/api".to_string(),
            ai_api_key: None,
            ai_endpoint: "http://127.0.0.1:9".to_string(),
            ai_model: "deepseek-chat".to_string(),
            ai_timeout_secs: 5,
            ai_min_score: 12,
            ai_cache_capacity: 100,
            upload_dir: upload_dir.to_string(),
            max_attachment_bytes: 1024 * 1024,
            seed_demo_users: false,
            log_dir: "logs".to_string(),
        }
    }
}
