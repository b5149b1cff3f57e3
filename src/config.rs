use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub telegram_bot_token: String,
    pub web_base_url: String,
    pub telegram_webhook_url: Option<String>,
    pub telegram_webhook_secret: Option<String>,
    pub allow_partial_submissions: bool,
    pub public_rps: u32,
    pub admin_contact: String,
    pub log_format: String,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            jwt_secret: get_env("JWT_SECRET")?,
            telegram_bot_token: get_env("TELEGRAM_BOT_TOKEN")?,
            web_base_url: get_env("WEB_BASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            telegram_webhook_url: get_optional_env("TELEGRAM_WEBHOOK_URL"),
            telegram_webhook_secret: get_optional_env("TELEGRAM_WEBHOOK_SECRET"),
            allow_partial_submissions: get_env_or("ALLOW_PARTIAL_SUBMISSIONS", false)?,
            public_rps: get_env_or("PUBLIC_RPS", 50)?,
            admin_contact: get_optional_env("ADMIN_CONTACT").unwrap_or_else(|| "@ceo97".to_string()),
            log_format: get_optional_env("LOG_FORMAT").unwrap_or_else(|| "text".to_string()),
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn get_env_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get_optional_env(name) {
        Some(raw) => raw
            .to_lowercase()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        None => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
