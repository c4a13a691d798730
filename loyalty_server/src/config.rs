use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::*;
use lp_common::Secret;

const DEFAULT_LP_HOST: &str = "127.0.0.1";
const DEFAULT_LP_PORT: u16 = 8080;
const DEFAULT_WORKER_COUNT: usize = 5;
const DEFAULT_BUFFER_SIZE: usize = 100;
const DEFAULT_ERR_MAXIMUM: u64 = 100;
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
const DEFAULT_TOKEN_EXPIRY_SECS: u64 = 60 * 60 * 24;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// host:port of the accrual service.
    pub accrual_address: String,
    pub worker_count: usize,
    pub buffer_size: usize,
    pub err_maximum: u64,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub auth: AuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_LP_HOST.to_string(),
            port: DEFAULT_LP_PORT,
            database_url: String::default(),
            accrual_address: String::default(),
            worker_count: DEFAULT_WORKER_COUNT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            err_maximum: DEFAULT_ERR_MAXIMUM,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            auth: AuthConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("LP_HOST").ok().unwrap_or_else(|| DEFAULT_LP_HOST.into());
        let port = env_or_default("LP_PORT", DEFAULT_LP_PORT);
        let database_url = env::var("LP_DATABASE_URL").unwrap_or_else(|_| {
            error!("LP_DATABASE_URL is not set. Please set it to the URL for the loyalty database.");
            String::default()
        });
        let accrual_address = env::var("LP_ACCRUAL_ADDRESS").unwrap_or_else(|_| {
            error!("LP_ACCRUAL_ADDRESS is not set. Please set it to host:port of the accrual service.");
            String::default()
        });
        let worker_count = env_or_default("LP_WORKER_COUNT", DEFAULT_WORKER_COUNT);
        let buffer_size = env_or_default("LP_BUFFER_SIZE", DEFAULT_BUFFER_SIZE);
        let err_maximum = env_or_default("LP_ERR_MAXIMUM", DEFAULT_ERR_MAXIMUM);
        let max_retries = env_or_default("LP_MAX_RETRIES", DEFAULT_MAX_RETRIES);
        let retry_delay = Duration::from_millis(env_or_default("LP_RETRY_DELAY_MS", DEFAULT_RETRY_DELAY_MS));
        let auth = AuthConfig::from_env_or_default();
        Self {
            host,
            port,
            database_url,
            accrual_address,
            worker_count,
            buffer_size,
            err_maximum,
            max_retries,
            retry_delay,
            auth,
        }
    }
}

//--------------------------------------     AuthConfig     ----------------------------------------------------------
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Key used to sign and verify access tokens. Required in production; `try_from_env` is the
    /// preflight check for it.
    pub jwt_secret: Secret<String>,
    pub token_expiry: Duration,
}

impl AuthConfig {
    pub fn try_from_env() -> Result<Self, String> {
        let secret = env::var("LP_JWT_SECRET")
            .map_err(|_| "LP_JWT_SECRET is not set. Access tokens cannot be signed without it.".to_string())?;
        if secret.is_empty() {
            return Err("LP_JWT_SECRET is empty. Access tokens cannot be signed without it.".to_string());
        }
        let token_expiry = Duration::from_secs(env_or_default("LP_TOKEN_EXPIRY_SECS", DEFAULT_TOKEN_EXPIRY_SECS));
        Ok(Self { jwt_secret: Secret::new(secret), token_expiry })
    }

    pub fn from_env_or_default() -> Self {
        AuthConfig::try_from_env().unwrap_or_else(|e| {
            error!("{e}");
            Self { jwt_secret: Secret::new(String::default()), token_expiry: Duration::from_secs(DEFAULT_TOKEN_EXPIRY_SECS) }
        })
    }
}

fn env_or_default<T>(var: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
    <T as FromStr>::Err: Display,
{
    match env::var(var) {
        Ok(s) => s.parse::<T>().unwrap_or_else(|e| {
            error!("{s} is not a valid value for {var}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}
