//! Process configuration, read once from the environment at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use adstoken_core::DeactivationPolicy;
use adstoken_gateway::oauth::DEFAULT_REDIRECT_URI;
use adstoken_gateway::{
    ClientRegistration, GatewayConfig, GoogleOAuthConfig, RefreshConfig, MAX_REFRESH_THRESHOLD,
};
use anyhow::{bail, Context, Result};
use zeroize::Zeroizing;

const APP_DIR: &str = "adstoken";

/// Longest pause accepted between refresh cycles
const MAX_REFRESH_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Everything the binary needs to wire itself up
pub struct AppConfig {
    pub oauth: GoogleOAuthConfig,
    pub registration: ClientRegistration,
    pub gateway: GatewayConfig,
    pub database_path: PathBuf,
    pub encryption_key: Zeroizing<String>,
    pub refresh: RefreshConfig,
    pub deactivation_policy: DeactivationPolicy,
    pub log_dir: PathBuf,
}

impl AppConfig {
    /// Read the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| get(key).with_context(|| format!("{} must be set", key));

        let oauth = GoogleOAuthConfig::new(
            require("GOOGLE_CLIENT_ID")?,
            require("GOOGLE_CLIENT_SECRET")?,
            get("OAUTH_REDIRECT_URI").unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string()),
        );

        let registration = ClientRegistration {
            client_name: get("ADSTOKEN_CLIENT_NAME").unwrap_or_else(|| "Demo Client".to_string()),
            client_customer_id: get("GOOGLE_ADS_CLIENT_CUSTOMER_ID").unwrap_or_default(),
        };

        let gateway = GatewayConfig {
            host: get("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(&get, "PORT", 3000u16)?,
            enable_cors: false,
        };

        let encryption_key = Zeroizing::new(require("TOKEN_ENCRYPTION_KEY")?);
        if encryption_key.len() != 64 || !encryption_key.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!("TOKEN_ENCRYPTION_KEY must be 64 hex characters");
        }

        let database_path = match get("DATABASE_PATH") {
            Some(path) => PathBuf::from(path),
            None => adstoken_storage::default_database_path()
                .context("No local data directory; set DATABASE_PATH")?,
        };

        let log_dir = match get("LOG_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_local_dir()
                .map(|p| p.join(APP_DIR).join("logs"))
                .unwrap_or_else(|| PathBuf::from("logs")),
        };

        let interval_secs: u64 = parse_or(&get, "REFRESH_INTERVAL_SECS", 60)?;
        let threshold_minutes: u64 = parse_or(&get, "REFRESH_THRESHOLD_MINUTES", 5)?;
        let concurrency: usize = parse_or(&get, "REFRESH_CONCURRENCY", 4)?;
        if interval_secs == 0 || interval_secs > MAX_REFRESH_INTERVAL_SECS {
            bail!(
                "REFRESH_INTERVAL_SECS must be between 1 and {}",
                MAX_REFRESH_INTERVAL_SECS
            );
        }
        let max_threshold_minutes = MAX_REFRESH_THRESHOLD.as_secs() / 60;
        if threshold_minutes > max_threshold_minutes {
            bail!(
                "REFRESH_THRESHOLD_MINUTES must be at most {}",
                max_threshold_minutes
            );
        }
        if concurrency == 0 {
            bail!("REFRESH_CONCURRENCY must be greater than zero");
        }

        let deactivation_policy = match get("DEACTIVATION_POLICY") {
            Some(value) => DeactivationPolicy::from_str(&value)
                .map_err(anyhow::Error::msg)
                .context("Invalid DEACTIVATION_POLICY")?,
            None => DeactivationPolicy::default(),
        };

        Ok(Self {
            oauth,
            registration,
            gateway,
            database_path,
            encryption_key,
            refresh: RefreshConfig {
                interval: Duration::from_secs(interval_secs),
                threshold: Duration::from_secs(threshold_minutes * 60),
                max_concurrent_refreshes: concurrency,
            },
            deactivation_policy,
            log_dir,
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(value) => value
            .parse()
            .with_context(|| format!("Invalid {}: {:?}", key, value)),
        None => Ok(default),
    }
}
