use crate::application_impl::JwtConfig;
use crate::cache::CacheConfig;
use anyhow::{Result, anyhow};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, File, FileFormat};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Environment variable that takes precedence over `auth.signing_key`.
pub const SIGNING_KEY_ENV: &str = "JWT_SIGNING_KEY";

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub auth: Auth,
    pub cache: Cache,
    pub store: Store,
    pub redis: Redis,
    pub janitor: Janitor,
    pub log: Log,
}

#[derive(Deserialize)]
pub struct Auth {
    pub issuer: String,
    pub audience: String,
    pub signing_key: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("signing_key", &"<redacted>")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .finish()
    }
}

impl Auth {
    /// Builds the issuer config, preferring `JWT_SIGNING_KEY` over the file.
    pub fn jwt_config(&self) -> Result<JwtConfig> {
        self.jwt_config_with_key(std::env::var(SIGNING_KEY_ENV).ok())
    }

    pub fn jwt_config_with_key(&self, key_override: Option<String>) -> Result<JwtConfig> {
        let signing_key = key_override.unwrap_or_else(|| self.signing_key.clone());
        let cfg = JwtConfig {
            issuer: self.issuer.clone(),
            audience: self.audience.clone(),
            access_ttl: Duration::from_secs(self.access_ttl_secs),
            refresh_ttl: Duration::from_secs(self.refresh_ttl_secs),
            signing_key: signing_key.into_bytes(),
        };
        cfg.validate().map_err(|e| anyhow!("invalid auth settings: {e}"))?;
        Ok(cfg)
    }
}

#[derive(Debug, Deserialize)]
pub struct Cache {
    pub local_ttl_secs: u64,
    pub default_ttl_secs: u64,
    pub cleanup_interval_secs: u64,
    pub l2_enabled: bool,
    pub op_timeout_ms: u64,
    pub key_prefix: String,
}

impl Cache {
    pub fn cache_config(&self) -> Result<CacheConfig> {
        if self.local_ttl_secs == 0 || self.default_ttl_secs == 0 {
            return Err(anyhow!("cache ttls must be positive"));
        }
        Ok(CacheConfig {
            local_ttl: Duration::from_secs(self.local_ttl_secs),
            default_ttl: Duration::from_secs(self.default_ttl_secs),
            cleanup_interval: Duration::from_secs(self.cleanup_interval_secs.max(1)),
            l2_enabled: self.l2_enabled,
        })
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms.max(1))
    }
}

#[derive(Debug, Deserialize)]
pub struct Store {
    pub backend: String, // "memory" or "mysql"
    pub dsn: Option<String>,
    #[serde(default)]
    pub migrate: bool,
}

#[derive(Debug, Deserialize)]
pub struct Redis {
    pub backend: String, // "memory" or "redis"
    pub dsn: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Janitor {
    pub interval_secs: u64,
}

impl Janitor {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

fn build(builder: ConfigBuilder<DefaultState>) -> Result<Settings> {
    let settings: Settings = builder
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);
    build(Config::builder().add_source(File::with_name(path)))
}

pub fn parse_settings_str(toml: &str) -> Result<Settings> {
    build(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
}
