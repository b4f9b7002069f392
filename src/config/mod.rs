use anyhow::Context;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::rules::DEFAULT_MAX_RULES;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub redirect_server: ServerConfig,
    pub auth: AuthConfig,
    pub cache: CacheConfig,
    pub visitor: VisitorConfig,
    pub links: LinkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret for analytics bearer tokens. Without it every analytics
    /// request is rejected as unauthenticated.
    pub jwt_secret: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    None,
    Memory,
    Redis,
}

impl CacheBackend {
    /// Whether separate processes see the same cache, so a change made in
    /// one invalidates what the others would serve
    pub fn is_shared(self) -> bool {
        !matches!(self, CacheBackend::Memory)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "CacheConfig::default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "CacheConfig::default_max_entries")]
    pub max_entries: u64,
    /// Pages cached around a requested value-count page
    #[serde(default = "CacheConfig::default_extra_pages")]
    pub extra_pages: usize,
}

impl CacheConfig {
    const fn default_ttl_secs() -> u64 {
        3600
    }

    const fn default_max_entries() -> u64 {
        10_000
    }

    pub const fn default_extra_pages() -> usize {
        8
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            redis_url: None,
            ttl_secs: Self::default_ttl_secs(),
            max_entries: Self::default_max_entries(),
            extra_pages: Self::default_extra_pages(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    /// Use the socket address
    #[default]
    None,
    /// Trust Forwarded / X-Forwarded-For
    Standard,
    /// Trust CF-Connecting-IP
    Cloudflare,
}

impl FromStr for TrustedProxyMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(TrustedProxyMode::None),
            "standard" => Ok(TrustedProxyMode::Standard),
            "cloudflare" => Ok(TrustedProxyMode::Cloudflare),
            other => anyhow::bail!("unknown trusted proxy mode '{other}'"),
        }
    }
}

/// How visitor attributes the client cannot supply are derived
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisitorConfig {
    pub geoip_country_db: Option<String>,
    pub trusted_proxy_mode: TrustedProxyMode,
    #[serde(default)]
    pub trusted_proxies: Vec<IpNet>,
    pub num_trusted_proxies: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    pub max_rules: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_rules: DEFAULT_MAX_RULES,
        }
    }
}

fn env_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{name} has an invalid value '{value}': {e}")),
        Err(_) => Ok(default),
    }
}

fn parse_proxies(raw: &str) -> anyhow::Result<Vec<IpNet>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            // bare addresses are single-host networks
            s.parse::<IpNet>()
                .or_else(|_| s.parse::<std::net::IpAddr>().map(IpNet::from))
                .with_context(|| format!("invalid TRUSTED_PROXIES entry '{s}'"))
        })
        .collect()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./forklink.db?mode=rwc".to_string());
        let max_connections = env_or("DATABASE_MAX_CONNECTIONS", 10u32)?;

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = env_or("API_PORT", 8080u16)?;

        let redirect_host =
            std::env::var("REDIRECT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let redirect_port = env_or("REDIRECT_PORT", 3000u16)?;

        let jwt_secret = std::env::var("JWT_SECRET").ok().filter(|s| !s.is_empty());
        if jwt_secret.is_none() {
            tracing::warn!("JWT_SECRET is not set, analytics endpoints will reject every request");
        }

        let redis_url = std::env::var("REDIS_URL").ok();
        let backend = match std::env::var("CACHE_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "none" => CacheBackend::None,
            "memory" => CacheBackend::Memory,
            "redis" => {
                if redis_url.is_none() {
                    anyhow::bail!("REDIS_URL must be set when CACHE_BACKEND=redis");
                }
                CacheBackend::Redis
            }
            other => {
                tracing::warn!(
                    "Unknown CACHE_BACKEND '{other}', falling back to 'memory'. Supported values: none, memory, redis"
                );
                CacheBackend::Memory
            }
        };

        let cache = CacheConfig {
            backend,
            redis_url,
            ttl_secs: env_or("CACHE_TTL_SECS", CacheConfig::default_ttl_secs())?,
            max_entries: env_or("CACHE_MAX_ENTRIES", CacheConfig::default_max_entries())?,
            extra_pages: env_or("CACHE_EXTRA_PAGES", CacheConfig::default_extra_pages())?,
        };

        let trusted_proxy_mode = env_or("TRUSTED_PROXY_MODE", TrustedProxyMode::None)?;
        let trusted_proxies = match std::env::var("TRUSTED_PROXIES") {
            Ok(raw) => parse_proxies(&raw)?,
            Err(_) => Vec::new(),
        };
        let num_trusted_proxies = std::env::var("NUM_TRUSTED_PROXIES")
            .ok()
            .map(|v| v.trim().parse::<usize>())
            .transpose()
            .context("NUM_TRUSTED_PROXIES must be a non-negative integer")?;

        let visitor = VisitorConfig {
            geoip_country_db: std::env::var("GEOIP_COUNTRY_DB").ok(),
            trusted_proxy_mode,
            trusted_proxies,
            num_trusted_proxies,
        };

        let links = LinkConfig {
            max_rules: env_or("MAX_RULES", DEFAULT_MAX_RULES)?,
        };

        Ok(Config {
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            redirect_server: ServerConfig {
                host: redirect_host,
                port: redirect_port,
            },
            auth: AuthConfig { jwt_secret },
            cache,
            visitor,
            links,
        })
    }
}
