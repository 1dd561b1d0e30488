//! API configuration.

use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Allocation authority configuration
    pub authority: AuthorityConfig,

    /// Model store configuration
    pub store: StoreConfig,

    /// Update publishing configuration
    pub events: EventsConfig,
}

/// Allocation authority configuration.
#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    /// Authority backend
    pub kind: AuthorityKind,

    /// Allocation service URL (for HTTP)
    pub url: String,

    /// Counter database path (for SQLite)
    pub db_path: PathBuf,

    /// Bearer token for authentication (for HTTP)
    pub bearer_token: Option<String>,

    /// Request timeout (for HTTP)
    pub timeout: Duration,

    /// Largest key handed out per partition (memory and SQLite)
    pub max_key: Option<u64>,
}

/// Model store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Store backend
    pub kind: StoreKind,

    /// Database path (for SQLite)
    pub db_path: PathBuf,
}

/// Update publishing configuration.
#[derive(Debug, Clone)]
pub struct EventsConfig {
    /// MQTT broker URL; updates stay in-process when unset
    pub mqtt_broker: Option<String>,

    /// Tenant identifier used in MQTT topics
    pub tenant: String,
}

/// Allocation authority backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityKind {
    /// In-process counters
    Memory,
    /// Counters persisted in `SQLite`
    Sqlite,
    /// Remote allocation service
    Http,
}

/// Model store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// In-process map
    Memory,
    /// `SQLite` database
    Sqlite,
}

impl FromStr for AuthorityKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            "http" => Ok(Self::Http),
            other => bail!("unknown authority '{other}' (expected memory, sqlite or http)"),
        }
    }
}

impl fmt::Display for AuthorityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
            Self::Http => "http",
        })
    }
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => bail!("unknown store '{other}' (expected memory or sqlite)"),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
        })
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            authority: AuthorityConfig {
                kind: AuthorityKind::Memory,
                url: "http://localhost:8090".to_string(),
                db_path: PathBuf::from("./df-nb-keys.db"),
                bearer_token: None,
                timeout: Duration::from_secs(10),
                max_key: None,
            },
            store: StoreConfig {
                kind: StoreKind::Memory,
                db_path: PathBuf::from("./df-nb.db"),
            },
            events: EventsConfig {
                mqtt_broker: None,
                tenant: "default".to_string(),
            },
        }
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DFNB_AUTHORITY`: "memory", "sqlite" or "http"
    /// - `DFNB_AUTHORITY_URL`: Allocation service URL
    /// - `DFNB_AUTHORITY_DB`: `SQLite` counter database path
    /// - `DFNB_AUTHORITY_TOKEN`: Bearer token for the allocation service
    /// - `DFNB_TIMEOUT_SECS`: Allocation request timeout in seconds
    /// - `DFNB_MAX_KEY`: Largest key per partition
    /// - `DFNB_STORE`: "memory" or "sqlite"
    /// - `DFNB_STORE_DB`: `SQLite` model database path
    /// - `DFNB_MQTT_BROKER`: MQTT broker URL
    /// - `DFNB_TENANT`: Tenant identifier
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set to an unparsable value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(kind) = lookup("DFNB_AUTHORITY") {
            config.authority.kind = kind.parse().context("Invalid DFNB_AUTHORITY")?;
        }

        if let Some(url) = lookup("DFNB_AUTHORITY_URL") {
            config.authority.url = url;
        }

        if let Some(db_path) = lookup("DFNB_AUTHORITY_DB") {
            config.authority.db_path = PathBuf::from(db_path);
        }

        if let Some(token) = lookup("DFNB_AUTHORITY_TOKEN") {
            config.authority.bearer_token = Some(token);
        }

        if let Some(secs) = lookup("DFNB_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().context("Invalid DFNB_TIMEOUT_SECS")?;
            config.authority.timeout = Duration::from_secs(secs);
        }

        if let Some(max_key) = lookup("DFNB_MAX_KEY") {
            let max_key: u64 = max_key.parse().context("Invalid DFNB_MAX_KEY")?;
            if max_key == 0 {
                bail!("Invalid DFNB_MAX_KEY: must be positive");
            }
            config.authority.max_key = Some(max_key);
        }

        if let Some(kind) = lookup("DFNB_STORE") {
            config.store.kind = kind.parse().context("Invalid DFNB_STORE")?;
        }

        if let Some(db_path) = lookup("DFNB_STORE_DB") {
            config.store.db_path = PathBuf::from(db_path);
        }

        if let Some(mqtt) = lookup("DFNB_MQTT_BROKER") {
            config.events.mqtt_broker = Some(mqtt);
        }

        if let Some(tenant) = lookup("DFNB_TENANT") {
            config.events.tenant = tenant;
        }

        Ok(config)
    }
}
