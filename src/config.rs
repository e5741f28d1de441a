use serde::Deserialize;
use std::{path::PathBuf, time::Duration};

use crate::services::DEFAULT_MEMBERSHIP_TTL;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Base URL of the Catalog API
    #[serde(default = "default_catalog_api_url")]
    pub catalog_api_url: String,

    /// Seconds before a membership snapshot is considered stale
    #[serde(default = "default_membership_ttl_secs")]
    pub membership_ttl_secs: u64,

    /// Per-request timeout for Catalog API calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Where the session token is persisted; in-memory when unset
    #[serde(default)]
    pub session_file: Option<PathBuf>,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_catalog_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_membership_ttl_secs() -> u64 {
    DEFAULT_MEMBERSHIP_TTL.as_secs()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    pub fn membership_ttl(&self) -> Duration {
        Duration::from_secs(self.membership_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
