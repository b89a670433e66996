use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_LISTEN_HOST, DEFAULT_LISTEN_PORT, DEFAULT_RATES_CACHE_FILE, DEFAULT_RATES_ENDPOINT,
    DEFAULT_RATES_TTL_SECONDS,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatesConfig {
    /// Latest-rates endpoint; queried with `base` and `symbols`.
    pub endpoint: String,
    /// Some rate providers require an access key as a query parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    pub ttl_seconds: u64,
    pub request_timeout_seconds: u64,
    /// How long a failed refresh keeps serving the fallback before the remote is retried.
    #[serde(default = "default_retry_after_failure_seconds")]
    pub retry_after_failure_seconds: u64,
    /// Relative paths resolve against the data directory.
    pub cache_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub listen: ListenConfig,
    pub rates: RatesConfig,
    pub auth: AuthConfig,
}

fn default_retry_after_failure_seconds() -> u64 {
    60
}

fn default_session_ttl_hours() -> u64 {
    7 * 24
}

impl AppConfig {
    pub fn default_config() -> Self {
        Self {
            listen: ListenConfig {
                host: DEFAULT_LISTEN_HOST.to_string(),
                port: DEFAULT_LISTEN_PORT,
            },
            rates: RatesConfig {
                endpoint: DEFAULT_RATES_ENDPOINT.to_string(),
                access_key: None,
                ttl_seconds: DEFAULT_RATES_TTL_SECONDS,
                request_timeout_seconds: 10,
                retry_after_failure_seconds: default_retry_after_failure_seconds(),
                cache_file: DEFAULT_RATES_CACHE_FILE.to_string(),
            },
            auth: AuthConfig {
                username: "admin".to_string(),
                session_ttl_hours: default_session_ttl_hours(),
            },
        }
    }
}
