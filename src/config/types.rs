use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default number of simultaneously outstanding fetches
pub const DEFAULT_MAX_IN_FLIGHT: usize = 30;

/// Default progress display cadence in milliseconds
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 500;

/// Main configuration structure for Stagecrawl
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Pipeline identity, resumability and concurrency settings
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    /// Run identifier, used as the prefix of every slot file
    pub name: String,

    /// Directory holding the slot files
    #[serde(rename = "slot-dir", default = "default_slot_dir")]
    pub slot_dir: PathBuf,

    /// Maximum number of fetches allowed to be outstanding at once
    #[serde(rename = "max-in-flight", default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// How often the progress line is redrawn (milliseconds)
    #[serde(
        rename = "refresh-interval-ms",
        default = "default_refresh_interval_ms"
    )]
    pub refresh_interval_ms: u64,
}

impl PipelineSection {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            name: "pipeline".to_string(),
            slot_dir: default_slot_dir(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
        }
    }
}

/// HTTP client configuration for the default fetcher
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Whole-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection establishment timeout (seconds)
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_slot_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_in_flight() -> usize {
    DEFAULT_MAX_IN_FLIGHT
}

fn default_refresh_interval_ms() -> u64 {
    DEFAULT_REFRESH_INTERVAL_MS
}

fn default_user_agent() -> String {
    format!("stagecrawl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}
