use crate::state::PrivacyStatus;
use serde::{Deserialize, Serialize};

// ── SDK configuration ─────────────────────────────────────────────

/// Runtime configuration for the delivery pipeline.
///
/// Arrives from the host application (remote config or embedding app), not
/// from disk. Every field has a serde default so partial configuration
/// payloads deserialize cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Segmentation endpoint hostname. Empty means "not configured": hits
    /// are silently not built until a server arrives.
    #[serde(default)]
    pub server: String,

    /// Organization id appended to every hit (`d_orgid`).
    #[serde(default)]
    pub org_id: String,

    /// Per-hit network timeout, in seconds. The upstream service ships an
    /// unusually large default; preserved verbatim.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Fixed wait between retries of a recoverable head-of-queue hit.
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,

    /// HTTP statuses treated as transient: the hit stays head-of-queue and
    /// is retried. Everything else (except 200) drops the hit.
    #[serde(default = "default_recoverable_statuses")]
    pub recoverable_statuses: Vec<u16>,

    /// Privacy status assumed before the host publishes one.
    #[serde(default)]
    pub privacy_default: PrivacyStatus,
}

fn default_timeout_secs() -> u64 {
    2000
}

fn default_retry_interval_secs() -> u64 {
    30
}

fn default_recoverable_statuses() -> Vec<u16> {
    vec![408, 429, 502, 503, 504]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: String::new(),
            org_id: String::new(),
            timeout_secs: default_timeout_secs(),
            retry_interval_secs: default_retry_interval_secs(),
            recoverable_statuses: default_recoverable_statuses(),
            privacy_default: PrivacyStatus::default(),
        }
    }
}

impl Config {
    pub fn is_recoverable_status(&self, status: u16) -> bool {
        self.recoverable_statuses.contains(&status)
    }
}
