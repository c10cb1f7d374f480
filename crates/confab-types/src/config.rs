//! Engine configuration, loaded from `{data_dir}/config.toml`.
//!
//! Every field has a default so a missing or partial file still yields a
//! working configuration.

use serde::{Deserialize, Serialize};

use crate::inference::GenerationParams;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub gateway: GatewaySettings,
    pub cache: CacheSettings,
    pub reveal: RevealSettings,
    pub ledger: LedgerSettings,
    pub read_tracker: ReadTrackerSettings,
}

/// Response Gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Inference endpoint base URL.
    pub base_url: String,
    /// Hard per-attempt request timeout in milliseconds. Timeouts are not
    /// retried.
    pub timeout_ms: u64,
    /// Maximum number of retries after the initial attempt for transient
    /// failures.
    pub max_retries: u32,
    /// Base backoff delay in milliseconds, doubled on each retry.
    pub backoff_base_ms: u64,
    /// Optional bearer token for the inference endpoint.
    pub api_key: Option<String>,
    pub generation: GenerationParams,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8090".to_string(),
            timeout_ms: 30_000,
            max_retries: 3,
            backoff_base_ms: 500,
            api_key: None,
            generation: GenerationParams::default(),
        }
    }
}

/// Response cache settings (first-turn queries only).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Time-to-live in seconds.
    pub ttl_secs: u64,
    /// Maximum number of cached entries.
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            capacity: 64,
        }
    }
}

/// Streaming reveal cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevealSettings {
    /// Characters added per reveal step.
    pub chunk_chars: usize,
    /// Interval between steps in milliseconds.
    pub interval_ms: u64,
}

impl Default for RevealSettings {
    fn default() -> Self {
        Self {
            chunk_chars: 3,
            interval_ms: 30,
        }
    }
}

/// Message Ledger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Messages per page for cursor pagination.
    pub page_size: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self { page_size: 30 }
    }
}

/// Read-Tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadTrackerSettings {
    /// How long a message must stay continuously visible before it is
    /// counted read, in milliseconds.
    pub debounce_ms: u64,
}

impl Default for ReadTrackerSettings {
    fn default() -> Self {
        Self { debounce_ms: 500 }
    }
}
