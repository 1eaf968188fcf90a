//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so partial
//! JSON files are accepted; missing fields keep their compiled default.
//! Durations are stored in milliseconds, with `0` meaning "disabled" where
//! a limit is optional.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortalSettings {
    pub transport: TransportSettings,
    pub resources: ResourceSettings,
    pub session: SessionSettings,
    pub logging: LoggingSettings,
}

impl PortalSettings {
    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.transport.base_url.is_empty() {
            return Err(SettingsError::InvalidValue("transport.baseUrl is empty".into()));
        }
        if !self.transport.base_url.starts_with("ws://")
            && !self.transport.base_url.starts_with("wss://")
        {
            return Err(SettingsError::InvalidValue(format!(
                "transport.baseUrl must use ws:// or wss://, got {}",
                self.transport.base_url
            )));
        }
        if self.transport.keep_alive_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "transport.keepAliveIntervalMs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Connection to the portal.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    /// Endpoint prefix; the session id is appended as last path segment.
    pub base_url: String,
    /// Fixed delay before each reconnect attempt.
    pub reconnect_delay_ms: u64,
    /// Keep-alive tick period.
    pub keep_alive_interval_ms: u64,
    /// Inactivity after which the session is suspended. `0` disables.
    pub max_inactivity_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            base_url: "ws://localhost:5001/portal/portal-session".to_string(),
            reconnect_delay_ms: 1_000,
            keep_alive_interval_ms: 60_000,
            max_inactivity_ms: 0,
        }
    }
}

impl TransportSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }

    pub fn max_inactivity(&self) -> Option<Duration> {
        (self.max_inactivity_ms > 0).then(|| Duration::from_millis(self.max_inactivity_ms))
    }
}

/// Page resource loading.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceSettings {
    /// Deadline for a single script load. `0` waits forever.
    pub script_load_timeout_ms: u64,
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            script_load_timeout_ms: 30_000,
        }
    }
}

impl ResourceSettings {
    pub fn script_load_timeout(&self) -> Option<Duration> {
        (self.script_load_timeout_ms > 0).then(|| Duration::from_millis(self.script_load_timeout_ms))
    }
}

/// Where the tab-scoped session identifier is kept.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Storage file. Without one the identifier lives in memory only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<PathBuf>,
}

/// Log output.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-target levels, e.g. `{"portal_transport": "debug"}`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            modules: BTreeMap::new(),
        }
    }
}
