use std::time::Duration;

use portal_settings::TransportSettings;

/// Transport configuration.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Endpoint prefix; the session id becomes the last path segment.
    pub base_url: String,
    /// Fixed delay between reconnect attempts. There is no attempt ceiling.
    pub reconnect_delay: Duration,
    pub keep_alive_interval: Duration,
    /// Suspend the session after this much idle time. `None` never suspends.
    pub max_inactivity: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::from(&TransportSettings::default())
    }
}

impl From<&TransportSettings> for TransportConfig {
    fn from(settings: &TransportSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            reconnect_delay: settings.reconnect_delay(),
            keep_alive_interval: settings.keep_alive_interval(),
            max_inactivity: settings.max_inactivity(),
        }
    }
}

impl TransportConfig {
    /// Endpoint of the given session.
    pub fn endpoint(&self, session_id: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), session_id)
    }
}
