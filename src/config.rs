//! Client configuration record.
//!
//! Everything a [`Client`](crate::Client) needs is resolved from an explicit
//! [`ClientConfig`] when the client is built; nothing is read from the
//! environment while requests run.

use crate::base::neterror::NetError;
use serde::Deserialize;
use std::time::Duration;

/// Declarative client settings, loadable from JSON.
///
/// ```rust
/// use wirenet::ClientConfig;
///
/// let config = ClientConfig::from_json(r#"{"profile": "edge-auto", "timeout_ms": 5000}"#).unwrap();
/// assert_eq!(config.profile, "edge-auto");
/// assert!(!config.http1_only);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Fingerprint profile name or alias.
    pub profile: String,
    /// Upstream `http://` proxy URL.
    pub proxy: Option<String>,
    /// NO_PROXY-style bypass list for `proxy`.
    pub no_proxy: Option<String>,
    /// Total time allowed per request, body included.
    pub timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub pool_idle_timeout_ms: u64,
    pub pool_max_per_host: usize,
    pub pool_max_total: usize,
    pub http1_only: bool,
    pub http2_prior_knowledge: bool,
    pub danger_accept_invalid_certs: bool,
    /// Replaces the library `User-Agent` default. A request that sets its
    /// own still wins.
    pub user_agent: Option<String>,
    pub disable_decompression: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            profile: "chrome-auto".to_string(),
            proxy: None,
            no_proxy: None,
            timeout_ms: None,
            connect_timeout_ms: None,
            pool_idle_timeout_ms: 90_000,
            pool_max_per_host: 6,
            pool_max_total: 256,
            http1_only: false,
            http2_prior_knowledge: false,
            danger_accept_invalid_certs: false,
            user_agent: None,
            disable_decompression: false,
        }
    }
}

impl ClientConfig {
    pub fn from_json(json: &str) -> Result<Self, NetError> {
        serde_json::from_str(json).map_err(|e| NetError::InvalidConfig(e.to_string()))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_idle_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::neterror::ErrorKind;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_json("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.profile, "chrome-auto");
        assert_eq!(config.pool_max_per_host, 6);
        assert_eq!(config.pool_max_total, 256);
        assert_eq!(config.pool_idle_timeout(), Duration::from_secs(90));
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_full_record() {
        let config = ClientConfig::from_json(
            r#"{
                "profile": "firefox-auto",
                "proxy": "http://proxy.local:3128",
                "no_proxy": "localhost,.internal",
                "timeout_ms": 2500,
                "connect_timeout_ms": 500,
                "http1_only": true,
                "user_agent": "agent/1.0"
            }"#,
        )
        .unwrap();
        assert_eq!(config.proxy.as_deref(), Some("http://proxy.local:3128"));
        assert_eq!(config.timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.connect_timeout(), Some(Duration::from_millis(500)));
        assert!(config.http1_only);
        assert_eq!(config.user_agent.as_deref(), Some("agent/1.0"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = ClientConfig::from_json(r#"{"profil": "chrome-auto"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
