//! Connection configuration types.

use std::time::Duration;

/// Keep-alive configuration.
#[derive(Debug, Clone)]
pub struct KeepAliveConfig {
    /// Interval between keep-alive probes.
    pub interval: Duration,
    /// Timeout waiting for keep-alive response.
    pub timeout: Duration,
    /// Number of failed probes before considering connection dead.
    pub probes: u32,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            probes: 3,
        }
    }
}

/// Connection configuration.
///
/// This core does not own reconnection (`ConnectionProxy` transitions
/// to `Disconnected` on failure and leaves the decision to retry with
/// the caller), so there is no retry policy or backoff strategy here.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Keep-alive configuration.
    pub keep_alive: Option<KeepAliveConfig>,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Read timeout.
    pub read_timeout: Option<Duration>,
    /// Write timeout.
    pub write_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            keep_alive: Some(KeepAliveConfig::default()),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Some(Duration::from_secs(30)),
            write_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl ConnectionConfig {
    /// Create a minimal configuration without keep-alive.
    pub fn simple() -> Self {
        Self {
            keep_alive: None,
            connect_timeout: Duration::from_secs(5),
            read_timeout: None,
            write_timeout: None,
        }
    }

    /// Create a robust configuration with keep-alive enabled.
    pub fn robust() -> Self {
        Self::default()
    }

    /// Set the keep-alive configuration.
    pub fn with_keep_alive(mut self, config: KeepAliveConfig) -> Self {
        self.keep_alive = Some(config);
        self
    }

    /// Disable keep-alive.
    pub fn without_keep_alive(mut self) -> Self {
        self.keep_alive = None;
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set the write timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }
}

/// Access-control attribute of a peer process, asserted by the OS at
/// connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IntegrityLevel {
    /// No integrity guarantee required.
    Untrusted,
    /// Ordinary application-level trust.
    Trusted,
    /// Platform/system-level trust.
    Privileged,
}

/// Configuration for a [`super::proxy::ConnectionProxy`].
#[derive(Debug, Clone)]
pub struct ConnectionProxyConfig {
    /// How long the application-side `connect()` call may block waiting
    /// for the reactor to complete asynchronous establishment.
    pub connect_timeout: Duration,
    /// The minimum integrity level the peer must present; connections
    /// from a less-trusted peer are refused.
    pub required_peer_integrity: IntegrityLevel,
    /// Read timeout applied to the underlying connection.
    pub read_timeout: Option<Duration>,
    /// Write timeout applied to the underlying connection.
    pub write_timeout: Option<Duration>,
}

impl Default for ConnectionProxyConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            required_peer_integrity: IntegrityLevel::Trusted,
            read_timeout: Some(Duration::from_secs(30)),
            write_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl ConnectionProxyConfig {
    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the required peer integrity level.
    pub fn with_required_peer_integrity(mut self, level: IntegrityLevel) -> Self {
        self.required_peer_integrity = level;
        self
    }

    /// Set the read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set the write timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_config_builder() {
        let config = ConnectionConfig::simple().with_connect_timeout(Duration::from_secs(10));

        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.keep_alive.is_none());
    }

    #[test]
    fn test_connection_proxy_config_defaults() {
        let config = ConnectionProxyConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.required_peer_integrity, IntegrityLevel::Trusted);
    }

    #[test]
    fn test_integrity_level_ordering() {
        assert!(IntegrityLevel::Untrusted < IntegrityLevel::Trusted);
        assert!(IntegrityLevel::Trusted < IntegrityLevel::Privileged);
    }
}
