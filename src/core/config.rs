//! Connection parameters for the clamd daemon.
//!
//! `ClamdConfig` describes where the daemon lives and the bounds every
//! session runs under. The external backend selector builds one and hands
//! it to [`ClamdScanner`](crate::backends::ClamdScanner) or
//! [`TransportSession::open`](crate::transport::TransportSession::open).

use crate::core::error::ScanError;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default clamd Unix socket location.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/clamav/clamd.ctl";

/// Where the daemon listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonAddress {
    /// Local Unix domain socket.
    Unix(PathBuf),
    /// TCP `host:port`.
    Tcp(String),
}

impl fmt::Display for DaemonAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}

/// clamd connection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClamdConfig {
    /// Daemon address.
    pub address: DaemonAddress,

    /// Bound on establishing the connection.
    #[serde(with = "duration_millis")]
    pub connect_timeout: Duration,

    /// Bound on waiting for the verdict after the terminator is sent.
    #[serde(with = "duration_millis")]
    pub read_timeout: Duration,

    /// Bound on writing a single frame.
    #[serde(with = "duration_millis")]
    pub write_timeout: Duration,

    /// Maximum cumulative bytes per session, if any.
    pub size_limit: Option<u64>,

    /// Read size used when pulling from an input source.
    pub chunk_size: usize,

    /// Depth of the bounded queues between a duplex producer and its consumers.
    pub queue_depth: usize,
}

impl Default for ClamdConfig {
    fn default() -> Self {
        Self {
            address: DaemonAddress::Unix(PathBuf::from(DEFAULT_SOCKET_PATH)),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(300), // 5 minutes
            write_timeout: Duration::from_secs(30),
            size_limit: None,
            chunk_size: 64 * 1024,
            queue_depth: 16,
        }
    }
}

impl ClamdConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for a daemon on a Unix socket.
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::default().with_socket(path)
    }

    /// Configuration for a daemon on TCP.
    pub fn tcp(address: impl Into<String>) -> Self {
        Self::default().with_tcp(address)
    }

    /// Uses a Unix socket.
    pub fn with_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.address = DaemonAddress::Unix(path.into());
        self
    }

    /// Uses a TCP connection.
    pub fn with_tcp(mut self, address: impl Into<String>) -> Self {
        self.address = DaemonAddress::Tcp(address.into());
        self
    }

    /// Sets the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the verdict read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the per-frame write timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the per-session size cap.
    pub fn with_size_limit(mut self, limit: u64) -> Self {
        self.size_limit = Some(limit);
        self
    }

    /// Sets the input read size.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Sets the duplex queue depth.
    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Checks the configuration for values no session could run under.
    pub fn validate(&self) -> Result<(), ScanError> {
        match &self.address {
            DaemonAddress::Unix(path) if path.as_os_str().is_empty() => {
                return Err(ScanError::configuration("socket path is empty"));
            }
            DaemonAddress::Tcp(addr) if addr.trim().is_empty() => {
                return Err(ScanError::configuration("tcp address is empty"));
            }
            _ => {}
        }
        if self.connect_timeout.is_zero()
            || self.read_timeout.is_zero()
            || self.write_timeout.is_zero()
        {
            return Err(ScanError::configuration("timeouts must be non-zero"));
        }
        if self.chunk_size == 0 {
            return Err(ScanError::configuration("chunk_size must be non-zero"));
        }
        if self.queue_depth == 0 {
            return Err(ScanError::configuration("queue_depth must be non-zero"));
        }
        Ok(())
    }
}

/// Serde helper for Duration serialization as integer milliseconds.
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClamdConfig::default();
        assert_eq!(
            config.address,
            DaemonAddress::Unix(PathBuf::from(DEFAULT_SOCKET_PATH))
        );
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.size_limit, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ClamdConfig::tcp("127.0.0.1:3310")
            .with_read_timeout(Duration::from_secs(60))
            .with_size_limit(5 * 1024 * 1024)
            .with_chunk_size(4096);

        assert_eq!(config.address, DaemonAddress::Tcp("127.0.0.1:3310".into()));
        assert_eq!(config.read_timeout, Duration::from_secs(60));
        assert_eq!(config.size_limit, Some(5 * 1024 * 1024));
        assert_eq!(config.chunk_size, 4096);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ClamdConfig::tcp("").validate().is_err());
        assert!(ClamdConfig::unix("").validate().is_err());
        assert!(ClamdConfig::new()
            .with_read_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(ClamdConfig::new().with_chunk_size(0).validate().is_err());
        assert!(ClamdConfig::new().with_queue_depth(0).validate().is_err());
    }

    #[test]
    fn test_config_deserialize_millis() {
        let json = r#"{"address":{"tcp":"clamd:3310"},"read_timeout":1500}"#;
        let config: ClamdConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.address, DaemonAddress::Tcp("clamd:3310".into()));
        assert_eq!(config.read_timeout, Duration::from_millis(1500));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_address_display() {
        assert_eq!(
            DaemonAddress::Unix(PathBuf::from("/run/clamd.sock")).to_string(),
            "unix:/run/clamd.sock"
        );
        assert_eq!(DaemonAddress::Tcp("h:1".into()).to_string(), "tcp:h:1");
    }
}
