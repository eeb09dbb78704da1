//! Client configuration.

use crate::error::ClientError;
use std::time::Duration;
use vergedb_codec::DecodeLimits;

/// Default shared timeout: dispatcher-side channel sends and caller-side
/// response waits.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Default inbound message size ceiling (1 MiB).
pub const DEFAULT_READ_LIMIT: usize = 1024 * 1024;

/// Minimum inbound message size ceiling (1 KiB).
pub const MIN_READ_LIMIT: usize = 1024;

/// Maximum inbound message size ceiling (64 MiB).
pub const MAX_READ_LIMIT: usize = 64 * 1024 * 1024;

/// Connection configuration.
///
/// `host` is the bare authority (`localhost:8000`), without a scheme or the
/// `/rpc` path. The namespace and database are created on connect if they do
/// not exist.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host address of the database.
    pub host: String,
    /// Use a secure connection (wss).
    pub secure: bool,
    /// Username for authentication.
    pub username: String,
    /// Password for authentication.
    pub password: String,
    /// Namespace to select.
    pub namespace: String,
    /// Database to select.
    pub database: String,
    /// Shared timeout for response waits and dispatcher sends.
    pub request_timeout: Duration,
    /// Inbound message size ceiling.
    pub read_limit: usize,
    /// Decoder limits applied to every inbound frame.
    pub decode_limits: DecodeLimits,
}

impl Config {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        namespace: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            secure: false,
            username: username.into(),
            password: password.into(),
            namespace: namespace.into(),
            database: database.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            read_limit: DEFAULT_READ_LIMIT,
            decode_limits: DecodeLimits::default(),
        }
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_read_limit(mut self, limit: usize) -> Self {
        self.read_limit = limit.clamp(MIN_READ_LIMIT, MAX_READ_LIMIT);
        self
    }

    pub fn with_decode_limits(mut self, limits: DecodeLimits) -> Self {
        self.decode_limits = limits;
        self
    }

    /// Validates the workspace names. Runs before any I/O.
    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if !valid_name(&self.namespace) {
            return Err(ClientError::InvalidNamespaceName(self.namespace.clone()));
        }
        if !valid_name(&self.database) {
            return Err(ClientError::InvalidDatabaseName(self.database.clone()));
        }
        Ok(())
    }
}

/// Workspace names must match `^[A-Za-z0-9_]+$`.
fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new("localhost:8000", "root", "root", "test_ns", "test_db");
        assert!(!config.secure);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.read_limit, DEFAULT_READ_LIMIT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_read_limit_clamping() {
        let config =
            Config::new("localhost:8000", "root", "root", "ns", "db").with_read_limit(100);
        assert_eq!(config.read_limit, MIN_READ_LIMIT);

        let config = Config::new("localhost:8000", "root", "root", "ns", "db")
            .with_read_limit(usize::MAX);
        assert_eq!(config.read_limit, MAX_READ_LIMIT);
    }

    #[test]
    fn test_name_validation() {
        let config = Config::new("localhost:8000", "root", "root", "bad-name", "db");
        assert!(matches!(
            config.validate(),
            Err(ClientError::InvalidNamespaceName(_))
        ));

        let config = Config::new("localhost:8000", "root", "root", "ns", "");
        assert!(matches!(
            config.validate(),
            Err(ClientError::InvalidDatabaseName(_))
        ));

        let config = Config::new("localhost:8000", "root", "root", "ns_1", "db_2");
        assert!(config.validate().is_ok());
    }
}
