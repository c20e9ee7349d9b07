//! Configuration for the hub client

use crate::error::{HubError, Result};
use crate::retry::{FixedDelays, NoRetry, RetryPolicy};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Options handed to the connector on every connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Extra headers sent with the session request
    pub headers: Vec<(String, String)>,

    /// Upper bound for transport setup plus protocol handshake
    pub handshake_timeout: Duration,

    /// Whether to skip TLS certificate verification (for development)
    pub dangerous_skip_cert_verify: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            handshake_timeout: Duration::from_secs(15),
            dangerous_skip_cert_verify: false,
        }
    }
}

impl TransportOptions {
    /// Add a header to every connection attempt
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Configuration for connecting to a hub
///
/// Fixed once the client is built; only the access token can change afterwards.
#[derive(Clone)]
pub struct HubConfig {
    /// Hub URL (e.g., "https://localhost:4433/hub")
    pub url: String,

    /// Consulted after every failed attempt or dropped session
    pub retry_policy: Arc<dyn RetryPolicy>,

    pub transport: TransportOptions,

    /// Deadline for awaited invocations; wait indefinitely when `None`
    pub invocation_timeout: Option<Duration>,

    /// Interval between keepalive pings
    pub ping_interval: Duration,

    /// A session that receives nothing for this long is treated as lost
    pub server_timeout: Duration,
}

impl fmt::Debug for HubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubConfig")
            .field("url", &self.url)
            .field("transport", &self.transport)
            .field("invocation_timeout", &self.invocation_timeout)
            .field("ping_interval", &self.ping_interval)
            .field("server_timeout", &self.server_timeout)
            .finish_non_exhaustive()
    }
}

impl HubConfig {
    /// Create a new configuration for the given hub URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            retry_policy: Arc::new(FixedDelays::default()),
            transport: TransportOptions::default(),
            invocation_timeout: None,
            ping_interval: Duration::from_secs(15),
            server_timeout: Duration::from_secs(30),
        }
    }

    /// Set the reconnect policy
    pub fn retry_policy(mut self, policy: impl RetryPolicy) -> Self {
        self.retry_policy = Arc::new(policy);
        self
    }

    /// Disable automatic reconnection
    pub fn no_reconnect(self) -> Self {
        self.retry_policy(NoRetry)
    }

    /// Adjust the transport options in place
    pub fn configure_transport<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(&mut TransportOptions),
    {
        configure(&mut self.transport);
        self
    }

    /// Fail awaited invocations that get no answer within `timeout`
    pub fn invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = Some(timeout);
        self
    }

    /// Set the keepalive ping interval
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set how long a silent session is tolerated
    pub fn server_timeout(mut self, timeout: Duration) -> Self {
        self.server_timeout = timeout;
        self
    }

    /// Skip TLS certificate verification (DANGEROUS - only for development)
    pub fn dangerous_skip_cert_verify(mut self) -> Self {
        self.transport.dangerous_skip_cert_verify = true;
        self
    }

    /// Check the parameters and parse the hub address
    pub fn validate(&self) -> Result<Url> {
        let url = Url::parse(&self.url)
            .map_err(|e| HubError::Configuration(format!("invalid hub URL '{}': {}", self.url, e)))?;

        if url.host_str().is_none() {
            return Err(HubError::Configuration(format!(
                "hub URL '{}' has no host",
                self.url
            )));
        }
        if self.ping_interval.is_zero() {
            return Err(HubError::Configuration("ping interval must be non-zero".into()));
        }
        if self.server_timeout <= self.ping_interval {
            return Err(HubError::Configuration(format!(
                "server timeout ({:?}) must exceed the ping interval ({:?})",
                self.server_timeout, self.ping_interval
            )));
        }

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryContext;

    fn retry_context(previous_retry_count: u32) -> RetryContext {
        RetryContext {
            previous_retry_count,
            elapsed: Duration::ZERO,
            retry_reason: String::new(),
        }
    }

    #[test]
    fn test_config_new_defaults() {
        let config = HubConfig::new("https://localhost:4433/hub");

        assert_eq!(config.url, "https://localhost:4433/hub");
        assert_eq!(config.transport, TransportOptions::default());
        assert_eq!(config.transport.handshake_timeout, Duration::from_secs(15));
        assert!(config.invocation_timeout.is_none());
        assert_eq!(config.ping_interval, Duration::from_secs(15));
        assert_eq!(config.server_timeout, Duration::from_secs(30));
        assert_eq!(
            config.retry_policy.next_retry_delay(&retry_context(0)),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_config_no_reconnect() {
        let config = HubConfig::new("https://localhost:4433/hub").no_reconnect();

        assert_eq!(config.retry_policy.next_retry_delay(&retry_context(0)), None);
    }

    #[test]
    fn test_config_configure_transport() {
        let config = HubConfig::new("https://localhost:4433/hub").configure_transport(|opts| {
            opts.header("X-Client", "unit-test");
            opts.handshake_timeout = Duration::from_secs(3);
        });

        assert_eq!(
            config.transport.headers,
            vec![("X-Client".to_string(), "unit-test".to_string())]
        );
        assert_eq!(config.transport.handshake_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_config_builder_chain() {
        let config = HubConfig::new("https://example.com:4433/game")
            .invocation_timeout(Duration::from_secs(5))
            .ping_interval(Duration::from_secs(10))
            .server_timeout(Duration::from_secs(40))
            .dangerous_skip_cert_verify();

        assert_eq!(config.invocation_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.ping_interval, Duration::from_secs(10));
        assert_eq!(config.server_timeout, Duration::from_secs(40));
        assert!(config.transport.dangerous_skip_cert_verify);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_address() {
        let err = HubConfig::new("not a url").validate().unwrap_err();
        assert!(matches!(err, HubError::Configuration(_)));

        let err = HubConfig::new("unix:/tmp/hub.sock").validate().unwrap_err();
        assert!(matches!(err, HubError::Configuration(_)));
    }

    #[test]
    fn test_validate_rejects_server_timeout_below_ping() {
        let err = HubConfig::new("https://localhost:4433/hub")
            .ping_interval(Duration::from_secs(30))
            .server_timeout(Duration::from_secs(10))
            .validate()
            .unwrap_err();

        assert!(matches!(err, HubError::Configuration(_)));
    }

    #[test]
    fn test_config_debug_hides_policy() {
        let debug = format!("{:?}", HubConfig::new("https://localhost:4433/hub"));
        assert!(debug.contains("https://localhost:4433/hub"));
        assert!(debug.ends_with(".. }"));
    }
}
