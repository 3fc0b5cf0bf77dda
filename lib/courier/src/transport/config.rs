//! Settings of the hyper transport.

use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_IDLE_PER_HOST: usize = 32;
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_USER_AGENT: &str = concat!("courier/", env!("CARGO_PKG_VERSION"));

/// Settings of a [`super::HyperTransport`].
///
/// Start from [`ClientConfig::default`] and chain the `with_*` setters:
///
/// ```
/// use std::time::Duration;
/// use courier::transport::ClientConfig;
///
/// let config = ClientConfig::default()
///     .with_timeout(Some(Duration::from_secs(5)))
///     .without_user_agent();
/// assert_eq!(config.timeout, Some(Duration::from_secs(5)));
/// assert!(config.user_agent.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Time allowed for the whole exchange, until the last body chunk; `None`
    /// waits forever.
    pub timeout: Option<Duration>,
    /// Time allowed to establish a connection.
    pub connect_timeout: Duration,
    /// Idle connections kept per host.
    pub pool_idle_per_host: usize,
    /// How long an idle connection is kept.
    pub pool_idle_timeout: Duration,
    /// Resend requests whose pooled connection closed before they went out.
    pub retry_canceled_requests: bool,
    /// `User-Agent` added to requests that carry none.
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            pool_idle_per_host: DEFAULT_IDLE_PER_HOST,
            pool_idle_timeout: DEFAULT_IDLE_TIMEOUT,
            retry_canceled_requests: true,
            user_agent: Some(DEFAULT_USER_AGENT.to_owned()),
        }
    }
}

impl ClientConfig {
    /// Set the exchange deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Keep at most `count` idle connections per host, and each for at most
    /// `timeout`.
    #[must_use]
    pub const fn with_pool(mut self, count: usize, timeout: Duration) -> Self {
        self.pool_idle_per_host = count;
        self.pool_idle_timeout = timeout;
        self
    }

    /// Set whether requests on a stale pooled connection are resent.
    #[must_use]
    pub const fn with_retry_canceled_requests(mut self, retry: bool) -> Self {
        self.retry_canceled_requests = retry;
        self
    }

    /// Set the default `User-Agent`.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Send requests without a default `User-Agent`.
    #[must_use]
    pub fn without_user_agent(mut self) -> Self {
        self.user_agent = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.retry_canceled_requests);
        assert!(config.user_agent.as_deref().is_some_and(|ua| ua.starts_with("courier/")));
    }

    #[test]
    fn setters_keep_other_values() {
        let config = ClientConfig::default()
            .with_timeout(None)
            .with_pool(4, Duration::from_secs(5))
            .with_user_agent("tests/1.0");

        assert_eq!(config.timeout, None);
        assert_eq!(config.pool_idle_per_host, 4);
        assert_eq!(config.pool_idle_timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.user_agent.as_deref(), Some("tests/1.0"));
    }
}
