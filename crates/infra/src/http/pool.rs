use std::time::Duration;

use hearth_domain::{HearthError, HttpMethod, PoolConfig};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder};
use tracing::debug;

use crate::errors::InfraError;

/// Shared keep-alive HTTP client used for every outbound call.
///
/// Cloning is cheap and every clone shares the same connection pool.
#[derive(Clone, Debug)]
pub struct ConnectionPool {
    client: ReqwestClient,
}

impl ConnectionPool {
    /// Start building a new connection pool.
    pub fn builder() -> ConnectionPoolBuilder {
        ConnectionPoolBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self, HearthError> {
        Self::builder().build()
    }

    pub fn from_config(config: &PoolConfig) -> Result<Self, HearthError> {
        Self::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .pool_idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .pool_max_idle_per_host(config.max_idle_per_host)
            .tcp_keepalive(Duration::from_secs(config.tcp_keepalive_secs))
            .user_agent(config.user_agent.clone())
            .build()
    }

    /// Create a request builder using the underlying reqwest client.
    pub fn request<U>(&self, method: HttpMethod, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        let method = match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };
        self.client.request(method, url)
    }

    pub fn client(&self) -> &ReqwestClient {
        &self.client
    }
}

/// Builder for [`ConnectionPool`].
#[derive(Debug)]
pub struct ConnectionPoolBuilder {
    connect_timeout: Duration,
    pool_idle_timeout: Duration,
    pool_max_idle_per_host: usize,
    tcp_keepalive: Option<Duration>,
    user_agent: Option<String>,
    default_headers: Option<reqwest::header::HeaderMap>,
}

impl Default for ConnectionPoolBuilder {
    fn default() -> Self {
        let defaults = PoolConfig::default();
        Self {
            connect_timeout: Duration::from_millis(defaults.connect_timeout_ms),
            pool_idle_timeout: Duration::from_secs(defaults.idle_timeout_secs),
            pool_max_idle_per_host: defaults.max_idle_per_host,
            tcp_keepalive: Some(Duration::from_secs(defaults.tcp_keepalive_secs)),
            user_agent: Some(defaults.user_agent),
            default_headers: None,
        }
    }
}

impl ConnectionPoolBuilder {
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// How long an idle keep-alive connection is kept open.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }

    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// A zero duration disables TCP keepalive probes.
    pub fn tcp_keepalive(mut self, interval: Duration) -> Self {
        self.tcp_keepalive = (!interval.is_zero()).then_some(interval);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn default_headers(mut self, headers: reqwest::header::HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    pub fn build(self) -> Result<ConnectionPool, HearthError> {
        if self.connect_timeout.is_zero() {
            return Err(HearthError::Config("connect timeout must be greater than 0".into()));
        }

        // Per-request deadlines are set on each request, not here.
        let mut builder = ReqwestClient::builder()
            .connect_timeout(self.connect_timeout)
            .pool_idle_timeout(self.pool_idle_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .tcp_keepalive(self.tcp_keepalive)
            .no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        let client = builder.build().map_err(|err| {
            let infra: InfraError = err.into();
            HearthError::from(infra)
        })?;

        debug!(
            connect_timeout_ms = self.connect_timeout.as_millis() as u64,
            max_idle_per_host = self.pool_max_idle_per_host,
            "Connection pool ready"
        );
        Ok(ConnectionPool { client })
    }
}
