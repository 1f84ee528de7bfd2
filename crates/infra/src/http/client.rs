use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hearth_common::resilience::{CircuitBreaker, SharedClock, SystemClock};
use hearth_core::{CircuitBreakerRegistry, HealthStatus, RateLimiterRegistry, ServiceDirectory};
use hearth_domain::{
    DispatchConfig, DispatchError, EndpointSource, HttpMethod, ResilientResponse, Result,
};
use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::pool::ConnectionPool;
use crate::discovery::HttpRegistrySource;
use crate::errors::classify_transport_error;

/// Per-call options for [`ResilientClient::request`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    params: Vec<(String, String)>,
    json: Option<Value>,
    headers: Vec<(String, String)>,
    session_id: Option<String>,
    timeout: Option<Duration>,
    skip_circuit_breaker: bool,
    skip_rate_limit: bool,
    wait_for_token: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.params.extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// JSON request body.
    pub fn json(mut self, body: Value) -> Self {
        self.json = Some(body);
        self
    }

    /// Extra header, passed through verbatim.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Charge the call to this session's budget.
    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Deadline for the HTTP exchange, replacing the client default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Neither consult nor update the breaker.
    pub fn skip_circuit_breaker(mut self) -> Self {
        self.skip_circuit_breaker = true;
        self
    }

    pub fn skip_rate_limit(mut self) -> Self {
        self.skip_rate_limit = true;
        self
    }

    /// Wait up to `max_wait` for a token instead of failing immediately.
    pub fn wait_for_token(mut self, max_wait: Duration) -> Self {
        self.wait_for_token = Some(max_wait);
        self
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }
}

/// Unified outbound client: breaker, rate limiter, directory and pool.
///
/// [`ResilientClient::request`] never returns an error; every outcome is a
/// [`ResilientResponse`].
pub struct ResilientClient {
    pool: ConnectionPool,
    breakers: Arc<CircuitBreakerRegistry>,
    limiters: Arc<RateLimiterRegistry>,
    directory: Arc<ServiceDirectory>,
    registry: Option<HttpRegistrySource>,
    default_timeout: Duration,
    closed: AtomicBool,
}

impl ResilientClient {
    /// Build the client and everything it owns from one config.
    pub fn new(config: &DispatchConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock::shared())
    }

    pub fn with_clock(config: &DispatchConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;
        let pool = ConnectionPool::from_config(&config.pool)?;
        let breakers = Arc::new(CircuitBreakerRegistry::with_clock(config, Arc::clone(&clock))?);
        let limiters = Arc::new(RateLimiterRegistry::with_clock(config, clock)?);
        let directory = Arc::new(ServiceDirectory::from_config(config));
        let registry = HttpRegistrySource::from_config(pool.clone(), config);

        Ok(Self::from_parts(pool, breakers, limiters, directory, config.request_timeout())
            .with_registry(registry))
    }

    /// Assemble from existing registries, e.g. ones shared with other clients.
    pub fn from_parts(
        pool: ConnectionPool,
        breakers: Arc<CircuitBreakerRegistry>,
        limiters: Arc<RateLimiterRegistry>,
        directory: Arc<ServiceDirectory>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            breakers,
            limiters,
            directory,
            registry: None,
            default_timeout,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_registry(mut self, registry: Option<HttpRegistrySource>) -> Self {
        self.registry = registry;
        self
    }

    /// Call `path` on `service`.
    ///
    /// The service name is resolved first against a read-only snapshot, so
    /// unknown names never create breaker or limiter state. Admission then
    /// runs breaker first, then rate limiter; denials never touch the
    /// network. Only transport failures and timeouts count against the
    /// breaker.
    pub async fn request(
        &self,
        service: &str,
        method: HttpMethod,
        path: &str,
        options: RequestOptions,
    ) -> ResilientResponse {
        if self.is_closed() {
            return ResilientResponse::failure(
                service,
                DispatchError::ConnectFailed { message: "client closed".into() },
            );
        }

        let Some(url) = self.directory.url_for(service, path) else {
            warn!(service, path, "Unknown service, no endpoint configured");
            return ResilientResponse::failure(
                service,
                DispatchError::UnknownService { service: service.to_string() },
            );
        };

        let breaker = if options.skip_circuit_breaker {
            None
        } else {
            match self.admit_breaker(service) {
                Ok(breaker) => Some(breaker),
                Err(kind) => return ResilientResponse::failure(service, kind),
            }
        };

        if !options.skip_rate_limit && !self.admit_rate(service, &options).await {
            release(breaker.as_deref());
            return ResilientResponse::failure(service, DispatchError::RateLimited);
        }

        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let builder = self.build_request(method, &url, timeout, options);

        let response = match self.send(service, builder, timeout).await {
            Err(SendError::Invalid(message)) => {
                release(breaker.as_deref());
                warn!(service, %url, error = %message, "Request could not be built");
                return ResilientResponse::failure(service, DispatchError::ConnectFailed { message });
            }
            Err(SendError::Transport(kind)) => {
                warn!(service, %method, %url, error = %kind, "Request failed");
                ResilientResponse::failure(service, kind)
            }
            Ok((status, body)) => interpret(service, status, &body),
        };

        if let Some(breaker) = &breaker {
            record_outcome(breaker, &response);
        }
        response
    }

    /// [`Self::request`] with `GET`.
    pub async fn get(&self, service: &str, path: &str, options: RequestOptions) -> ResilientResponse {
        self.request(service, HttpMethod::Get, path, options).await
    }

    /// [`Self::request`] with `POST`; set the body with [`RequestOptions::json`].
    pub async fn post(
        &self,
        service: &str,
        path: &str,
        options: RequestOptions,
    ) -> ResilientResponse {
        self.request(service, HttpMethod::Post, path, options).await
    }

    fn admit_breaker(&self, service: &str) -> std::result::Result<Arc<CircuitBreaker>, DispatchError> {
        match self.breakers.get(service) {
            Ok(breaker) if breaker.can_execute() => Ok(breaker),
            Ok(breaker) => {
                let status = breaker.status();
                warn!(
                    service,
                    state = %status.state,
                    cooldown_remaining = status.cooldown_remaining,
                    "Circuit open, rejecting request"
                );
                Err(DispatchError::CircuitOpen)
            }
            Err(err) => {
                error!(service, error = %err, "Circuit breaker unavailable, rejecting request");
                Err(DispatchError::CircuitOpen)
            }
        }
    }

    async fn admit_rate(&self, service: &str, options: &RequestOptions) -> bool {
        let session_id = options.session_id();
        match options.wait_for_token {
            Some(max_wait) => self.limiters.wait_and_acquire(service, session_id, max_wait).await,
            None => self.limiters.acquire(service, session_id),
        }
    }

    fn build_request(
        &self,
        method: HttpMethod,
        url: &str,
        timeout: Duration,
        options: RequestOptions,
    ) -> RequestBuilder {
        let mut builder = self.pool.request(method, url).timeout(timeout);
        if !options.params.is_empty() {
            builder = builder.query(&options.params);
        }
        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &options.json {
            builder = builder.json(body);
        }
        builder
    }

    async fn send(
        &self,
        service: &str,
        builder: RequestBuilder,
        timeout: Duration,
    ) -> std::result::Result<(StatusCode, Vec<u8>), SendError> {
        let request = builder.build().map_err(|err| SendError::Invalid(err.to_string()))?;
        debug!(service, method = %request.method(), url = %request.url(), "Sending request");

        let response = self
            .pool
            .client()
            .execute(request)
            .await
            .map_err(|err| SendError::Transport(classify_transport_error(&err, timeout)))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| SendError::Transport(classify_transport_error(&err, timeout)))?;

        debug!(service, status = status.as_u16(), bytes = body.len(), "Received response");
        Ok((status, body.to_vec()))
    }

    /// Breakers, limiters and directory in one snapshot.
    pub fn get_health_status(&self) -> HealthStatus {
        HealthStatus::collect(&self.breakers, &self.limiters, &self.directory)
    }

    /// Whether a call to `service` would pass the breaker right now.
    pub fn is_service_available(&self, service: &str) -> bool {
        self.breakers.is_available(service)
    }

    /// Known services whose breaker would admit a call, sorted.
    pub fn get_available_services(&self) -> Vec<String> {
        self.directory
            .services()
            .into_iter()
            .filter(|service| self.breakers.is_available(service))
            .collect()
    }

    /// Close the breaker and refill the limiters for one service.
    pub fn reset_service(&self, service: &str) -> bool {
        let breaker = self.breakers.reset_service(service);
        let limiter = self.limiters.reset_service(service);
        info!(service, "Service state reset");
        breaker || limiter
    }

    pub fn reset_all(&self) {
        self.breakers.reset_all();
        self.limiters.reset_all();
    }

    pub fn update_rate_limiter_config(&self, service: &str, requests_per_minute: u32) -> Result<()> {
        self.limiters.update_config(service, requests_per_minute)
    }

    pub fn update_service_url(&self, service: &str, url: &str) -> Result<()> {
        self.directory.override_url(service, url)
    }

    pub fn service_url(&self, service: &str) -> Option<String> {
        self.directory.resolve(service)
    }

    /// One-shot registry load; keeps the current map on any failure.
    pub async fn load_service_urls_from_registry(&self) -> EndpointSource {
        match &self.registry {
            Some(registry) => {
                let source = self.directory.load_from(registry).await;
                info!(
                    registry = registry.endpoint(),
                    %source,
                    services = self.directory.services().len(),
                    "Service directory loaded"
                );
                source
            }
            None => {
                debug!("No service registry configured, using fallback endpoints");
                self.directory.source()
            }
        }
    }

    pub fn directory(&self) -> &ServiceDirectory {
        &self.directory
    }

    pub fn circuit_breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    pub fn rate_limiters(&self) -> &RateLimiterRegistry {
        &self.limiters
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Fail every later request fast with `ConnectFailed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("default_timeout", &self.default_timeout)
            .field("registry", &self.registry.as_ref().map(HttpRegistrySource::endpoint))
            .field("closed", &self.is_closed())
            .finish()
    }
}

enum SendError {
    /// The request never left the process
    Invalid(String),
    Transport(DispatchError),
}

/// Hand back a half-open trial slot for a call that was never sent.
fn release(breaker: Option<&CircuitBreaker>) {
    if let Some(breaker) = breaker {
        breaker.release_probe();
    }
}

/// Feed a finished call back into its breaker.
fn record_outcome(breaker: &CircuitBreaker, response: &ResilientResponse) {
    match response.kind() {
        Some(kind) if kind.counts_as_breaker_failure() => breaker.record_failure(),
        Some(kind) if !kind.destination_reached() => breaker.release_probe(),
        _ => breaker.record_success(),
    }
}

fn interpret(service: &str, status: StatusCode, body: &[u8]) -> ResilientResponse {
    let code = status.as_u16();
    let is_empty = body.iter().all(u8::is_ascii_whitespace);

    if !status.is_success() {
        let data = if is_empty { None } else { serde_json::from_slice(body).ok() };
        warn!(service, status = code, "Service returned error status");
        return ResilientResponse::failure(service, DispatchError::BadStatus { code })
            .with_data(data);
    }

    if is_empty {
        return ResilientResponse::ok(service, code, None);
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(data) => ResilientResponse::ok(service, code, Some(data)),
        Err(err) => {
            warn!(service, status = code, error = %err, "Response body is not valid JSON");
            let kind = DispatchError::ParseError { message: err.to_string() };
            ResilientResponse::failure(service, kind).with_status(code)
        }
    }
}
