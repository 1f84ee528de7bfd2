//! Registry-backed service discovery
//!
//! Implements the core `RegistrySource` port with one bounded GET against
//! the admin service. The payload is a JSON object of service name to base
//! URL; entries whose value is not a string are skipped.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use hearth_core::RegistrySource;
use hearth_domain::{DispatchConfig, HearthError, HttpMethod, Result};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::InfraError;
use crate::http::ConnectionPool;

/// Fetches the endpoint map from `GET <registry>/internal/config/rag-services`
#[derive(Debug, Clone)]
pub struct HttpRegistrySource {
    pool: ConnectionPool,
    endpoint: String,
    timeout: Duration,
}

impl HttpRegistrySource {
    pub fn new(pool: ConnectionPool, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self { pool, endpoint: endpoint.into(), timeout }
    }

    /// `None` when no registry URL is configured
    pub fn from_config(pool: ConnectionPool, config: &DispatchConfig) -> Option<Self> {
        config
            .registry
            .endpoint()
            .map(|endpoint| Self::new(pool, endpoint, config.registry.timeout()))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn parse_endpoints(body: &[u8]) -> Result<HashMap<String, String>> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| HearthError::InvalidInput(format!("registry body is not JSON: {e}")))?;
    let Value::Object(entries) = value else {
        return Err(HearthError::InvalidInput("registry body is not a JSON object".into()));
    };

    let mut endpoints = HashMap::with_capacity(entries.len());
    for (service, url) in entries {
        match url {
            Value::String(url) => {
                endpoints.insert(service, url);
            }
            other => warn!(service = %service, value = %other, "Ignoring non-string registry entry"),
        }
    }
    Ok(endpoints)
}

#[async_trait]
impl RegistrySource for HttpRegistrySource {
    async fn fetch_endpoints(&self) -> Result<HashMap<String, String>> {
        debug!(
            endpoint = %self.endpoint,
            timeout_ms = self.timeout.as_millis() as u64,
            "Loading service registry"
        );

        let response = self
            .pool
            .request(HttpMethod::Get, self.endpoint.as_str())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| HearthError::from(InfraError::from(err)))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(HearthError::Network(format!("registry returned HTTP {}", status.as_u16())));
        }

        let body = response.bytes().await.map_err(|err| HearthError::from(InfraError::from(err)))?;
        parse_endpoints(&body)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn source_for(server: &MockServer, timeout: Duration) -> HttpRegistrySource {
        let mut config = DispatchConfig::default();
        config.registry.url = Some(server.uri());
        config.registry.timeout_ms = timeout.as_millis() as u64;
        HttpRegistrySource::from_config(ConnectionPool::new().unwrap(), &config).unwrap()
    }

    #[test]
    fn parse_skips_non_string_values() {
        let body = br#"{"weather":"http://w:1","sports":42,"news":"http://n:2"}"#;
        let endpoints = parse_endpoints(body).unwrap();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints["news"], "http://n:2");
    }

    #[test]
    fn parse_rejects_non_objects() {
        assert!(parse_endpoints(b"[]").is_err());
        assert!(parse_endpoints(b"not json").is_err());
    }

    #[test]
    fn no_registry_url_means_no_source() {
        let pool = ConnectionPool::new().unwrap();
        assert!(HttpRegistrySource::from_config(pool, &DispatchConfig::default()).is_none());
    }

    #[tokio::test]
    async fn fetches_service_map() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/internal/config/rag-services"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "weather": "http://w:8010" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let source = source_for(&server, Duration::from_secs(1));
        let endpoints = source.fetch_endpoints().await.unwrap();
        assert_eq!(endpoints["weather"], "http://w:8010");
    }

    #[tokio::test]
    async fn non_200_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source = source_for(&server, Duration::from_secs(1));
        let err = source.fetch_endpoints().await.unwrap_err();
        assert_eq!(err, HearthError::Network("registry returned HTTP 503".into()));
    }

    #[tokio::test]
    async fn slow_registry_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let source = source_for(&server, Duration::from_millis(50));
        let err = source.fetch_endpoints().await.unwrap_err();
        assert_eq!(err, HearthError::Network("HTTP request timed out".into()));
    }
}
