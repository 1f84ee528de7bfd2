//! Service directory - endpoint map with atomic refresh and runtime override

use std::sync::Arc;

use hearth_domain::{DispatchConfig, EndpointSource, HearthError, Result, ServiceEndpointMap};
use parking_lot::RwLock;
use tracing::{info, warn};
use url::Url;

use super::ports::RegistrySource;

/// Join a base URL and a request path with exactly one slash between them
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.is_empty() {
        base.to_string()
    } else if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

fn validate_base_url(url: &str) -> Result<()> {
    let parsed = Url::parse(url.trim())
        .map_err(|e| HearthError::InvalidInput(format!("invalid base url {url}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(HearthError::InvalidInput(format!("base url must be http(s): {url}")));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(HearthError::InvalidInput(format!("base url has no host: {url}")));
    }
    Ok(())
}

/// Resolves service names to base URLs
///
/// Reads clone an `Arc` of the current map under a short read lock; writers
/// build a new map and swap it in, so no lock is held across I/O.
#[derive(Debug)]
pub struct ServiceDirectory {
    current: RwLock<Arc<ServiceEndpointMap>>,
    fallback: Arc<ServiceEndpointMap>,
}

impl ServiceDirectory {
    /// Start from `fallback`; it is also what a failed registry load keeps
    pub fn new(fallback: ServiceEndpointMap) -> Self {
        let mut fallback = fallback;
        fallback.set_source(EndpointSource::Fallback);
        let fallback = Arc::new(fallback);
        Self { current: RwLock::new(Arc::clone(&fallback)), fallback }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config.fallback_endpoints())
    }

    /// Current map; cheap to call on every request
    pub fn snapshot(&self) -> Arc<ServiceEndpointMap> {
        Arc::clone(&*self.current.read())
    }

    pub fn resolve(&self, service: &str) -> Option<String> {
        self.snapshot().get(service).map(str::to_string)
    }

    /// Full URL for `path` on `service`
    pub fn url_for(&self, service: &str, path: &str) -> Option<String> {
        self.snapshot().get(service).map(|base| join_url(base, path))
    }

    pub fn contains(&self, service: &str) -> bool {
        self.snapshot().contains(service)
    }

    pub fn source(&self) -> EndpointSource {
        self.snapshot().source()
    }

    pub fn services(&self) -> Vec<String> {
        self.snapshot().services()
    }

    /// Swap in a whole new map
    pub fn replace(&self, map: ServiceEndpointMap) {
        let services = map.len();
        let source = map.source();
        *self.current.write() = Arc::new(map);
        info!(services, %source, "Service directory replaced");
    }

    /// Go back to the compiled-in map
    pub fn restore_fallback(&self) {
        *self.current.write() = Arc::clone(&self.fallback);
        info!(services = self.fallback.len(), "Service directory restored to fallback");
    }

    /// Replace one service's base URL without a full reload
    pub fn override_url(&self, service: &str, url: &str) -> Result<()> {
        if service.trim().is_empty() {
            return Err(HearthError::InvalidInput("service name must not be empty".into()));
        }
        validate_base_url(url)?;

        let mut current = self.current.write();
        let mut updated = (**current).clone();
        let previous = updated.insert(service, url);
        updated.set_source(EndpointSource::Override);
        *current = Arc::new(updated);
        drop(current);

        info!(service, url, previous = previous.as_deref(), "Service URL overridden");
        Ok(())
    }

    /// One-shot load from the registry
    ///
    /// On any failure or an empty payload the current map is kept. Returns
    /// the source in effect afterwards.
    pub async fn load_from(&self, source: &dyn RegistrySource) -> EndpointSource {
        match source.fetch_endpoints().await {
            Ok(endpoints) if endpoints.is_empty() => {
                warn!("Service registry returned no services, keeping current endpoints");
            }
            Ok(endpoints) => {
                let valid: Vec<(String, String)> = endpoints
                    .into_iter()
                    .filter(|(service, url)| match validate_base_url(url) {
                        Ok(()) => true,
                        Err(err) => {
                            warn!(service = %service, error = %err, "Skipping registry entry");
                            false
                        }
                    })
                    .collect();
                if valid.is_empty() {
                    warn!("Service registry had no usable entries, keeping current endpoints");
                } else {
                    self.replace(ServiceEndpointMap::from_pairs(valid, EndpointSource::Registry));
                }
            }
            Err(err) => {
                warn!(error = %err, "Service registry unavailable, keeping current endpoints");
            }
        }
        self.source()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;

    struct StaticSource(Result<HashMap<String, String>>);

    #[async_trait]
    impl RegistrySource for StaticSource {
        async fn fetch_endpoints(&self) -> Result<HashMap<String, String>> {
            self.0.clone()
        }
    }

    fn source_with(pairs: &[(&str, &str)]) -> StaticSource {
        StaticSource(Ok(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()))
    }

    #[test]
    fn test_join_url_handles_slashes() {
        assert_eq!(join_url("http://h:1", "/current"), "http://h:1/current");
        assert_eq!(join_url("http://h:1/", "current"), "http://h:1/current");
        assert_eq!(join_url("http://h:1", ""), "http://h:1");
    }

    #[test]
    fn test_starts_on_fallback() {
        let directory = ServiceDirectory::from_config(&DispatchConfig::default());
        assert_eq!(directory.source(), EndpointSource::Fallback);
        assert_eq!(directory.resolve("weather").as_deref(), Some("http://localhost:8010"));
        assert_eq!(
            directory.url_for("sports", "/scores").as_deref(),
            Some("http://localhost:8019/scores")
        );
        assert!(directory.resolve("horoscope").is_none());
    }

    #[tokio::test]
    async fn test_registry_load_replaces_map() {
        let directory = ServiceDirectory::from_config(&DispatchConfig::default());
        let source = source_with(&[("weather", "http://weather:9000/"), ("news", "http://news")]);

        assert_eq!(directory.load_from(&source).await, EndpointSource::Registry);
        assert_eq!(directory.resolve("weather").as_deref(), Some("http://weather:9000"));
        assert_eq!(directory.services(), vec!["news".to_string(), "weather".to_string()]);
        assert!(!directory.contains("stocks"));
    }

    #[tokio::test]
    async fn test_failed_or_empty_load_keeps_fallback() {
        let directory = ServiceDirectory::from_config(&DispatchConfig::default());
        let fallback_len = directory.snapshot().len();

        let failing = StaticSource(Err(HearthError::Network("connection refused".into())));
        assert_eq!(directory.load_from(&failing).await, EndpointSource::Fallback);

        assert_eq!(directory.load_from(&source_with(&[])).await, EndpointSource::Fallback);

        let garbage = source_with(&[("weather", "not a url")]);
        assert_eq!(directory.load_from(&garbage).await, EndpointSource::Fallback);
        assert_eq!(directory.snapshot().len(), fallback_len);
    }

    #[test]
    fn test_override_url_marks_source() {
        let directory = ServiceDirectory::from_config(&DispatchConfig::default());
        let before = directory.snapshot();

        directory.override_url("weather", "http://10.0.0.5:8010/").unwrap();
        assert_eq!(directory.resolve("weather").as_deref(), Some("http://10.0.0.5:8010"));
        assert_eq!(directory.source(), EndpointSource::Override);

        // Earlier snapshots are unaffected by the swap.
        assert_eq!(before.get("weather"), Some("http://localhost:8010"));

        directory.override_url("horoscope", "https://stars.example").unwrap();
        assert!(directory.contains("horoscope"));

        assert!(directory.override_url("weather", "ftp://x").is_err());
        assert!(directory.override_url("", "http://x").is_err());
        assert!(directory.override_url("weather", "http://").is_err());
    }

    #[test]
    fn test_restore_fallback() {
        let directory = ServiceDirectory::from_config(&DispatchConfig::default());
        directory.override_url("weather", "http://elsewhere").unwrap();
        directory.restore_fallback();
        assert_eq!(directory.source(), EndpointSource::Fallback);
        assert_eq!(directory.resolve("weather").as_deref(), Some("http://localhost:8010"));
    }
}
