//! Dispatch context - lifecycle root for the dispatch layer
//!
//! Built once at startup and passed by reference to every consumer; there
//! are no process-wide singletons.

use std::sync::Arc;

use hearth_common::resilience::{SharedClock, SystemClock};
use hearth_domain::{DispatchConfig, EndpointSource, Result};
use tracing::info;

use crate::http::ResilientClient;

/// Holds the configuration and the shared [`ResilientClient`]
pub struct DispatchContext {
    pub config: DispatchConfig,
    pub client: Arc<ResilientClient>,
}

impl DispatchContext {
    /// Build pool, registries, directory and client; no network I/O
    pub fn new(config: DispatchConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock::shared())
    }

    pub fn with_clock(config: DispatchConfig, clock: SharedClock) -> Result<Self> {
        let client = Arc::new(ResilientClient::with_clock(&config, clock)?);
        Ok(Self { config, client })
    }

    /// Load the configuration (file, then env) and build the context
    pub fn from_env() -> Result<Self> {
        Self::new(crate::config::load()?)
    }

    /// One-shot registry load; a failure leaves the fallback map in place
    pub async fn start(&self) -> EndpointSource {
        let source = self.client.load_service_urls_from_registry().await;
        info!(
            %source,
            services = self.client.directory().services().len(),
            "Dispatch context started"
        );
        source
    }

    /// Stop admitting calls and log the final counters
    pub fn shutdown(&self) {
        self.client.close();
        let health = self.client.get_health_status();
        info!(
            open_circuits = ?health.open_circuits,
            total_rejected = health.total_rejected(),
            breakers = health.circuit_breakers.len(),
            limiters = health.rate_limiters.len(),
            "Dispatch context shut down"
        );
    }

    pub fn client(&self) -> Arc<ResilientClient> {
        Arc::clone(&self.client)
    }
}

impl std::fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchContext").field("client", &self.client).finish()
    }
}
