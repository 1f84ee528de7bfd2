//! Port interface for service discovery

use std::collections::HashMap;

use async_trait::async_trait;
use hearth_domain::Result;

/// Remote source of the service name to base URL map
#[async_trait]
pub trait RegistrySource: Send + Sync {
    /// Fetch the full endpoint map in one bounded call
    async fn fetch_endpoints(&self) -> Result<HashMap<String, String>>;
}
