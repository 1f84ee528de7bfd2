//! Core data types for the dispatch layer
//!
//! The endpoint map the directory serves and the response envelope every
//! outbound call returns.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DispatchError;
use crate::impl_domain_status_conversions;

/// Outbound HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            _ => Err(format!("Unsupported HTTP method: {s}")),
        }
    }
}

/// Where the current endpoint map came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointSource {
    /// Loaded from the registry endpoint
    Registry,
    /// Compiled-in table (plus configured extras)
    Fallback,
    /// At least one entry was replaced at runtime
    Override,
}

impl_domain_status_conversions!(EndpointSource {
    Registry => "registry",
    Fallback => "fallback",
    Override => "override",
});

/// Service name to base URL mapping
///
/// Base URLs are stored without a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpointMap {
    endpoints: HashMap<String, String>,
    source: EndpointSource,
}

impl ServiceEndpointMap {
    pub fn new(source: EndpointSource) -> Self {
        Self { endpoints: HashMap::new(), source }
    }

    /// Build from name/url pairs; later pairs win on duplicate names
    pub fn from_pairs<I, K, V>(pairs: I, source: EndpointSource) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut map = Self::new(source);
        for (name, url) in pairs {
            map.insert(name, url.as_ref());
        }
        map
    }

    /// Insert or replace one entry, returning the previous URL
    pub fn insert(&mut self, service: impl Into<String>, base_url: &str) -> Option<String> {
        self.endpoints.insert(service.into(), normalize_base_url(base_url))
    }

    pub fn get(&self, service: &str) -> Option<&str> {
        self.endpoints.get(service).map(String::as_str)
    }

    pub fn contains(&self, service: &str) -> bool {
        self.endpoints.contains_key(service)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn source(&self) -> EndpointSource {
        self.source
    }

    pub fn set_source(&mut self, source: EndpointSource) {
        self.source = source;
    }

    /// Service names, sorted
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.endpoints.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.endpoints.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Result envelope for one outbound call
///
/// Never an error value: failures set `success: false` and carry the
/// classified cause in `error_kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResilientResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<DispatchError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub service_name: String,
}

impl ResilientResponse {
    pub fn ok(service: impl Into<String>, status_code: u16, data: Option<Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
            error_kind: None,
            status_code: Some(status_code),
            service_name: service.into(),
        }
    }

    /// Failed call; `error` is the kind's display message
    pub fn failure(service: impl Into<String>, kind: DispatchError) -> Self {
        let status_code = match &kind {
            DispatchError::BadStatus { code } => Some(*code),
            _ => None,
        };
        Self {
            success: false,
            data: None,
            error: Some(kind.to_string()),
            error_kind: Some(kind),
            status_code,
            service_name: service.into(),
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_data(mut self, data: Option<Value>) -> Self {
        self.data = data;
        self
    }

    pub fn kind(&self) -> Option<&DispatchError> {
        self.error_kind.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_http_method_parsing() {
        assert_eq!("get".parse::<HttpMethod>(), Ok(HttpMethod::Get));
        assert_eq!(" POST ".parse::<HttpMethod>(), Ok(HttpMethod::Post));
        assert!("DELETE".parse::<HttpMethod>().is_err());
        assert_eq!(HttpMethod::Post.to_string(), "POST");
    }

    #[test]
    fn test_endpoint_map_strips_trailing_slash() {
        let mut map = ServiceEndpointMap::from_pairs(
            [("weather", "http://localhost:8010/"), ("news", " http://news:80// ")],
            EndpointSource::Registry,
        );
        assert_eq!(map.get("weather"), Some("http://localhost:8010"));
        assert_eq!(map.get("news"), Some("http://news:80"));

        let previous = map.insert("weather", "http://weather.lan");
        assert_eq!(previous.as_deref(), Some("http://localhost:8010"));
        assert_eq!(map.services(), vec!["news".to_string(), "weather".to_string()]);
    }

    #[test]
    fn test_endpoint_source_conversions() {
        assert_eq!(EndpointSource::Fallback.to_string(), "fallback");
        assert_eq!("Registry".parse::<EndpointSource>(), Ok(EndpointSource::Registry));
        assert_eq!(serde_json::to_value(EndpointSource::Override).unwrap(), json!("override"));
    }

    #[test]
    fn test_success_response_shape() {
        let response =
            ResilientResponse::ok("weather", 200, Some(json!({ "current": { "temperature": 72 } })));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({
                "success": true,
                "data": { "current": { "temperature": 72 } },
                "statusCode": 200,
                "serviceName": "weather"
            })
        );
    }

    #[test]
    fn test_failure_response_carries_kind() {
        let response = ResilientResponse::failure("stocks", DispatchError::BadStatus { code: 404 });
        assert!(!response.success);
        assert_eq!(response.status_code, Some(404));
        assert_eq!(response.error.as_deref(), Some("bad status: HTTP 404"));

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["errorKind"], json!({ "kind": "bad_status", "code": 404 }));

        let denied = ResilientResponse::failure("news", DispatchError::CircuitOpen);
        assert_eq!(denied.error.as_deref(), Some("circuit open"));
        assert!(denied.status_code.is_none());
        assert_eq!(denied.kind(), Some(&DispatchError::CircuitOpen));
    }
}
