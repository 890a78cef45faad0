//! Service registration model and validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::error::{CatalogError, Result};

/// Unique service identifier.
pub type ServiceId = String;

/// A service entry in the catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Service {
    /// Unique identifier, generated when blank.
    pub id: ServiceId,
    /// Service type, e.g. `_mqtt._tcp`.
    #[serde(rename = "type")]
    pub service_type: String,
    /// Human-readable title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// APIs exposed by the service.
    pub apis: Vec<Api>,
    /// Opaque metadata.
    pub meta: Map<String, Value>,
    /// Lease in seconds. Zero means the registration never expires.
    pub ttl: u32,
    /// Time the registration was created.
    pub created: DateTime<Utc>,
    /// Time the registration was last updated.
    pub updated: DateTime<Utc>,
    /// Time the registration expires (only when `ttl` is set).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
}

/// An API exposed by a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Api {
    /// API identifier, unique within the service.
    pub id: String,
    /// Human-readable title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Protocol name, e.g. `HTTP` or `MQTT`.
    pub protocol: String,
    /// Endpoint URL.
    pub url: String,
    /// Reference to the API specification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<ApiSpec>,
    /// Opaque metadata.
    pub meta: Map<String, Value>,
}

/// Reference to an API specification document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSpec {
    /// Media type of the document, e.g. `application/openapi+json`.
    #[serde(rename = "mediaType")]
    pub media_type: String,
    /// Location of the document.
    pub url: String,
    /// Inline schema.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub schema: Map<String, Value>,
}

impl Service {
    /// Creates an empty registration of the given type.
    #[must_use]
    pub fn new(service_type: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
            ..Self::default()
        }
    }

    /// Sets the service ID.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the lease in seconds.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds an API.
    #[must_use]
    pub fn with_api(mut self, api: Api) -> Self {
        self.apis.push(api);
        self
    }

    /// Inserts a metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Validates a registration against the catalog rules.
    ///
    /// A blank ID is accepted because the controller assigns one.
    pub fn validate(&self, max_ttl: u32) -> Result<()> {
        if !self.id.is_empty() {
            validate_id(&self.id)?;
        }

        if self.service_type.is_empty() {
            return Err(CatalogError::bad_request("service type not defined"));
        }
        if self.service_type.chars().any(char::is_whitespace) {
            return Err(CatalogError::bad_request(
                "service type must not contain whitespace",
            ));
        }
        // The type is one level of the announcement topic
        if self.service_type.contains(['/', '+', '#']) {
            return Err(CatalogError::bad_request(
                "service type must not contain '/', '+' or '#'",
            ));
        }

        for api in &self.apis {
            api.validate()?;
        }

        if self.ttl > max_ttl {
            return Err(CatalogError::bad_request(format!(
                "ttl must be between 0 and {max_ttl} seconds"
            )));
        }

        Ok(())
    }

    /// Returns the time-index key when the service has a lease.
    #[must_use]
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        if self.ttl == 0 {
            None
        } else {
            self.expires
        }
    }

    /// Sets `updated` and recomputes `expires` from the TTL.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated = now;
        self.expires = if self.ttl == 0 {
            None
        } else {
            Some(now + chrono::Duration::seconds(i64::from(self.ttl)))
        };
    }
}

impl Api {
    /// Creates an API descriptor.
    #[must_use]
    pub fn new(protocol: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        Url::parse(&self.url).map_err(|e| {
            CatalogError::bad_request(format!("invalid API url {:?}: {e}", self.url))
        })?;

        if let Some(spec) = &self.spec {
            if spec.media_type.is_empty() {
                return Err(CatalogError::bad_request(format!(
                    "API spec media type not defined for {}",
                    self.url
                )));
            }
            Url::parse(&spec.url).map_err(|e| {
                CatalogError::bad_request(format!("invalid API spec url {:?}: {e}", spec.url))
            })?;
        }

        Ok(())
    }
}

/// Checks that an ID can be used as a single URL path segment.
fn validate_id(id: &str) -> Result<()> {
    if id.chars().any(char::is_whitespace) {
        return Err(CatalogError::bad_request("id must not contain whitespace"));
    }
    if id.chars().any(|c| c.is_control() || matches!(c, '/' | '?' | '#')) {
        return Err(CatalogError::bad_request(format!(
            "id must be a valid URL path segment: {id}"
        )));
    }
    if id.contains('+') {
        return Err(CatalogError::bad_request(format!(
            "id must not contain MQTT wildcards: {id}"
        )));
    }
    if id == "." || id == ".." {
        return Err(CatalogError::bad_request(format!("invalid service id: {id}")));
    }

    let parsed = Url::parse(&format!("http://localhost/{id}"))
        .map_err(|e| CatalogError::bad_request(format!("invalid service id: {e}")))?;
    let segments: Vec<&str> = parsed.path_segments().map(Iterator::collect).unwrap_or_default();
    if segments.len() != 1 || segments.first().is_some_and(|s| s.is_empty()) {
        return Err(CatalogError::bad_request(format!(
            "id must be a valid URL path segment: {id}"
        )));
    }

    Ok(())
}
