//! HTTP client for the registrar API.

use std::time::Duration;

use registrar_catalog::Service;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use crate::error::{ClientError, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Attribute filter for [`HttpClient::list`], e.g. `type equals _mqtt._tcp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterArgs {
    pub path: String,
    pub op: String,
    pub value: String,
}

impl FilterArgs {
    pub fn new(path: impl Into<String>, op: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            op: op.into(),
            value: value.into(),
        }
    }
}

/// One page of the registrar's collection.
#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    /// Identifier of the catalog that served the page.
    pub id: String,
    pub description: String,
    pub services: Vec<Service>,
    pub page: usize,
    pub per_page: usize,
    /// Matching registrations across all pages.
    pub total: usize,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// HTTP client for a single registrar endpoint.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
}

impl HttpClient {
    /// Create a client for the registrar at `endpoint`.
    pub fn new(endpoint: &str) -> Result<Self> {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    /// Create a client with a per-request timeout.
    pub fn with_timeout(endpoint: &str, timeout: Duration) -> Result<Self> {
        let invalid = |reason: String| ClientError::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
            reason,
        };

        let base_url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(invalid("expected an http or https URL".to_owned()));
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    /// The registrar endpoint.
    pub const fn endpoint(&self) -> &Url {
        &self.base_url
    }

    /// Returns `Ok(())` if the registrar's health endpoint responds OK.
    pub async fn ping(&self) -> Result<()> {
        let response = self.client.get(self.url(&["health"])?).send().await?;
        expect_status(response, &[StatusCode::OK]).await?;
        Ok(())
    }

    /// Fetch a registration.
    pub async fn get(&self, id: &str) -> Result<Service> {
        let response = self.client.get(self.url(&[id])?).send().await?;
        let response = expect_status(response, &[StatusCode::OK]).await?;
        Ok(response.json().await?)
    }

    /// Register a service under a generated ID.
    pub async fn post(&self, service: &Service) -> Result<Service> {
        if !service.id.is_empty() {
            return Err(ClientError::invalid_request(
                "cannot POST a service with a pre-defined ID, use put",
            ));
        }

        let response = self
            .client
            .post(self.url(&[""])?)
            .json(service)
            .send()
            .await?;
        let response = expect_status(response, &[StatusCode::CREATED]).await?;
        Ok(response.json().await?)
    }

    /// Create or update the registration under the service's ID.
    pub async fn put(&self, service: &Service) -> Result<Service> {
        if service.id.is_empty() {
            return Err(ClientError::invalid_request(
                "cannot PUT a service without an ID",
            ));
        }

        let response = self
            .client
            .put(self.url(&[service.id.as_str()])?)
            .json(service)
            .send()
            .await?;
        let response = expect_status(response, &[StatusCode::OK, StatusCode::CREATED]).await?;
        Ok(response.json().await?)
    }

    /// Remove a registration.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let response = self.client.delete(self.url(&[id])?).send().await?;
        expect_status(response, &[StatusCode::OK]).await?;
        Ok(())
    }

    /// Fetch one page of the collection, optionally filtered.
    pub async fn list(
        &self,
        page: usize,
        per_page: usize,
        filter: Option<&FilterArgs>,
    ) -> Result<Page> {
        let mut url = match filter {
            None => self.url(&[""])?,
            Some(filter) => {
                let mut segments = vec![filter.path.as_str(), filter.op.as_str()];
                // The value may span several path levels
                segments.extend(filter.value.split('/'));
                self.url(&segments)?
            }
        };
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &per_page.to_string());

        let response = self.client.get(url).send().await?;
        let response = expect_status(response, &[StatusCode::OK]).await?;
        Ok(response.json().await?)
    }

    /// Appends percent-encoded path segments to the endpoint.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidEndpoint {
                endpoint: self.base_url.to_string(),
                reason: "cannot be a base".to_owned(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Passes the response through if its status is expected, otherwise
/// converts the error body into a [`ClientError`].
async fn expect_status(response: Response, expected: &[StatusCode]) -> Result<Response> {
    let status = response.status();
    if expected.contains(&status) {
        return Ok(response);
    }

    let body = response.bytes().await?;
    let message = match serde_json::from_slice::<ErrorBody>(&body) {
        Ok(error) => error.message,
        Err(e) => format!("error decoding: {e}"),
    };
    debug!(status = %status, message = %message, "registrar returned an error");
    Err(ClientError::from_status(status, message))
}
