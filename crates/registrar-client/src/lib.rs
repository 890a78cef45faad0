//! Registrar client - talks to a registrar over its HTTP API.
//!
//! [`HttpClient`] covers the registration endpoints one request at a time.
//! [`register_and_keepalive`] keeps a registration alive for as long as the
//! returned [`Keepalive`] runs, renewing it at half its lease.
//!
//! # Example
//!
//! ```ignore
//! use registrar_catalog::Service;
//! use registrar_client::{register_and_keepalive, HttpClient};
//!
//! let client = HttpClient::new("http://localhost:8082")?;
//! let service = Service::new("_http._tcp").with_id("web-1").with_ttl(60);
//! let keepalive = register_and_keepalive(client, service).await?;
//! // ...
//! keepalive.stop().await?;
//! ```

pub mod error;
pub mod http;
pub mod keepalive;

pub use error::{ClientError, Result};
pub use http::{FilterArgs, HttpClient, Page};
pub use keepalive::{register_and_keepalive, Keepalive};
