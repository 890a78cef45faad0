//! Registrar catalog - service registrations, leases and change notification.
//!
//! The catalog is responsible for:
//!
//! - **Validation**: Rejecting malformed service registrations before they are stored
//! - **Leases**: Tracking registration expiry through a time-ordered index
//! - **Expiry**: Periodically removing registrations whose lease has lapsed
//! - **Notification**: Fanning out add/update/delete events to registered listeners
//!
//! # Architecture
//!
//! The [`Controller`] is the single writer of registry state. It owns the
//! [`Storage`] backend, the [`TimeIndex`] and the listener set, and serialises
//! every mutation behind one lock:
//!
//! - HTTP handlers and the MQTT bridge call into the controller
//! - The controller persists to storage and maintains the time index
//! - Listeners receive events through per-listener queues, off the lock
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use registrar_catalog::{CatalogSettings, Controller, MemoryStorage, Service};
//!
//! let controller = Controller::start(Arc::new(MemoryStorage::new()), CatalogSettings::default()).await?;
//! let stored = controller.add(Service::new("_http._tcp")).await?;
//! controller.stop().await?;
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod filter;
pub mod index;
pub mod notify;
pub mod paging;
pub mod reaper;
pub mod service;
pub mod storage;

// Re-export main types
pub use config::{CatalogSettings, StorageBackend, StorageConfig};
pub use controller::{Controller, MAX_PER_PAGE};
pub use error::{CatalogError, Result};
pub use filter::{Filter, FilterOp};
pub use index::TimeIndex;
pub use notify::{Event, Listener, ListenerId};
pub use service::{Api, ApiSpec, Service, ServiceId};
pub use storage::{MemoryStorage, Storage, ValkeyStorage};
