//! Test fixtures for catalog integration tests.

use std::time::Duration;

use async_trait::async_trait;
use registrar_catalog::{Api, Event, Listener, Service};
use serde_json::Value;
use tokio::sync::Mutex;

/// Builder for creating test Service instances.
pub struct ServiceBuilder {
    service: Service,
}

impl ServiceBuilder {
    /// Creates a builder for a service with the given ID.
    pub fn new(id: &str) -> Self {
        Self {
            service: Service::new("_test._tcp").with_id(id),
        }
    }

    /// Creates a builder with a blank ID.
    pub fn anonymous() -> Self {
        Self::new("")
    }

    /// Sets the service type.
    pub fn with_type(mut self, service_type: &str) -> Self {
        self.service.service_type = service_type.to_string();
        self
    }

    /// Sets the lease in seconds.
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.service.ttl = ttl;
        self
    }

    /// Sets the title.
    pub fn with_title(mut self, title: &str) -> Self {
        self.service.title = title.to_string();
        self
    }

    /// Adds an API endpoint.
    pub fn with_api(mut self, protocol: &str, url: &str) -> Self {
        self.service.apis.push(Api::new(protocol, url));
        self
    }

    /// Adds a metadata entry.
    pub fn with_meta(mut self, key: &str, value: Value) -> Self {
        self.service.meta.insert(key.to_string(), value);
        self
    }

    /// Builds the service.
    pub fn build(self) -> Service {
        self.service
    }
}

/// Listener that records every event it receives.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Event>>,
}

impl RecordingListener {
    /// Returns a snapshot of the recorded events.
    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    /// Waits until at least `count` events arrived or two seconds passed.
    pub async fn wait_for(&self, count: usize) -> Vec<Event> {
        for _ in 0..200 {
            let events = self.events().await;
            if events.len() >= count {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.events().await
    }
}

#[async_trait]
impl Listener for RecordingListener {
    async fn added(&self, service: Service) {
        self.events.lock().await.push(Event::Added(service));
    }

    async fn updated(&self, service: Service) {
        self.events.lock().await.push(Event::Updated(service));
    }

    async fn deleted(&self, service: Service) {
        self.events.lock().await.push(Event::Deleted(service));
    }
}
