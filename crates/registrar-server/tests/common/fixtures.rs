//! Test fixtures for server integration tests.

use serde_json::{json, Value};

/// Builder for JSON service registrations.
pub struct ServiceJson {
    body: Value,
}

impl ServiceJson {
    /// Creates a registration with the given ID and a default type.
    pub fn new(id: &str) -> Self {
        Self {
            body: json!({
                "id": id,
                "type": "_test._tcp",
                "apis": [],
                "meta": {},
                "ttl": 0,
            }),
        }
    }

    /// Creates a registration without an ID.
    pub fn anonymous() -> Self {
        let mut builder = Self::new("");
        builder.body.as_object_mut().unwrap().remove("id");
        builder
    }

    pub fn with_type(mut self, service_type: &str) -> Self {
        self.body["type"] = json!(service_type);
        self
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.body["ttl"] = json!(ttl);
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.body["description"] = json!(description);
        self
    }

    pub fn with_api(mut self, protocol: &str, url: &str) -> Self {
        self.body["apis"]
            .as_array_mut()
            .unwrap()
            .push(json!({ "protocol": protocol, "url": url }));
        self
    }

    pub fn with_meta(mut self, key: &str, value: Value) -> Self {
        self.body["meta"][key] = value;
        self
    }

    pub fn build(self) -> Value {
        self.body
    }
}
