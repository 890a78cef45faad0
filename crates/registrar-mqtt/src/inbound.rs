//! Translation of broker messages into catalog operations.

use registrar_catalog::{CatalogError, Controller, Service, ServiceId};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::topic::{id_after, SERVICE_MARKER, WILL_MARKER};

/// Catalog operation requested by a broker message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Create or renew a registration.
    Register(Service),
    /// Remove a registration.
    Deregister(ServiceId),
}

/// Reason a broker message was ignored.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Rejected {
    #[error("invalid registration: id not provided")]
    MissingId,

    #[error("error parsing json: {0}")]
    Malformed(String),
}

/// Parses a message received on `topic`.
///
/// `will` is true when the topic matched a will subscription. A will topic
/// ending in `will/<id>` deregisters that ID without reading the payload.
/// Otherwise the payload is a service registration whose ID may be taken from
/// a `service/<id>` topic suffix.
pub fn parse(topic: &str, payload: &[u8], will: bool) -> Result<Inbound, Rejected> {
    if will {
        if let Some(id) = id_after(topic, WILL_MARKER) {
            return Ok(Inbound::Deregister(id.to_owned()));
        }
    }

    let mut service: Service =
        serde_json::from_slice(payload).map_err(|e| Rejected::Malformed(e.to_string()))?;

    if service.id.is_empty() {
        let id = id_after(topic, SERVICE_MARKER).ok_or(Rejected::MissingId)?;
        debug!(topic, id, "taking service id from topic");
        service.id = id.to_owned();
    }

    if will {
        Ok(Inbound::Deregister(service.id))
    } else {
        Ok(Inbound::Register(service))
    }
}

/// Applies an inbound operation to the catalog.
///
/// Registration renews an existing entry and creates it when absent. Errors
/// are logged and never retried.
pub async fn apply(controller: &Controller, inbound: Inbound) {
    match inbound {
        Inbound::Deregister(id) => match controller.delete(&id).await {
            Ok(()) => info!(id = %id, "removed service on will message"),
            Err(e) if e.is_not_found() => debug!(id = %id, "will for unknown service"),
            Err(e) => warn!(id = %id, error = %e, "error removing service"),
        },
        Inbound::Register(service) => {
            let id = service.id.clone();
            match controller.update(&id, service.clone()).await {
                Ok(_) => debug!(id = %id, "updated service"),
                Err(e) if e.is_not_found() => match controller.add(service).await {
                    Ok(_) => info!(id = %id, "created service"),
                    Err(e) => log_rejection(&id, "adding", &e),
                },
                Err(e) => log_rejection(&id, "updating", &e),
            }
        }
    }
}

fn log_rejection(id: &str, action: &str, error: &CatalogError) {
    match error {
        CatalogError::BadRequest(_) => {
            warn!(id = %id, error = %error, "invalid service registration");
        }
        _ => warn!(id = %id, error = %error, "error {action} service"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use registrar_catalog::{CatalogSettings, MemoryStorage};
    use std::sync::Arc;

    #[test]
    fn will_suffix_deregisters_without_payload() {
        let parsed = parse("sc/will/svc-1", b"", true).unwrap();
        assert_eq!(parsed, Inbound::Deregister("svc-1".to_owned()));
    }

    #[test]
    fn will_payload_deregisters_body_id() {
        let parsed = parse("sc/lastwill", br#"{"id": "svc-2"}"#, true).unwrap();
        assert_eq!(parsed, Inbound::Deregister("svc-2".to_owned()));
    }

    #[test]
    fn will_marker_ignored_on_registration_topics() {
        let parsed = parse("sc/will/svc-1", br#"{"id": "svc-1", "type": "_t._tcp"}"#, false);
        assert!(matches!(parsed, Ok(Inbound::Register(s)) if s.id == "svc-1"));
    }

    #[test]
    fn registration_id_from_body() {
        let parsed = parse(
            "sc/service/other",
            br#"{"id": "svc-1", "type": "_t._tcp", "ttl": 100}"#,
            false,
        )
        .unwrap();
        match parsed {
            Inbound::Register(service) => {
                assert_eq!(service.id, "svc-1");
                assert_eq!(service.ttl, 100);
            }
            Inbound::Deregister(_) => panic!("expected registration"),
        }
    }

    #[test]
    fn registration_id_from_topic() {
        let parsed = parse("sc/service/svc-3", br#"{"type": "_t._tcp"}"#, false).unwrap();
        assert!(matches!(parsed, Inbound::Register(s) if s.id == "svc-3"));
    }

    #[test]
    fn registration_without_id_rejected() {
        let err = parse("sc/registrations", br#"{"type": "_t._tcp"}"#, false).unwrap_err();
        assert_eq!(err, Rejected::MissingId);
    }

    #[test]
    fn malformed_payload_rejected() {
        let err = parse("sc/service/x", b"not json", false).unwrap_err();
        assert!(matches!(err, Rejected::Malformed(_)));
    }

    #[tokio::test]
    async fn register_creates_then_renews() {
        let controller = Controller::new(Arc::new(MemoryStorage::new()), CatalogSettings::default())
            .await
            .unwrap();
        let service = Service::new("_t._tcp").with_id("svc-1").with_ttl(10);

        apply(&controller, Inbound::Register(service.clone())).await;
        let created = controller.get("svc-1").await.unwrap();

        apply(&controller, Inbound::Register(service.with_ttl(100))).await;
        let renewed = controller.get("svc-1").await.unwrap();

        assert_eq!(created.ttl, 10);
        assert_eq!(renewed.ttl, 100);
        assert_eq!(renewed.created, created.created);
    }

    #[tokio::test]
    async fn deregister_unknown_is_harmless() {
        let controller = Controller::new(Arc::new(MemoryStorage::new()), CatalogSettings::default())
            .await
            .unwrap();

        apply(&controller, Inbound::Deregister("missing".to_owned())).await;
        assert_eq!(controller.total().await.unwrap(), 0);
    }
}
