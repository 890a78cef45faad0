//! MQTT topic helpers.

use registrar_catalog::Service;

/// Marker preceding the service ID in registration topics.
pub const SERVICE_MARKER: &str = "service/";

/// Marker preceding the service ID in will topics.
pub const WILL_MARKER: &str = "will/";

/// Returns true if `topic` matches the subscription `filter`.
///
/// `+` matches exactly one level, which may be empty. `#` matches the rest of
/// the topic including the parent level. Wildcards at the first level never
/// match topics starting with `$`.
pub fn matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(expected), Some(level)) if expected == level => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Returns the non-empty ID following a single occurrence of `marker`.
///
/// `sc/service/abc` with marker `service/` yields `abc`.
pub fn id_after<'a>(topic: &'a str, marker: &str) -> Option<&'a str> {
    let mut parts = topic.split(marker);
    parts.next()?;
    let id = parts.next()?;
    if id.is_empty() || parts.next().is_some() {
        return None;
    }
    Some(id)
}

/// Retained topic announcing a live registration.
pub fn alive_topic(prefix: &str, service: &Service) -> String {
    format!("{prefix}/{}/{}/alive", service.service_type, service.id)
}

/// Topic announcing a removed registration.
pub fn dead_topic(prefix: &str, service: &Service) -> String {
    format!("{prefix}/{}/{}/dead", service.service_type, service.id)
}

/// Returns true for the bridge's own outbound announcement topics.
pub fn is_announcement(prefix: &str, topic: &str) -> bool {
    topic
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/'))
        && (topic.ends_with("/alive") || topic.ends_with("/dead"))
}
