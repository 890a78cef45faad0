//! Catalog controller: the single writer of registry state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::CatalogSettings;
use crate::error::{CatalogError, Result};
use crate::filter::Filter;
use crate::index::TimeIndex;
use crate::notify::{Event, Listener, ListenerId, Notifier};
use crate::paging::page_bounds;
use crate::reaper;
use crate::service::Service;
use crate::storage::Storage;

/// Maximum page size for list and filter queries.
pub const MAX_PER_PAGE: usize = 100;

/// State guarded by the controller lock.
struct ControllerState {
    index: TimeIndex,
    notifier: Notifier,
}

/// Owns validation, ID assignment, lease bookkeeping and listener fan-out.
///
/// Mutations (`add`, `update`, `delete`, listener changes and expiry sweeps)
/// take the lock exclusively; reads take it shared. Listener callbacks never
/// run under the lock.
pub struct Controller {
    storage: Arc<dyn Storage>,
    settings: CatalogSettings,
    state: RwLock<ControllerState>,
    cancel: CancellationToken,
    reaper: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Controller {
    /// Creates a controller and rebuilds the expiry index from storage.
    ///
    /// The expiry sweep is not started; see [`Controller::start`].
    pub async fn new(storage: Arc<dyn Storage>, settings: CatalogSettings) -> Result<Arc<Self>> {
        let mut index = TimeIndex::new();
        for service in storage.iterate().await? {
            if let Some(expires) = service.expiry() {
                index.insert(expires, service.id);
            }
        }
        info!(indexed = index.len(), "expiry index initialised");

        let notifier = Notifier::new(settings.notification_queue);
        Ok(Arc::new(Self {
            storage,
            settings,
            state: RwLock::new(ControllerState { index, notifier }),
            cancel: CancellationToken::new(),
            reaper: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }))
    }

    /// Creates a controller and starts the periodic expiry sweep.
    pub async fn start(storage: Arc<dyn Storage>, settings: CatalogSettings) -> Result<Arc<Self>> {
        let controller = Self::new(storage, settings).await?;
        let handle = reaper::spawn(
            Arc::downgrade(&controller),
            controller.settings.reaper_interval,
            controller.cancel.clone(),
        );
        *controller.reaper.lock().await = Some(handle);
        info!(
            interval_secs = controller.settings.reaper_interval.as_secs(),
            "expiry reaper started"
        );
        Ok(controller)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("controller stopped".to_owned()));
        }
        Ok(())
    }

    /// Returns the catalog settings.
    pub const fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    /// Registers a new service.
    ///
    /// Assigns a UUID when the ID is blank. Fails with
    /// [`CatalogError::Conflict`] if the ID is already registered.
    pub async fn add(&self, mut service: Service) -> Result<Service> {
        self.ensure_running()?;
        service.validate(self.settings.max_ttl)?;

        let state = &mut *self.state.write().await;

        if service.id.is_empty() {
            service.id = Uuid::new_v4().to_string();
        }
        let now = Utc::now();
        service.created = now;
        service.touch(now);

        self.storage.add(&service).await?;

        if let Some(expires) = service.expiry() {
            state.index.insert(expires, service.id.clone());
        }
        state.notifier.notify(&Event::Added(service.clone()));

        info!(id = %service.id, ttl = service.ttl, "service added");
        Ok(service)
    }

    /// Gets a service by ID.
    pub async fn get(&self, id: &str) -> Result<Service> {
        let _state = self.state.read().await;
        self.storage.get(id).await
    }

    /// Replaces the mutable fields of a registration and renews its lease.
    pub async fn update(&self, id: &str, service: Service) -> Result<Service> {
        self.ensure_running()?;
        service.validate(self.settings.max_ttl)?;
        if !service.id.is_empty() && service.id != id {
            return Err(CatalogError::bad_request(format!(
                "service id {} does not match {id}",
                service.id
            )));
        }

        let state = &mut *self.state.write().await;

        let previous = self.storage.get(id).await?;
        let mut updated = previous.clone();
        updated.service_type = service.service_type;
        updated.title = service.title;
        updated.description = service.description;
        updated.apis = service.apis;
        updated.meta = service.meta;
        updated.ttl = service.ttl;
        updated.touch(Utc::now());

        self.storage.update(id, &updated).await?;

        if let Some(expires) = previous.expiry() {
            state.index.remove_exact(expires, id);
        }
        if let Some(expires) = updated.expiry() {
            state.index.insert(expires, id);
        }
        state.notifier.notify(&Event::Updated(updated.clone()));

        debug!(id = %id, ttl = updated.ttl, "service updated");
        Ok(updated)
    }

    /// Removes a registration.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.ensure_running()?;
        let state = &mut *self.state.write().await;

        let previous = self.storage.get(id).await?;
        self.storage.delete(id).await?;

        if let Some(expires) = previous.expiry() {
            state.index.remove_exact(expires, id);
        }
        state.notifier.notify(&Event::Deleted(previous));

        info!(id = %id, "service deleted");
        Ok(())
    }

    /// Returns one page of registrations and the total count.
    ///
    /// `per_page` is clamped to [`MAX_PER_PAGE`].
    pub async fn list(&self, page: usize, per_page: usize) -> Result<(Vec<Service>, usize)> {
        if page < 1 || per_page < 1 {
            return Err(CatalogError::bad_request(
                "page and per_page must be positive",
            ));
        }
        let _state = self.state.read().await;
        self.storage.list(page, per_page.min(MAX_PER_PAGE)).await
    }

    /// Returns one page of the registrations matching an attribute filter.
    ///
    /// Every stored registration is scanned; pagination applies to the
    /// matched set. The returned count is the number of matches.
    pub async fn filter(
        &self,
        path: &str,
        op: &str,
        value: &str,
        page: usize,
        per_page: usize,
    ) -> Result<(Vec<Service>, usize)> {
        let filter = Filter::new(path, op, value)?;
        let _state = self.state.read().await;

        let mut matches = Vec::new();
        for p in 1.. {
            let (services, total) = self.storage.list(p, MAX_PER_PAGE).await?;
            for service in services {
                if filter.matches(&service)? {
                    matches.push(service);
                }
            }
            if p.saturating_mul(MAX_PER_PAGE) >= total {
                break;
            }
        }

        let total = matches.len();
        let (offset, limit) = page_bounds(total, page, per_page.min(MAX_PER_PAGE), MAX_PER_PAGE)
            .map_err(|e| CatalogError::bad_request(format!("unable to paginate: {e}")))?;
        let page_items = matches.into_iter().skip(offset).take(limit).collect();
        Ok((page_items, total))
    }

    /// Returns the number of registrations.
    pub async fn total(&self) -> Result<usize> {
        self.storage.total().await
    }

    /// Registers a listener for change events.
    pub async fn add_listener(&self, listener: Arc<dyn Listener>) -> ListenerId {
        self.state.write().await.notifier.add(listener)
    }

    /// Removes a listener. Returns false if it was not registered.
    pub async fn remove_listener(&self, id: ListenerId) -> bool {
        self.state.write().await.notifier.remove(id)
    }

    /// Returns the number of registered listeners.
    pub async fn listener_count(&self) -> usize {
        self.state.read().await.notifier.len()
    }

    /// Returns the number of leases in the expiry index.
    pub async fn index_len(&self) -> usize {
        self.state.read().await.index.len()
    }

    /// Removes every registration whose lease lapsed at or before `now`.
    ///
    /// A failure on one registration is logged and the sweep continues.
    /// Returns the number of registrations removed.
    pub async fn reap_expired(&self, now: DateTime<Utc>) -> usize {
        let state = &mut *self.state.write().await;
        let mut removed = 0;

        for (expires, id) in state.index.expired(now) {
            info!(id = %id, expires = %expires, "registration has expired");

            let previous = match self.storage.get(&id).await {
                Ok(service) => service,
                Err(e) if e.is_not_found() => {
                    warn!(id = %id, "expired registration missing from storage");
                    state.index.remove_exact(expires, &id);
                    continue;
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "error retrieving expired registration");
                    continue;
                }
            };

            if let Err(e) = self.storage.delete(&id).await {
                warn!(id = %id, error = %e, "error removing expired registration");
                continue;
            }

            state.index.remove_exact(expires, &id);
            state.notifier.notify(&Event::Deleted(previous));
            removed += 1;
        }

        removed
    }

    /// Stops the expiry sweep and listener dispatch, then closes storage.
    ///
    /// Later mutations fail with [`CatalogError::Unavailable`]. Calling
    /// `stop` again has no effect.
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.cancel.cancel();
        if let Some(handle) = self.reaper.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "expiry reaper terminated abnormally");
            }
        }

        // Dispatchers drain their queues and exit once their senders are gone
        let dispatchers = self.state.write().await.notifier.shutdown();
        debug!(count = dispatchers.len(), "listener dispatchers released");

        self.storage.close().await?;
        info!("controller stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("settings", &self.settings)
            .field("stopped", &self.stopped.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use chrono::Duration;

    async fn make_controller() -> Arc<Controller> {
        Controller::new(Arc::new(MemoryStorage::new()), CatalogSettings::default())
            .await
            .unwrap()
    }

    fn make_service(id: &str, ttl: u32) -> Service {
        Service::new("_test._tcp").with_id(id).with_ttl(ttl)
    }

    #[tokio::test]
    async fn add_assigns_timestamps_and_expiry() {
        let controller = make_controller().await;

        let stored = controller.add(make_service("a", 30)).await.unwrap();

        assert_eq!(stored.created, stored.updated);
        assert_eq!(stored.expires, Some(stored.updated + Duration::seconds(30)));
        assert_eq!(controller.index_len().await, 1);
    }

    #[tokio::test]
    async fn add_generates_uuid_ids() {
        let controller = make_controller().await;

        let stored = controller.add(Service::new("_test._tcp")).await.unwrap();

        assert!(Uuid::parse_str(&stored.id).is_ok());
        assert_eq!(controller.index_len().await, 0);
    }

    #[tokio::test]
    async fn permanent_services_are_not_indexed() {
        let controller = make_controller().await;
        let stored = controller.add(make_service("a", 0)).await.unwrap();

        assert!(stored.expires.is_none());
        assert_eq!(controller.index_len().await, 0);
    }

    #[tokio::test]
    async fn update_keeps_created_and_reindexes() {
        let controller = make_controller().await;
        let original = controller.add(make_service("a", 5)).await.unwrap();

        let updated = controller
            .update("a", make_service("", 50).with_description("renewed"))
            .await
            .unwrap();

        assert_eq!(updated.id, "a");
        assert_eq!(updated.created, original.created);
        assert_eq!(updated.description, "renewed");
        assert_eq!(updated.expires, Some(updated.updated + Duration::seconds(50)));
        assert_eq!(controller.index_len().await, 1);

        // The old deadline no longer reaps the service
        let removed = controller
            .reap_expired(original.expires.unwrap() + Duration::seconds(1))
            .await;
        assert_eq!(removed, 0);
        assert!(controller.get("a").await.is_ok());
    }

    #[tokio::test]
    async fn update_to_permanent_drops_index_entry() {
        let controller = make_controller().await;
        controller.add(make_service("a", 5)).await.unwrap();

        controller.update("a", make_service("a", 0)).await.unwrap();

        assert_eq!(controller.index_len().await, 0);
    }

    #[tokio::test]
    async fn mutations_after_stop_are_rejected() {
        let controller = make_controller().await;
        controller.add(make_service("a", 5)).await.unwrap();
        controller.stop().await.unwrap();

        let unavailable = |err: CatalogError| matches!(err, CatalogError::Unavailable(_));
        assert!(unavailable(controller.add(make_service("b", 5)).await.unwrap_err()));
        assert!(unavailable(
            controller.update("a", make_service("a", 50)).await.unwrap_err()
        ));
        assert!(unavailable(controller.delete("a").await.unwrap_err()));
        assert_eq!(controller.index_len().await, 1);
    }

    #[tokio::test]
    async fn update_with_mismatched_id_is_rejected() {
        let controller = make_controller().await;
        controller.add(make_service("a", 5)).await.unwrap();

        let err = controller.update("a", make_service("b", 5)).await.unwrap_err();
        assert!(err.is_bad_request());
    }

    #[tokio::test]
    async fn update_unknown_is_not_found() {
        let controller = make_controller().await;
        let err = controller.update("missing", make_service("", 5)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn invalid_service_is_rejected_before_storage() {
        let controller = make_controller().await;
        let err = controller
            .add(make_service("bad id", 5))
            .await
            .unwrap_err();

        assert!(err.is_bad_request());
        assert_eq!(controller.total().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reap_removes_only_lapsed_entries() {
        let controller = make_controller().await;
        let short = controller.add(make_service("short", 1)).await.unwrap();
        controller.add(make_service("long", 100)).await.unwrap();

        let removed = controller
            .reap_expired(short.expires.unwrap() + Duration::milliseconds(1))
            .await;

        assert_eq!(removed, 1);
        assert!(controller.get("short").await.unwrap_err().is_not_found());
        assert!(controller.get("long").await.is_ok());
        assert_eq!(controller.index_len().await, 1);
    }

    #[tokio::test]
    async fn index_rebuilt_from_existing_storage() {
        let storage = Arc::new(MemoryStorage::new());
        let mut service = make_service("persisted", 60);
        service.touch(Utc::now());
        storage.add(&service).await.unwrap();
        storage.add(&make_service("forever", 0)).await.unwrap();

        let controller = Controller::new(storage, CatalogSettings::default())
            .await
            .unwrap();

        assert_eq!(controller.index_len().await, 1);
    }

    #[tokio::test]
    async fn list_rejects_zero_page() {
        let controller = make_controller().await;
        assert!(controller.list(0, 10).await.unwrap_err().is_bad_request());
    }

    #[tokio::test]
    async fn stop_twice_is_harmless() {
        let controller = Controller::start(Arc::new(MemoryStorage::new()), CatalogSettings::default())
            .await
            .unwrap();

        controller.stop().await.unwrap();
        controller.stop().await.unwrap();
    }
}
