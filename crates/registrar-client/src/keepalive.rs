//! Registration that renews itself until stopped.

use std::time::Duration;

use registrar_catalog::Service;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::http::HttpClient;

/// Handle to a registration kept alive in the background.
///
/// Dropping the handle stops renewal without removing the registration; it
/// then lapses when its lease runs out. Call [`Keepalive::stop`] to remove it
/// straight away.
#[derive(Debug)]
pub struct Keepalive {
    client: HttpClient,
    registered: Service,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// Registers `service` with PUT and renews it every half lease.
///
/// The service must carry an ID. The first registration is made before
/// returning so that a rejected registration surfaces as an error. A service
/// without a lease never expires and is not renewed.
pub async fn register_and_keepalive(client: HttpClient, service: Service) -> Result<Keepalive> {
    let registered = client.put(&service).await?;
    info!(id = %registered.id, ttl = registered.ttl, "service registered");

    let cancel = CancellationToken::new();
    let task = renew_interval(service.ttl).map(|period| {
        tokio::spawn(renew(
            client.clone(),
            service,
            period,
            cancel.clone(),
        ))
    });

    Ok(Keepalive {
        client,
        registered,
        cancel,
        task,
    })
}

impl Keepalive {
    /// The registration as first stored by the registrar.
    pub const fn registered(&self) -> &Service {
        &self.registered
    }

    /// Stops renewal and removes the registration.
    ///
    /// A registration that has already gone is not an error.
    pub async fn stop(mut self) -> Result<()> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }

        match self.client.delete(&self.registered.id).await {
            Ok(()) => {
                info!(id = %self.registered.id, "service deregistered");
                Ok(())
            }
            Err(ClientError::NotFound(_)) => {
                debug!(id = %self.registered.id, "registration already removed");
                Ok(())
            }
            Err(e) => {
                warn!(id = %self.registered.id, error = %e, "error removing service registration");
                Err(e)
            }
        }
    }
}

impl Drop for Keepalive {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Half the lease, or `None` for a registration that never expires.
fn renew_interval(ttl: u32) -> Option<Duration> {
    (ttl > 0).then(|| Duration::from_millis(u64::from(ttl) * 500))
}

async fn renew(client: HttpClient, service: Service, period: Duration, cancel: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = cancel.cancelled() => break,
        }

        match client.put(&service).await {
            Ok(_) => debug!(id = %service.id, "updated service registration"),
            Err(e) => {
                warn!(id = %service.id, error = %e, "error updating service registration");
            }
        }
    }

    debug!(id = %service.id, "keepalive stopped");
}
