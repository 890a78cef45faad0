//! Change notification for catalog listeners.
//!
//! Every listener gets its own bounded queue and a dispatcher task that
//! drains it. The controller only ever calls `try_send`, so a slow listener
//! delays its own events and nothing else. Events for one listener are
//! delivered in the order the controller produced them.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::service::Service;

/// Receives catalog change events.
///
/// Implementations must be safe to share between tasks.
#[async_trait]
pub trait Listener: Send + Sync {
    /// A service was registered.
    async fn added(&self, service: Service);

    /// A service registration was updated.
    async fn updated(&self, service: Service);

    /// A service was removed; carries the last stored record.
    async fn deleted(&self, service: Service);
}

/// Catalog change event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A service was registered.
    Added(Service),
    /// A service registration was updated.
    Updated(Service),
    /// A service was removed.
    Deleted(Service),
}

impl Event {
    /// Returns the service carried by the event.
    #[must_use]
    pub const fn service(&self) -> &Service {
        match self {
            Self::Added(s) | Self::Updated(s) | Self::Deleted(s) => s,
        }
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Updated(_) => "updated",
            Self::Deleted(_) => "deleted",
        }
    }
}

/// Handle identifying a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

struct Dispatcher {
    id: ListenerId,
    sender: mpsc::Sender<Event>,
    task: JoinHandle<()>,
}

/// Listener set with one queue per listener.
pub(crate) struct Notifier {
    capacity: usize,
    next_id: u64,
    dispatchers: Vec<Dispatcher>,
}

impl Notifier {
    pub(crate) const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_id: 0,
            dispatchers: Vec::new(),
        }
    }

    /// Registers a listener and spawns its dispatcher.
    pub(crate) fn add(&mut self, listener: Arc<dyn Listener>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;

        let (sender, receiver) = mpsc::channel(self.capacity.max(1));
        let task = tokio::spawn(dispatch(id, listener, receiver));
        self.dispatchers.push(Dispatcher { id, sender, task });

        debug!(listener = %id, "listener registered");
        id
    }

    /// Removes a listener. Queued events are still delivered.
    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let Some(position) = self.dispatchers.iter().position(|d| d.id == id) else {
            return false;
        };
        // Dropping the sender lets the dispatcher drain and exit
        self.dispatchers.remove(position);
        debug!(listener = %id, "listener removed");
        true
    }

    /// Queues an event for every listener without waiting.
    pub(crate) fn notify(&self, event: &Event) {
        for dispatcher in &self.dispatchers {
            match dispatcher.sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(
                        listener = %dispatcher.id,
                        event = event.kind(),
                        id = %event.service().id,
                        "listener queue full, dropping event"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    warn!(
                        listener = %dispatcher.id,
                        event = event.kind(),
                        "listener dispatcher stopped, dropping event"
                    );
                }
            }
        }
    }

    /// Removes every listener, returning their dispatcher tasks.
    pub(crate) fn shutdown(&mut self) -> Vec<JoinHandle<()>> {
        self.dispatchers.drain(..).map(|d| d.task).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.dispatchers.len()
    }
}

async fn dispatch(id: ListenerId, listener: Arc<dyn Listener>, mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match event {
            Event::Added(service) => listener.added(service).await,
            Event::Updated(service) => listener.updated(service).await,
            Event::Deleted(service) => listener.deleted(service).await,
        }
    }
    debug!(listener = %id, "dispatcher finished");
}
