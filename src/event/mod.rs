//! Notification bus for connection state changes.
//!
//! Observers subscribe to a [`Topic`] with a callback. The bus keeps the
//! current value of every topic, replays it to new subscribers on the next
//! scheduler tick, and debounces publishes per topic so a burst of internal
//! state changes reaches subscribers as one notification carrying the latest
//! value.
//!
//! Publishing and subscribing spawn tasks and must happen inside a Tokio
//! runtime.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::types::{ConnectionState, Device, DeviceInfo};

/// Default coalescing window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

/// Notification topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Bonded device list.
    Devices,
    /// Connected device.
    Connection,
    /// Connection state.
    Status,
    /// Connected device snapshot.
    DeviceInfo,
    /// Device refresh in progress.
    Scanning,
}

impl Topic {
    /// Every topic.
    pub const ALL: [Self; 5] = [
        Self::Devices,
        Self::Connection,
        Self::Status,
        Self::DeviceInfo,
        Self::Scanning,
    ];
}

/// A topic value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Bonded devices, in platform order.
    Devices(Vec<Device>),
    /// Connected device, `None` after disconnect or loss.
    Connection(Option<Device>),
    /// Connection state.
    Status(ConnectionState),
    /// Connected device snapshot.
    DeviceInfo(Option<DeviceInfo>),
    /// Whether a device refresh is running.
    Scanning(bool),
}

impl Notification {
    /// Returns the topic this value belongs to.
    #[must_use]
    pub const fn topic(&self) -> Topic {
        match self {
            Self::Devices(_) => Topic::Devices,
            Self::Connection(_) => Topic::Connection,
            Self::Status(_) => Topic::Status,
            Self::DeviceInfo(_) => Topic::DeviceInfo,
            Self::Scanning(_) => Topic::Scanning,
        }
    }

    /// Value of a topic before anything was published.
    #[must_use]
    pub const fn initial(topic: Topic) -> Self {
        match topic {
            Topic::Devices => Self::Devices(Vec::new()),
            Topic::Connection => Self::Connection(None),
            Topic::Status => Self::Status(ConnectionState::Disconnected),
            Topic::DeviceInfo => Self::DeviceInfo(None),
            Topic::Scanning => Self::Scanning(false),
        }
    }
}

type Listener = Arc<dyn Fn(Notification) + Send + Sync>;

#[derive(Default)]
struct Registry {
    listeners: HashMap<Topic, Vec<(u64, Listener)>>,
    current: HashMap<Topic, Notification>,
    generation: HashMap<Topic, u64>,
    pending: HashMap<Topic, JoinHandle<()>>,
}

impl Registry {
    fn current(&self, topic: Topic) -> Notification {
        self.current
            .get(&topic)
            .cloned()
            .unwrap_or_else(|| Notification::initial(topic))
    }

    fn listener(&self, topic: Topic, id: u64) -> Option<Listener> {
        self.listeners
            .get(&topic)?
            .iter()
            .find(|(listener_id, _)| *listener_id == id)
            .map(|(_, listener)| Arc::clone(listener))
    }

    fn listeners(&self, topic: Topic) -> Vec<Listener> {
        self.listeners
            .get(&topic)
            .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default()
    }
}

struct BusInner {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
    debounce: Duration,
}

impl BusInner {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for BusInner {
    fn drop(&mut self) {
        let registry = self
            .registry
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for (_, task) in registry.pending.drain() {
            task.abort();
        }
    }
}

fn deliver(topic: Topic, listener: &Listener, value: Notification) {
    if catch_unwind(AssertUnwindSafe(|| listener(value))).is_err() {
        tracing::error!("listener for {topic:?} panicked");
    }
}

/// Topic-based publish/subscribe hub.
#[derive(Clone)]
pub struct NotificationBus {
    inner: Arc<BusInner>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl NotificationBus {
    /// Creates a bus with the given coalescing window.
    #[must_use]
    pub fn new(debounce: Duration) -> Self {
        Self {
            inner: Arc::new(BusInner {
                registry: Mutex::new(Registry::default()),
                next_id: AtomicU64::new(1),
                debounce,
            }),
        }
    }

    /// Registers `listener` for `topic`.
    ///
    /// The current value is delivered on a spawned task, so it arrives after
    /// this call returns. The listener stays registered until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe<F>(&self, topic: Topic, listener: F) -> Subscription
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let listener: Listener = Arc::new(listener);
        self.inner
            .lock()
            .listeners
            .entry(topic)
            .or_default()
            .push((id, listener));

        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let replay = {
                let registry = inner.lock();
                registry
                    .listener(topic, id)
                    .map(|listener| (listener, registry.current(topic)))
            };
            if let Some((listener, value)) = replay {
                deliver(topic, &listener, value);
            }
        });

        Subscription {
            bus: Arc::downgrade(&self.inner),
            topic,
            id,
        }
    }

    /// Publishes a new value.
    ///
    /// The value becomes current immediately. Delivery happens once the
    /// topic has been quiet for the debounce window; only the latest value is
    /// delivered.
    pub fn publish(&self, value: Notification) {
        let topic = value.topic();
        let mut registry = self.inner.lock();

        registry.current.insert(topic, value);
        let generation = registry.generation.entry(topic).or_insert(0);
        *generation += 1;
        let generation = *generation;

        if let Some(previous) = registry.pending.remove(&topic) {
            previous.abort();
        }

        let weak = Arc::downgrade(&self.inner);
        let delay = self.inner.debounce;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let (value, listeners) = {
                let mut registry = inner.lock();
                if registry.generation.get(&topic) != Some(&generation) {
                    return;
                }
                registry.pending.remove(&topic);
                (registry.current(topic), registry.listeners(topic))
            };

            tracing::trace!("delivering {topic:?} to {} listeners", listeners.len());
            for listener in &listeners {
                deliver(topic, listener, value.clone());
            }
        });
        registry.pending.insert(topic, task);
    }

    /// Returns the current value of a topic.
    #[must_use]
    pub fn current(&self, topic: Topic) -> Notification {
        self.inner.lock().current(topic)
    }

    /// Returns the number of listeners registered for a topic.
    #[must_use]
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner.lock().listeners.get(&topic).map_or(0, Vec::len)
    }
}

/// Registration handle; dropping it unsubscribes.
pub struct Subscription {
    bus: Weak<BusInner>,
    topic: Topic,
    id: u64,
}

impl Subscription {
    /// Topic of this subscription.
    #[must_use]
    pub const fn topic(&self) -> Topic {
        self.topic
    }

    /// Unsubscribes now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            let mut registry = inner.lock();
            if let Some(list) = registry.listeners.get_mut(&self.topic) {
                list.retain(|(id, _)| *id != self.id);
            }
        }
    }
}
