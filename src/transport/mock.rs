//! In-memory transport backend.
//!
//! A [`MockAdapter`] holds a set of [`MockPeer`]s. Each peer is a shared
//! handle, so a test can keep one and script the link (refuse or hang on
//! connect, fail writes, queue status responses, drop the link) while the
//! manager drives a [`MockTransport`] opened on it. Every connect and
//! disconnect is recorded in the adapter's journal in call order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;

use crate::error::{Error, Result};
use crate::transport::{Adapter, Transport};
use crate::types::Device;

/// How a peer answers a connect attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// Connects.
    #[default]
    Succeed,
    /// Returns `Ok(false)`.
    Refuse,
    /// Returns an error.
    Fail,
    /// Never completes.
    Hang,
}

/// A recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// `connect` on the peer with this address.
    Connect(String),
    /// `disconnect` on the peer with this address.
    Disconnect(String),
}

#[derive(Default)]
struct PeerState {
    connected: bool,
    connect_behavior: ConnectBehavior,
    fail_writes: bool,
    fail_disconnect: bool,
    responses: VecDeque<Bytes>,
    writes: Vec<Bytes>,
}

/// Shared handle to a simulated printer.
#[derive(Clone)]
pub struct MockPeer {
    device: Device,
    state: Arc<Mutex<PeerState>>,
    journal: Arc<Mutex<Vec<MockCall>>>,
}

impl MockPeer {
    fn lock(&self) -> MutexGuard<'_, PeerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn log(&self, call: MockCall) {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    /// The simulated device.
    #[must_use]
    pub const fn device(&self) -> &Device {
        &self.device
    }

    /// Sets how the next connect attempts behave.
    pub fn set_connect_behavior(&self, behavior: ConnectBehavior) {
        self.lock().connect_behavior = behavior;
    }

    /// Makes every write fail while set.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Makes disconnect return an error (the link still closes).
    pub fn set_fail_disconnect(&self, fail: bool) {
        self.lock().fail_disconnect = fail;
    }

    /// Forces the link state, e.g. to simulate a stale session or a drop.
    pub fn set_connected(&self, connected: bool) {
        self.lock().connected = connected;
    }

    /// Returns true if the simulated link is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Queues bytes for the next read.
    pub fn push_response(&self, response: impl Into<Bytes>) {
        self.lock().responses.push_back(response.into());
    }

    /// Returns every frame written so far.
    #[must_use]
    pub fn writes(&self) -> Vec<Bytes> {
        self.lock().writes.clone()
    }

    /// Forgets recorded writes.
    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }
}

/// Transport opened on a [`MockPeer`].
pub struct MockTransport {
    peer: MockPeer,
}

impl MockTransport {
    /// Opens a transport on `peer`.
    #[must_use]
    pub const fn new(peer: MockPeer) -> Self {
        Self { peer }
    }
}

impl Transport for MockTransport {
    fn connect(&mut self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            self.peer
                .log(MockCall::Connect(self.peer.device.address.clone()));
            let behavior = self.peer.lock().connect_behavior;
            match behavior {
                ConnectBehavior::Succeed => {
                    self.peer.set_connected(true);
                    Ok(true)
                }
                ConnectBehavior::Refuse => Ok(false),
                ConnectBehavior::Fail => Err(Error::communication("peer rejected connection")),
                ConnectBehavior::Hang => futures::future::pending().await,
            }
        })
    }

    fn disconnect(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.peer
                .log(MockCall::Disconnect(self.peer.device.address.clone()));
            let mut state = self.peer.lock();
            state.connected = false;
            if state.fail_disconnect {
                return Err(Error::communication("socket close failed"));
            }
            Ok(())
        })
    }

    fn write(&mut self, data: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.peer.lock();
            if !state.connected {
                return Err(Error::NotConnected);
            }
            if state.fail_writes {
                return Err(Error::communication("broken pipe"));
            }
            state.writes.push(data);
            Ok(())
        })
    }

    fn read(&mut self, timeout: Duration) -> BoxFuture<'_, Result<Option<Bytes>>> {
        Box::pin(async move {
            let response = self.peer.lock().responses.pop_front();
            if response.is_none() {
                tokio::time::sleep(timeout).await;
            }
            Ok(response)
        })
    }

    fn is_connected(&self) -> bool {
        self.peer.is_connected()
    }
}

struct AdapterState {
    peers: Mutex<Vec<MockPeer>>,
    journal: Arc<Mutex<Vec<MockCall>>>,
    permission_granted: AtomicBool,
    radio_available: AtomicBool,
    radio_enabled: AtomicBool,
    enable_on_request: AtomicBool,
    fail_listing: AtomicBool,
    list_delay: Mutex<Duration>,
}

/// Adapter over simulated peers.
#[derive(Clone)]
pub struct MockAdapter {
    inner: Arc<AdapterState>,
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAdapter {
    /// Creates an adapter with permission granted and the radio on.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AdapterState {
                peers: Mutex::new(Vec::new()),
                journal: Arc::new(Mutex::new(Vec::new())),
                permission_granted: AtomicBool::new(true),
                radio_available: AtomicBool::new(true),
                radio_enabled: AtomicBool::new(true),
                enable_on_request: AtomicBool::new(true),
                fail_listing: AtomicBool::new(false),
                list_delay: Mutex::new(Duration::ZERO),
            }),
        }
    }

    /// Bonds a simulated device and returns its handle.
    pub fn add_device(&self, device: Device) -> MockPeer {
        let peer = MockPeer {
            device,
            state: Arc::new(Mutex::new(PeerState::default())),
            journal: Arc::clone(&self.inner.journal),
        };
        self.inner
            .peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(peer.clone());
        peer
    }

    /// Returns the handle for a bonded address.
    #[must_use]
    pub fn peer(&self, address: &str) -> Option<MockPeer> {
        self.inner
            .peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|peer| peer.device.address == address)
            .cloned()
    }

    /// Returns connect/disconnect calls in order.
    #[must_use]
    pub fn journal(&self) -> Vec<MockCall> {
        self.inner
            .journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Grants or denies permission.
    pub fn set_permission_granted(&self, granted: bool) {
        self.inner
            .permission_granted
            .store(granted, Ordering::SeqCst);
    }

    /// Adds or removes the radio.
    pub fn set_radio_available(&self, available: bool) {
        self.inner.radio_available.store(available, Ordering::SeqCst);
    }

    /// Powers the radio on or off.
    pub fn set_radio_enabled(&self, enabled: bool) {
        self.inner.radio_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Decides whether an enable request succeeds.
    pub fn set_enable_on_request(&self, enable: bool) {
        self.inner.enable_on_request.store(enable, Ordering::SeqCst);
    }

    /// Makes device listing fail.
    pub fn set_fail_listing(&self, fail: bool) {
        self.inner.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Delays device listing.
    pub fn set_list_delay(&self, delay: Duration) {
        *self
            .inner
            .list_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = delay;
    }
}

impl Adapter for MockAdapter {
    type Transport = MockTransport;

    fn check_permissions(&self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move { Ok(self.inner.permission_granted.load(Ordering::SeqCst)) })
    }

    fn is_radio_available(&self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move { Ok(self.inner.radio_available.load(Ordering::SeqCst)) })
    }

    fn is_radio_enabled(&self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move { Ok(self.inner.radio_enabled.load(Ordering::SeqCst)) })
    }

    fn request_enable(&self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            if self.inner.enable_on_request.load(Ordering::SeqCst) {
                self.inner.radio_enabled.store(true, Ordering::SeqCst);
            }
            Ok(self.inner.radio_enabled.load(Ordering::SeqCst))
        })
    }

    fn bonded_devices(&self) -> BoxFuture<'_, Result<Vec<Device>>> {
        Box::pin(async move {
            let delay = *self
                .inner
                .list_delay
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if self.inner.fail_listing.load(Ordering::SeqCst) {
                return Err(Error::RadioUnavailable);
            }
            Ok(self
                .inner
                .peers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|peer| peer.device.clone())
                .collect())
        })
    }

    fn open(&self, device: &Device) -> Result<MockTransport> {
        self.peer(&device.address)
            .map(MockTransport::new)
            .ok_or_else(|| Error::communication(format!("{} is not bonded", device.address)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_mock_transport_roundtrip() {
        let adapter = MockAdapter::new();
        let peer = adapter.add_device(Device::new("AA"));
        let mut transport = adapter.open(peer.device()).unwrap();

        assert!(transport.write(Bytes::from_static(b"x")).await.is_err());
        assert!(transport.connect().await.unwrap());
        transport.write(Bytes::from_static(b"x")).await.unwrap();
        assert_eq!(peer.writes(), vec![Bytes::from_static(b"x")]);

        peer.push_response(vec![0x12]);
        let read = transport.read(Duration::from_secs(1)).await.unwrap();
        assert_eq!(read, Some(Bytes::from(vec![0x12])));
        assert_eq!(transport.read(Duration::from_secs(1)).await.unwrap(), None);

        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
        assert_eq!(
            adapter.journal(),
            vec![
                MockCall::Connect("AA".into()),
                MockCall::Disconnect("AA".into())
            ]
        );
    }

    #[tokio::test]
    async fn test_open_unknown_device() {
        let adapter = MockAdapter::new();
        assert!(adapter.open(&Device::new("nope")).is_err());
    }
}
