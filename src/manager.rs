//! Connection manager for a single printer.
//!
//! [`ConnectionManager`] owns the one active transport. It drives connect,
//! disconnect and supersede, encodes and writes print jobs, runs the health
//! watcher, and publishes every state change on its [`NotificationBus`].
//! Public operations return plain values; causes are reported to the
//! [`LogSink`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError, Weak};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::{Error, Result};
use crate::event::{DEFAULT_DEBOUNCE, Notification, NotificationBus, Subscription, Topic};
use crate::logging::{LogSink, Severity, TracingSink};
use crate::protocol::command::INIT;
use crate::protocol::{
    Align, DESCRIPTION_WIDTH, cut_frame, feed_frame, identify_frame, qr_frame, text_frame,
    wrap_lines,
};
use crate::transport::{Adapter, Transport};
use crate::types::{ConnectionState, Device, DeviceInfo, PrintOptions, QrOptions};

/// Default wait after tearing down a previous connection.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Default wait after closing a stale peer session.
pub const DEFAULT_STALE_SESSION_DELAY: Duration = Duration::from_millis(1000);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default health check period.
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(5);

/// Default idle time before a heartbeat feed is sent.
pub const DEFAULT_HEARTBEAT_IDLE: Duration = Duration::from_secs(30);

/// Default delay before the post-connect test print.
pub const DEFAULT_SMOKE_TEST_DELAY: Duration = Duration::from_millis(500);

const SMOKE_TEST_PAUSE: Duration = Duration::from_millis(300);

/// Configuration for [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Wait after tearing down a previous connection.
    pub settle_delay: Duration,
    /// Wait after closing a stale session on the target.
    pub stale_session_delay: Duration,
    /// Upper bound for one connect attempt.
    pub connect_timeout: Duration,
    /// Health check period.
    pub watch_interval: Duration,
    /// Idle time before a heartbeat feed.
    pub heartbeat_idle: Duration,
    /// Whether a test print follows a successful connect.
    pub smoke_test: bool,
    /// Delay before the test print.
    pub smoke_test_delay: Duration,
    /// Notification coalescing window.
    pub debounce: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            stale_session_delay: DEFAULT_STALE_SESSION_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            watch_interval: DEFAULT_WATCH_INTERVAL,
            heartbeat_idle: DEFAULT_HEARTBEAT_IDLE,
            smoke_test: true,
            smoke_test_delay: DEFAULT_SMOKE_TEST_DELAY,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl ManagerConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the settle delay.
    #[must_use]
    pub const fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Sets the stale session delay.
    #[must_use]
    pub const fn stale_session_delay(mut self, delay: Duration) -> Self {
        self.stale_session_delay = delay;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the health check period.
    #[must_use]
    pub const fn watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    /// Sets the heartbeat idle time.
    #[must_use]
    pub const fn heartbeat_idle(mut self, idle: Duration) -> Self {
        self.heartbeat_idle = idle;
        self
    }

    /// Enables or disables the post-connect test print.
    #[must_use]
    pub const fn smoke_test(mut self, enabled: bool) -> Self {
        self.smoke_test = enabled;
        self
    }

    /// Sets the delay before the test print.
    #[must_use]
    pub const fn smoke_test_delay(mut self, delay: Duration) -> Self {
        self.smoke_test_delay = delay;
        self
    }

    /// Sets the notification debounce window.
    #[must_use]
    pub const fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

struct Session<T> {
    device: Device,
    transport: T,
}

struct State<T> {
    session: Option<Session<T>>,
    last_write: Instant,
    watcher: Option<JoinHandle<()>>,
    generation: u64,
}

impl<T> State<T> {
    fn stop_watcher(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

/// Values readable without waiting on an in-flight operation.
#[derive(Default)]
struct View {
    status: ConnectionState,
    device: Option<Device>,
    info: Option<DeviceInfo>,
}

struct Inner<A: Adapter> {
    adapter: A,
    state: Mutex<State<A::Transport>>,
    view: StdMutex<View>,
    devices: StdMutex<Vec<Device>>,
    bus: NotificationBus,
    log: Arc<dyn LogSink>,
    config: ManagerConfig,
    connecting: AtomicBool,
    scanning: AtomicBool,
    radio_enabled: AtomicBool,
}

impl<A: Adapter> Drop for Inner<A> {
    fn drop(&mut self) {
        self.state.get_mut().stop_watcher();
    }
}

/// Clears an atomic flag when dropped.
struct FlagGuard<'a>(&'a AtomicBool);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Settles the status of a connect attempt that was dropped before it
/// finished, so it never stays `Connecting`.
struct PendingConnect<'a, A: Adapter> {
    inner: &'a Inner<A>,
    armed: bool,
}

impl<A: Adapter> PendingConnect<'_, A> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<A: Adapter> Drop for PendingConnect<'_, A> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::debug!("connect attempt abandoned");
        let session_alive = self
            .inner
            .state
            .try_lock()
            .map(|state| state.session.is_some());
        match session_alive {
            Ok(true) => self.inner.set_status(ConnectionState::Connected),
            Ok(false) => self.inner.set_session(None, ConnectionState::Disconnected),
            Err(_) => self.inner.set_status(ConnectionState::Disconnected),
        }
    }
}

impl<A: Adapter> Inner<A> {
    fn log(&self, message: &str, severity: Severity) {
        self.log.record(message, severity);
    }

    fn view(&self) -> StdMutexGuard<'_, View> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: ConnectionState) {
        self.view().status = status;
        self.bus.publish(Notification::Status(status));
    }

    /// Updates connected device, snapshot and status together.
    fn set_session(&self, device: Option<&Device>, status: ConnectionState) {
        let info = device.map(DeviceInfo::from);
        {
            let mut view = self.view();
            view.device = device.cloned();
            view.info.clone_from(&info);
            view.status = status;
        }
        self.bus.publish(Notification::Connection(device.cloned()));
        self.bus.publish(Notification::Status(status));
        self.bus.publish(Notification::DeviceInfo(info));
    }

    /// Connection-loss procedure. No-op without an active session.
    fn lose_connection(&self, state: &mut State<A::Transport>) {
        state.stop_watcher();
        let Some(session) = state.session.take() else {
            return;
        };
        self.set_session(None, ConnectionState::ConnectionLost);
        self.log(
            &format!("Connection to {} lost", session.device.display_name()),
            Severity::Warning,
        );
    }

    /// Writes one frame on the active session.
    async fn send(&self, frame: Bytes) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Some(session) = state.session.as_mut() else {
            return Err(Error::NotConnected);
        };
        match session.transport.write(frame).await {
            Ok(()) => {
                state.last_write = Instant::now();
                Ok(())
            }
            Err(e) => {
                self.lose_connection(state);
                Err(e)
            }
        }
    }

    /// One watcher tick. Returns false once the watcher should stop.
    async fn check_health(&self) -> bool {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Some(session) = state.session.as_mut() else {
            return false;
        };

        if !session.transport.is_connected() {
            // Detach our own handle so the loss procedure does not abort this task.
            drop(state.watcher.take());
            self.lose_connection(state);
            return false;
        }

        if state.last_write.elapsed() < self.config.heartbeat_idle {
            return true;
        }

        tracing::debug!("idle for {:?}, sending heartbeat", state.last_write.elapsed());
        match session.transport.write(feed_frame()).await {
            Ok(()) => {
                state.last_write = Instant::now();
                true
            }
            Err(e) => {
                tracing::warn!("heartbeat failed: {}", e);
                drop(state.watcher.take());
                self.lose_connection(state);
                false
            }
        }
    }

    fn spawn_watcher(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.config.watch_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if !inner.check_health().await {
                    break;
                }
            }
        })
    }

    fn spawn_smoke_test(self: &Arc<Self>, generation: u64) {
        let weak = Arc::downgrade(self);
        let delay = self.config.smoke_test_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut guard = inner.state.lock().await;
            let state = &mut *guard;
            if state.generation != generation {
                return;
            }
            let Some(session) = state.session.as_mut() else {
                return;
            };

            let label = session.device.display_name().to_owned();
            let written = async {
                session.transport.write(Bytes::from_static(INIT)).await?;
                tokio::time::sleep(SMOKE_TEST_PAUSE).await;
                session.transport.write(identify_frame(&label)).await
            }
            .await;

            match written {
                Ok(()) => {
                    state.last_write = Instant::now();
                    inner.log(&format!("Test print sent to {label}"), Severity::Info);
                }
                Err(e) => inner.log(&format!("Test print failed: {e}"), Severity::Warning),
            }
        });
    }
}

/// Handle to the connection manager.
///
/// Cloning is cheap; clones share the same connection.
pub struct ConnectionManager<A: Adapter> {
    inner: Arc<Inner<A>>,
}

impl<A: Adapter> Clone for ConnectionManager<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: Adapter> ConnectionManager<A> {
    /// Creates a manager with default settings that logs to `tracing`.
    #[must_use]
    pub fn new(adapter: A) -> Self {
        Self::with_config(adapter, ManagerConfig::default(), Arc::new(TracingSink))
    }

    /// Creates a manager with custom settings and log sink.
    #[must_use]
    pub fn with_config(adapter: A, config: ManagerConfig, log: Arc<dyn LogSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                adapter,
                state: Mutex::new(State {
                    session: None,
                    last_write: Instant::now(),
                    watcher: None,
                    generation: 0,
                }),
                view: StdMutex::new(View::default()),
                devices: StdMutex::new(Vec::new()),
                bus: NotificationBus::new(config.debounce),
                log,
                config,
                connecting: AtomicBool::new(false),
                scanning: AtomicBool::new(false),
                radio_enabled: AtomicBool::new(false),
            }),
        }
    }

    /// Checks permissions and radio state, then loads bonded devices.
    ///
    /// A disabled radio is asked to power on once.
    pub async fn initialize(&self) -> bool {
        match self.try_initialize().await {
            Ok(count) => {
                self.inner.log(
                    &format!("Bluetooth ready, {count} bonded devices"),
                    Severity::Success,
                );
                true
            }
            Err(e) => {
                self.inner
                    .log(&format!("Initialization failed: {e}"), Severity::Error);
                false
            }
        }
    }

    async fn try_initialize(&self) -> Result<usize> {
        let adapter = &self.inner.adapter;
        if !adapter.check_permissions().await? {
            return Err(Error::PermissionDenied);
        }
        if !adapter.is_radio_available().await? {
            return Err(Error::RadioUnavailable);
        }

        let mut enabled = adapter.is_radio_enabled().await?;
        if !enabled {
            self.inner
                .log("Bluetooth is off, requesting enable", Severity::Info);
            enabled = adapter.request_enable().await?;
        }
        self.inner.radio_enabled.store(enabled, Ordering::SeqCst);
        if !enabled {
            return Err(Error::RadioUnavailable);
        }

        Ok(self.refresh_devices().await.len())
    }

    /// Reloads the bonded device list.
    ///
    /// Returns the current cache unchanged if a refresh is already running,
    /// and an empty list if listing fails.
    pub async fn refresh_devices(&self) -> Vec<Device> {
        let inner = &self.inner;
        if inner.scanning.swap(true, Ordering::SeqCst) {
            inner.log("Device refresh already in progress", Severity::Warning);
            return self.devices();
        }

        inner.bus.publish(Notification::Scanning(true));
        let listed = {
            let _scanning = FlagGuard(&inner.scanning);
            inner.adapter.bonded_devices().await
        };
        inner.bus.publish(Notification::Scanning(false));

        match listed {
            Ok(devices) => {
                *inner.devices.lock().unwrap_or_else(PoisonError::into_inner) = devices.clone();
                inner.bus.publish(Notification::Devices(devices.clone()));
                inner.log(
                    &format!("Found {} bonded devices", devices.len()),
                    Severity::Info,
                );
                devices
            }
            Err(e) => {
                inner.log(&format!("Device refresh failed: {e}"), Severity::Error);
                Vec::new()
            }
        }
    }

    /// Connects to `device`, tearing down any current connection first.
    ///
    /// Returns false if another connect is running, the attempt fails, or it
    /// times out. Nothing is left half-connected on failure.
    pub async fn connect(&self, device: &Device) -> bool {
        let inner = &self.inner;
        if inner.connecting.swap(true, Ordering::SeqCst) {
            inner.log(
                &format!("Cannot connect to {}: {}", device.display_name(), Error::AlreadyConnecting),
                Severity::Warning,
            );
            return false;
        }
        let _connecting = FlagGuard(&inner.connecting);

        inner.log(
            &format!("Connecting to {}", device.display_name()),
            Severity::Info,
        );
        match self.try_connect(device).await {
            Ok(()) => {
                inner.log(
                    &format!("Connected to {}", device.display_name()),
                    Severity::Success,
                );
                true
            }
            Err(e) => {
                inner.log(
                    &format!("Connection to {} failed: {e}", device.display_name()),
                    Severity::Error,
                );
                false
            }
        }
    }

    async fn try_connect(&self, device: &Device) -> Result<()> {
        let inner = &self.inner;
        let config = &inner.config;
        inner.set_status(ConnectionState::Connecting);
        let pending = PendingConnect { inner, armed: true };

        let mut state = inner.state.lock().await;
        if let Some(previous) = state.session.take() {
            state.stop_watcher();
            tracing::debug!("superseding {}", previous.device.address);
            close_session(inner, previous).await;
            {
                let mut view = inner.view();
                view.device = None;
                view.info = None;
            }
            inner.bus.publish(Notification::Connection(None));
            inner.bus.publish(Notification::DeviceInfo(None));
            tokio::time::sleep(config.settle_delay).await;
        }

        let mut transport = match inner.adapter.open(device) {
            Ok(transport) => transport,
            Err(e) => {
                pending.disarm();
                inner.set_status(ConnectionState::Error);
                inner.set_status(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        if transport.is_connected() {
            inner.log(
                &format!("Closing stale session on {}", device.display_name()),
                Severity::Warning,
            );
            if let Err(e) = transport.disconnect().await {
                tracing::debug!("stale session close failed: {}", e);
            }
            tokio::time::sleep(config.stale_session_delay).await;
        }

        let attempt = match tokio::time::timeout(config.connect_timeout, transport.connect()).await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(Error::communication("device refused the connection")),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::ConnectionTimeout {
                timeout_ms: u64::try_from(config.connect_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };

        if let Err(e) = attempt {
            pending.disarm();
            inner.set_status(ConnectionState::Error);
            if let Err(close) = transport.disconnect().await {
                tracing::debug!("cleanup after failed connect: {}", close);
            }
            inner.set_status(ConnectionState::Disconnected);
            return Err(e);
        }

        state.session = Some(Session {
            device: device.clone(),
            transport,
        });
        state.last_write = Instant::now();
        state.generation += 1;
        state.watcher = Some(inner.spawn_watcher());
        pending.disarm();
        inner.set_session(Some(device), ConnectionState::Connected);

        if config.smoke_test {
            inner.spawn_smoke_test(state.generation);
        }
        Ok(())
    }

    /// Closes the current connection.
    ///
    /// Local state is cleared even if closing the link fails. Always returns
    /// true; publishes only when something changed.
    pub async fn disconnect(&self) -> bool {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;
        state.stop_watcher();

        if let Some(session) = state.session.take() {
            let name = session.device.display_name().to_owned();
            close_session(inner, session).await;
            inner.set_session(None, ConnectionState::Disconnected);
            inner.log(&format!("Disconnected from {name}"), Severity::Info);
        } else if inner.view().status != ConnectionState::Disconnected {
            inner.set_status(ConnectionState::Disconnected);
        }
        true
    }

    /// Stops background work and closes the connection.
    pub async fn shutdown(&self) {
        self.disconnect().await;
        tracing::debug!("connection manager shut down");
    }

    /// Prints one line of text.
    pub async fn print_text(&self, text: &str, options: &PrintOptions) -> bool {
        self.print("text", text_frame(text, options)).await
    }

    /// Prints a QR symbol rendered by the printer from `data`.
    ///
    /// Requires a connection. Empty or oversized payloads are then rejected
    /// before anything is written.
    pub async fn print_qr_code(&self, data: &str, options: &QrOptions) -> bool {
        if !self.is_connected() {
            self.inner.log(
                &format!("Printing QR code failed: {}", Error::NotConnected),
                Severity::Error,
            );
            return false;
        }
        match qr_frame(data.as_bytes(), options) {
            Ok(frame) => self.print("QR code", frame).await,
            Err(e) => {
                self.inner.log(
                    &format!("Invalid QR payload: {}", Error::from(e)),
                    Severity::Error,
                );
                false
            }
        }
    }

    /// Feeds three lines.
    pub async fn feed_paper(&self) -> bool {
        self.print("paper feed", feed_frame()).await
    }

    /// Cuts the paper.
    pub async fn cut_paper(&self) -> bool {
        self.print("paper cut", cut_frame()).await
    }

    /// Prints a textual description of a QR payload.
    ///
    /// Stops at the first line that fails.
    pub async fn print_qr_info(&self, label: &str, data: &str) -> bool {
        let plain = PrintOptions::new();
        let mut lines = vec![
            (
                "QR CODE".to_owned(),
                PrintOptions::new().align(Align::Center).bold(true),
            ),
            ("=".repeat(32), plain),
            (format!("Type: {label}"), plain),
        ];
        if data.chars().count() > DESCRIPTION_WIDTH {
            lines.push(("Data:".to_owned(), plain));
            lines.extend(
                wrap_lines(data, DESCRIPTION_WIDTH)
                    .into_iter()
                    .map(|line| (line, plain)),
            );
        } else {
            lines.push((format!("Data: {data}"), plain));
        }
        lines.push(("=".repeat(32), plain));

        for (line, options) in &lines {
            if !self.print_text(line, options).await {
                return false;
            }
        }
        true
    }

    async fn print(&self, what: &str, frame: Bytes) -> bool {
        match self.inner.send(frame).await {
            Ok(()) => {
                tracing::debug!("printed {}", what);
                true
            }
            Err(e) => {
                self.inner
                    .log(&format!("Printing {what} failed: {e}"), Severity::Error);
                false
            }
        }
    }

    /// Borrows the active transport, holding off prints and heartbeats.
    pub(crate) async fn transport(&self) -> Result<MappedMutexGuard<'_, A::Transport>> {
        let state = self.inner.state.lock().await;
        MutexGuard::try_map(state, |state| {
            state.session.as_mut().map(|session| &mut session.transport)
        })
        .map_err(|_| Error::NotConnected)
    }

    /// Cached bonded devices.
    #[must_use]
    pub fn devices(&self) -> Vec<Device> {
        self.inner
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The connected device, if any.
    #[must_use]
    pub fn connected_device(&self) -> Option<Device> {
        self.inner.view().device.clone()
    }

    /// Current connection state.
    #[must_use]
    pub fn status(&self) -> ConnectionState {
        self.inner.view().status
    }

    /// Snapshot of the connected device.
    #[must_use]
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.inner.view().info.clone()
    }

    /// Returns true if a printer is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionState::Connected
    }

    /// Returns true while a device refresh runs.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.inner.scanning.load(Ordering::SeqCst)
    }

    /// Radio state seen by the last [`initialize`](Self::initialize).
    #[must_use]
    pub fn is_radio_enabled(&self) -> bool {
        self.inner.radio_enabled.load(Ordering::SeqCst)
    }

    /// The notification bus.
    #[must_use]
    pub fn bus(&self) -> &NotificationBus {
        &self.inner.bus
    }

    /// The log sink.
    #[must_use]
    pub fn log_sink(&self) -> Arc<dyn LogSink> {
        Arc::clone(&self.inner.log)
    }

    /// Subscribes to a topic. See [`NotificationBus::subscribe`].
    pub fn subscribe<F>(&self, topic: Topic, listener: F) -> Subscription
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(topic, listener)
    }
}

async fn close_session<A: Adapter>(inner: &Inner<A>, mut session: Session<A::Transport>) {
    if let Err(e) = session.transport.disconnect().await {
        inner.log(
            &format!("Closing {} failed: {e}", session.device.display_name()),
            Severity::Warning,
        );
    }
}
