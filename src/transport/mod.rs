//! Transport layer for printer communication.
//!
//! [`Transport`] is one byte-stream link to a bonded printer. [`Adapter`] is
//! the platform side: radio state, bonded-device listing, and opening a
//! transport for a device.
//!
//! Backends:
//! - [`rfcomm`]: Linux RFCOMM tty nodes driven through `tokio-serial`
//! - [`mock`]: scriptable in-memory backend

pub mod mock;
pub mod rfcomm;

use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::Device;

/// Trait for transport implementations.
pub trait Transport: Send + Sync {
    /// Opens the link. `Ok(false)` means the peer refused without an error.
    fn connect(&mut self) -> BoxFuture<'_, Result<bool>>;

    /// Closes the link.
    fn disconnect(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Writes one frame.
    fn write(&mut self, data: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Reads whatever the printer sent, waiting at most `timeout`.
    ///
    /// `Ok(None)` means nothing arrived in time.
    fn read(&mut self, timeout: Duration) -> BoxFuture<'_, Result<Option<Bytes>>>;

    /// Returns true if the link is open.
    fn is_connected(&self) -> bool;
}

/// Platform radio binding.
pub trait Adapter: Send + Sync + 'static {
    /// Transport type produced by [`Adapter::open`].
    type Transport: Transport + 'static;

    /// Returns true if the process may use the radio, requesting access if needed.
    fn check_permissions(&self) -> BoxFuture<'_, Result<bool>>;

    /// Returns true if a radio exists.
    fn is_radio_available(&self) -> BoxFuture<'_, Result<bool>>;

    /// Returns true if the radio is powered.
    fn is_radio_enabled(&self) -> BoxFuture<'_, Result<bool>>;

    /// Asks the platform to power the radio. Returns the resulting state.
    fn request_enable(&self) -> BoxFuture<'_, Result<bool>>;

    /// Lists bonded devices.
    fn bonded_devices(&self) -> BoxFuture<'_, Result<Vec<Device>>>;

    /// Creates an unopened transport for `device`.
    fn open(&self, device: &Device) -> Result<Self::Transport>;
}

pub use mock::{MockAdapter, MockPeer, MockTransport};
pub use rfcomm::{RfcommAdapter, RfcommConfig, RfcommTransport};
