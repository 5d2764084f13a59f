//! RFCOMM transport for Linux hosts.
//!
//! The printer must be bonded and bound to an RFCOMM tty node beforehand:
//!
//! ```bash
//! $ bluetoothctl pair 00:11:22:33:44:55
//! $ sudo rfcomm bind 0 00:11:22:33:44:55 1
//! # creates /dev/rfcomm0
//! ```
//!
//! [`RfcommAdapter`] answers radio and bonding questions by running
//! `bluetoothctl` on a blocking task. [`RfcommTransport`] finds the node bound
//! to the device address in `/proc/net/rfcomm` and drives it through
//! `tokio-serial`.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::error::{Error, Result};
use crate::transport::{Adapter, Transport};
use crate::types::{Device, DeviceKind};

/// Default baud rate for RFCOMM serial printers.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default read buffer size.
pub const DEFAULT_READ_BUFFER: usize = 256;

/// Default delay between opening the node and draining stale bytes.
pub const DEFAULT_CONNECTION_DELAY: Duration = Duration::from_millis(300);

const PROC_RFCOMM: &str = "/proc/net/rfcomm";

/// Configuration for RFCOMM transports.
#[derive(Debug, Clone)]
pub struct RfcommConfig {
    /// Explicit tty node. When unset the node is looked up by address.
    pub tty_path: Option<PathBuf>,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read buffer size.
    pub read_buffer: usize,
    /// Delay after opening the node before it is used.
    pub connection_delay: Duration,
}

impl Default for RfcommConfig {
    fn default() -> Self {
        Self {
            tty_path: None,
            baud_rate: DEFAULT_BAUD_RATE,
            read_buffer: DEFAULT_READ_BUFFER,
            connection_delay: DEFAULT_CONNECTION_DELAY,
        }
    }
}

impl RfcommConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the tty node instead of looking it up.
    #[must_use]
    pub fn tty_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.tty_path = Some(path.into());
        self
    }

    /// Sets the baud rate.
    #[must_use]
    pub const fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = rate;
        self
    }

    /// Sets the read buffer size.
    #[must_use]
    pub const fn read_buffer(mut self, size: usize) -> Self {
        self.read_buffer = size;
        self
    }

    /// Sets the connection delay.
    #[must_use]
    pub const fn connection_delay(mut self, delay: Duration) -> Self {
        self.connection_delay = delay;
        self
    }
}

/// Finds the `rfcommN` node bound to `address` in `/proc/net/rfcomm` content.
///
/// Lines look like `rfcomm0: 00:11:22:33:44:55 channel 1 clean`.
#[must_use]
pub fn find_rfcomm_node(proc_contents: &str, address: &str) -> Option<PathBuf> {
    let wanted = address.to_ascii_uppercase();
    proc_contents.lines().find_map(|line| {
        let (node, rest) = line.split_once(':')?;
        let peer = rest.split_whitespace().next()?;
        (peer.to_ascii_uppercase() == wanted).then(|| PathBuf::from(format!("/dev/{}", node.trim())))
    })
}

fn map_serial_error(err: tokio_serial::Error) -> Error {
    match err.kind {
        tokio_serial::ErrorKind::Io(io::ErrorKind::PermissionDenied) => Error::PermissionDenied,
        _ => Error::Serial(err),
    }
}

fn map_io_error(err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::PermissionDenied => Error::PermissionDenied,
        _ => Error::Io(err),
    }
}

/// Transport over an RFCOMM tty node.
pub struct RfcommTransport {
    address: String,
    config: RfcommConfig,
    path: Option<PathBuf>,
    reader: Option<ReadHalf<SerialStream>>,
    writer: Option<WriteHalf<SerialStream>>,
}

impl RfcommTransport {
    /// Creates an unopened transport for the device at `address`.
    #[must_use]
    pub fn new(address: impl Into<String>, config: RfcommConfig) -> Self {
        Self {
            address: address.into(),
            config,
            path: None,
            reader: None,
            writer: None,
        }
    }

    /// The node in use, once connected.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn resolve_path(&self) -> Result<PathBuf> {
        let path = match &self.config.tty_path {
            Some(path) => path.clone(),
            None => {
                let contents = tokio::fs::read_to_string(PROC_RFCOMM)
                    .await
                    .map_err(map_io_error)?;
                find_rfcomm_node(&contents, &self.address).ok_or_else(|| {
                    Error::communication(format!("no rfcomm node bound to {}", self.address))
                })?
            }
        };
        if !tokio::fs::try_exists(&path).await.map_err(map_io_error)? {
            return Err(Error::communication(format!(
                "{} does not exist",
                path.display()
            )));
        }
        Ok(path)
    }

    fn close(&mut self) {
        self.reader = None;
        self.writer = None;
        self.path = None;
    }
}

impl Transport for RfcommTransport {
    fn connect(&mut self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            if self.writer.is_some() {
                return Ok(true);
            }

            let path = self.resolve_path().await?;
            tracing::info!("opening {} for {}", path.display(), self.address);

            let mut stream = tokio_serial::new(path.to_string_lossy(), self.config.baud_rate)
                .open_native_async()
                .map_err(map_serial_error)?;

            tokio::time::sleep(self.config.connection_delay).await;

            let mut buf = vec![0u8; self.config.read_buffer.max(1)];
            let mut drained = 0usize;
            while let Ok(Ok(n)) =
                tokio::time::timeout(Duration::from_millis(20), stream.read(&mut buf)).await
            {
                if n == 0 {
                    break;
                }
                drained += n;
            }
            if drained > 0 {
                tracing::debug!("drained {} stale bytes", drained);
            }

            let (reader, writer) = tokio::io::split(stream);
            self.reader = Some(reader);
            self.writer = Some(writer);
            self.path = Some(path);
            Ok(true)
        })
    }

    fn disconnect(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if let Some(writer) = self.writer.as_mut() {
                tracing::info!("closing rfcomm link to {}", self.address);
                let flushed = writer.shutdown().await;
                self.close();
                flushed.map_err(map_io_error)?;
            }
            self.close();
            Ok(())
        })
    }

    fn write(&mut self, data: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let writer = self.writer.as_mut().ok_or(Error::NotConnected)?;
            tracing::trace!("writing {} bytes", data.len());

            let written = async {
                writer.write_all(&data).await?;
                writer.flush().await
            }
            .await;

            if let Err(e) = written {
                tracing::warn!("rfcomm write failed: {}", e);
                self.close();
                return Err(map_io_error(e));
            }
            Ok(())
        })
    }

    fn read(&mut self, timeout: Duration) -> BoxFuture<'_, Result<Option<Bytes>>> {
        Box::pin(async move {
            let size = self.config.read_buffer.max(1);
            let reader = self.reader.as_mut().ok_or(Error::NotConnected)?;
            let mut buf = vec![0u8; size];

            match tokio::time::timeout(timeout, reader.read(&mut buf)).await {
                Err(_) => Ok(None),
                Ok(Ok(0)) => {
                    self.close();
                    Err(Error::Io(io::Error::new(
                        io::ErrorKind::ConnectionReset,
                        "rfcomm node closed",
                    )))
                }
                Ok(Ok(n)) => {
                    buf.truncate(n);
                    tracing::trace!("read {}", hex::encode(&buf));
                    Ok(Some(Bytes::from(buf)))
                }
                Ok(Err(e)) => {
                    self.close();
                    Err(map_io_error(e))
                }
            }
        })
    }

    fn is_connected(&self) -> bool {
        // Halves are dropped on any write or read failure.
        self.writer.is_some()
    }
}

/// Parses `bluetoothctl devices` output into `(address, name)` pairs.
///
/// Lines look like `Device 00:11:22:33:44:55 Receipt Printer`.
#[must_use]
pub fn parse_device_list(output: &str) -> Vec<(String, Option<String>)> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("Device ")?;
            let (address, name) = match rest.split_once(' ') {
                Some((address, name)) => (address, Some(name.trim())),
                None => (rest, None),
            };
            let name = name.filter(|n| !n.is_empty() && *n != address.replace(':', "-"));
            Some((address.to_owned(), name.map(str::to_owned)))
        })
        .collect()
}

/// Fills name, kind and class from `bluetoothctl info` output.
#[must_use]
pub fn apply_device_info(mut device: Device, output: &str) -> Device {
    for line in output.lines() {
        let Some((key, value)) = line.trim().split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key {
            "Name" if device.name.is_none() && !value.is_empty() => {
                device.name = Some(value.to_owned());
            }
            "Class" => {
                let digits = value.trim_start_matches("0x");
                if let Ok(class) = u32::from_str_radix(digits, 16) {
                    device.device_class = Some(class);
                    device.kind = DeviceKind::Classic;
                }
            }
            _ => {}
        }
    }
    device
}

/// Reads `Powered: yes|no` from `bluetoothctl show` output.
#[must_use]
pub fn parse_powered(output: &str) -> Option<bool> {
    output.lines().find_map(|line| {
        match line.trim().strip_prefix("Powered:")?.trim() {
            "yes" => Some(true),
            "no" => Some(false),
            _ => None,
        }
    })
}

async fn bluetoothctl(args: Vec<String>) -> Result<String> {
    let output = tokio::task::spawn_blocking(move || Command::new("bluetoothctl").args(&args).output())
        .await
        .map_err(|e| Error::communication(format!("bluetoothctl task failed: {e}")))?
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::RadioUnavailable,
            _ => map_io_error(e),
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if output.status.success() {
        Ok(stdout)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(Error::communication(format!(
            "bluetoothctl exited with {}: {}",
            output.status,
            stderr.trim()
        )))
    }
}

/// Adapter backed by BlueZ through `bluetoothctl`.
#[derive(Debug, Clone, Default)]
pub struct RfcommAdapter {
    config: RfcommConfig,
}

impl RfcommAdapter {
    /// Creates an adapter whose transports use `config`.
    #[must_use]
    pub const fn new(config: RfcommConfig) -> Self {
        Self { config }
    }
}

impl Adapter for RfcommAdapter {
    type Transport = RfcommTransport;

    fn check_permissions(&self) -> BoxFuture<'_, Result<bool>> {
        // Access to the tty node is checked when it is opened.
        Box::pin(async { Ok(true) })
    }

    fn is_radio_available(&self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async {
            match bluetoothctl(vec!["show".into()]).await {
                Ok(output) => Ok(output.contains("Controller")),
                Err(Error::RadioUnavailable) => Ok(false),
                Err(e) => Err(e),
            }
        })
    }

    fn is_radio_enabled(&self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async {
            let output = bluetoothctl(vec!["show".into()]).await?;
            Ok(parse_powered(&output).unwrap_or(false))
        })
    }

    fn request_enable(&self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let output = bluetoothctl(vec!["power".into(), "on".into()]).await?;
            tracing::debug!("power on: {}", output.trim());
            self.is_radio_enabled().await
        })
    }

    fn bonded_devices(&self) -> BoxFuture<'_, Result<Vec<Device>>> {
        Box::pin(async {
            let listing = bluetoothctl(vec!["devices".into(), "Paired".into()]).await?;
            let mut devices = Vec::new();
            for (address, name) in parse_device_list(&listing) {
                let mut device = Device::new(address.clone());
                device.kind = DeviceKind::Unknown;
                device.name = name;
                let device = match bluetoothctl(vec!["info".into(), address]).await {
                    Ok(info) => apply_device_info(device, &info),
                    Err(e) => {
                        tracing::debug!("no info for {}: {}", device.address, e);
                        device
                    }
                };
                devices.push(device);
            }
            Ok(devices)
        })
    }

    fn open(&self, device: &Device) -> Result<RfcommTransport> {
        Ok(RfcommTransport::new(device.address.clone(), self.config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfcomm_config_builder() {
        let config = RfcommConfig::new()
            .tty_path("/dev/rfcomm3")
            .baud_rate(115_200)
            .read_buffer(64);
        assert_eq!(config.tty_path, Some(PathBuf::from("/dev/rfcomm3")));
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.read_buffer, 64);
        assert_eq!(RfcommConfig::default().baud_rate, DEFAULT_BAUD_RATE);
    }

    #[tokio::test]
    async fn test_connect_missing_node_fails() {
        let config = RfcommConfig::new().tty_path("/nonexistent/rfcomm9");
        let mut transport = RfcommTransport::new("00:11:22:33:44:55", config);

        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, Error::CommunicationFailure { .. }));
        assert!(err.to_string().contains("/nonexistent/rfcomm9"));
        assert!(!transport.is_connected());
        assert!(transport.path().is_none());
        assert!(matches!(
            transport.write(Bytes::from_static(b"x")).await,
            Err(Error::NotConnected)
        ));
    }

    #[test]
    fn test_find_rfcomm_node() {
        let proc = "rfcomm0: 11:22:33:44:55:66 channel 1 clean\n\
                    rfcomm1: 00:11:22:AA:BB:CC channel 1 connected [tty-attached]\n";
        assert_eq!(
            find_rfcomm_node(proc, "00:11:22:aa:bb:cc"),
            Some(PathBuf::from("/dev/rfcomm1"))
        );
        assert_eq!(find_rfcomm_node(proc, "FF:FF:FF:FF:FF:FF"), None);
    }

    #[test]
    fn test_parse_device_list() {
        let output = "Device 00:11:22:33:44:55 PT-210\n\
                      Device AA:BB:CC:DD:EE:FF AA-BB-CC-DD-EE-FF\n\
                      [CHG] Controller 11:11:11:11:11:11 Discovering: no\n";
        let devices = parse_device_list(output);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0], ("00:11:22:33:44:55".to_owned(), Some("PT-210".to_owned())));
        assert_eq!(devices[1], ("AA:BB:CC:DD:EE:FF".to_owned(), None));
    }

    #[test]
    fn test_apply_device_info() {
        let info = "Device 00:11:22:33:44:55 (public)\n\
                    \tName: PT-210\n\
                    \tClass: 0x00040680\n\
                    \tPaired: yes\n";
        let mut device = Device::new("00:11:22:33:44:55");
        device.kind = DeviceKind::Unknown;
        let device = apply_device_info(device, info);
        assert_eq!(device.name.as_deref(), Some("PT-210"));
        assert_eq!(device.device_class, Some(0x0004_0680));
        assert_eq!(device.kind, DeviceKind::Classic);
        assert!(device.is_printer());
    }

    #[test]
    fn test_parse_powered() {
        assert_eq!(parse_powered("Controller 11:22\n\tPowered: yes\n"), Some(true));
        assert_eq!(parse_powered("\tPowered: no"), Some(false));
        assert_eq!(parse_powered("nothing"), None);
    }
}
