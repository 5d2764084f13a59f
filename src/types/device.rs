//! Device identity and connection state types.

use std::fmt;

/// Radio technology reported for a bonded peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Bluetooth classic (BR/EDR) only.
    Classic,
    /// Bluetooth Low Energy only.
    LowEnergy,
    /// Dual-mode device.
    Dual,
    /// The platform did not say.
    #[default]
    Unknown,
}

impl DeviceKind {
    /// Parses the names used by platform bindings (`"CLASSIC"`, `"LE"`, `"DUAL"`).
    #[must_use]
    pub fn parse(kind: &str) -> Self {
        match kind.trim().to_ascii_uppercase().as_str() {
            "CLASSIC" | "BR/EDR" => Self::Classic,
            "LE" | "LOW_ENERGY" => Self::LowEnergy,
            "DUAL" => Self::Dual,
            _ => Self::Unknown,
        }
    }
}

/// A bonded radio peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Device {
    /// Stable hardware address (e.g. `"00:11:22:33:44:55"`).
    pub address: String,
    /// Display name, if the peer advertised one.
    pub name: Option<String>,
    /// Radio technology.
    pub kind: DeviceKind,
    /// Class-of-device field.
    pub device_class: Option<u32>,
}

impl Device {
    /// Creates a classic device with only an address.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
            kind: DeviceKind::Classic,
            device_class: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the class-of-device.
    #[must_use]
    pub const fn with_class(mut self, device_class: u32) -> Self {
        self.device_class = Some(device_class);
        self
    }

    /// Returns the name, or the address when the device has none.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }

    /// Returns true if the class-of-device marks an imaging/printer peripheral.
    ///
    /// Major class `0x06` (imaging) with the printer minor bit set.
    #[must_use]
    pub const fn is_printer(&self) -> bool {
        match self.device_class {
            Some(class) => (class >> 8) & 0x1F == 0x06 && class & 0x80 != 0,
            None => false,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} ({})", self.address),
            None => f.write_str(&self.address),
        }
    }
}

/// Snapshot of the connected device, taken when the connection is established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Display name.
    pub name: Option<String>,
    /// Hardware address.
    pub address: String,
    /// Radio technology.
    pub kind: DeviceKind,
    /// Class-of-device field.
    pub device_class: Option<u32>,
}

impl From<&Device> for DeviceInfo {
    fn from(device: &Device) -> Self {
        Self {
            name: device.name.clone(),
            address: device.address.clone(),
            kind: device.kind,
            device_class: device.device_class,
        }
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection.
    #[default]
    Disconnected,
    /// A connect attempt is running.
    Connecting,
    /// Link established.
    Connected,
    /// The link dropped or stopped answering.
    ConnectionLost,
    /// The last connect attempt failed.
    Error,
}

impl ConnectionState {
    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::ConnectionLost => "connection lost",
            Self::Error => "connection error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_falls_back_to_address() {
        let device = Device::new("00:11:22:33:44:55");
        assert_eq!(device.display_name(), "00:11:22:33:44:55");

        let device = device.with_name("MTP-II");
        assert_eq!(device.display_name(), "MTP-II");
        assert_eq!(device.to_string(), "MTP-II (00:11:22:33:44:55)");
    }

    #[test]
    fn test_is_printer() {
        // Imaging major class, printer minor bit
        assert!(Device::new("a").with_class(0x0680).is_printer());
        // Audio headset
        assert!(!Device::new("a").with_class(0x0404).is_printer());
        assert!(!Device::new("a").is_printer());
    }

    #[test]
    fn test_device_kind_parse() {
        assert_eq!(DeviceKind::parse("classic"), DeviceKind::Classic);
        assert_eq!(DeviceKind::parse("LE"), DeviceKind::LowEnergy);
        assert_eq!(DeviceKind::parse("dual"), DeviceKind::Dual);
        assert_eq!(DeviceKind::parse("?"), DeviceKind::Unknown);
    }

    #[test]
    fn test_device_info_snapshot() {
        let device = Device::new("AA:BB").with_name("Printer").with_class(0x0680);
        let info = DeviceInfo::from(&device);
        assert_eq!(info.address, "AA:BB");
        assert_eq!(info.name.as_deref(), Some("Printer"));
        assert_eq!(info.device_class, Some(0x0680));
    }
}
