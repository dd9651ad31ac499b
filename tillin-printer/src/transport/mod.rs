//! Printer transports
//!
//! Supports:
//! - Network printers (raw TCP, port 9100)
//! - USB printer class devices (`/dev/usb/lp0`)
//! - Bluetooth classic printers bound to an RFCOMM tty
//! - Bluetooth LE printers (feature `ble`)
//!
//! A [`TransportHandle`] only says *how* to reach a printer. The
//! [`DeviceService`] turns it into an open [`Transport`].

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{PrintError, PrintResult};

#[cfg(feature = "ble")]
pub mod ble;
pub mod bluetooth;
mod native;
pub mod network;
pub mod usb;

pub use native::NativeDeviceService;

/// Identifies how to open a channel to a printer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransportHandle {
    /// Paired Bluetooth classic device (SPP)
    BluetoothClassic { address: String },
    /// Bluetooth LE peripheral, as reported by discovery
    BluetoothLe { id: String },
    /// USB printer device path
    Usb { path: String },
    /// Raw TCP printer
    Network { host: String, port: u16 },
}

impl TransportHandle {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportHandle::BluetoothClassic { .. } => "bluetooth",
            TransportHandle::BluetoothLe { .. } => "ble",
            TransportHandle::Usb { .. } => "usb",
            TransportHandle::Network { .. } => "network",
        }
    }
}

impl fmt::Display for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportHandle::BluetoothClassic { address } => write!(f, "bluetooth:{}", address),
            TransportHandle::BluetoothLe { id } => write!(f, "ble:{}", id),
            TransportHandle::Usb { path } => write!(f, "usb:{}", path),
            TransportHandle::Network { host, port } => write!(f, "tcp:{}:{}", host, port),
        }
    }
}

/// A device seen during BLE discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub name: String,
    pub identifier: String,
}

/// A paired Bluetooth classic device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedDevice {
    pub name: String,
    pub address: String,
}

/// An open byte channel to a printer
///
/// `write` resolves once the bytes were accepted by the channel. Its result
/// is the only success/failure signal for a print.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// The handle this transport was opened from
    fn handle(&self) -> &TransportHandle;

    /// Send raw ESC/POS data
    async fn write(&mut self, data: &[u8]) -> PrintResult<()>;

    /// Release the channel
    async fn close(&mut self) -> PrintResult<()>;
}

/// Access to the device stack (radio, USB, sockets)
///
/// The session binds it once, then opens transports from handles.
#[async_trait]
pub trait DeviceService: Send + Sync {
    /// Establish access to the device stack
    async fn bind(&self) -> PrintResult<()>;

    /// Release the device stack
    async fn unbind(&self) {}

    /// Open exactly the transport `handle` names
    async fn open(&self, handle: &TransportHandle) -> PrintResult<Box<dyn Transport>>;

    /// Paired Bluetooth classic devices
    async fn paired_devices(&self) -> PrintResult<Vec<PairedDevice>>;

    /// USB printer device paths
    async fn usb_paths(&self) -> PrintResult<Vec<String>>;

    /// Run BLE discovery until `cancel` fires, sending every sighting
    async fn scan(
        &self,
        _results: mpsc::UnboundedSender<ScanResult>,
        _cancel: CancellationToken,
    ) -> PrintResult<()> {
        Err(PrintError::ServiceUnavailable(
            "BLE discovery is not supported".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_display() {
        let handle = TransportHandle::Network {
            host: "192.168.1.100".into(),
            port: 9100,
        };
        assert_eq!(handle.to_string(), "tcp:192.168.1.100:9100");
        assert_eq!(handle.kind(), "network");
    }

    #[test]
    fn test_handle_json() {
        let handle: TransportHandle =
            serde_json::from_str(r#"{"type":"usb","path":"/dev/usb/lp0"}"#).unwrap();
        assert_eq!(
            handle,
            TransportHandle::Usb {
                path: "/dev/usb/lp0".into()
            }
        );
        let handle: TransportHandle =
            serde_json::from_str(r#"{"type":"bluetoothLe","id":"AA:BB"}"#).unwrap();
        assert_eq!(handle.kind(), "ble");
    }
}
