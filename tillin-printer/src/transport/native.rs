//! Device service backed by the host's own stacks
//!
//! Sockets and device nodes need no binding. The BLE adapter is acquired on
//! `bind`; a host without one still binds, BLE operations then fail.

#[cfg(feature = "ble")]
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::bluetooth::{self, RfcommOptions, RfcommTransport};
use super::network::NetworkTransport;
use super::usb::{self, UsbTransport};
use super::{DeviceService, PairedDevice, ScanResult, Transport, TransportHandle};
use crate::config::PrinterConfig;
use crate::error::{PrintError, PrintResult};

#[cfg(feature = "ble")]
use super::ble::BleCentral;

pub struct NativeDeviceService {
    config: PrinterConfig,
    #[cfg(feature = "ble")]
    central: parking_lot::Mutex<Option<Arc<BleCentral>>>,
}

impl NativeDeviceService {
    pub fn new(config: PrinterConfig) -> Self {
        Self {
            config,
            #[cfg(feature = "ble")]
            central: parking_lot::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PrinterConfig {
        &self.config
    }

    fn rfcomm_options(&self) -> RfcommOptions {
        RfcommOptions {
            sysfs_dir: self.config.rfcomm_sysfs_dir.clone(),
            dev_dir: self.config.rfcomm_dev_dir.clone(),
            chunk_size: self.config.bt_chunk_size,
            chunk_delay: self.config.bt_chunk_delay,
            connect_timeout: self.config.connect_timeout,
        }
    }

    #[cfg(feature = "ble")]
    fn central(&self) -> PrintResult<Arc<BleCentral>> {
        self.central.lock().clone().ok_or_else(|| {
            PrintError::ServiceUnavailable("no bluetooth adapter bound".to_string())
        })
    }
}

impl Default for NativeDeviceService {
    fn default() -> Self {
        Self::new(PrinterConfig::default())
    }
}

#[async_trait]
impl DeviceService for NativeDeviceService {
    async fn bind(&self) -> PrintResult<()> {
        #[cfg(feature = "ble")]
        {
            match BleCentral::new().await {
                Ok(central) => *self.central.lock() = Some(Arc::new(central)),
                Err(e) => tracing::warn!(error = %e, "BLE unavailable, continuing without it"),
            }
        }

        info!("Native device service bound");
        Ok(())
    }

    async fn unbind(&self) {
        #[cfg(feature = "ble")]
        self.central.lock().take();
    }

    #[instrument(skip(self, handle), fields(handle = %handle))]
    async fn open(&self, handle: &TransportHandle) -> PrintResult<Box<dyn Transport>> {
        match handle {
            TransportHandle::Network { host, port } => {
                let port = if *port == 0 {
                    self.config.network_port
                } else {
                    *port
                };
                let transport =
                    NetworkTransport::connect(host, port, self.config.connect_timeout).await?;
                Ok(Box::new(transport))
            }
            TransportHandle::Usb { path } => {
                let transport =
                    UsbTransport::open(std::path::Path::new(path), self.config.connect_timeout)
                        .await?;
                Ok(Box::new(transport))
            }
            TransportHandle::BluetoothClassic { address } => {
                let transport = RfcommTransport::open(address, &self.rfcomm_options()).await?;
                Ok(Box::new(transport))
            }
            #[cfg(feature = "ble")]
            TransportHandle::BluetoothLe { id } => {
                let transport = self.central()?.open(id, self.config.ble_chunk_size).await?;
                Ok(Box::new(transport))
            }
            #[cfg(not(feature = "ble"))]
            TransportHandle::BluetoothLe { .. } => Err(PrintError::ServiceUnavailable(
                "BLE support is not compiled in".to_string(),
            )),
        }
    }

    async fn paired_devices(&self) -> PrintResult<Vec<PairedDevice>> {
        bluetooth::list_bound_devices(&self.config.rfcomm_sysfs_dir).await
    }

    async fn usb_paths(&self) -> PrintResult<Vec<String>> {
        usb::list_usb_paths(&self.config.usb_dirs).await
    }

    #[cfg(feature = "ble")]
    async fn scan(
        &self,
        results: mpsc::UnboundedSender<ScanResult>,
        cancel: CancellationToken,
    ) -> PrintResult<()> {
        self.central()?.scan(results, cancel).await
    }

    #[cfg(not(feature = "ble"))]
    async fn scan(
        &self,
        _results: mpsc::UnboundedSender<ScanResult>,
        _cancel: CancellationToken,
    ) -> PrintResult<()> {
        Err(PrintError::ServiceUnavailable(
            "BLE support is not compiled in".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_opens_usb_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lp0");
        std::fs::write(&path, b"").unwrap();

        let service = NativeDeviceService::new(
            PrinterConfig::default().with_usb_dirs(vec![dir.path().to_path_buf()]),
        );
        service.bind().await.unwrap();

        let paths = service.usb_paths().await.unwrap();
        assert_eq!(paths, vec![path.to_string_lossy().into_owned()]);

        let mut transport = service
            .open(&TransportHandle::Usb {
                path: paths[0].clone(),
            })
            .await
            .unwrap();
        transport.write(b"ok").await.unwrap();
        transport.close().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"ok");
    }

    #[tokio::test]
    async fn test_paired_devices_from_sysfs() {
        let dir = tempfile::tempdir().unwrap();
        let tty = dir.path().join("rfcomm0");
        std::fs::create_dir_all(&tty).unwrap();
        std::fs::write(tty.join("address"), "00:11:22:33:44:55\n").unwrap();

        let service = NativeDeviceService::new(
            PrinterConfig::default().with_rfcomm_dirs(dir.path(), dir.path()),
        );
        let devices = service.paired_devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].address, "00:11:22:33:44:55");
    }
}
