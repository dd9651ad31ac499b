//! Bluetooth LE transport (btleplug)
//!
//! BLE printers expose a writable characteristic that accepts raw ESC/POS.
//! Discovery polls the adapter's peripheral list while a scan is running.
//! Peripherals are identified by their address string.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{ScanResult, Transport, TransportHandle};
use crate::error::{PrintError, PrintResult};

/// How often the peripheral list is polled during discovery
const POLL_INTERVAL: Duration = Duration::from_millis(500);

fn ble_error(e: btleplug::Error) -> PrintError {
    PrintError::ServiceUnavailable(format!("bluetooth: {}", e))
}

/// The first BLE adapter of the host
pub struct BleCentral {
    adapter: Adapter,
}

impl BleCentral {
    pub async fn new() -> PrintResult<Self> {
        let manager = Manager::new().await.map_err(ble_error)?;
        let adapter = manager
            .adapters()
            .await
            .map_err(ble_error)?
            .into_iter()
            .next()
            .ok_or_else(|| PrintError::ServiceUnavailable("no bluetooth adapter".to_string()))?;

        info!("BLE adapter ready");
        Ok(Self { adapter })
    }

    /// Scan until `cancel` fires, reporting each named or unnamed sighting
    pub async fn scan(
        &self,
        results: mpsc::UnboundedSender<ScanResult>,
        cancel: CancellationToken,
    ) -> PrintResult<()> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(ble_error)?;
        debug!("BLE scan started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(POLL_INTERVAL) => {
                    for peripheral in self.adapter.peripherals().await.map_err(ble_error)? {
                        if let Ok(Some(props)) = peripheral.properties().await {
                            let result = ScanResult {
                                name: props.local_name.unwrap_or_default(),
                                identifier: props.address.to_string(),
                            };
                            if results.send(result).is_err() {
                                cancel.cancel();
                            }
                        }
                    }
                }
            }
        }

        if let Err(e) = self.adapter.stop_scan().await {
            warn!(error = %e, "Failed to stop BLE scan");
        }
        debug!("BLE scan stopped");
        Ok(())
    }

    /// Connect to the peripheral `id` and pick its writable characteristic
    #[instrument(skip(self))]
    pub async fn open(&self, id: &str, chunk_size: usize) -> PrintResult<BleTransport> {
        let peripheral = self.find(id).await?;

        peripheral
            .connect()
            .await
            .map_err(|e| PrintError::ConnectionFailed(format!("{}: {}", id, e)))?;
        peripheral
            .discover_services()
            .await
            .map_err(|e| PrintError::ConnectionFailed(format!("{}: {}", id, e)))?;

        let characteristics = peripheral.characteristics();
        let (characteristic, write_type) = characteristics
            .iter()
            .find(|c| c.properties.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE))
            .map(|c| (c.clone(), WriteType::WithoutResponse))
            .or_else(|| {
                characteristics
                    .iter()
                    .find(|c| c.properties.contains(CharPropFlags::WRITE))
                    .map(|c| (c.clone(), WriteType::WithResponse))
            })
            .ok_or_else(|| {
                PrintError::ConnectionFailed(format!("{} has no writable characteristic", id))
            })?;

        info!(characteristic = %characteristic.uuid, "BLE printer connected");

        Ok(BleTransport {
            handle: TransportHandle::BluetoothLe { id: id.to_string() },
            peripheral,
            characteristic,
            write_type,
            chunk_size: chunk_size.max(1),
            open: true,
        })
    }

    async fn find(&self, id: &str) -> PrintResult<Peripheral> {
        for peripheral in self.adapter.peripherals().await.map_err(ble_error)? {
            if let Ok(Some(props)) = peripheral.properties().await
                && props.address.to_string().eq_ignore_ascii_case(id)
            {
                return Ok(peripheral);
            }
        }
        Err(PrintError::ConnectionFailed(format!(
            "{} was not seen by discovery",
            id
        )))
    }
}

/// A connected BLE printer
pub struct BleTransport {
    handle: TransportHandle,
    peripheral: Peripheral,
    characteristic: Characteristic,
    write_type: WriteType,
    chunk_size: usize,
    open: bool,
}

impl fmt::Debug for BleTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BleTransport")
            .field("handle", &self.handle)
            .field("characteristic", &self.characteristic.uuid)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

#[async_trait]
impl Transport for BleTransport {
    fn handle(&self) -> &TransportHandle {
        &self.handle
    }

    #[instrument(skip(self, data), fields(handle = %self.handle, data_len = data.len()))]
    async fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        if !self.open {
            return Err(PrintError::NotConnected);
        }
        for chunk in data.chunks(self.chunk_size) {
            self.peripheral
                .write(&self.characteristic, chunk, self.write_type)
                .await
                .map_err(|e| {
                    PrintError::TransportIo(std::io::Error::other(format!("BLE write: {}", e)))
                })?;
        }
        Ok(())
    }

    async fn close(&mut self) -> PrintResult<()> {
        if std::mem::take(&mut self.open)
            && let Err(e) = self.peripheral.disconnect().await
        {
            warn!(error = %e, "BLE disconnect failed");
        }
        Ok(())
    }
}
