// tillin-printer/tests/common/mod.rs
// In-memory device service for session and engine tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tillin_printer::{
    ConnectionSession, DeviceService, PairedDevice, PrintError, PrintResult, ScanResult,
    Transport, TransportHandle,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct FakeService {
    pub bind_calls: AtomicUsize,
    pub unbind_calls: AtomicUsize,
    pub fail_bind: AtomicBool,
    pub fail_open: AtomicBool,
    pub fail_writes: AtomicBool,
    pub fail_close: AtomicBool,
    pub bind_delay: Duration,
    pub open_delay: Duration,
    pub opened: Mutex<Vec<TransportHandle>>,
    pub closed: Arc<AtomicUsize>,
    pub written: Arc<Mutex<Vec<u8>>>,
    pub scan_results: Vec<ScanResult>,
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_bind_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            bind_delay: delay,
            ..Default::default()
        })
    }

    pub fn with_open_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            open_delay: delay,
            ..Default::default()
        })
    }

    pub fn with_scan_results(results: Vec<ScanResult>) -> Arc<Self> {
        Arc::new(Self {
            scan_results: results,
            ..Default::default()
        })
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    pub fn opened(&self) -> Vec<TransportHandle> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeviceService for FakeService {
    async fn bind(&self) -> PrintResult<()> {
        self.bind_calls.fetch_add(1, Ordering::SeqCst);
        if !self.bind_delay.is_zero() {
            tokio::time::sleep(self.bind_delay).await;
        }
        if self.fail_bind.load(Ordering::SeqCst) {
            return Err(PrintError::ServiceUnavailable("radio off".into()));
        }
        Ok(())
    }

    async fn unbind(&self) {
        self.unbind_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn open(&self, handle: &TransportHandle) -> PrintResult<Box<dyn Transport>> {
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(PrintError::ConnectionFailed("no answer".into()));
        }
        self.opened.lock().unwrap().push(handle.clone());
        Ok(Box::new(FakeTransport {
            handle: handle.clone(),
            written: self.written.clone(),
            closed: self.closed.clone(),
            fail_writes: self.fail_writes.load(Ordering::SeqCst),
            fail_close: self.fail_close.load(Ordering::SeqCst),
        }))
    }

    async fn paired_devices(&self) -> PrintResult<Vec<PairedDevice>> {
        Ok(vec![PairedDevice {
            name: "RPP02N".into(),
            address: "00:11:22:33:44:55".into(),
        }])
    }

    async fn usb_paths(&self) -> PrintResult<Vec<String>> {
        Ok(vec!["/dev/usb/lp0".into()])
    }

    async fn scan(
        &self,
        results: mpsc::UnboundedSender<ScanResult>,
        cancel: CancellationToken,
    ) -> PrintResult<()> {
        for result in &self.scan_results {
            let _ = results.send(result.clone());
        }
        cancel.cancelled().await;
        Ok(())
    }
}

#[derive(Debug)]
pub struct FakeTransport {
    handle: TransportHandle,
    written: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicUsize>,
    fail_writes: bool,
    fail_close: bool,
}

#[async_trait]
impl Transport for FakeTransport {
    fn handle(&self) -> &TransportHandle {
        &self.handle
    }

    async fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        if self.fail_writes {
            return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "paper jam").into());
        }
        self.written.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    async fn close(&mut self) -> PrintResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "link lost").into());
        }
        Ok(())
    }
}

pub fn usb_handle() -> TransportHandle {
    TransportHandle::Usb {
        path: "/dev/usb/lp0".into(),
    }
}

pub fn all_handles() -> Vec<TransportHandle> {
    vec![
        TransportHandle::BluetoothClassic {
            address: "00:11:22:33:44:55".into(),
        },
        TransportHandle::BluetoothLe {
            id: "AA:BB:CC:DD:EE:FF".into(),
        },
        usb_handle(),
        TransportHandle::Network {
            host: "192.168.1.100".into(),
            port: 9100,
        },
    ]
}

/// Session bound and connected over USB
pub async fn connected_session(service: Arc<FakeService>) -> ConnectionSession {
    let session = ConnectionSession::new(service);
    session.initialize().await.unwrap();
    session.connect(usb_handle()).await.unwrap();
    session
}
