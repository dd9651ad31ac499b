//! Connection session
//!
//! Owns the binding to the device service and at most one open transport.
//!
//! ```text
//! Uninitialized -> Binding -> Ready -> Connecting -> Connected
//!       ^             |         ^          |             |
//!       +-------------+         +----------+        Disconnecting
//!        (bind failed)          (open failed)            |
//!                               ^------------------------+
//! ```
//!
//! State lives behind a short synchronous lock that is never held across an
//! await. The open transport sits behind an async mutex so writes complete
//! in the order they were issued.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::PrinterConfig;
use crate::error::{PrintError, PrintResult};
use crate::transport::{
    DeviceService, NativeDeviceService, PairedDevice, ScanResult, Transport, TransportHandle,
};

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    Uninitialized,
    Binding,
    Ready,
    Connecting,
    Connected,
    Disconnecting,
}

impl ConnectionState {
    /// Whether the device service binding is established
    pub fn is_bound(self) -> bool {
        !matches!(
            self,
            ConnectionState::Uninitialized | ConnectionState::Binding
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Uninitialized => "uninitialized",
            ConnectionState::Binding => "binding",
            ConnectionState::Ready => "ready",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        };
        f.write_str(s)
    }
}

type BindWaiter = oneshot::Sender<Result<(), String>>;

struct Inner {
    state: ConnectionState,
    bind_waiters: Vec<BindWaiter>,
    active: Option<TransportHandle>,
    scan_cancel: Option<CancellationToken>,
}

struct Shared {
    service: Arc<dyn DeviceService>,
    inner: Mutex<Inner>,
    transport: tokio::sync::Mutex<Option<Box<dyn Transport>>>,
    state_tx: watch::Sender<ConnectionState>,
    scan_tx: watch::Sender<Vec<ScanResult>>,
}

impl Shared {
    fn set_state(&self, inner: &mut Inner, state: ConnectionState) {
        if inner.state != state {
            debug!(from = %inner.state, to = %state, "session state");
            inner.state = state;
            self.state_tx.send_replace(state);
        }
    }
}

/// A printer connection session
///
/// Cheap to clone; clones share the same binding and connection.
#[derive(Clone)]
pub struct ConnectionSession {
    shared: Arc<Shared>,
}

impl fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("ConnectionSession")
            .field("state", &inner.state)
            .field("active", &inner.active)
            .finish()
    }
}

impl ConnectionSession {
    pub fn new(service: Arc<dyn DeviceService>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Uninitialized);
        let (scan_tx, _) = watch::channel(Vec::new());
        Self {
            shared: Arc::new(Shared {
                service,
                inner: Mutex::new(Inner {
                    state: ConnectionState::Uninitialized,
                    bind_waiters: Vec::new(),
                    active: None,
                    scan_cancel: None,
                }),
                transport: tokio::sync::Mutex::new(None),
                state_tx,
                scan_tx,
            }),
        }
    }

    /// Session over the host's network, USB and Bluetooth stacks
    pub fn native(config: PrinterConfig) -> Self {
        Self::new(Arc::new(NativeDeviceService::new(config)))
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Handle of the open transport, if any
    pub fn active_handle(&self) -> Option<TransportHandle> {
        self.shared.inner.lock().active.clone()
    }

    /// Observe state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Observe discovery results as full snapshots
    pub fn subscribe_scan(&self) -> watch::Receiver<Vec<ScanResult>> {
        self.shared.scan_tx.subscribe()
    }

    /// Devices found by the current (or last) scan
    pub fn scan_results(&self) -> Vec<ScanResult> {
        self.shared.scan_tx.borrow().clone()
    }

    /// Bind the device service
    ///
    /// Resolves at once when already bound. Concurrent callers share a
    /// single binding attempt; if it fails every one of them gets
    /// `ServiceUnavailable` and a later call may try again.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> PrintResult<()> {
        let rx = {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                ConnectionState::Uninitialized => {
                    let (tx, rx) = oneshot::channel();
                    inner.bind_waiters.push(tx);
                    self.shared.set_state(&mut inner, ConnectionState::Binding);

                    let shared = self.shared.clone();
                    tokio::spawn(async move { run_bind(shared).await });
                    rx
                }
                ConnectionState::Binding => {
                    let (tx, rx) = oneshot::channel();
                    inner.bind_waiters.push(tx);
                    rx
                }
                _ => return Ok(()),
            }
        };

        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(PrintError::ServiceUnavailable(reason)),
            Err(_) => Err(PrintError::ServiceUnavailable(
                "binding was abandoned".to_string(),
            )),
        }
    }

    /// Open the transport `handle` names
    ///
    /// Rejected while another connection is live or a connect/disconnect is
    /// in flight; the live connection is left untouched.
    #[instrument(skip(self, handle), fields(handle = %handle))]
    pub async fn connect(&self, handle: TransportHandle) -> PrintResult<bool> {
        {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                ConnectionState::Uninitialized | ConnectionState::Binding => {
                    return Err(PrintError::ServiceNotReady);
                }
                ConnectionState::Ready => {
                    self.shared.set_state(&mut inner, ConnectionState::Connecting);
                }
                busy => {
                    warn!(state = %busy, "connect rejected");
                    return Err(PrintError::ConnectionFailed(format!(
                        "session is {}, disconnect first",
                        busy
                    )));
                }
            }
        }

        info!("Connecting");

        let mut transport = match self.shared.service.open(&handle).await {
            Ok(transport) => transport,
            Err(e) => {
                let mut inner = self.shared.inner.lock();
                if inner.state == ConnectionState::Connecting {
                    self.shared.set_state(&mut inner, ConnectionState::Ready);
                }
                warn!(error = %e, "Connect failed");
                return Err(match e {
                    PrintError::ConnectionFailed(_) => e,
                    other => PrintError::ConnectionFailed(other.to_string()),
                });
            }
        };

        let mut slot = self.shared.transport.lock().await;
        {
            let mut inner = self.shared.inner.lock();
            if inner.state == ConnectionState::Connecting {
                inner.active = Some(handle);
                self.shared.set_state(&mut inner, ConnectionState::Connected);
                *slot = Some(transport);
                info!("Connected");
                return Ok(true);
            }
        }
        drop(slot);

        // Torn down while the transport was opening
        if let Err(e) = transport.close().await {
            warn!(error = %e, "Failed to close abandoned transport");
        }
        Err(PrintError::ConnectionFailed(
            "session was torn down while connecting".to_string(),
        ))
    }

    /// Close the open transport, if any. Always succeeds.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) -> PrintResult<bool> {
        {
            let mut inner = self.shared.inner.lock();
            if inner.state != ConnectionState::Connected {
                return Ok(true);
            }
            self.shared
                .set_state(&mut inner, ConnectionState::Disconnecting);
        }

        // Waits for in-flight writes
        let transport = self.shared.transport.lock().await.take();
        if let Some(mut transport) = transport
            && let Err(e) = transport.close().await
        {
            warn!(error = %e, "Transport close failed");
        }

        let mut inner = self.shared.inner.lock();
        inner.active = None;
        if inner.state == ConnectionState::Disconnecting {
            self.shared.set_state(&mut inner, ConnectionState::Ready);
        }
        info!("Disconnected");
        Ok(true)
    }

    /// Send bytes on the open transport
    ///
    /// The transport's result is returned as is; nothing is retried.
    #[instrument(skip(self, data), fields(data_len = data.len()))]
    pub async fn write(&self, data: &[u8]) -> PrintResult<()> {
        if !self.is_connected() {
            return Err(PrintError::NotConnected);
        }

        let mut slot = self.shared.transport.lock().await;
        let transport = slot.as_mut().ok_or(PrintError::NotConnected)?;
        transport.write(data).await.inspect_err(|e| {
            warn!(error = %e, "Write failed");
        })
    }

    /// Paired Bluetooth classic devices
    pub async fn paired_devices(&self) -> PrintResult<Vec<PairedDevice>> {
        self.ensure_bound()?;
        self.shared.service.paired_devices().await
    }

    /// USB printer device paths
    pub async fn usb_paths(&self) -> PrintResult<Vec<String>> {
        self.ensure_bound()?;
        self.shared.service.usb_paths().await
    }

    /// Start BLE discovery, replacing any scan in progress
    ///
    /// Results are published through [`subscribe_scan`](Self::subscribe_scan).
    /// A failing scan is logged and leaves the result list empty.
    pub fn start_scan(&self) -> PrintResult<()> {
        let cancel = {
            let mut inner = self.shared.inner.lock();
            if !inner.state.is_bound() {
                return Err(PrintError::ServiceNotReady);
            }
            if let Some(previous) = inner.scan_cancel.take() {
                previous.cancel();
            }
            let token = CancellationToken::new();
            inner.scan_cancel = Some(token.clone());
            token
        };

        self.shared.scan_tx.send_replace(Vec::new());
        info!("BLE scan started");

        let (results_tx, mut results_rx) = mpsc::unbounded_channel();

        let service = self.shared.service.clone();
        let scan_cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = service.scan(results_tx, scan_cancel).await {
                warn!(error = %e, "BLE scan failed");
            }
        });

        let shared = self.shared.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    result = results_rx.recv() => match result {
                        Some(result) => {
                            publish_scan_result(&shared.scan_tx, &cancel, result);
                        }
                        None => break,
                    },
                }
            }
        });

        Ok(())
    }

    /// Cancel discovery; results found so far stay readable
    pub fn stop_scan(&self) {
        if let Some(cancel) = self.shared.inner.lock().scan_cancel.take() {
            cancel.cancel();
            info!("BLE scan stopped");
        }
    }

    /// Disconnect, stop discovery and release the device service
    #[instrument(skip(self))]
    pub async fn teardown(&self) {
        self.stop_scan();
        if let Err(e) = self.disconnect().await {
            warn!(error = %e, "Disconnect during teardown failed");
        }

        let was_bound = {
            let mut inner = self.shared.inner.lock();
            let was_bound = inner.state.is_bound();
            // Dropped senders fail pending initialize calls
            inner.bind_waiters.clear();
            inner.active = None;
            self.shared
                .set_state(&mut inner, ConnectionState::Uninitialized);
            was_bound
        };

        let transport = self.shared.transport.lock().await.take();
        if let Some(mut transport) = transport
            && let Err(e) = transport.close().await
        {
            warn!(error = %e, "Transport close failed");
        }

        if was_bound {
            self.shared.service.unbind().await;
        }
        info!("Session torn down");
    }

    fn ensure_bound(&self) -> PrintResult<()> {
        if self.state().is_bound() {
            Ok(())
        } else {
            Err(PrintError::ServiceNotReady)
        }
    }
}

async fn run_bind(shared: Arc<Shared>) {
    let result = shared.service.bind().await;

    let waiters = {
        let mut inner = shared.inner.lock();
        if inner.state == ConnectionState::Binding {
            match &result {
                Ok(()) => {
                    shared.set_state(&mut inner, ConnectionState::Ready);
                    info!("Device service bound");
                }
                Err(e) => {
                    shared.set_state(&mut inner, ConnectionState::Uninitialized);
                    warn!(error = %e, "Device service binding failed");
                }
            }
            Some(std::mem::take(&mut inner.bind_waiters))
        } else {
            None
        }
    };

    // Torn down meanwhile; waiters were already released
    let Some(waiters) = waiters else {
        if result.is_ok() {
            shared.service.unbind().await;
        }
        return;
    };

    let outcome = result.map_err(|e| match e {
        PrintError::ServiceUnavailable(reason) => reason,
        other => other.to_string(),
    });
    for waiter in waiters {
        let _ = waiter.send(outcome.clone());
    }
}

/// Merge a sighting unless its scan was cancelled
///
/// The check runs under the channel lock, so a sighting from a replaced
/// scan can never land in the list the new scan just reset.
fn publish_scan_result(
    scan_tx: &watch::Sender<Vec<ScanResult>>,
    cancel: &CancellationToken,
    result: ScanResult,
) -> bool {
    scan_tx.send_if_modified(|list| {
        if cancel.is_cancelled() {
            return false;
        }
        merge_scan_result(list, result);
        true
    })
}

/// Collapse duplicate identifiers, the latest name wins
fn merge_scan_result(list: &mut Vec<ScanResult>, result: ScanResult) {
    match list.iter_mut().find(|r| r.identifier == result.identifier) {
        Some(existing) => existing.name = result.name,
        None => list.push(result),
    }
}
