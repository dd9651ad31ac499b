//! USB printer class transport
//!
//! The kernel exposes USB printers as character devices (`/dev/usb/lp0`).
//! Writing to the node sends bytes to the printer's bulk OUT endpoint.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use super::{Transport, TransportHandle};
use crate::error::{PrintError, PrintResult};

/// List printer device nodes (`lpN`) found in `dirs`
///
/// Missing directories are skipped. Paths are returned sorted and unique.
pub async fn list_usb_paths(dirs: &[PathBuf]) -> PrintResult<Vec<String>> {
    let mut paths = Vec::new();

    for dir in dirs {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(dir = %dir.display(), "USB device directory missing");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if is_printer_node(&name.to_string_lossy()) {
                paths.push(entry.path().to_string_lossy().into_owned());
            }
        }
    }

    paths.sort();
    paths.dedup();
    Ok(paths)
}

fn is_printer_node(name: &str) -> bool {
    name.strip_prefix("lp")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// An open USB printer device
#[derive(Debug)]
pub struct UsbTransport {
    handle: TransportHandle,
    file: Option<File>,
}

impl UsbTransport {
    /// Open the device node within `timeout`
    #[instrument]
    pub async fn open(path: &Path, timeout: Duration) -> PrintResult<Self> {
        let file = tokio::time::timeout(timeout, OpenOptions::new().write(true).open(path))
            .await
            .map_err(|_| {
                PrintError::ConnectionFailed(format!("Connection timeout: {}", path.display()))
            })?
            .map_err(|e| PrintError::ConnectionFailed(format!("{}: {}", path.display(), e)))?;

        info!("USB printer opened");

        Ok(Self {
            handle: TransportHandle::Usb {
                path: path.to_string_lossy().into_owned(),
            },
            file: Some(file),
        })
    }
}

#[async_trait]
impl Transport for UsbTransport {
    fn handle(&self) -> &TransportHandle {
        &self.handle
    }

    #[instrument(skip(self, data), fields(handle = %self.handle, data_len = data.len()))]
    async fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        let file = self.file.as_mut().ok_or(PrintError::NotConnected)?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> PrintResult<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printer_node_names() {
        assert!(is_printer_node("lp0"));
        assert!(is_printer_node("lp12"));
        assert!(!is_printer_node("lp"));
        assert!(!is_printer_node("lpx"));
        assert!(!is_printer_node("tty0"));
    }

    #[tokio::test]
    async fn test_list_and_write() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lp1"), b"").unwrap();
        std::fs::write(dir.path().join("lp0"), b"").unwrap();
        std::fs::write(dir.path().join("ttyS0"), b"").unwrap();

        let dirs = vec![dir.path().to_path_buf(), dir.path().join("missing")];
        let paths = list_usb_paths(&dirs).await.unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("lp0"));

        let mut transport = UsbTransport::open(Path::new(&paths[0]), Duration::from_secs(2))
            .await
            .unwrap();
        transport.write(&[0x1B, 0x40]).await.unwrap();
        transport.close().await.unwrap();

        assert_eq!(std::fs::read(&paths[0]).unwrap(), vec![0x1B, 0x40]);
    }

    #[tokio::test]
    async fn test_open_missing_device() {
        let dir = tempfile::tempdir().unwrap();
        let err = UsbTransport::open(&dir.path().join("lp9"), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, PrintError::ConnectionFailed(_)));
    }

    /// A FIFO with no reader blocks `open` like a printer that never answers
    #[cfg(unix)]
    #[tokio::test]
    async fn test_open_times_out() {
        use std::os::unix::ffi::OsStrExt;
        use std::os::unix::fs::OpenOptionsExt;

        let dir = tempfile::tempdir().unwrap();
        let node = dir.path().join("lp0");
        let c_path = std::ffi::CString::new(node.as_os_str().as_bytes()).unwrap();
        assert_eq!(unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) }, 0);

        let started = std::time::Instant::now();
        let err = UsbTransport::open(&node, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, PrintError::ConnectionFailed(_)));
        assert!(started.elapsed() < Duration::from_secs(2));

        // Let the abandoned open finish
        let _reader = std::fs::OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&node)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
