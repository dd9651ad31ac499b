//! Bluetooth classic (SPP) transport
//!
//! Paired printers are reached through RFCOMM tty bindings. A binding is
//! created outside this process (`rfcomm bind 0 <address>`) and shows up as:
//!
//! - `/sys/class/tty/rfcommN/address` holding the remote address
//! - `/dev/rfcommN` carrying the serial stream
//!
//! The tty is switched to raw mode so ESC/POS bytes pass unmodified. XON/XOFF
//! must be off since `0x11`/`0x13` appear in raster data.
//!
//! Large jobs are written in chunks with a short delay so the radio buffer
//! does not overflow.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use super::{PairedDevice, Transport, TransportHandle};
use crate::error::{PrintError, PrintResult};

/// Where RFCOMM bindings live and how to pace writes
#[derive(Debug, Clone)]
pub struct RfcommOptions {
    pub sysfs_dir: PathBuf,
    pub dev_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_delay: Duration,
    pub connect_timeout: Duration,
}

/// List RFCOMM bindings as paired devices
///
/// The device name is the tty name (`rfcomm0`). A missing sysfs directory
/// means no bindings, not an error.
pub async fn list_bound_devices(sysfs_dir: &Path) -> PrintResult<Vec<PairedDevice>> {
    let mut devices = Vec::new();

    let mut entries = match tokio::fs::read_dir(sysfs_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(devices),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with("rfcomm") {
            continue;
        }
        match tokio::fs::read_to_string(entry.path().join("address")).await {
            Ok(address) => devices.push(PairedDevice {
                name,
                address: address.trim().to_uppercase(),
            }),
            Err(e) => debug!(tty = %name, error = %e, "RFCOMM binding without address"),
        }
    }

    devices.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(devices)
}

/// An open RFCOMM serial channel
#[derive(Debug)]
pub struct RfcommTransport {
    handle: TransportHandle,
    file: Option<File>,
    chunk_size: usize,
    chunk_delay: Duration,
}

impl RfcommTransport {
    /// Open the tty bound to `address`
    #[instrument(skip(options))]
    pub async fn open(address: &str, options: &RfcommOptions) -> PrintResult<Self> {
        let bound = list_bound_devices(&options.sysfs_dir).await?;
        let device = bound
            .iter()
            .find(|d| d.address.eq_ignore_ascii_case(address))
            .ok_or_else(|| {
                PrintError::ConnectionFailed(format!("{} is not bound to an RFCOMM tty", address))
            })?;

        // Opening the tty blocks until the radio link is up
        let path = options.dev_dir.join(&device.name);
        let tty = path.clone();
        let opening = tokio::task::spawn_blocking(move || -> PrintResult<std::fs::File> {
            let file = std::fs::OpenOptions::new()
                .write(true)
                .open(&tty)
                .map_err(|e| PrintError::ConnectionFailed(format!("{}: {}", tty.display(), e)))?;
            configure_raw(&file)?;
            Ok(file)
        });

        let file = tokio::time::timeout(options.connect_timeout, opening)
            .await
            .map_err(|_| {
                PrintError::ConnectionFailed(format!("Connection timeout: {}", path.display()))
            })?
            .map_err(|e| PrintError::ConnectionFailed(format!("{}: {}", path.display(), e)))??;

        info!(tty = %path.display(), "Bluetooth printer opened");

        Ok(Self {
            handle: TransportHandle::BluetoothClassic {
                address: device.address.clone(),
            },
            file: Some(File::from_std(file)),
            chunk_size: options.chunk_size.max(1),
            chunk_delay: options.chunk_delay,
        })
    }
}

#[async_trait]
impl Transport for RfcommTransport {
    fn handle(&self) -> &TransportHandle {
        &self.handle
    }

    #[instrument(skip(self, data), fields(handle = %self.handle, data_len = data.len()))]
    async fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        let file = self.file.as_mut().ok_or(PrintError::NotConnected)?;

        let mut chunks = data.chunks(self.chunk_size).peekable();
        while let Some(chunk) = chunks.next() {
            file.write_all(chunk).await?;
            if chunks.peek().is_some() && !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
        }
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

/// Put a tty into raw 8N1 mode; non-tty files are left alone
#[cfg(unix)]
fn configure_raw(file: &std::fs::File) -> PrintResult<()> {
    use std::mem::MaybeUninit;
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    if unsafe { libc::isatty(fd) } != 1 {
        debug!("not a tty, skipping raw mode");
        return Ok(());
    }

    let mut termios = MaybeUninit::uninit();
    if unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) } != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    let mut termios = unsafe { termios.assume_init() };

    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);
    termios.c_oflag &= !libc::OPOST;
    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
    termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
    termios.c_cflag |= libc::CS8;

    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) } != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(not(unix))]
fn configure_raw(_file: &std::fs::File) -> PrintResult<()> {
    Ok(())
}
