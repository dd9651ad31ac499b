//! Printer configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::request::{DEFAULT_PAPER_WIDTH_DOTS, DEFAULT_SCRIPT_ENCODING};

/// Raw TCP printing port used by nearly every network thermal printer
pub const DEFAULT_NETWORK_PORT: u16 = 9100;

/// Configuration for the native device service and print defaults
#[derive(Debug, Clone)]
pub struct PrinterConfig {
    /// TCP port when a network handle does not specify one
    pub network_port: u16,

    /// Timeout for opening a transport
    pub connect_timeout: Duration,

    /// Directories scanned for USB printer devices (`lp*`)
    pub usb_dirs: Vec<PathBuf>,

    /// sysfs directory holding `rfcommN/address` bindings
    pub rfcomm_sysfs_dir: PathBuf,

    /// Directory holding the `rfcommN` device nodes
    pub rfcomm_dev_dir: PathBuf,

    /// Bytes per write on Bluetooth classic
    pub bt_chunk_size: usize,

    /// Delay between Bluetooth classic chunks
    pub bt_chunk_delay: Duration,

    /// Bytes per BLE characteristic write
    pub ble_chunk_size: usize,

    /// Paper width in dots for logo printing
    pub paper_width_dots: u32,

    /// Encoding for bundled sample scripts and bridge messages
    pub script_encoding: String,
}

impl PrinterConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            network_port: env_parse("PRINTER_NETWORK_PORT").unwrap_or(defaults.network_port),
            connect_timeout: env_parse("PRINTER_CONNECT_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.connect_timeout),
            usb_dirs: std::env::var("PRINTER_USB_DIRS")
                .map(|v| {
                    v.split(':')
                        .filter(|s| !s.is_empty())
                        .map(PathBuf::from)
                        .collect()
                })
                .unwrap_or(defaults.usb_dirs),
            rfcomm_sysfs_dir: std::env::var("PRINTER_RFCOMM_SYSFS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.rfcomm_sysfs_dir),
            rfcomm_dev_dir: std::env::var("PRINTER_RFCOMM_DEV_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.rfcomm_dev_dir),
            bt_chunk_size: env_parse("PRINTER_BT_CHUNK_SIZE").unwrap_or(defaults.bt_chunk_size),
            bt_chunk_delay: env_parse("PRINTER_BT_CHUNK_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.bt_chunk_delay),
            ble_chunk_size: env_parse("PRINTER_BLE_CHUNK_SIZE").unwrap_or(defaults.ble_chunk_size),
            paper_width_dots: env_parse("PRINTER_PAPER_WIDTH_DOTS")
                .unwrap_or(defaults.paper_width_dots),
            script_encoding: std::env::var("PRINTER_SCRIPT_ENCODING")
                .unwrap_or(defaults.script_encoding),
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Replace the USB device directories
    pub fn with_usb_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.usb_dirs = dirs;
        self
    }

    /// Point Bluetooth classic lookups at other sysfs/dev directories
    pub fn with_rfcomm_dirs(mut self, sysfs: impl Into<PathBuf>, dev: impl Into<PathBuf>) -> Self {
        self.rfcomm_sysfs_dir = sysfs.into();
        self.rfcomm_dev_dir = dev.into();
        self
    }

    pub fn with_script_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.script_encoding = encoding.into();
        self
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            network_port: DEFAULT_NETWORK_PORT,
            connect_timeout: Duration::from_secs(5),
            usb_dirs: vec![PathBuf::from("/dev/usb"), PathBuf::from("/dev")],
            rfcomm_sysfs_dir: PathBuf::from("/sys/class/tty"),
            rfcomm_dev_dir: PathBuf::from("/dev"),
            bt_chunk_size: 4096,
            bt_chunk_delay: Duration::from_millis(20),
            ble_chunk_size: 20,
            paper_width_dots: DEFAULT_PAPER_WIDTH_DOTS,
            script_encoding: DEFAULT_SCRIPT_ENCODING.to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
