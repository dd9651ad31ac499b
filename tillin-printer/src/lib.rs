//! # tillin-printer
//!
//! ESC/POS thermal printer bridge: print-job compiler plus a single-connection
//! session over Bluetooth, USB and TCP printers.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - Charset resolution (PC850/PC858, Latin-1, any WHATWG encoding)
//! - Escape script compilation (`\x1B\x40 ; init`)
//! - ESC/POS command building for text, barcodes and raster images
//! - Transports: network (TCP 9100), USB, Bluetooth classic, BLE (feature `ble`)
//! - Connection lifecycle (bind, connect, write, disconnect)
//! - Front-end `print` message handling
//!
//! Receipt layout stays in application code.
//!
//! ## Example
//!
//! ```ignore
//! use tillin_printer::{
//!     ConnectionSession, PrintEngine, PrinterConfig, TextOptions, TransportHandle,
//! };
//!
//! let config = PrinterConfig::from_env();
//! let session = ConnectionSession::native(config.clone());
//! session.initialize().await?;
//! session
//!     .connect(TransportHandle::Network { host: "192.168.1.100".into(), port: 9100 })
//!     .await?;
//!
//! let engine = PrintEngine::new(session.clone(), config);
//! engine.print_text("Bonjour", &TextOptions { cut: true, ..Default::default() }).await?;
//! session.disconnect().await?;
//! ```

pub mod bridge;
mod config;
pub mod encoding;
mod engine;
mod error;
pub mod escpos;
pub mod raster;
mod request;
pub mod script;
mod session;
pub mod transport;

// Re-exports
pub use config::{DEFAULT_NETWORK_PORT, PrinterConfig};
pub use encoding::{CharsetProfile, Codec};
pub use engine::{PrintEngine, decode_base64};
pub use error::{PrintError, PrintResult};
pub use escpos::{ByteStream, EscPosBuilder};
pub use request::{
    Alignment, BarcodeOptions, DEFAULT_PAPER_WIDTH_DOTS, DEFAULT_SCRIPT_ENCODING,
    DEFAULT_TEXT_ENCODING, HriPosition, ImageOptions, PrintRequest, ScriptOptions, Symbology,
    TextOptions,
};
pub use session::{ConnectionSession, ConnectionState};
pub use transport::{
    DeviceService, NativeDeviceService, PairedDevice, ScanResult, Transport, TransportHandle,
};
