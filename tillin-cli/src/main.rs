//! tillin-cli: drive ESC/POS printers from the command line
//!
//! ```text
//! tillin-cli usb-list
//! tillin-cli text "Bonjour" --net 192.168.1.100 --cut
//! tillin-cli script receipt.txt --bt 00:11:22:33:44:55
//! tillin-cli bridge --usb /dev/usb/lp0 < messages.jsonl
//! ```

mod logger;

use std::net::Ipv6Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use tillin_printer::bridge;
use tillin_printer::{
    Alignment, BarcodeOptions, ConnectionSession, DEFAULT_SCRIPT_ENCODING, DEFAULT_TEXT_ENCODING,
    HriPosition, ImageOptions, PrintEngine, PrinterConfig, ScriptOptions, Symbology, TextOptions,
    TransportHandle,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// JSON log output
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Also write daily rotating log files here
    #[arg(long, env = "LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Which printer to talk to
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
struct Target {
    /// Network printer, `host[:port]`
    #[arg(long)]
    net: Option<String>,

    /// USB printer device path
    #[arg(long)]
    usb: Option<String>,

    /// Paired Bluetooth classic address
    #[arg(long)]
    bt: Option<String>,

    /// BLE peripheral identifier
    #[arg(long)]
    ble: Option<String>,
}

impl Target {
    fn handle(&self, default_port: u16) -> Result<TransportHandle> {
        if let Some(net) = &self.net {
            let (host, port) = parse_host_port(net, default_port)?;
            return Ok(TransportHandle::Network {
                host: host.to_string(),
                port,
            });
        }
        if let Some(path) = &self.usb {
            return Ok(TransportHandle::Usb { path: path.clone() });
        }
        if let Some(address) = &self.bt {
            return Ok(TransportHandle::BluetoothClassic {
                address: address.clone(),
            });
        }
        if let Some(id) = &self.ble {
            return Ok(TransportHandle::BluetoothLe { id: id.clone() });
        }
        bail!("no printer selected")
    }
}

/// Split `host`, `host:port`, `v6`, `[v6]` or `[v6]:port`
fn parse_host_port(net: &str, default_port: u16) -> Result<(&str, u16)> {
    let parse_port = |port: &str| -> Result<u16> {
        port.parse()
            .with_context(|| format!("invalid port in {}", net))
    };

    if let Some(rest) = net.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("unclosed '[' in {}", net))?;
        let port = match tail {
            "" => default_port,
            _ => parse_port(
                tail.strip_prefix(':')
                    .ok_or_else(|| anyhow!("expected ':port' after ']' in {}", net))?,
            )?,
        };
        return Ok((host, port));
    }

    if net.parse::<Ipv6Addr>().is_ok() {
        return Ok((net, default_port));
    }

    match net.rsplit_once(':') {
        Some((host, _)) if host.contains(':') => {
            bail!("IPv6 address with a port must be written [addr]:port, got {}", net)
        }
        Some((host, port)) => Ok((host, parse_port(port)?)),
        None => Ok((net, default_port)),
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List USB printer device paths
    UsbList,

    /// List paired Bluetooth printers
    Paired,

    /// Discover BLE printers
    Scan {
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },

    /// Compile and print an escape script file
    Script {
        file: PathBuf,
        #[arg(long, default_value = DEFAULT_SCRIPT_ENCODING)]
        encoding: String,
        #[command(flatten)]
        target: Target,
    },

    /// Print a line of text
    Text {
        content: String,
        #[arg(long, default_value = DEFAULT_TEXT_ENCODING)]
        encoding: String,
        /// left, center or right
        #[arg(long)]
        align: Option<Alignment>,
        #[arg(long)]
        cut: bool,
        #[command(flatten)]
        target: Target,
    },

    /// Print a barcode
    Barcode {
        content: String,
        /// `GS k` symbology code (73 = CODE128)
        #[arg(long, default_value_t = 73)]
        symbology: u8,
        #[arg(long, default_value_t = 3)]
        width: u8,
        #[arg(long, default_value_t = 162)]
        height: u8,
        /// 0 none, 1 above, 2 below, 3 both
        #[arg(long, default_value_t = 2)]
        hri: u8,
        /// left, center or right
        #[arg(long)]
        align: Option<Alignment>,
        #[arg(long)]
        cut: bool,
        #[command(flatten)]
        target: Target,
    },

    /// Print an image file (PNG, JPEG, WebP)
    Image {
        file: PathBuf,
        /// left, center or right; anything else centers the image
        #[arg(long, default_value = "center")]
        align: String,
        /// Paper width in dots (defaults to PRINTER_PAPER_WIDTH_DOTS)
        #[arg(long)]
        paper_width: Option<u32>,
        #[arg(long)]
        cut: bool,
        #[command(flatten)]
        target: Target,
    },

    /// Print a logo centered on the paper, then cut
    Logo {
        file: PathBuf,
        #[command(flatten)]
        target: Target,
    },

    /// Send a file of raw bytes
    Raw {
        file: PathBuf,
        /// The file holds base64 text
        #[arg(long)]
        base64: bool,
        #[command(flatten)]
        target: Target,
    },

    /// Answer front-end print messages read as JSON lines on stdin
    Bridge {
        #[command(flatten)]
        target: Target,
    },
}

impl Command {
    fn target(&self) -> Option<&Target> {
        match self {
            Command::UsbList | Command::Paired | Command::Scan { .. } => None,
            Command::Script { target, .. }
            | Command::Text { target, .. }
            | Command::Barcode { target, .. }
            | Command::Image { target, .. }
            | Command::Logo { target, .. }
            | Command::Raw { target, .. }
            | Command::Bridge { target } => Some(target),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    logger::init_logger_with_file(&cli.log_level, cli.log_json, cli.log_dir.as_deref())?;

    let config = PrinterConfig::from_env();
    let session = ConnectionSession::native(config.clone());
    session
        .initialize()
        .await
        .context("printer service unavailable")?;

    let result = run(&session, config, cli.command).await;
    session.teardown().await;
    result
}

async fn run(session: &ConnectionSession, config: PrinterConfig, command: Command) -> Result<()> {
    if let Some(target) = command.target() {
        let handle = target.handle(config.network_port)?;
        session
            .connect(handle.clone())
            .await
            .with_context(|| format!("cannot reach {}", handle))?;
    }

    match command {
        Command::UsbList => {
            for path in session.usb_paths().await? {
                println!("{}", path);
            }
        }
        Command::Paired => {
            for device in session.paired_devices().await? {
                println!("{}\t{}", device.address, device.name);
            }
        }
        Command::Scan { seconds } => {
            session.start_scan()?;
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            session.stop_scan();
            for device in session.scan_results() {
                println!("{}\t{}", device.identifier, device.name);
            }
        }
        Command::Bridge { .. } => {
            let engine = PrintEngine::new(session.clone(), config);
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(reply) = bridge::handle_message(&engine, &line).await {
                    println!("{}", serde_json::to_string(&reply)?);
                }
            }
        }
        print => {
            let engine = PrintEngine::new(session.clone(), config);
            print_job(&engine, print).await?;
            info!("Printed");
        }
    }

    session.disconnect().await?;
    Ok(())
}

async fn print_job(engine: &PrintEngine, command: Command) -> Result<bool> {
    let printed = match command {
        Command::Script {
            file, encoding, ..
        } => {
            let script = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            engine
                .print_raw_script(&script, &ScriptOptions { encoding })
                .await?
        }
        Command::Text {
            content,
            encoding,
            align,
            cut,
            ..
        } => {
            let options = TextOptions {
                encoding,
                align,
                cut,
            };
            engine.print_text(&content, &options).await?
        }
        Command::Barcode {
            content,
            symbology,
            width,
            height,
            hri,
            align,
            cut,
            ..
        } => {
            let options = BarcodeOptions {
                symbology: Symbology(symbology),
                width,
                height,
                hri_position: HriPosition::from_code(hri)
                    .ok_or_else(|| anyhow!("HRI position must be 0..=3, got {}", hri))?,
                align,
                cut,
            };
            engine.print_barcode(&content, &options).await?
        }
        Command::Image {
            file,
            align,
            paper_width,
            cut,
            ..
        } => {
            let image = read_file(&file).await?;
            let options = ImageOptions {
                align: Alignment::from_name(&align),
                paper_width_dots: paper_width.unwrap_or(engine.config().paper_width_dots),
                cut,
            };
            engine.print_image_bytes(&image, &options).await?
        }
        Command::Logo { file, .. } => engine.print_logo(&read_file(&file).await?).await?,
        Command::Raw { file, base64, .. } => {
            let data = read_file(&file).await?;
            if base64 {
                let text = String::from_utf8(data).context("base64 file is not UTF-8")?;
                engine.print_raw_base64(&text).await?
            } else {
                engine.print_raw_bytes(&data).await?
            }
        }
        other => bail!("{:?} is not a print command", other),
    };
    Ok(printed)
}

async fn read_file(file: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(net: Option<&str>, usb: Option<&str>) -> Target {
        Target {
            net: net.map(String::from),
            usb: usb.map(String::from),
            bt: None,
            ble: None,
        }
    }

    #[test]
    fn test_net_target_port() {
        let handle = target(Some("10.0.0.5:9101"), None).handle(9100).unwrap();
        assert_eq!(
            handle,
            TransportHandle::Network {
                host: "10.0.0.5".into(),
                port: 9101
            }
        );
        let handle = target(Some("printer.local"), None).handle(9100).unwrap();
        assert_eq!(handle.to_string(), "tcp:printer.local:9100");
        assert!(target(Some("10.0.0.5:abc"), None).handle(9100).is_err());
    }

    #[test]
    fn test_net_target_ipv6() {
        assert_eq!(parse_host_port("::1", 9100).unwrap(), ("::1", 9100));
        assert_eq!(parse_host_port("[::1]", 9100).unwrap(), ("::1", 9100));
        assert_eq!(
            parse_host_port("[fe80::1]:9101", 9100).unwrap(),
            ("fe80::1", 9101)
        );
        assert!(parse_host_port("fe80::zz:1", 9100).is_err());
        assert!(parse_host_port("[::1", 9100).is_err());
        assert!(parse_host_port("[::1]9101", 9100).is_err());
    }

    #[test]
    fn test_usb_target() {
        let handle = target(None, Some("/dev/usb/lp0")).handle(9100).unwrap();
        assert_eq!(handle.kind(), "usb");
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "tillin-cli",
            "text",
            "Bonjour",
            "--net",
            "192.168.1.100",
            "--align",
            "center",
            "--cut",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Text {
                cut: true,
                align: Some(Alignment::Center),
                ..
            }
        ));

        // Misspelled alignment is an error, not a silent default
        assert!(
            Cli::try_parse_from(["tillin-cli", "text", "Hi", "--usb", "a", "--align", "cetner"])
                .is_err()
        );
        assert!(
            Cli::try_parse_from(["tillin-cli", "image", "logo.png", "--usb", "a", "--align", "x"])
                .is_ok()
        );

        // Exactly one printer
        assert!(Cli::try_parse_from(["tillin-cli", "raw", "job.bin"]).is_err());
        assert!(
            Cli::try_parse_from(["tillin-cli", "raw", "job.bin", "--usb", "a", "--bt", "b"])
                .is_err()
        );
    }
}
