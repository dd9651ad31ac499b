//! Network transport (raw TCP, port 9100)
//!
//! Most thermal printers accept raw ESC/POS on TCP port 9100.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{info, instrument, warn};

use super::{Transport, TransportHandle};
use crate::error::{PrintError, PrintResult};

/// An open TCP connection to a printer
#[derive(Debug)]
pub struct NetworkTransport {
    handle: TransportHandle,
    stream: Option<TcpStream>,
}

impl NetworkTransport {
    /// Connect to `host:port` within `timeout`
    #[instrument(fields(addr = %format!("{}:{}", host, port)))]
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> PrintResult<Self> {
        if host.is_empty() {
            return Err(PrintError::InvalidConfig("empty printer host".to_string()));
        }

        info!("Connecting to printer");

        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                PrintError::ConnectionFailed(format!("Connection timeout: {}:{}", host, port))
            })?
            .map_err(|e| PrintError::ConnectionFailed(format!("{}:{}: {}", host, port, e)))?;

        // Small ESC/POS jobs should leave immediately
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "Could not disable Nagle");
        }

        info!("Connected");

        Ok(Self {
            handle: TransportHandle::Network {
                host: host.to_string(),
                port,
            },
            stream: Some(stream),
        })
    }
}

#[async_trait]
impl Transport for NetworkTransport {
    fn handle(&self) -> &TransportHandle {
        &self.handle
    }

    #[instrument(skip(self, data), fields(handle = %self.handle, data_len = data.len()))]
    async fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        let stream = self.stream.as_mut().ok_or(PrintError::NotConnected)?;

        stream.write_all(data).await.map_err(|e| {
            PrintError::TransportIo(std::io::Error::new(
                e.kind(),
                format!("Write failed: {}", e),
            ))
        })?;
        stream.flush().await?;

        info!("Print job sent successfully");
        Ok(())
    }

    async fn close(&mut self) -> PrintResult<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_write_reaches_printer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).await.unwrap();
            received
        });

        let mut transport = NetworkTransport::connect("127.0.0.1", port, Duration::from_secs(2))
            .await
            .unwrap();
        transport.write(&[0x1B, 0x40, b'A']).await.unwrap();
        transport.close().await.unwrap();

        assert_eq!(server.await.unwrap(), vec![0x1B, 0x40, b'A']);
    }

    #[tokio::test]
    async fn test_refused_is_connection_failed() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = NetworkTransport::connect("127.0.0.1", port, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, PrintError::ConnectionFailed(_)));
    }

    #[tokio::test]
    async fn test_write_after_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut transport = NetworkTransport::connect("127.0.0.1", port, Duration::from_secs(2))
            .await
            .unwrap();
        transport.close().await.unwrap();
        assert!(matches!(
            transport.write(b"x").await,
            Err(PrintError::NotConnected)
        ));
    }
}
