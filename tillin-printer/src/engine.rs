//! Print engine
//!
//! Entry point for printing: checks the connection, compiles the job, writes
//! it on the session and reports the transport's verdict.
//!
//! A job is never compiled when no printer is connected, so `NotConnected`
//! wins over encoding or image errors.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::{info, instrument};

use crate::config::PrinterConfig;
use crate::error::{PrintError, PrintResult};
use crate::escpos::{self, ByteStream};
use crate::request::{
    Alignment, BarcodeOptions, ImageOptions, PrintRequest, ScriptOptions, TextOptions,
};
use crate::script;
use crate::session::ConnectionSession;

/// Strip an optional `data:…;base64,` prefix and decode
pub fn decode_base64(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let payload = match text.find("base64,") {
        Some(idx) => &text[idx + "base64,".len()..],
        None => text,
    };
    let cleaned: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    STANDARD.decode(cleaned)
}

#[derive(Debug, Clone)]
pub struct PrintEngine {
    session: ConnectionSession,
    config: PrinterConfig,
}

impl PrintEngine {
    pub fn new(session: ConnectionSession, config: PrinterConfig) -> Self {
        Self { session, config }
    }

    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    pub fn config(&self) -> &PrinterConfig {
        &self.config
    }

    /// Print any request
    #[instrument(skip(self, request), fields(kind = request.kind()))]
    pub async fn print(&self, request: &PrintRequest) -> PrintResult<bool> {
        self.submit(request.kind(), || escpos::build_request(request))
            .await
    }

    /// Print a line of text
    #[instrument(skip(self, content, options), fields(len = content.len()))]
    pub async fn print_text(&self, content: &str, options: &TextOptions) -> PrintResult<bool> {
        self.submit("text", || escpos::build_text(content, options))
            .await
    }

    #[instrument(skip(self, content, options), fields(len = content.len()))]
    pub async fn print_barcode(
        &self,
        content: &str,
        options: &BarcodeOptions,
    ) -> PrintResult<bool> {
        self.submit("barcode", || escpos::build_barcode(content, options))
            .await
    }

    /// Print a base64 image source (data URLs accepted)
    #[instrument(skip(self, source, options), fields(len = source.len()))]
    pub async fn print_image(&self, source: &str, options: &ImageOptions) -> PrintResult<bool> {
        self.submit("image", || {
            let bytes =
                decode_base64(source).map_err(|e| PrintError::ImageDecode(e.to_string()))?;
            escpos::build_image(&bytes, options)
        })
        .await
    }

    /// Print an encoded image (PNG, JPEG, WebP)
    #[instrument(skip(self, image, options), fields(len = image.len()))]
    pub async fn print_image_bytes(
        &self,
        image: &[u8],
        options: &ImageOptions,
    ) -> PrintResult<bool> {
        self.submit("image", || escpos::build_image(image, options))
            .await
    }

    /// Compile and print an escape script
    #[instrument(skip(self, script, options), fields(len = script.len(), encoding = %options.encoding))]
    pub async fn print_raw_script(
        &self,
        script: &str,
        options: &ScriptOptions,
    ) -> PrintResult<bool> {
        self.submit("script", || script::compile(script, &options.encoding))
            .await
    }

    /// Print bytes untouched
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub async fn print_raw_bytes(&self, bytes: &[u8]) -> PrintResult<bool> {
        self.submit("raw", || Ok(ByteStream::from(bytes.to_vec())))
            .await
    }

    /// Decode base64 (data URLs accepted) and print the bytes untouched
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub async fn print_raw_base64(&self, text: &str) -> PrintResult<bool> {
        self.submit("raw", || {
            let bytes = decode_base64(text)
                .map_err(|e| PrintError::InvalidRequest(format!("bad base64: {}", e)))?;
            Ok(ByteStream::from(bytes))
        })
        .await
    }

    /// Print a bundled sample script with the configured script encoding
    pub async fn print_sample_script(&self, text: &str) -> PrintResult<bool> {
        let options = ScriptOptions {
            encoding: self.config.script_encoding.clone(),
        };
        self.print_raw_script(text, &options).await
    }

    /// Print a logo centered on the full paper width, then cut
    pub async fn print_logo(&self, image: &[u8]) -> PrintResult<bool> {
        let options = ImageOptions {
            align: Alignment::Center,
            paper_width_dots: self.config.paper_width_dots,
            cut: true,
        };
        self.print_image_bytes(image, &options).await
    }

    async fn submit(
        &self,
        kind: &'static str,
        build: impl FnOnce() -> PrintResult<ByteStream>,
    ) -> PrintResult<bool> {
        if !self.session.is_connected() {
            return Err(PrintError::NotConnected);
        }

        let data = build()?.into_bytes();
        self.session.write(&data).await?;

        info!(kind, bytes = data.len(), "Print job sent");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base64_variants() {
        assert_eq!(decode_base64("SGk=").unwrap(), b"Hi");
        assert_eq!(
            decode_base64("data:application/octet-stream;base64,SGk=").unwrap(),
            b"Hi"
        );
        assert_eq!(decode_base64("SG\nk=\n").unwrap(), b"Hi");
        assert!(decode_base64("***").is_err());
    }

    #[tokio::test]
    async fn test_not_connected_before_compiling() {
        let engine = PrintEngine::new(
            ConnectionSession::native(PrinterConfig::default()),
            PrinterConfig::default(),
        );
        let options = TextOptions {
            encoding: "no-such-charset".into(),
            ..Default::default()
        };
        assert!(matches!(
            engine.print_text("Hi", &options).await,
            Err(PrintError::NotConnected)
        ));
        assert!(matches!(
            engine.print_raw_base64("***").await,
            Err(PrintError::NotConnected)
        ));
    }
}
