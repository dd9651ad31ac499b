//! ESC/POS command builder
//!
//! Provides a fluent API for building ESC/POS print data as an ordered list
//! of fragments, plus the fixed fragment order for each structured request:
//!
//! - text: init, [align], payload, feed, [cut]
//! - barcode: init, [align], HRI, width, height, payload, feed, [cut]
//! - image: init, raster, [cut]

use tracing::{debug, instrument};

use crate::encoding::{self, CharsetProfile};
use crate::error::{PrintError, PrintResult};
use crate::request::{
    Alignment, BarcodeOptions, HriPosition, ImageOptions, PrintRequest, Symbology, TextOptions,
};
use crate::script;

/// Ordered byte fragments making up one print job
///
/// Concatenation order is significant. The stream is built completely before
/// it is handed to a transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteStream {
    fragments: Vec<Vec<u8>>,
}

impl ByteStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment (empty fragments are dropped)
    pub fn push(&mut self, fragment: Vec<u8>) {
        if !fragment.is_empty() {
            self.fragments.push(fragment);
        }
    }

    pub fn fragments(&self) -> &[Vec<u8>] {
        &self.fragments
    }

    /// Total byte length
    pub fn len(&self) -> usize {
        self.fragments.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Concatenate all fragments in order
    pub fn to_bytes(&self) -> Vec<u8> {
        self.fragments.concat()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.fragments.concat()
    }
}

impl From<Vec<u8>> for ByteStream {
    fn from(bytes: Vec<u8>) -> Self {
        let mut stream = ByteStream::new();
        stream.push(bytes);
        stream
    }
}

/// ESC/POS command builder
///
/// Every call appends one fragment.
#[derive(Debug, Default)]
pub struct EscPosBuilder {
    stream: ByteStream,
}

impl EscPosBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    // === Printer Control ===

    /// Initialize printer (ESC @)
    pub fn init(&mut self) -> &mut Self {
        self.stream.push(vec![0x1B, 0x40]);
        self
    }

    /// Select justification (ESC a n)
    pub fn align(&mut self, align: Alignment) -> &mut Self {
        self.stream.push(vec![0x1B, 0x61, align.code()]);
        self
    }

    // === Text Output ===

    /// Write text encoded with `profile`
    pub fn text(&mut self, profile: &CharsetProfile, s: &str) -> &mut Self {
        self.stream.push(profile.encode(s));
        self
    }

    /// Print buffer and feed one line (LF)
    pub fn feed_line(&mut self) -> &mut Self {
        self.stream.push(vec![0x0A]);
        self
    }

    // === Paper Control ===

    /// Feed `lines` then cut (GS V 66 n)
    pub fn cut_feed(&mut self, lines: u8) -> &mut Self {
        self.stream.push(vec![0x1D, 0x56, 0x42, lines]);
        self
    }

    /// Cut with the fixed single-line feed
    pub fn cut(&mut self) -> &mut Self {
        self.cut_feed(1)
    }

    // === Barcode ===

    /// Select HRI character position (GS H n)
    pub fn hri_position(&mut self, position: HriPosition) -> &mut Self {
        self.stream.push(vec![0x1D, 0x48, position.code()]);
        self
    }

    /// Set module width (GS w n)
    pub fn barcode_width(&mut self, width: u8) -> &mut Self {
        self.stream.push(vec![0x1D, 0x77, width]);
        self
    }

    /// Set bar height (GS h n)
    pub fn barcode_height(&mut self, height: u8) -> &mut Self {
        self.stream.push(vec![0x1D, 0x68, height]);
        self
    }

    /// Print a barcode (GS k)
    ///
    /// Symbologies >= 65 use `GS k m n d1..dn`, older ones `GS k m d1..dk NUL`.
    pub fn barcode(&mut self, symbology: Symbology, data: &[u8]) -> PrintResult<&mut Self> {
        let mut cmd = vec![0x1D, 0x6B, symbology.code()];
        if symbology.is_length_prefixed() {
            let len = u8::try_from(data.len()).map_err(|_| {
                PrintError::InvalidRequest(format!(
                    "barcode payload is {} bytes, length-prefixed form allows 255",
                    data.len()
                ))
            })?;
            cmd.push(len);
            cmd.extend_from_slice(data);
        } else {
            cmd.extend_from_slice(data);
            cmd.push(0x00);
        }
        self.stream.push(cmd);
        Ok(self)
    }

    // === Raw Commands ===

    /// Write raw bytes directly
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.stream.push(bytes.to_vec());
        self
    }

    // === Build ===

    pub fn build(self) -> ByteStream {
        self.stream
    }
}

/// Build a text job: init, [align], text, feed, [cut]
#[instrument(skip(content), fields(len = content.len(), encoding = %options.encoding))]
pub fn build_text(content: &str, options: &TextOptions) -> PrintResult<ByteStream> {
    let profile = encoding::resolve(&options.encoding)?;

    let mut b = EscPosBuilder::new();
    b.init();
    if let Some(align) = options.align {
        b.align(align);
    }
    b.text(&profile, content).feed_line();
    if options.cut {
        b.cut();
    }
    Ok(b.build())
}

/// Build a barcode job: init, [align], HRI, width, height, barcode, feed, [cut]
#[instrument(skip(content), fields(symbology = options.symbology.code()))]
pub fn build_barcode(content: &str, options: &BarcodeOptions) -> PrintResult<ByteStream> {
    let mut b = EscPosBuilder::new();
    b.init();
    if let Some(align) = options.align {
        b.align(align);
    }
    b.hri_position(options.hri_position)
        .barcode_width(options.width)
        .barcode_height(options.height)
        .barcode(options.symbology, content.as_bytes())?
        .feed_line();
    if options.cut {
        b.cut();
    }
    Ok(b.build())
}

/// Build an image job: init, raster, [cut]
///
/// The image is decoded before anything is emitted.
#[instrument(skip(image), fields(len = image.len(), paper = options.paper_width_dots))]
pub fn build_image(image: &[u8], options: &ImageOptions) -> PrintResult<ByteStream> {
    let raster = crate::raster::rasterize(image, options.align, options.paper_width_dots)?;

    let mut b = EscPosBuilder::new();
    b.init().raw(&raster);
    if options.cut {
        b.cut();
    }
    Ok(b.build())
}

/// Compile any print request into its byte stream
pub fn build_request(request: &PrintRequest) -> PrintResult<ByteStream> {
    let stream = match request {
        PrintRequest::Text { content, options } => build_text(content, options)?,
        PrintRequest::Barcode { content, options } => build_barcode(content, options)?,
        PrintRequest::RasterImage { pixels, options } => build_image(pixels, options)?,
        PrintRequest::RawEscapeScript { script, options } => {
            script::compile(script, &options.encoding)?
        }
        PrintRequest::RawBytes { bytes } => ByteStream::from(bytes.clone()),
    };
    debug!(
        kind = request.kind(),
        fragments = stream.fragments().len(),
        bytes = stream.len(),
        "print request compiled"
    );
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INIT: &[u8] = &[0x1B, 0x40];
    const FEED: &[u8] = &[0x0A];
    const CUT: &[u8] = &[0x1D, 0x56, 0x42, 0x01];

    #[test]
    fn test_text_fragment_order() {
        let options = TextOptions {
            align: Some(Alignment::Center),
            cut: true,
            ..Default::default()
        };
        let stream = build_text("Hi", &options).unwrap();

        let expected: Vec<&[u8]> = vec![INIT, &[0x1B, 0x61, 0x01][..], &b"Hi"[..], FEED, CUT];
        assert_eq!(stream.fragments(), expected.as_slice());
    }

    #[test]
    fn test_text_omits_alignment_when_unset() {
        let stream = build_text("Hi", &TextOptions::default()).unwrap();
        let expected: Vec<&[u8]> = vec![INIT, &b"Hi"[..], FEED];
        assert_eq!(stream.fragments(), expected.as_slice());
    }

    #[test]
    fn test_text_unknown_encoding() {
        let options = TextOptions {
            encoding: "nope".into(),
            ..Default::default()
        };
        assert!(matches!(
            build_text("Hi", &options),
            Err(PrintError::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn test_text_cp858_euro() {
        let options = TextOptions {
            encoding: "cp858".into(),
            ..Default::default()
        };
        let bytes = build_text("3€", &options).unwrap().into_bytes();
        assert_eq!(bytes, vec![0x1B, 0x40, b'3', 0xD5, 0x0A]);
    }

    #[test]
    fn test_barcode_length_prefixed() {
        let options = BarcodeOptions {
            symbology: Symbology(73),
            ..Default::default()
        };
        let stream = build_barcode("12345", &options).unwrap();
        let frags = stream.fragments();
        assert_eq!(frags[0], INIT);
        assert_eq!(frags[1], vec![0x1D, 0x48, 0x02]);
        assert_eq!(frags[2], vec![0x1D, 0x77, 0x03]);
        assert_eq!(frags[3], vec![0x1D, 0x68, 162]);
        assert_eq!(frags[4], vec![0x1D, 0x6B, 73, 5, b'1', b'2', b'3', b'4', b'5']);
        assert_eq!(frags[5], FEED);
        assert_eq!(frags.len(), 6);
    }

    #[test]
    fn test_barcode_implicit_length() {
        let options = BarcodeOptions {
            symbology: Symbology(8),
            align: Some(Alignment::Right),
            cut: true,
            ..Default::default()
        };
        let stream = build_barcode("42", &options).unwrap();
        let frags = stream.fragments();
        assert_eq!(frags[1], vec![0x1B, 0x61, 0x02]);
        assert_eq!(frags[5], vec![0x1D, 0x6B, 8, b'4', b'2', 0x00]);
        assert_eq!(frags.last().unwrap(), CUT);
    }

    #[test]
    fn test_barcode_payload_too_long() {
        let content = "9".repeat(300);
        assert!(matches!(
            build_barcode(&content, &BarcodeOptions::default()),
            Err(PrintError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_raw_bytes_passthrough() {
        let request = PrintRequest::RawBytes {
            bytes: vec![0x1B, 0x40, 0x41],
        };
        assert_eq!(build_request(&request).unwrap().into_bytes(), vec![0x1B, 0x40, 0x41]);
    }

    #[test]
    fn test_byte_stream_len() {
        let mut stream = ByteStream::new();
        stream.push(vec![1, 2]);
        stream.push(Vec::new());
        stream.push(vec![3]);
        assert_eq!(stream.len(), 3);
        assert_eq!(stream.fragments().len(), 2);
        assert_eq!(stream.to_bytes(), vec![1, 2, 3]);
    }
}
