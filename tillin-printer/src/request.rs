//! Print requests and their option records
//!
//! Each request variant enumerates exactly the fields it recognizes, with the
//! defaults the printer bridge has always used.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PrintError, PrintResult};

/// Default encoding for structured text
pub const DEFAULT_TEXT_ENCODING: &str = "UTF-8";

/// Default encoding for escape scripts
pub const DEFAULT_SCRIPT_ENCODING: &str = "cp858";

/// 80mm paper at 203 dpi
pub const DEFAULT_PAPER_WIDTH_DOTS: u32 = 576;

/// Horizontal alignment (`ESC a n`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    #[default]
    Center,
    Right,
}

impl Alignment {
    /// Value of `n` in `ESC a n`
    pub fn code(self) -> u8 {
        match self {
            Alignment::Left => 0,
            Alignment::Center => 1,
            Alignment::Right => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 | 48 => Some(Alignment::Left),
            1 | 49 => Some(Alignment::Center),
            2 | 50 => Some(Alignment::Right),
            _ => None,
        }
    }

    /// Lenient form for image placement: unknown names center the image
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or(Alignment::Center)
    }
}

impl FromStr for Alignment {
    type Err = PrintError;

    /// Parse "left" / "center" / "right" (case-insensitive)
    fn from_str(name: &str) -> PrintResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "left" => Ok(Alignment::Left),
            "center" => Ok(Alignment::Center),
            "right" => Ok(Alignment::Right),
            _ => Err(PrintError::InvalidRequest(format!(
                "unknown alignment '{}', expected left, center or right",
                name
            ))),
        }
    }
}

/// Position of human readable interpretation characters (`GS H n`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HriPosition {
    None,
    Above,
    #[default]
    Below,
    Both,
}

impl HriPosition {
    pub fn code(self) -> u8 {
        match self {
            HriPosition::None => 0,
            HriPosition::Above => 1,
            HriPosition::Below => 2,
            HriPosition::Both => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(HriPosition::None),
            1 => Some(HriPosition::Above),
            2 => Some(HriPosition::Below),
            3 => Some(HriPosition::Both),
            _ => None,
        }
    }
}

/// Barcode system, as the numeric `m` of `GS k m`
///
/// Codes 0..=6 select the NUL-terminated form, 65..=73 the length-prefixed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbology(pub u8);

impl Symbology {
    pub const UPC_A_LEGACY: Symbology = Symbology(0);
    pub const EAN13_LEGACY: Symbology = Symbology(2);
    pub const CODE39_LEGACY: Symbology = Symbology(4);
    pub const UPC_A: Symbology = Symbology(65);
    pub const UPC_E: Symbology = Symbology(66);
    pub const EAN13: Symbology = Symbology(67);
    pub const EAN8: Symbology = Symbology(68);
    pub const CODE39: Symbology = Symbology(69);
    pub const ITF: Symbology = Symbology(70);
    pub const CODABAR: Symbology = Symbology(71);
    pub const CODE93: Symbology = Symbology(72);
    pub const CODE128: Symbology = Symbology(73);

    pub fn code(self) -> u8 {
        self.0
    }

    /// Whether the payload must carry an explicit length byte
    pub fn is_length_prefixed(self) -> bool {
        self.0 >= 65
    }
}

impl Default for Symbology {
    fn default() -> Self {
        Symbology::CODE128
    }
}

/// Options for plain text printing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextOptions {
    pub encoding: String,
    /// `None` keeps the alignment the printer last had
    pub align: Option<Alignment>,
    pub cut: bool,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            encoding: DEFAULT_TEXT_ENCODING.to_string(),
            align: None,
            cut: false,
        }
    }
}

/// Options for barcode printing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BarcodeOptions {
    pub symbology: Symbology,
    /// Module width (`GS w n`)
    pub width: u8,
    /// Bar height in dots (`GS h n`)
    pub height: u8,
    pub hri_position: HriPosition,
    pub align: Option<Alignment>,
    pub cut: bool,
}

impl Default for BarcodeOptions {
    fn default() -> Self {
        Self {
            symbology: Symbology::CODE128,
            width: 3,
            height: 162,
            hri_position: HriPosition::Below,
            align: None,
            cut: false,
        }
    }
}

/// Options for raster image printing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageOptions {
    pub align: Alignment,
    pub paper_width_dots: u32,
    pub cut: bool,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            align: Alignment::Center,
            paper_width_dots: DEFAULT_PAPER_WIDTH_DOTS,
            cut: false,
        }
    }
}

/// Options for escape script printing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptOptions {
    pub encoding: String,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            encoding: DEFAULT_SCRIPT_ENCODING.to_string(),
        }
    }
}

/// A complete print job description
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintRequest {
    Text {
        content: String,
        options: TextOptions,
    },
    Barcode {
        content: String,
        options: BarcodeOptions,
    },
    /// `pixels` is an encoded image (PNG, JPEG, ...)
    RasterImage {
        pixels: Vec<u8>,
        options: ImageOptions,
    },
    RawEscapeScript {
        script: String,
        options: ScriptOptions,
    },
    RawBytes {
        bytes: Vec<u8>,
    },
}

impl PrintRequest {
    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            PrintRequest::Text { .. } => "text",
            PrintRequest::Barcode { .. } => "barcode",
            PrintRequest::RasterImage { .. } => "image",
            PrintRequest::RawEscapeScript { .. } => "script",
            PrintRequest::RawBytes { .. } => "raw",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let barcode = BarcodeOptions::default();
        assert_eq!(barcode.symbology, Symbology::CODE128);
        assert_eq!((barcode.width, barcode.height), (3, 162));
        assert_eq!(barcode.hri_position.code(), 2);
        assert_eq!(ImageOptions::default().paper_width_dots, 576);
        assert_eq!(ScriptOptions::default().encoding, "cp858");
        assert_eq!(TextOptions::default().align, None);
    }

    #[test]
    fn test_symbology_threshold() {
        assert!(Symbology(73).is_length_prefixed());
        assert!(Symbology(65).is_length_prefixed());
        assert!(!Symbology(8).is_length_prefixed());
        assert!(!Symbology(64).is_length_prefixed());
    }

    #[test]
    fn test_alignment_parsing() {
        assert_eq!(Alignment::from_name("LEFT"), Alignment::Left);
        assert_eq!(Alignment::from_name("bogus"), Alignment::Center);
        assert_eq!("Right".parse::<Alignment>().unwrap(), Alignment::Right);
        assert!(matches!(
            "cetner".parse::<Alignment>(),
            Err(PrintError::InvalidRequest(_))
        ));
        assert_eq!(Alignment::from_code(2), Some(Alignment::Right));
        assert_eq!(Alignment::from_code(7), None);
    }

    #[test]
    fn test_options_from_json() {
        let opts: BarcodeOptions =
            serde_json::from_str(r#"{"symbology": 8, "hriPosition": "none"}"#).unwrap();
        assert_eq!(opts.symbology, Symbology(8));
        assert_eq!(opts.hri_position, HriPosition::None);
        assert_eq!(opts.height, 162);
    }
}
