//! Raster image processing
//!
//! Encodes an image as `GS v 0` raster bit image data:
//! - decoded from PNG/JPEG/WebP bytes
//! - scaled down to the paper width (in dots) when wider
//! - transparent pixels treated as white
//! - Floyd-Steinberg dithered to 1 bit
//! - placed left / center / right inside the paper width

use crate::error::{PrintError, PrintResult};
use crate::request::Alignment;

/// Rows per `GS v 0` command; taller images are sent as several bands
pub const MAX_BAND_ROWS: u32 = 1024;

/// Widest raster `xL xH` can describe (65535 bytes of 8 dots)
pub const MAX_PAPER_WIDTH_DOTS: u32 = 0xFFFF * 8;

/// Decode and rasterize an image into `GS v 0` commands
#[cfg(feature = "image")]
#[tracing::instrument(skip(data), fields(len = data.len()))]
pub fn rasterize(data: &[u8], align: Alignment, paper_width: u32) -> PrintResult<Vec<u8>> {
    use image::{GenericImageView, GrayImage, Luma};
    use tracing::debug;

    if paper_width == 0 || paper_width > MAX_PAPER_WIDTH_DOTS {
        return Err(PrintError::InvalidRequest(format!(
            "paper width must be 1..={} dots, got {}",
            MAX_PAPER_WIDTH_DOTS, paper_width
        )));
    }

    let img = image::load_from_memory(data).map_err(|e| PrintError::ImageDecode(e.to_string()))?;
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(PrintError::ImageDecode("image has no pixels".to_string()));
    }
    debug!(width = w, height = h, "image decoded");

    // Resize if too wide for the paper
    let (new_w, new_h) = if w > paper_width {
        let ratio = paper_width as f64 / w as f64;
        (paper_width, ((h as f64 * ratio) as u32).max(1))
    } else {
        (w, h)
    };
    let resized = if (new_w, new_h) == (w, h) {
        img
    } else {
        img.resize_exact(new_w, new_h, image::imageops::FilterType::Triangle)
    };

    // Convert to RGBA for transparency handling
    let rgba = resized.to_rgba8();
    let mut gray = GrayImage::from_fn(new_w, new_h, |x, y| {
        let pixel = rgba.get_pixel(x, y);
        if pixel[3] < 128 {
            // Transparent = white
            Luma([255])
        } else {
            let luma = 0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32;
            Luma([luma as u8])
        }
    });

    image::imageops::dither(&mut gray, &image::imageops::BiLevel);

    let offset = match align {
        Alignment::Left => 0,
        Alignment::Center => (paper_width - new_w) / 2,
        Alignment::Right => paper_width - new_w,
    };

    Ok(encode_bands(paper_width, new_h, |x, y| {
        x >= offset && x < offset + new_w && gray.get_pixel(x - offset, y)[0] < 128
    }))
}

/// Without the `image` feature no source can be decoded
#[cfg(not(feature = "image"))]
pub fn rasterize(_data: &[u8], _align: Alignment, _paper_width: u32) -> PrintResult<Vec<u8>> {
    Err(PrintError::ImageDecode(
        "image support is not compiled in".to_string(),
    ))
}

/// Pack a 1-bit picture into `GS v 0 m xL xH yL yH d1..dk` commands
///
/// `is_black(x, y)` is queried for every dot of every row; rows are MSB first.
pub fn encode_bands(width: u32, height: u32, is_black: impl Fn(u32, u32) -> bool) -> Vec<u8> {
    let x_bytes = width.div_ceil(8);
    let bands = height.div_ceil(MAX_BAND_ROWS) as usize;
    let mut data = Vec::with_capacity((x_bytes * height) as usize + 8 * bands);

    let mut band_start = 0;
    while band_start < height {
        let rows = (height - band_start).min(MAX_BAND_ROWS);

        // GS v 0 m xL xH yL yH
        data.extend_from_slice(&[0x1D, 0x76, 0x30, 0x00]);
        data.push(x_bytes as u8);
        data.push((x_bytes >> 8) as u8);
        data.push(rows as u8);
        data.push((rows >> 8) as u8);

        for y in band_start..band_start + rows {
            for x_byte in 0..x_bytes {
                let mut byte = 0u8;
                for bit in 0..8 {
                    let x = x_byte * 8 + bit;
                    if x < width && is_black(x, y) {
                        byte |= 1 << (7 - bit);
                    }
                }
                data.push(byte);
            }
        }

        band_start += rows;
    }

    data
}
