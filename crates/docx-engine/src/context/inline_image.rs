//! Inline image decoding
//!
//! Image fields arrive as base64 text. They are decoded, sniffed for a
//! supported format, and sized to a fixed display width with the original
//! aspect ratio preserved.

use std::io::Cursor;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use image::{ImageFormat, ImageReader};
use thiserror::Error;

/// English Metric Units per millimetre (OOXML drawing unit)
pub const EMU_PER_MM: f64 = 36_000.0;

/// Default display width for inline images
pub const DEFAULT_IMAGE_WIDTH_MM: f64 = 40.0;

/// Standard alphabet, padding optional
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Why an image field could not be used
#[derive(Error, Debug)]
pub enum ImageDecodeError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("unsupported image format (expected PNG or JPEG)")]
    UnsupportedFormat,

    #[error("unreadable image: {0}")]
    Unreadable(String),

    #[error("image has zero width or height")]
    Empty,
}

/// Image formats that can be embedded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImageKind {
    Png,
    Jpeg,
}

impl ImageKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpeg",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            ImageKind::Png => ImageFormat::Png,
            ImageKind::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// A decoded image ready to be placed inline in a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    data: Vec<u8>,
    kind: ImageKind,
    width_emu: u64,
    height_emu: u64,
}

impl InlineImage {
    /// Decode a base64 field value (a bare string or a `data:` URL)
    pub fn decode(encoded: &str, width_mm: f64) -> Result<Self, ImageDecodeError> {
        let payload = match encoded.trim().strip_prefix("data:") {
            Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(rest),
            None => encoded,
        };
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        let data = LENIENT_BASE64.decode(compact.as_bytes())?;
        Self::from_bytes(data, width_mm)
    }

    /// Wrap raw image bytes, reading their pixel size
    pub fn from_bytes(data: Vec<u8>, width_mm: f64) -> Result<Self, ImageDecodeError> {
        let kind = match image::guess_format(&data) {
            Ok(ImageFormat::Png) => ImageKind::Png,
            Ok(ImageFormat::Jpeg) => ImageKind::Jpeg,
            _ => return Err(ImageDecodeError::UnsupportedFormat),
        };

        let (px_width, px_height) = ImageReader::with_format(Cursor::new(&data), kind.image_format())
            .into_dimensions()
            .map_err(|e| ImageDecodeError::Unreadable(e.to_string()))?;
        if px_width == 0 || px_height == 0 {
            return Err(ImageDecodeError::Empty);
        }

        let width_emu = (width_mm.max(1.0) * EMU_PER_MM).round() as u64;
        let height_emu = width_emu * u64::from(px_height) / u64::from(px_width);

        Ok(Self {
            data,
            kind,
            width_emu,
            height_emu: height_emu.max(1),
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    /// Display size in EMU as (width, height)
    pub fn extent_emu(&self) -> (u64, u64) {
        (self.width_emu, self.height_emu)
    }
}
