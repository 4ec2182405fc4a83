// SPDX-License-Identifier: GPL-3.0-only

//! Still-image encoding
//!
//! This module wraps the `image` crate codecs behind one contract:
//! - Grayscale PNG (8-bit luminance, no palette, no alpha)
//! - Lossless WEBP (RGBA painted through the mask stencil)
//! - JPEG (8-bit luminance, with quality control)
//!
//! A failed encode only affects its own product.

use crate::errors::{CaptureError, CaptureResult};
use image::ExtendedColorType;
use image::ImageEncoder as _;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use std::sync::Arc;
use tracing::{debug, warn};

/// Supported encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodeKind {
    /// Single-channel 8-bit PNG
    GrayscalePng,
    /// Four-channel lossless WEBP
    AlphaWebp,
    /// Single-channel JPEG
    Jpeg,
}

impl EncodeKind {
    /// Get file extension for this encoding
    pub fn extension(&self) -> &'static str {
        match self {
            EncodeKind::GrayscalePng => "png",
            EncodeKind::AlphaWebp => "webp",
            EncodeKind::Jpeg => "jpg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            EncodeKind::GrayscalePng => "image/png",
            EncodeKind::AlphaWebp => "image/webp",
            EncodeKind::Jpeg => "image/jpeg",
        }
    }

    /// Bytes per pixel the input buffer must carry
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            EncodeKind::GrayscalePng | EncodeKind::Jpeg => 1,
            EncodeKind::AlphaWebp => 4,
        }
    }

    fn color_type(&self) -> ExtendedColorType {
        match self {
            EncodeKind::GrayscalePng | EncodeKind::Jpeg => ExtendedColorType::L8,
            EncodeKind::AlphaWebp => ExtendedColorType::Rgba8,
        }
    }
}

impl std::fmt::Display for EncodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EncodeKind::GrayscalePng => "PNG",
            EncodeKind::AlphaWebp => "WEBP",
            EncodeKind::Jpeg => "JPEG",
        };
        f.write_str(name)
    }
}

/// Encoded image data ready for saving
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub kind: EncodeKind,
    pub width: u32,
    pub height: u32,
}

/// Opaque encode service
///
/// `buffer` is row-major, `height` rows of `width * kind.bytes_per_pixel()`
/// bytes with no padding.
pub trait EncodeService: Send + Sync {
    fn encode(
        &self,
        buffer: &[u8],
        width: u32,
        height: u32,
        kind: EncodeKind,
    ) -> CaptureResult<EncodedImage>;
}

/// Encoder backed by the `image` crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageEncoder {
    jpeg_quality: u8,
}

impl ImageEncoder {
    /// Create an encoder with the default JPEG quality
    pub fn new() -> Self {
        Self {
            jpeg_quality: crate::constants::encoding::DEFAULT_JPEG_QUALITY,
        }
    }

    /// Set JPEG quality, clamped to 1-100
    pub fn with_jpeg_quality(quality: u8) -> Self {
        Self {
            jpeg_quality: quality.clamp(1, 100),
        }
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    fn check_input(buffer: &[u8], width: u32, height: u32, kind: EncodeKind) -> CaptureResult<()> {
        if width == 0 || height == 0 {
            return Err(CaptureError::Encode {
                kind,
                reason: format!("empty image {}x{}", width, height),
            });
        }
        let expected = width as usize * height as usize * kind.bytes_per_pixel();
        if buffer.len() != expected {
            return Err(CaptureError::Encode {
                kind,
                reason: format!(
                    "buffer holds {} bytes, {}x{} needs {}",
                    buffer.len(),
                    width,
                    height,
                    expected
                ),
            });
        }
        Ok(())
    }
}

impl Default for ImageEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodeService for ImageEncoder {
    fn encode(
        &self,
        buffer: &[u8],
        width: u32,
        height: u32,
        kind: EncodeKind,
    ) -> CaptureResult<EncodedImage> {
        Self::check_input(buffer, width, height, kind)?;

        let mut data = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut data);
        let color_type = kind.color_type();
        let result = match kind {
            EncodeKind::GrayscalePng => {
                PngEncoder::new(&mut cursor).write_image(buffer, width, height, color_type)
            }
            EncodeKind::AlphaWebp => WebPEncoder::new_lossless(&mut cursor)
                .write_image(buffer, width, height, color_type),
            EncodeKind::Jpeg => JpegEncoder::new_with_quality(&mut cursor, self.jpeg_quality)
                .encode(buffer, width, height, color_type),
        };
        result.map_err(|e| CaptureError::Encode {
            kind,
            reason: e.to_string(),
        })?;

        debug!(kind = %kind, width, height, size = data.len(), "Encoding complete");
        Ok(EncodedImage {
            data,
            kind,
            width,
            height,
        })
    }
}

/// Encode on the blocking pool
///
/// CPU-bound work is kept off the async workers.
pub async fn encode_async(
    service: Arc<dyn EncodeService>,
    buffer: Vec<u8>,
    width: u32,
    height: u32,
    kind: EncodeKind,
) -> CaptureResult<EncodedImage> {
    tokio::task::spawn_blocking(move || service.encode(&buffer, width, height, kind))
        .await
        .map_err(|e| {
            warn!(kind = %kind, error = %e, "Encoding task failed");
            CaptureError::Encode {
                kind,
                reason: format!("encoding task error: {}", e),
            }
        })?
}
