// SPDX-License-Identifier: GPL-3.0-only

//! Crate-wide constants

use crate::pipelines::photo::encoding::EncodeKind;
use serde::{Deserialize, Serialize};

/// Output written for each captured still
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OutputProduct {
    /// Full-range luminance as an 8-bit grayscale PNG (default)
    #[default]
    GrayscalePng,
    /// Luminance painted through the mask stencil, lossless WEBP
    AlphaWebp,
    /// Luminance as a grayscale JPEG
    Jpeg,
    /// Raw NV21 bytes, unencoded
    Nv21,
}

impl OutputProduct {
    /// All products, in the order the orchestrator writes them
    pub const ALL: [OutputProduct; 4] = [
        OutputProduct::GrayscalePng,
        OutputProduct::AlphaWebp,
        OutputProduct::Jpeg,
        OutputProduct::Nv21,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            OutputProduct::GrayscalePng => "Grayscale PNG",
            OutputProduct::AlphaWebp => "Alpha mask WEBP",
            OutputProduct::Jpeg => "JPEG",
            OutputProduct::Nv21 => "NV21 dump",
        }
    }

    /// Encoder used for this product; `None` for raw dumps
    pub fn encode_kind(&self) -> Option<EncodeKind> {
        match self {
            OutputProduct::GrayscalePng => Some(EncodeKind::GrayscalePng),
            OutputProduct::AlphaWebp => Some(EncodeKind::AlphaWebp),
            OutputProduct::Jpeg => Some(EncodeKind::Jpeg),
            OutputProduct::Nv21 => None,
        }
    }

    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self.encode_kind() {
            Some(kind) => kind.extension(),
            None => file_formats::NV21_EXTENSION,
        }
    }
}

/// Capture session defaults
pub mod capture {
    /// Repeating preview rate in frames per second (low-rate viewfinder)
    pub const DEFAULT_PREVIEW_FPS: f64 = 4.0;

    /// Buffers the still reader may hold at once
    pub const DEFAULT_READER_MAX_IMAGES: usize = 3;

    /// Name of the thread hardware callbacks run on
    pub const CALLBACK_THREAD_NAME: &str = "camera-callbacks";

    /// Tracing filter used when `RUST_LOG` is unset
    pub const DEFAULT_LOG_FILTER: &str = "stillcam=info";
}

/// Encoder settings
pub mod encoding {
    /// JPEG quality (1-100)
    pub const DEFAULT_JPEG_QUALITY: u8 = 92;
}

/// File naming
pub mod file_formats {
    /// Directory under the user's Pictures folder
    pub const OUTPUT_SUBDIR: &str = "motioncam";

    pub const PNG_PREFIX: &str = "mc2";
    pub const WEBP_PREFIX: &str = "mask";
    pub const JPEG_PREFIX: &str = "image";
    pub const NV21_PREFIX: &str = "raw";

    pub const NV21_EXTENSION: &str = "nv21";

    /// chrono format for the `yyyyMMddHHmmssSSS` filename token
    pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%3f";
}

/// Library information
pub mod app_info {
    /// Crate version from Cargo metadata
    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_extensions() {
        assert_eq!(OutputProduct::GrayscalePng.extension(), "png");
        assert_eq!(OutputProduct::AlphaWebp.extension(), "webp");
        assert_eq!(OutputProduct::Jpeg.extension(), "jpg");
        assert_eq!(OutputProduct::Nv21.extension(), "nv21");
    }

    #[test]
    fn test_only_nv21_is_unencoded() {
        let unencoded: Vec<_> = OutputProduct::ALL
            .iter()
            .filter(|p| p.encode_kind().is_none())
            .collect();
        assert_eq!(unencoded, vec![&OutputProduct::Nv21]);
    }
}
