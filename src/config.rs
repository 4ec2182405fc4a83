// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{OutputProduct, capture, encoding, file_formats};
use crate::errors::{CaptureError, CaptureResult};
use crate::media::mask::{Stencil, StencilColor};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Default output directory: `<Pictures>/motioncam`
pub fn default_output_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(file_formats::OUTPUT_SUBDIR)
}

/// Capture and output settings
///
/// Missing fields fall back to their defaults when loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Repeating preview rate
    pub preview_fps: f64,
    /// Still reader depth
    pub reader_max_images: usize,
    /// Root directory handed to the file collaborator
    pub output_dir: PathBuf,
    /// Products written for every still
    pub products: Vec<OutputProduct>,
    pub png_prefix: String,
    pub webp_prefix: String,
    pub jpeg_prefix: String,
    pub nv21_prefix: String,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    pub mask_foreground: StencilColor,
    pub mask_background: StencilColor,
    /// Deadline for a device open, none by default
    pub open_timeout_ms: Option<u64>,
    /// Deadline for session configuration, none by default
    pub configure_timeout_ms: Option<u64>,
    /// Fresh-session retries after a transient hardware failure
    pub open_retries: u32,
    /// Notify the media indexer after each write
    pub register_with_media_index: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            preview_fps: capture::DEFAULT_PREVIEW_FPS,
            reader_max_images: capture::DEFAULT_READER_MAX_IMAGES,
            output_dir: default_output_dir(),
            products: vec![OutputProduct::GrayscalePng],
            png_prefix: file_formats::PNG_PREFIX.to_string(),
            webp_prefix: file_formats::WEBP_PREFIX.to_string(),
            jpeg_prefix: file_formats::JPEG_PREFIX.to_string(),
            nv21_prefix: file_formats::NV21_PREFIX.to_string(),
            jpeg_quality: encoding::DEFAULT_JPEG_QUALITY,
            mask_foreground: StencilColor::WHITE,
            mask_background: StencilColor::BLACK,
            open_timeout_ms: None,
            configure_timeout_ms: None,
            open_retries: 0,
            register_with_media_index: true,
        }
    }
}

impl CaptureConfig {
    /// Load from a JSON file and validate
    pub fn load(path: &Path) -> CaptureResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: CaptureConfig = serde_json::from_str(&text)?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded capture config");
        Ok(config)
    }

    /// Write as pretty-printed JSON, creating parent directories
    pub fn save(&self, path: &Path) -> CaptureResult<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        info!(path = %path.display(), "Saved capture config");
        Ok(())
    }

    /// Reject values the capture path cannot run with
    pub fn validate(&self) -> CaptureResult<()> {
        if !self.preview_fps.is_finite() || self.preview_fps <= 0.0 {
            return Err(CaptureError::Config(format!(
                "preview_fps must be a positive number, got {}",
                self.preview_fps
            )));
        }
        if self.reader_max_images == 0 {
            return Err(CaptureError::Config(
                "reader_max_images must be at least 1".into(),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(CaptureError::Config(format!(
                "jpeg_quality must be within 1-100, got {}",
                self.jpeg_quality
            )));
        }
        if self.products.is_empty() {
            return Err(CaptureError::Config("no output products selected".into()));
        }
        for product in &self.products {
            if self.prefix_for(*product).is_empty() {
                return Err(CaptureError::Config(format!(
                    "empty filename prefix for {}",
                    product.display_name()
                )));
            }
        }
        Ok(())
    }

    /// Filename prefix for `product`
    pub fn prefix_for(&self, product: OutputProduct) -> &str {
        match product {
            OutputProduct::GrayscalePng => &self.png_prefix,
            OutputProduct::AlphaWebp => &self.webp_prefix,
            OutputProduct::Jpeg => &self.jpeg_prefix,
            OutputProduct::Nv21 => &self.nv21_prefix,
        }
    }

    pub fn stencil(&self) -> Stencil {
        Stencil {
            foreground: self.mask_foreground,
            background: self.mask_background,
        }
    }

    pub fn open_timeout(&self) -> Option<Duration> {
        self.open_timeout_ms.map(Duration::from_millis)
    }

    pub fn configure_timeout(&self) -> Option<Duration> {
        self.configure_timeout_ms.map(Duration::from_millis)
    }
}
