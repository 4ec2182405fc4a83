// SPDX-License-Identifier: MPL-2.0

//! Captured frame and plane layout
//!
//! A [`FrameBuffer`] is validated once at construction and never mutated.
//! For YUV 4:2:0 there are exactly three planes: plane 0 is luminance at full
//! resolution with a pixel stride of 1, planes 1 and 2 are chroma (U, V) at
//! half resolution in each dimension. All stride arithmetic is relative to the
//! crop rectangle's origin.

use crate::backends::camera::types::ImageFormat;
use crate::errors::{CaptureError, CaptureResult};
use std::sync::Arc;

/// Sub-region of the sensor plane that forms the logical image
///
/// Edges are exclusive on the right and bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl CropRect {
    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Crop covering a whole `width`x`height` plane
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// One plane of pixel data
#[derive(Debug, Clone)]
pub struct Plane {
    data: Arc<[u8]>,
    row_stride: usize,
    pixel_stride: usize,
}

impl Plane {
    pub fn new(data: impl Into<Arc<[u8]>>, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data: data.into(),
            row_stride,
            pixel_stride,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Bytes between the starts of consecutive rows
    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    /// Bytes between consecutive samples in a row
    pub fn pixel_stride(&self) -> usize {
        self.pixel_stride
    }
}

/// Geometry of one plane's sample region after subsampling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PlaneRegion {
    pub(crate) left: usize,
    pub(crate) top: usize,
    pub(crate) width: usize,
    pub(crate) height: usize,
}

/// A single captured frame
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    format: ImageFormat,
    width: u32,
    height: u32,
    crop: CropRect,
    planes: Vec<Plane>,
}

impl FrameBuffer {
    /// Validate and assemble a frame
    ///
    /// Fails with `CaptureError::Format` when the declared size disagrees with
    /// the crop, when plane 0 is interleaved, or when a plane is too short or
    /// too narrow for its strides.
    pub fn new(
        format: ImageFormat,
        width: u32,
        height: u32,
        crop: CropRect,
        planes: Vec<Plane>,
    ) -> CaptureResult<Self> {
        if crop.right < crop.left || crop.bottom < crop.top {
            return Err(CaptureError::Format(format!(
                "inverted crop rectangle {:?}",
                crop
            )));
        }
        if width != crop.width() {
            return Err(CaptureError::Format(format!(
                "image width and crop width should match: {}!={}",
                width,
                crop.width()
            )));
        }
        if height != crop.height() {
            return Err(CaptureError::Format(format!(
                "image height and crop height should match: {}!={}",
                height,
                crop.height()
            )));
        }
        if width == 0 || height == 0 {
            return Err(CaptureError::Format(format!(
                "empty frame {}x{}",
                width, height
            )));
        }

        let Some(luma) = planes.first() else {
            return Err(CaptureError::Format("frame has no planes".into()));
        };
        if luma.pixel_stride != 1 {
            return Err(CaptureError::Format(format!(
                "luminance plane must not be interleaved, pixel stride {}",
                luma.pixel_stride
            )));
        }

        let frame = Self {
            format,
            width,
            height,
            crop,
            planes,
        };

        if format == ImageFormat::Yuv420Flexible {
            if frame.planes.len() != 3 {
                return Err(CaptureError::Format(format!(
                    "YUV 4:2:0 needs 3 planes, got {}",
                    frame.planes.len()
                )));
            }
            for index in 0..3 {
                frame.check_plane_extent(index)?;
            }
        }

        Ok(frame)
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Effective (cropped) width
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Effective (cropped) height
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn crop(&self) -> CropRect {
        self.crop
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Region plane `index` samples, with chroma planes at half resolution
    pub(crate) fn plane_region(&self, index: usize) -> PlaneRegion {
        let shift = if index == 0 { 0 } else { 1 };
        PlaneRegion {
            left: (self.crop.left >> shift) as usize,
            top: (self.crop.top >> shift) as usize,
            width: (self.width >> shift) as usize,
            height: (self.height >> shift) as usize,
        }
    }

    fn check_plane_extent(&self, index: usize) -> CaptureResult<()> {
        let plane = &self.planes[index];
        let region = self.plane_region(index);
        if region.width == 0 || region.height == 0 {
            return Ok(());
        }
        if plane.pixel_stride == 0 {
            return Err(CaptureError::Format(format!(
                "plane {} has zero pixel stride",
                index
            )));
        }

        let overflow = || {
            CaptureError::Format(format!(
                "plane {} strides overflow the address space (row {}, pixel {})",
                index, plane.row_stride, plane.pixel_stride
            ))
        };
        let row_span = (region.width - 1)
            .checked_mul(plane.pixel_stride)
            .and_then(|span| span.checked_add(1))
            .ok_or_else(overflow)?;
        if plane.row_stride < row_span {
            return Err(CaptureError::Format(format!(
                "plane {} row stride {} shorter than row span {}",
                index, plane.row_stride, row_span
            )));
        }

        let required = plane
            .row_stride
            .checked_mul(region.top + region.height - 1)
            .zip(plane.pixel_stride.checked_mul(region.left))
            .and_then(|(rows, cols)| rows.checked_add(cols))
            .and_then(|start| start.checked_add(row_span))
            .ok_or_else(overflow)?;
        if plane.data.len() < required {
            return Err(CaptureError::Format(format!(
                "plane {} holds {} bytes, crop needs {}",
                index,
                plane.data.len(),
                required
            )));
        }
        Ok(())
    }
}
