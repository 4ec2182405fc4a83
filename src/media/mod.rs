// SPDX-License-Identifier: MPL-2.0

//! Frame layout and pixel-plane conversion
//!
//! # Frames
//!
//! Stills arrive as YUV 4:2:0 with three planes whose row and pixel strides
//! are independent, and an active crop rectangle. [`frame::FrameBuffer`]
//! validates that layout once, at construction.
//!
//! # Conversion
//!
//! The [`plane_converter`] functions are pure and stride-correct:
//! - **Luminance**: plane 0 cropped to `width * height` bytes, full range
//! - **NV21**: luminance followed by interleaved V/U at half resolution
//! - **Alpha mask**: luminance reused as alpha, painted via [`mask::Stencil`]
//!
//! # Modules
//!
//! - [`frame`]: `FrameBuffer`, `Plane`, `CropRect`
//! - [`plane_converter`]: Conversion functions
//! - [`mask`]: Alpha mask compositing

pub mod frame;
pub mod mask;
pub mod plane_converter;

// Re-export commonly used types
pub use frame::{CropRect, FrameBuffer, Plane};
pub use mask::{AlphaMask, Stencil, StencilColor};
pub use plane_converter::{to_alpha_mask, to_luminance, to_luminance_limited_range, to_nv21};
