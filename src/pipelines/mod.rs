// SPDX-License-Identifier: MPL-2.0

//! Processing pipelines for still capture
//!
//! Heavy work (encoding, disk I/O) runs on the blocking pool so the preview
//! and the camera callback thread are never stalled.
//!
//! # Pipeline Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Still Frame  │ ──▶ │  Photo Pipeline   │ ──▶ │ PNG/WEBP/JPG │
//! │ (YUV 4:2:0)  │     │  - Luminance/NV21 │     │  NV21 dump   │
//! │              │     │  - Mask stencil   │     │              │
//! │              │     │  - Encoding       │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`photo`]: Capture orchestration and encoding

pub mod photo;
