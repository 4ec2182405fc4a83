// SPDX-License-Identifier: MPL-2.0

//! Stillcam - still-frame capture core
//!
//! This library turns callback-driven camera hardware into a linear async
//! API and converts captured YUV 4:2:0 stills into luminance, NV21, alpha
//! masks and encoded PNG/WEBP/JPEG files.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Hardware collaborator traits and the `DeviceSession` state machine
//! - [`media`]: Frame layout and stride-aware plane conversion
//! - [`pipelines`]: Encoding and the capture orchestrator
//! - [`config`]: Capture configuration handling
//! - [`storage`]: File persistence and media index hooks
//! - [`logging`]: Tracing subscriber setup
//!
//! # Example
//!
//! ```ignore
//! let backend = Arc::new(SimulatedBackend::builder().build());
//! let mut orchestrator = CaptureOrchestrator::new(backend, CaptureConfig::default())?;
//! orchestrator.start(PreviewSurface::new(Size::new(640, 480))).await?;
//! let report = orchestrator.capture().await?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod logging;
pub mod media;
pub mod pipelines;
pub mod storage;

// Re-export commonly used types
pub use backends::camera::{DeviceSession, SessionState, SimulatedBackend};
pub use config::CaptureConfig;
pub use constants::OutputProduct;
pub use errors::{CaptureError, CaptureResult};
pub use media::{FrameBuffer, to_alpha_mask, to_luminance, to_nv21};
pub use pipelines::photo::{CaptureOrchestrator, CaptureReport};
