// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use super::image_reader::ReaderSurface;
use super::{CameraDevice, CaptureSession};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identifier of an enumerated camera device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Direction the lens faces (LENS_FACING characteristic)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LensFacing {
    Front,
    Back,
    External,
}

/// Represents an enumerated camera device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub facing: LensFacing,
}

/// Pixel dimensions of an output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixel count, used to rank advertised sizes
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Image format of a captured buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    /// Flexible YUV 4:2:0: three planes with independent row/pixel strides
    Yuv420Flexible,
    /// Compressed JPEG in a single plane
    Jpeg,
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ImageFormat::Yuv420Flexible => "YUV_420_888",
            ImageFormat::Jpeg => "JPEG",
        };
        f.write_str(name)
    }
}

/// Error code reported by a device's error callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceErrorCode {
    /// Device is already in use by a higher-priority client
    CameraInUse,
    /// Too many other devices are open
    MaxCamerasInUse,
    /// Disabled by device policy
    CameraDisabled,
    /// Device hit a fatal error
    CameraDevice,
    /// Camera service hit a fatal error
    CameraService,
    /// Code outside the known set
    Unknown(i32),
}

impl DeviceErrorCode {
    pub fn from_raw(code: i32) -> Self {
        match code {
            1 => Self::CameraInUse,
            2 => Self::MaxCamerasInUse,
            3 => Self::CameraDisabled,
            4 => Self::CameraDevice,
            5 => Self::CameraService,
            other => Self::Unknown(other),
        }
    }

    pub fn raw(&self) -> i32 {
        match self {
            Self::CameraInUse => 1,
            Self::MaxCamerasInUse => 2,
            Self::CameraDisabled => 3,
            Self::CameraDevice => 4,
            Self::CameraService => 5,
            Self::Unknown(code) => *code,
        }
    }

    /// Human-readable description for logs
    pub fn describe(&self) -> &'static str {
        match self {
            Self::CameraInUse => "camera device is in use already",
            Self::MaxCamerasInUse => "too many other open camera devices",
            Self::CameraDisabled => "camera device disabled by device policy",
            Self::CameraDevice => "camera device encountered a fatal error",
            Self::CameraService => "camera service encountered a fatal error",
            Self::Unknown(_) => "unknown camera error",
        }
    }
}

impl std::fmt::Display for DeviceErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.describe())
    }
}

/// Identity of a capture target surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(u64);

impl SurfaceId {
    /// Allocate a process-unique surface id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// Rendering target supplied by the display collaborator
///
/// The core never inspects what is behind it; it only passes it to the
/// session as a capture target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewSurface {
    id: SurfaceId,
    size: Size,
}

impl PreviewSurface {
    pub fn new(size: Size) -> Self {
        Self {
            id: SurfaceId::next(),
            size,
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn size(&self) -> Size {
        self.size
    }
}

/// Output bound to a capture session
#[derive(Debug, Clone)]
pub enum OutputTarget {
    /// Viewfinder surface
    Preview(PreviewSurface),
    /// Still-capture image reader
    Reader(ReaderSurface),
}

impl OutputTarget {
    pub fn id(&self) -> SurfaceId {
        match self {
            OutputTarget::Preview(surface) => surface.id(),
            OutputTarget::Reader(surface) => surface.id(),
        }
    }
}

/// Request template, mirroring the intent of the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTemplate {
    Preview,
    StillCapture,
}

/// A single or repeating capture request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub template: RequestTemplate,
    pub targets: Vec<SurfaceId>,
    /// Sensor frame duration in nanoseconds
    pub frame_duration_ns: Option<u64>,
}

impl CaptureRequest {
    /// Repeating viewfinder request at `fps` frames per second
    pub fn preview(target: SurfaceId, fps: f64) -> Self {
        Self {
            template: RequestTemplate::Preview,
            targets: vec![target],
            frame_duration_ns: Some(frame_duration_ns(fps)),
        }
    }

    /// One-shot still request
    pub fn still(target: SurfaceId) -> Self {
        Self {
            template: RequestTemplate::StillCapture,
            targets: vec![target],
            frame_duration_ns: None,
        }
    }
}

/// Frame interval for a target rate, in nanoseconds
pub fn frame_duration_ns(fps: f64) -> u64 {
    (1_000_000_000.0 / fps) as u64
}

/// Callback delivered by the device open request
pub enum DeviceEvent {
    Opened(Box<dyn CameraDevice>),
    Disconnected,
    Error(DeviceErrorCode),
}

impl std::fmt::Debug for DeviceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceEvent::Opened(device) => write!(f, "Opened({})", device.id()),
            DeviceEvent::Disconnected => write!(f, "Disconnected"),
            DeviceEvent::Error(code) => write!(f, "Error({})", code.raw()),
        }
    }
}

/// Callback delivered by the session create request
pub enum SessionEvent {
    Configured(Box<dyn CaptureSession>),
    ConfigureFailed,
}

impl std::fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::Configured(_) => write!(f, "Configured"),
            SessionEvent::ConfigureFailed => write!(f, "ConfigureFailed"),
        }
    }
}

/// Hardware callback; may be invoked more than once by racing events
pub type EventCallback<E> = Arc<dyn Fn(E) + Send + Sync>;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, crate::errors::CaptureError>;

/// Lifecycle state of a [`DeviceSession`](super::DeviceSession)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Opening,
    Opened,
    Configuring,
    Streaming,
    CapturingStill,
    Closing,
    Closed,
    Failed,
}

impl SessionState {
    /// Closed is the only state no operation leaves
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
