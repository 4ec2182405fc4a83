// SPDX-License-Identifier: MPL-2.0

//! Error types for the capture core
//!
//! Contract violations (`Format`, `UnsupportedFormat`, `InvalidState`,
//! `FrameInUse`) are programmer errors and are never coerced. Hardware
//! failures (`DeviceOpen`, `SessionConfigure`) end the current session and
//! leave retry policy to the orchestrator. `Cancelled` is kept apart from
//! both so shutdown can be told from malfunction.

use crate::backends::camera::types::{DeviceErrorCode, DeviceId, ImageFormat};
use crate::pipelines::photo::encoding::EncodeKind;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using CaptureError
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Why a pending device open did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFailure {
    /// The device went away before (or while) opening
    Disconnected,
    /// The device reported an error code
    Error(DeviceErrorCode),
}

impl OpenFailure {
    /// Hardware error code, if the failure carried one
    pub fn code(&self) -> Option<DeviceErrorCode> {
        match self {
            OpenFailure::Disconnected => None,
            OpenFailure::Error(code) => Some(*code),
        }
    }
}

impl fmt::Display for OpenFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenFailure::Disconnected => write!(f, "device disconnected"),
            OpenFailure::Error(code) => write!(f, "device error {} ({})", code.raw(), code),
        }
    }
}

/// Main error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// No enumerated device faces the back of the unit
    #[error("No back-facing camera device available")]
    NoSuitableDevice,

    /// The asynchronous open request failed
    #[error("Failed to open camera {device}: {cause}")]
    DeviceOpen { device: DeviceId, cause: OpenFailure },

    /// The capture session could not be configured
    #[error("Session configuration failed: {0}")]
    SessionConfigure(String),

    /// Input is not a YUV 4:2:0 flexible frame
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(ImageFormat),

    /// Dimension, crop or stride mismatch
    #[error("Invalid frame layout: {0}")]
    Format(String),

    /// One output product failed to encode
    #[error("{kind} encoding failed: {reason}")]
    Encode { kind: EncodeKind, reason: String },

    /// Refused to overwrite an existing file
    #[error("Target file already exists: {}", .0.display())]
    TargetExists(PathBuf),

    /// The owning context tore the session down
    #[error("Operation cancelled")]
    Cancelled,

    /// Operation issued in a state that does not accept it
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// The previous still frame has not been released yet
    #[error("Previous still frame is still held")]
    FrameInUse,

    /// Orchestrator deadline elapsed
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Hardware collaborator rejected a request synchronously
    #[error("Backend error: {0}")]
    Backend(String),

    /// Storage/filesystem errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CaptureError {
    /// True when the error was caused by teardown rather than hardware
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CaptureError::Cancelled)
    }

    /// True for errors a caller can only fix by changing its own code
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            CaptureError::Format(_)
                | CaptureError::UnsupportedFormat(_)
                | CaptureError::InvalidState { .. }
                | CaptureError::FrameInUse
        )
    }

    /// True for hardware failures the orchestrator may retry
    pub fn is_transient_hardware(&self) -> bool {
        matches!(
            self,
            CaptureError::DeviceOpen { .. }
                | CaptureError::SessionConfigure(_)
                | CaptureError::Timeout { .. }
        )
    }

    /// Hardware error code, when the failure carries one
    pub fn device_error_code(&self) -> Option<DeviceErrorCode> {
        match self {
            CaptureError::DeviceOpen { cause, .. } => cause.code(),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CaptureError {
    fn from(err: serde_json::Error) -> Self {
        CaptureError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_failure_code() {
        assert_eq!(OpenFailure::Disconnected.code(), None);
        assert_eq!(
            OpenFailure::Error(DeviceErrorCode::CameraInUse).code(),
            Some(DeviceErrorCode::CameraInUse)
        );
    }

    #[test]
    fn test_classification() {
        assert!(CaptureError::Cancelled.is_cancelled());
        assert!(!CaptureError::Cancelled.is_transient_hardware());
        assert!(CaptureError::Format("x".into()).is_contract_violation());
        assert!(CaptureError::FrameInUse.is_contract_violation());
        assert!(CaptureError::SessionConfigure("rejected".into()).is_transient_hardware());

        let err = CaptureError::DeviceOpen {
            device: DeviceId::new("0"),
            cause: OpenFailure::Error(DeviceErrorCode::CameraService),
        };
        assert!(err.is_transient_hardware());
        assert_eq!(err.device_error_code(), Some(DeviceErrorCode::CameraService));
    }

    #[test]
    fn test_display_includes_context() {
        let err = CaptureError::DeviceOpen {
            device: DeviceId::new("1"),
            cause: OpenFailure::Error(DeviceErrorCode::CameraInUse),
        };
        let msg = err.to_string();
        assert!(msg.contains("camera 1"));
        assert!(msg.contains("error 1"));

        let err = CaptureError::InvalidState {
            operation: "capture a still",
            state: "Opened".into(),
        };
        assert_eq!(err.to_string(), "Cannot capture a still while Opened");
    }
}
