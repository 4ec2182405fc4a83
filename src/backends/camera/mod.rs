// SPDX-License-Identifier: MPL-2.0
// Camera backend with trait-based abstraction over the hardware collaborator

//! Camera backend abstraction
//!
//! The hardware is reached through three collaborator traits and drives the
//! [`DeviceSession`] state machine through callbacks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │ CaptureOrchestrator │
//! └──────────┬──────────┘
//!            │ open / configure_session / capture_still / close
//!            ▼
//! ┌─────────────────────┐      callbacks      ┌──────────────────┐
//! │    DeviceSession    │ ◄────────────────── │ CallbackExecutor │
//! └──────────┬──────────┘                     └────────▲─────────┘
//!            │                                         │ post
//!            ▼                                         │
//! ┌─────────────────────┐                     ┌────────┴─────────┐
//! │ CameraBackend Trait │ ──── open_device ─► │ CameraDevice /   │
//! └─────────────────────┘                     │ CaptureSession   │
//!                                             └──────────────────┘
//! ```
//!
//! Every hardware callback is posted through an [`ExecutorHandle`], so
//! callback delivery and capture/configure calls share a single thread.

pub mod executor;
pub mod image_reader;
pub mod pending;
pub mod session;
pub mod simulated;
pub mod types;

pub use executor::{CallbackExecutor, ExecutorHandle};
pub use image_reader::{ImageReader, NativeImage, ReaderSurface, StillFrame};
pub use session::{CancelHandle, DeviceSession, select_back_facing, select_smallest_size};
pub use simulated::SimulatedBackend;
pub use types::*;

/// Device enumeration and open service
pub trait CameraBackend: Send + Sync {
    /// Enumerate devices together with their lens facing
    fn list_devices(&self) -> BackendResult<Vec<DeviceInfo>>;

    /// Output sizes `device` advertises for `format`, in enumeration order
    fn output_sizes(&self, device: &DeviceId, format: ImageFormat) -> BackendResult<Vec<Size>>;

    /// Issue one asynchronous open request
    ///
    /// The outcome arrives through `callback`, posted on `executor`. The
    /// hardware may deliver more than one event for the same request (a
    /// disconnect racing an error); the receiver must tolerate that.
    ///
    /// # Returns
    /// * `Ok(())` - Request accepted
    /// * `Err(CaptureError)` - Request refused synchronously
    fn open_device(
        &self,
        device: &DeviceId,
        callback: EventCallback<DeviceEvent>,
        executor: &ExecutorHandle,
    ) -> BackendResult<()>;
}

/// An opened device handle, exclusively owned by one session
pub trait CameraDevice: Send {
    fn id(&self) -> &DeviceId;

    /// Build one capture session bound to `outputs`
    ///
    /// Configuration completes through `callback`, posted on `executor`.
    fn create_session(
        &mut self,
        outputs: Vec<OutputTarget>,
        callback: EventCallback<SessionEvent>,
        executor: &ExecutorHandle,
    ) -> BackendResult<()>;

    /// Release the device
    fn close(&mut self);
}

/// A configured capture session
pub trait CaptureSession: Send {
    /// Replace the repeating request
    fn set_repeating_request(&mut self, request: CaptureRequest) -> BackendResult<()>;

    /// Submit a single non-repeating request
    fn capture(&mut self, request: CaptureRequest) -> BackendResult<()>;

    fn stop_repeating(&mut self) -> BackendResult<()>;

    fn close(&mut self);
}
