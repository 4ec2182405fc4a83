// SPDX-License-Identifier: GPL-3.0-only

//! Device/session lifecycle state machine
//!
//! ```text
//! Idle ─open─► Opening ─► Opened ─configure─► Configuring ─► Streaming ◄─┐
//!                                                               │         │
//!                                                         capture_still   │
//!                                                               ▼         │
//!                                                        CapturingStill ──┘
//! any ─close─► Closing ─► Closed            any non-terminal ─► Failed
//! ```
//!
//! Each operation that waits for hardware issues its request on the callback
//! executor and suspends on a single-resume [`PendingOperation`]. Failed is
//! absorbing for every operation except `close`, which still releases the
//! device and lands in Closed.

use super::executor::ExecutorHandle;
use super::image_reader::{ImageReader, StillFrame};
use super::pending::{Cancellable, Completer, PendingOperation, pending};
use super::types::{
    CaptureRequest, DeviceErrorCode, DeviceEvent, DeviceId, DeviceInfo, EventCallback,
    ImageFormat, LensFacing, OutputTarget, PreviewSurface, SessionEvent, SessionState, Size,
};
use super::{CameraBackend, CameraDevice, CaptureSession};
use crate::config::CaptureConfig;
use crate::errors::{CaptureError, CaptureResult, OpenFailure};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// First enumerated device whose lens faces back
pub fn select_back_facing(devices: &[DeviceInfo]) -> Option<&DeviceInfo> {
    devices.iter().find(|d| d.facing == LensFacing::Back)
}

/// Smallest advertised size by pixel count; ties go to the first enumerated
pub fn select_smallest_size(sizes: &[Size]) -> Option<Size> {
    sizes.iter().copied().min_by_key(Size::area)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Hardware {
    device: Option<Box<dyn CameraDevice>>,
    session: Option<Box<dyn CaptureSession>>,
}

impl Hardware {
    /// Session first, then device. Both slots end up empty.
    fn release(&mut self) -> bool {
        let mut released = false;
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.stop_repeating() {
                debug!(error = %e, "Stopping repeating request during close failed");
            }
            session.close();
            released = true;
        }
        if let Some(mut device) = self.device.take() {
            device.close();
            released = true;
        }
        released
    }
}

#[derive(Default)]
struct CancelState {
    cancelled: AtomicBool,
    in_flight: Mutex<Option<Arc<dyn Cancellable>>>,
}

impl CancelState {
    fn track(&self, operation: Arc<dyn Cancellable>) {
        *lock(&self.in_flight) = Some(operation);
        // cancel() may have run between the caller's check and the store
        if self.cancelled.load(Ordering::Acquire) {
            if let Some(op) = lock(&self.in_flight).take() {
                op.cancel();
            }
        }
    }

    fn untrack(&self) -> Option<Arc<dyn Cancellable>> {
        lock(&self.in_flight).take()
    }
}

/// Cancels a [`DeviceSession`] from outside its owning task
///
/// Cancellation fails the in-flight operation with `Cancelled` and makes
/// every later operation except `close` fail the same way.
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        if let Some(op) = self.state.untrack() {
            if op.cancel() {
                info!(operation = op.label(), "Cancelled in-flight camera operation");
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }
}

/// Owner of one device handle and at most one capture session
pub struct DeviceSession {
    backend: Arc<dyn CameraBackend>,
    executor: ExecutorHandle,
    state: SessionState,
    device_id: Option<DeviceId>,
    hardware: Arc<Mutex<Hardware>>,
    reader: Option<ImageReader>,
    preview: Option<PreviewSurface>,
    still_size: Option<Size>,
    preview_fps: f64,
    reader_max_images: usize,
    still_slot: Arc<Mutex<Option<Completer<StillFrame>>>>,
    cancel: Arc<CancelState>,
}

impl DeviceSession {
    /// Create an idle session whose hardware work runs on `executor`
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        executor: ExecutorHandle,
        config: &CaptureConfig,
    ) -> Self {
        Self {
            backend,
            executor,
            state: SessionState::Idle,
            device_id: None,
            hardware: Arc::new(Mutex::new(Hardware::default())),
            reader: None,
            preview: None,
            still_size: None,
            preview_fps: config.preview_fps,
            reader_max_images: config.reader_max_images,
            still_slot: Arc::new(Mutex::new(None)),
            cancel: Arc::new(CancelState::default()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Device selected by `open`
    pub fn device_id(&self) -> Option<&DeviceId> {
        self.device_id.as_ref()
    }

    /// Resolution negotiated for the still stream
    pub fn still_size(&self) -> Option<Size> {
        self.still_size
    }

    pub fn preview_fps(&self) -> f64 {
        self.preview_fps
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            state: Arc::clone(&self.cancel),
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "Session state transition");
        self.state = next;
    }

    fn fail(&mut self, error: CaptureError) -> CaptureError {
        warn!(state = ?self.state, error = %error, "Camera session failed");
        self.transition(SessionState::Failed);
        error
    }

    fn require(&mut self, operation: &'static str, expected: SessionState) -> CaptureResult<()> {
        if self.cancel.cancelled.load(Ordering::Acquire) && !self.state.is_terminal() {
            if self.state != SessionState::Failed {
                self.transition(SessionState::Failed);
            }
            return Err(CaptureError::Cancelled);
        }
        if self.state != expected {
            return Err(CaptureError::InvalidState {
                operation,
                state: self.state.to_string(),
            });
        }
        Ok(())
    }

    /// Wait for a pending operation while it is visible to the cancel handle
    async fn suspend<T: Send + 'static>(
        &self,
        op: PendingOperation<T>,
        completer: &Completer<T>,
    ) -> CaptureResult<T> {
        self.cancel.track(Arc::new(completer.clone()));
        let outcome = op.wait().await;
        self.cancel.untrack();
        outcome
    }

    /// Run `job` against the hardware slots on the executor thread
    async fn on_executor<R, F>(&self, label: &'static str, job: F) -> CaptureResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Hardware) -> CaptureResult<R> + Send + 'static,
    {
        let (op, completer) = pending::<R>(label);
        let hardware = Arc::clone(&self.hardware);
        self.executor.post(move || {
            let outcome = job(&mut *lock(&hardware));
            let _ = completer.resolve(outcome);
        });
        // A job dropped by a stopped executor surfaces as Cancelled
        op.wait().await
    }

    /// Select the back-facing device and open it
    ///
    /// Resolves once the first open callback arrives. A disconnect or error
    /// delivered after that first callback is ignored.
    pub async fn open(&mut self) -> CaptureResult<()> {
        self.require("open", SessionState::Idle)?;

        let devices = match self.backend.list_devices() {
            Ok(devices) => devices,
            Err(e) => return Err(self.fail(e)),
        };
        let Some(device) = select_back_facing(&devices).map(|d| d.id.clone()) else {
            return Err(self.fail(CaptureError::NoSuitableDevice));
        };

        info!(device = %device, "Opening camera device");
        self.device_id = Some(device.clone());
        self.transition(SessionState::Opening);

        let (op, completer) = pending::<Box<dyn CameraDevice>>("open");
        let callback = open_callback(device.clone(), completer.clone());
        self.cancel.track(Arc::new(completer.clone()));

        let backend = Arc::clone(&self.backend);
        let executor = self.executor.clone();
        let request_device = device.clone();
        let issued = self
            .on_executor("open request", move |_| {
                backend.open_device(&request_device, callback, &executor)
            })
            .await;
        if let Err(e) = issued {
            self.cancel.untrack();
            return Err(self.fail(e));
        }

        match self.suspend(op, &completer).await {
            Ok(handle) => {
                lock(&self.hardware).device = Some(handle);
                self.transition(SessionState::Opened);
                info!(device = %device, "Camera device opened");
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Build the capture session and start the repeating preview
    ///
    /// The still stream uses the smallest size the device advertises for
    /// YUV 4:2:0, independent of the preview surface's size. Only the still
    /// reader gets an image-available listener.
    pub async fn configure_session(&mut self, preview: PreviewSurface) -> CaptureResult<()> {
        self.require("configure a session", SessionState::Opened)?;
        let Some(device) = self.device_id.clone() else {
            return Err(self.fail(CaptureError::SessionConfigure("no open device".into())));
        };

        let sizes = match self
            .backend
            .output_sizes(&device, ImageFormat::Yuv420Flexible)
        {
            Ok(sizes) => sizes,
            Err(e) => return Err(self.fail(e)),
        };
        let Some(still_size) = select_smallest_size(&sizes) else {
            return Err(self.fail(CaptureError::SessionConfigure(format!(
                "device {} advertises no {} sizes",
                device,
                ImageFormat::Yuv420Flexible
            ))));
        };
        info!(
            device = %device,
            still = %still_size,
            preview = %preview.size(),
            "Configuring capture session"
        );

        let reader = ImageReader::new(
            still_size,
            ImageFormat::Yuv420Flexible,
            self.reader_max_images,
            self.executor.clone(),
        );
        self.transition(SessionState::Configuring);

        let (op, completer) = pending::<Box<dyn CaptureSession>>("configure");
        let callback = configure_callback(completer.clone());
        self.cancel.track(Arc::new(completer.clone()));

        let outputs = vec![
            OutputTarget::Preview(preview.clone()),
            OutputTarget::Reader(reader.surface()),
        ];
        let executor = self.executor.clone();
        let issued = self
            .on_executor("configure request", move |hw| match hw.device.as_mut() {
                Some(device) => device.create_session(outputs, callback, &executor),
                None => Err(CaptureError::SessionConfigure("device already released".into())),
            })
            .await;
        if let Err(e) = issued {
            self.cancel.untrack();
            return Err(self.fail(e));
        }

        let session = match self.suspend(op, &completer).await {
            Ok(session) => session,
            Err(e) => {
                reader.close();
                return Err(self.fail(e));
            }
        };

        let request = CaptureRequest::preview(preview.id(), self.preview_fps);
        let started = self
            .on_executor("preview request", move |hw| {
                if let Some(mut previous) = hw.session.replace(session) {
                    previous.close();
                }
                match hw.session.as_mut() {
                    Some(session) => session.set_repeating_request(request),
                    None => Err(CaptureError::SessionConfigure("session vanished".into())),
                }
            })
            .await;
        if let Err(e) = started {
            reader.close();
            return Err(self.fail(e));
        }

        reader.set_listener(still_listener(Arc::clone(&self.still_slot)));
        self.reader = Some(reader);
        self.preview = Some(preview);
        self.still_size = Some(still_size);
        self.transition(SessionState::Streaming);
        info!(fps = self.preview_fps, "Preview streaming");
        Ok(())
    }

    /// Re-issue the repeating preview request at `fps` frames per second
    pub async fn start_preview(&mut self, fps: f64) -> CaptureResult<()> {
        self.require("start the preview", SessionState::Streaming)?;
        if !fps.is_finite() || fps <= 0.0 {
            return Err(CaptureError::Config(format!(
                "preview rate must be positive, got {}",
                fps
            )));
        }
        let Some(preview) = self.preview.as_ref() else {
            return Err(CaptureError::InvalidState {
                operation: "start the preview",
                state: self.state.to_string(),
            });
        };

        let request = CaptureRequest::preview(preview.id(), fps);
        self.on_executor("preview request", move |hw| match hw.session.as_mut() {
            Some(session) => session.set_repeating_request(request),
            None => Err(CaptureError::Backend("no active session".into())),
        })
        .await?;
        self.preview_fps = fps;
        info!(fps, "Preview rate changed");
        Ok(())
    }

    /// Capture one still on the reader surface
    ///
    /// The previous [`StillFrame`] must have been dropped. The repeating
    /// preview keeps running while the still is in flight.
    pub async fn capture_still(&mut self) -> CaptureResult<StillFrame> {
        self.require("capture a still", SessionState::Streaming)?;
        let Some(reader) = self.reader.clone() else {
            return Err(CaptureError::InvalidState {
                operation: "capture a still",
                state: self.state.to_string(),
            });
        };
        if reader.acquired_count() > 0 {
            return Err(CaptureError::FrameInUse);
        }

        self.transition(SessionState::CapturingStill);
        let (op, completer) = pending::<StillFrame>("capture");
        *lock(&self.still_slot) = Some(completer.clone());

        let request = CaptureRequest::still(reader.id());
        let issued = self
            .on_executor("still request", move |hw| match hw.session.as_mut() {
                Some(session) => session.capture(request),
                None => Err(CaptureError::Backend("no active session".into())),
            })
            .await;
        if let Err(e) = issued {
            lock(&self.still_slot).take();
            self.transition(SessionState::Streaming);
            return Err(e);
        }

        let outcome = self.suspend(op, &completer).await;
        lock(&self.still_slot).take();
        match outcome {
            Ok(frame) => {
                self.transition(SessionState::Streaming);
                debug!(
                    width = frame.width(),
                    height = frame.height(),
                    timestamp_ns = frame.timestamp_ns(),
                    "Still captured"
                );
                Ok(frame)
            }
            Err(e) if e.is_contract_violation() => {
                self.transition(SessionState::Streaming);
                Err(e)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Release the session and device
    ///
    /// Valid from every state. Closing an already closed session returns
    /// immediately without touching the hardware.
    pub async fn close(&mut self) -> CaptureResult<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.transition(SessionState::Closing);

        // An operation abandoned mid-wait (e.g. a dropped timeout) still holds a completer
        if let Some(op) = self.cancel.untrack() {
            op.cancel();
        }
        if let Some(completer) = lock(&self.still_slot).take() {
            completer.cancel();
        }
        if let Some(reader) = self.reader.take() {
            reader.close();
        }

        let released = self
            .on_executor("close", |hw| Ok(hw.release()))
            .await;
        if released.is_err() {
            // Executor gone; release inline so nothing leaks
            lock(&self.hardware).release();
        }

        self.preview = None;
        self.transition(SessionState::Closed);
        info!(device = ?self.device_id, "Camera session closed");
        Ok(())
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        debug!(state = ?self.state, "DeviceSession dropped, releasing hardware");
        if let Some(op) = self.cancel.untrack() {
            op.cancel();
        }
        if let Some(reader) = self.reader.take() {
            reader.close();
        }
        let hardware = Arc::clone(&self.hardware);
        if !self.executor.post(move || {
            lock(&hardware).release();
        }) {
            lock(&self.hardware).release();
        }
    }
}

/// Routes open events to the pending open; only the first one counts
fn open_callback(
    device: DeviceId,
    completer: Completer<Box<dyn CameraDevice>>,
) -> EventCallback<DeviceEvent> {
    Arc::new(move |event: DeviceEvent| {
        let outcome = match event {
            DeviceEvent::Opened(handle) => Ok(handle),
            DeviceEvent::Disconnected => {
                warn!(device = %device, "Camera device disconnected while opening");
                Err(CaptureError::DeviceOpen {
                    device: device.clone(),
                    cause: OpenFailure::Disconnected,
                })
            }
            DeviceEvent::Error(code) => {
                log_device_error(&device, code);
                Err(CaptureError::DeviceOpen {
                    device: device.clone(),
                    cause: OpenFailure::Error(code),
                })
            }
        };
        // A handle that arrives after the open already resolved is closed here
        if let Err(Ok(mut late)) = completer.resolve(outcome) {
            warn!(device = %device, "Closing device opened after the open resolved");
            late.close();
        }
    })
}

fn configure_callback(
    completer: Completer<Box<dyn CaptureSession>>,
) -> EventCallback<SessionEvent> {
    Arc::new(move |event: SessionEvent| {
        let outcome = match event {
            SessionEvent::Configured(session) => Ok(session),
            SessionEvent::ConfigureFailed => Err(CaptureError::SessionConfigure(
                "capture session configuration failed".into(),
            )),
        };
        if let Err(Ok(mut late)) = completer.resolve(outcome) {
            late.close();
        }
    })
}

/// Image-available listener for the still reader
fn still_listener(
    slot: Arc<Mutex<Option<Completer<StillFrame>>>>,
) -> super::image_reader::ImageListener {
    Arc::new(move |reader: &ImageReader| {
        let Some(image) = reader.acquire_latest() else {
            return;
        };
        let Some(completer) = lock(&slot).take() else {
            debug!(reader = %reader.id(), "Still image with no pending capture, releasing");
            return;
        };
        // If the capture was cancelled the frame comes back and its slot is released on drop
        let _ = completer.resolve(image.into_frame());
    })
}

fn log_device_error(device: &DeviceId, code: DeviceErrorCode) {
    warn!(
        device = %device,
        code = code.raw(),
        "Camera open error: {}",
        code.describe()
    );
}
