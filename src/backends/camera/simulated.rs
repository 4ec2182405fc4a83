// SPDX-License-Identifier: GPL-3.0-only

//! Software camera backend
//!
//! Produces synthetic YUV 4:2:0 stills with a configurable plane layout and
//! scripts the open/configure outcomes, including the racing disconnect and
//! error callbacks real hardware can deliver. Every hardware call is counted
//! so tests can check that an operation did (or did not) reach the device.

use super::executor::ExecutorHandle;
use super::image_reader::{NativeImage, ReaderSurface};
use super::types::{
    BackendResult, CaptureRequest, DeviceErrorCode, DeviceEvent, DeviceId, DeviceInfo,
    EventCallback, ImageFormat, LensFacing, OutputTarget, SessionEvent, Size,
};
use super::{CameraBackend, CameraDevice, CaptureSession};
use crate::errors::CaptureError;
use crate::media::frame::{CropRect, Plane};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Outcome of one scripted open attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenScript {
    Succeed,
    Disconnect,
    Error(DeviceErrorCode),
    /// Disconnect immediately followed by an error for the same request
    DisconnectThenError(DeviceErrorCode),
    ErrorThenDisconnect(DeviceErrorCode),
    /// The device never answers
    Silent,
}

/// How chroma is laid out in synthetic frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaLayout {
    /// Separate U and V planes, pixel stride 1
    Planar,
    /// U and V share one interleaved buffer, pixel stride 2
    SemiPlanar,
}

/// Plane geometry of synthetic stills
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub chroma: ChromaLayout,
    /// Bytes of padding at the end of every luminance row
    pub row_padding: usize,
    /// Border around the crop rectangle on every side; keep it even
    pub crop_inset: u32,
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self {
            chroma: ChromaLayout::SemiPlanar,
            row_padding: 0,
            crop_inset: 0,
        }
    }
}

/// Luminance the simulator writes at native plane position (`x`, `y`)
pub fn synthetic_luma(x: usize, y: usize) -> u8 {
    ((x * 7 + y * 13) % 256) as u8
}

/// Chroma values written to every U and V sample
pub const SYNTHETIC_U: u8 = 90;
pub const SYNTHETIC_V: u8 = 160;

/// Snapshot of hardware calls made so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub opens: usize,
    pub device_closes: usize,
    pub sessions_created: usize,
    pub session_closes: usize,
    pub repeating_requests: usize,
    pub captures: usize,
}

struct SimState {
    devices: Vec<DeviceInfo>,
    sizes: Vec<Size>,
    layout: FrameLayout,
    deliver_stills: bool,
    open_script: Mutex<VecDeque<OpenScript>>,
    configure_script: Mutex<VecDeque<bool>>,
    fail_configure: bool,
    counts: Mutex<CallCounts>,
    last_repeating: Mutex<Option<CaptureRequest>>,
    // Callbacks of silent opens, kept so their completers never drop
    parked: Mutex<Vec<EventCallback<DeviceEvent>>>,
    clock_ns: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimState {
    fn count(&self, f: impl FnOnce(&mut CallCounts)) {
        f(&mut lock(&self.counts));
    }

    fn synthesize(&self, size: Size) -> NativeImage {
        let inset = self.layout.crop_inset as usize;
        let (w, h) = (size.width as usize, size.height as usize);
        let (native_w, native_h) = (w + 2 * inset, h + 2 * inset);

        let row_stride = native_w + self.layout.row_padding;
        let mut y = vec![0u8; row_stride * native_h];
        for row in 0..native_h {
            for col in 0..native_w {
                y[row * row_stride + col] = synthetic_luma(col, row);
            }
        }

        let (chroma_w, chroma_h) = (native_w.div_ceil(2), native_h.div_ceil(2));
        let (u_plane, v_plane) = match self.layout.chroma {
            ChromaLayout::Planar => {
                let stride = chroma_w + self.layout.row_padding / 2;
                (
                    Plane::new(vec![SYNTHETIC_U; stride * chroma_h], stride, 1),
                    Plane::new(vec![SYNTHETIC_V; stride * chroma_h], stride, 1),
                )
            }
            ChromaLayout::SemiPlanar => {
                let stride = chroma_w * 2 + self.layout.row_padding;
                let mut uv = vec![0u8; stride * chroma_h];
                for row in 0..chroma_h {
                    for col in 0..chroma_w {
                        uv[row * stride + col * 2] = SYNTHETIC_U;
                        uv[row * stride + col * 2 + 1] = SYNTHETIC_V;
                    }
                }
                let v = uv[1..].to_vec();
                uv.truncate(uv.len() - 1);
                (Plane::new(uv, stride, 2), Plane::new(v, stride, 2))
            }
        };

        let inset = self.layout.crop_inset;
        NativeImage {
            format: ImageFormat::Yuv420Flexible,
            width: size.width,
            height: size.height,
            crop: CropRect::new(inset, inset, inset + size.width, inset + size.height),
            planes: vec![Plane::new(y, row_stride, 1), u_plane, v_plane],
            timestamp_ns: self.clock_ns.fetch_add(33_333_333, Ordering::Relaxed),
        }
    }
}

/// Builder for [`SimulatedBackend`]
pub struct SimulatedBackendBuilder {
    devices: Vec<DeviceInfo>,
    sizes: Vec<Size>,
    layout: FrameLayout,
    deliver_stills: bool,
    open_script: Vec<OpenScript>,
    configure_script: Vec<bool>,
    fail_configure: bool,
}

impl SimulatedBackendBuilder {
    pub fn devices(mut self, devices: Vec<DeviceInfo>) -> Self {
        self.devices = devices;
        self
    }

    /// Sizes advertised for YUV 4:2:0, in enumeration order
    pub fn sizes(mut self, sizes: Vec<Size>) -> Self {
        self.sizes = sizes;
        self
    }

    pub fn layout(mut self, layout: FrameLayout) -> Self {
        self.layout = layout;
        self
    }

    /// When false, still requests are accepted but never produce an image
    pub fn deliver_stills(mut self, deliver: bool) -> Self {
        self.deliver_stills = deliver;
        self
    }

    /// Outcomes for successive opens; once exhausted every open succeeds
    pub fn open_script(mut self, script: Vec<OpenScript>) -> Self {
        self.open_script = script;
        self
    }

    /// Fail every session configuration
    pub fn fail_configure(mut self, fail: bool) -> Self {
        self.fail_configure = fail;
        self
    }

    /// Per-attempt configure outcomes (`false` fails); falls back to `fail_configure`
    pub fn configure_script(mut self, script: Vec<bool>) -> Self {
        self.configure_script = script;
        self
    }

    pub fn build(self) -> SimulatedBackend {
        SimulatedBackend {
            state: Arc::new(SimState {
                devices: self.devices,
                sizes: self.sizes,
                layout: self.layout,
                deliver_stills: self.deliver_stills,
                open_script: Mutex::new(self.open_script.into()),
                configure_script: Mutex::new(self.configure_script.into()),
                fail_configure: self.fail_configure,
                counts: Mutex::new(CallCounts::default()),
                last_repeating: Mutex::new(None),
                parked: Mutex::new(Vec::new()),
                clock_ns: AtomicU64::new(1_000_000),
            }),
        }
    }
}

/// In-process camera backend
#[derive(Clone)]
pub struct SimulatedBackend {
    state: Arc<SimState>,
}

impl SimulatedBackend {
    /// One front and one back device advertising a few small sizes
    pub fn builder() -> SimulatedBackendBuilder {
        SimulatedBackendBuilder {
            devices: vec![
                DeviceInfo {
                    id: DeviceId::new("1"),
                    facing: LensFacing::Front,
                },
                DeviceInfo {
                    id: DeviceId::new("0"),
                    facing: LensFacing::Back,
                },
            ],
            sizes: vec![Size::new(16, 16), Size::new(8, 8), Size::new(4, 4)],
            layout: FrameLayout::default(),
            deliver_stills: true,
            open_script: Vec::new(),
            configure_script: Vec::new(),
            fail_configure: false,
        }
    }

    pub fn calls(&self) -> CallCounts {
        *lock(&self.state.counts)
    }

    pub fn last_repeating_request(&self) -> Option<CaptureRequest> {
        lock(&self.state.last_repeating).clone()
    }
}

impl CameraBackend for SimulatedBackend {
    fn list_devices(&self) -> BackendResult<Vec<DeviceInfo>> {
        Ok(self.state.devices.clone())
    }

    fn output_sizes(&self, device: &DeviceId, format: ImageFormat) -> BackendResult<Vec<Size>> {
        if !self.state.devices.iter().any(|d| &d.id == device) {
            return Err(CaptureError::Backend(format!("unknown device {}", device)));
        }
        match format {
            ImageFormat::Yuv420Flexible => Ok(self.state.sizes.clone()),
            _ => Ok(Vec::new()),
        }
    }

    fn open_device(
        &self,
        device: &DeviceId,
        callback: EventCallback<DeviceEvent>,
        executor: &ExecutorHandle,
    ) -> BackendResult<()> {
        if !self.state.devices.iter().any(|d| &d.id == device) {
            return Err(CaptureError::Backend(format!("unknown device {}", device)));
        }
        self.state.count(|c| c.opens += 1);
        let script = lock(&self.state.open_script)
            .pop_front()
            .unwrap_or(OpenScript::Succeed);
        debug!(device = %device, script = ?script, "Simulated open");

        let deliver = |event: DeviceEvent| {
            let callback = Arc::clone(&callback);
            executor.post(move || callback(event));
        };
        match script {
            OpenScript::Succeed => deliver(DeviceEvent::Opened(Box::new(SimulatedDevice {
                id: device.clone(),
                state: Arc::clone(&self.state),
                closed: false,
            }))),
            OpenScript::Disconnect => deliver(DeviceEvent::Disconnected),
            OpenScript::Error(code) => deliver(DeviceEvent::Error(code)),
            OpenScript::DisconnectThenError(code) => {
                deliver(DeviceEvent::Disconnected);
                deliver(DeviceEvent::Error(code));
            }
            OpenScript::ErrorThenDisconnect(code) => {
                deliver(DeviceEvent::Error(code));
                deliver(DeviceEvent::Disconnected);
            }
            OpenScript::Silent => lock(&self.state.parked).push(Arc::clone(&callback)),
        }
        Ok(())
    }
}

struct SimulatedDevice {
    id: DeviceId,
    state: Arc<SimState>,
    closed: bool,
}

impl CameraDevice for SimulatedDevice {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn create_session(
        &mut self,
        outputs: Vec<OutputTarget>,
        callback: EventCallback<SessionEvent>,
        executor: &ExecutorHandle,
    ) -> BackendResult<()> {
        if self.closed {
            return Err(CaptureError::Backend("device is closed".into()));
        }
        self.state.count(|c| c.sessions_created += 1);
        let succeed = lock(&self.state.configure_script)
            .pop_front()
            .unwrap_or(!self.state.fail_configure);

        let event = if succeed {
            SessionEvent::Configured(Box::new(SimulatedSession {
                state: Arc::clone(&self.state),
                outputs,
                executor: executor.clone(),
                closed: false,
            }))
        } else {
            SessionEvent::ConfigureFailed
        };
        executor.post(move || callback(event));
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.count(|c| c.device_closes += 1);
        }
    }
}

struct SimulatedSession {
    state: Arc<SimState>,
    outputs: Vec<OutputTarget>,
    executor: ExecutorHandle,
    closed: bool,
}

impl SimulatedSession {
    fn check_targets(&self, request: &CaptureRequest) -> BackendResult<()> {
        if self.closed {
            return Err(CaptureError::Backend("session is closed".into()));
        }
        for target in &request.targets {
            if !self.outputs.iter().any(|o| o.id() == *target) {
                return Err(CaptureError::Backend(format!(
                    "{} is not an output of this session",
                    target
                )));
            }
        }
        Ok(())
    }

    fn reader_for(&self, request: &CaptureRequest) -> Option<ReaderSurface> {
        self.outputs.iter().find_map(|o| match o {
            OutputTarget::Reader(surface) if request.targets.contains(&surface.id()) => {
                Some(surface.clone())
            }
            _ => None,
        })
    }
}

impl CaptureSession for SimulatedSession {
    fn set_repeating_request(&mut self, request: CaptureRequest) -> BackendResult<()> {
        self.check_targets(&request)?;
        self.state.count(|c| c.repeating_requests += 1);
        *lock(&self.state.last_repeating) = Some(request);
        Ok(())
    }

    fn capture(&mut self, request: CaptureRequest) -> BackendResult<()> {
        self.check_targets(&request)?;
        self.state.count(|c| c.captures += 1);
        if !self.state.deliver_stills {
            return Ok(());
        }
        if let Some(surface) = self.reader_for(&request) {
            let image = self.state.synthesize(surface.size());
            self.executor.post(move || {
                surface.submit(image);
            });
        }
        Ok(())
    }

    fn stop_repeating(&mut self) -> BackendResult<()> {
        *lock(&self.state.last_repeating) = None;
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.count(|c| c.session_closes += 1);
        }
    }
}
