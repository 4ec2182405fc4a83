// SPDX-License-Identifier: MPL-2.0

//! Async still capture pipeline
//!
//! ```text
//! DeviceSession → StillFrame → PlaneConverter → ImageEncoder → PhotoStore
//!       ↓                          (frame released here)
//! Preview continues uninterrupted
//! ```
//!
//! # Pipeline Stages
//!
//! 1. **Session**: open the back camera and start the low-rate preview,
//!    retrying on a fresh session after transient hardware failures
//! 2. **Capture**: one still from the reader surface
//! 3. **Conversion**: copy out luminance / NV21, then release the frame
//! 4. **Encoding**: PNG/WEBP/JPEG on the blocking pool
//! 5. **Disk I/O**: write without overwriting, then notify the media index
//!
//! Each output product succeeds or fails on its own; a WEBP failure never
//! blocks the PNG.

pub mod encoding;

pub use encoding::{EncodeKind, EncodeService, EncodedImage, ImageEncoder};

use crate::backends::camera::{
    CallbackExecutor, CameraBackend, CancelHandle, DeviceSession, PreviewSurface, SessionState,
};
use crate::config::CaptureConfig;
use crate::constants::{OutputProduct, capture};
use crate::errors::{CaptureError, CaptureResult};
use crate::media::frame::FrameBuffer;
use crate::media::mask::Stencil;
use crate::media::plane_converter::{to_alpha_mask, to_luminance, to_nv21};
use crate::storage::{
    FsPhotoStore, LogMediaIndexer, MediaIndexer, PhotoStore, persist_async, suggest_filename,
};
use chrono::NaiveDateTime;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Bytes copied out of a frame for one product
enum Payload {
    Encode {
        kind: EncodeKind,
        buffer: Vec<u8>,
    },
    Raw(Vec<u8>),
}

fn convert(
    frame: &FrameBuffer,
    product: OutputProduct,
    stencil: &Stencil,
) -> CaptureResult<Payload> {
    Ok(match product {
        OutputProduct::GrayscalePng => Payload::Encode {
            kind: EncodeKind::GrayscalePng,
            buffer: to_luminance(frame)?,
        },
        OutputProduct::Jpeg => Payload::Encode {
            kind: EncodeKind::Jpeg,
            buffer: to_luminance(frame)?,
        },
        OutputProduct::AlphaWebp => Payload::Encode {
            kind: EncodeKind::AlphaWebp,
            buffer: to_alpha_mask(frame)?.paint(stencil).into_raw(),
        },
        OutputProduct::Nv21 => Payload::Raw(to_nv21(frame)?),
    })
}

/// Await `fut`, failing with `Timeout` once `deadline` elapses
async fn with_deadline<T, F>(
    operation: &'static str,
    deadline: Option<Duration>,
    fut: F,
) -> CaptureResult<T>
where
    F: Future<Output = CaptureResult<T>>,
{
    match deadline {
        Some(after) => match tokio::time::timeout(after, fut).await {
            Ok(outcome) => outcome,
            Err(_) => Err(CaptureError::Timeout { operation, after }),
        },
        None => fut.await,
    }
}

/// Result for one output product
#[derive(Debug, Clone, PartialEq)]
pub struct ProductOutcome {
    pub product: OutputProduct,
    pub result: CaptureResult<PathBuf>,
}

/// Everything one still produced
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureReport {
    pub captured_at: NaiveDateTime,
    pub width: u32,
    pub height: u32,
    pub outcomes: Vec<ProductOutcome>,
}

impl CaptureReport {
    /// Paths written successfully
    pub fn saved(&self) -> Vec<&PathBuf> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .collect()
    }

    pub fn failures(&self) -> Vec<(OutputProduct, &CaptureError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.product, e)))
            .collect()
    }

    /// True when every product was written
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn outcome(&self, product: OutputProduct) -> Option<&ProductOutcome> {
        self.outcomes.iter().find(|o| o.product == product)
    }
}

/// Drives the session and feeds stills through conversion, encoding and storage
pub struct CaptureOrchestrator {
    backend: Arc<dyn CameraBackend>,
    encoder: Arc<dyn EncodeService>,
    store: Arc<dyn PhotoStore>,
    indexer: Option<Arc<dyn MediaIndexer>>,
    config: CaptureConfig,
    // Dropped before the executor so its release job still runs
    session: Option<DeviceSession>,
    executor: CallbackExecutor,
}

impl CaptureOrchestrator {
    /// Create an orchestrator with the `image` encoder and a filesystem store
    pub fn new(backend: Arc<dyn CameraBackend>, config: CaptureConfig) -> CaptureResult<Self> {
        config.validate()?;
        let indexer: Option<Arc<dyn MediaIndexer>> = if config.register_with_media_index {
            Some(Arc::new(LogMediaIndexer))
        } else {
            None
        };
        Ok(Self {
            backend,
            encoder: Arc::new(ImageEncoder::with_jpeg_quality(config.jpeg_quality)),
            store: Arc::new(FsPhotoStore::new(config.output_dir.clone())),
            indexer,
            session: None,
            executor: CallbackExecutor::start(capture::CALLBACK_THREAD_NAME),
            config,
        })
    }

    /// Replace the encode service
    pub fn with_encoder(mut self, encoder: Arc<dyn EncodeService>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Replace the file collaborator
    pub fn with_store(mut self, store: Arc<dyn PhotoStore>) -> Self {
        self.store = store;
        self
    }

    /// Replace the media indexer; only used when registration is enabled
    pub fn with_indexer(mut self, indexer: Arc<dyn MediaIndexer>) -> Self {
        if self.config.register_with_media_index {
            self.indexer = Some(indexer);
        }
        self
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn session_state(&self) -> Option<SessionState> {
        self.session.as_ref().map(DeviceSession::state)
    }

    /// Cancel handle of the current session
    pub fn cancel_handle(&self) -> Option<CancelHandle> {
        self.session.as_ref().map(DeviceSession::cancel_handle)
    }

    /// Open the device and start streaming into `preview`
    ///
    /// Transient hardware failures (open errors, configure failures,
    /// deadlines) are retried `open_retries` times, each on a fresh session
    /// starting from Idle.
    pub async fn start(&mut self, preview: PreviewSurface) -> CaptureResult<()> {
        if let Some(mut previous) = self.session.take() {
            previous.close().await?;
        }

        let attempts = self.config.open_retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut session = DeviceSession::new(
                Arc::clone(&self.backend),
                self.executor.handle(),
                &self.config,
            );

            match self.bring_up(&mut session, preview.clone()).await {
                Ok(()) => {
                    info!(attempt, still = ?session.still_size(), "Capture session ready");
                    self.session = Some(session);
                    return Ok(());
                }
                Err(e) => {
                    session.close().await?;
                    if e.is_transient_hardware() && attempt < attempts {
                        warn!(attempt, attempts, error = %e, "Session start failed, retrying");
                        continue;
                    }
                    error!(attempt, error = %e, "Session start failed");
                    return Err(e);
                }
            }
        }
    }

    async fn bring_up(
        &self,
        session: &mut DeviceSession,
        preview: PreviewSurface,
    ) -> CaptureResult<()> {
        with_deadline("open", self.config.open_timeout(), session.open()).await?;
        with_deadline(
            "configure",
            self.config.configure_timeout(),
            session.configure_session(preview),
        )
        .await
    }

    /// Change the preview rate of the running session
    pub async fn set_preview_rate(&mut self, fps: f64) -> CaptureResult<()> {
        self.session_mut("change the preview rate")?
            .start_preview(fps)
            .await
    }

    fn session_mut(&mut self, operation: &'static str) -> CaptureResult<&mut DeviceSession> {
        self.session.as_mut().ok_or(CaptureError::InvalidState {
            operation,
            state: "not started".into(),
        })
    }

    /// Capture one still and write every configured product
    ///
    /// Session and conversion errors abort the capture. Encode and storage
    /// errors are recorded per product in the report.
    pub async fn capture(&mut self) -> CaptureResult<CaptureReport> {
        let products = self.config.products.clone();
        let stencil = self.config.stencil();

        let frame = self.session_mut("capture")?.capture_still().await?;
        let captured_at = chrono::Local::now().naive_local();
        let (width, height) = (frame.width(), frame.height());

        let mut payloads = Vec::with_capacity(products.len());
        for product in &products {
            payloads.push((*product, convert(&frame, *product, &stencil)?));
        }
        // Bytes are copied out; hand the native buffer back to the reader
        frame.release();

        let mut outcomes = Vec::with_capacity(payloads.len());
        for (product, payload) in payloads {
            let result = self
                .write_product(product, payload, width, height, captured_at)
                .await;
            if let Err(e) = &result {
                warn!(product = product.display_name(), error = %e, "Output product failed");
            }
            outcomes.push(ProductOutcome { product, result });
        }

        Ok(CaptureReport {
            captured_at,
            width,
            height,
            outcomes,
        })
    }

    async fn write_product(
        &self,
        product: OutputProduct,
        payload: Payload,
        width: u32,
        height: u32,
        at: NaiveDateTime,
    ) -> CaptureResult<PathBuf> {
        let (data, mime_type) = match payload {
            Payload::Encode { kind, buffer } => {
                let encoded =
                    encoding::encode_async(Arc::clone(&self.encoder), buffer, width, height, kind)
                        .await?;
                (encoded.data, kind.mime_type())
            }
            Payload::Raw(bytes) => (bytes, "application/octet-stream"),
        };

        let filename = suggest_filename(self.config.prefix_for(product), at, product.extension());
        let path = persist_async(Arc::clone(&self.store), data, filename).await?;

        if let Some(indexer) = &self.indexer {
            // The file is already on disk; an index failure is only logged
            if let Err(e) = indexer.register(&path, mime_type) {
                warn!(path = %path.display(), error = %e, "Media index registration failed");
            }
        }
        Ok(path)
    }

    /// Close the current session, if any
    pub async fn stop(&mut self) -> CaptureResult<()> {
        match self.session.take() {
            Some(mut session) => session.close().await,
            None => Ok(()),
        }
    }

    /// Close the session and stop the callback thread
    pub async fn shutdown(mut self) -> CaptureResult<()> {
        let closed = self.stop().await;
        self.executor.shutdown();
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::Size;
    use crate::backends::camera::simulated::{OpenScript, SimulatedBackend};
    use crate::backends::camera::types::DeviceErrorCode;

    fn config_in(dir: &std::path::Path) -> CaptureConfig {
        CaptureConfig {
            output_dir: dir.to_path_buf(),
            register_with_media_index: false,
            ..CaptureConfig::default()
        }
    }

    fn preview() -> PreviewSurface {
        PreviewSurface::new(Size::new(320, 240))
    }

    #[tokio::test]
    async fn test_with_deadline_times_out() {
        let result: CaptureResult<()> = with_deadline(
            "open",
            Some(Duration::from_millis(10)),
            std::future::pending(),
        )
        .await;
        assert!(matches!(result, Err(CaptureError::Timeout { operation: "open", .. })));
    }

    #[tokio::test]
    async fn test_retry_after_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SimulatedBackend::builder()
            .open_script(vec![OpenScript::Error(DeviceErrorCode::MaxCamerasInUse)])
            .build();
        let mut config = config_in(dir.path());
        config.open_retries = 1;

        let mut orchestrator = CaptureOrchestrator::new(Arc::new(backend.clone()), config).unwrap();
        orchestrator.start(preview()).await.unwrap();
        assert_eq!(orchestrator.session_state(), Some(SessionState::Streaming));
        assert_eq!(backend.calls().opens, 2);
        orchestrator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_no_retry_without_budget() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SimulatedBackend::builder()
            .open_script(vec![OpenScript::Disconnect])
            .build();
        let mut orchestrator =
            CaptureOrchestrator::new(Arc::new(backend.clone()), config_in(dir.path())).unwrap();

        let err = orchestrator.start(preview()).await.unwrap_err();
        assert!(err.is_transient_hardware());
        assert_eq!(orchestrator.session_state(), None);
        assert_eq!(backend.calls().opens, 1);
    }

    #[tokio::test]
    async fn test_open_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SimulatedBackend::builder()
            .open_script(vec![OpenScript::Silent])
            .build();
        let mut config = config_in(dir.path());
        config.open_timeout_ms = Some(30);

        let mut orchestrator = CaptureOrchestrator::new(Arc::new(backend), config).unwrap();
        let err = orchestrator.start(preview()).await.unwrap_err();
        assert!(matches!(err, CaptureError::Timeout { operation: "open", .. }));
    }

    #[tokio::test]
    async fn test_capture_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SimulatedBackend::builder().build();
        let mut orchestrator =
            CaptureOrchestrator::new(Arc::new(backend), config_in(dir.path())).unwrap();
        let err = orchestrator.capture().await.unwrap_err();
        assert!(matches!(err, CaptureError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_frame_released_after_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SimulatedBackend::builder().build();
        let mut config = config_in(dir.path());
        config.reader_max_images = 1;
        let mut orchestrator = CaptureOrchestrator::new(Arc::new(backend), config).unwrap();
        orchestrator.start(preview()).await.unwrap();

        // A single-slot reader only works if every frame goes back to the pool
        for _ in 0..3 {
            let report = orchestrator.capture().await.unwrap();
            assert!(report.is_complete());
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        orchestrator.shutdown().await.unwrap();
    }
}
