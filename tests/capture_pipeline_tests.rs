// SPDX-License-Identifier: MPL-2.0

//! End-to-end tests driving the orchestrator over the simulated backend

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use stillcam::backends::camera::simulated::{
    ChromaLayout, FrameLayout, OpenScript, SYNTHETIC_U, SYNTHETIC_V, synthetic_luma,
};
use stillcam::backends::camera::{
    CallbackExecutor, DeviceErrorCode, PreviewSurface, SessionState, SimulatedBackend, Size,
};
use stillcam::errors::OpenFailure;
use stillcam::pipelines::photo::{EncodeKind, EncodeService, EncodedImage, ImageEncoder};
use stillcam::storage::{FsPhotoStore, MediaIndexer, PhotoStore};
use stillcam::{
    CaptureConfig, CaptureError, CaptureOrchestrator, CaptureResult, DeviceSession, OutputProduct,
};

fn config_in(dir: &Path, products: Vec<OutputProduct>) -> CaptureConfig {
    CaptureConfig {
        output_dir: dir.to_path_buf(),
        products,
        register_with_media_index: false,
        ..CaptureConfig::default()
    }
}

fn preview() -> PreviewSurface {
    PreviewSurface::new(Size::new(640, 480))
}

/// Delegates to the real encoder but fails every WEBP request
struct FailingWebp(ImageEncoder);

impl EncodeService for FailingWebp {
    fn encode(
        &self,
        buffer: &[u8],
        width: u32,
        height: u32,
        kind: EncodeKind,
    ) -> CaptureResult<EncodedImage> {
        if kind == EncodeKind::AlphaWebp {
            return Err(CaptureError::Encode {
                kind,
                reason: "codec unavailable".into(),
            });
        }
        self.0.encode(buffer, width, height, kind)
    }
}

/// Writes every product under the same name
struct FixedNameStore(FsPhotoStore);

impl PhotoStore for FixedNameStore {
    fn persist(&self, data: &[u8], _filename: &str) -> CaptureResult<PathBuf> {
        self.0.persist(data, "fixed.png")
    }
}

#[derive(Default)]
struct RecordingIndexer {
    registered: Mutex<Vec<(PathBuf, String)>>,
}

impl MediaIndexer for RecordingIndexer {
    fn register(&self, path: &Path, mime_type: &str) -> CaptureResult<()> {
        self.registered
            .lock()
            .unwrap()
            .push((path.to_path_buf(), mime_type.to_string()));
        Ok(())
    }
}

#[tokio::test]
async fn test_all_products_written() {
    let dir = tempfile::tempdir().unwrap();
    let backend = SimulatedBackend::builder()
        .sizes(vec![Size::new(16, 12), Size::new(8, 6)])
        .layout(FrameLayout {
            chroma: ChromaLayout::Planar,
            row_padding: 6,
            crop_inset: 2,
        })
        .build();
    let config = config_in(dir.path(), OutputProduct::ALL.to_vec());
    let mut orchestrator = CaptureOrchestrator::new(Arc::new(backend), config).unwrap();

    orchestrator.start(preview()).await.unwrap();
    let report = orchestrator.capture().await.unwrap();
    assert!(report.is_complete(), "failures: {:?}", report.failures());
    assert_eq!((report.width, report.height), (8, 6));
    assert_eq!(report.saved().len(), 4);

    // PNG carries the cropped luminance, padding excluded
    let png_path = report
        .outcome(OutputProduct::GrayscalePng)
        .unwrap()
        .result
        .clone()
        .unwrap();
    let name = png_path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("mc2_") && name.ends_with(".png"), "{}", name);
    assert_eq!(name.len(), "mc2_".len() + 17 + ".png".len());

    let decoded = image::open(&png_path).unwrap().into_luma8();
    for y in 0..6u32 {
        for x in 0..8u32 {
            assert_eq!(
                decoded.get_pixel(x, y).0[0],
                synthetic_luma(x as usize + 2, y as usize + 2)
            );
        }
    }

    // NV21 dump: luminance then V/U pairs
    let nv21_path = report
        .outcome(OutputProduct::Nv21)
        .unwrap()
        .result
        .clone()
        .unwrap();
    let nv21 = std::fs::read(nv21_path).unwrap();
    assert_eq!(nv21.len(), 8 * 6 * 3 / 2);
    assert_eq!(&nv21[48..50], &[SYNTHETIC_V, SYNTHETIC_U]);

    // WEBP mask is achromatic and opaque
    let webp_path = report
        .outcome(OutputProduct::AlphaWebp)
        .unwrap()
        .result
        .clone()
        .unwrap();
    let mask = image::open(webp_path).unwrap().into_rgba8();
    let px = mask.get_pixel(3, 1).0;
    assert_eq!(px[0], px[1]);
    assert_eq!(px[1], px[2]);
    assert_eq!(px[3], 255);
    assert_eq!(px[0], synthetic_luma(5, 3));

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_webp_failure_does_not_block_png() {
    let dir = tempfile::tempdir().unwrap();
    let backend = SimulatedBackend::builder().build();
    let config = config_in(
        dir.path(),
        vec![OutputProduct::AlphaWebp, OutputProduct::GrayscalePng],
    );
    let mut orchestrator = CaptureOrchestrator::new(Arc::new(backend), config)
        .unwrap()
        .with_encoder(Arc::new(FailingWebp(ImageEncoder::new())));

    orchestrator.start(preview()).await.unwrap();
    let report = orchestrator.capture().await.unwrap();

    let failures = report.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, OutputProduct::AlphaWebp);
    let png = report.outcome(OutputProduct::GrayscalePng).unwrap();
    assert!(png.result.is_ok());
    // Encode failures leave the session streaming
    assert_eq!(orchestrator.session_state(), Some(SessionState::Streaming));
    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_existing_target_is_reported_not_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let backend = SimulatedBackend::builder().build();
    let config = config_in(dir.path(), vec![OutputProduct::GrayscalePng]);
    let mut orchestrator = CaptureOrchestrator::new(Arc::new(backend), config)
        .unwrap()
        .with_store(Arc::new(FixedNameStore(FsPhotoStore::new(dir.path()))));

    orchestrator.start(preview()).await.unwrap();
    let first = orchestrator.capture().await.unwrap();
    assert!(first.is_complete());
    let written = std::fs::read(dir.path().join("fixed.png")).unwrap();

    let second = orchestrator.capture().await.unwrap();
    assert!(matches!(
        second.failures()[0].1,
        CaptureError::TargetExists(_)
    ));
    assert_eq!(std::fs::read(dir.path().join("fixed.png")).unwrap(), written);
    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_media_index_registration() {
    let dir = tempfile::tempdir().unwrap();
    let backend = SimulatedBackend::builder().build();
    let mut config = config_in(dir.path(), vec![OutputProduct::Jpeg]);
    config.register_with_media_index = true;
    let indexer = Arc::new(RecordingIndexer::default());
    let mut orchestrator = CaptureOrchestrator::new(Arc::new(backend), config)
        .unwrap()
        .with_indexer(indexer.clone());

    orchestrator.start(preview()).await.unwrap();
    let report = orchestrator.capture().await.unwrap();

    let registered = indexer.registered.lock().unwrap().clone();
    assert_eq!(registered.len(), 1);
    assert_eq!(&registered[0].0, report.saved()[0]);
    assert_eq!(registered[0].1, "image/jpeg");
    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cancel_makes_capture_fail_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let backend = SimulatedBackend::builder().build();
    let config = config_in(dir.path(), vec![OutputProduct::GrayscalePng]);
    let mut orchestrator = CaptureOrchestrator::new(Arc::new(backend), config).unwrap();
    orchestrator.start(preview()).await.unwrap();

    orchestrator.cancel_handle().unwrap().cancel();
    let err = orchestrator.capture().await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(orchestrator.session_state(), Some(SessionState::Failed));
    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn test_smallest_still_size_is_selected() {
    let executor = CallbackExecutor::start("test-sizes");
    let backend = SimulatedBackend::builder()
        .sizes(vec![Size::new(8, 8), Size::new(16, 16), Size::new(4, 4)])
        .build();
    let mut session = DeviceSession::new(
        Arc::new(backend),
        executor.handle(),
        &CaptureConfig::default(),
    );

    session.open().await.unwrap();
    session.configure_session(preview()).await.unwrap();
    assert_eq!(session.still_size(), Some(Size::new(4, 4)));
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_first_open_callback_wins() {
    let executor = CallbackExecutor::start("test-first-wins");
    let backend = SimulatedBackend::builder()
        .open_script(vec![OpenScript::ErrorThenDisconnect(
            DeviceErrorCode::CameraDisabled,
        )])
        .build();
    let mut session = DeviceSession::new(
        Arc::new(backend),
        executor.handle(),
        &CaptureConfig::default(),
    );

    match session.open().await {
        Err(CaptureError::DeviceOpen { cause, .. }) => {
            assert_eq!(cause, OpenFailure::Error(DeviceErrorCode::CameraDisabled));
        }
        other => panic!("unexpected open outcome: {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Failed);
}
