// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use stillcam::CaptureConfig;
use stillcam::constants::OutputProduct;

#[test]
fn test_config_default() {
    // Test that default config can be created and is valid
    let config = CaptureConfig::default();

    assert_eq!(config.preview_fps, 4.0, "Preview should be a low-rate viewfinder");
    assert_eq!(config.reader_max_images, 3);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings").join("capture.json");

    let mut config = CaptureConfig::default();
    config.products = vec![OutputProduct::GrayscalePng, OutputProduct::Nv21];
    config.open_retries = 2;
    config.output_dir = dir.path().join("out");
    config.save(&path).unwrap();

    let loaded = CaptureConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_config_load_rejects_invalid_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.json");
    std::fs::write(&path, r#"{ "reader_max_images": 0 }"#).unwrap();

    let err = CaptureConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("reader_max_images"));
}

#[test]
fn test_config_load_rejects_malformed_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(
        CaptureConfig::load(&path),
        Err(stillcam::CaptureError::Config(_))
    ));
}
