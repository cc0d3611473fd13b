//! Version-range dispatch across firmware implementations

use anyhow::Result;
use motionkit_communication::{
    FirmwareSelector, FirmwareVersion, GrblService, RecordingTransport,
    StreamingConfig, TinygService, VersionRange,
};
use motionkit_core::{Error, FirmwareError};
use std::sync::Arc;

fn version(s: &str) -> FirmwareVersion {
    s.parse().unwrap()
}

fn range(min: &str, max: &str) -> VersionRange {
    VersionRange::new(version(min), version(max)).unwrap()
}

fn selector() -> Result<FirmwareSelector> {
    let mut selector = FirmwareSelector::new();
    selector.register(
        range("400.00", "440.99"),
        Arc::new(TinygService::new(
            Arc::new(RecordingTransport::new()),
            StreamingConfig::default(),
        )),
    )?;
    selector.register(
        range("441.00", "460.00"),
        Arc::new(GrblService::new(
            Arc::new(RecordingTransport::new()),
            StreamingConfig::default(),
        )),
    )?;
    Ok(selector)
}

#[test]
fn test_resolution_is_deterministic_over_disjoint_ranges() -> Result<()> {
    let selector = selector()?;
    assert_eq!(selector.len(), 2);

    assert_eq!(selector.resolve(version("400.00"))?.name(), "tinyg");
    assert_eq!(selector.resolve(version("440.99"))?.name(), "tinyg");
    assert_eq!(selector.resolve(version("441.00"))?.name(), "grbl");
    assert_eq!(selector.resolve(version("450.00"))?.name(), "grbl");
    Ok(())
}

#[test]
fn test_unsupported_version_is_an_error() -> Result<()> {
    let selector = selector()?;
    match selector.resolve(version("999.99")) {
        Err(Error::Firmware(FirmwareError::UnsupportedVersion { version })) => {
            assert_eq!(version, "999.99");
        }
        other => panic!("Expected UnsupportedVersion, got {other:?}"),
    }
    match selector.resolve(version("399.99")) {
        Err(Error::Firmware(FirmwareError::UnsupportedVersion { .. })) => {}
        other => panic!("Expected UnsupportedVersion, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_overlapping_registration_is_rejected() -> Result<()> {
    let mut selector = selector()?;
    let overlapping = Arc::new(TinygService::new(
        Arc::new(RecordingTransport::new()),
        StreamingConfig::default(),
    ));

    match selector.register(range("440.00", "445.00"), overlapping) {
        Err(Error::Firmware(FirmwareError::RangeOverlap { .. })) => {}
        other => panic!("Expected RangeOverlap, got {other:?}"),
    }
    // Existing registrations are untouched
    assert_eq!(selector.len(), 2);
    assert_eq!(selector.resolve(version("443.00"))?.name(), "grbl");
    Ok(())
}

#[tokio::test]
async fn test_activation_switches_implementations() -> Result<()> {
    let mut selector = selector()?;
    assert!(selector.active().is_err());

    let first = selector.activate(version("430.00")).await?;
    assert_eq!(first.name(), "tinyg");
    assert_eq!(selector.active()?.name(), "tinyg");

    // Re-activating the same version keeps the implementation running
    let same = selector.activate(version("435.00")).await?;
    assert_eq!(same.name(), "tinyg");

    // A version in the other range stops the old implementation first
    let second = selector.activate(version("450.00")).await?;
    assert_eq!(second.name(), "grbl");
    assert_eq!(selector.active()?.name(), "grbl");
    Ok(())
}
