//! Firmware implementations and version-range dispatch
//!
//! Each firmware implementation declares the inclusive version range it
//! supports; the selector resolves a detected device version to exactly one
//! implementation. Ranges must not overlap, which makes resolution
//! deterministic regardless of registration order.

pub mod grbl;
pub mod tinyg;

use crate::probing::ProbeHandle;
use async_trait::async_trait;
use motionkit_core::{
    Axis, CoordinateFrame, FirmwareError, MachineState, MachineValueStore, ModalContext, Position,
    Result, SessionEventBus, TokenId,
};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A firmware version, `major.minor` as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FirmwareVersion {
    major: u16,
    minor: u16,
}

impl FirmwareVersion {
    /// Build a version from its parts
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl FromStr for FirmwareVersion {
    type Err = FirmwareError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let malformed = || FirmwareError::MalformedVersion {
            version: s.to_string(),
        };
        let (major, minor) = s.trim().split_once('.').ok_or_else(malformed)?;
        Ok(Self {
            major: major.parse().map_err(|_| malformed())?,
            minor: minor.parse().map_err(|_| malformed())?,
        })
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.major, self.minor)
    }
}

/// Inclusive range of firmware versions an implementation supports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRange {
    min: FirmwareVersion,
    max: FirmwareVersion,
}

impl VersionRange {
    /// Build a range, rejecting inverted bounds
    pub fn new(min: FirmwareVersion, max: FirmwareVersion) -> Result<Self> {
        if min > max {
            return Err(FirmwareError::InvalidRange {
                min: min.to_string(),
                max: max.to_string(),
            }
            .into());
        }
        Ok(Self { min, max })
    }

    /// Lower bound
    pub fn min(&self) -> FirmwareVersion {
        self.min
    }

    /// Upper bound
    pub fn max(&self) -> FirmwareVersion {
        self.max
    }

    /// Whether the version falls inside this range
    pub fn contains(&self, version: FirmwareVersion) -> bool {
        self.min <= version && version <= self.max
    }

    /// Whether two ranges share any version
    pub fn overlaps(&self, other: &VersionRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.min, self.max)
    }
}

/// One firmware implementation behind the streaming session
///
/// Every motion operation is turned into a command program and submitted
/// through the session's flow-controlled queue, so manual operations and
/// streamed programs share one ordering. Only control sequences (hold,
/// flush, resume) and the periodic polls bypass the queue.
#[async_trait]
pub trait FirmwareService: Send + Sync {
    /// Implementation name, for logs
    fn name(&self) -> &str;

    /// Start the streaming session and its worker tasks
    async fn start(&self) -> Result<()>;

    /// Stop the worker tasks; queued tokens are dropped
    async fn stop(&self) -> Result<()>;

    /// Submit a command program; returns its execution token
    fn submit(&self, commands: Vec<String>) -> Result<TokenId>;

    /// Feed-hold (true) or cycle-start (false) without discarding progress
    fn pause(&self, paused: bool) -> Result<()>;

    /// Cancel the current program, flush the device buffer, suspend sending
    fn stop_motion(&self) -> Result<()>;

    /// Accept sends again after [`FirmwareService::stop_motion`]
    fn resume(&self) -> Result<()>;

    /// Run a straight probe toward `target` on one axis
    ///
    /// Returns a handle resolved when the device reports the probe result.
    fn probe(&self, axis: Axis, feedrate: f64, target: f64) -> Result<ProbeHandle>;

    /// The cached offset of a coordinate frame
    fn offset(&self, frame: CoordinateFrame) -> Position;

    /// Program a coordinate frame offset
    fn set_offset(&self, frame: CoordinateFrame, offset: Position) -> Result<TokenId>;

    /// Make a coordinate frame current
    fn select_frame(&self, frame: CoordinateFrame) -> Result<TokenId>;

    /// Rewrite the active frame's offset so the current position reads zero
    fn reset_current_frame(&self) -> Result<TokenId>;

    /// Run the homing cycle for the configured axes
    fn home(&self) -> Result<TokenId>;

    /// Incremental jog on one axis, restoring the previous distance mode
    fn jog(&self, axis: Axis, distance: f64, feedrate: f64) -> Result<TokenId>;

    /// Abort an in-progress jog
    ///
    /// Jogs stream through the same queue as programs, so aborting one is the
    /// general stop: hold, flush, suspend until [`FirmwareService::resume`].
    fn stop_jog(&self) -> Result<()> {
        self.stop_motion()
    }

    /// Start the spindle clockwise
    fn spindle_on(&self) -> Result<TokenId>;

    /// Stop the spindle
    fn spindle_off(&self) -> Result<TokenId>;

    /// Declare the current position as the axis origin, without motion
    fn zero_axes(&self, axes: &[Axis]) -> Result<TokenId>;

    /// Linear move to an absolute position
    fn move_to(&self, position: Position, feedrate: f64) -> Result<TokenId>;

    /// Last reported machine state
    fn machine_state(&self) -> MachineState;

    /// The machine value store
    fn values(&self) -> Arc<MachineValueStore>;

    /// Snapshot of the modal context
    fn context(&self) -> ModalContext;

    /// The session event surface
    fn events(&self) -> Arc<SessionEventBus>;

    /// Feed one complete inbound line from the transport's read side
    fn on_line(&self, line: &str);
}

impl fmt::Debug for dyn FirmwareService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirmwareService")
            .field("name", &self.name())
            .finish()
    }
}

/// Format a coordinate or feedrate for a G-code word
///
/// Millidegree/micron resolution, trailing zeros trimmed.
pub(crate) fn gcode_number(value: f64) -> String {
    let formatted = format!("{value:.3}");
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

struct Registration {
    range: VersionRange,
    service: Arc<dyn FirmwareService>,
}

/// Version-range dispatch over registered firmware implementations
#[derive(Default)]
pub struct FirmwareSelector {
    /// Sorted by range lower bound; ranges never overlap
    registrations: Vec<Registration>,
    active: Option<usize>,
}

impl FirmwareSelector {
    /// Create an empty selector
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation for a version range
    ///
    /// Rejects the registration if the range overlaps any already registered
    /// one; the existing registrations are untouched.
    pub fn register(
        &mut self,
        range: VersionRange,
        service: Arc<dyn FirmwareService>,
    ) -> Result<()> {
        if let Some(existing) = self.registrations.iter().find(|r| r.range.overlaps(&range)) {
            tracing::warn!(
                "Rejecting {} for range {range}: overlaps {} at {}",
                service.name(),
                existing.service.name(),
                existing.range,
            );
            return Err(FirmwareError::RangeOverlap {
                min: range.min().to_string(),
                max: range.max().to_string(),
            }
            .into());
        }
        let at = self
            .registrations
            .partition_point(|r| r.range.min() < range.min());
        self.registrations.insert(at, Registration { range, service });
        Ok(())
    }

    /// Resolve a detected version to its implementation
    pub fn resolve(&self, version: FirmwareVersion) -> Result<Arc<dyn FirmwareService>> {
        self.registrations
            .iter()
            .find(|r| r.range.contains(version))
            .map(|r| r.service.clone())
            .ok_or_else(|| {
                FirmwareError::UnsupportedVersion {
                    version: version.to_string(),
                }
                .into()
            })
    }

    /// Activate the implementation for a detected version
    ///
    /// Stops the previously active implementation first, then starts the
    /// resolved one. Activating the already active implementation restarts
    /// nothing.
    pub async fn activate(&mut self, version: FirmwareVersion) -> Result<Arc<dyn FirmwareService>> {
        let index = self
            .registrations
            .iter()
            .position(|r| r.range.contains(version))
            .ok_or_else(|| FirmwareError::UnsupportedVersion {
                version: version.to_string(),
            })?;

        if self.active == Some(index) {
            return Ok(self.registrations[index].service.clone());
        }
        if let Some(previous) = self.active.take() {
            let old = &self.registrations[previous].service;
            tracing::info!("Stopping {} before firmware switch", old.name());
            old.stop().await?;
        }
        let service = self.registrations[index].service.clone();
        tracing::info!("Activating {} for firmware {version}", service.name());
        service.start().await?;
        self.active = Some(index);
        Ok(service)
    }

    /// The active implementation, if any
    pub fn active(&self) -> Result<Arc<dyn FirmwareService>> {
        self.active
            .map(|index| self.registrations[index].service.clone())
            .ok_or_else(|| FirmwareError::NoActiveFirmware.into())
    }

    /// Number of registered implementations
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Whether no implementation is registered
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(s: &str) -> FirmwareVersion {
        s.parse().unwrap()
    }

    fn range(min: &str, max: &str) -> VersionRange {
        VersionRange::new(version(min), version(max)).unwrap()
    }

    #[test]
    fn test_version_parse_and_order() {
        assert_eq!(version("440.20"), FirmwareVersion::new(440, 20));
        assert!(version("440.20") < version("441.00"));
        assert!(version("440.20") < version("440.21"));
        assert_eq!(version("440.20").to_string(), "440.20");

        assert!("440".parse::<FirmwareVersion>().is_err());
        assert!("a.b".parse::<FirmwareVersion>().is_err());
        assert!("".parse::<FirmwareVersion>().is_err());
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let result = VersionRange::new(version("441.00"), version("440.00"));
        assert!(result.is_err());
    }

    #[test]
    fn test_range_contains_is_inclusive() {
        let r = range("400.00", "440.99");
        assert!(r.contains(version("400.00")));
        assert!(r.contains(version("440.99")));
        assert!(r.contains(version("420.50")));
        assert!(!r.contains(version("441.00")));
        assert!(!r.contains(version("399.99")));
    }

    #[test]
    fn test_range_overlap() {
        let a = range("400.00", "440.99");
        assert!(a.overlaps(&range("440.99", "450.00")));
        assert!(a.overlaps(&range("410.00", "420.00")));
        assert!(!a.overlaps(&range("441.00", "460.00")));
    }

    proptest::proptest! {
        #[test]
        fn prop_version_display_parse_round_trip(major in 0u16..=999, minor in 0u16..=99) {
            let original = FirmwareVersion::new(major, minor);
            let parsed: FirmwareVersion = original.to_string().parse().unwrap();
            proptest::prop_assert_eq!(original, parsed);
        }

        #[test]
        fn prop_overlap_is_symmetric_and_matches_contains(
            a in 0u16..200, b in 0u16..200, c in 0u16..200, d in 0u16..200
        ) {
            let first = VersionRange::new(
                FirmwareVersion::new(a.min(b), 0),
                FirmwareVersion::new(a.max(b), 0),
            ).unwrap();
            let second = VersionRange::new(
                FirmwareVersion::new(c.min(d), 0),
                FirmwareVersion::new(c.max(d), 0),
            ).unwrap();

            proptest::prop_assert_eq!(first.overlaps(&second), second.overlaps(&first));
            let shares_endpoint = first.contains(second.min())
                || first.contains(second.max())
                || second.contains(first.min());
            proptest::prop_assert_eq!(first.overlaps(&second), shares_endpoint);
        }
    }
}
