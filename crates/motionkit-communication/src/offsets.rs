//! Coordinate frame offset table
//!
//! Local cache of the per-frame offset vectors. Every supported frame has an
//! entry at all times. `set_local` is optimistic and may be overwritten when
//! the device confirms; `confirm` is the authoritative write applied from the
//! receive path.

use motionkit_core::{CoordinateFrame, Position};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Per-frame offset vectors
#[derive(Debug)]
pub struct CoordinateOffsetTable {
    offsets: RwLock<HashMap<CoordinateFrame, Position>>,
}

impl CoordinateOffsetTable {
    /// Create a table with every supported frame at zero
    pub fn new() -> Self {
        let offsets = CoordinateFrame::ALL
            .iter()
            .map(|&frame| (frame, Position::ZERO))
            .collect();
        Self {
            offsets: RwLock::new(offsets),
        }
    }

    /// The cached offset for a frame
    pub fn get(&self, frame: CoordinateFrame) -> Position {
        // Every frame is seeded in new(), the entry always exists.
        self.offsets.read()[&frame]
    }

    /// Optimistically cache an offset ahead of device confirmation
    pub fn set_local(&self, frame: CoordinateFrame, offset: Position) {
        self.offsets.write().insert(frame, offset);
    }

    /// Apply a device-confirmed offset
    pub fn confirm(&self, frame: CoordinateFrame, offset: Position) {
        tracing::debug!("Confirmed offset for {frame}: {offset}");
        self.offsets.write().insert(frame, offset);
    }

    /// The offset that zeroes the reported work position
    ///
    /// With the machine origin expressed as the negated active offset, the
    /// new offset is `work_position - active_offset`; once the device
    /// confirms it, the work position in the active frame reads zero.
    pub fn zeroing_offset(work_position: Position, active_offset: Position) -> Position {
        work_position + (-active_offset)
    }
}

impl Default for CoordinateOffsetTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_frame_has_an_entry() {
        let table = CoordinateOffsetTable::new();
        for frame in CoordinateFrame::ALL {
            assert_eq!(table.get(frame), Position::ZERO);
        }
    }

    #[test]
    fn test_confirm_overwrites_local() {
        let table = CoordinateOffsetTable::new();
        table.set_local(CoordinateFrame::G55, Position::linear(1.0, 1.0, 0.0));
        table.confirm(CoordinateFrame::G55, Position::linear(2.0, 2.0, 0.0));
        assert_eq!(table.get(CoordinateFrame::G55), Position::linear(2.0, 2.0, 0.0));
    }

    #[test]
    fn test_zeroing_offset_matches_reset_semantics() {
        // Active offset (5,5,0), reported work position (12,7,0): the reset
        // offset must be (7,2,0).
        let active = Position::linear(5.0, 5.0, 0.0);
        let work = Position::linear(12.0, 7.0, 0.0);
        let zeroing = CoordinateOffsetTable::zeroing_offset(work, active);
        assert_eq!(zeroing, Position::linear(7.0, 2.0, 0.0));
    }
}
