//! `SegmentId`: one dimension of a node in a block's binary refinement tree.
//!
//! A block's logical interval is bisected `level` times; `index` counts the
//! resulting segments from the lower end, so `index < 2^level`.

use crate::amr_error::AmrError;
use crate::domain::orientation::Side;
use std::fmt;

/// Deepest refinement level an element may reach in any dimension.
pub const MAX_REFINEMENT_LEVEL: u8 = 16;

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId {
    level: u8,
    index: u32,
}

impl SegmentId {
    /// The whole block interval.
    pub const ROOT: SegmentId = SegmentId { level: 0, index: 0 };

    pub fn new(level: u8, index: u32) -> Result<Self, AmrError> {
        if level > MAX_REFINEMENT_LEVEL {
            return Err(AmrError::InvalidElementId(format!(
                "refinement level {level} exceeds maximum {MAX_REFINEMENT_LEVEL}"
            )));
        }
        if u64::from(index) >= 1u64 << level {
            return Err(AmrError::InvalidElementId(format!(
                "segment index {index} out of range for level {level}"
            )));
        }
        Ok(Self { level, index })
    }

    #[inline]
    pub const fn level(self) -> u8 {
        self.level
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Number of segments at this level.
    #[inline]
    pub fn segments_at_level(self) -> u64 {
        1u64 << self.level
    }

    pub fn parent(self) -> Option<Self> {
        (self.level > 0).then(|| Self {
            level: self.level - 1,
            index: self.index / 2,
        })
    }

    /// The child on the given side, or `None` at the maximum level.
    pub fn child(self, side: Side) -> Option<Self> {
        if self.level >= MAX_REFINEMENT_LEVEL {
            return None;
        }
        let offset = match side {
            Side::Lower => 0,
            Side::Upper => 1,
        };
        Some(Self {
            level: self.level + 1,
            index: self.index * 2 + offset,
        })
    }

    /// The other child of this segment's parent.
    pub fn sibling(self) -> Option<Self> {
        (self.level > 0).then(|| Self {
            level: self.level,
            index: self.index ^ 1,
        })
    }

    /// Side of the parent interval this segment occupies.
    pub fn side_in_parent(self) -> Option<Side> {
        (self.level > 0).then(|| {
            if self.index % 2 == 0 {
                Side::Lower
            } else {
                Side::Upper
            }
        })
    }

    /// The segment seen from an axis with the opposite sense.
    pub fn flipped(self) -> Self {
        let last = (self.segments_at_level() - 1) as u32;
        Self {
            level: self.level,
            index: last - self.index,
        }
    }

    /// True if this segment touches the block boundary on `side`.
    pub fn touches_block_boundary(self, side: Side) -> bool {
        match side {
            Side::Lower => self.index == 0,
            Side::Upper => u64::from(self.index) == self.segments_at_level() - 1,
        }
    }

    /// Interval endpoints in units of segments at `level` (`level >= self.level`).
    pub(crate) fn endpoints_at(self, level: u8) -> (u64, u64) {
        let scale = 1u64 << (level - self.level);
        let lower = u64::from(self.index) * scale;
        (lower, lower + scale)
    }

    /// True if the open intervals of both segments intersect.
    pub fn overlaps(self, other: SegmentId) -> bool {
        let level = self.level.max(other.level);
        let (a_lo, a_hi) = self.endpoints_at(level);
        let (b_lo, b_hi) = other.endpoints_at(level);
        a_lo < b_hi && b_lo < a_hi
    }

    /// True if `other` starts exactly where this segment ends on `side`.
    pub fn abuts(self, other: SegmentId, side: Side) -> bool {
        let level = self.level.max(other.level);
        let (a_lo, a_hi) = self.endpoints_at(level);
        let (b_lo, b_hi) = other.endpoints_at(level);
        match side {
            Side::Upper => a_hi == b_lo,
            Side::Lower => b_hi == a_lo,
        }
    }
}

impl fmt::Debug for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(L{}I{})", self.level, self.index)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(level: u8, index: u32) -> SegmentId {
        SegmentId::new(level, index).unwrap()
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(SegmentId::new(1, 2).is_err());
        assert!(SegmentId::new(MAX_REFINEMENT_LEVEL + 1, 0).is_err());
        assert!(SegmentId::new(MAX_REFINEMENT_LEVEL, 65_535).is_ok());
    }

    #[test]
    fn family() {
        let s = seg(2, 3);
        assert_eq!(s.parent(), Some(seg(1, 1)));
        assert_eq!(s.sibling(), Some(seg(2, 2)));
        assert_eq!(s.side_in_parent(), Some(Side::Upper));
        assert_eq!(seg(1, 1).child(Side::Lower), Some(seg(2, 2)));
        assert_eq!(SegmentId::ROOT.parent(), None);
        assert_eq!(SegmentId::ROOT.sibling(), None);
    }

    #[test]
    fn geometry() {
        assert!(seg(1, 0).overlaps(seg(2, 1)));
        assert!(!seg(1, 0).overlaps(seg(2, 2)));
        assert!(seg(1, 0).abuts(seg(2, 2), Side::Upper));
        assert!(seg(2, 2).abuts(seg(1, 0), Side::Lower));
        assert!(seg(2, 3).touches_block_boundary(Side::Upper));
        assert!(SegmentId::ROOT.touches_block_boundary(Side::Lower));
        assert_eq!(seg(2, 1).flipped(), seg(2, 2));
    }
}
