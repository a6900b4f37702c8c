//! Orientation of adjacent elements' logical axes.
//!
//! Two elements in different blocks may have their logical axes permuted
//! and/or reversed relative to each other. An [`OrientationMap`] records that
//! relation as a permutation of axes with a per-axis [`BitFlip`]. Maps are
//! small `Copy` values and are replaced wholesale, never edited in place.

use crate::amr_error::AmrError;
use crate::domain::segment::SegmentId;
use core::fmt::{Debug, Formatter};
use std::fmt;

/// Composable relation between two elements' views of an axis or frame.
///
/// `Default` is the relation of an element to itself.
pub trait Orientation: Copy + Default + Eq {
    /// `compose(a, b)` applies `b` first, then `a`.
    fn compose(a: Self, b: Self) -> Self;
    fn inverse(a: Self) -> Self;
}

/// Whether an axis runs backwards on the neighbor's side of a face.
///
/// Reversing twice restores the axis, so every flip undoes itself.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct BitFlip(pub bool);

impl Debug for BitFlip {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str(if self.0 { "reversed" } else { "kept" })
    }
}

impl Orientation for BitFlip {
    fn compose(outer: Self, inner: Self) -> Self {
        BitFlip(outer.0 != inner.0)
    }

    fn inverse(flip: Self) -> Self {
        flip
    }
}

/// Lower or upper end of a logical axis.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum Side {
    Lower,
    Upper,
}

impl Side {
    #[inline]
    pub fn opposite(self) -> Side {
        match self {
            Side::Lower => Side::Upper,
            Side::Upper => Side::Lower,
        }
    }

    #[inline]
    fn flipped_by(self, flip: BitFlip) -> Side {
        if flip.0 { self.opposite() } else { self }
    }
}

/// A face of an element or block: a logical dimension and a side.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Direction {
    pub dimension: usize,
    pub side: Side,
}

impl Direction {
    pub const fn lower(dimension: usize) -> Self {
        Self {
            dimension,
            side: Side::Lower,
        }
    }

    pub const fn upper(dimension: usize) -> Self {
        Self {
            dimension,
            side: Side::Upper,
        }
    }

    pub fn opposite(self) -> Self {
        Self {
            dimension: self.dimension,
            side: self.side.opposite(),
        }
    }

    /// Every direction of a `dim`-dimensional element, lower before upper.
    pub fn all(dim: usize) -> impl Iterator<Item = Direction> {
        (0..dim).flat_map(|d| [Direction::lower(d), Direction::upper(d)])
    }
}

impl Debug for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let sign = match self.side {
            Side::Lower => '-',
            Side::Upper => '+',
        };
        write!(f, "{sign}{}", self.dimension)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

/// Bijection between this element's logical axes and a neighbor's.
///
/// Axis `i` here corresponds to the neighbor's axis `axes[i]`, reversed when
/// `flips[i]` is set.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct OrientationMap<const D: usize> {
    axes: [u8; D],
    flips: [BitFlip; D],
}

impl<const D: usize> Default for OrientationMap<D> {
    fn default() -> Self {
        Self::aligned()
    }
}

impl<const D: usize> Debug for OrientationMap<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let mapped: Vec<_> = (0..D)
            .map(|d| self.map_direction(Direction::upper(d)))
            .collect();
        f.debug_tuple("OrientationMap").field(&mapped).finish()
    }
}

impl<const D: usize> OrientationMap<D> {
    /// The identity map.
    pub fn aligned() -> Self {
        let mut axes = [0u8; D];
        for (i, axis) in axes.iter_mut().enumerate() {
            *axis = i as u8;
        }
        Self {
            axes,
            flips: [BitFlip::default(); D],
        }
    }

    /// Build a map from the neighbor directions that this element's upper
    /// directions correspond to.
    pub fn new(mapped_upper: [Direction; D]) -> Result<Self, AmrError> {
        let mut seen = [false; D];
        let mut axes = [0u8; D];
        let mut flips = [BitFlip::default(); D];
        for (i, direction) in mapped_upper.iter().enumerate() {
            if direction.dimension >= D {
                return Err(AmrError::InvalidOrientation(format!(
                    "axis {} out of range for dimension {D}",
                    direction.dimension
                )));
            }
            if std::mem::replace(&mut seen[direction.dimension], true) {
                return Err(AmrError::InvalidOrientation(format!(
                    "axis {} mapped twice",
                    direction.dimension
                )));
            }
            axes[i] = direction.dimension as u8;
            flips[i] = BitFlip(direction.side == Side::Lower);
        }
        Ok(Self { axes, flips })
    }

    pub fn is_aligned(&self) -> bool {
        *self == Self::aligned()
    }

    /// The neighbor's axis corresponding to this element's axis `dimension`.
    #[inline]
    pub fn map_dimension(&self, dimension: usize) -> usize {
        usize::from(self.axes[dimension])
    }

    #[inline]
    pub fn is_flipped(&self, dimension: usize) -> bool {
        self.flips[dimension].0
    }

    pub fn map_direction(&self, direction: Direction) -> Direction {
        Direction {
            dimension: self.map_dimension(direction.dimension),
            side: direction.side.flipped_by(self.flips[direction.dimension]),
        }
    }

    /// Express this element's segment along `dimension` in the neighbor's frame.
    pub fn map_segment(&self, dimension: usize, segment: SegmentId) -> (usize, SegmentId) {
        let mapped = if self.is_flipped(dimension) {
            segment.flipped()
        } else {
            segment
        };
        (self.map_dimension(dimension), mapped)
    }

    /// Rearrange per-dimension values of this element into the neighbor's axis order.
    pub fn permute_to_neighbor<T: Copy>(&self, values: [T; D]) -> [T; D] {
        let mut out = values;
        for (i, value) in values.into_iter().enumerate() {
            out[self.map_dimension(i)] = value;
        }
        out
    }

    /// Rearrange per-dimension values of the neighbor into this element's axis order.
    pub fn permute_from_neighbor<T: Copy>(&self, values: [T; D]) -> [T; D] {
        let mut out = values;
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = values[self.map_dimension(i)];
        }
        out
    }
}

impl<const D: usize> Orientation for OrientationMap<D> {
    fn compose(a: Self, b: Self) -> Self {
        let mut out = Self::aligned();
        for i in 0..D {
            let through = b.map_dimension(i);
            out.axes[i] = a.axes[through];
            out.flips[i] = BitFlip::compose(a.flips[through], b.flips[i]);
        }
        out
    }

    fn inverse(a: Self) -> Self {
        let mut out = Self::aligned();
        for i in 0..D {
            let target = a.map_dimension(i);
            out.axes[target] = i as u8;
            out.flips[target] = a.flips[i];
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotated() -> OrientationMap<2> {
        // +x here is -y there, +y here is +x there
        OrientationMap::new([Direction::lower(1), Direction::upper(0)]).unwrap()
    }

    #[test]
    fn rejects_non_bijection() {
        assert!(OrientationMap::<2>::new([Direction::upper(0), Direction::lower(0)]).is_err());
        assert!(OrientationMap::<2>::new([Direction::upper(0), Direction::upper(2)]).is_err());
    }

    #[test]
    fn maps_directions() {
        let o = rotated();
        assert_eq!(o.map_direction(Direction::upper(0)), Direction::lower(1));
        assert_eq!(o.map_direction(Direction::lower(0)), Direction::upper(1));
        assert_eq!(o.map_direction(Direction::lower(1)), Direction::lower(0));
        assert!(!o.is_aligned());
        assert!(OrientationMap::<3>::default().is_aligned());
    }

    #[test]
    fn inverse_and_compose() {
        let o = rotated();
        let inv = OrientationMap::inverse(o);
        assert!(OrientationMap::compose(o, inv).is_aligned());
        assert!(OrientationMap::compose(inv, o).is_aligned());
        for d in Direction::all(2) {
            assert_eq!(inv.map_direction(o.map_direction(d)), d);
        }
        let twice = OrientationMap::compose(o, o);
        assert_eq!(twice.map_direction(Direction::upper(0)), Direction::lower(0));
    }

    #[test]
    fn permutes_values() {
        let o = OrientationMap::<3>::new([
            Direction::upper(2),
            Direction::upper(0),
            Direction::lower(1),
        ])
        .unwrap();
        let mine = [4usize, 5, 6];
        let theirs = o.permute_to_neighbor(mine);
        assert_eq!(theirs, [5, 6, 4]);
        assert_eq!(o.permute_from_neighbor(theirs), mine);
    }

    #[test]
    fn flips_segments() {
        let o = rotated();
        let seg = SegmentId::new(2, 0).unwrap();
        assert_eq!(o.map_segment(0, seg), (1, SegmentId::new(2, 3).unwrap()));
        assert_eq!(o.map_segment(1, seg), (0, seg));
    }
}
