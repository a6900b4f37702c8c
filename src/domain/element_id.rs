//! `ElementId`: a block index plus one tree segment per dimension.
//!
//! Ids are plain `Copy` values used as lookup keys; relationships between
//! elements are always expressed through ids, never references.

use crate::amr_error::AmrError;
use crate::domain::orientation::{Direction, Side};
use crate::domain::segment::SegmentId;
use crate::flag::Flag;
use itertools::Itertools;
use std::fmt;

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId<const D: usize> {
    block_id: usize,
    segments: [SegmentId; D],
}

impl<const D: usize> ElementId<D> {
    pub fn new(block_id: usize, segments: [SegmentId; D]) -> Result<Self, AmrError> {
        if D == 0 {
            return Err(AmrError::InvalidElementId(
                "elements need at least one dimension".into(),
            ));
        }
        Ok(Self { block_id, segments })
    }

    /// The unrefined element covering all of `block_id`.
    pub fn root(block_id: usize) -> Self {
        Self {
            block_id,
            segments: [SegmentId::ROOT; D],
        }
    }

    #[inline]
    pub fn block_id(&self) -> usize {
        self.block_id
    }

    #[inline]
    pub fn segments(&self) -> &[SegmentId; D] {
        &self.segments
    }

    #[inline]
    pub fn segment(&self, dimension: usize) -> SegmentId {
        self.segments[dimension]
    }

    pub fn refinement_levels(&self) -> [u8; D] {
        self.segments.map(SegmentId::level)
    }

    /// The ids created by splitting in every dimension flagged `Split`.
    ///
    /// Yields `2^k` ids for `k` split dimensions, ordered with the first
    /// dimension varying slowest.
    pub fn children(&self, flags: &[Flag; D]) -> Result<Vec<Self>, AmrError> {
        let options = (0..D)
            .map(|d| {
                let segment = self.segments[d];
                if flags[d] != Flag::Split {
                    return Ok(vec![segment]);
                }
                match (segment.child(Side::Lower), segment.child(Side::Upper)) {
                    (Some(lower), Some(upper)) => Ok(vec![lower, upper]),
                    _ => Err(AmrError::InvalidElementId(format!(
                        "{self} cannot split beyond the maximum level in dimension {d}"
                    ))),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(options
            .into_iter()
            .multi_cartesian_product()
            .map(|segments| {
                let mut child = *self;
                child.segments.copy_from_slice(&segments);
                child
            })
            .collect())
    }

    /// The id created by joining in every dimension flagged `Join`.
    pub fn parent(&self, flags: &[Flag; D]) -> Result<Self, AmrError> {
        let mut parent = *self;
        for (d, flag) in flags.iter().enumerate() {
            if *flag != Flag::Join {
                continue;
            }
            parent.segments[d] = self.segments[d].parent().ok_or_else(|| {
                AmrError::InvalidElementId(format!("{self} has no parent in dimension {d}"))
            })?;
        }
        Ok(parent)
    }

    /// Every id (including this one) that must join together under `flags`.
    pub fn siblings(&self, flags: &[Flag; D]) -> Result<Vec<Self>, AmrError> {
        let parent = self.parent(flags)?;
        let split_back: [Flag; D] = std::array::from_fn(|d| {
            if flags[d] == Flag::Join {
                Flag::Split
            } else {
                Flag::DoNothing
            }
        });
        parent.children(&split_back)
    }

    /// True if the element in `direction` could be a sibling of this one,
    /// i.e. this element is the child on the opposite side of its parent.
    pub fn has_potential_sibling(&self, direction: Direction) -> bool {
        self.segments[direction.dimension].side_in_parent() == Some(direction.side.opposite())
    }

    /// True if the tree nodes of both ids share volume (same block only).
    pub fn overlaps(&self, other: &Self) -> bool {
        self.block_id == other.block_id
            && self
                .segments
                .iter()
                .zip(other.segments.iter())
                .all(|(a, b)| a.overlaps(*b))
    }
}

impl<const D: usize> fmt::Debug for ElementId<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[B{}", self.block_id)?;
        for segment in &self.segments {
            write!(f, ",{segment}")?;
        }
        f.write_str("]")
    }
}

impl<const D: usize> fmt::Display for ElementId<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
