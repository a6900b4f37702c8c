//! Per-dimension bounds on refinement level and resolution.

use crate::amr_error::AmrError;
use crate::domain::segment::MAX_REFINEMENT_LEVEL;
use crate::mesh::{Basis, Quadrature, maximum_extent, minimum_extent};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Limits<const D: usize> {
    min_level: [u8; D],
    max_level: [u8; D],
    min_extent: [usize; D],
    max_extent: [usize; D],
}

impl<const D: usize> Default for Limits<D> {
    fn default() -> Self {
        Self {
            min_level: [0; D],
            max_level: [MAX_REFINEMENT_LEVEL; D],
            min_extent: [1; D],
            max_extent: [usize::MAX; D],
        }
    }
}

impl<const D: usize> Limits<D> {
    pub fn new(
        min_level: [u8; D],
        max_level: [u8; D],
        min_extent: [usize; D],
        max_extent: [usize; D],
    ) -> Result<Self, AmrError> {
        for d in 0..D {
            if min_level[d] > max_level[d] {
                return Err(AmrError::Configuration(format!(
                    "minimum refinement level {} exceeds maximum {} in dimension {d}",
                    min_level[d], max_level[d]
                )));
            }
            if max_level[d] > MAX_REFINEMENT_LEVEL {
                return Err(AmrError::Configuration(format!(
                    "maximum refinement level {} in dimension {d} exceeds {MAX_REFINEMENT_LEVEL}",
                    max_level[d]
                )));
            }
            if min_extent[d] > max_extent[d] {
                return Err(AmrError::Configuration(format!(
                    "minimum resolution {} exceeds maximum {} in dimension {d}",
                    min_extent[d], max_extent[d]
                )));
            }
            if min_extent[d] == 0 {
                return Err(AmrError::Configuration(format!(
                    "minimum resolution in dimension {d} must be positive"
                )));
            }
        }
        Ok(Self {
            min_level,
            max_level,
            min_extent,
            max_extent,
        })
    }

    /// The same bounds in every dimension.
    pub fn uniform(
        min_level: u8,
        max_level: u8,
        min_extent: usize,
        max_extent: usize,
    ) -> Result<Self, AmrError> {
        Self::new(
            [min_level; D],
            [max_level; D],
            [min_extent; D],
            [max_extent; D],
        )
    }

    #[inline]
    pub fn min_level(&self, dimension: usize) -> u8 {
        self.min_level[dimension]
    }

    #[inline]
    pub fn max_level(&self, dimension: usize) -> u8 {
        self.max_level[dimension]
    }

    #[inline]
    pub fn min_extent(&self, dimension: usize) -> usize {
        self.min_extent[dimension]
    }

    #[inline]
    pub fn max_extent(&self, dimension: usize) -> usize {
        self.max_extent[dimension]
    }

    /// Reject extent bounds that leave no valid extent for the basis.
    pub fn check_compatible(&self, basis: Basis, quadrature: Quadrature) -> Result<(), AmrError> {
        let lowest = minimum_extent(basis, quadrature);
        let highest = maximum_extent(basis, quadrature);
        for d in 0..D {
            if self.max_extent[d] < lowest || self.min_extent[d] > highest {
                return Err(AmrError::Configuration(format!(
                    "resolution limits [{}, {}] in dimension {d} admit no valid extent for \
                     {basis:?}/{quadrature:?} (valid range [{lowest}, {highest}])",
                    self.min_extent[d], self.max_extent[d]
                )));
            }
        }
        Ok(())
    }
}
