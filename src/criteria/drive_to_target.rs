//! Criterion that steers an element toward a fixed refinement state.
//!
//! Each cycle moves the element one step: a level mismatch is corrected by
//! Split/Join first, an extent mismatch by a resolution change. Once every
//! dimension in scope is at its target the configured `flags_at_target` are
//! proposed, which is `DoNothing` unless a run wants to oscillate.

use super::{CriterionContext, DimensionScope};
use crate::amr_error::AmrError;
use crate::domain::segment::MAX_REFINEMENT_LEVEL;
use crate::flag::{Flag, FlagSet};
use std::cmp::Ordering;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DriveToTarget<const D: usize> {
    target_extents: [usize; D],
    target_levels: [u8; D],
    flags_at_target: [Flag; D],
    scope: DimensionScope<D>,
}

impl<const D: usize> DriveToTarget<D> {
    /// Drive every dimension to the target and stay there.
    pub fn new(target_extents: [usize; D], target_levels: [u8; D]) -> Result<Self, AmrError> {
        Self::with_options(
            target_extents,
            target_levels,
            [Flag::DoNothing; D],
            DimensionScope::all(),
        )
    }

    pub fn with_options(
        target_extents: [usize; D],
        target_levels: [u8; D],
        flags_at_target: [Flag; D],
        scope: DimensionScope<D>,
    ) -> Result<Self, AmrError> {
        if let Some(d) = target_extents.iter().position(|extent| *extent == 0) {
            return Err(AmrError::Configuration(format!(
                "DriveToTarget target extent in dimension {d} must be positive"
            )));
        }
        if let Some(d) = target_levels
            .iter()
            .position(|level| *level > MAX_REFINEMENT_LEVEL)
        {
            return Err(AmrError::Configuration(format!(
                "DriveToTarget target level in dimension {d} exceeds {MAX_REFINEMENT_LEVEL}"
            )));
        }
        if let Some(d) = flags_at_target.iter().position(|f| *f == Flag::Undefined) {
            return Err(AmrError::Configuration(format!(
                "DriveToTarget flag at target in dimension {d} must be defined"
            )));
        }
        Ok(Self {
            target_extents,
            target_levels,
            flags_at_target,
            scope,
        })
    }

    pub fn target_extents(&self) -> [usize; D] {
        self.target_extents
    }

    pub fn target_levels(&self) -> [u8; D] {
        self.target_levels
    }

    pub fn flags_at_target(&self) -> [Flag; D] {
        self.flags_at_target
    }

    pub fn scope(&self) -> &DimensionScope<D> {
        &self.scope
    }

    pub fn evaluate(&self, ctx: &CriterionContext<'_, D>) -> [Flag; D] {
        let levels = ctx.element_id.refinement_levels();
        let extents = ctx.mesh.extents();
        let step = |d: usize| match levels[d].cmp(&self.target_levels[d]) {
            Ordering::Less => Flag::Split,
            Ordering::Greater => Flag::Join,
            Ordering::Equal => match extents[d].cmp(&self.target_extents[d]) {
                Ordering::Less => Flag::IncreaseResolution,
                Ordering::Greater => Flag::DecreaseResolution,
                Ordering::Equal => Flag::DoNothing,
            },
        };

        let at_target = self.scope.iter().all(|d| step(d) == Flag::DoNothing);
        std::array::from_fn(|d| {
            if !self.scope.contains(d) {
                Flag::Undefined
            } else if at_target {
                self.flags_at_target[d]
            } else {
                step(d)
            }
        })
    }

    pub fn possible_flags(&self, dimension: usize) -> FlagSet {
        if !self.scope.contains(dimension) {
            return FlagSet::EMPTY;
        }
        FlagSet::of(&[
            Flag::Split,
            Flag::Join,
            Flag::IncreaseResolution,
            Flag::DecreaseResolution,
            Flag::DoNothing,
        ])
        .with(self.flags_at_target[dimension])
    }
}
