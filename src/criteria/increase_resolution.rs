//! Criterion that raises the resolution everywhere until it hits the limit.

use super::{CriterionContext, DimensionScope};
use crate::flag::{Flag, FlagSet};

/// Proposes one more grid point in every dimension of its scope, and
/// abstains with `DoNothing` once a dimension is at its configured maximum.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IncreaseResolution<const D: usize> {
    scope: DimensionScope<D>,
}

impl<const D: usize> Default for IncreaseResolution<D> {
    fn default() -> Self {
        Self::new(DimensionScope::all())
    }
}

impl<const D: usize> IncreaseResolution<D> {
    pub fn new(scope: DimensionScope<D>) -> Self {
        Self { scope }
    }

    pub fn scope(&self) -> &DimensionScope<D> {
        &self.scope
    }

    pub fn evaluate(&self, ctx: &CriterionContext<'_, D>) -> [Flag; D] {
        std::array::from_fn(|d| {
            if !self.scope.contains(d) {
                return Flag::Undefined;
            }
            let ceiling = ctx.limits.max_extent(d).min(ctx.mesh.maximum_extent(d));
            if ctx.mesh.extent(d) >= ceiling {
                Flag::DoNothing
            } else {
                Flag::IncreaseResolution
            }
        })
    }

    pub fn possible_flags(&self, dimension: usize) -> FlagSet {
        if self.scope.contains(dimension) {
            FlagSet::of(&[Flag::IncreaseResolution, Flag::DoNothing])
        } else {
            FlagSet::EMPTY
        }
    }
}
