//! Refinement criteria.
//!
//! A criterion is a configured, pure evaluator that proposes one [`Flag`] per
//! dimension from the element's id, mesh and the run's limits. The catalogue
//! is closed: new kinds are added as variants of [`Criterion`].
//!
//! Outside its [`DimensionScope`] a criterion abstains with `Undefined`.
//! Proposals from several criteria are merged by [`combine_proposals`];
//! configurations where two criteria could pull one dimension in opposite
//! directions are rejected up front by [`validate_criteria`].

pub mod drive_to_target;
pub mod increase_resolution;

pub use drive_to_target::DriveToTarget;
pub use increase_resolution::IncreaseResolution;

use crate::amr_error::AmrError;
use crate::domain::element_id::ElementId;
use crate::flag::{Flag, FlagSet};
use crate::mesh::Mesh;
use crate::policies::{Isotropy, Limits};

/// Everything a criterion may look at.
#[derive(Copy, Clone, Debug)]
pub struct CriterionContext<'a, const D: usize> {
    pub element_id: &'a ElementId<D>,
    pub mesh: &'a Mesh<D>,
    pub limits: &'a Limits<D>,
}

/// Dimensions a criterion opines on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DimensionScope<const D: usize>([bool; D]);

impl<const D: usize> DimensionScope<D> {
    pub fn all() -> Self {
        Self([true; D])
    }

    pub fn only(dimensions: &[usize]) -> Result<Self, AmrError> {
        let mut mask = [false; D];
        for &d in dimensions {
            if d >= D {
                return Err(AmrError::Configuration(format!(
                    "criterion dimension {d} out of range for dimension {D}"
                )));
            }
            mask[d] = true;
        }
        if !mask.contains(&true) {
            return Err(AmrError::Configuration(
                "criterion must opine on at least one dimension".into(),
            ));
        }
        Ok(Self(mask))
    }

    #[inline]
    pub fn contains(&self, dimension: usize) -> bool {
        self.0[dimension]
    }

    pub fn is_all(&self) -> bool {
        self.0.iter().all(|d| *d)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..D).filter(|d| self.0[*d])
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Criterion<const D: usize> {
    IncreaseResolution(IncreaseResolution<D>),
    DriveToTarget(DriveToTarget<D>),
}

impl<const D: usize> Criterion<D> {
    pub fn name(&self) -> &'static str {
        match self {
            Criterion::IncreaseResolution(_) => "IncreaseResolution",
            Criterion::DriveToTarget(_) => "DriveToTarget",
        }
    }

    /// Propose a flag per dimension; `Undefined` where the criterion abstains.
    pub fn evaluate(&self, ctx: &CriterionContext<'_, D>) -> [Flag; D] {
        match self {
            Criterion::IncreaseResolution(c) => c.evaluate(ctx),
            Criterion::DriveToTarget(c) => c.evaluate(ctx),
        }
    }

    /// Every flag this criterion could ever propose in `dimension`.
    pub fn possible_flags(&self, dimension: usize) -> FlagSet {
        match self {
            Criterion::IncreaseResolution(c) => c.possible_flags(dimension),
            Criterion::DriveToTarget(c) => c.possible_flags(dimension),
        }
    }

    pub fn scope(&self) -> &DimensionScope<D> {
        match self {
            Criterion::IncreaseResolution(c) => c.scope(),
            Criterion::DriveToTarget(c) => c.scope(),
        }
    }

    /// True if evaluation needs neighbor snapshots from the communication layer.
    pub fn requires_neighbor_data(&self) -> bool {
        match self {
            Criterion::IncreaseResolution(_) | Criterion::DriveToTarget(_) => false,
        }
    }
}

impl<const D: usize> From<IncreaseResolution<D>> for Criterion<D> {
    fn from(value: IncreaseResolution<D>) -> Self {
        Criterion::IncreaseResolution(value)
    }
}

impl<const D: usize> From<DriveToTarget<D>> for Criterion<D> {
    fn from(value: DriveToTarget<D>) -> Self {
        Criterion::DriveToTarget(value)
    }
}

/// Evaluate every criterion against one element.
pub fn evaluate_all<const D: usize>(
    criteria: &[Criterion<D>],
    ctx: &CriterionContext<'_, D>,
) -> Vec<[Flag; D]> {
    criteria.iter().map(|c| c.evaluate(ctx)).collect()
}

fn combine_pair(dimension: usize, current: Flag, proposed: Flag) -> Result<Flag, AmrError> {
    use Flag::*;
    let conflict = || {
        AmrError::Configuration(format!(
            "criteria proposed {current} and {proposed} in dimension {dimension}"
        ))
    };
    Ok(match (current, proposed) {
        (Undefined, other) | (other, Undefined) => other,
        (a, b) if a == b => a,
        (a, b) if a.is_h_refinement() && b.is_h_refinement() => return Err(conflict()),
        (a, _) if a.is_h_refinement() => a,
        (_, b) if b.is_h_refinement() => b,
        (DoNothing, other) | (other, DoNothing) => other,
        // only IncreaseResolution against DecreaseResolution is left
        _ => return Err(conflict()),
    })
}

/// Merge per-criterion proposals into one flag per dimension.
///
/// A Split/Join overrides a resolution request in the same dimension; a
/// request overrides `DoNothing`; `Undefined` means no opinion. Opposite
/// requests of the same kind are a configuration error. Dimensions nobody
/// opined on stay `Undefined`.
pub fn combine_proposals<const D: usize>(proposals: &[[Flag; D]]) -> Result<[Flag; D], AmrError> {
    let mut combined = [Flag::Undefined; D];
    for proposal in proposals {
        for d in 0..D {
            combined[d] = combine_pair(d, combined[d], proposal[d])?;
        }
    }
    Ok(combined)
}

/// Construction-time check of a criteria list.
///
/// Two criteria may share a dimension only if neither can propose the
/// opposite of something the other can propose. Under isotropic policies
/// every criterion must cover all dimensions, and target levels must agree
/// across dimensions.
pub fn validate_criteria<const D: usize>(
    criteria: &[Criterion<D>],
    isotropy: Isotropy,
) -> Result<(), AmrError> {
    for (i, first) in criteria.iter().enumerate() {
        for (j, second) in criteria.iter().enumerate().skip(i + 1) {
            for d in 0..D {
                if first
                    .possible_flags(d)
                    .conflicts_with(second.possible_flags(d))
                {
                    return Err(AmrError::Configuration(format!(
                        "criteria #{i} ({}) and #{j} ({}) may request opposite refinement in \
                         dimension {d}",
                        first.name(),
                        second.name()
                    )));
                }
            }
        }
    }

    if isotropy == Isotropy::Isotropic {
        for (i, criterion) in criteria.iter().enumerate() {
            if !criterion.scope().is_all() {
                return Err(AmrError::Configuration(format!(
                    "criterion #{i} ({}) opines on a subset of dimensions under isotropic \
                     refinement",
                    criterion.name()
                )));
            }
            if let Criterion::DriveToTarget(target) = criterion {
                let levels = target.target_levels();
                if levels.iter().any(|level| *level != levels[0]) {
                    return Err(AmrError::Configuration(format!(
                        "criterion #{i} (DriveToTarget) has anisotropic target levels {levels:?} \
                         under isotropic refinement"
                    )));
                }
                let at_target = FlagSet::of(&target.flags_at_target());
                if at_target.contains(Flag::Split) && at_target.contains(Flag::Join) {
                    return Err(AmrError::Configuration(format!(
                        "criterion #{i} (DriveToTarget) splits and joins at its target under \
                         isotropic refinement"
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Basis, Quadrature};

    fn ctx_parts(extents: [usize; 2]) -> (ElementId<2>, Mesh<2>, Limits<2>) {
        (
            ElementId::root(0),
            Mesh::new(extents, Basis::Legendre, Quadrature::GaussLobatto).unwrap(),
            Limits::uniform(0, 3, 3, 5).unwrap(),
        )
    }

    #[test]
    fn increase_resolution_stops_at_limit() {
        let (id, mesh, limits) = ctx_parts([4, 5]);
        let ctx = CriterionContext {
            element_id: &id,
            mesh: &mesh,
            limits: &limits,
        };
        let flags = Criterion::from(IncreaseResolution::default()).evaluate(&ctx);
        assert_eq!(flags, [Flag::IncreaseResolution, Flag::DoNothing]);
    }

    #[test]
    fn drive_to_target_prefers_levels() {
        let (id, mesh, limits) = ctx_parts([3, 5]);
        let ctx = CriterionContext {
            element_id: &id,
            mesh: &mesh,
            limits: &limits,
        };
        let c = DriveToTarget::new([4, 4], [1, 0]).unwrap();
        assert_eq!(c.evaluate(&ctx), [Flag::Split, Flag::DecreaseResolution]);

        let at_target = DriveToTarget::new([3, 5], [0, 0]).unwrap();
        assert_eq!(at_target.evaluate(&ctx), [Flag::DoNothing; 2]);

        let oscillating = DriveToTarget::with_options(
            [3, 5],
            [0, 0],
            [Flag::Split, Flag::DoNothing],
            DimensionScope::all(),
        )
        .unwrap();
        assert_eq!(oscillating.evaluate(&ctx), [Flag::Split, Flag::DoNothing]);
    }

    #[test]
    fn scoped_criterion_abstains() {
        let (id, mesh, limits) = ctx_parts([3, 3]);
        let ctx = CriterionContext {
            element_id: &id,
            mesh: &mesh,
            limits: &limits,
        };
        let c = IncreaseResolution::new(DimensionScope::only(&[1]).unwrap());
        assert_eq!(c.evaluate(&ctx), [Flag::Undefined, Flag::IncreaseResolution]);
        assert!(DimensionScope::<2>::only(&[2]).is_err());
        assert!(DimensionScope::<2>::only(&[]).is_err());
    }

    #[test]
    fn topology_dominates_resolution() {
        let combined = combine_proposals(&[
            [Flag::IncreaseResolution, Flag::Undefined, Flag::DoNothing],
            [Flag::Split, Flag::DecreaseResolution, Flag::Undefined],
        ])
        .unwrap();
        assert_eq!(
            combined,
            [Flag::Split, Flag::DecreaseResolution, Flag::DoNothing]
        );
        assert!(combine_proposals(&[[Flag::Split], [Flag::Join]]).is_err());
        assert!(
            combine_proposals(&[[Flag::IncreaseResolution], [Flag::DecreaseResolution]]).is_err()
        );
        assert_eq!(combine_proposals::<1>(&[]).unwrap(), [Flag::Undefined]);
    }

    #[test]
    fn overlapping_opposed_criteria_rejected() {
        let criteria: Vec<Criterion<2>> = vec![
            IncreaseResolution::default().into(),
            DriveToTarget::new([4, 4], [0, 0]).unwrap().into(),
        ];
        assert!(matches!(
            validate_criteria(&criteria, Isotropy::Anisotropic),
            Err(AmrError::Configuration(_))
        ));

        let disjoint: Vec<Criterion<2>> = vec![
            IncreaseResolution::new(DimensionScope::only(&[0]).unwrap()).into(),
            DriveToTarget::with_options(
                [4, 4],
                [0, 1],
                [Flag::DoNothing; 2],
                DimensionScope::only(&[1]).unwrap(),
            )
            .unwrap()
            .into(),
        ];
        validate_criteria(&disjoint, Isotropy::Anisotropic).unwrap();
        assert!(validate_criteria(&disjoint, Isotropy::Isotropic).is_err());

        let twice: Vec<Criterion<2>> = vec![
            IncreaseResolution::default().into(),
            IncreaseResolution::default().into(),
        ];
        validate_criteria(&twice, Isotropy::Isotropic).unwrap();
    }

    #[test]
    fn isotropic_targets_must_agree() {
        let criteria: Vec<Criterion<2>> = vec![DriveToTarget::new([4, 4], [1, 0]).unwrap().into()];
        assert!(validate_criteria(&criteria, Isotropy::Isotropic).is_err());
        validate_criteria(&criteria, Isotropy::Anisotropic).unwrap();
    }

    #[test]
    fn isotropic_targets_must_not_split_and_join() {
        let oscillating = DriveToTarget::with_options(
            [3, 3],
            [1, 1],
            [Flag::Split, Flag::Join],
            DimensionScope::all(),
        )
        .unwrap();
        let criteria: Vec<Criterion<2>> = vec![oscillating.into()];
        assert!(matches!(
            validate_criteria(&criteria, Isotropy::Isotropic),
            Err(AmrError::Configuration(_))
        ));
        validate_criteria(&criteria, Isotropy::Anisotropic).unwrap();

        let refining = DriveToTarget::with_options(
            [3, 3],
            [1, 1],
            [Flag::Split, Flag::DoNothing],
            DimensionScope::all(),
        )
        .unwrap();
        let criteria: Vec<Criterion<2>> = vec![refining.into()];
        validate_criteria(&criteria, Isotropy::Isotropic).unwrap();
    }
}
