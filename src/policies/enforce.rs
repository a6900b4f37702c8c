//! Validation and normalization of proposed flags.
//!
//! Enforcement works on a copy of the proposal and either returns the full
//! validated set of flags or an error; there is no partially enforced
//! outcome.

use super::{HRefinementRules, Isotropy, Policies, RefinementMode};
use crate::amr_error::{AmrError, LimitKind, TopologyReason};
use crate::domain::element_id::ElementId;
use crate::flag::{Flag, prevent_element_from_joining_while_splitting};
use crate::mesh::{Mesh, minimum_extent};

/// Collapse per-dimension flags to the single highest-priority flag.
///
/// A Split in one dimension and a Join in another cannot be reconciled and
/// is always an error.
pub fn make_isotropic<const D: usize>(
    flags: [Flag; D],
    element_id: &ElementId<D>,
) -> Result<[Flag; D], AmrError> {
    let split = flags.iter().position(|f| *f == Flag::Split);
    let join = flags.iter().position(|f| *f == Flag::Join);
    if let (Some(s), Some(j)) = (split, join) {
        return Err(AmrError::IsotropyConflict {
            element: element_id.to_string(),
            first: s.min(j),
            second: s.max(j),
        });
    }
    let shared = flags
        .iter()
        .copied()
        .max()
        .unwrap_or(Flag::DoNothing)
        .resolve_undefined();
    Ok([shared; D])
}

fn check_topology<const D: usize>(
    flags: &[Flag; D],
    element_id: &ElementId<D>,
    mesh: &Mesh<D>,
    rules: &HRefinementRules,
) -> Result<(), AmrError> {
    let minimum = minimum_extent(rules.basis, rules.quadrature);
    for (d, flag) in flags.iter().enumerate() {
        if !flag.is_h_refinement() {
            continue;
        }
        let reason = if rules.mode == RefinementMode::POnly {
            Some(TopologyReason::HRefinementUnsupported)
        } else if *flag == Flag::Join && element_id.segment(d).level() == 0 {
            Some(TopologyReason::JoinAtRoot)
        } else if mesh.extent(d) < minimum {
            Some(TopologyReason::ExtentBelowMinimum {
                extent: mesh.extent(d),
                minimum,
            })
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(AmrError::Topology {
                element: element_id.to_string(),
                dimension: d,
                reason,
            });
        }
    }
    Ok(())
}

/// The requested value and the bound it crosses, if `flag` leaves the limits.
fn limit_crossed<const D: usize>(
    flag: Flag,
    dimension: usize,
    element_id: &ElementId<D>,
    mesh: &Mesh<D>,
    policies: &Policies<D>,
) -> Option<(LimitKind, usize, usize)> {
    let limits = &policies.limits;
    let level = usize::from(element_id.segment(dimension).level());
    let extent = mesh.extent(dimension);
    match flag {
        Flag::Split => {
            let bound = usize::from(limits.max_level(dimension));
            (level + 1 > bound).then_some((LimitKind::MaxLevel, level + 1, bound))
        }
        Flag::Join => {
            let bound = usize::from(limits.min_level(dimension));
            (level < bound + 1).then_some((LimitKind::MinLevel, level.saturating_sub(1), bound))
        }
        Flag::IncreaseResolution => {
            let bound = limits.max_extent(dimension).min(mesh.maximum_extent(dimension));
            (extent + 1 > bound).then_some((LimitKind::MaxExtent, extent + 1, bound))
        }
        Flag::DecreaseResolution => {
            let bound = limits.min_extent(dimension).max(mesh.minimum_extent(dimension));
            (extent < bound + 1).then_some((LimitKind::MinExtent, extent.saturating_sub(1), bound))
        }
        Flag::DoNothing | Flag::Undefined => None,
    }
}

/// Apply the configured limits to every dimension.
///
/// With `error_on_violation` the first crossing is returned as a
/// [`AmrError::LimitViolation`]; otherwise the offending dimension becomes
/// `DoNothing` (every dimension, under isotropic policies).
pub fn enforce_limits<const D: usize>(
    flags: [Flag; D],
    element_id: &ElementId<D>,
    mesh: &Mesh<D>,
    policies: &Policies<D>,
) -> Result<[Flag; D], AmrError> {
    let mut enforced = flags;
    let mut clamped = false;
    for d in 0..D {
        let Some((kind, requested, bound)) =
            limit_crossed(enforced[d], d, element_id, mesh, policies)
        else {
            continue;
        };
        if policies.error_on_violation {
            return Err(AmrError::LimitViolation {
                element: element_id.to_string(),
                dimension: d,
                kind,
                requested,
                bound,
            });
        }
        log::debug!(
            "element {element_id}: {} in dimension {d} would reach {kind} {requested} \
             (bound {bound}); doing nothing instead",
            enforced[d]
        );
        enforced[d] = Flag::DoNothing;
        clamped = true;
    }
    if clamped && policies.isotropy == Isotropy::Isotropic {
        enforced = [Flag::DoNothing; D];
    }
    Ok(enforced)
}

/// Validate a combined proposal for one element.
///
/// Order: resolve `Undefined`, isotropy, topology validity, limits, and
/// finally drop Joins of an element that splits in another dimension. The
/// function is idempotent on its own output.
pub fn enforce_policies<const D: usize>(
    flags: [Flag; D],
    element_id: &ElementId<D>,
    mesh: &Mesh<D>,
    policies: &Policies<D>,
    rules: &HRefinementRules,
) -> Result<[Flag; D], AmrError> {
    let mut enforced = flags.map(Flag::resolve_undefined);
    if policies.isotropy == Isotropy::Isotropic {
        enforced = make_isotropic(enforced, element_id)?;
    }
    check_topology(&enforced, element_id, mesh, rules)?;
    let mut enforced = enforce_limits(enforced, element_id, mesh, policies)?;
    if prevent_element_from_joining_while_splitting(&mut enforced) {
        log::debug!("element {element_id}: dropped Join while splitting, flags {enforced:?}");
    }
    Ok(enforced)
}
