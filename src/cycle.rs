//! Per-element refinement cycle.
//!
//! A cycle moves through `Idle → Evaluating → Enforcing → {Applying | Fatal}
//! → Idle`. It works on copies of the element's flags and mesh, so a cycle
//! that fails leaves nothing behind; the caller records the returned
//! [`CycleOutcome`] wholesale.

use crate::amr_error::AmrError;
use crate::balance::{BalanceOutcome, balance_against_neighbors};
use crate::config::AmrConfig;
use crate::criteria::{CriterionContext, combine_proposals, evaluate_all};
use crate::domain::element_id::ElementId;
use crate::domain::neighbors::Element;
use crate::flag::Flag;
use crate::mesh::Mesh;
use crate::policies::{RefinementMode, enforce_policies};
use std::collections::BTreeMap;
use std::hash::BuildHasher;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CyclePhase {
    Idle,
    Evaluating,
    Enforcing,
    Applying,
    Fatal,
}

impl CyclePhase {
    pub fn can_transition_to(self, next: CyclePhase) -> bool {
        use CyclePhase::*;
        matches!(
            (self, next),
            (Idle, Evaluating)
                | (Evaluating, Enforcing)
                | (Evaluating, Fatal)
                | (Enforcing, Applying)
                | (Enforcing, Fatal)
                // deferred until neighbor data arrives
                | (Enforcing, Idle)
                | (Applying, Idle)
                | (Applying, Fatal)
                | (Fatal, Idle)
        )
    }
}

/// Source of the decisions neighbors have published this round.
pub trait NeighborFeed<const D: usize> {
    fn neighbor_flags(&self, id: &ElementId<D>) -> Option<[Flag; D]>;
}

impl<const D: usize, S: BuildHasher> NeighborFeed<D>
    for hashbrown::HashMap<ElementId<D>, [Flag; D], S>
{
    fn neighbor_flags(&self, id: &ElementId<D>) -> Option<[Flag; D]> {
        self.get(id).copied()
    }
}

impl<const D: usize> NeighborFeed<D> for BTreeMap<ElementId<D>, [Flag; D]> {
    fn neighbor_flags(&self, id: &ElementId<D>) -> Option<[Flag; D]> {
        self.get(id).copied()
    }
}

/// Wraps a closure as a [`NeighborFeed`].
pub struct FeedFn<F>(pub F);

impl<const D: usize, F> NeighborFeed<D> for FeedFn<F>
where
    F: Fn(&ElementId<D>) -> Option<[Flag; D]>,
{
    fn neighbor_flags(&self, id: &ElementId<D>) -> Option<[Flag; D]> {
        (self.0)(id)
    }
}

/// Topology change the surrounding layer must carry out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HRefinement<const D: usize> {
    /// Replace the element by these children, each built with the outcome mesh.
    Split { children: Vec<ElementId<D>> },
    /// Merge the element and its siblings into `parent`.
    Join { parent: ElementId<D> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleOutcome<const D: usize> {
    pub id: ElementId<D>,
    /// The enforced, balanced decision.
    pub flags: [Flag; D],
    /// The element's mesh after p-refinement; new elements start from it.
    pub mesh: Mesh<D>,
    pub refinement: Option<HRefinement<D>>,
}

impl<const D: usize> CycleOutcome<D> {
    pub fn is_unchanged(&self, before: &Mesh<D>) -> bool {
        self.refinement.is_none() && self.mesh == *before
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleStatus<const D: usize> {
    Completed(CycleOutcome<D>),
    /// Retry on a later round; these neighbors have not published yet.
    Deferred { missing: Vec<ElementId<D>> },
}

/// Phase tracker of one element's cycle.
#[derive(Clone, Debug)]
pub struct RefinementCycle<const D: usize> {
    id: ElementId<D>,
    phase: CyclePhase,
}

impl<const D: usize> RefinementCycle<D> {
    pub fn new(id: ElementId<D>) -> Self {
        Self {
            id,
            phase: CyclePhase::Idle,
        }
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    fn advance(&mut self, next: CyclePhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal cycle transition {:?} -> {next:?} for {}",
            self.phase,
            self.id
        );
        log::trace!("element {}: {:?} -> {next:?}", self.id, self.phase);
        self.phase = next;
    }

    fn fail(&mut self, error: AmrError) -> AmrError {
        self.advance(CyclePhase::Fatal);
        log::debug!("element {}: cycle aborted: {error}", self.id);
        self.advance(CyclePhase::Idle);
        error
    }

    /// Evaluate, combine and enforce, leaving the cycle in `Enforcing`.
    fn propose(&mut self, config: &AmrConfig<D>, mesh: &Mesh<D>) -> Result<[Flag; D], AmrError> {
        self.advance(CyclePhase::Evaluating);
        let ctx = CriterionContext {
            element_id: &self.id,
            mesh,
            limits: &config.policies().limits,
        };
        let proposals = evaluate_all(config.criteria(), &ctx);
        let combined = match combine_proposals(&proposals) {
            Ok(flags) => flags,
            Err(e) => return Err(self.fail(e)),
        };
        self.advance(CyclePhase::Enforcing);
        enforce_policies(combined, &self.id, mesh, config.policies(), config.rules())
            .map_err(|e| self.fail(e))
    }

    /// Drive the cycle to completion, deferral or a fatal error.
    pub fn run<F>(
        &mut self,
        config: &AmrConfig<D>,
        element: &Element<D>,
        mesh: &Mesh<D>,
        feed: &F,
    ) -> Result<CycleStatus<D>, AmrError>
    where
        F: NeighborFeed<D> + ?Sized,
    {
        let flags = self.propose(config, mesh)?;
        self.settle(config, element, mesh, flags, feed)
    }

    /// Like [`run`](Self::run), but balance an already enforced decision
    /// instead of evaluating the criteria again.
    ///
    /// Balancing only raises desired levels, so feeding each outcome back in
    /// moves every decision monotonically toward finer levels.
    pub fn rebalance<F>(
        &mut self,
        config: &AmrConfig<D>,
        element: &Element<D>,
        mesh: &Mesh<D>,
        current: [Flag; D],
        feed: &F,
    ) -> Result<CycleStatus<D>, AmrError>
    where
        F: NeighborFeed<D> + ?Sized,
    {
        self.advance(CyclePhase::Evaluating);
        self.advance(CyclePhase::Enforcing);
        self.settle(config, element, mesh, current, feed)
    }

    /// Balance, re-enforce and apply, starting in `Enforcing`.
    fn settle<F>(
        &mut self,
        config: &AmrConfig<D>,
        element: &Element<D>,
        mesh: &Mesh<D>,
        mut flags: [Flag; D],
        feed: &F,
    ) -> Result<CycleStatus<D>, AmrError>
    where
        F: NeighborFeed<D> + ?Sized,
    {
        if config.mode() == RefinementMode::HAndP && element.number_of_neighbors() > 0 {
            let enforce_normal = config.policies().enforce_two_to_one_balance_in_normal_direction;
            let outcome =
                balance_against_neighbors(&mut flags, element, enforce_normal, |id| {
                    feed.neighbor_flags(id)
                })
                .map_err(|e| self.fail(e))?;
            match outcome {
                BalanceOutcome::MissingNeighbors(missing) => {
                    log::debug!(
                        "element {}: deferred, waiting on {} neighbors",
                        self.id,
                        missing.len()
                    );
                    self.advance(CyclePhase::Idle);
                    return Ok(CycleStatus::Deferred { missing });
                }
                BalanceOutcome::Balanced { changed: true } => {
                    flags =
                        enforce_policies(flags, &self.id, mesh, config.policies(), config.rules())
                            .map_err(|e| self.fail(e))?;
                }
                BalanceOutcome::Balanced { changed: false } => {}
            }
        }

        self.advance(CyclePhase::Applying);
        let outcome = apply_flags(&self.id, flags, mesh).map_err(|e| self.fail(e))?;
        self.advance(CyclePhase::Idle);
        Ok(CycleStatus::Completed(outcome))
    }
}

/// The enforced decision of an element before neighbor balancing.
///
/// Coordination layers publish these to neighbors ahead of [`run_cycle`].
pub fn proposed_flags<const D: usize>(
    config: &AmrConfig<D>,
    element_id: &ElementId<D>,
    mesh: &Mesh<D>,
) -> Result<[Flag; D], AmrError> {
    RefinementCycle::new(*element_id).propose(config, mesh)
}

/// Run one refinement cycle of `element`.
pub fn run_cycle<const D: usize, F>(
    config: &AmrConfig<D>,
    element: &Element<D>,
    mesh: &Mesh<D>,
    feed: &F,
) -> Result<CycleStatus<D>, AmrError>
where
    F: NeighborFeed<D> + ?Sized,
{
    RefinementCycle::new(*element.id()).run(config, element, mesh, feed)
}

/// Rebalance the decision `current` of `element` against its neighbors.
pub fn rebalance_cycle<const D: usize, F>(
    config: &AmrConfig<D>,
    element: &Element<D>,
    mesh: &Mesh<D>,
    current: [Flag; D],
    feed: &F,
) -> Result<CycleStatus<D>, AmrError>
where
    F: NeighborFeed<D> + ?Sized,
{
    RefinementCycle::new(*element.id()).rebalance(config, element, mesh, current, feed)
}

/// Turn validated flags into the element's new mesh and topology change.
pub fn apply_flags<const D: usize>(
    id: &ElementId<D>,
    flags: [Flag; D],
    mesh: &Mesh<D>,
) -> Result<CycleOutcome<D>, AmrError> {
    let mut extents = mesh.extents();
    for (d, extent) in extents.iter_mut().enumerate() {
        *extent = extent
            .checked_add_signed(flags[d].extent_delta())
            .ok_or(AmrError::InvalidExtent {
                dimension: d,
                extent: *extent,
                minimum: mesh.minimum_extent(d),
            })?;
    }
    let new_mesh = mesh.with_extents(extents)?;

    let refinement = if flags.contains(&Flag::Split) {
        Some(HRefinement::Split {
            children: id.children(&flags)?,
        })
    } else if flags.contains(&Flag::Join) {
        Some(HRefinement::Join {
            parent: id.parent(&flags)?,
        })
    } else {
        None
    };

    Ok(CycleOutcome {
        id: *id,
        flags,
        mesh: new_mesh,
        refinement,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{Criterion, DriveToTarget, IncreaseResolution};
    use crate::domain::layout::DomainLayout;
    use crate::domain::neighbors::find_neighbors;
    use crate::domain::segment::SegmentId;
    use crate::mesh::{Basis, Quadrature};
    use crate::policies::{HRefinementRules, Isotropy, Limits, Policies};

    fn config<const D: usize>(
        criteria: Vec<Criterion<D>>,
        mode: RefinementMode,
        error_on_violation: bool,
    ) -> AmrConfig<D> {
        AmrConfig::new(
            criteria,
            Policies::new(
                Isotropy::Anisotropic,
                Limits::uniform(0, 3, 3, 5).unwrap(),
                error_on_violation,
            ),
            HRefinementRules {
                mode,
                basis: Basis::Legendre,
                quadrature: Quadrature::GaussLobatto,
            },
        )
        .unwrap()
    }

    fn mesh<const D: usize>(extents: [usize; D]) -> Mesh<D> {
        Mesh::new(extents, Basis::Legendre, Quadrature::GaussLobatto).unwrap()
    }

    fn no_feed<const D: usize>() -> BTreeMap<ElementId<D>, [Flag; D]> {
        BTreeMap::new()
    }

    fn completed<const D: usize>(status: CycleStatus<D>) -> CycleOutcome<D> {
        match status {
            CycleStatus::Completed(outcome) => outcome,
            CycleStatus::Deferred { missing } => panic!("deferred on {missing:?}"),
        }
    }

    #[test]
    fn transition_table() {
        use CyclePhase::*;
        assert!(Idle.can_transition_to(Evaluating));
        assert!(Enforcing.can_transition_to(Fatal));
        assert!(!Idle.can_transition_to(Applying));
        assert!(!Fatal.can_transition_to(Applying));
        assert!(!Applying.can_transition_to(Enforcing));
    }

    #[test]
    fn p_refinement_updates_extent() {
        let cfg = config(
            vec![DriveToTarget::new([4, 3], [0, 0]).unwrap().into()],
            RefinementMode::HAndP,
            false,
        );
        let element = Element::isolated(ElementId::<2>::root(0));
        let status = run_cycle(&cfg, &element, &mesh([3, 4]), &no_feed()).unwrap();
        let outcome = completed(status);
        assert_eq!(
            outcome.flags,
            [Flag::IncreaseResolution, Flag::DecreaseResolution]
        );
        assert_eq!(outcome.mesh.extents(), [4, 3]);
        assert!(outcome.refinement.is_none());
    }

    #[test]
    fn split_reports_children() {
        let cfg = config(
            vec![DriveToTarget::new([3], [1]).unwrap().into()],
            RefinementMode::HAndP,
            true,
        );
        let id = ElementId::<1>::root(0);
        let outcome = completed(
            run_cycle(&cfg, &Element::isolated(id), &mesh([3]), &no_feed()).unwrap(),
        );
        assert_eq!(outcome.flags, [Flag::Split]);
        assert_eq!(
            outcome.refinement,
            Some(HRefinement::Split {
                children: id.children(&[Flag::Split]).unwrap()
            })
        );
        assert_eq!(outcome.mesh, mesh([3]));
    }

    #[test]
    fn failure_leaves_cycle_idle() {
        let cfg = config(
            vec![DriveToTarget::new([3], [0]).unwrap().into()],
            RefinementMode::POnly,
            false,
        );
        let id = ElementId::new(0, [SegmentId::new(1, 0).unwrap()]).unwrap();
        let mut cycle = RefinementCycle::new(id);
        let result = cycle.run(&cfg, &Element::isolated(id), &mesh([3]), &no_feed());
        assert!(matches!(result, Err(AmrError::Topology { .. })));
        assert_eq!(cycle.phase(), CyclePhase::Idle);
    }

    #[test]
    fn defers_without_neighbor_data() {
        let layout = DomainLayout::<1>::new(vec![[3]]).with_initial_levels(0, [1]).unwrap();
        let ids = layout.initial_element_ids().unwrap();
        let element = Element::new(ids[0], find_neighbors(&layout, &ids[0], ids.iter()).unwrap());
        let cfg = config(
            vec![IncreaseResolution::default().into()],
            RefinementMode::HAndP,
            false,
        );
        let status = run_cycle(&cfg, &element, &mesh([3]), &no_feed()).unwrap();
        assert_eq!(status, CycleStatus::Deferred { missing: vec![ids[1]] });

        let feed = FeedFn(|_: &ElementId<1>| Some([Flag::IncreaseResolution]));
        let outcome = completed(run_cycle(&cfg, &element, &mesh([3]), &feed).unwrap());
        assert_eq!(outcome.mesh.extents(), [4]);
    }

    #[test]
    fn p_only_skips_neighbor_exchange() {
        let layout = DomainLayout::<1>::new(vec![[3]]).with_initial_levels(0, [1]).unwrap();
        let ids = layout.initial_element_ids().unwrap();
        let element = Element::new(ids[0], find_neighbors(&layout, &ids[0], ids.iter()).unwrap());
        let cfg = config(
            vec![IncreaseResolution::default().into()],
            RefinementMode::POnly,
            false,
        );
        let outcome = completed(run_cycle(&cfg, &element, &mesh([3]), &no_feed()).unwrap());
        assert_eq!(outcome.flags, [Flag::IncreaseResolution]);
    }

    #[test]
    fn balancing_turns_join_into_do_nothing() {
        let layout = DomainLayout::<1>::new(vec![[3]]).with_initial_levels(0, [2]).unwrap();
        let ids = layout.initial_element_ids().unwrap();
        let element = Element::new(ids[1], find_neighbors(&layout, &ids[1], ids.iter()).unwrap());
        let cfg = config(
            vec![DriveToTarget::new([3], [1]).unwrap().into()],
            RefinementMode::HAndP,
            false,
        );
        let proposal = proposed_flags(&cfg, element.id(), &mesh([3])).unwrap();
        assert_eq!(proposal, [Flag::Join]);

        // the right-hand neighbor splits, so joining would break 2:1 balance
        let feed: BTreeMap<_, _> =
            [(ids[0], [Flag::Join]), (ids[2], [Flag::Split])].into_iter().collect();
        let outcome = completed(run_cycle(&cfg, &element, &mesh([3]), &feed).unwrap());
        assert_eq!(outcome.flags, [Flag::DoNothing]);
        assert!(outcome.refinement.is_none());
    }

    #[test]
    fn rebalance_keeps_an_abandoned_join_abandoned() {
        let layout = DomainLayout::<1>::new(vec![[3]]).with_initial_levels(0, [2]).unwrap();
        let ids = layout.initial_element_ids().unwrap();
        let element = Element::new(ids[1], find_neighbors(&layout, &ids[1], ids.iter()).unwrap());
        let cfg = config(
            vec![DriveToTarget::new([3], [1]).unwrap().into()],
            RefinementMode::HAndP,
            false,
        );

        // the sibling stays, so this element gives up its join
        let staying: BTreeMap<_, _> =
            [(ids[0], [Flag::DoNothing]), (ids[2], [Flag::Join])].into_iter().collect();
        let first = completed(run_cycle(&cfg, &element, &mesh([3]), &staying).unwrap());
        assert_eq!(first.flags, [Flag::DoNothing]);

        let joining: BTreeMap<_, _> =
            [(ids[0], [Flag::Join]), (ids[2], [Flag::Join])].into_iter().collect();
        let again = completed(
            rebalance_cycle(&cfg, &element, &mesh([3]), first.flags, &joining).unwrap(),
        );
        assert_eq!(again.flags, [Flag::DoNothing]);
        assert!(again.refinement.is_none());

        // starting over from the criteria would flip back to Join
        let fresh = completed(run_cycle(&cfg, &element, &mesh([3]), &joining).unwrap());
        assert_eq!(fresh.flags, [Flag::Join]);
    }
}
