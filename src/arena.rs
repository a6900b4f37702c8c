//! Per-element store and the topology layer around the refinement cycle.
//!
//! The arena owns every element's record, keyed by [`ElementId`]. Neighbor
//! relations are stored as ids inside each [`Element`], so the cyclic
//! element graph never holds references. Topology changes remove and insert
//! records wholesale and recompute the neighbor maps of everything adjacent.

use crate::amr_error::{AmrError, TopologyReason};
use crate::config::AmrConfig;
use crate::cycle::{CycleOutcome, CycleStatus, HRefinement, proposed_flags, rebalance_cycle};
use crate::debug_invariants::DebugInvariants;
use crate::domain::element_id::ElementId;
use crate::domain::layout::DomainLayout;
use crate::domain::neighbors::{Element, Neighbors, find_neighbors};
use crate::domain::orientation::{Direction, Orientation, OrientationMap};
use crate::flag::Flag;
use crate::mesh::{Basis, Mesh, Quadrature, create_initial_mesh};
use hashbrown::HashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementRecord<const D: usize> {
    pub element: Element<D>,
    pub mesh: Mesh<D>,
}

/// Change of one surviving element's neighbors in one direction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrientationDelta<const D: usize> {
    pub element: ElementId<D>,
    pub direction: Direction,
    pub previous: Option<Neighbors<D>>,
    pub current: Option<Neighbors<D>>,
}

/// What one call to [`ElementArena::refine_all`] did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoundSummary {
    /// Balancing passes until no decision changed.
    pub passes: usize,
    pub p_refined: usize,
    pub split: usize,
    pub joined: usize,
    /// Join groups dropped because a sibling did not take part.
    pub abandoned_joins: usize,
    pub deferred: usize,
    pub orientation_updates: usize,
}

#[derive(Clone, Debug)]
pub struct ElementArena<const D: usize> {
    layout: Arc<DomainLayout<D>>,
    records: HashMap<ElementId<D>, ElementRecord<D>>,
}

static_assertions::assert_impl_all!(ElementArena<3>: Send, Sync);
static_assertions::assert_impl_all!(AmrConfig<3>: Send, Sync);

fn orientation_deltas<const D: usize>(
    id: &ElementId<D>,
    before: &BTreeMap<Direction, Neighbors<D>>,
    after: &BTreeMap<Direction, Neighbors<D>>,
) -> Vec<OrientationDelta<D>> {
    let directions: BTreeSet<Direction> = before.keys().chain(after.keys()).copied().collect();
    directions
        .into_iter()
        .filter(|d| before.get(d) != after.get(d))
        .map(|direction| OrientationDelta {
            element: *id,
            direction,
            previous: before.get(&direction).cloned(),
            current: after.get(&direction).cloned(),
        })
        .collect()
}

impl<const D: usize> ElementArena<D> {
    /// Every block's elements at its initial levels and extents.
    pub fn new(
        layout: Arc<DomainLayout<D>>,
        basis: Basis,
        quadrature: Quadrature,
    ) -> Result<Self, AmrError> {
        layout.validate()?;
        let ids = layout.initial_element_ids()?;
        let mut records = HashMap::with_capacity(ids.len());
        for id in &ids {
            let mesh =
                create_initial_mesh(&layout, id, basis, quadrature, &OrientationMap::aligned())?;
            let neighbors = find_neighbors(&layout, id, ids.iter())?;
            records.insert(
                *id,
                ElementRecord {
                    element: Element::new(*id, neighbors),
                    mesh,
                },
            );
        }
        log::debug!(
            "arena initialized with {} elements in {} blocks",
            records.len(),
            layout.block_count()
        );
        let arena = Self { layout, records };
        arena.debug_assert_invariants();
        Ok(arena)
    }

    pub fn layout(&self) -> &DomainLayout<D> {
        &self.layout
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &ElementId<D>) -> bool {
        self.records.contains_key(id)
    }

    pub fn get(&self, id: &ElementId<D>) -> Option<&ElementRecord<D>> {
        self.records.get(id)
    }

    pub fn record(&self, id: &ElementId<D>) -> Result<&ElementRecord<D>, AmrError> {
        self.records
            .get(id)
            .ok_or_else(|| AmrError::UnknownElement(id.to_string()))
    }

    /// All ids in ascending order.
    pub fn ids(&self) -> Vec<ElementId<D>> {
        let mut ids: Vec<_> = self.records.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ElementId<D>, &ElementRecord<D>)> {
        self.records.iter()
    }

    /// Replace `id` by `children`, all built with `mesh`.
    pub fn apply_split(
        &mut self,
        id: &ElementId<D>,
        children: &[ElementId<D>],
        mesh: Mesh<D>,
    ) -> Result<Vec<OrientationDelta<D>>, AmrError> {
        let first = children.first().ok_or_else(|| {
            AmrError::InvalidElementId(format!("split of {id} without children"))
        })?;
        let levels = id.refinement_levels();
        let child_levels = first.refinement_levels();
        let flags: [Flag; D] = std::array::from_fn(|d| {
            if child_levels[d] > levels[d] {
                Flag::Split
            } else {
                Flag::DoNothing
            }
        });
        let expected: BTreeSet<_> = id.children(&flags)?.into_iter().collect();
        let given: BTreeSet<_> = children.iter().copied().collect();
        if !flags.contains(&Flag::Split) || expected != given || given.len() != children.len() {
            return Err(AmrError::InvalidElementId(format!(
                "{children:?} are not the children of {id}"
            )));
        }
        let deltas = self.replace(&[*id], children, mesh)?;
        log::debug!("split {id} into {} children", children.len());
        self.debug_assert_invariants();
        Ok(deltas)
    }

    /// Merge every element inside `parent` into one element built with `mesh`.
    pub fn apply_join(
        &mut self,
        parent: &ElementId<D>,
        mesh: Mesh<D>,
    ) -> Result<Vec<OrientationDelta<D>>, AmrError> {
        if self.records.contains_key(parent) {
            return Err(AmrError::InvalidElementId(format!("{parent} already exists")));
        }
        let mut inside: Vec<_> = self
            .records
            .keys()
            .filter(|id| id.overlaps(parent))
            .copied()
            .collect();
        inside.sort_unstable();
        let incomplete = || AmrError::Topology {
            element: parent.to_string(),
            dimension: 0,
            reason: TopologyReason::IncompleteSiblings,
        };
        let first = inside.first().ok_or_else(incomplete)?;
        let parent_levels = parent.refinement_levels();
        let child_levels = first.refinement_levels();
        let mut split_back = [Flag::DoNothing; D];
        for d in 0..D {
            if child_levels[d] == parent_levels[d] + 1 {
                split_back[d] = Flag::Split;
            } else if child_levels[d] != parent_levels[d] {
                return Err(AmrError::Topology {
                    element: first.to_string(),
                    dimension: d,
                    reason: TopologyReason::IncompleteSiblings,
                });
            }
        }
        if parent.children(&split_back)? != inside {
            return Err(incomplete());
        }
        let deltas = self.replace(&inside, &[*parent], mesh)?;
        log::debug!("joined {} elements into {parent}", inside.len());
        self.debug_assert_invariants();
        Ok(deltas)
    }

    /// Swap `removed` for `added` and refresh every affected neighbor map.
    ///
    /// All lookups happen before the first mutation, so a failure leaves the
    /// arena unchanged.
    fn replace(
        &mut self,
        removed: &[ElementId<D>],
        added: &[ElementId<D>],
        mesh: Mesh<D>,
    ) -> Result<Vec<OrientationDelta<D>>, AmrError> {
        let removed_set: BTreeSet<_> = removed.iter().copied().collect();
        let mut adjacent = BTreeSet::new();
        for id in removed {
            adjacent.extend(
                self.record(id)?
                    .element
                    .neighbor_ids()
                    .into_iter()
                    .filter(|n| !removed_set.contains(n)),
            );
        }

        // anything touching a new element touched one of the removed ones
        let candidates: Vec<_> = adjacent.iter().chain(added.iter()).copied().collect();
        let mut new_elements = Vec::with_capacity(added.len());
        for id in added {
            new_elements.push(Element::new(
                *id,
                find_neighbors(&self.layout, id, candidates.iter())?,
            ));
        }

        let mut refreshed = Vec::with_capacity(adjacent.len());
        for id in &adjacent {
            let candidates: Vec<_> = self
                .record(id)?
                .element
                .neighbor_ids()
                .into_iter()
                .filter(|n| !removed_set.contains(n))
                .chain(added.iter().copied())
                .collect();
            refreshed.push((*id, find_neighbors(&self.layout, id, candidates.iter())?));
        }

        for id in removed {
            self.records.remove(id);
        }
        for element in new_elements {
            self.records.insert(*element.id(), ElementRecord { element, mesh });
        }
        let mut deltas = Vec::new();
        for (id, neighbors) in refreshed {
            if let Some(record) = self.records.get_mut(&id) {
                deltas.extend(orientation_deltas(&id, record.element.neighbors(), &neighbors));
                record.element.set_neighbors(neighbors);
            }
        }
        Ok(deltas)
    }

    /// Upper bound on balancing passes in one [`refine_all`](Self::refine_all)
    /// round.
    ///
    /// A pass that changes nothing ends the round, and every other pass
    /// changes some element's flag in some dimension, which happens at most
    /// three times per element and dimension.
    pub fn max_balancing_passes(&self) -> usize {
        3 * D * self.records.len() + 2
    }

    /// Rebalance every element's decision against the given decisions.
    fn cycle_pass(
        &self,
        config: &AmrConfig<D>,
        decisions: &HashMap<ElementId<D>, [Flag; D]>,
    ) -> Result<Vec<CycleStatus<D>>, AmrError> {
        let mut records: Vec<_> = self.records.values().collect();
        records.sort_unstable_by_key(|record| *record.element.id());

        #[cfg(feature = "rayon")]
        let iter = records.par_iter();
        #[cfg(not(feature = "rayon"))]
        let iter = records.iter();

        iter.map(|record| {
            let id = record.element.id();
            let current = decisions
                .get(id)
                .copied()
                .ok_or_else(|| AmrError::UnknownElement(id.to_string()))?;
            rebalance_cycle(config, &record.element, &record.mesh, current, decisions)
        })
        .collect()
    }

    /// One coordination round over the whole domain.
    ///
    /// Every element publishes its enforced proposal. Each pass then
    /// rebalances every current decision against the previous pass's
    /// decisions until nothing changes; desired levels never drop between
    /// passes. The first fatal element error aborts the round before anything
    /// is applied, as does a round that has not settled within
    /// [`max_balancing_passes`](Self::max_balancing_passes). Otherwise
    /// p-refinement is applied in place, then splits, then joins whose
    /// siblings all agreed.
    pub fn refine_all(&mut self, config: &AmrConfig<D>) -> Result<RoundSummary, AmrError> {
        let mut summary = RoundSummary::default();

        let mut decisions = HashMap::with_capacity(self.records.len());
        for (id, record) in &self.records {
            decisions.insert(*id, proposed_flags(config, id, &record.mesh)?);
        }

        let max_passes = self.max_balancing_passes();
        let outcomes = loop {
            if summary.passes == max_passes {
                return Err(AmrError::Unsettled { passes: max_passes });
            }
            summary.passes += 1;
            let statuses = self.cycle_pass(config, &decisions)?;
            let mut changed = false;
            let mut outcomes = Vec::with_capacity(statuses.len());
            summary.deferred = 0;
            for status in statuses {
                match status {
                    CycleStatus::Completed(outcome) => {
                        if decisions.insert(outcome.id, outcome.flags) != Some(outcome.flags) {
                            changed = true;
                        }
                        outcomes.push(outcome);
                    }
                    CycleStatus::Deferred { .. } => summary.deferred += 1,
                }
            }
            if !changed {
                break outcomes;
            }
        };
        log::debug!(
            "refinement decisions settled after {} passes over {} elements",
            summary.passes,
            outcomes.len()
        );

        let mut splits = Vec::new();
        let mut joins: BTreeMap<ElementId<D>, Vec<CycleOutcome<D>>> = BTreeMap::new();
        for outcome in outcomes {
            match outcome.refinement {
                None => {
                    if let Some(record) = self.records.get_mut(&outcome.id) {
                        if record.mesh != outcome.mesh {
                            record.mesh = outcome.mesh;
                            summary.p_refined += 1;
                        }
                    }
                }
                Some(HRefinement::Split { ref children }) => {
                    splits.push((outcome.id, children.clone(), outcome.mesh));
                }
                Some(HRefinement::Join { parent }) => {
                    joins.entry(parent).or_default().push(outcome);
                }
            }
        }

        for (id, children, mesh) in splits {
            summary.orientation_updates += self.apply_split(&id, &children, mesh)?.len();
            summary.split += 1;
        }

        for (parent, group) in joins {
            let Some(first) = group.first() else {
                continue;
            };
            let expected: BTreeSet<_> = first.id.siblings(&first.flags)?.into_iter().collect();
            let joining: BTreeSet<_> = group.iter().map(|outcome| outcome.id).collect();
            if expected != joining {
                log::warn!(
                    "join into {parent} abandoned: {} of {} siblings agreed",
                    joining.len(),
                    expected.len()
                );
                summary.abandoned_joins += 1;
                for outcome in &group {
                    if let Some(record) = self.records.get_mut(&outcome.id) {
                        record.mesh = outcome.mesh;
                    }
                }
                continue;
            }
            let mut extents = first.mesh.extents();
            for outcome in &group[1..] {
                for (extent, theirs) in extents.iter_mut().zip(outcome.mesh.extents()) {
                    *extent = (*extent).max(theirs);
                }
            }
            let mesh = first.mesh.with_extents(extents)?;
            summary.orientation_updates += self.apply_join(&parent, mesh)?.len();
            summary.joined += 1;
        }

        log::debug!("refinement round finished: {summary:?}");
        Ok(summary)
    }
}

impl<const D: usize> DebugInvariants for ElementArena<D> {
    fn validate_invariants(&self) -> Result<(), AmrError> {
        let mut by_block: BTreeMap<usize, Vec<ElementId<D>>> = BTreeMap::new();
        for (id, record) in &self.records {
            if record.element.id() != id {
                return Err(AmrError::InvalidElementId(format!(
                    "record of {id} holds element {}",
                    record.element.id()
                )));
            }
            self.layout.block(id.block_id())?;
            by_block.entry(id.block_id()).or_default().push(*id);

            for (direction, neighbors) in record.element.neighbors() {
                let orientation = *neighbors.orientation();
                let back = orientation.map_direction(*direction).opposite();
                for neighbor in neighbors.ids() {
                    let seen = self
                        .record(neighbor)?
                        .element
                        .neighbors_in(back)
                        .filter(|theirs| theirs.contains(id))
                        .ok_or_else(|| {
                            AmrError::InvalidOrientation(format!(
                                "{neighbor} does not list {id} as a neighbor through {back:?}"
                            ))
                        })?;
                    if *seen.orientation() != OrientationMap::inverse(orientation) {
                        return Err(AmrError::InvalidOrientation(format!(
                            "orientation between {id} and {neighbor} is not mutually inverse"
                        )));
                    }
                }
            }
        }

        for ids in by_block.values() {
            for (i, a) in ids.iter().enumerate() {
                if let Some(b) = ids[i + 1..].iter().find(|b| a.overlaps(b)) {
                    return Err(AmrError::InvalidElementId(format!("{a} overlaps {b}")));
                }
            }
        }
        Ok(())
    }
}
