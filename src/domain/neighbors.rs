//! Element adjacency.
//!
//! Two elements are neighbors when their blocks are equal or glued together
//! and their tree nodes touch across a face. Within a block this means the
//! segments abut in the normal dimension and overlap in every other one;
//! across blocks both elements must lie on the shared block face, with the
//! tangential segments compared after mapping through the block orientation.

use crate::amr_error::AmrError;
use crate::domain::element_id::ElementId;
use crate::domain::layout::DomainLayout;
use crate::domain::orientation::{Direction, OrientationMap};
use std::collections::{BTreeMap, BTreeSet};

/// The elements adjacent to one face, with the shared orientation map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Neighbors<const D: usize> {
    ids: BTreeSet<ElementId<D>>,
    orientation: OrientationMap<D>,
}

impl<const D: usize> Neighbors<D> {
    pub fn new(ids: BTreeSet<ElementId<D>>, orientation: OrientationMap<D>) -> Self {
        Self { ids, orientation }
    }

    pub fn ids(&self) -> &BTreeSet<ElementId<D>> {
        &self.ids
    }

    pub fn orientation(&self) -> &OrientationMap<D> {
        &self.orientation
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &ElementId<D>) -> bool {
        self.ids.contains(id)
    }
}

/// An element's identity and its face neighbors.
///
/// Neighbors are stored as id keys into the owning store; an element never
/// holds a reference to another element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element<const D: usize> {
    id: ElementId<D>,
    neighbors: BTreeMap<Direction, Neighbors<D>>,
}

impl<const D: usize> Element<D> {
    pub fn new(id: ElementId<D>, neighbors: BTreeMap<Direction, Neighbors<D>>) -> Self {
        Self { id, neighbors }
    }

    /// An element with no neighbors, e.g. a single-block domain.
    pub fn isolated(id: ElementId<D>) -> Self {
        Self::new(id, BTreeMap::new())
    }

    #[inline]
    pub fn id(&self) -> &ElementId<D> {
        &self.id
    }

    pub fn neighbors(&self) -> &BTreeMap<Direction, Neighbors<D>> {
        &self.neighbors
    }

    pub fn neighbors_in(&self, direction: Direction) -> Option<&Neighbors<D>> {
        self.neighbors.get(&direction)
    }

    pub(crate) fn set_neighbors(&mut self, neighbors: BTreeMap<Direction, Neighbors<D>>) {
        self.neighbors = neighbors;
    }

    pub fn number_of_neighbors(&self) -> usize {
        self.neighbors.values().map(Neighbors::len).sum()
    }

    /// Distinct neighbor ids over all faces.
    pub fn neighbor_ids(&self) -> BTreeSet<ElementId<D>> {
        self.neighbors
            .values()
            .flat_map(|neighbors| neighbors.ids().iter().copied())
            .collect()
    }

    /// Faces with no neighbor.
    pub fn external_boundaries(&self) -> Vec<Direction> {
        Direction::all(D)
            .filter(|direction| !self.neighbors.contains_key(direction))
            .collect()
    }
}

/// If `candidate` touches `id` through `direction`, the orientation map from
/// `id`'s axes to the candidate's.
pub fn touching_orientation<const D: usize>(
    layout: &DomainLayout<D>,
    id: &ElementId<D>,
    direction: Direction,
    candidate: &ElementId<D>,
) -> Result<Option<OrientationMap<D>>, AmrError> {
    let normal = direction.dimension;
    let mine = id.segment(normal);

    if candidate.block_id() == id.block_id()
        && mine.abuts(candidate.segment(normal), direction.side)
        && (0..D)
            .filter(|d| *d != normal)
            .all(|d| id.segment(d).overlaps(candidate.segment(d)))
    {
        return Ok(Some(OrientationMap::aligned()));
    }

    if !mine.touches_block_boundary(direction.side) {
        return Ok(None);
    }
    let Some(across) = layout.block(id.block_id())?.neighbor(direction) else {
        return Ok(None);
    };
    if across.block_id != candidate.block_id() {
        return Ok(None);
    }
    let orientation = across.orientation;
    let face = orientation.map_direction(direction);
    if !candidate
        .segment(face.dimension)
        .touches_block_boundary(face.side.opposite())
    {
        return Ok(None);
    }
    let tangential_overlap = (0..D).filter(|d| *d != normal).all(|d| {
        let (theirs, mapped) = orientation.map_segment(d, id.segment(d));
        mapped.overlaps(candidate.segment(theirs))
    });
    Ok(tangential_overlap.then_some(orientation))
}

/// Face neighbors of `id` among `candidates`, grouped by direction.
pub fn find_neighbors<'a, const D: usize, I>(
    layout: &DomainLayout<D>,
    id: &ElementId<D>,
    candidates: I,
) -> Result<BTreeMap<Direction, Neighbors<D>>, AmrError>
where
    I: IntoIterator<Item = &'a ElementId<D>>,
    I::IntoIter: Clone,
{
    let candidates = candidates.into_iter();
    let mut found = BTreeMap::new();
    for direction in Direction::all(D) {
        let mut ids = BTreeSet::new();
        let mut orientation = None;
        for candidate in candidates.clone() {
            if let Some(o) = touching_orientation(layout, id, direction, candidate)? {
                ids.insert(*candidate);
                orientation = Some(o);
            }
        }
        if let Some(orientation) = orientation {
            found.insert(direction, Neighbors::new(ids, orientation));
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::segment::SegmentId;

    fn seg(level: u8, index: u32) -> SegmentId {
        SegmentId::new(level, index).unwrap()
    }

    #[test]
    fn same_block_neighbors_across_levels() {
        let layout = DomainLayout::<2>::new(vec![[3, 3]]);
        let left = ElementId::new(0, [seg(1, 0), seg(0, 0)]).unwrap();
        let upper_right = ElementId::new(0, [seg(1, 1), seg(1, 1)]).unwrap();
        let lower_right = ElementId::new(0, [seg(1, 1), seg(1, 0)]).unwrap();
        let all = [left, upper_right, lower_right];
        let found = find_neighbors(&layout, &left, all.iter()).unwrap();
        assert_eq!(found.len(), 1);
        let east = &found[&Direction::upper(0)];
        assert_eq!(east.len(), 2);
        assert!(east.orientation().is_aligned());

        let found = find_neighbors(&layout, &upper_right, all.iter()).unwrap();
        assert!(found[&Direction::lower(0)].contains(&left));
        assert!(found[&Direction::lower(1)].contains(&lower_right));
    }

    #[test]
    fn across_rotated_blocks() {
        // leaving block 0 through +x enters block 1 through its +y face
        let rotated = OrientationMap::new([Direction::lower(1), Direction::upper(0)]).unwrap();
        let layout = DomainLayout::new(vec![[3, 3], [3, 3]])
            .connect(0, Direction::upper(0), 1, rotated)
            .unwrap();
        let mine = ElementId::new(0, [seg(1, 1), seg(1, 1)]).unwrap();
        let touching = ElementId::new(1, [seg(1, 1), seg(1, 1)]).unwrap();
        let wrong_half = ElementId::new(1, [seg(1, 0), seg(1, 1)]).unwrap();
        let away_from_face = ElementId::new(1, [seg(1, 1), seg(1, 0)]).unwrap();

        let check = |c: &ElementId<2>| {
            touching_orientation(&layout, &mine, Direction::upper(0), c).unwrap()
        };
        assert_eq!(check(&touching), Some(rotated));
        assert_eq!(check(&wrong_half), None);
        assert_eq!(check(&away_from_face), None);
    }

    #[test]
    fn element_accessors() {
        let id = ElementId::<1>::root(0);
        let element = Element::isolated(id);
        assert_eq!(element.number_of_neighbors(), 0);
        assert_eq!(element.external_boundaries().len(), 2);
    }
}
