//! Neighbor-aware reconciliation of refinement decisions.
//!
//! After criteria and policies have produced an element's flags, neighbors
//! exchange their flags so that refinement levels of face neighbors stay
//! within one of each other (2:1 balance), and so that an element never
//! tries to join with a neighbor that is not joining the same way.
//!
//! Updates only ever move a decision toward more refinement, so repeated
//! exchanges converge.

use crate::amr_error::AmrError;
use crate::domain::element_id::ElementId;
use crate::domain::neighbors::Element;
use crate::domain::orientation::OrientationMap;
use crate::flag::{Flag, desired_refinement_levels, prevent_element_from_joining_while_splitting};

/// Desired levels of a neighbor, expressed in this element's axis order.
pub fn desired_refinement_levels_of_neighbor<const D: usize>(
    neighbor_id: &ElementId<D>,
    neighbor_flags: &[Flag; D],
    orientation: &OrientationMap<D>,
) -> [u8; D] {
    let theirs = desired_refinement_levels(neighbor_id, neighbor_flags);
    if orientation.is_aligned() {
        theirs
    } else {
        orientation.permute_from_neighbor(theirs)
    }
}

/// Update `my_flags` given the flags of one neighbor.
///
/// Returns whether the decision changed. Fails if `neighbor_id` is not a
/// neighbor of `element`. With `enforce_normal` unset, the dimension normal
/// to the shared face is left alone.
pub fn update_amr_decision<const D: usize>(
    my_flags: &mut [Flag; D],
    element: &Element<D>,
    neighbor_id: &ElementId<D>,
    neighbor_flags: &[Flag; D],
    enforce_normal: bool,
) -> Result<bool, AmrError> {
    let element_id = element.id();
    let mut changed = false;
    let mut neighbor_found = false;
    let mut my_desired = desired_refinement_levels(element_id, my_flags);

    for (direction, neighbors) in element.neighbors() {
        if !neighbors.contains(neighbor_id) {
            continue;
        }
        // periodic domains can list the same neighbor in several directions
        neighbor_found = true;
        let neighbor_desired = desired_refinement_levels_of_neighbor(
            neighbor_id,
            neighbor_flags,
            neighbors.orientation(),
        );

        for d in 0..D {
            if d == direction.dimension && !enforce_normal {
                continue;
            }
            if my_flags[d] == Flag::Split || my_desired[d] >= neighbor_desired[d] {
                continue;
            }
            let difference = neighbor_desired[d] - my_desired[d];
            debug_assert!(
                difference < 4,
                "neighbor level {} vs my level {} in {element_id}",
                neighbor_desired[d],
                my_desired[d]
            );
            if my_flags[d] == Flag::Join {
                if difference == 3 {
                    my_flags[d] = Flag::Split;
                    my_desired[d] += 2;
                    changed = true;
                } else if difference == 2 {
                    my_flags[d] = Flag::DoNothing;
                    my_desired[d] += 1;
                    changed = true;
                }
            } else if difference == 2 {
                my_flags[d] = Flag::Split;
                my_desired[d] += 1;
                changed = true;
            }
        }

        let normal = direction.dimension;
        if element_id.has_potential_sibling(*direction)
            && my_flags[normal] == Flag::Join
            && my_desired != neighbor_desired
        {
            my_flags[normal] = Flag::DoNothing;
            my_desired[normal] += 1;
            changed = true;
        }
    }

    if !neighbor_found {
        return Err(AmrError::UnknownElement(format!(
            "{neighbor_id} is not a neighbor of {element_id}"
        )));
    }

    let joining_blocked = prevent_element_from_joining_while_splitting(my_flags);
    Ok(changed || joining_blocked)
}

/// Result of balancing against every neighbor of an element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BalanceOutcome<const D: usize> {
    /// All neighbor decisions were available; `changed` reports an update.
    Balanced { changed: bool },
    /// These neighbors have not published a decision yet.
    MissingNeighbors(Vec<ElementId<D>>),
}

/// Run [`update_amr_decision`] against every neighbor of `element`.
///
/// `neighbor_flags` supplies each neighbor's current decision. If any
/// neighbor cannot be supplied, `my_flags` is left untouched and the missing
/// ids are reported.
pub fn balance_against_neighbors<const D: usize, F>(
    my_flags: &mut [Flag; D],
    element: &Element<D>,
    enforce_normal: bool,
    mut neighbor_flags: F,
) -> Result<BalanceOutcome<D>, AmrError>
where
    F: FnMut(&ElementId<D>) -> Option<[Flag; D]>,
{
    let mut snapshots = Vec::new();
    let mut missing = Vec::new();
    for id in element.neighbor_ids() {
        match neighbor_flags(&id) {
            Some(flags) => snapshots.push((id, flags)),
            None => missing.push(id),
        }
    }
    if !missing.is_empty() {
        return Ok(BalanceOutcome::MissingNeighbors(missing));
    }

    let mut candidate = *my_flags;
    let mut changed = false;
    for (id, flags) in &snapshots {
        changed |= update_amr_decision(&mut candidate, element, id, flags, enforce_normal)?;
    }
    *my_flags = candidate;
    Ok(BalanceOutcome::Balanced { changed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::layout::DomainLayout;
    use crate::domain::neighbors::find_neighbors;
    use crate::domain::orientation::Direction;
    use crate::domain::segment::SegmentId;

    fn id1(level: u8, index: u32) -> ElementId<1> {
        ElementId::new(0, [SegmentId::new(level, index).unwrap()]).unwrap()
    }

    fn element_among(id: ElementId<1>, all: &[ElementId<1>]) -> Element<1> {
        let layout = DomainLayout::<1>::new(vec![[3]]);
        Element::new(id, find_neighbors(&layout, &id, all.iter()).unwrap())
    }

    #[test]
    fn join_becomes_split_when_neighbor_splits_twice_finer() {
        // me: level 1 wanting to join; right neighbor: level 2 wanting to split
        let me = id1(1, 0);
        let right = id1(2, 2);
        let element = element_among(me, &[me, right, id1(2, 3)]);
        let mut flags = [Flag::Join];
        let changed =
            update_amr_decision(&mut flags, &element, &right, &[Flag::Split], true).unwrap();
        assert!(changed);
        assert_eq!(flags, [Flag::Split]);

        // a neighbor staying two levels finer only blocks the join
        let mut flags = [Flag::Join];
        assert!(
            update_amr_decision(&mut flags, &element, &right, &[Flag::DoNothing], true).unwrap()
        );
        assert_eq!(flags, [Flag::DoNothing]);
    }

    #[test]
    fn do_nothing_becomes_split() {
        let me = id1(1, 0);
        let right = id1(2, 2);
        let element = element_among(me, &[me, right, id1(2, 3)]);
        let mut flags = [Flag::IncreaseResolution];
        assert!(update_amr_decision(&mut flags, &element, &right, &[Flag::Split], true).unwrap());
        assert_eq!(flags, [Flag::Split]);

        let mut flags = [Flag::DoNothing];
        assert!(
            !update_amr_decision(&mut flags, &element, &right, &[Flag::DoNothing], true).unwrap()
        );
        assert_eq!(flags, [Flag::DoNothing]);
    }

    #[test]
    fn normal_direction_can_be_exempt() {
        let me = id1(1, 0);
        let right = id1(2, 2);
        let element = element_among(me, &[me, right, id1(2, 3)]);
        let mut flags = [Flag::DoNothing];
        assert!(!update_amr_decision(&mut flags, &element, &right, &[Flag::Split], false).unwrap());
        assert_eq!(flags, [Flag::DoNothing]);
    }

    #[test]
    fn cannot_join_sibling_that_stays() {
        let me = id1(2, 0);
        let sibling = id1(2, 1);
        let element = element_among(me, &[me, sibling, id1(1, 1)]);
        assert!(element.id().has_potential_sibling(Direction::upper(0)));
        let mut flags = [Flag::Join];
        assert!(
            update_amr_decision(&mut flags, &element, &sibling, &[Flag::DoNothing], true)
                .unwrap()
        );
        assert_eq!(flags, [Flag::DoNothing]);

        let mut flags = [Flag::Join];
        assert!(!update_amr_decision(&mut flags, &element, &sibling, &[Flag::Join], true).unwrap());
        assert_eq!(flags, [Flag::Join]);
    }

    #[test]
    fn unknown_neighbor_is_an_error() {
        let me = id1(1, 0);
        let element = element_among(me, &[me, id1(1, 1)]);
        let mut flags = [Flag::DoNothing];
        assert!(matches!(
            update_amr_decision(&mut flags, &element, &id1(2, 3), &[Flag::Split], true),
            Err(AmrError::UnknownElement(_))
        ));
    }

    #[test]
    fn missing_snapshots_defer() {
        let me = id1(1, 0);
        let right = id1(1, 1);
        let element = element_among(me, &[me, right]);
        let mut flags = [Flag::Join];
        let outcome = balance_against_neighbors(&mut flags, &element, true, |_| None).unwrap();
        assert_eq!(outcome, BalanceOutcome::MissingNeighbors(vec![right]));
        assert_eq!(flags, [Flag::Join]);
    }

    #[test]
    fn neighbor_levels_follow_orientation() {
        let neighbor = ElementId::new(
            1,
            [SegmentId::new(2, 0).unwrap(), SegmentId::new(0, 0).unwrap()],
        )
        .unwrap();
        let swap = OrientationMap::new([Direction::upper(1), Direction::upper(0)]).unwrap();
        assert_eq!(
            desired_refinement_levels_of_neighbor(&neighbor, &[Flag::Split, Flag::Split], &swap),
            [1, 3]
        );
    }
}
