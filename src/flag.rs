//! Per-dimension refinement flags.
//!
//! A [`Flag`] encodes a single AMR decision for one logical dimension of an
//! element. `Split`/`Join` change the element's tree level and identity
//! (h-refinement); `IncreaseResolution`/`DecreaseResolution` change the number
//! of grid points and keep the identity (p-refinement).

use crate::domain::element_id::ElementId;
use std::fmt;

/// A refinement decision in one dimension.
///
/// Variants are declared in priority order, so `Ord` ranks a Split above a
/// resolution change above doing nothing.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum Flag {
    /// No decision has been made yet.
    Undefined,
    Join,
    DecreaseResolution,
    DoNothing,
    IncreaseResolution,
    Split,
}

/// Whether a flag refines, coarsens or keeps an element.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FlagDirection {
    Refine,
    Coarsen,
    Neutral,
}

impl Flag {
    pub const ALL: [Flag; 6] = [
        Flag::Undefined,
        Flag::Join,
        Flag::DecreaseResolution,
        Flag::DoNothing,
        Flag::IncreaseResolution,
        Flag::Split,
    ];

    /// True for `Split` and `Join`.
    #[inline]
    pub fn is_h_refinement(self) -> bool {
        matches!(self, Flag::Split | Flag::Join)
    }

    /// True for `IncreaseResolution` and `DecreaseResolution`.
    #[inline]
    pub fn is_p_refinement(self) -> bool {
        matches!(self, Flag::IncreaseResolution | Flag::DecreaseResolution)
    }

    #[inline]
    pub fn direction(self) -> FlagDirection {
        match self {
            Flag::Split | Flag::IncreaseResolution => FlagDirection::Refine,
            Flag::Join | Flag::DecreaseResolution => FlagDirection::Coarsen,
            Flag::DoNothing | Flag::Undefined => FlagDirection::Neutral,
        }
    }

    /// `Undefined` becomes `DoNothing`; every other flag is returned as is.
    #[inline]
    pub fn resolve_undefined(self) -> Flag {
        match self {
            Flag::Undefined => Flag::DoNothing,
            other => other,
        }
    }

    /// The flag of the same kind pointing the other way.
    pub fn opposite(self) -> Flag {
        match self {
            Flag::Split => Flag::Join,
            Flag::Join => Flag::Split,
            Flag::IncreaseResolution => Flag::DecreaseResolution,
            Flag::DecreaseResolution => Flag::IncreaseResolution,
            other => other,
        }
    }

    /// Change in grid points this flag applies to the extent.
    #[inline]
    pub(crate) fn extent_delta(self) -> isize {
        match self {
            Flag::IncreaseResolution => 1,
            Flag::DecreaseResolution => -1,
            _ => 0,
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Flag::Undefined => "Undefined",
            Flag::Join => "Join",
            Flag::DecreaseResolution => "DecreaseResolution",
            Flag::DoNothing => "DoNothing",
            Flag::IncreaseResolution => "IncreaseResolution",
            Flag::Split => "Split",
        };
        f.write_str(name)
    }
}

/// A small set of flags, used to declare what a criterion may ever propose.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FlagSet(u8);

impl FlagSet {
    pub const EMPTY: FlagSet = FlagSet(0);

    pub fn of(flags: &[Flag]) -> Self {
        flags.iter().fold(Self::EMPTY, |set, flag| set.with(*flag))
    }

    #[must_use]
    pub fn with(self, flag: Flag) -> Self {
        FlagSet(self.0 | flag.bit())
    }

    pub fn contains(self, flag: Flag) -> bool {
        self.0 & flag.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn union(self, other: FlagSet) -> FlagSet {
        FlagSet(self.0 | other.0)
    }

    pub fn iter(self) -> impl Iterator<Item = Flag> {
        Flag::ALL.into_iter().filter(move |flag| self.contains(*flag))
    }

    /// True if some flag in `self` is the opposite of some flag in `other`.
    pub fn conflicts_with(self, other: FlagSet) -> bool {
        self.iter()
            .filter(|flag| flag.direction() != FlagDirection::Neutral)
            .any(|flag| other.contains(flag.opposite()))
    }
}

/// Refinement levels of `id` after its flags are applied.
pub fn desired_refinement_levels<const D: usize>(
    id: &ElementId<D>,
    flags: &[Flag; D],
) -> [u8; D] {
    let mut levels = id.refinement_levels();
    for (level, flag) in levels.iter_mut().zip(flags) {
        match flag {
            Flag::Split => *level += 1,
            Flag::Join => *level = level.saturating_sub(1),
            _ => {}
        }
    }
    levels
}

/// An element that splits in any dimension cannot join in another; such
/// Joins become `DoNothing`. Returns true if any flag changed.
pub fn prevent_element_from_joining_while_splitting<const D: usize>(
    flags: &mut [Flag; D],
) -> bool {
    if !flags.contains(&Flag::Split) {
        return false;
    }
    let mut changed = false;
    for flag in flags.iter_mut().filter(|flag| **flag == Flag::Join) {
        *flag = Flag::DoNothing;
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::segment::SegmentId;

    #[test]
    fn priority_order() {
        assert!(Flag::Split > Flag::IncreaseResolution);
        assert!(Flag::IncreaseResolution > Flag::DoNothing);
        assert!(Flag::DoNothing > Flag::DecreaseResolution);
        assert!(Flag::DecreaseResolution > Flag::Join);
        assert!(Flag::Join > Flag::Undefined);
    }

    #[test]
    fn kinds_and_directions() {
        assert!(Flag::Split.is_h_refinement());
        assert!(Flag::Join.is_h_refinement());
        assert!(!Flag::IncreaseResolution.is_h_refinement());
        assert!(Flag::DecreaseResolution.is_p_refinement());
        assert_eq!(Flag::Join.direction(), FlagDirection::Coarsen);
        assert_eq!(Flag::Undefined.resolve_undefined(), Flag::DoNothing);
        assert_eq!(Flag::Split.resolve_undefined(), Flag::Split);
    }

    #[test]
    fn flag_set_conflicts() {
        let grow = FlagSet::of(&[Flag::IncreaseResolution, Flag::DoNothing]);
        let any = FlagSet::of(&[Flag::Split, Flag::Join, Flag::DecreaseResolution]);
        assert!(grow.conflicts_with(any));
        assert!(!grow.conflicts_with(FlagSet::of(&[Flag::Split])));
        assert!(!FlagSet::EMPTY.conflicts_with(any));
        assert_eq!(grow.iter().count(), 2);
    }

    #[test]
    fn joining_blocked_by_split() {
        let mut flags = [Flag::Join, Flag::Split, Flag::DoNothing];
        assert!(prevent_element_from_joining_while_splitting(&mut flags));
        assert_eq!(flags, [Flag::DoNothing, Flag::Split, Flag::DoNothing]);
        let mut flags = [Flag::Join, Flag::Join];
        assert!(!prevent_element_from_joining_while_splitting(&mut flags));
    }

    #[test]
    fn desired_levels() {
        let id = ElementId::new(
            0,
            [SegmentId::new(2, 1).unwrap(), SegmentId::new(1, 0).unwrap()],
        )
        .unwrap();
        assert_eq!(
            desired_refinement_levels(&id, &[Flag::Join, Flag::Split]),
            [1, 2]
        );
    }
}
