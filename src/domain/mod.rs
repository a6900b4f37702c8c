//! Element identity, block layout, orientation and adjacency.
//!
//! This module provides:
//! - [`SegmentId`] and [`ElementId`] for positions in per-block refinement trees
//! - [`OrientationMap`] relating adjacent elements' logical axes
//! - [`DomainLayout`], the read-only block table shared by a run
//! - [`Element`] and [`find_neighbors`] for face adjacency

pub mod element_id;
pub mod layout;
pub mod neighbors;
pub mod orientation;
pub mod segment;

pub use element_id::ElementId;
pub use layout::{Block, BlockNeighbor, DomainLayout};
pub use neighbors::{Element, Neighbors, find_neighbors, touching_orientation};
pub use orientation::{BitFlip, Direction, Orientation, OrientationMap, Side};
pub use segment::{MAX_REFINEMENT_LEVEL, SegmentId};
