//! Block table of a domain: initial extents, initial refinement and
//! block-to-block connectivity.
//!
//! The layout is fixed at domain construction and shared read-only (behind an
//! `Arc`) by every refinement cycle of a run.

use crate::amr_error::AmrError;
use crate::domain::element_id::ElementId;
use crate::domain::orientation::{Direction, Orientation, OrientationMap};
use crate::domain::segment::{MAX_REFINEMENT_LEVEL, SegmentId};
use itertools::Itertools;
use std::collections::BTreeMap;

/// The block on the other side of a block face.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockNeighbor<const D: usize> {
    pub block_id: usize,
    /// Maps this block's axes onto the neighbor block's axes.
    pub orientation: OrientationMap<D>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block<const D: usize> {
    initial_extents: [usize; D],
    initial_levels: [u8; D],
    neighbors: BTreeMap<Direction, BlockNeighbor<D>>,
}

impl<const D: usize> Block<D> {
    pub fn initial_extents(&self) -> [usize; D] {
        self.initial_extents
    }

    pub fn initial_levels(&self) -> [u8; D] {
        self.initial_levels
    }

    pub fn neighbor(&self, direction: Direction) -> Option<&BlockNeighbor<D>> {
        self.neighbors.get(&direction)
    }

    pub fn neighbors(&self) -> impl Iterator<Item = (&Direction, &BlockNeighbor<D>)> {
        self.neighbors.iter()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DomainLayout<const D: usize> {
    blocks: Vec<Block<D>>,
}

impl<const D: usize> DomainLayout<D> {
    /// One unrefined, unconnected block per entry of `initial_extents`.
    pub fn new(initial_extents: Vec<[usize; D]>) -> Self {
        let blocks = initial_extents
            .into_iter()
            .map(|initial_extents| Block {
                initial_extents,
                initial_levels: [0; D],
                neighbors: BTreeMap::new(),
            })
            .collect();
        Self { blocks }
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, block_id: usize) -> Result<&Block<D>, AmrError> {
        self.blocks
            .get(block_id)
            .ok_or(AmrError::UnknownBlock(block_id))
    }

    pub fn blocks(&self) -> impl Iterator<Item = (usize, &Block<D>)> {
        self.blocks.iter().enumerate()
    }

    pub fn initial_extents(&self, block_id: usize) -> Result<[usize; D], AmrError> {
        self.block(block_id).map(Block::initial_extents)
    }

    /// Set the uniform refinement levels the block starts with.
    pub fn with_initial_levels(
        mut self,
        block_id: usize,
        levels: [u8; D],
    ) -> Result<Self, AmrError> {
        if let Some(level) = levels.iter().find(|level| **level > MAX_REFINEMENT_LEVEL) {
            return Err(AmrError::Configuration(format!(
                "initial refinement level {level} of block {block_id} exceeds \
                 {MAX_REFINEMENT_LEVEL}"
            )));
        }
        let block = self
            .blocks
            .get_mut(block_id)
            .ok_or(AmrError::UnknownBlock(block_id))?;
        block.initial_levels = levels;
        Ok(self)
    }

    /// Glue face `direction` of `block_id` to `neighbor_id`, recording both sides.
    ///
    /// The neighbor sees this block through the opposite of the mapped
    /// direction, with the inverse orientation. A block may be glued to
    /// itself for periodic domains.
    pub fn connect(
        mut self,
        block_id: usize,
        direction: Direction,
        neighbor_id: usize,
        orientation: OrientationMap<D>,
    ) -> Result<Self, AmrError> {
        if direction.dimension >= D {
            return Err(AmrError::Configuration(format!(
                "direction {direction} out of range for dimension {D}"
            )));
        }
        self.block(neighbor_id)?;
        let back_direction = orientation.map_direction(direction).opposite();
        let forward = BlockNeighbor {
            block_id: neighbor_id,
            orientation,
        };
        let backward = BlockNeighbor {
            block_id,
            orientation: OrientationMap::inverse(orientation),
        };
        self.attach(block_id, direction, forward)?;
        self.attach(neighbor_id, back_direction, backward)?;
        Ok(self)
    }

    fn attach(
        &mut self,
        block_id: usize,
        direction: Direction,
        neighbor: BlockNeighbor<D>,
    ) -> Result<(), AmrError> {
        let block = self
            .blocks
            .get_mut(block_id)
            .ok_or(AmrError::UnknownBlock(block_id))?;
        match block.neighbors.get(&direction) {
            Some(existing) if *existing != neighbor => Err(AmrError::Configuration(format!(
                "face {direction} of block {block_id} is already connected to block {}",
                existing.block_id
            ))),
            _ => {
                block.neighbors.insert(direction, neighbor);
                Ok(())
            }
        }
    }

    /// Check that every connection is seen consistently from both sides.
    pub fn validate(&self) -> Result<(), AmrError> {
        for (block_id, block) in self.blocks() {
            for (direction, neighbor) in block.neighbors() {
                let other = self.block(neighbor.block_id)?;
                let back = neighbor.orientation.map_direction(*direction).opposite();
                let consistent = other.neighbor(back).is_some_and(|seen| {
                    seen.block_id == block_id
                        && seen.orientation == OrientationMap::inverse(neighbor.orientation)
                });
                if !consistent {
                    return Err(AmrError::Configuration(format!(
                        "connection of block {block_id} through {direction} is not symmetric"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Ids of every element at the blocks' initial refinement levels.
    pub fn initial_element_ids(&self) -> Result<Vec<ElementId<D>>, AmrError> {
        let mut ids = Vec::new();
        for (block_id, block) in self.blocks() {
            let per_dimension = block
                .initial_levels
                .map(|level| (0..(1u32 << level)).map(move |index| SegmentId::new(level, index)));
            for segments in per_dimension.into_iter().multi_cartesian_product() {
                let mut all = [SegmentId::ROOT; D];
                for (slot, segment) in all.iter_mut().zip(segments) {
                    *slot = segment?;
                }
                ids.push(ElementId::new(block_id, all)?);
            }
        }
        Ok(ids)
    }
}
