//! Region (block container) module.

use crate::ir::instruction::BlockId;
use serde::{Deserialize, Serialize};

/// What a region represents in the structured tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionKind {
    /// A method body (or another non-loop scope handed in by the IR
    /// builder).
    Body,
    /// A natural-loop body produced by loop extraction. A branch to the
    /// entry block of a `Loop` region is the loop's back edge.
    Loop,
}

/// A single-entry ordered set of blocks forming one structured scope.
///
/// The entry is always the first block in `blocks`. Blocks are addressed by
/// their arena ids; pruned blocks are removed from the list and their arena
/// slot is cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub kind: RegionKind,
    /// Ordered block list; index 0 is the region entry.
    pub blocks: Vec<BlockId>,
    /// Number of `Leave` instructions targeting this region. While this is
    /// nonzero, control can fall out of the region's container.
    pub leave_count: u32,
}

impl Region {
    pub fn new(kind: RegionKind) -> Self {
        Self {
            kind,
            blocks: Vec::new(),
            leave_count: 0,
        }
    }

    /// The region's entry block, if the region is non-empty.
    pub fn entry(&self) -> Option<BlockId> {
        self.blocks.first().copied()
    }

    pub fn contains(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }
}
