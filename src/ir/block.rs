//! Basic block module.

use crate::ir::instruction::{Instruction, InstructionKind, RegionId};
use serde::{Deserialize, Serialize};

/// A straight-line instruction sequence belonging to exactly one region.
///
/// Before structuring every block is a flat basic block; afterwards a block
/// may be an extended basic block containing nested conditionals, inlined
/// successors and loop containers.
///
/// Invariant: every non-empty block's last instruction is
/// endpoint-unreachable; control never falls off the end of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Source offset of the block's first instruction, used only for
    /// ordering heuristics.
    pub offset: u32,
    /// Instructions in this block.
    pub instructions: Vec<Instruction>,
    /// Final marker instruction. A `Nop` marks a pure passthrough target
    /// that is safe to absorb into an ancestor once its single incoming
    /// edge has been consumed.
    pub final_inst: Instruction,
    /// Number of branches targeting this block, across all regions.
    pub incoming_edge_count: u32,
    /// The region this block belongs to.
    pub parent: RegionId,
}

impl Block {
    /// Create a new basic block
    pub fn new(offset: u32, parent: RegionId) -> Self {
        Self {
            offset,
            instructions: Vec::new(),
            final_inst: Instruction::nop(offset),
            incoming_edge_count: 0,
            parent,
        }
    }

    /// Get the last instruction in this block
    pub fn last_instruction(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    /// Get the number of instructions in this block
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Whether the final marker is a no-op, i.e. the block was a pure
    /// passthrough target with no other semantic content.
    pub fn has_passthrough_marker(&self) -> bool {
        matches!(self.final_inst.kind, InstructionKind::Nop)
    }
}
