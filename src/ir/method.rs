//! Per-method IR arena.
//!
//! All blocks and regions of one method live in a [`MethodBody`], addressed
//! by stable indices. Embedding a block into a conditional moves the `Block`
//! value out of its arena slot into the instruction tree, so an absorbed
//! block can never be reached twice through stale references. Nothing in a
//! `MethodBody` is shared between concurrently decompiled methods.

use crate::ir::block::Block;
use crate::ir::instruction::{BlockId, Instruction, InstructionKind, RegionId};
use crate::ir::region::{Region, RegionKind};
use serde::{Deserialize, Serialize};

/// Arena holding the blocks and regions of a single method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodBody {
    blocks: Vec<Option<Block>>,
    regions: Vec<Region>,
}

impl MethodBody {
    /// Create a method body with an empty root region.
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            regions: vec![Region::new(RegionKind::Body)],
        }
    }

    /// The method body's root region.
    pub fn root_region(&self) -> RegionId {
        RegionId(0)
    }

    /// Create a new empty region.
    pub fn add_region(&mut self, kind: RegionKind) -> RegionId {
        let id = RegionId(self.regions.len() as u32);
        self.regions.push(Region::new(kind));
        id
    }

    /// Append a new empty block to a region and return its id.
    pub fn add_block(&mut self, region: RegionId, offset: u32) -> BlockId {
        let id = self.alloc_block(region, offset);
        self.regions[region.index()].blocks.push(id);
        id
    }

    /// Insert a new empty block at a given position in a region's order.
    pub fn insert_block_at(&mut self, region: RegionId, position: usize, offset: u32) -> BlockId {
        let id = self.alloc_block(region, offset);
        self.regions[region.index()].blocks.insert(position, id);
        id
    }

    fn alloc_block(&mut self, region: RegionId, offset: u32) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Some(Block::new(offset, region)));
        id
    }

    /// Append an instruction to a block.
    pub fn push(&mut self, block: BlockId, instruction: Instruction) {
        self.block_mut(block).instructions.push(instruction);
    }

    pub fn region(&self, id: RegionId) -> &Region {
        &self.regions[id.index()]
    }

    pub fn region_mut(&mut self, id: RegionId) -> &mut Region {
        &mut self.regions[id.index()]
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Borrow a block. Panics if the block was absorbed; use
    /// [`MethodBody::block_opt`] when absence is expected.
    pub fn block(&self, id: BlockId) -> &Block {
        self.blocks[id.index()]
            .as_ref()
            .unwrap_or_else(|| panic!("block {:?} was absorbed or pruned", id))
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        self.blocks[id.index()]
            .as_mut()
            .unwrap_or_else(|| panic!("block {:?} was absorbed or pruned", id))
    }

    pub fn block_opt(&self, id: BlockId) -> Option<&Block> {
        self.blocks[id.index()].as_ref()
    }

    /// Live blocks of a region, in region order.
    pub fn region_blocks<'a>(
        &'a self,
        region: RegionId,
    ) -> impl Iterator<Item = (BlockId, &'a Block)> + 'a {
        self.regions[region.index()]
            .blocks
            .iter()
            .filter_map(move |&id| self.block_opt(id).map(|b| (id, b)))
    }

    /// Take a block out of its arena slot for exclusive rewriting. The
    /// region order keeps its entry; the caller must reattach.
    pub(crate) fn detach(&mut self, id: BlockId) -> Option<Block> {
        self.blocks[id.index()].take()
    }

    pub(crate) fn reattach(&mut self, id: BlockId, block: Block) {
        debug_assert!(self.blocks[id.index()].is_none());
        self.blocks[id.index()] = Some(block);
    }

    /// Move a block out of the arena and out of its region order, for
    /// embedding into an instruction tree. The block's single remaining
    /// incoming edge is consumed by the caller.
    pub(crate) fn extract_block(&mut self, id: BlockId) -> Block {
        let mut block = self.blocks[id.index()]
            .take()
            .unwrap_or_else(|| panic!("block {:?} extracted twice", id));
        let region = &mut self.regions[block.parent.index()];
        region.blocks.retain(|&b| b != id);
        block.incoming_edge_count = 0;
        block
    }

    /// Drop a pruned block, releasing every branch and leave it still held.
    pub(crate) fn discard_block(&mut self, id: BlockId) {
        if let Some(block) = self.blocks[id.index()].take() {
            self.regions[block.parent.index()].blocks.retain(|&b| b != id);
            for inst in block
                .instructions
                .iter()
                .chain(std::iter::once(&block.final_inst))
            {
                self.release_tree(inst);
            }
        }
    }

    /// Decrement the edge count consumed by a dropped exit instruction.
    pub(crate) fn release_exit(&mut self, instruction: &Instruction) {
        match &instruction.kind {
            InstructionKind::Branch { target } => {
                if let Some(block) = self.blocks[target.index()].as_mut() {
                    block.incoming_edge_count = block.incoming_edge_count.saturating_sub(1);
                }
            }
            InstructionKind::Leave { target } => {
                let region = &mut self.regions[target.index()];
                region.leave_count = region.leave_count.saturating_sub(1);
            }
            _ => {}
        }
    }

    /// Release every branch and leave inside an instruction tree.
    pub(crate) fn release_tree(&mut self, instruction: &Instruction) {
        let mut branches = Vec::new();
        let mut leaves = Vec::new();
        collect_edges(instruction, &mut branches, &mut leaves);
        for target in branches {
            if let Some(block) = self.blocks[target.index()].as_mut() {
                block.incoming_edge_count = block.incoming_edge_count.saturating_sub(1);
            }
        }
        for target in leaves {
            let region = &mut self.regions[target.index()];
            region.leave_count = region.leave_count.saturating_sub(1);
        }
    }

    /// Recount incoming edges and region leave counts from scratch by
    /// walking every live instruction tree.
    pub fn recompute_incoming_edges(&mut self) {
        let mut incoming = vec![0u32; self.blocks.len()];
        let mut leaves = vec![0u32; self.regions.len()];
        let mut branch_targets = Vec::new();
        let mut leave_targets = Vec::new();
        for slot in self.blocks.iter().flatten() {
            for inst in slot
                .instructions
                .iter()
                .chain(std::iter::once(&slot.final_inst))
            {
                collect_edges(inst, &mut branch_targets, &mut leave_targets);
            }
        }
        for target in branch_targets {
            incoming[target.index()] += 1;
        }
        for target in leave_targets {
            leaves[target.index()] += 1;
        }
        for (slot, count) in self.blocks.iter_mut().zip(incoming) {
            if let Some(block) = slot {
                block.incoming_edge_count = count;
            }
        }
        for (region, count) in self.regions.iter_mut().zip(leaves) {
            region.leave_count = count;
        }
    }

    /// Ids of all live blocks in the arena.
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.blocks
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|_| BlockId(index as u32)))
            .collect()
    }

    /// Every branch target reachable from a block's instruction trees,
    /// inlined blocks included, nested containers excluded.
    pub(crate) fn block_branch_targets(&self, id: BlockId) -> Vec<BlockId> {
        let mut branches = Vec::new();
        let mut leaves = Vec::new();
        if let Some(block) = self.block_opt(id) {
            for inst in block
                .instructions
                .iter()
                .chain(std::iter::once(&block.final_inst))
            {
                collect_edges(inst, &mut branches, &mut leaves);
            }
        }
        branches
    }

    /// Whether control can never fall through past this instruction.
    pub fn endpoint_unreachable(&self, instruction: &Instruction) -> bool {
        match &instruction.kind {
            InstructionKind::Branch { .. }
            | InstructionKind::Leave { .. }
            | InstructionKind::Return { .. } => true,
            InstructionKind::If {
                true_inst,
                false_inst,
                ..
            } => self.endpoint_unreachable(true_inst) && self.endpoint_unreachable(false_inst),
            InstructionKind::InlineBlock(block) => block
                .instructions
                .last()
                .is_some_and(|last| self.endpoint_unreachable(last)),
            // Control falls out of a container only through a Leave.
            InstructionKind::Container(region) => self.regions[region.index()].leave_count == 0,
            InstructionKind::Nop
            | InstructionKind::Opaque(_)
            | InstructionKind::LogicNot(_) => false,
        }
    }

    /// Whether control can never fall off the end of this block.
    pub fn block_endpoint_unreachable(&self, block: &Block) -> bool {
        block
            .instructions
            .last()
            .is_some_and(|last| self.endpoint_unreachable(last))
    }

    /// Rewrite every `Branch { from }` inside a block to `Branch { to }`,
    /// keeping edge counts consistent. Returns the number of rewrites.
    pub(crate) fn retarget_branches(&mut self, block: BlockId, from: BlockId, to: BlockId) -> u32 {
        let Some(mut detached) = self.detach(block) else {
            return 0;
        };
        let mut rewritten = 0;
        for inst in detached
            .instructions
            .iter_mut()
            .chain(std::iter::once(&mut detached.final_inst))
        {
            rewrite_branches(inst, from, to, &mut rewritten);
        }
        self.reattach(block, detached);
        if rewritten > 0 {
            if let Some(old) = self.blocks[from.index()].as_mut() {
                old.incoming_edge_count = old.incoming_edge_count.saturating_sub(rewritten);
            }
            self.block_mut(to).incoming_edge_count += rewritten;
        }
        rewritten
    }

    /// Rewrite every `Branch { target }` inside a block to a `Leave` of the
    /// given region, keeping edge and leave counts consistent. Returns the
    /// number of rewrites.
    pub(crate) fn branches_to_leaves(
        &mut self,
        block: BlockId,
        target: BlockId,
        region: RegionId,
    ) -> u32 {
        let Some(mut detached) = self.detach(block) else {
            return 0;
        };
        let mut rewritten = 0;
        for inst in detached
            .instructions
            .iter_mut()
            .chain(std::iter::once(&mut detached.final_inst))
        {
            rewrite_to_leave(inst, target, region, &mut rewritten);
        }
        self.reattach(block, detached);
        if rewritten > 0 {
            if let Some(old) = self.blocks[target.index()].as_mut() {
                old.incoming_edge_count = old.incoming_edge_count.saturating_sub(rewritten);
            }
            self.regions[region.index()].leave_count += rewritten;
        }
        rewritten
    }
}

impl Default for MethodBody {
    fn default() -> Self {
        Self::new()
    }
}

/// Collect every branch and leave target inside an instruction tree,
/// descending into conditionals, negations, inlined blocks and return
/// values. Containers contribute nothing themselves; their blocks live in
/// the arena and are walked in their own right.
fn collect_edges(
    instruction: &Instruction,
    branches: &mut Vec<BlockId>,
    leaves: &mut Vec<RegionId>,
) {
    match &instruction.kind {
        InstructionKind::Branch { target } => branches.push(*target),
        InstructionKind::Leave { target } => leaves.push(*target),
        InstructionKind::LogicNot(inner) => collect_edges(inner, branches, leaves),
        InstructionKind::If {
            condition,
            true_inst,
            false_inst,
        } => {
            collect_edges(condition, branches, leaves);
            collect_edges(true_inst, branches, leaves);
            collect_edges(false_inst, branches, leaves);
        }
        InstructionKind::Return { value: Some(value) } => collect_edges(value, branches, leaves),
        InstructionKind::InlineBlock(block) => {
            for inst in block
                .instructions
                .iter()
                .chain(std::iter::once(&block.final_inst))
            {
                collect_edges(inst, branches, leaves);
            }
        }
        InstructionKind::Nop
        | InstructionKind::Opaque(_)
        | InstructionKind::Return { value: None }
        | InstructionKind::Container(_) => {}
    }
}

fn rewrite_branches(instruction: &mut Instruction, from: BlockId, to: BlockId, rewritten: &mut u32) {
    match &mut instruction.kind {
        InstructionKind::Branch { target } if *target == from => {
            *target = to;
            *rewritten += 1;
        }
        InstructionKind::LogicNot(inner) => rewrite_branches(inner, from, to, rewritten),
        InstructionKind::If {
            condition,
            true_inst,
            false_inst,
        } => {
            rewrite_branches(condition, from, to, rewritten);
            rewrite_branches(true_inst, from, to, rewritten);
            rewrite_branches(false_inst, from, to, rewritten);
        }
        InstructionKind::Return { value: Some(value) } => {
            rewrite_branches(value, from, to, rewritten)
        }
        InstructionKind::InlineBlock(block) => {
            for inst in block
                .instructions
                .iter_mut()
                .chain(std::iter::once(&mut block.final_inst))
            {
                rewrite_branches(inst, from, to, rewritten);
            }
        }
        _ => {}
    }
}

fn rewrite_to_leave(
    instruction: &mut Instruction,
    target: BlockId,
    region: RegionId,
    rewritten: &mut u32,
) {
    match &mut instruction.kind {
        InstructionKind::Branch { target: t } if *t == target => {
            instruction.kind = InstructionKind::Leave { target: region };
            *rewritten += 1;
        }
        InstructionKind::LogicNot(inner) => rewrite_to_leave(inner, target, region, rewritten),
        InstructionKind::If {
            condition,
            true_inst,
            false_inst,
        } => {
            rewrite_to_leave(condition, target, region, rewritten);
            rewrite_to_leave(true_inst, target, region, rewritten);
            rewrite_to_leave(false_inst, target, region, rewritten);
        }
        InstructionKind::Return { value: Some(value) } => {
            rewrite_to_leave(value, target, region, rewritten)
        }
        InstructionKind::InlineBlock(block) => {
            for inst in block
                .instructions
                .iter_mut()
                .chain(std::iter::once(&mut block.final_inst))
            {
                rewrite_to_leave(inst, target, region, rewritten);
            }
        }
        _ => {}
    }
}
