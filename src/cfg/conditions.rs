//! Condition detection: rewrites trailing conditional/branch instructions
//! into nested if/else trees and extended basic blocks.
//!
//! Runs once per region on a fresh CFG and dominator tree, visiting blocks
//! in dominator-tree post-order so every successor is already in its final
//! rewritten form before an ancestor considers embedding it. Loop
//! extraction must already have run on the region; the only cycles left are
//! the back edges of `Loop` regions onto their own entry, which dominance
//! keeps out of every embedding decision.
//!
//! Per block, with `exit` the last instruction and `if_inst` the
//! second-to-last when it is a single-sided conditional:
//!
//! 1. If both the true branch and `exit` are plain branches and the true
//!    branch targets the later block, swap them and negate the condition,
//!    keeping the earlier target on the fallthrough path.
//! 2. Embed the true branch's target block when it is privately reachable
//!    from here alone (same region, dominated, one incoming edge, no-op
//!    marker); drop its trailing instruction when compatible with `exit`.
//! 3. Embed `exit`'s target the same way as the else branch when its
//!    trailing instruction is compatible with the true side's; the shared
//!    trailing instruction becomes the block exit.
//! 4. Swap the branches (negating, collapsing double negation) when the
//!    false side precedes the true side in source order, or the true side
//!    is empty and the false side is not.
//! 5. Splice a singly-referenced, dominated branch target onto the end of
//!    the block, forming an extended basic block.

use crate::cancel::CancellationToken;
use crate::cfg::analysis::DominatorTree;
use crate::cfg::Cfg;
use crate::error::Result;
use crate::ir::{
    compatible_exit_instruction, Block, BlockId, Instruction, InstructionKind, MethodBody,
    RegionId,
};
use log::{debug, trace};
use petgraph::graph::NodeIndex;
use std::collections::HashSet;

/// Run condition detection on one region.
pub fn detect_conditions(
    method: &mut MethodBody,
    region: RegionId,
    token: &CancellationToken,
) -> Result<()> {
    token.check()?;
    if method.region(region).entry().is_none() {
        return Ok(());
    }
    let cfg = Cfg::build(method, region);
    let dom = DominatorTree::compute(cfg.graph(), cfg.entry(), token)?;
    let order = dom.tree_post_order();
    // The rewrites below only absorb blocks, never connect new ones, so the
    // reachable set from before them still holds when pruning afterwards.
    let reachable: HashSet<BlockId> = cfg
        .graph()
        .node_indices()
        .filter(|&node| dom.is_reachable(node))
        .map(|node| cfg.block_of(node))
        .collect();
    {
        let mut detector = ConditionDetector {
            method: &mut *method,
            region,
            cfg: &cfg,
            dom: &dom,
        };
        for node in order {
            token.check()?;
            detector.process_block(node);
        }
    }
    prune_region(method, region, &reachable);
    Ok(())
}

struct ConditionDetector<'a> {
    method: &'a mut MethodBody,
    region: RegionId,
    cfg: &'a Cfg,
    dom: &'a DominatorTree,
}

impl<'a> ConditionDetector<'a> {
    fn process_block(&mut self, node: NodeIndex) {
        let block_id = self.cfg.block_of(node);
        // Already absorbed blocks (rule 5 targets of an earlier sibling)
        // have nothing left to rewrite.
        let Some(mut block) = self.method.detach(block_id) else {
            return;
        };
        assert!(
            !block.instructions.is_empty(),
            "block {:?} handed to condition detection without instructions",
            block_id
        );
        assert!(
            self.method.block_endpoint_unreachable(&block),
            "control falls off the end of block {:?}",
            block_id
        );
        let count = block.instructions.len();
        if count >= 2 && block.instructions[count - 2].is_single_sided_if() {
            self.restructure_if(&mut block, block_id, node);
        }
        self.try_tail_inline(&mut block, block_id, node);
        self.method.reattach(block_id, block);
    }

    fn restructure_if(&mut self, block: &mut Block, block_id: BlockId, node: NodeIndex) {
        let mut exit = block.instructions.pop().expect("exit instruction");
        let mut if_inst = block.instructions.pop().expect("conditional instruction");
        let InstructionKind::If {
            condition,
            true_inst,
            false_inst,
        } = &mut if_inst.kind
        else {
            unreachable!("restructure_if requires a single-sided conditional");
        };

        // Rule 1: keep the earlier-appearing target on the fallthrough
        // path, matching original source order.
        if let (
            InstructionKind::Branch { target: true_target },
            InstructionKind::Branch { target: exit_target },
        ) = (&true_inst.kind, &exit.kind)
        {
            let true_offset = self.method.block_opt(*true_target).map(|b| b.offset);
            let exit_offset = self.method.block_opt(*exit_target).map(|b| b.offset);
            if let (Some(true_offset), Some(exit_offset)) = (true_offset, exit_offset) {
                if true_offset > exit_offset {
                    std::mem::swap(true_inst.as_mut(), &mut exit);
                    condition.negate();
                }
            }
        }

        // Rule 2: embed the true branch.
        if let InstructionKind::Branch { target } = true_inst.kind {
            if self.can_embed(target, node) {
                let mut embedded = self.method.extract_block(target);
                trace!("embedding {:?} as the true branch of {:?}", target, block_id);
                if compatible_exit_instruction(embedded.instructions.last(), Some(&exit)) {
                    let duplicate = embedded
                        .instructions
                        .pop()
                        .expect("compatible trailing instruction");
                    self.method.release_exit(&duplicate);
                }
                **true_inst =
                    Instruction::new(embedded.offset, InstructionKind::InlineBlock(Box::new(embedded)));
            }
        }

        // Rule 3: embed the else branch and hoist the shared trailing
        // instruction to the block exit.
        if let InstructionKind::Branch { target } = exit.kind {
            if self.can_embed(target, node) {
                let true_tail = match &true_inst.kind {
                    InstructionKind::InlineBlock(embedded) => embedded.instructions.last(),
                    _ => Some(true_inst.as_ref()),
                };
                let else_tail = self.method.block(target).instructions.last();
                if compatible_exit_instruction(else_tail, true_tail) {
                    let mut else_block = self.method.extract_block(target);
                    trace!("embedding {:?} as the else branch of {:?}", target, block_id);
                    let shared = else_block
                        .instructions
                        .pop()
                        .expect("compatible trailing instruction");
                    match &mut true_inst.kind {
                        InstructionKind::InlineBlock(embedded) => {
                            let duplicate = embedded
                                .instructions
                                .pop()
                                .expect("compatible trailing instruction");
                            self.method.release_exit(&duplicate);
                        }
                        _ => {
                            let offset = true_inst.offset;
                            let duplicate = std::mem::replace(
                                true_inst.as_mut(),
                                Instruction::nop(offset),
                            );
                            self.method.release_exit(&duplicate);
                        }
                    }
                    **false_inst = Instruction::new(
                        else_block.offset,
                        InstructionKind::InlineBlock(Box::new(else_block)),
                    );
                    exit = shared;
                }
            }
        }

        // Rule 4: canonical branch ordering.
        let true_empty = true_inst.is_empty();
        let false_empty = false_inst.is_empty();
        if (!false_empty && false_inst.offset < true_inst.offset)
            || (true_empty && !false_empty)
        {
            std::mem::swap(true_inst.as_mut(), false_inst.as_mut());
            condition.negate();
        }

        block.instructions.push(if_inst);
        block.instructions.push(exit);
    }

    /// Rule 5: tail inlining. The block's final branch is replaced by the
    /// target's instruction sequence, which is already fully rewritten
    /// because children are processed first.
    fn try_tail_inline(&mut self, block: &mut Block, block_id: BlockId, node: NodeIndex) {
        let Some(last) = block.instructions.last() else {
            return;
        };
        if let InstructionKind::Branch { target } = last.kind {
            if self.can_embed(target, node) {
                let inlined = self.method.extract_block(target);
                debug!("splicing {:?} onto the end of {:?}", target, block_id);
                block.instructions.pop();
                block.instructions.extend(inlined.instructions);
            }
        }
    }

    /// A block may be embedded when it belongs to this region, is dominated
    /// by the embedding node, has exactly one incoming edge (the one being
    /// consumed) and carries the no-op passthrough marker.
    fn can_embed(&self, target: BlockId, node: NodeIndex) -> bool {
        let Some(block) = self.method.block_opt(target) else {
            return false;
        };
        if block.parent != self.region
            || block.incoming_edge_count != 1
            || !block.has_passthrough_marker()
        {
            return false;
        }
        match self.cfg.node_of(target) {
            Some(target_node) => self.dom.dominates(node, target_node),
            None => false,
        }
    }
}

/// Discard every block with no counterpart in the surviving tree: absorbed
/// into an ancestor (no instructions left), dangling (no incoming edges and
/// not the region entry), or unreachable from the entry. Unreachable blocks
/// need the explicit reachability check because a dead cycle keeps its
/// members' mutual edge counts nonzero. Releasing a discarded block's own
/// branches can zero further counts, so the sweep cascades to a fixpoint.
pub(crate) fn prune_region(
    method: &mut MethodBody,
    region: RegionId,
    reachable: &HashSet<BlockId>,
) {
    let Some(entry) = method.region(region).entry() else {
        return;
    };
    loop {
        let doomed: Vec<BlockId> = method
            .region_blocks(region)
            .filter(|&(id, block)| {
                id != entry
                    && (block.instructions.is_empty()
                        || block.incoming_edge_count == 0
                        || !reachable.contains(&id))
            })
            .map(|(id, _)| id)
            .collect();
        if doomed.is_empty() {
            break;
        }
        for id in doomed {
            trace!("pruning absorbed block {:?} from region {:?}", id, region);
            method.discard_block(id);
        }
    }
}
