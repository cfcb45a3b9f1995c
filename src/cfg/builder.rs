//! CFG builder: derives the directed block graph of one region.
//!
//! Every block in the region gets exactly one node, entry first, so the
//! entry block is always node 0. An edge is added for every branch inside a
//! block that targets another block of the same region, including branches
//! nested inside a conditional's true/false sub-instructions, inside
//! already-inlined blocks, and inside nested containers (so a loop's exit
//! branches become edges out of the block holding the container).
//! Unreachable blocks receive nodes but no dominance information.

use crate::cfg::{Cfg, EdgeKind};
use crate::ir::{Block, BlockId, Instruction, InstructionKind, MethodBody, RegionId};
use std::collections::HashMap;

/// Builder for per-region control flow graphs.
pub struct CfgBuilder<'a> {
    method: &'a MethodBody,
    region: RegionId,
}

impl<'a> CfgBuilder<'a> {
    pub fn new(method: &'a MethodBody, region: RegionId) -> Self {
        Self { method, region }
    }

    /// Build the region's CFG.
    pub fn build(&self) -> Cfg {
        let mut graph = petgraph::graph::DiGraph::new();
        let mut node_of = HashMap::new();
        for (id, _) in self.method.region_blocks(self.region) {
            let node = graph.add_node(id);
            node_of.insert(id, node);
        }
        let mut targets = Vec::new();
        for (id, block) in self.method.region_blocks(self.region) {
            targets.clear();
            self.collect_block_edges(block, EdgeKind::Uncond, &mut targets);
            let source = node_of[&id];
            for &(target, kind) in &targets {
                if let Some(&sink) = node_of.get(&target) {
                    graph.add_edge(source, sink, kind);
                }
            }
        }
        Cfg { graph, node_of }
    }

    fn collect_block_edges(
        &self,
        block: &Block,
        kind: EdgeKind,
        out: &mut Vec<(BlockId, EdgeKind)>,
    ) {
        for inst in block
            .instructions
            .iter()
            .chain(std::iter::once(&block.final_inst))
        {
            self.collect_inst_edges(inst, kind, out);
        }
    }

    fn collect_inst_edges(
        &self,
        instruction: &Instruction,
        kind: EdgeKind,
        out: &mut Vec<(BlockId, EdgeKind)>,
    ) {
        match &instruction.kind {
            InstructionKind::Branch { target } => out.push((*target, kind)),
            InstructionKind::LogicNot(inner) => self.collect_inst_edges(inner, kind, out),
            InstructionKind::If {
                condition,
                true_inst,
                false_inst,
            } => {
                self.collect_inst_edges(condition, kind, out);
                self.collect_inst_edges(true_inst, EdgeKind::True, out);
                self.collect_inst_edges(false_inst, EdgeKind::False, out);
            }
            InstructionKind::Return { value: Some(value) } => {
                self.collect_inst_edges(value, kind, out)
            }
            InstructionKind::InlineBlock(block) => self.collect_block_edges(block, kind, out),
            // A nested region's loop exits may target blocks of this
            // region; attribute them to the block holding the container.
            InstructionKind::Container(region) => {
                for (_, block) in self.method.region_blocks(*region) {
                    self.collect_block_edges(block, EdgeKind::Uncond, out);
                }
            }
            InstructionKind::Nop
            | InstructionKind::Opaque(_)
            | InstructionKind::Leave { .. }
            | InstructionKind::Return { value: None } => {}
        }
    }
}
