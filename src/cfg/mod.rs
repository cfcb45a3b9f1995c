//! Control Flow Graph (CFG) module
//!
//! This module builds and analyzes per-region control flow graphs over the
//! structuring IR, and hosts the structuring passes that rewrite regions in
//! place: loop extraction and condition detection.

pub mod analysis;
pub mod builder;
pub mod conditions;
pub mod loops;
pub mod visualization;

use crate::ir::{BlockId, MethodBody, RegionId};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Edge kind in the control flow graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Unconditional jump
    Uncond,
    /// Conditional jump (true branch)
    True,
    /// Conditional jump (false branch)
    False,
}

/// Per-region control flow graph: one node per block (entry at node 0),
/// one edge per intra-region branch target.
pub struct Cfg {
    graph: DiGraph<BlockId, EdgeKind>,
    node_of: HashMap<BlockId, NodeIndex>,
}

impl Cfg {
    /// Build the CFG for one region.
    pub fn build(method: &MethodBody, region: RegionId) -> Self {
        builder::CfgBuilder::new(method, region).build()
    }

    /// Get the underlying graph
    pub fn graph(&self) -> &DiGraph<BlockId, EdgeKind> {
        &self.graph
    }

    /// Entry node of the region (the region's first block).
    pub fn entry(&self) -> NodeIndex {
        NodeIndex::new(0)
    }

    /// Node for a block, if the block belongs to this region.
    pub fn node_of(&self, block: BlockId) -> Option<NodeIndex> {
        self.node_of.get(&block).copied()
    }

    /// Block behind a node.
    pub fn block_of(&self, node: NodeIndex) -> BlockId {
        self.graph[node]
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Check if the CFG remains acyclic
    pub fn is_acyclic(&self) -> bool {
        !petgraph::algo::is_cyclic_directed(&self.graph)
    }
}
