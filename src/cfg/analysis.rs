//! Dominance analysis over a region CFG.
//!
//! Iterative fixpoint computation of immediate dominators (the
//! Cooper-Harlan-Kennedy formulation over reverse post-order). The
//! cancellation token is polled once per fixpoint iteration; an abort
//! surfaces as [`Error::Cancelled`](crate::error::Error::Cancelled) before
//! any result is published, so a retry can restart from scratch.

use crate::cancel::CancellationToken;
use crate::cfg::EdgeKind;
use crate::error::Result;
use crate::ir::BlockId;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::DfsPostOrder;
use petgraph::Direction;

/// Immediate-dominator tree of a region CFG rooted at the entry node.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    root: NodeIndex,
    /// Immediate dominator per node; `None` for the root and for nodes
    /// unreachable from it.
    idom: Vec<Option<NodeIndex>>,
    /// Dominator-tree children per node, ordered by node index.
    children: Vec<Vec<NodeIndex>>,
    reachable: Vec<bool>,
}

impl DominatorTree {
    /// Compute the dominator tree for the graph rooted at `root`.
    pub fn compute(
        graph: &DiGraph<BlockId, EdgeKind>,
        root: NodeIndex,
        token: &CancellationToken,
    ) -> Result<Self> {
        let node_count = graph.node_count();
        let mut post_order = Vec::with_capacity(node_count);
        let mut dfs = DfsPostOrder::new(graph, root);
        while let Some(node) = dfs.next(graph) {
            post_order.push(node);
        }
        let mut order_of = vec![usize::MAX; node_count];
        for (position, &node) in post_order.iter().enumerate() {
            order_of[node.index()] = position;
        }
        let reverse_post_order: Vec<NodeIndex> = post_order.iter().rev().copied().collect();

        // The root is its own dominator while iterating; the self-edge is
        // dropped once the fixpoint settles.
        let mut idom: Vec<Option<NodeIndex>> = vec![None; node_count];
        idom[root.index()] = Some(root);
        let mut changed = true;
        while changed {
            token.check()?;
            changed = false;
            for &node in reverse_post_order.iter().skip(1) {
                let mut new_idom: Option<NodeIndex> = None;
                for pred in graph.neighbors_directed(node, Direction::Incoming) {
                    if order_of[pred.index()] == usize::MAX || idom[pred.index()].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => intersect(&idom, &order_of, pred, current),
                    });
                }
                if let Some(dominator) = new_idom {
                    if idom[node.index()] != Some(dominator) {
                        idom[node.index()] = Some(dominator);
                        changed = true;
                    }
                }
            }
        }
        idom[root.index()] = None;

        let mut children: Vec<Vec<NodeIndex>> = vec![Vec::new(); node_count];
        for &node in &reverse_post_order {
            if let Some(dominator) = idom[node.index()] {
                children[dominator.index()].push(node);
            }
        }
        for list in &mut children {
            list.sort_unstable();
        }
        let mut reachable = vec![false; node_count];
        for &node in &post_order {
            reachable[node.index()] = true;
        }
        Ok(Self {
            root,
            idom,
            children,
            reachable,
        })
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// Immediate dominator of a node; `None` for the root and for
    /// unreachable nodes.
    pub fn immediate_dominator(&self, node: NodeIndex) -> Option<NodeIndex> {
        self.idom[node.index()]
    }

    /// Dominator-tree children of a node.
    pub fn children(&self, node: NodeIndex) -> &[NodeIndex] {
        &self.children[node.index()]
    }

    pub fn is_reachable(&self, node: NodeIndex) -> bool {
        self.reachable[node.index()]
    }

    /// True iff every path from the root to `node` passes through
    /// `dominator`. Reflexive on reachable nodes.
    pub fn dominates(&self, dominator: NodeIndex, node: NodeIndex) -> bool {
        if !self.is_reachable(node) {
            return false;
        }
        if dominator == node {
            return true;
        }
        let mut current = node;
        while let Some(parent) = self.idom[current.index()] {
            if parent == dominator {
                return true;
            }
            current = parent;
        }
        false
    }

    /// Dominator-tree post-order: children fully listed before their
    /// parent, root last. Only reachable nodes appear.
    pub fn tree_post_order(&self) -> Vec<NodeIndex> {
        let mut order = Vec::new();
        // child (node, next-child cursor) pairs
        let mut stack = vec![(self.root, 0usize)];
        while let Some(&mut (node, ref mut cursor)) = stack.last_mut() {
            if *cursor < self.children[node.index()].len() {
                let child = self.children[node.index()][*cursor];
                *cursor += 1;
                stack.push((child, 0));
            } else {
                order.push(node);
                stack.pop();
            }
        }
        order
    }
}

fn intersect(
    idom: &[Option<NodeIndex>],
    order_of: &[usize],
    a: NodeIndex,
    b: NodeIndex,
) -> NodeIndex {
    let mut finger_a = a;
    let mut finger_b = b;
    while finger_a != finger_b {
        while order_of[finger_a.index()] < order_of[finger_b.index()] {
            finger_a = idom[finger_a.index()]
                .expect("reverse post-order predecessor has an immediate dominator");
        }
        while order_of[finger_b.index()] < order_of[finger_a.index()] {
            finger_b = idom[finger_b.index()]
                .expect("reverse post-order predecessor has an immediate dominator");
        }
    }
    finger_a
}
