//! Natural-loop extraction.
//!
//! Back edges are CFG edges whose target dominates their source. Each
//! natural loop is rewritten into a nested `Loop` region linked into the
//! parent at the loop header's position through a holder block carrying a
//! `Container` instruction. Once every loop in a region has been extracted,
//! the region's remaining CFG is acyclic with respect to forward branches,
//! which is the precondition condition detection relies on.

use crate::cancel::CancellationToken;
use crate::cfg::analysis::DominatorTree;
use crate::cfg::{Cfg, EdgeKind};
use crate::error::Result;
use crate::ir::{BlockId, Instruction, InstructionKind, MethodBody, RegionId, RegionKind};
use log::debug;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Extract every natural loop of a region into a nested `Loop` region.
/// Returns the regions created, outermost first. Loops nested inside the
/// new regions are left for the recursive per-region pass.
pub fn extract_loops(
    method: &mut MethodBody,
    region: RegionId,
    token: &CancellationToken,
) -> Result<Vec<RegionId>> {
    let mut created = Vec::new();
    loop {
        token.check()?;
        if method.region(region).entry().is_none() {
            break;
        }
        let cfg = Cfg::build(method, region);
        let dom = DominatorTree::compute(cfg.graph(), cfg.entry(), token)?;
        let Some((header, tails)) = find_outermost_loop(method, region, &cfg, &dom) else {
            break;
        };
        let body = natural_loop(cfg.graph(), &dom, header, &tails);
        let new_region = rewrite_loop(method, region, &cfg, header, &body);
        debug!(
            "extracted loop header {:?} ({} blocks) from region {:?} into {:?}",
            cfg.block_of(header),
            body.len(),
            region,
            new_region
        );
        created.push(new_region);
    }
    Ok(created)
}

/// Back edges grouped by header; the header nearest the entry in the
/// dominator tree is extracted first, so outer loops come before the loops
/// nested inside them. Inside a `Loop` region a branch to the region entry
/// is that loop's own back edge, not a loop still to extract.
fn find_outermost_loop(
    method: &MethodBody,
    region: RegionId,
    cfg: &Cfg,
    dom: &DominatorTree,
) -> Option<(NodeIndex, Vec<NodeIndex>)> {
    let own_back_edge_target = match method.region(region).kind {
        RegionKind::Loop => Some(cfg.entry()),
        RegionKind::Body => None,
    };
    let mut back_edges: BTreeMap<NodeIndex, Vec<NodeIndex>> = BTreeMap::new();
    for edge in cfg.graph().edge_references() {
        let (source, target) = (edge.source(), edge.target());
        if !dom.is_reachable(source) || Some(target) == own_back_edge_target {
            continue;
        }
        if dom.dominates(target, source) {
            back_edges.entry(target).or_default().push(source);
        }
    }
    back_edges
        .into_iter()
        .min_by_key(|(header, _)| dominator_depth(dom, *header))
}

fn dominator_depth(dom: &DominatorTree, mut node: NodeIndex) -> usize {
    let mut depth = 0;
    while let Some(parent) = dom.immediate_dominator(node) {
        depth += 1;
        node = parent;
    }
    depth
}

/// Classic natural-loop body: the header plus every node that reaches a
/// back-edge tail without passing through the header.
fn natural_loop(
    graph: &DiGraph<BlockId, EdgeKind>,
    dom: &DominatorTree,
    header: NodeIndex,
    tails: &[NodeIndex],
) -> HashSet<NodeIndex> {
    let mut body = HashSet::new();
    body.insert(header);
    let mut stack: Vec<NodeIndex> = Vec::new();
    for &tail in tails {
        if body.insert(tail) {
            stack.push(tail);
        }
    }
    while let Some(node) = stack.pop() {
        for pred in graph.neighbors_directed(node, Direction::Incoming) {
            if dom.is_reachable(pred) && body.insert(pred) {
                stack.push(pred);
            }
        }
    }
    body
}

/// Move the loop body into a fresh `Loop` region and splice a holder block
/// carrying the container into the parent at the header's position.
fn rewrite_loop(
    method: &mut MethodBody,
    region: RegionId,
    cfg: &Cfg,
    header_node: NodeIndex,
    body: &HashSet<NodeIndex>,
) -> RegionId {
    let header = cfg.block_of(header_node);
    let header_offset = method.block(header).offset;

    // Body blocks in region order, header forced to the front so it stays
    // the entry of the new region.
    let mut body_blocks = vec![header];
    let mut body_set: BTreeSet<BlockId> = BTreeSet::new();
    body_set.insert(header);
    for (id, _) in method.region_blocks(region) {
        if id != header && body.contains(&cfg.node_of(id).expect("body block is in region")) {
            body_blocks.push(id);
            body_set.insert(id);
        }
    }

    // Exit targets: branches out of the body into blocks of the parent
    // region. A single exit target is rewritten into Leave instructions;
    // multiple exits keep their branches, which become cross-region jumps
    // that later passes leave untouched.
    let mut exit_targets: BTreeSet<BlockId> = BTreeSet::new();
    for &id in &body_blocks {
        for target in method.block_branch_targets(id) {
            if !body_set.contains(&target) {
                if let Some(block) = method.block_opt(target) {
                    if block.parent == region {
                        exit_targets.insert(target);
                    }
                }
            }
        }
    }

    let parent_order = &method.region(region).blocks;
    let header_position = parent_order
        .iter()
        .position(|&b| b == header)
        .expect("loop header is in parent region");
    let holder_position = parent_order[..header_position]
        .iter()
        .filter(|b| !body_set.contains(b))
        .count();

    let new_region = method.add_region(RegionKind::Loop);
    for &id in &body_blocks {
        method.block_mut(id).parent = new_region;
    }
    method
        .region_mut(region)
        .blocks
        .retain(|b| !body_set.contains(b));
    method.region_mut(new_region).blocks = body_blocks.clone();

    let holder = method.insert_block_at(region, holder_position, header_offset);
    method.push(
        holder,
        Instruction::new(header_offset, InstructionKind::Container(new_region)),
    );

    // Entry edges from outside the body now enter through the holder.
    for id in method.block_ids() {
        if id != holder && !body_set.contains(&id) {
            method.retarget_branches(id, header, holder);
        }
    }

    if exit_targets.len() == 1 {
        let exit = *exit_targets
            .iter()
            .next()
            .expect("single exit target present");
        for &id in &body_blocks {
            method.branches_to_leaves(id, exit, new_region);
        }
        method.push(holder, Instruction::branch(header_offset, exit));
        method.block_mut(exit).incoming_edge_count += 1;
    }

    new_region
}
