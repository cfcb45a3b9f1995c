//! DOT export of per-region CFGs, for debugging structuring passes.

use crate::cfg::{Cfg, EdgeKind};
use crate::ir::{MethodBody, RegionId};

/// Export a region's CFG to DOT format.
pub fn to_dot(method: &MethodBody, region: RegionId) -> String {
    let cfg = Cfg::build(method, region);
    let mut dot = String::new();
    dot.push_str("digraph {\n");
    dot.push_str("  rankdir=TB;\n");
    dot.push_str("  node [shape=box, fontname=\"monospace\"];\n\n");

    for node in cfg.graph().node_indices() {
        let id = cfg.block_of(node);
        let label = match method.block_opt(id) {
            Some(block) => format!(
                "Block {} (offset {}, {} insts)",
                id.0,
                block.offset,
                block.instruction_count()
            ),
            None => format!("Block {} (absorbed)", id.0),
        };
        dot.push_str(&format!("  {} [ label = \"{}\" ]\n", node.index(), label));
    }

    dot.push('\n');

    for edge in cfg.graph().edge_indices() {
        let (tail, head) = cfg
            .graph()
            .edge_endpoints(edge)
            .expect("edge endpoints exist");
        let label = match cfg.graph()[edge] {
            EdgeKind::Uncond => "Uncond",
            EdgeKind::True => "True",
            EdgeKind::False => "False",
        };
        dot.push_str(&format!(
            "  {} -> {} [label=\"{}\"]\n",
            tail.index(),
            head.index(),
            label
        ));
    }

    dot.push_str("}\n");
    dot
}
