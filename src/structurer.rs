//! Pipeline driver: orchestrates loop extraction and condition detection
//! over a method's region tree.
//!
//! Per-method structuring is strictly sequential; independent methods may
//! be structured in parallel, each exclusively owning its IR tree. The
//! cancellation token is checked at every region boundary, so an abort
//! between regions never corrupts another in-flight method.

use crate::cancel::CancellationToken;
use crate::cfg::conditions::detect_conditions;
use crate::cfg::loops::extract_loops;
use crate::error::Result;
use crate::ir::{InstructionKind, MethodBody, RegionId};
use log::debug;
use rayon::prelude::*;

/// Control-flow structuring engine.
pub struct Structurer {}

impl Structurer {
    pub fn new() -> Self {
        Structurer {}
    }

    /// Restructure one method in place: loops become nested regions,
    /// single-sided conditionals become if/else trees, absorbed blocks are
    /// pruned. Returns `Error::Cancelled` if the token fires mid-analysis.
    pub fn structure_method(
        &self,
        method: &mut MethodBody,
        token: &CancellationToken,
    ) -> Result<()> {
        let root = method.root_region();
        method.recompute_incoming_edges();
        self.structure_region(method, root, token)
    }

    /// Restructure every method, in parallel across the rayon pool. Each
    /// method owns its IR exclusively; the token is the only shared state.
    pub fn structure_all(
        &self,
        methods: &mut [MethodBody],
        token: &CancellationToken,
    ) -> Result<()> {
        methods
            .par_iter_mut()
            .try_for_each(|method| self.structure_method(method, token))
    }

    /// Loop extraction must precede condition detection in every region,
    /// including the nested loop-body regions it creates.
    fn structure_region(
        &self,
        method: &mut MethodBody,
        region: RegionId,
        token: &CancellationToken,
    ) -> Result<()> {
        token.check()?;
        debug!(
            "structuring region {:?} ({} blocks)",
            region,
            method.region(region).blocks.len()
        );
        extract_loops(method, region, token)?;
        for nested in nested_containers(method, region) {
            self.structure_region(method, nested, token)?;
        }
        detect_conditions(method, region, token)
    }
}

impl Default for Structurer {
    fn default() -> Self {
        Self::new()
    }
}

/// Regions held by `Container` instructions directly inside a region's
/// blocks. Blocks entering a region are still flat at this point, so no
/// containers hide inside nested instruction trees.
fn nested_containers(method: &MethodBody, region: RegionId) -> Vec<RegionId> {
    let mut nested = Vec::new();
    for (_, block) in method.region_blocks(region) {
        for inst in &block.instructions {
            if let InstructionKind::Container(id) = inst.kind {
                nested.push(id);
            }
        }
    }
    nested
}
