use cil_dec_rs::cfg::conditions::detect_conditions;
use cil_dec_rs::ir::{
    compatible_exit_instruction, BlockId, Instruction, InstructionKind, MethodBody, RegionId,
};
use cil_dec_rs::{CancellationToken, Error};

fn detect(method: &mut MethodBody) {
    let root = method.root_region();
    method.recompute_incoming_edges();
    detect_conditions(method, root, &CancellationToken::new()).expect("detection completes");
}

/// Every surviving block ends in an endpoint-unreachable instruction and is
/// either the region entry or still targeted by a jump.
fn assert_block_invariants(method: &MethodBody) {
    for index in 0..method.region_count() {
        let region = RegionId(index as u32);
        let entry = method.region(region).entry();
        for (id, block) in method.region_blocks(region) {
            assert!(
                method.block_endpoint_unreachable(block),
                "control falls off the end of {:?}",
                id
            );
            assert!(
                Some(id) == entry || block.incoming_edge_count > 0,
                "{:?} survived without incoming edges",
                id
            );
        }
    }
}

/// Scenario A: both arms of the diamond collapse into one conditional and
/// the shared trailing return is hoisted to the block exit.
#[test]
fn two_sided_return_diamond_collapses() {
    let mut method = MethodBody::new();
    let root = method.root_region();
    let b0 = method.add_block(root, 0);
    let b1 = method.add_block(root, 4);
    let b2 = method.add_block(root, 8);
    method.push(b0, Instruction::if_goto(0, Instruction::opaque(0, "c"), b2));
    method.push(b0, Instruction::branch(2, b1));
    method.push(b1, Instruction::ret(4));
    method.push(b2, Instruction::ret(8));

    detect(&mut method);

    // B1 and B2 as standalone blocks are pruned.
    assert_eq!(method.region(root).blocks.len(), 1);
    assert!(method.block_opt(b1).is_none());
    assert!(method.block_opt(b2).is_none());

    let block = method.block(b0);
    assert_eq!(block.instruction_count(), 2);
    assert!(matches!(
        block.instructions[1].kind,
        InstructionKind::Return { value: None }
    ));
    let InstructionKind::If {
        condition,
        true_inst,
        false_inst,
    } = &block.instructions[0].kind
    else {
        panic!("expected a conditional, got {:?}", block.instructions[0]);
    };
    // Rule 1 swapped the later target off the fallthrough path.
    assert!(matches!(condition.kind, InstructionKind::LogicNot(_)));
    // Both arms were embedded and their duplicate returns merged away.
    assert!(matches!(true_inst.kind, InstructionKind::InlineBlock(_)));
    assert!(matches!(false_inst.kind, InstructionKind::InlineBlock(_)));
    assert!(true_inst.is_empty());
    assert!(false_inst.is_empty());
    assert_block_invariants(&method);
}

/// Scenario A with non-trivial arms: the bodies survive inside the
/// conditional, the shared return becomes the merge point.
#[test]
fn diamond_with_bodies_keeps_them_in_the_branches() {
    let mut method = MethodBody::new();
    let root = method.root_region();
    let b0 = method.add_block(root, 0);
    let b1 = method.add_block(root, 4);
    let b2 = method.add_block(root, 10);
    method.push(b0, Instruction::if_goto(0, Instruction::opaque(0, "c"), b2));
    method.push(b0, Instruction::branch(2, b1));
    method.push(b1, Instruction::opaque(4, "x = 1"));
    method.push(b1, Instruction::ret(6));
    method.push(b2, Instruction::opaque(10, "x = 2"));
    method.push(b2, Instruction::ret(12));

    detect(&mut method);

    assert_eq!(method.region(root).blocks.len(), 1);
    let block = method.block(b0);
    let InstructionKind::If {
        true_inst,
        false_inst,
        ..
    } = &block.instructions[0].kind
    else {
        panic!("expected a conditional");
    };
    let InstructionKind::InlineBlock(true_block) = &true_inst.kind else {
        panic!("true branch not embedded");
    };
    let InstructionKind::InlineBlock(false_block) = &false_inst.kind else {
        panic!("false branch not embedded");
    };
    assert_eq!(
        true_block.instructions,
        vec![Instruction::opaque(4, "x = 1")]
    );
    assert_eq!(
        false_block.instructions,
        vec![Instruction::opaque(10, "x = 2")]
    );
    assert!(matches!(
        block.instructions[1].kind,
        InstructionKind::Return { value: None }
    ));
    assert_block_invariants(&method);
}

/// Scenario B: a shared merge point (two incoming edges) is never embedded;
/// the conditional keeps an explicit jump to it.
#[test]
fn shared_merge_point_is_not_embedded() {
    let mut method = MethodBody::new();
    let root = method.root_region();
    let b0 = method.add_block(root, 0);
    let b5 = method.add_block(root, 4);
    let b1 = method.add_block(root, 8);
    // Second reference to b5 from an out-of-line block.
    let b3 = method.add_block(root, 12);
    method.push(b0, Instruction::if_goto(0, Instruction::opaque(0, "c"), b5));
    method.push(b0, Instruction::branch(2, b1));
    method.push(b5, Instruction::ret(4));
    method.push(b1, Instruction::ret(8));
    method.push(b3, Instruction::branch(12, b5));

    detect(&mut method);

    // b5 survives as a standalone block; the true branch still jumps to it.
    let b5_block = method.block_opt(b5).expect("merge point retained");
    assert_eq!(b5_block.instruction_count(), 1);
    let block = method.block(b0);
    let InstructionKind::If { true_inst, .. } = &block.instructions[0].kind else {
        panic!("expected a conditional");
    };
    assert!(matches!(
        true_inst.kind,
        InstructionKind::Branch { target } if target == b5
    ));
    assert_block_invariants(&method);
}

/// Scenario C: a pure passthrough successor is spliced onto its single
/// predecessor, forming an extended basic block.
#[test]
fn tail_inlining_forms_extended_basic_blocks() {
    let mut method = MethodBody::new();
    let root = method.root_region();
    let b0 = method.add_block(root, 0);
    let b1 = method.add_block(root, 4);
    let b2 = method.add_block(root, 12);
    method.push(b0, Instruction::branch(0, b1));
    method.push(b1, Instruction::opaque(4, "x = 1"));
    method.push(b1, Instruction::branch(6, b2));
    method.push(b2, Instruction::ret(12));
    // Pin b2 so only b1 is inlinable.
    method.block_mut(b2).final_inst = Instruction::opaque(12, "pinned");

    detect(&mut method);

    assert!(method.block_opt(b1).is_none(), "b1 should be absorbed");
    let block = method.block(b0);
    assert_eq!(
        block.instructions,
        vec![
            Instruction::opaque(4, "x = 1"),
            Instruction::branch(6, b2),
        ]
    );
    assert!(method.block_opt(b2).is_some());
    assert_block_invariants(&method);
}

/// A non-passthrough final marker vetoes embedding even when dominance and
/// edge counts would allow it.
#[test]
fn non_nop_marker_blocks_embedding() {
    let mut method = MethodBody::new();
    let root = method.root_region();
    let b0 = method.add_block(root, 0);
    let b1 = method.add_block(root, 4);
    method.push(b0, Instruction::branch(0, b1));
    method.push(b1, Instruction::ret(4));
    method.block_mut(b1).final_inst = Instruction::opaque(4, "pinned");

    detect(&mut method);

    assert!(method.block_opt(b1).is_some());
    assert!(matches!(
        method.block(b0).instructions[0].kind,
        InstructionKind::Branch { target } if target == b1
    ));
    assert_block_invariants(&method);
}

/// Blocks in another region are never embedded: a multi-exit loop's
/// cross-region jump survives condition detection in both regions.
#[test]
fn cross_region_targets_are_not_embedded() {
    let mut method = MethodBody::new();
    let root = method.root_region();
    let other = method.add_region(cil_dec_rs::RegionKind::Loop);
    let b0 = method.add_block(root, 0);
    let far = method.add_block(other, 8);
    method.push(b0, Instruction::branch(0, far));
    method.push(far, Instruction::ret(8));

    detect(&mut method);

    assert!(method.block_opt(far).is_some());
    assert!(matches!(
        method.block(b0).instructions[0].kind,
        InstructionKind::Branch { target } if target == far
    ));
}

/// Canonical ordering: when the embedded false side precedes the true side
/// in source order, the branches swap and the condition is negated once.
#[test]
fn earlier_false_branch_swaps_to_the_true_side() {
    let mut method = MethodBody::new();
    let root = method.root_region();
    let b0 = method.add_block(root, 0);
    let then_block = method.add_block(root, 20);
    let else_block = method.add_block(root, 4);
    let join = method.add_block(root, 30);
    method.push(b0, Instruction::if_goto(0, Instruction::opaque(0, "c"), then_block));
    method.push(b0, Instruction::branch(2, else_block));
    method.push(then_block, Instruction::opaque(20, "late()"));
    method.push(then_block, Instruction::branch(22, join));
    method.push(else_block, Instruction::opaque(4, "early()"));
    method.push(else_block, Instruction::branch(6, join));
    method.push(join, Instruction::ret(30));
    // Keep the join out of the rewrite so the merge shape stays visible.
    method.block_mut(join).final_inst = Instruction::opaque(30, "pinned");

    detect(&mut method);

    let block = method.block(b0);
    let InstructionKind::If {
        condition,
        true_inst,
        false_inst,
    } = &block.instructions[0].kind
    else {
        panic!("expected a conditional");
    };
    let InstructionKind::InlineBlock(true_body) = &true_inst.kind else {
        panic!("true branch not embedded");
    };
    let InstructionKind::InlineBlock(false_body) = &false_inst.kind else {
        panic!("false branch not embedded");
    };
    // The earlier block ended up on the true side, with a single negation.
    assert_eq!(true_body.instructions, vec![Instruction::opaque(4, "early()")]);
    assert_eq!(false_body.instructions, vec![Instruction::opaque(20, "late()")]);
    assert!(matches!(condition.kind, InstructionKind::LogicNot(_)));
    let InstructionKind::LogicNot(inner) = &condition.kind else {
        unreachable!();
    };
    assert!(!matches!(inner.kind, InstructionKind::LogicNot(_)));
    assert_block_invariants(&method);
}

/// Re-running the detector on an already-structured region changes nothing.
#[test]
fn detection_is_idempotent_on_structured_input() {
    let mut method = MethodBody::new();
    let root = method.root_region();
    let b0 = method.add_block(root, 0);
    let b1 = method.add_block(root, 4);
    let b2 = method.add_block(root, 8);
    method.push(b0, Instruction::if_goto(0, Instruction::opaque(0, "c"), b2));
    method.push(b0, Instruction::branch(2, b1));
    method.push(b1, Instruction::opaque(4, "x = 1"));
    method.push(b1, Instruction::ret(6));
    method.push(b2, Instruction::opaque(8, "x = 2"));
    method.push(b2, Instruction::ret(10));

    detect(&mut method);
    let structured = format!("{:?}", method);
    detect(&mut method);
    assert_eq!(structured, format!("{:?}", method));
}

#[test]
fn compatibility_is_symmetric() {
    let mut method = MethodBody::new();
    let root = method.root_region();
    let b0 = method.add_block(root, 0);
    let b1 = method.add_block(root, 4);
    method.push(b0, Instruction::ret(0));
    method.push(b1, Instruction::ret(4));

    let candidates = vec![
        Instruction::branch(0, b0),
        Instruction::branch(4, b0),
        Instruction::branch(8, b1),
        Instruction::leave(12, root),
        Instruction::ret(16),
        Instruction::ret_value(20, Instruction::opaque(20, "x")),
        Instruction::nop(24),
        Instruction::opaque(28, "x = 1"),
    ];
    for a in &candidates {
        for b in &candidates {
            assert_eq!(
                compatible_exit_instruction(Some(a), Some(b)),
                compatible_exit_instruction(Some(b), Some(a)),
                "symmetry violated for {:?} / {:?}",
                a,
                b
            );
        }
        assert!(!compatible_exit_instruction(Some(a), None));
        assert!(!compatible_exit_instruction(None, Some(a)));
    }
}

/// An invariant violation in the input is a programming defect upstream and
/// fails fast instead of producing wrong structure.
#[test]
#[should_panic(expected = "control falls off the end")]
fn reachable_endpoint_block_fails_fast() {
    let mut method = MethodBody::new();
    let root = method.root_region();
    let b0 = method.add_block(root, 0);
    method.push(b0, Instruction::opaque(0, "no exit"));
    method.recompute_incoming_edges();
    let _ = detect_conditions(&mut method, root, &CancellationToken::new());
}

#[test]
fn cancelled_token_aborts_detection() {
    let mut method = MethodBody::new();
    let root = method.root_region();
    let b0 = method.add_block(root, 0);
    method.push(b0, Instruction::ret(0));
    method.recompute_incoming_edges();
    let token = CancellationToken::new();
    token.cancel();
    assert_eq!(
        detect_conditions(&mut method, root, &token),
        Err(Error::Cancelled)
    );
}

/// Unreachable blocks that nothing references any more are swept out with
/// their edge counts released transitively.
#[test]
fn pruning_cascades_through_unreachable_chains() {
    let mut method = MethodBody::new();
    let root = method.root_region();
    let b0 = method.add_block(root, 0);
    let dead1 = method.add_block(root, 4);
    let dead2 = method.add_block(root, 8);
    method.push(b0, Instruction::ret(0));
    method.push(dead1, Instruction::branch(4, dead2));
    method.push(dead2, Instruction::ret(8));

    detect(&mut method);

    assert!(method.block_opt(dead1).is_none());
    assert!(method.block_opt(dead2).is_none());
    assert_eq!(method.region(root).blocks, vec![b0]);
}

/// A cycle of dead blocks keeps its members' mutual edge counts nonzero, so
/// pruning must also discard by reachability from the region entry.
#[test]
fn unreachable_cycle_is_pruned() {
    let mut method = MethodBody::new();
    let root = method.root_region();
    let b0 = method.add_block(root, 0);
    let dead1 = method.add_block(root, 4);
    let dead2 = method.add_block(root, 8);
    method.push(b0, Instruction::ret(0));
    method.push(dead1, Instruction::branch(4, dead2));
    method.push(dead2, Instruction::branch(8, dead1));

    cil_dec_rs::Structurer::new()
        .structure_method(&mut method, &CancellationToken::new())
        .expect("structuring completes");

    assert_eq!(method.region(root).blocks, vec![b0]);
    assert!(method.block_opt(dead1).is_none());
    assert!(method.block_opt(dead2).is_none());
}

// Keep BlockId in the public test surface: embedding decisions are keyed on
// arena ids, so the ids must stay stable across rewrites.
#[test]
fn block_ids_remain_stable_across_rewrites() {
    let mut method = MethodBody::new();
    let root = method.root_region();
    let b0 = method.add_block(root, 0);
    let b1 = method.add_block(root, 4);
    let keep = method.add_block(root, 8);
    method.push(b0, Instruction::branch(0, b1));
    method.push(b1, Instruction::branch(4, keep));
    method.push(keep, Instruction::ret(8));
    method.block_mut(keep).final_inst = Instruction::opaque(8, "pinned");

    detect(&mut method);

    assert_eq!(keep, BlockId(2));
    assert!(method.block_opt(keep).is_some());
}
