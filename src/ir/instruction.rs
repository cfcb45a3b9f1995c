//! Instruction model for the structuring IR.
//!
//! The opcode set is closed: structuring only distinguishes control
//! transfers, the conditional form, logical negation and no-ops. Everything
//! else travels through the pipeline as an opaque payload.

use crate::ir::block::Block;
use serde::{Deserialize, Serialize};

/// Stable index of a block within a [`crate::ir::MethodBody`] arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Stable index of a region within a [`crate::ir::MethodBody`] arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RegionId(pub u32);

impl RegionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One IR instruction: an opcode tag plus the source offset it was decoded
/// from. Offsets are used only for ordering heuristics, never for lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub offset: u32,
    pub kind: InstructionKind,
}

/// Closed opcode set manipulated by the structuring pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstructionKind {
    /// No operation; also the passthrough marker and the empty else branch.
    Nop,
    /// Non-control instruction carried through unchanged.
    Opaque(String),
    /// Logical negation of a condition.
    LogicNot(Box<Instruction>),
    /// Ternary conditional. `false_inst` is a `Nop` when the source had a
    /// single-sided branch.
    If {
        condition: Box<Instruction>,
        true_inst: Box<Instruction>,
        false_inst: Box<Instruction>,
    },
    /// Unconditional jump to a block.
    Branch { target: BlockId },
    /// Exit from a nested region; control continues after its container.
    Leave { target: RegionId },
    /// Return from the method, optionally carrying a value.
    Return { value: Option<Box<Instruction>> },
    /// A block embedded as the body of a conditional branch or spliced into
    /// an extended basic block. Produced by condition detection. Boxed so
    /// the mutually recursive block/instruction types stay finite.
    InlineBlock(Box<Block>),
    /// A nested single-entry region (a loop body). Produced by loop
    /// extraction.
    Container(RegionId),
}

impl Instruction {
    pub fn new(offset: u32, kind: InstructionKind) -> Self {
        Self { offset, kind }
    }

    pub fn nop(offset: u32) -> Self {
        Self::new(offset, InstructionKind::Nop)
    }

    pub fn opaque(offset: u32, text: impl Into<String>) -> Self {
        Self::new(offset, InstructionKind::Opaque(text.into()))
    }

    pub fn branch(offset: u32, target: BlockId) -> Self {
        Self::new(offset, InstructionKind::Branch { target })
    }

    pub fn leave(offset: u32, target: RegionId) -> Self {
        Self::new(offset, InstructionKind::Leave { target })
    }

    pub fn ret(offset: u32) -> Self {
        Self::new(offset, InstructionKind::Return { value: None })
    }

    pub fn ret_value(offset: u32, value: Instruction) -> Self {
        Self::new(
            offset,
            InstructionKind::Return {
                value: Some(Box::new(value)),
            },
        )
    }

    /// Single-sided conditional branch: `if (condition) goto target;`.
    pub fn if_goto(offset: u32, condition: Instruction, target: BlockId) -> Self {
        Self::new(
            offset,
            InstructionKind::If {
                condition: Box::new(condition),
                true_inst: Box::new(Instruction::branch(offset, target)),
                false_inst: Box::new(Instruction::nop(offset)),
            },
        )
    }

    /// Negate this condition in place, collapsing a double negation instead
    /// of nesting `LogicNot` inside `LogicNot`.
    pub fn negate(&mut self) {
        let offset = self.offset;
        let kind = std::mem::replace(&mut self.kind, InstructionKind::Nop);
        match kind {
            InstructionKind::LogicNot(inner) => {
                self.offset = inner.offset;
                self.kind = inner.kind;
            }
            kind => {
                self.kind = InstructionKind::LogicNot(Box::new(Instruction { offset, kind }));
            }
        }
    }

    /// True if this instruction contributes nothing: a `Nop`, or an embedded
    /// block whose instructions were all hoisted.
    pub fn is_empty(&self) -> bool {
        match &self.kind {
            InstructionKind::Nop => true,
            InstructionKind::InlineBlock(block) => block.instructions.is_empty(),
            _ => false,
        }
    }

    /// True if this is a single-sided conditional whose false branch is a
    /// no-op, i.e. the `if (c) goto X;` form the condition detector rewrites.
    pub fn is_single_sided_if(&self) -> bool {
        matches!(
            &self.kind,
            InstructionKind::If { false_inst, .. }
                if matches!(false_inst.kind, InstructionKind::Nop)
        )
    }
}

/// Compatibility of two trailing instructions (the merge test used when
/// embedding branches): same opcode, and the same Branch target, the same
/// Leave region, or two value-less Returns. Anything else, or a missing
/// side, is incompatible.
pub fn compatible_exit_instruction(a: Option<&Instruction>, b: Option<&Instruction>) -> bool {
    let (Some(a), Some(b)) = (a, b) else {
        return false;
    };
    match (&a.kind, &b.kind) {
        (
            InstructionKind::Branch { target: ta },
            InstructionKind::Branch { target: tb },
        ) => ta == tb,
        (
            InstructionKind::Leave { target: ta },
            InstructionKind::Leave { target: tb },
        ) => ta == tb,
        (
            InstructionKind::Return { value: va },
            InstructionKind::Return { value: vb },
        ) => va.is_none() && vb.is_none(),
        _ => false,
    }
}
