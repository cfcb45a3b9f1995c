//! Structuring IR: instructions, blocks, regions and the per-method arena.
//!
//! The upstream IR builder materializes one [`MethodBody`] per method; the
//! structuring pipeline mutates it in place and hands the same tree to the
//! source emitter. No entity survives across method boundaries.

pub mod block;
pub mod instruction;
pub mod method;
pub mod region;

pub use block::Block;
pub use instruction::{
    compatible_exit_instruction, BlockId, Instruction, InstructionKind, RegionId,
};
pub use method::MethodBody;
pub use region::{Region, RegionKind};
