//! cil-dec-rs: control-flow structuring core for a CIL decompiler
//!
//! This library takes a method's intermediate representation as a graph of
//! basic blocks connected by explicit jumps and rewrites it in place into
//! nested structured constructs (if/else trees, loop regions, extended
//! basic blocks) that a source emitter can print directly. It never touches
//! metadata, files, or presentation state; those belong to the surrounding
//! decompiler pipeline.

pub mod cancel;
pub mod cfg;
pub mod error;
pub mod ir;
pub mod structurer;

pub use cancel::CancellationToken;
pub use error::{Error, Result};
pub use structurer::Structurer;

// Re-export commonly used types
pub use cfg::analysis::DominatorTree;
pub use cfg::Cfg;
pub use ir::{Block, BlockId, Instruction, InstructionKind, MethodBody, Region, RegionId, RegionKind};
