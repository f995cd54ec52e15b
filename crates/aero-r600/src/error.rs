use thiserror::Error;

use crate::family::ChipClass;
use crate::ir::RegisterFile;
use crate::isa::CfOp;

/// Errors surfaced while building, lowering or encoding a shader program.
///
/// Every error aborts the compile. A [`crate::Bytecode`] that returned an error must be
/// discarded (or [`crate::Bytecode::clear`]ed) before it is reused.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("out of memory while growing shader bytecode")]
    OutOfMemory,
    #[error("unsupported GPU family {0}")]
    UnsupportedFamily(u32),
    #[error("CF instruction {op:?} is not available on {class:?}")]
    UnsupportedInstruction { op: CfOp, class: ChipClass },
    #[error("unsupported IR opcode {0}")]
    UnsupportedOpcode(u16),
    #[error("unbalanced control flow: expected {expected}, found {found}")]
    UnbalancedControlFlow {
        expected: &'static str,
        found: &'static str,
    },
    #[error("control flow nesting exceeds {max} levels")]
    ControlFlowStackOverflow { max: usize },
    #[error("break/continue outside of a loop")]
    NotInLoop,
    #[error("bank swizzle conflict in ALU bundle {bundle}: {reason}")]
    BankSwizzleConflict { bundle: u32, reason: &'static str },
    #[error("ALU bundle in CF block {block} references literals that were never added")]
    MissingLiterals { block: usize },
    #[error("unsupported register file {0:?}")]
    UnsupportedFile(RegisterFile),
    #[error("unsupported operand: {0}")]
    UnsupportedOperand(&'static str),
    #[error("constant register {index} is out of range (max {max})")]
    ConstantOutOfRange { index: u32, max: u32 },
    #[error("malformed bytecode at dword {offset}: {reason}")]
    MalformedBytecode { offset: usize, reason: &'static str },
    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl From<std::collections::TryReserveError> for CompileError {
    fn from(_: std::collections::TryReserveError) -> Self {
        CompileError::OutOfMemory
    }
}
