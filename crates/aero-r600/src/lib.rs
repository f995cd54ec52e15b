//! Shader bytecode back-end for the AMD R600, R700, Evergreen and Cayman GPU families.
//!
//! Two layers:
//!
//! - [`Bytecode`] is the clause builder. ALU instructions are grouped into VLIW bundles and
//!   ALU clauses, fetches into TEX/VTX clauses, and exports and control instructions become CF
//!   instructions of their own. [`Bytecode::build`] resolves clause addresses and encodes the
//!   dword stream for the active chip class.
//! - [`translate`] lowers a token-stream [`ir::ShaderProgram`] (vertex or fragment) into a
//!   [`Bytecode`] and returns a [`CompiledShader`].
//!
//! [`disasm`] decodes a finished program back into CF blocks for inspection and tests.

mod alu;
mod bank_swizzle;
mod bytecode;
mod cf_stack;
pub mod disasm;
mod dispatch;
mod emit;
pub mod encode;
mod error;
mod export;
mod family;
mod fetch;
pub mod ir;
pub mod isa;
mod limits;
mod options;
mod translate;

pub use alu::{sel, AluDst, AluInstr, AluSrc};
pub use bank_swizzle::BankSwizzle;
pub use bytecode::{AluClause, Bytecode, CfBlock, CfBody, Kcache};
pub use cf_stack::FlowKind;
pub use error::CompileError;
pub use export::{swizzle as export_swizzle, ExportType, Output};
pub use family::{ChipClass, ChipFamily};
pub use fetch::{TexInstr, VtxInstr};
pub use isa::{AluOpcodes, CfOp};
pub use options::{CompileOptions, ConstantMode};
pub use translate::{translate, CompiledShader, ShaderIo};
