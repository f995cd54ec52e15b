//! Native instruction numbers for the R600, R700, Evergreen and Cayman instruction sets.
//!
//! CF instructions are named by the chip-independent [`CfOp`] and mapped to their native number
//! by the active class when a block is encoded. ALU opcodes are carried as raw native numbers in
//! [`crate::AluInstr::inst`]; [`AluOpcodes`] gives the per-class numbers the emission routines
//! need.

use crate::error::CompileError;
use crate::family::ChipClass;

/// Chip-independent control-flow instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CfOp {
    Nop,
    /// Texture fetch clause (`TC` on Evergreen and Cayman).
    Tex,
    /// Vertex fetch clause (`VC` on Evergreen, absent on Cayman).
    Vtx,
    VtxTc,
    Gds,
    LoopStart,
    LoopEnd,
    LoopStartDx10,
    LoopStartNoAl,
    LoopContinue,
    LoopBreak,
    Jump,
    Push,
    PushElse,
    Else,
    Pop,
    PopJump,
    PopPush,
    PopPushElse,
    Call,
    CallFs,
    Return,
    EmitVertex,
    EmitCutVertex,
    CutVertex,
    Kill,
    WaitAck,
    TcAck,
    VcAck,
    JumpTable,
    GlobalWaveSync,
    Halt,
    End,
    Alu,
    AluPushBefore,
    AluPopAfter,
    AluPop2After,
    AluContinue,
    AluBreak,
    AluElseAfter,
    Export,
    ExportDone,
}

/// Encoding family of a CF instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfEncoding {
    Alu,
    Fetch,
    Export,
    Control,
}

impl CfOp {
    pub fn encoding(self) -> CfEncoding {
        match self {
            Self::Alu
            | Self::AluPushBefore
            | Self::AluPopAfter
            | Self::AluPop2After
            | Self::AluContinue
            | Self::AluBreak
            | Self::AluElseAfter => CfEncoding::Alu,
            Self::Tex | Self::Vtx | Self::VtxTc | Self::Gds => CfEncoding::Fetch,
            Self::Export | Self::ExportDone => CfEncoding::Export,
            _ => CfEncoding::Control,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Nop => "NOP",
            Self::Tex => "TEX",
            Self::Vtx => "VTX",
            Self::VtxTc => "VTX_TC",
            Self::Gds => "GDS",
            Self::LoopStart => "LOOP_START",
            Self::LoopEnd => "LOOP_END",
            Self::LoopStartDx10 => "LOOP_START_DX10",
            Self::LoopStartNoAl => "LOOP_START_NO_AL",
            Self::LoopContinue => "LOOP_CONTINUE",
            Self::LoopBreak => "LOOP_BREAK",
            Self::Jump => "JUMP",
            Self::Push => "PUSH",
            Self::PushElse => "PUSH_ELSE",
            Self::Else => "ELSE",
            Self::Pop => "POP",
            Self::PopJump => "POP_JUMP",
            Self::PopPush => "POP_PUSH",
            Self::PopPushElse => "POP_PUSH_ELSE",
            Self::Call => "CALL",
            Self::CallFs => "CALL_FS",
            Self::Return => "RETURN",
            Self::EmitVertex => "EMIT_VERTEX",
            Self::EmitCutVertex => "EMIT_CUT_VERTEX",
            Self::CutVertex => "CUT_VERTEX",
            Self::Kill => "KILL",
            Self::WaitAck => "WAIT_ACK",
            Self::TcAck => "TC_ACK",
            Self::VcAck => "VC_ACK",
            Self::JumpTable => "JUMPTABLE",
            Self::GlobalWaveSync => "GLOBAL_WAVE_SYNC",
            Self::Halt => "HALT",
            Self::End => "END",
            Self::Alu => "ALU",
            Self::AluPushBefore => "ALU_PUSH_BEFORE",
            Self::AluPopAfter => "ALU_POP_AFTER",
            Self::AluPop2After => "ALU_POP2_AFTER",
            Self::AluContinue => "ALU_CONTINUE",
            Self::AluBreak => "ALU_BREAK",
            Self::AluElseAfter => "ALU_ELSE_AFTER",
            Self::Export => "EXPORT",
            Self::ExportDone => "EXPORT_DONE",
        }
    }

    /// Native `CF_INST` value of this op on `class`.
    ///
    /// ALU clause ops return the 4-bit `SQ_CF_ALU_WORD1.CF_INST` value, every other op the
    /// `SQ_CF_WORD1`/`SQ_CF_ALLOC_EXPORT_WORD1` value.
    pub fn native(self, class: ChipClass) -> Result<u32, CompileError> {
        let unsupported = || CompileError::UnsupportedInstruction { op: self, class };
        match self.encoding() {
            CfEncoding::Alu => match self {
                Self::Alu => Ok(0x8),
                Self::AluPushBefore => Ok(0x9),
                Self::AluPopAfter => Ok(0xA),
                Self::AluPop2After => Ok(0xB),
                Self::AluContinue => Ok(0xD),
                Self::AluBreak => Ok(0xE),
                Self::AluElseAfter => Ok(0xF),
                _ => Err(unsupported()),
            },
            CfEncoding::Export => match (self, class.is_evergreen()) {
                (Self::Export, false) => Ok(0x27),
                (Self::ExportDone, false) => Ok(0x28),
                (Self::Export, true) => Ok(0x53),
                (Self::ExportDone, true) => Ok(0x54),
                _ => Err(unsupported()),
            },
            _ if class == ChipClass::Cayman => match self {
                Self::End => Ok(0x20),
                // Cayman dropped the vertex cache clause and its ack.
                Self::Vtx | Self::VcAck => Err(unsupported()),
                _ => lookup(&EVERGREEN_CF, self).ok_or_else(unsupported),
            },
            _ if class.is_evergreen() => lookup(&EVERGREEN_CF, self).ok_or_else(unsupported),
            _ => lookup(&R600_CF, self).ok_or_else(unsupported),
        }
    }

    /// Inverse of [`CfOp::native`] for non-ALU instructions.
    pub fn from_native(class: ChipClass, value: u32) -> Option<Self> {
        if class.is_evergreen() {
            match value {
                0x53 => return Some(Self::Export),
                0x54 => return Some(Self::ExportDone),
                0x20 if class == ChipClass::Cayman => return Some(Self::End),
                _ => {}
            }
            EVERGREEN_CF
                .iter()
                .find(|(op, v)| *v == value && op.native(class).is_ok())
                .map(|(op, _)| *op)
        } else {
            match value {
                0x27 => Some(Self::Export),
                0x28 => Some(Self::ExportDone),
                _ => R600_CF
                    .iter()
                    .find(|(_, v)| *v == value)
                    .map(|(op, _)| *op),
            }
        }
    }

    /// Inverse of [`CfOp::native`] for ALU clause instructions.
    pub fn from_native_alu(value: u32) -> Option<Self> {
        Some(match value {
            0x8 => Self::Alu,
            0x9 => Self::AluPushBefore,
            0xA => Self::AluPopAfter,
            0xB => Self::AluPop2After,
            0xD => Self::AluContinue,
            0xE => Self::AluBreak,
            0xF => Self::AluElseAfter,
            _ => return None,
        })
    }
}

fn lookup(table: &[(CfOp, u32)], op: CfOp) -> Option<u32> {
    table.iter().find(|(o, _)| *o == op).map(|(_, value)| *value)
}

const R600_CF: [(CfOp, u32); 25] = [
    (CfOp::Nop, 0x00),
    (CfOp::Tex, 0x01),
    (CfOp::Vtx, 0x02),
    (CfOp::VtxTc, 0x03),
    (CfOp::LoopStart, 0x04),
    (CfOp::LoopEnd, 0x05),
    (CfOp::LoopStartDx10, 0x06),
    (CfOp::LoopStartNoAl, 0x07),
    (CfOp::LoopContinue, 0x08),
    (CfOp::LoopBreak, 0x09),
    (CfOp::Jump, 0x0A),
    (CfOp::Push, 0x0B),
    (CfOp::PushElse, 0x0C),
    (CfOp::Else, 0x0D),
    (CfOp::Pop, 0x0E),
    (CfOp::PopJump, 0x0F),
    (CfOp::PopPush, 0x10),
    (CfOp::PopPushElse, 0x11),
    (CfOp::Call, 0x12),
    (CfOp::CallFs, 0x13),
    (CfOp::Return, 0x14),
    (CfOp::EmitVertex, 0x15),
    (CfOp::EmitCutVertex, 0x16),
    (CfOp::CutVertex, 0x17),
    (CfOp::Kill, 0x18),
];

const EVERGREEN_CF: [(CfOp, u32); 27] = [
    (CfOp::Nop, 0x00),
    (CfOp::Tex, 0x01),
    (CfOp::Vtx, 0x02),
    (CfOp::Gds, 0x03),
    (CfOp::LoopStart, 0x04),
    (CfOp::LoopEnd, 0x05),
    (CfOp::LoopStartDx10, 0x06),
    (CfOp::LoopStartNoAl, 0x07),
    (CfOp::LoopContinue, 0x08),
    (CfOp::LoopBreak, 0x09),
    (CfOp::Jump, 0x0A),
    (CfOp::Push, 0x0B),
    (CfOp::Else, 0x0D),
    (CfOp::Pop, 0x0E),
    (CfOp::Call, 0x12),
    (CfOp::CallFs, 0x13),
    (CfOp::Return, 0x14),
    (CfOp::EmitVertex, 0x15),
    (CfOp::EmitCutVertex, 0x16),
    (CfOp::CutVertex, 0x17),
    (CfOp::Kill, 0x18),
    (CfOp::WaitAck, 0x1A),
    (CfOp::TcAck, 0x1B),
    (CfOp::VcAck, 0x1C),
    (CfOp::JumpTable, 0x1D),
    (CfOp::GlobalWaveSync, 0x1E),
    (CfOp::Halt, 0x1F),
];

/// Condition codes of `SQ_CF_WORD1.COND`.
pub mod cond {
    pub const ACTIVE: u32 = 0;
    pub const FALSE: u32 = 1;
    pub const BOOL: u32 = 2;
    pub const NOT_BOOL: u32 = 3;
}

/// Kcache lock modes of the ALU CF header.
pub mod kcache_mode {
    pub const NOP: u32 = 0;
    pub const LOCK_1: u32 = 1;
    pub const LOCK_2: u32 = 2;
    pub const LOCK_LOOP_INDEX: u32 = 3;
}

/// Texture fetch instructions (shared by every class).
pub mod tex {
    pub const VTX_FETCH: u32 = 0;
    pub const LD: u32 = 0x03;
    pub const GET_TEXTURE_RESINFO: u32 = 0x04;
    pub const GET_GRADIENTS_H: u32 = 0x07;
    pub const GET_GRADIENTS_V: u32 = 0x08;
    pub const SET_GRADIENTS_H: u32 = 0x0B;
    pub const SET_GRADIENTS_V: u32 = 0x0C;
    pub const SAMPLE: u32 = 0x10;
    pub const SAMPLE_L: u32 = 0x11;
    pub const SAMPLE_LB: u32 = 0x12;
    pub const SAMPLE_G: u32 = 0x14;
    pub const SAMPLE_C: u32 = 0x18;
    pub const SAMPLE_C_L: u32 = 0x19;
    pub const SAMPLE_C_LB: u32 = 0x1A;
    pub const SAMPLE_C_G: u32 = 0x1C;

    /// Depth-compare variant of a sample instruction, if it has one.
    pub fn shadow(inst: u32) -> Option<u32> {
        match inst {
            SAMPLE => Some(SAMPLE_C),
            SAMPLE_L => Some(SAMPLE_C_L),
            SAMPLE_LB => Some(SAMPLE_C_LB),
            SAMPLE_G => Some(SAMPLE_C_G),
            _ => None,
        }
    }
}

/// Vertex fetch instructions.
pub mod vtx {
    pub const FETCH: u32 = 0;
    pub const SEMANTIC: u32 = 1;
}

/// Evergreen/Cayman ALU opcodes without an R600 counterpart.
pub mod evergreen {
    pub const FLT_TO_INT_FLOOR: u32 = 0xB1;
    pub const INTERP_XY: u32 = 0xD6;
    pub const INTERP_ZW: u32 = 0xD7;
}

/// R600/R700 ALU opcodes without an Evergreen counterpart.
pub mod r600 {
    pub const MOVA: u32 = 0x15;
    pub const MOVA_FLOOR: u32 = 0x16;
}

/// Per-class ALU opcode numbers used by the emission routines.
#[derive(Debug)]
pub struct AluOpcodes {
    pub add: u32,
    pub mul: u32,
    pub mul_ieee: u32,
    pub max: u32,
    pub min: u32,
    pub sete: u32,
    pub setgt: u32,
    pub setge: u32,
    pub setne: u32,
    pub fract: u32,
    pub trunc: u32,
    pub ceil: u32,
    pub rndne: u32,
    pub floor: u32,
    pub mova_int: u32,
    pub mov: u32,
    pub nop: u32,
    pub pred_sete: u32,
    pub pred_setgt: u32,
    pub pred_setge: u32,
    pub pred_setne: u32,
    pub kille: u32,
    pub killgt: u32,
    pub killge: u32,
    pub killne: u32,
    pub not_int: u32,
    pub dot4: u32,
    pub dot4_ieee: u32,
    pub cube: u32,
    pub max4: u32,
    pub exp_ieee: u32,
    pub log_clamped: u32,
    pub log_ieee: u32,
    pub recip_clamped: u32,
    pub recip_ieee: u32,
    pub recipsqrt_clamped: u32,
    pub recipsqrt_ieee: u32,
    pub sqrt_ieee: u32,
    pub flt_to_int: u32,
    pub int_to_flt: u32,
    pub sin: u32,
    pub cos: u32,
    // OP3
    pub mul_lit: u32,
    pub muladd: u32,
    pub muladd_ieee: u32,
    pub cnde: u32,
    pub cndgt: u32,
    pub cndge: u32,
    /// OP2 opcodes reading a single source operand.
    one_src: &'static [u32],
}

impl AluOpcodes {
    pub fn for_class(class: ChipClass) -> &'static AluOpcodes {
        if class.is_evergreen() {
            &EVERGREEN_ALU
        } else {
            &R600_ALU
        }
    }

    /// Number of source operands read by `inst`.
    pub fn num_operands(&self, inst: u32, is_op3: bool) -> usize {
        if is_op3 {
            3
        } else if inst == self.nop {
            0
        } else if self.one_src.contains(&inst) {
            1
        } else {
            2
        }
    }
}

pub const R600_ALU: AluOpcodes = AluOpcodes {
    add: 0x00,
    mul: 0x01,
    mul_ieee: 0x02,
    max: 0x03,
    min: 0x04,
    sete: 0x08,
    setgt: 0x09,
    setge: 0x0A,
    setne: 0x0B,
    fract: 0x10,
    trunc: 0x11,
    ceil: 0x12,
    rndne: 0x13,
    floor: 0x14,
    mova_int: 0x18,
    mov: 0x19,
    nop: 0x1A,
    pred_sete: 0x20,
    pred_setgt: 0x21,
    pred_setge: 0x22,
    pred_setne: 0x23,
    kille: 0x2C,
    killgt: 0x2D,
    killge: 0x2E,
    killne: 0x2F,
    not_int: 0x33,
    dot4: 0x50,
    dot4_ieee: 0x51,
    cube: 0x52,
    max4: 0x53,
    exp_ieee: 0x61,
    log_clamped: 0x62,
    log_ieee: 0x63,
    recip_clamped: 0x64,
    recip_ieee: 0x66,
    recipsqrt_clamped: 0x67,
    recipsqrt_ieee: 0x69,
    sqrt_ieee: 0x6A,
    flt_to_int: 0x6B,
    int_to_flt: 0x6C,
    sin: 0x6E,
    cos: 0x6F,
    mul_lit: 0x0C,
    muladd: 0x10,
    muladd_ieee: 0x14,
    cnde: 0x18,
    cndgt: 0x19,
    cndge: 0x1A,
    one_src: &[
        0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x18, 0x19, 0x33, 0x61, 0x62, 0x63, 0x64,
        0x66, 0x67, 0x69, 0x6A, 0x6B, 0x6C, 0x6E, 0x6F,
    ],
};

pub const EVERGREEN_ALU: AluOpcodes = AluOpcodes {
    add: 0x00,
    mul: 0x01,
    mul_ieee: 0x02,
    max: 0x03,
    min: 0x04,
    sete: 0x08,
    setgt: 0x09,
    setge: 0x0A,
    setne: 0x0B,
    fract: 0x10,
    trunc: 0x11,
    ceil: 0x12,
    rndne: 0x13,
    floor: 0x14,
    mova_int: 0xCC,
    mov: 0x19,
    nop: 0x1A,
    pred_sete: 0x20,
    pred_setgt: 0x21,
    pred_setge: 0x22,
    pred_setne: 0x23,
    kille: 0x2C,
    killgt: 0x2D,
    killge: 0x2E,
    killne: 0x2F,
    not_int: 0x33,
    dot4: 0xBE,
    dot4_ieee: 0xBF,
    cube: 0xC0,
    max4: 0xC1,
    exp_ieee: 0x81,
    log_clamped: 0x82,
    log_ieee: 0x83,
    recip_clamped: 0x84,
    recip_ieee: 0x86,
    recipsqrt_clamped: 0x87,
    recipsqrt_ieee: 0x89,
    sqrt_ieee: 0x8A,
    flt_to_int: 0x50,
    int_to_flt: 0x9B,
    sin: 0x8D,
    cos: 0x8E,
    mul_lit: 0x1F,
    muladd: 0x14,
    muladd_ieee: 0x18,
    cnde: 0x19,
    cndgt: 0x1A,
    cndge: 0x1B,
    one_src: &[
        0x10, 0x11, 0x12, 0x13, 0x14, 0x19, 0x33, 0x50, 0x81, 0x82, 0x83, 0x84, 0x86, 0x87,
        0x89, 0x8A, 0x8D, 0x8E, 0x9B, 0xB1, 0xCC,
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cf_numbers_differ_per_class() {
        assert_eq!(CfOp::Jump.native(ChipClass::R600).unwrap(), 0x0A);
        assert_eq!(CfOp::Export.native(ChipClass::R700).unwrap(), 0x27);
        assert_eq!(CfOp::ExportDone.native(ChipClass::Evergreen).unwrap(), 0x54);
        assert_eq!(CfOp::End.native(ChipClass::Cayman).unwrap(), 0x20);
        assert_eq!(CfOp::AluPushBefore.native(ChipClass::Cayman).unwrap(), 0x9);
    }

    #[test]
    fn ops_missing_from_a_class_are_rejected() {
        for (op, class) in [
            (CfOp::VtxTc, ChipClass::Evergreen),
            (CfOp::PushElse, ChipClass::Evergreen),
            (CfOp::End, ChipClass::Evergreen),
            (CfOp::End, ChipClass::R700),
            (CfOp::Vtx, ChipClass::Cayman),
            (CfOp::Halt, ChipClass::R600),
        ] {
            assert!(
                matches!(
                    op.native(class),
                    Err(CompileError::UnsupportedInstruction { op: o, class: c }) if o == op && c == class
                ),
                "{op:?} on {class:?}"
            );
        }
    }

    #[test]
    fn native_numbers_decode_back() {
        for class in [ChipClass::R600, ChipClass::Evergreen, ChipClass::Cayman] {
            for op in [CfOp::Jump, CfOp::Pop, CfOp::LoopEnd, CfOp::Tex, CfOp::ExportDone] {
                let value = op.native(class).unwrap();
                assert_eq!(CfOp::from_native(class, value), Some(op));
            }
        }
        assert_eq!(CfOp::from_native(ChipClass::Cayman, 0x02), None);
        assert_eq!(CfOp::from_native_alu(0x9), Some(CfOp::AluPushBefore));
    }

    #[test]
    fn operand_counts() {
        let ops = AluOpcodes::for_class(ChipClass::R600);
        assert_eq!(ops.num_operands(ops.mov, false), 1);
        assert_eq!(ops.num_operands(ops.add, false), 2);
        assert_eq!(ops.num_operands(ops.nop, false), 0);
        assert_eq!(ops.num_operands(ops.muladd, true), 3);
        let eg = AluOpcodes::for_class(ChipClass::Evergreen);
        assert_eq!(eg.num_operands(evergreen::FLT_TO_INT_FLOOR, false), 1);
        assert_eq!(eg.num_operands(eg.dot4, false), 2);
    }
}
