//! Opcode dispatch tables, one per ALU instruction set.

use crate::emit;
use crate::error::CompileError;
use crate::family::ChipClass;
use crate::ir::{Instruction, Opcode};
use crate::isa::{tex, AluOpcodes, EVERGREEN_ALU, R600_ALU};
use crate::translate::Ctx;

pub(crate) type EmitFn = fn(&mut Ctx<'_>, &Instruction, &OpInfo) -> Result<(), CompileError>;

/// How one IR opcode is lowered on a class.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OpInfo {
    pub(crate) opcode: Opcode,
    pub(crate) is_op3: bool,
    /// Native ALU or fetch instruction the routine emits, 0 when it picks its own.
    pub(crate) native: u32,
    pub(crate) emit: EmitFn,
}

const UNSUPPORTED: OpInfo = OpInfo {
    opcode: Opcode::Unknown(0),
    is_op3: false,
    native: 0,
    emit: emit::unsupported,
};

const fn op(opcode: Opcode, native: u32, emit: EmitFn) -> OpInfo {
    OpInfo {
        opcode,
        is_op3: false,
        native,
        emit,
    }
}

const fn op3(opcode: Opcode, native: u32, emit: EmitFn) -> OpInfo {
    OpInfo {
        opcode,
        is_op3: true,
        native,
        emit,
    }
}

const fn table(ops: &AluOpcodes, rsq: u32) -> [OpInfo; Opcode::RAW_COUNT] {
    let entries = [
        op(Opcode::Arl, 0, emit::arl),
        op(Opcode::Mov, ops.mov, emit::op2),
        op(Opcode::Lit, 0, emit::lit),
        op(Opcode::Rcp, ops.recip_ieee, emit::trans),
        op(Opcode::Rsq, rsq, emit::trans),
        op(Opcode::Exp, 0, emit::exp),
        op(Opcode::Log, 0, emit::log),
        op(Opcode::Mul, ops.mul, emit::op2),
        op(Opcode::Add, ops.add, emit::op2),
        op(Opcode::Dp3, ops.dot4, emit::dot),
        op(Opcode::Dp4, ops.dot4, emit::dot),
        op(Opcode::Dst, 0, emit::dst),
        op(Opcode::Min, ops.min, emit::op2),
        op(Opcode::Max, ops.max, emit::op2),
        op(Opcode::Slt, ops.setgt, emit::op2),
        op(Opcode::Sge, ops.setge, emit::op2),
        op3(Opcode::Mad, ops.muladd, emit::op3),
        op(Opcode::Sub, ops.add, emit::op2),
        op(Opcode::Lrp, 0, emit::lrp),
        op(Opcode::Frc, ops.fract, emit::op2),
        op(Opcode::Flr, ops.floor, emit::op2),
        op(Opcode::Round, ops.rndne, emit::op2),
        op(Opcode::Ex2, ops.exp_ieee, emit::trans),
        op(Opcode::Lg2, ops.log_ieee, emit::trans),
        op(Opcode::Pow, 0, emit::pow),
        op(Opcode::Xpd, 0, emit::xpd),
        op(Opcode::Abs, ops.mov, emit::op2),
        op(Opcode::Dph, ops.dot4, emit::dot),
        op(Opcode::Cos, ops.cos, emit::trig),
        op(Opcode::Ddx, tex::GET_GRADIENTS_H, emit::tex),
        op(Opcode::Ddy, tex::GET_GRADIENTS_V, emit::tex),
        op(Opcode::Kilp, ops.killgt, emit::kill),
        op(Opcode::Seq, ops.sete, emit::op2),
        op(Opcode::Sgt, ops.setgt, emit::op2),
        op(Opcode::Sin, ops.sin, emit::trig),
        op(Opcode::Sle, ops.setge, emit::op2),
        op(Opcode::Sne, ops.setne, emit::op2),
        op(Opcode::Tex, tex::SAMPLE, emit::tex),
        op(Opcode::Txd, tex::SAMPLE_G, emit::tex),
        op(Opcode::Txp, tex::SAMPLE, emit::tex),
        op(Opcode::Ssg, 0, emit::ssg),
        op3(Opcode::Cmp, ops.cndge, emit::op3),
        op(Opcode::Scs, 0, emit::scs),
        op(Opcode::Txb, tex::SAMPLE_LB, emit::tex),
        op(Opcode::Dp2, ops.dot4, emit::dot),
        op(Opcode::Txl, tex::SAMPLE_L, emit::tex),
        op(Opcode::Brk, 0, emit::flow),
        op(Opcode::If, 0, emit::flow),
        op(Opcode::Else, 0, emit::flow),
        op(Opcode::EndIf, 0, emit::flow),
        op(Opcode::Ceil, ops.ceil, emit::op2),
        op(Opcode::I2f, ops.int_to_flt, emit::trans),
        op(Opcode::Not, ops.not_int, emit::op2),
        op(Opcode::Trunc, ops.trunc, emit::op2),
        op(Opcode::Txf, tex::LD, emit::tex),
        op(Opcode::Txq, tex::GET_TEXTURE_RESINFO, emit::tex),
        op(Opcode::Cont, 0, emit::flow),
        op(Opcode::BgnLoop, 0, emit::flow),
        op(Opcode::EndLoop, 0, emit::flow),
        op(Opcode::Nop, 0, emit::nop),
        op(Opcode::Kil, ops.killgt, emit::kill),
        op(Opcode::End, 0, emit::nop),
    ];
    let mut table = [UNSUPPORTED; Opcode::RAW_COUNT];
    let mut i = 0;
    while i < entries.len() {
        table[entries[i].opcode.raw() as usize] = entries[i];
        i += 1;
    }
    table
}

static R600_TABLE: [OpInfo; Opcode::RAW_COUNT] = table(&R600_ALU, R600_ALU.recipsqrt_clamped);
static EVERGREEN_TABLE: [OpInfo; Opcode::RAW_COUNT] =
    table(&EVERGREEN_ALU, EVERGREEN_ALU.recipsqrt_ieee);

/// Lowering of `opcode` on `class`; opcodes without a routine map to an error-returning entry.
pub(crate) fn lookup(class: ChipClass, opcode: Opcode) -> &'static OpInfo {
    let table = if class.is_evergreen() {
        &EVERGREEN_TABLE
    } else {
        &R600_TABLE
    };
    table
        .get(usize::from(opcode.raw()))
        .unwrap_or(&UNSUPPORTED_ENTRY)
}

static UNSUPPORTED_ENTRY: OpInfo = UNSUPPORTED;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_index_by_raw_opcode() {
        for class in [ChipClass::R600, ChipClass::Evergreen] {
            for raw in 0..Opcode::RAW_COUNT as u16 {
                let info = lookup(class, Opcode::from_raw(raw));
                let registered = info.opcode == Opcode::from_raw(raw);
                let default = info.opcode == Opcode::Unknown(0);
                assert!(registered || default, "{raw} maps to {:?}", info.opcode);
            }
        }
    }

    #[test]
    fn class_specific_natives() {
        assert_eq!(
            lookup(ChipClass::R700, Opcode::Rsq).native,
            R600_ALU.recipsqrt_clamped
        );
        assert_eq!(
            lookup(ChipClass::Cayman, Opcode::Rsq).native,
            EVERGREEN_ALU.recipsqrt_ieee
        );
        assert_eq!(lookup(ChipClass::Evergreen, Opcode::Mul).native, EVERGREEN_ALU.mul);
        assert!(lookup(ChipClass::R600, Opcode::Mad).is_op3);
    }

    #[test]
    fn unlisted_opcodes_are_unsupported() {
        assert_eq!(lookup(ChipClass::R600, Opcode::Nrm).opcode, Opcode::Unknown(0));
        assert_eq!(lookup(ChipClass::R600, Opcode::Unknown(500)).opcode, Opcode::Unknown(0));
    }
}
