//! Version 2 `ALU_WORD1_OP2`, used from R700 onwards.

use super::bits::{flag, get, put};
use super::dst_bits;
use crate::alu::AluInstr;

pub(crate) fn op2_word1(alu: &AluInstr) -> u32 {
    flag(alu.src[0].abs, 0)
        | flag(alu.src[1].abs, 1)
        | flag(alu.predicate, 2)
        | flag(alu.predicate, 3)
        | flag(alu.dst.write, 4)
        | put(u32::from(alu.omod), 5, 2)
        | put(alu.inst, 7, 11)
        | dst_bits(alu)
}

pub(crate) fn decode_op2_word1(alu: &mut AluInstr, w1: u32) {
    alu.src[0].abs = get(w1, 0, 1) != 0;
    alu.src[1].abs = get(w1, 1, 1) != 0;
    alu.predicate = get(w1, 2, 1) != 0;
    alu.dst.write = get(w1, 4, 1) != 0;
    alu.omod = get(w1, 5, 2) as u8;
    alu.inst = get(w1, 7, 11);
}
