//! Bit packing of CF headers and ALU words.
//!
//! Every encoder is a pure function from instruction fields to dwords. The matching decoders
//! are used by [`crate::disasm`] and by the round-trip tests.

pub(crate) mod evergreen;
pub(crate) mod r600;
pub(crate) mod r700;

use crate::alu::{AluDst, AluInstr, AluSrc};
use crate::bank_swizzle::BankSwizzle;
use crate::bytecode::CfBlock;
use crate::error::CompileError;
use crate::family::ChipClass;

pub(crate) mod bits {
    fn mask(width: u32) -> u32 {
        if width >= 32 {
            u32::MAX
        } else {
            (1 << width) - 1
        }
    }

    /// `value` truncated to `width` bits, placed at `shift`.
    pub(crate) fn put(value: u32, shift: u32, width: u32) -> u32 {
        (value & mask(width)) << shift
    }

    pub(crate) fn flag(set: bool, shift: u32) -> u32 {
        u32::from(set) << shift
    }

    pub(crate) fn get(word: u32, shift: u32, width: u32) -> u32 {
        (word >> shift) & mask(width)
    }
}

use bits::{flag, get, put};

/// Encodes the two CF header dwords of `cf`.
pub fn encode_cf(class: ChipClass, cf: &CfBlock) -> Result<[u32; 2], CompileError> {
    if class.is_evergreen() {
        evergreen::cf(class, cf)
    } else {
        r600::cf(class, cf)
    }
}

/// Encodes one ALU instruction. R600 uses the first `ALU_WORD1_OP2` layout, later classes the
/// second one.
pub fn encode_alu(class: ChipClass, alu: &AluInstr) -> [u32; 2] {
    let w1 = if alu.is_op3 {
        op3_word1(alu)
    } else if class == ChipClass::R600 {
        r600::op2_word1(alu)
    } else {
        r700::op2_word1(alu)
    };
    [alu_word0(alu), w1]
}

pub fn decode_alu(class: ChipClass, words: [u32; 2]) -> AluInstr {
    let [w0, w1] = words;
    let mut alu = AluInstr {
        src: [decode_src(w0, 0), decode_src(w0, 13), AluSrc::default()],
        index_mode: get(w0, 26, 3) as u8,
        pred_sel: get(w0, 29, 2) as u8,
        last: get(w0, 31, 1) != 0,
        bank_swizzle: BankSwizzle(get(w1, 18, 3) as u8),
        dst: AluDst {
            sel: get(w1, 21, 7),
            rel: get(w1, 28, 1) != 0,
            chan: get(w1, 29, 2) as u8,
            clamp: get(w1, 31, 1) != 0,
            write: true,
        },
        ..AluInstr::default()
    };
    if get(w1, 15, 3) != 0 {
        alu.is_op3 = true;
        alu.inst = get(w1, 13, 5);
        alu.src[2] = decode_src(w1, 0);
    } else if class == ChipClass::R600 {
        r600::decode_op2_word1(&mut alu, w1);
    } else {
        r700::decode_op2_word1(&mut alu, w1);
    }
    alu
}

fn src_bits(src: &AluSrc, shift: u32) -> u32 {
    put(src.sel, shift, 9)
        | flag(src.rel, shift + 9)
        | put(u32::from(src.chan), shift + 10, 2)
        | flag(src.neg, shift + 12)
}

fn decode_src(word: u32, shift: u32) -> AluSrc {
    AluSrc {
        sel: get(word, shift, 9),
        rel: get(word, shift + 9, 1) != 0,
        chan: get(word, shift + 10, 2) as u8,
        neg: get(word, shift + 12, 1) != 0,
        abs: false,
    }
}

fn alu_word0(alu: &AluInstr) -> u32 {
    src_bits(&alu.src[0], 0)
        | src_bits(&alu.src[1], 13)
        | put(u32::from(alu.index_mode), 26, 3)
        | put(u32::from(alu.pred_sel), 29, 2)
        | flag(alu.last, 31)
}

/// Bank swizzle and destination bits shared by every word 1 layout.
fn dst_bits(alu: &AluInstr) -> u32 {
    put(u32::from(alu.bank_swizzle.0), 18, 3)
        | put(alu.dst.sel, 21, 7)
        | flag(alu.dst.rel, 28)
        | put(u32::from(alu.dst.chan), 29, 2)
        | flag(alu.dst.clamp, 31)
}

fn op3_word1(alu: &AluInstr) -> u32 {
    src_bits(&alu.src[2], 0) | put(alu.inst, 13, 5) | dst_bits(alu)
}

/// Dword address of a block resolved by the first build pass.
fn resolved(cf: &CfBlock) -> Result<u32, CompileError> {
    cf.addr
        .ok_or(CompileError::Internal("CF block encoded before its address was resolved"))
}
