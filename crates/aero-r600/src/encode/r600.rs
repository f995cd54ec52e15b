//! R600 and R700 CF headers, and the R600 `ALU_WORD1_OP2` layout.

use super::bits::{flag, get, put};
use super::{dst_bits, resolved};
use crate::alu::AluInstr;
use crate::bytecode::{CfBlock, Kcache};
use crate::error::CompileError;
use crate::export::Output;
use crate::family::ChipClass;
use crate::isa::{CfEncoding, CfOp};

pub(crate) fn cf(class: ChipClass, cf: &CfBlock) -> Result<[u32; 2], CompileError> {
    let inst = cf.op.native(class)?;
    Ok(match cf.op.encoding() {
        CfEncoding::Alu => alu_clause(cf, inst, class == ChipClass::R600 && cf.waterfall)?,
        CfEncoding::Fetch => {
            let count = (cf.ndw / 4).saturating_sub(1);
            [
                resolved(cf)? >> 1,
                put(count, 10, 3)
                    | put(count >> 3, 19, 1)
                    | put(inst, 23, 7)
                    | flag(cf.barrier, 31),
            ]
        }
        CfEncoding::Export => {
            let out = cf.output()?;
            [
                out.word0(),
                out.swizzle_bits()
                    | put(out.burst_count.saturating_sub(1), 17, 4)
                    | flag(out.end_of_program, 21)
                    | put(inst, 23, 7)
                    | flag(out.barrier, 31),
            ]
        }
        CfEncoding::Control => [
            cf.cf_addr >> 1,
            put(cf.pop_count, 0, 3)
                | put(cf.cond, 8, 2)
                | flag(cf.end_of_program, 21)
                | put(inst, 23, 7)
                | flag(cf.barrier, 31),
        ],
    })
}

/// `SQ_CF_ALU_WORD0/1`, shared with Evergreen except for the R600-only waterfall bit.
pub(crate) fn alu_clause(cf: &CfBlock, inst: u32, waterfall: bool) -> Result<[u32; 2], CompileError> {
    let [k0, k1] = &cf.kcache;
    Ok([
        put(resolved(cf)? >> 1, 0, 22)
            | put(k0.bank, 22, 4)
            | put(k1.bank, 26, 4)
            | put(k0.mode, 30, 2),
        put(k1.mode, 0, 2)
            | put(k0.addr, 2, 8)
            | put(k1.addr, 10, 8)
            | put((cf.ndw / 2).saturating_sub(1), 18, 7)
            | flag(waterfall, 25)
            | put(inst, 26, 4)
            | flag(cf.barrier, 31),
    ])
}

pub(crate) fn decode_alu_clause(w0: u32, w1: u32) -> Result<CfBlock, &'static str> {
    let op = CfOp::from_native_alu(get(w1, 26, 4)).ok_or("unknown ALU clause instruction")?;
    let mut cf = CfBlock::new(op);
    cf.addr = Some(get(w0, 0, 22) << 1);
    cf.kcache = [
        Kcache {
            bank: get(w0, 22, 4),
            mode: get(w0, 30, 2),
            addr: get(w1, 2, 8),
        },
        Kcache {
            bank: get(w0, 26, 4),
            mode: get(w1, 0, 2),
            addr: get(w1, 10, 8),
        },
    ];
    cf.ndw = (get(w1, 18, 7) + 1) * 2;
    cf.waterfall = get(w1, 25, 1) != 0;
    cf.barrier = get(w1, 31, 1) != 0;
    Ok(cf)
}

pub(crate) fn decode_cf(class: ChipClass, w0: u32, w1: u32) -> Result<CfBlock, &'static str> {
    if get(w1, 29, 1) != 0 {
        return decode_alu_clause(w0, w1);
    }
    let op = CfOp::from_native(class, get(w1, 23, 7)).ok_or("unknown CF instruction")?;
    let mut cf = CfBlock::new(op);
    cf.barrier = get(w1, 31, 1) != 0;
    match op.encoding() {
        CfEncoding::Fetch => {
            cf.addr = Some(w0 << 1);
            cf.ndw = (get(w1, 10, 3) + (get(w1, 19, 1) << 3) + 1) * 4;
        }
        CfEncoding::Export => {
            let mut out = Output::decode_common(op, w0, w1).ok_or("invalid export type")?;
            out.burst_count = get(w1, 17, 4) + 1;
            out.end_of_program = get(w1, 21, 1) != 0;
            cf.end_of_program = out.end_of_program;
            cf.body = crate::bytecode::CfBody::Export(out);
        }
        CfEncoding::Control => {
            cf.cf_addr = w0 << 1;
            cf.pop_count = get(w1, 0, 3);
            cf.cond = get(w1, 8, 2);
            cf.end_of_program = get(w1, 21, 1) != 0;
        }
        CfEncoding::Alu => return Err("ALU clause without the ALU marker"),
    }
    Ok(cf)
}

/// Version 1 `ALU_WORD1_OP2` (R600 only).
pub(crate) fn op2_word1(alu: &AluInstr) -> u32 {
    flag(alu.src[0].abs, 0)
        | flag(alu.src[1].abs, 1)
        | flag(alu.predicate, 2)
        | flag(alu.predicate, 3)
        | flag(alu.dst.write, 4)
        | put(u32::from(alu.omod), 6, 2)
        | put(alu.inst, 8, 10)
        | dst_bits(alu)
}

pub(crate) fn decode_op2_word1(alu: &mut AluInstr, w1: u32) {
    alu.src[0].abs = get(w1, 0, 1) != 0;
    alu.src[1].abs = get(w1, 1, 1) != 0;
    alu.predicate = get(w1, 2, 1) != 0;
    alu.dst.write = get(w1, 4, 1) != 0;
    alu.omod = get(w1, 6, 2) as u8;
    alu.inst = get(w1, 8, 10);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::CfBody;
    use crate::export::ExportType;

    #[test]
    fn alu_clause_header() {
        let mut cf = CfBlock::new(CfOp::Alu);
        cf.addr = Some(4);
        cf.ndw = 8;
        cf.waterfall = true;
        let [w0, w1] = cf_words(ChipClass::R600, &cf);
        assert_eq!(w0, 2);
        assert_eq!(get(w1, 18, 7), 3);
        assert_eq!(get(w1, 26, 4), 0x8);
        assert_eq!(get(w1, 25, 1), 1);
        assert_eq!(w1 >> 31, 1);

        // The waterfall bit is R600 only.
        let [_, w1] = cf_words(ChipClass::R700, &cf);
        assert_eq!(get(w1, 25, 1), 0);
    }

    #[test]
    fn fetch_count_spills_into_count_3() {
        let mut cf = CfBlock::new(CfOp::Tex);
        cf.addr = Some(16);
        cf.ndw = 4 * 9;
        let [w0, w1] = cf_words(ChipClass::R700, &cf);
        assert_eq!(w0, 8);
        assert_eq!(get(w1, 10, 3), 0);
        assert_eq!(get(w1, 19, 1), 1);
        assert_eq!(get(w1, 23, 7), 0x01);
        assert_eq!(decode_cf(ChipClass::R700, w0, w1).unwrap().ndw, 36);
    }

    #[test]
    fn export_word1() {
        let mut out = Output::new(ExportType::Pos, 60, 3);
        out.op = CfOp::ExportDone;
        out.end_of_program = true;
        let mut cf = CfBlock::new(CfOp::ExportDone);
        cf.body = CfBody::Export(out);
        let [w0, w1] = cf_words(ChipClass::R600, &cf);
        assert_eq!(w0, 60 | (1 << 13) | (3 << 15) | (3 << 30));
        assert_eq!(w1, (1 << 3) | (2 << 6) | (3 << 9) | (1 << 21) | (0x28 << 23) | (1 << 31));
    }

    #[test]
    fn unresolved_address_is_internal() {
        let cf = CfBlock::new(CfOp::Alu);
        assert!(matches!(cf_result(ChipClass::R600, &cf), Err(CompileError::Internal(_))));
    }

    fn cf_result(class: ChipClass, cf: &CfBlock) -> Result<[u32; 2], CompileError> {
        super::cf(class, cf)
    }

    fn cf_words(class: ChipClass, cf: &CfBlock) -> [u32; 2] {
        cf_result(class, cf).unwrap()
    }
}
