//! Evergreen and Cayman CF headers.
//!
//! ALU clause headers match R600; every other CF word 1 moved `CF_INST` to bit 22 and widened
//! it to 8 bits.

use super::bits::{flag, get, put};
use super::r600::{alu_clause, decode_alu_clause};
use super::resolved;
use crate::bytecode::{CfBlock, CfBody};
use crate::error::CompileError;
use crate::export::Output;
use crate::family::ChipClass;
use crate::isa::{CfEncoding, CfOp};

pub(crate) fn cf(class: ChipClass, cf: &CfBlock) -> Result<[u32; 2], CompileError> {
    let inst = cf.op.native(class)?;
    Ok(match cf.op.encoding() {
        CfEncoding::Alu => alu_clause(cf, inst, false)?,
        CfEncoding::Fetch => [
            put(resolved(cf)? >> 1, 0, 24),
            put((cf.ndw / 4).saturating_sub(1), 10, 6) | put(inst, 22, 8) | flag(cf.barrier, 31),
        ],
        CfEncoding::Export => {
            let out = cf.output()?;
            [
                out.word0(),
                out.swizzle_bits()
                    | put(out.burst_count.saturating_sub(1), 16, 4)
                    | flag(out.end_of_program, 21)
                    | put(inst, 22, 8)
                    | flag(out.barrier, 31),
            ]
        }
        CfEncoding::Control => [
            put(cf.cf_addr >> 1, 0, 24),
            put(cf.pop_count, 0, 3)
                | put(cf.cond, 8, 2)
                | flag(cf.end_of_program, 21)
                | put(inst, 22, 8)
                | flag(cf.barrier, 31),
        ],
    })
}

pub(crate) fn decode_cf(class: ChipClass, w0: u32, w1: u32) -> Result<CfBlock, &'static str> {
    if get(w1, 29, 1) != 0 {
        return decode_alu_clause(w0, w1);
    }
    let op = CfOp::from_native(class, get(w1, 22, 8)).ok_or("unknown CF instruction")?;
    let mut cf = CfBlock::new(op);
    cf.barrier = get(w1, 31, 1) != 0;
    cf.end_of_program = get(w1, 21, 1) != 0;
    match op.encoding() {
        CfEncoding::Fetch => {
            cf.addr = Some(get(w0, 0, 24) << 1);
            cf.ndw = (get(w1, 10, 6) + 1) * 4;
        }
        CfEncoding::Export => {
            let mut out = Output::decode_common(op, w0, w1).ok_or("invalid export type")?;
            out.burst_count = get(w1, 16, 4) + 1;
            out.end_of_program = cf.end_of_program;
            cf.body = CfBody::Export(out);
        }
        CfEncoding::Control => {
            cf.cf_addr = get(w0, 0, 24) << 1;
            cf.pop_count = get(w1, 0, 3);
            cf.cond = get(w1, 8, 2);
        }
        CfEncoding::Alu => return Err("ALU clause without the ALU marker"),
    }
    Ok(cf)
}
