//! Decoder and text listing for encoded programs.
//!
//! [`decode`] is the inverse of [`crate::Bytecode::build`]: it walks the CF headers until an
//! end-of-program marker (or a CF `END`) and rebuilds each block with its clause body.

use std::fmt;

use crate::alu::{sel, AluInstr, AluSrc};
use crate::bytecode::{CfBlock, CfBody};
use crate::encode::{self, evergreen, r600};
use crate::error::CompileError;
use crate::export::ExportType;
use crate::family::ChipClass;
use crate::fetch::{TexInstr, VtxInstr};
use crate::isa::{vtx, CfEncoding, CfOp};

/// Decodes `words` into CF blocks.
pub fn decode(class: ChipClass, words: &[u32]) -> Result<Vec<CfBlock>, CompileError> {
    let mut blocks = Vec::new();
    let mut id = 0usize;
    loop {
        let malformed = |offset, reason| CompileError::MalformedBytecode { offset, reason };
        let [w0, w1] = read::<2>(words, id).ok_or(malformed(id, "CF header past the end"))?;
        let decoded = if class.is_evergreen() {
            evergreen::decode_cf(class, w0, w1)
        } else {
            r600::decode_cf(class, w0, w1)
        };
        let mut cf = decoded.map_err(|reason| malformed(id, reason))?;
        cf.id = id as u32;
        if let Some(addr) = cf.addr {
            cf.body = decode_body(class, &cf, words, addr as usize)
                .ok_or(malformed(addr as usize, "clause body past the end"))?;
        }
        let done = cf.end_of_program || cf.op == CfOp::End;
        blocks.try_reserve(1)?;
        blocks.push(cf);
        if done {
            return Ok(blocks);
        }
        id += 2;
    }
}

fn read<const N: usize>(words: &[u32], at: usize) -> Option<[u32; N]> {
    words.get(at..at.checked_add(N)?)?.try_into().ok()
}

fn decode_body(class: ChipClass, cf: &CfBlock, words: &[u32], addr: usize) -> Option<CfBody> {
    let end = addr.checked_add(cf.ndw as usize)?;
    match cf.op.encoding() {
        CfEncoding::Alu => decode_alu_clause(class, words, addr, end).map(CfBody::Alu),
        CfEncoding::Fetch => {
            let first = read::<4>(words, addr)?;
            let is_vtx = cf.op == CfOp::Vtx || first[0] & 0x1F <= vtx::SEMANTIC;
            let mut at = addr;
            if is_vtx {
                let mut instrs = Vec::new();
                while at < end {
                    instrs.push(VtxInstr::decode(read::<4>(words, at)?));
                    at += 4;
                }
                Some(CfBody::Vtx(instrs))
            } else {
                let mut instrs = Vec::new();
                while at < end {
                    instrs.push(TexInstr::decode(read::<4>(words, at)?));
                    at += 4;
                }
                Some(CfBody::Tex(instrs))
            }
        }
        CfEncoding::Export | CfEncoding::Control => Some(CfBody::None),
    }
}

/// ALU clause bodies interleave bundles with their literal words, so the literal pool size of
/// each bundle has to be recomputed from the literal selectors it reads.
fn decode_alu_clause(
    class: ChipClass,
    words: &[u32],
    mut at: usize,
    end: usize,
) -> Option<Vec<AluInstr>> {
    let mut instrs = Vec::new();
    let mut bundle = 0;
    let mut bundle_start = 0;
    while at < end {
        let mut alu = encode::decode_alu(class, read::<2>(words, at)?);
        at += 2;
        alu.bundle = bundle;
        let last = alu.last;
        instrs.push(alu);
        if last {
            let members = &mut instrs[bundle_start..];
            let nliteral = members
                .iter()
                .map(AluInstr::literal_need)
                .max()
                .unwrap_or(0);
            for member in members.iter_mut() {
                member.nliteral = nliteral;
            }
            if nliteral > 0 {
                let literals = words.get(at..at + nliteral as usize)?;
                let closing = instrs.last_mut()?;
                closing.value[..literals.len()].copy_from_slice(literals);
                closing.literal_added = true;
                at += nliteral as usize;
            }
            bundle += 1;
            bundle_start = instrs.len();
        }
    }
    Some(instrs)
}

/// Renders decoded blocks as text, one CF instruction per line followed by its clause.
pub fn dump(blocks: &[CfBlock]) -> String {
    Listing(blocks).to_string()
}

struct Listing<'a>(&'a [CfBlock]);

const CHANNELS: [char; 4] = ['x', 'y', 'z', 'w'];

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for cf in self.0 {
            write!(f, "{:04} {:<16}", cf.id, cf.op.name())?;
            match cf.op.encoding() {
                CfEncoding::Alu => {
                    write!(f, " ADDR:{} CNT:{}", cf.addr.unwrap_or(0), cf.ndw / 2)?;
                    for (i, kc) in cf.kcache.iter().enumerate() {
                        if kc.mode != 0 {
                            write!(f, " KC{i}:{}@{}", kc.bank, kc.addr * 16)?;
                        }
                    }
                    if cf.waterfall {
                        f.write_str(" WATERFALL")?;
                    }
                    writeln!(f)?;
                    for alu in cf.alu() {
                        write_alu(f, alu)?;
                    }
                }
                CfEncoding::Fetch => {
                    writeln!(f, " ADDR:{} CNT:{}", cf.addr.unwrap_or(0), cf.ndw / 4)?;
                    for vtx in cf.vtx() {
                        writeln!(
                            f,
                            "         VFETCH R{}.{} R{}.{} BUFFER:{}",
                            vtx.dst_gpr,
                            sel_string(&vtx.dst_sel),
                            vtx.src_gpr,
                            CHANNELS[usize::from(vtx.src_sel_x & 3)],
                            vtx.buffer_id
                        )?;
                    }
                    for tex in cf.tex() {
                        writeln!(
                            f,
                            "         TEX {:#04x} R{}.{} R{}.{} RID:{} SID:{}",
                            tex.inst,
                            tex.dst_gpr,
                            sel_string(&tex.dst_sel),
                            tex.src_gpr,
                            sel_string(&tex.src_sel),
                            tex.resource_id,
                            tex.sampler_id
                        )?;
                    }
                }
                CfEncoding::Export => {
                    if let CfBody::Export(out) = &cf.body {
                        let kind = match out.export_type {
                            ExportType::Pixel => "PIXEL",
                            ExportType::Pos => "POS",
                            ExportType::Param => "PARAM",
                        };
                        write!(
                            f,
                            " {kind} {} R{}.{}",
                            out.array_base,
                            out.gpr,
                            sel_string(&out.swizzle)
                        )?;
                        if out.burst_count > 1 {
                            write!(f, " BURST:{}", out.burst_count)?;
                        }
                    }
                    if cf.end_of_program {
                        f.write_str(" EOP")?;
                    }
                    writeln!(f)?;
                }
                CfEncoding::Control => {
                    write!(f, " ADDR:{} POP:{}", cf.cf_addr, cf.pop_count)?;
                    if cf.cond != 0 {
                        write!(f, " COND:{}", cf.cond)?;
                    }
                    if cf.end_of_program {
                        f.write_str(" EOP")?;
                    }
                    writeln!(f)?;
                }
            }
        }
        Ok(())
    }
}

/// Channel selectors as letters; 4 and 5 are the constants 0 and 1, 7 masks the channel.
fn sel_string(sels: &[u8; 4]) -> String {
    sels.iter()
        .map(|&s| match s {
            0..=3 => CHANNELS[usize::from(s)],
            4 => '0',
            5 => '1',
            _ => '_',
        })
        .collect()
}

fn write_alu(f: &mut fmt::Formatter<'_>, alu: &AluInstr) -> fmt::Result {
    let chan = CHANNELS[usize::from(alu.dst.chan & 3)];
    let kind = if alu.is_op3 { "OP3" } else { "OP2" };
    write!(f, "         {} {chan}: {kind} {:#04x} ", alu.bundle, alu.inst)?;
    if alu.dst.write || alu.is_op3 {
        write!(f, "R{}.{chan}", alu.dst.sel)?;
    } else {
        f.write_str("____")?;
    }
    if alu.dst.clamp {
        f.write_str("_sat")?;
    }
    let nsrc = if alu.is_op3 { 3 } else { 2 };
    for src in &alu.src[..nsrc] {
        f.write_str(", ")?;
        write_src(f, alu, src)?;
    }
    if alu.predicate {
        f.write_str(" PRED")?;
    }
    write!(f, " BS:{}", alu.bank_swizzle.0)?;
    if alu.last {
        f.write_str(" LAST")?;
    }
    writeln!(f)?;
    if !alu.literals().is_empty() {
        write!(f, "           LITERALS")?;
        for value in alu.literals() {
            write!(f, " {value:#010x}")?;
        }
        writeln!(f)?;
    }
    Ok(())
}

fn write_src(f: &mut fmt::Formatter<'_>, alu: &AluInstr, src: &AluSrc) -> fmt::Result {
    let chan = CHANNELS[usize::from(src.chan & 3)];
    if src.neg {
        f.write_str("-")?;
    }
    if src.abs {
        f.write_str("|")?;
    }
    match src.sel {
        s if sel::is_gpr(s) => write!(f, "R{s}.{chan}")?,
        s if s < sel::KCACHE1_BASE => write!(f, "KC0[{}].{chan}", s - sel::KCACHE0_BASE)?,
        s if s < sel::KCACHE_END => write!(f, "KC1[{}].{chan}", s - sel::KCACHE1_BASE)?,
        sel::SRC_0 => f.write_str("0")?,
        sel::SRC_1 => f.write_str("1.0")?,
        sel::SRC_1_INT => f.write_str("1")?,
        sel::SRC_M_1_INT => f.write_str("-1")?,
        sel::SRC_0_5 => f.write_str("0.5")?,
        sel::LITERAL => {
            let value = alu.literals().get(usize::from(src.chan)).copied().unwrap_or(0);
            write!(f, "L.{chan}({value:#010x})")?
        }
        sel::PV => write!(f, "PV.{chan}")?,
        sel::PS => f.write_str("PS")?,
        s if sel::is_cfile(s) => write!(f, "C{}.{chan}", s - sel::CFILE_BASE)?,
        s => write!(f, "?{s}")?,
    }
    if src.rel {
        f.write_str("[AR]")?;
    }
    if src.abs {
        f.write_str("|")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alu::AluDst;
    use crate::bytecode::Bytecode;
    use crate::export::Output;
    use crate::family::ChipFamily;
    use pretty_assertions::assert_eq;

    #[test]
    fn decode_restores_blocks_and_literals() {
        let mut bc = Bytecode::new(ChipFamily::Rv770).unwrap();
        let mov = AluInstr::op2(bc.alu_opcodes().mov)
            .src(0, AluSrc::literal(1))
            .dst(AluDst::gpr(1, 0))
            .last(true);
        bc.add_alu(mov).unwrap();
        bc.add_literal(&[0x3F80_0000, 0x4000_0000, 0, 0]).unwrap();
        let mut out = Output::new(ExportType::Pixel, 0, 1);
        out.op = CfOp::ExportDone;
        out.end_of_program = true;
        bc.add_output(out).unwrap();
        let words = bc.build().unwrap().to_vec();

        let blocks = decode(ChipClass::R700, &words).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].op, CfOp::Alu);
        assert_eq!(blocks[0].ndw, 4);
        assert_eq!(blocks[0].alu()[0].literals(), &[0x3F80_0000, 0x4000_0000]);
        assert_eq!(blocks[1].output().unwrap().gpr, 1);
        assert!(blocks[1].end_of_program);
    }

    #[test]
    fn truncated_input_is_malformed() {
        assert!(matches!(
            decode(ChipClass::R600, &[0]),
            Err(CompileError::MalformedBytecode { offset: 0, .. })
        ));
        // An ALU clause pointing past the buffer.
        let words = [100 >> 1, (0x8 << 26) | (1 << 31)];
        assert!(matches!(
            decode(ChipClass::R600, &words),
            Err(CompileError::MalformedBytecode { offset: 100, .. })
        ));
    }

    #[test]
    fn selector_names() {
        assert_eq!(sel_string(&[0, 1, 2, 3]), "xyzw");
        assert_eq!(sel_string(&[2, 7, 7, 7]), "z___");
        assert_eq!(sel_string(&[4, 5, 7, 0]), "01_x");
    }
}
