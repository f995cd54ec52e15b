//! The bytecode program container: CF blocks, the instruction-kind builders and the two-pass
//! address resolver.
//!
//! Blocks live in one append-only arena (`Vec<CfBlock>`). Control-flow fixups refer to blocks by
//! index, so the lowering code can patch an earlier block's target while later blocks are still
//! being appended.

use std::mem;

use tracing::debug;

use crate::alu::{sel, AluInstr};
use crate::bank_swizzle;
use crate::cf_stack::{CallStack, FlowStack};
use crate::encode;
use crate::error::CompileError;
use crate::export::Output;
use crate::family::{ChipClass, ChipFamily};
use crate::fetch::{TexInstr, VtxInstr};
use crate::isa::{cond, AluOpcodes, CfEncoding, CfOp};
use crate::limits::{MAX_ALU_SLOTS_PER_BLOCK, MAX_BUNDLE_SIZE, MAX_FETCH_PER_BLOCK};

/// One kcache window of an ALU clause header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Kcache {
    pub bank: u32,
    pub mode: u32,
    /// Window start in units of 16 constants.
    pub addr: u32,
}

/// ALU clause flavour, selected by the CF instruction that opens the clause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AluClause {
    #[default]
    Alu,
    PushBefore,
    PopAfter,
    Pop2After,
}

impl AluClause {
    pub fn cf_op(self) -> CfOp {
        match self {
            Self::Alu => CfOp::Alu,
            Self::PushBefore => CfOp::AluPushBefore,
            Self::PopAfter => CfOp::AluPopAfter,
            Self::Pop2After => CfOp::AluPop2After,
        }
    }
}

/// Instructions owned by a CF block. Control instructions have no body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CfBody {
    #[default]
    None,
    Alu(Vec<AluInstr>),
    Vtx(Vec<VtxInstr>),
    Tex(Vec<TexInstr>),
    Export(Output),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfBlock {
    pub op: CfOp,
    /// Dword offset of the two CF header words.
    pub id: u32,
    /// Dword address of the clause body, resolved by [`Bytecode::build`].
    pub addr: Option<u32>,
    /// Dwords in the clause body, literals included.
    pub ndw: u32,
    /// Jump target of control instructions, in dwords.
    pub cf_addr: u32,
    pub pop_count: u32,
    pub cond: u32,
    pub barrier: bool,
    pub end_of_program: bool,
    /// R600 ALU clauses that index constants with `AR` need the waterfall bit.
    pub waterfall: bool,
    pub kcache: [Kcache; 2],
    pub body: CfBody,
}

impl CfBlock {
    pub fn new(op: CfOp) -> Self {
        Self {
            op,
            id: 0,
            addr: None,
            ndw: 0,
            cf_addr: 0,
            pop_count: 0,
            cond: cond::ACTIVE,
            barrier: true,
            end_of_program: false,
            waterfall: false,
            kcache: [Kcache::default(); 2],
            body: CfBody::None,
        }
    }

    pub fn alu(&self) -> &[AluInstr] {
        match &self.body {
            CfBody::Alu(instrs) => instrs,
            _ => &[],
        }
    }

    pub fn tex(&self) -> &[TexInstr] {
        match &self.body {
            CfBody::Tex(instrs) => instrs,
            _ => &[],
        }
    }

    pub fn vtx(&self) -> &[VtxInstr] {
        match &self.body {
            CfBody::Vtx(instrs) => instrs,
            _ => &[],
        }
    }

    pub fn output(&self) -> Result<&Output, CompileError> {
        match &self.body {
            CfBody::Export(out) => Ok(out),
            _ => Err(CompileError::Internal("export CF block without an output")),
        }
    }

    /// Whether `body` can be appended to this block without changing its instruction kind.
    fn holds(&self, op: CfOp, body: &CfBody) -> bool {
        self.op == op && mem::discriminant(&self.body) == mem::discriminant(body)
    }
}

/// A shader program under construction.
///
/// Builders append to the last CF block when they can and open a new one when the instruction
/// kind changes, a block is full, or [`Bytecode::force_new_cf`] was called. [`Bytecode::build`]
/// then resolves every block address and encodes the flat dword buffer.
#[derive(Debug)]
pub struct Bytecode {
    class: ChipClass,
    ops: &'static AluOpcodes,
    pub(crate) cf: Vec<CfBlock>,
    ngpr: u32,
    nstack: u32,
    ndw: u32,
    force_add_cf: bool,
    /// Id given to the next ALU instruction; bumped whenever a bundle closes.
    bundle: u32,
    kcache: [Kcache; 2],
    pub(crate) flow: FlowStack,
    pub(crate) callstack: CallStack,
    bytecode: Vec<u32>,
}

impl Bytecode {
    pub fn new(family: ChipFamily) -> Result<Self, CompileError> {
        let class = family.class()?;
        Ok(Self {
            class,
            ops: AluOpcodes::for_class(class),
            cf: Vec::new(),
            ngpr: 0,
            nstack: 0,
            ndw: 0,
            force_add_cf: false,
            bundle: 0,
            kcache: [Kcache::default(); 2],
            flow: FlowStack::default(),
            callstack: CallStack::default(),
            bytecode: Vec::new(),
        })
    }

    /// Drops every block and counter, keeping the class.
    pub fn clear(&mut self) {
        self.cf.clear();
        self.ngpr = 0;
        self.nstack = 0;
        self.ndw = 0;
        self.force_add_cf = false;
        self.bundle = 0;
        self.kcache = [Kcache::default(); 2];
        self.flow = FlowStack::default();
        self.callstack = CallStack::default();
        self.bytecode.clear();
    }

    pub fn class(&self) -> ChipClass {
        self.class
    }

    pub fn alu_opcodes(&self) -> &'static AluOpcodes {
        self.ops
    }

    pub fn blocks(&self) -> &[CfBlock] {
        &self.cf
    }

    /// Highest GPR index used plus one.
    pub fn ngpr(&self) -> u32 {
        self.ngpr
    }

    /// Stack entries to allocate, valid after [`Bytecode::build`].
    pub fn nstack(&self) -> u32 {
        self.nstack
    }

    /// Total program size in dwords, valid after [`Bytecode::build`].
    pub fn ndw(&self) -> u32 {
        self.ndw
    }

    /// Encoded program, empty until [`Bytecode::build`] succeeds.
    pub fn bytecode(&self) -> &[u32] {
        &self.bytecode
    }

    /// Moves the encoded program out, leaving the builder's buffer empty.
    pub fn take_bytecode(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.bytecode)
    }

    /// Kcache windows stamped on every ALU clause opened from now on.
    pub fn set_kcache(&mut self, kcache: [Kcache; 2]) {
        self.kcache = kcache;
    }

    /// Makes the next builder call open a new CF block.
    pub fn force_new_cf(&mut self) {
        self.force_add_cf = true;
    }

    /// Sets the waterfall bit on the current ALU clause (R600 relative constant addressing).
    pub fn mark_waterfall(&mut self) {
        if let Some(cf) = self.cf.last_mut() {
            if cf.op.encoding() == CfEncoding::Alu {
                cf.waterfall = true;
            }
        }
    }

    /// Appends `cf` as a new block, assigning its header id.
    fn push_cf(&mut self, mut cf: CfBlock) -> Result<usize, CompileError> {
        self.cf.try_reserve(1)?;
        cf.id = self.cf.last().map_or(0, |last| last.id + 2);
        debug!(op = cf.op.name(), id = cf.id, "new CF block");
        self.cf.push(cf);
        self.force_add_cf = false;
        Ok(self.cf.len() - 1)
    }

    /// Number of instructions of the bundle currently being filled.
    fn open_bundle_len(&self) -> usize {
        let Some(instrs) = self.cf.last().map(CfBlock::alu) else {
            return 0;
        };
        match instrs.last() {
            Some(last) if !last.last => instrs
                .iter()
                .rev()
                .take_while(|alu| alu.bundle == self.bundle)
                .count(),
            _ => 0,
        }
    }

    pub fn add_alu(&mut self, alu: AluInstr) -> Result<(), CompileError> {
        self.add_alu_clause(alu, AluClause::Alu)
    }

    /// Appends one ALU instruction to a clause of the given flavour.
    ///
    /// Instructions join the open bundle until one is marked `last`; closing a bundle assigns
    /// its bank swizzles and shares the literal pool size across its members.
    pub fn add_alu_clause(&mut self, mut alu: AluInstr, clause: AluClause) -> Result<(), CompileError> {
        let op = clause.cf_op();
        let open = self.open_bundle_len();
        let new_cf = self.force_add_cf
            || self
                .cf
                .last()
                .map_or(true, |cf| !cf.holds(op, &CfBody::Alu(Vec::new())));
        if open > 0 && new_cf {
            return Err(CompileError::Internal("ALU clause changed inside an open bundle"));
        }
        if open >= MAX_BUNDLE_SIZE {
            return Err(CompileError::Internal("more than five instructions in one ALU bundle"));
        }

        alu.bundle = self.bundle;
        alu.nliteral = alu.literal_need();
        if open > 0 {
            if let Some(prev) = self.cf.last().and_then(|cf| cf.alu().last()) {
                alu.nliteral = alu.nliteral.max(prev.nliteral);
            }
        }

        if new_cf {
            let mut instrs = Vec::new();
            instrs.try_reserve(1)?;
            let mut cf = CfBlock::new(op);
            cf.kcache = self.kcache;
            cf.body = CfBody::Alu(instrs);
            self.push_cf(cf)?;
        }
        let ngpr = self.gpr_usage(&alu);
        let last = alu.last;
        let bundle_id = self.bundle;
        let ops = self.ops;
        let Some(cf) = self.cf.last_mut() else {
            return Err(CompileError::Internal("no ALU clause to append to"));
        };
        let CfBody::Alu(instrs) = &mut cf.body else {
            return Err(CompileError::Internal("ALU instruction appended to a non-ALU block"));
        };
        instrs.try_reserve(1)?;
        instrs.push(alu);
        cf.ndw += 2;
        self.ngpr = self.ngpr.max(ngpr);

        if last {
            let start = instrs
                .iter()
                .rposition(|alu| alu.bundle != bundle_id)
                .map_or(0, |pos| pos + 1);
            let bundle = &mut instrs[start..];
            let nliteral = bundle.iter().map(|alu| alu.nliteral).max().unwrap_or(0);
            for alu in bundle.iter_mut() {
                alu.nliteral = nliteral;
            }
            bank_swizzle::resolve(bundle, ops, bundle_id)?;
            self.bundle += 1;
            if cf.ndw / 2 >= MAX_ALU_SLOTS_PER_BLOCK {
                self.force_add_cf = true;
            }
        }
        Ok(())
    }

    fn gpr_usage(&self, alu: &AluInstr) -> u32 {
        let nsrc = self.ops.num_operands(alu.inst, alu.is_op3);
        alu.src[..nsrc]
            .iter()
            .map(|src| src.sel)
            .chain((alu.dst.write || alu.is_op3).then_some(alu.dst.sel))
            .filter(|&sel| sel::is_gpr(sel))
            .map(|sel| sel + 1)
            .max()
            .unwrap_or(0)
    }

    /// Attaches the literal words of the bundle that was just closed.
    ///
    /// Does nothing unless the last instruction of the current block closes a bundle, needs
    /// literals and has not received them yet, so callers may offer literals after every
    /// instruction.
    pub fn add_literal(&mut self, value: &[u32; 4]) -> Result<(), CompileError> {
        let Some(cf) = self.cf.last_mut() else {
            return Ok(());
        };
        let CfBody::Alu(instrs) = &mut cf.body else {
            return Ok(());
        };
        let Some(alu) = instrs.last_mut() else {
            return Ok(());
        };
        if !alu.last || alu.nliteral == 0 || alu.literal_added {
            return Ok(());
        }
        alu.value = *value;
        alu.literal_added = true;
        cf.ndw += alu.nliteral;
        if cf.ndw / 2 >= MAX_ALU_SLOTS_PER_BLOCK {
            self.force_add_cf = true;
        }
        Ok(())
    }

    pub fn add_vtx(&mut self, vtx: VtxInstr) -> Result<(), CompileError> {
        let gprs = vtx.src_gpr.max(vtx.dst_gpr) + 1;
        self.add_fetch(self.class.vertex_fetch_op(), CfBody::Vtx(Vec::new()), gprs, |body| {
            if let CfBody::Vtx(instrs) = body {
                instrs.try_reserve(1)?;
                instrs.push(vtx);
            }
            Ok(())
        })
    }

    pub fn add_tex(&mut self, tex: TexInstr) -> Result<(), CompileError> {
        let gprs = tex.src_gpr.max(tex.dst_gpr) + 1;
        self.add_fetch(CfOp::Tex, CfBody::Tex(Vec::new()), gprs, |body| {
            if let CfBody::Tex(instrs) = body {
                instrs.try_reserve(1)?;
                instrs.push(tex);
            }
            Ok(())
        })
    }

    fn add_fetch(
        &mut self,
        op: CfOp,
        empty: CfBody,
        gprs: u32,
        push: impl FnOnce(&mut CfBody) -> Result<(), CompileError>,
    ) -> Result<(), CompileError> {
        let new_cf = self.force_add_cf || self.cf.last().map_or(true, |cf| !cf.holds(op, &empty));
        if self.open_bundle_len() > 0 {
            return Err(CompileError::Internal("fetch instruction inside an open ALU bundle"));
        }
        if new_cf {
            let mut cf = CfBlock::new(op);
            cf.body = empty;
            self.push_cf(cf)?;
        }
        let Some(cf) = self.cf.last_mut() else {
            return Err(CompileError::Internal("no fetch clause to append to"));
        };
        push(&mut cf.body)?;
        cf.ndw += 4;
        self.ngpr = self.ngpr.max(gprs);
        if cf.ndw / 4 >= MAX_FETCH_PER_BLOCK {
            self.force_add_cf = true;
        }
        Ok(())
    }

    /// Appends an export. Exports are never batched.
    pub fn add_output(&mut self, output: Output) -> Result<usize, CompileError> {
        let mut cf = CfBlock::new(output.op);
        cf.barrier = output.barrier;
        cf.body = CfBody::Export(output);
        self.push_cf(cf)
    }

    /// Appends a bare control instruction as its own block and returns its index.
    pub fn add_cfinst(&mut self, op: CfOp) -> Result<usize, CompileError> {
        if self.open_bundle_len() > 0 {
            return Err(CompileError::Internal("control instruction inside an open ALU bundle"));
        }
        self.push_cf(CfBlock::new(op))
    }

    /// Resolves block addresses and encodes the program.
    pub fn build(&mut self) -> Result<&[u32], CompileError> {
        if self.open_bundle_len() > 0 {
            return Err(CompileError::Internal("ALU bundle left open"));
        }
        if let Some(kind) = self.flow.top_kind() {
            return Err(CompileError::UnbalancedControlFlow {
                expected: "end of program",
                found: kind.name(),
            });
        }
        let max = self.callstack.max();
        self.nstack = if max > 0 { ((max + 3) >> 2) + 2 } else { 0 };

        // Pass 1: clause bodies follow the CF headers; fetch clauses are 16-byte aligned.
        let mut addr = self.cf.last().map_or(0, |cf| cf.id + 2);
        for cf in &mut self.cf {
            match cf.op.encoding() {
                CfEncoding::Fetch => {
                    addr = (addr + 3) & !3;
                    cf.addr = Some(addr);
                }
                CfEncoding::Alu => cf.addr = Some(addr),
                CfEncoding::Export | CfEncoding::Control => {}
            }
            addr += cf.ndw;
        }
        self.ndw = addr;

        // Pass 2: encode into a zeroed buffer of exactly the program size.
        let mut bytecode = Vec::new();
        bytecode.try_reserve_exact(addr as usize)?;
        bytecode.resize(addr as usize, 0);
        for (index, cf) in self.cf.iter().enumerate() {
            let header = encode::encode_cf(self.class, cf)?;
            write_words(&mut bytecode, cf.id, &header)?;
            let Some(mut at) = cf.addr else {
                continue;
            };
            match &cf.body {
                CfBody::Alu(instrs) => {
                    for alu in instrs {
                        write_words(&mut bytecode, at, &encode::encode_alu(self.class, alu))?;
                        at += 2;
                        if alu.last && alu.nliteral > 0 {
                            if !alu.literal_added {
                                return Err(CompileError::MissingLiterals { block: index });
                            }
                            write_words(&mut bytecode, at, alu.literals())?;
                            at += alu.nliteral;
                        }
                    }
                }
                CfBody::Vtx(instrs) => {
                    for vtx in instrs {
                        write_words(&mut bytecode, at, &vtx.encode())?;
                        at += 4;
                    }
                }
                CfBody::Tex(instrs) => {
                    for tex in instrs {
                        write_words(&mut bytecode, at, &tex.encode())?;
                        at += 4;
                    }
                }
                CfBody::Export(_) | CfBody::None => {}
            }
        }
        debug!(
            ncf = self.cf.len(),
            ndw = self.ndw,
            ngpr = self.ngpr,
            nstack = self.nstack,
            "built shader bytecode"
        );
        self.bytecode = bytecode;
        Ok(&self.bytecode)
    }
}

fn write_words(buffer: &mut [u32], at: u32, words: &[u32]) -> Result<(), CompileError> {
    let start = at as usize;
    buffer
        .get_mut(start..start + words.len())
        .ok_or(CompileError::Internal("encoded words past the end of the program"))?
        .copy_from_slice(words);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alu::{AluDst, AluSrc};
    use pretty_assertions::assert_eq;

    fn bc(family: ChipFamily) -> Bytecode {
        Bytecode::new(family).unwrap()
    }

    fn mov(dst: u32, src: AluSrc, last: bool) -> AluInstr {
        AluInstr::op2(0x19)
            .src(0, src)
            .dst(AluDst::gpr(dst, 0))
            .last(last)
    }

    #[test]
    fn unknown_family_is_rejected() {
        assert!(matches!(
            Bytecode::new(ChipFamily::from_raw(5)),
            Err(CompileError::UnsupportedFamily(5))
        ));
    }

    #[test]
    fn consecutive_alu_share_a_block() {
        let mut bc = bc(ChipFamily::Rv770);
        bc.add_alu(mov(1, AluSrc::gpr(0, 0), true)).unwrap();
        bc.add_alu(mov(2, AluSrc::gpr(1, 0), true)).unwrap();
        assert_eq!(bc.blocks().len(), 1);
        assert_eq!(bc.blocks()[0].ndw, 4);
        assert_eq!(bc.ngpr(), 3);
        let bundles: Vec<u32> = bc.blocks()[0].alu().iter().map(AluInstr::bundle).collect();
        assert_eq!(bundles, [0, 1]);
    }

    #[test]
    fn clause_flavour_change_opens_a_block() {
        let mut bc = bc(ChipFamily::Rv770);
        bc.add_alu(mov(1, AluSrc::gpr(0, 0), true)).unwrap();
        bc.add_alu_clause(mov(1, AluSrc::gpr(0, 0), true), AluClause::PushBefore)
            .unwrap();
        let ops: Vec<CfOp> = bc.blocks().iter().map(|cf| cf.op).collect();
        assert_eq!(ops, [CfOp::Alu, CfOp::AluPushBefore]);
        assert_eq!(bc.blocks()[1].id, 2);
    }

    #[test]
    fn literal_pool_is_shared_by_the_bundle() {
        let mut bc = bc(ChipFamily::Rv770);
        bc.add_alu(mov(1, AluSrc::literal(2), false)).unwrap();
        bc.add_alu(
            mov(2, AluSrc::gpr(3, 0), true).dst(AluDst::gpr(2, 1)),
        )
        .unwrap();
        let instrs = bc.blocks()[0].alu();
        assert!(instrs.iter().all(|alu| alu.nliteral() == 4));
        bc.add_literal(&[1, 2, 3, 4]).unwrap();
        // A second offer is ignored.
        bc.add_literal(&[9, 9, 9, 9]).unwrap();
        assert_eq!(bc.blocks()[0].ndw, 8);
        assert_eq!(bc.blocks()[0].alu()[1].literals(), &[1, 2, 3, 4]);
    }

    #[test]
    fn literal_offer_without_need_is_a_noop() {
        let mut bc = bc(ChipFamily::R600);
        bc.add_literal(&[1, 2, 3, 4]).unwrap();
        bc.add_alu(mov(1, AluSrc::gpr(0, 0), true)).unwrap();
        bc.add_literal(&[1, 2, 3, 4]).unwrap();
        assert_eq!(bc.blocks()[0].ndw, 2);
        bc.add_tex(TexInstr::default()).unwrap();
        bc.add_literal(&[1, 2, 3, 4]).unwrap();
        assert_eq!(bc.blocks()[1].ndw, 4);
    }

    #[test]
    fn sixth_instruction_in_a_bundle_fails() {
        let mut bc = bc(ChipFamily::Rv770);
        for chan in 0..5u8 {
            bc.add_alu(mov(1, AluSrc::gpr(0, chan % 4), false).dst(AluDst::gpr(1, chan % 4)))
                .unwrap();
        }
        assert!(matches!(
            bc.add_alu(mov(1, AluSrc::gpr(0, 0), true)),
            Err(CompileError::Internal(_))
        ));
    }

    #[test]
    fn fetch_blocks_hold_eight_instructions() {
        let mut bc = bc(ChipFamily::Cypress);
        for _ in 0..9 {
            bc.add_tex(TexInstr::default()).unwrap();
        }
        let sizes: Vec<u32> = bc.blocks().iter().map(|cf| cf.ndw / 4).collect();
        assert_eq!(sizes, [8, 1]);
    }

    #[test]
    fn cayman_vertex_fetch_uses_the_texture_clause() {
        let mut bc = bc(ChipFamily::Cayman);
        bc.add_vtx(VtxInstr::fetch(0, 0, 1)).unwrap();
        bc.add_tex(TexInstr::default()).unwrap();
        let ops: Vec<CfOp> = bc.blocks().iter().map(|cf| cf.op).collect();
        assert_eq!(ops, [CfOp::Tex, CfOp::Tex]);
        assert_eq!(bc.blocks()[0].vtx().len(), 1);
    }

    #[test]
    fn fetch_clauses_are_aligned() {
        let mut bc = bc(ChipFamily::Rv770);
        bc.add_alu(mov(1, AluSrc::gpr(0, 0), true)).unwrap();
        bc.add_tex(TexInstr::default()).unwrap();
        bc.add_output(Output::new(crate::export::ExportType::Pixel, 0, 1))
            .unwrap();
        let words = bc.build().unwrap().len();
        // Three headers (6 dwords), ALU at 6..8, TEX aligned from 8 to 12.
        assert_eq!(bc.blocks()[0].addr, Some(6));
        assert_eq!(bc.blocks()[1].addr, Some(8));
        assert_eq!(words, 12);
    }

    #[test]
    fn missing_literal_fails_the_build() {
        let mut bc = bc(ChipFamily::Rv770);
        bc.add_alu(mov(1, AluSrc::literal(0), true)).unwrap();
        assert!(matches!(
            bc.build(),
            Err(CompileError::MissingLiterals { block: 0 })
        ));
    }

    #[test]
    fn clear_is_idempotent() {
        let mut bc = bc(ChipFamily::Rv770);
        bc.add_alu(mov(1, AluSrc::gpr(0, 0), true)).unwrap();
        bc.clear();
        bc.clear();
        assert!(bc.blocks().is_empty());
        assert_eq!(bc.ngpr(), 0);
        assert_eq!(bc.build().unwrap(), &[] as &[u32]);
    }
}
