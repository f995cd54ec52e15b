//! Per-opcode lowering of IR instructions into ALU bundles, fetches and control flow.
//!
//! Every routine has the [`crate::dispatch::EmitFn`] shape. Sources are resolved into
//! [`Operand`]s before the routine runs, with surplus constant and literal operands already
//! moved into scratch registers.

use crate::alu::{sel, AluDst, AluInstr, AluSrc};
use crate::dispatch::OpInfo;
use crate::error::CompileError;
use crate::family::ChipClass;
use crate::fetch::{TexInstr, SEL_MASK};
use crate::ir::{Instruction, Opcode, RegisterFile, SrcRegister, TextureTarget, WriteMask};
use crate::isa::{evergreen, r600, tex, CfOp};
use crate::limits::{MAX_CFILE_CONSTANTS, MAX_KCACHE_CONSTANTS};
use crate::options::ConstantMode;
use crate::translate::Ctx;

/// A resolved source register: selector and modifiers plus the IR swizzle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Operand {
    pub(crate) base: AluSrc,
    pub(crate) swizzle: [u8; 4],
    /// Literal words backing a [`sel::LITERAL`] operand.
    pub(crate) value: [u32; 4],
}

impl Operand {
    /// Component `i` of the operand after swizzling.
    pub(crate) fn chan(&self, i: usize) -> AluSrc {
        AluSrc {
            chan: self.swizzle[i],
            ..self.base
        }
    }

    fn is_literal(&self) -> bool {
        self.base.sel == sel::LITERAL
    }

    fn is_constant(&self) -> bool {
        sel::is_kcache(self.base.sel) || sel::is_cfile(self.base.sel)
    }

    fn gpr(reg: u32) -> Self {
        Self {
            base: AluSrc::gpr(reg, 0),
            swizzle: [0, 1, 2, 3],
            value: [0; 4],
        }
    }
}

const FLOAT_ONE: u32 = 0x3F80_0000;
const FLOAT_HALF: u32 = 0x3F00_0000;
const FLOAT_ONE_AND_HALF: u32 = 0x3FC0_0000;
/// 1 / (2 * pi)
const FLOAT_INV_TWO_PI: u32 = 0x3E22_F983;
const FLOAT_TWO_PI: u32 = 0x40C9_0FDB;
const FLOAT_MINUS_PI: u32 = 0xC049_0FDB;

fn write_mask(inst: &Instruction) -> WriteMask {
    inst.dst.first().map_or(WriteMask::empty(), |dst| dst.write_mask)
}

/// Highest written channel, or `None` when nothing is written.
fn last_channel(mask: WriteMask) -> Option<usize> {
    (0..4).rev().find(|&i| mask.has_channel(i))
}

fn special_constant(value: u32) -> Option<AluSrc> {
    Some(match value {
        0 => AluSrc::inline(sel::SRC_0),
        1 => AluSrc::inline(sel::SRC_1_INT),
        0xFFFF_FFFF => AluSrc::inline(sel::SRC_M_1_INT),
        FLOAT_ONE => AluSrc::inline(sel::SRC_1),
        FLOAT_HALF => AluSrc::inline(sel::SRC_0_5),
        0xBF80_0000 => AluSrc::inline(sel::SRC_1).negate(),
        0xBF00_0000 => AluSrc::inline(sel::SRC_0_5).negate(),
        _ => return None,
    })
}

impl Ctx<'_> {
    /// Resolves the sources of `inst` into [`Ctx::src`] and splits operands the ALU cannot
    /// read together.
    pub(crate) fn load_sources(&mut self, inst: &Instruction) -> Result<(), CompileError> {
        self.src.clear();
        self.src.try_reserve(inst.src.len())?;
        for src in &inst.src {
            let operand = self.operand(src)?;
            self.src.push(operand);
        }
        if matches!(inst.opcode, Opcode::Sin | Opcode::Cos | Opcode::Scs) {
            // Range reduction needs the literal pool for itself.
            for i in 0..self.src.len() {
                if self.src[i].is_literal() {
                    self.move_to_temp(i)?;
                }
            }
            self.value = [0; 4];
            return Ok(());
        }
        self.split_sources()
    }

    fn operand(&self, src: &SrcRegister) -> Result<Operand, CompileError> {
        let mut base = AluSrc {
            neg: src.negate,
            abs: src.absolute,
            rel: src.indirect,
            ..AluSrc::default()
        };
        let mut operand = Operand {
            swizzle: src.swizzle,
            ..Operand::default()
        };
        let index = u32::try_from(src.index)
            .map_err(|_| CompileError::UnsupportedOperand("negative register index"))?;
        match src.file {
            RegisterFile::Temporary | RegisterFile::Input | RegisterFile::Output => {
                base.sel = self.gpr(src.file, index)?;
            }
            RegisterFile::Constant => match self.constant_mode {
                ConstantMode::Kcache => {
                    if src.indirect {
                        return Err(CompileError::UnsupportedOperand(
                            "indirect constant through kcache",
                        ));
                    }
                    if index >= MAX_KCACHE_CONSTANTS {
                        return Err(CompileError::ConstantOutOfRange {
                            index,
                            max: MAX_KCACHE_CONSTANTS,
                        });
                    }
                    base.sel = sel::KCACHE0_BASE + index;
                }
                ConstantMode::ConstantFile => {
                    if index >= MAX_CFILE_CONSTANTS {
                        return Err(CompileError::ConstantOutOfRange {
                            index,
                            max: MAX_CFILE_CONSTANTS,
                        });
                    }
                    base.sel = sel::CFILE_BASE + index;
                }
            },
            RegisterFile::Immediate => {
                let value = *self
                    .immediates
                    .get(index as usize)
                    .ok_or(CompileError::UnsupportedOperand("undeclared immediate"))?;
                let replicated = src.swizzle.iter().all(|&c| c == src.swizzle[0]);
                let special = (self.options.inline_special_constants && replicated)
                    .then(|| special_constant(value[usize::from(src.swizzle[0] & 3)]))
                    .flatten();
                match special {
                    Some(inline) => {
                        base.sel = inline.sel;
                        base.neg ^= inline.neg;
                        operand.swizzle = [0; 4];
                    }
                    None => {
                        base.sel = sel::LITERAL;
                        operand.value = value;
                    }
                }
            }
            RegisterFile::Sampler => base.sel = index,
            file @ (RegisterFile::Address | RegisterFile::Null) => {
                return Err(CompileError::UnsupportedFile(file))
            }
        }
        operand.base = base;
        Ok(operand)
    }

    /// Copies source `i` into a scratch register, keeping its swizzle and modifiers.
    fn move_to_temp(&mut self, i: usize) -> Result<(), CompileError> {
        let operand = self.src[i];
        let reg = self.get_temp();
        self.value = operand.value;
        for chan in 0..4u8 {
            let raw = AluSrc {
                sel: operand.base.sel,
                chan,
                rel: operand.base.rel,
                ..AluSrc::default()
            };
            self.alu(
                AluInstr::op2(self.ops.mov)
                    .src(0, raw)
                    .dst(AluDst::gpr(reg, chan))
                    .last(chan == 3),
            )?;
        }
        let moved = &mut self.src[i];
        moved.base.sel = reg;
        moved.base.rel = false;
        moved.value = [0; 4];
        Ok(())
    }

    /// Leaves at most one distinct constant and one distinct literal among the sources.
    fn split_sources(&mut self) -> Result<(), CompileError> {
        let constants: Vec<usize> = (0..self.src.len())
            .filter(|&i| self.src[i].is_constant())
            .collect();
        if let Some((&keep, rest)) = constants.split_last() {
            for &i in rest {
                if self.src[i].base.sel != self.src[keep].base.sel {
                    self.move_to_temp(i)?;
                }
            }
        }

        let literals: Vec<usize> = (0..self.src.len())
            .filter(|&i| self.src[i].is_literal())
            .collect();
        if let Some((&keep, rest)) = literals.split_last() {
            for &i in rest {
                if self.src[i].value != self.src[keep].value {
                    self.move_to_temp(i)?;
                }
            }
            self.value = self.src[keep].value;
        }
        Ok(())
    }

    /// Destination channel `chan` of `inst`.
    pub(crate) fn dst(&self, inst: &Instruction, chan: u8) -> Result<AluDst, CompileError> {
        let dst = inst
            .dst
            .first()
            .ok_or(CompileError::UnsupportedOperand("missing destination"))?;
        match dst.file {
            RegisterFile::Address | RegisterFile::Null => Ok(AluDst::slot(chan)),
            RegisterFile::Temporary | RegisterFile::Output => Ok(AluDst {
                sel: self.gpr(dst.file, dst.index)?,
                chan,
                write: dst.write_mask.has_channel(usize::from(chan)),
                clamp: inst.saturate,
                rel: dst.indirect,
            }),
            file => Err(CompileError::UnsupportedFile(file)),
        }
    }

    fn temp(&self, chan: u8) -> AluDst {
        AluDst::gpr(self.temp_reg, chan)
    }

    fn temp_src(&self, chan: u8) -> AluSrc {
        AluSrc::gpr(self.temp_reg, chan)
    }

    /// Emits a transcendental instruction in a bundle of its own.
    ///
    /// Cayman has no trans unit: the instruction is replicated over the vector slots and only
    /// the requested channel is written.
    fn scalar(&mut self, alu: AluInstr) -> Result<(), CompileError> {
        if !self.class.is_vliw4() {
            return self.alu(alu.last(true));
        }
        let chan = alu.dst.chan;
        let slots = if chan == 3 { 4 } else { 3 };
        for slot in 0..slots {
            let mut copy = alu.clone();
            copy.dst.chan = slot;
            copy.dst.write = alu.dst.write && slot == chan;
            self.alu(copy.last(slot == slots - 1))?;
        }
        Ok(())
    }

    /// Writes `temp.x` to every masked channel of the destination.
    fn replicate_temp_x(&mut self, inst: &Instruction) -> Result<(), CompileError> {
        for i in 0..4u8 {
            let alu = AluInstr::op2(self.ops.mov)
                .src(0, self.temp_src(0))
                .dst(self.dst(inst, i)?)
                .last(i == 3);
            self.alu(alu)?;
        }
        Ok(())
    }

    /// Writes `temp.i` to the masked channels, padding the bundle with NOPs.
    fn copy_temp(&mut self, inst: &Instruction) -> Result<(), CompileError> {
        let mask = write_mask(inst);
        for i in 0..4u8 {
            let alu = if mask.has_channel(usize::from(i)) {
                AluInstr::op2(self.ops.mov)
                    .src(0, self.temp_src(i))
                    .dst(self.dst(inst, i)?)
            } else {
                AluInstr::op2(self.ops.nop).dst(AluDst::slot(i))
            };
            self.alu(alu.last(i == 3))?;
        }
        Ok(())
    }

    /// Loads `operand` into `reg` so a fetch can read it with an identity swizzle.
    fn load_gpr(&mut self, operand: Operand, reg: u32) -> Result<(), CompileError> {
        self.value = operand.value;
        for i in 0..4u8 {
            let alu = AluInstr::op2(self.ops.mov)
                .src(0, operand.chan(usize::from(i)))
                .dst(AluDst::gpr(reg, i))
                .last(i == 3);
            self.alu(alu)?;
        }
        Ok(())
    }

    fn source(&self, i: usize) -> Result<Operand, CompileError> {
        self.src
            .get(i)
            .copied()
            .ok_or(CompileError::UnsupportedOperand("missing source operand"))
    }
}

pub(crate) fn unsupported(
    _ctx: &mut Ctx<'_>,
    inst: &Instruction,
    _info: &OpInfo,
) -> Result<(), CompileError> {
    Err(CompileError::UnsupportedOpcode(inst.opcode.raw()))
}

pub(crate) fn nop(_ctx: &mut Ctx<'_>, _inst: &Instruction, _info: &OpInfo) -> Result<(), CompileError> {
    Ok(())
}

/// Component-wise two (or one) source operation over the written channels.
pub(crate) fn op2(ctx: &mut Ctx<'_>, inst: &Instruction, info: &OpInfo) -> Result<(), CompileError> {
    let mask = write_mask(inst);
    let Some(lasti) = last_channel(mask) else {
        return Ok(());
    };
    let swap = matches!(inst.opcode, Opcode::Slt | Opcode::Sle);
    for i in (0..=lasti).filter(|&i| mask.has_channel(i)) {
        let mut alu = AluInstr::op2(info.native).dst(ctx.dst(inst, i as u8)?);
        for (j, operand) in ctx.src.iter().enumerate().take(2) {
            let mut src = operand.chan(i);
            match inst.opcode {
                Opcode::Sub if j == 1 => src = src.negate(),
                Opcode::Abs => {
                    src.abs = true;
                    src.neg = false;
                }
                _ => {}
            }
            let slot = if swap { 1 - j } else { j };
            alu = alu.src(slot, src);
        }
        ctx.alu(alu.last(i == lasti))?;
    }
    Ok(())
}

/// Three source operation over the written channels. `CMP` reorders its sources.
pub(crate) fn op3(ctx: &mut Ctx<'_>, inst: &Instruction, info: &OpInfo) -> Result<(), CompileError> {
    let mask = write_mask(inst);
    let Some(lasti) = last_channel(mask) else {
        return Ok(());
    };
    let order = if inst.opcode == Opcode::Cmp {
        [0, 2, 1]
    } else {
        [0, 1, 2]
    };
    let srcs = [ctx.source(0)?, ctx.source(1)?, ctx.source(2)?];
    for i in (0..=lasti).filter(|&i| mask.has_channel(i)) {
        let mut alu = AluInstr::op3(info.native).dst(ctx.dst(inst, i as u8)?);
        for (slot, &j) in order.iter().enumerate() {
            alu = alu.src(slot, srcs[j].chan(i));
        }
        ctx.alu(alu.last(i == lasti))?;
    }
    Ok(())
}

/// `DP2`, `DP3`, `DP4` and `DPH` as a four slot `DOT4`.
pub(crate) fn dot(ctx: &mut Ctx<'_>, inst: &Instruction, info: &OpInfo) -> Result<(), CompileError> {
    let (a, b) = (ctx.source(0)?, ctx.source(1)?);
    for i in 0..4usize {
        let mut src0 = a.chan(i);
        let mut src1 = b.chan(i);
        match inst.opcode {
            Opcode::Dp2 if i >= 2 => {
                src0 = AluSrc::inline(sel::SRC_0);
                src1 = AluSrc::inline(sel::SRC_0);
            }
            Opcode::Dp3 if i == 3 => {
                src0 = AluSrc::inline(sel::SRC_0);
                src1 = AluSrc::inline(sel::SRC_0);
            }
            Opcode::Dph if i == 3 => src0 = AluSrc::inline(sel::SRC_1),
            _ => {}
        }
        let alu = AluInstr::op2(info.native)
            .src(0, src0)
            .src(1, src1)
            .dst(ctx.dst(inst, i as u8)?)
            .last(i == 3);
        ctx.alu(alu)?;
    }
    Ok(())
}

/// Scalar transcendental of `src0.x`, replicated to the written channels.
pub(crate) fn trans(ctx: &mut Ctx<'_>, inst: &Instruction, info: &OpInfo) -> Result<(), CompileError> {
    let mut src = ctx.source(0)?.chan(0);
    if inst.opcode == Opcode::Rsq {
        src.abs = true;
    }
    if ctx.class.is_vliw4() {
        let mask = write_mask(inst);
        let slots = if mask.has_channel(3) { 4 } else { 3 };
        for i in 0..slots {
            let alu = AluInstr::op2(info.native)
                .src(0, src)
                .dst(ctx.dst(inst, i)?)
                .last(i == slots - 1);
            ctx.alu(alu)?;
        }
        return Ok(());
    }
    ctx.alu(
        AluInstr::op2(info.native)
            .src(0, src)
            .dst(ctx.temp(0))
            .last(true),
    )?;
    ctx.replicate_temp_x(inst)
}

/// Range-reduces `src0.x` into `temp.x` for `SIN`/`COS`.
fn setup_trig(ctx: &mut Ctx<'_>) -> Result<(), CompileError> {
    let src = ctx.source(0)?.chan(0);
    ctx.value = [FLOAT_INV_TWO_PI, 0, 0, 0];
    ctx.alu(
        AluInstr::op3(ctx.ops.muladd)
            .src(0, src)
            .src(1, AluSrc::literal(0))
            .src(2, AluSrc::inline(sel::SRC_0_5))
            .dst(ctx.temp(0))
            .last(true),
    )?;
    ctx.alu(
        AluInstr::op2(ctx.ops.fract)
            .src(0, ctx.temp_src(0))
            .dst(ctx.temp(0))
            .last(true),
    )?;
    let (scale, bias) = if ctx.class != ChipClass::R600 {
        (
            AluSrc::inline(sel::SRC_1),
            AluSrc::inline(sel::SRC_0_5).negate(),
        )
    } else {
        ctx.value = [FLOAT_TWO_PI, FLOAT_MINUS_PI, 0, 0];
        (AluSrc::literal(0), AluSrc::literal(1))
    };
    ctx.alu(
        AluInstr::op3(ctx.ops.muladd)
            .src(0, ctx.temp_src(0))
            .src(1, scale)
            .src(2, bias)
            .dst(ctx.temp(0))
            .last(true),
    )
}

/// `SIN`/`COS`.
pub(crate) fn trig(ctx: &mut Ctx<'_>, inst: &Instruction, info: &OpInfo) -> Result<(), CompileError> {
    setup_trig(ctx)?;
    if ctx.class.is_vliw4() {
        let slots = if write_mask(inst).has_channel(3) { 4 } else { 3 };
        for i in 0..slots {
            let alu = AluInstr::op2(info.native)
                .src(0, ctx.temp_src(0))
                .dst(ctx.dst(inst, i)?)
                .last(i == slots - 1);
            ctx.alu(alu)?;
        }
        return Ok(());
    }
    ctx.alu(
        AluInstr::op2(info.native)
            .src(0, ctx.temp_src(0))
            .dst(ctx.temp(0))
            .last(true),
    )?;
    ctx.replicate_temp_x(inst)
}

/// `SCS`: cosine in x, sine in y, 0 in z and 1 in w.
pub(crate) fn scs(ctx: &mut Ctx<'_>, inst: &Instruction, _info: &OpInfo) -> Result<(), CompileError> {
    let mask = write_mask(inst);
    if mask.intersects(WriteMask::X | WriteMask::Y) {
        setup_trig(ctx)?;
    }
    for (chan, op) in [(0u8, ctx.ops.cos), (1, ctx.ops.sin)] {
        if mask.has_channel(usize::from(chan)) {
            let alu = AluInstr::op2(op)
                .src(0, ctx.temp_src(0))
                .dst(ctx.dst(inst, chan)?);
            ctx.scalar(alu)?;
        }
    }
    for (chan, constant) in [(2u8, sel::SRC_0), (3, sel::SRC_1)] {
        if mask.has_channel(usize::from(chan)) {
            let alu = AluInstr::op2(ctx.ops.mov)
                .src(0, AluSrc::inline(constant))
                .dst(ctx.dst(inst, chan)?)
                .last(true);
            ctx.alu(alu)?;
        }
    }
    Ok(())
}

/// `LIT`: (1, max(src.x, 0), src.x > 0 ? max(src.y, 0)^src.w : 0, 1).
pub(crate) fn lit(ctx: &mut Ctx<'_>, inst: &Instruction, _info: &OpInfo) -> Result<(), CompileError> {
    let src = ctx.source(0)?;
    ctx.alu(
        AluInstr::op2(ctx.ops.mov)
            .src(0, AluSrc::inline(sel::SRC_1))
            .dst(ctx.dst(inst, 0)?),
    )?;
    ctx.alu(
        AluInstr::op2(ctx.ops.max)
            .src(0, src.chan(0))
            .src(1, AluSrc::inline(sel::SRC_0))
            .dst(ctx.dst(inst, 1)?),
    )?;
    ctx.alu(
        AluInstr::op2(ctx.ops.mov)
            .src(0, AluSrc::inline(sel::SRC_1))
            .dst(ctx.dst(inst, 3)?)
            .last(true),
    )?;

    if write_mask(inst).has_channel(2) {
        ctx.scalar(
            AluInstr::op2(ctx.ops.log_clamped)
                .src(0, src.chan(1))
                .dst(ctx.temp(2)),
        )?;
        ctx.scalar(
            AluInstr::op3(ctx.ops.mul_lit)
                .src(0, src.chan(3))
                .src(1, ctx.temp_src(2))
                .src(2, src.chan(0))
                .dst(ctx.temp(0)),
        )?;
        ctx.scalar(
            AluInstr::op2(ctx.ops.exp_ieee)
                .src(0, ctx.temp_src(0))
                .dst(ctx.dst(inst, 2)?),
        )?;
    }
    Ok(())
}

/// `POW`: exp2(src1.x * log2(src0.x)).
pub(crate) fn pow(ctx: &mut Ctx<'_>, inst: &Instruction, _info: &OpInfo) -> Result<(), CompileError> {
    let (base, exponent) = (ctx.source(0)?, ctx.source(1)?);
    ctx.scalar(
        AluInstr::op2(ctx.ops.log_ieee)
            .src(0, base.chan(0))
            .dst(ctx.temp(0)),
    )?;
    ctx.alu(
        AluInstr::op2(ctx.ops.mul_ieee)
            .src(0, exponent.chan(0))
            .src(1, ctx.temp_src(0))
            .dst(ctx.temp(0))
            .last(true),
    )?;
    ctx.scalar(
        AluInstr::op2(ctx.ops.exp_ieee)
            .src(0, ctx.temp_src(0))
            .dst(ctx.temp(0)),
    )?;
    ctx.replicate_temp_x(inst)
}

/// `LRP`: src0 * src1 + (1 - src0) * src2.
pub(crate) fn lrp(ctx: &mut Ctx<'_>, inst: &Instruction, _info: &OpInfo) -> Result<(), CompileError> {
    let mask = write_mask(inst);
    let Some(lasti) = last_channel(mask) else {
        return Ok(());
    };
    let (a, b, c) = (ctx.source(0)?, ctx.source(1)?, ctx.source(2)?);
    let channels = || (0..=lasti).filter(move |&i| mask.has_channel(i));

    for i in channels() {
        ctx.alu(
            AluInstr::op2(ctx.ops.add)
                .src(0, AluSrc::inline(sel::SRC_1))
                .src(1, a.chan(i).negate())
                .dst(ctx.temp(i as u8))
                .last(i == lasti),
        )?;
    }
    for i in channels() {
        ctx.alu(
            AluInstr::op2(ctx.ops.mul)
                .src(0, ctx.temp_src(i as u8))
                .src(1, c.chan(i))
                .dst(ctx.temp(i as u8))
                .last(i == lasti),
        )?;
    }
    for i in channels() {
        ctx.alu(
            AluInstr::op3(ctx.ops.muladd)
                .src(0, a.chan(i))
                .src(1, b.chan(i))
                .src(2, ctx.temp_src(i as u8))
                .dst(ctx.dst(inst, i as u8)?)
                .last(i == lasti),
        )?;
    }
    Ok(())
}

/// `XPD`: cross product in xyz, 1.0 in w.
pub(crate) fn xpd(ctx: &mut Ctx<'_>, inst: &Instruction, _info: &OpInfo) -> Result<(), CompileError> {
    const SWZ0: [usize; 3] = [2, 0, 1];
    const SWZ1: [usize; 3] = [1, 2, 0];
    let mask = write_mask(inst);
    let Some(lasti) = last_channel(mask) else {
        return Ok(());
    };
    let (a, b) = (ctx.source(0)?, ctx.source(1)?);

    for i in 0..3 {
        ctx.alu(
            AluInstr::op2(ctx.ops.mul)
                .src(0, a.chan(SWZ0[i]))
                .src(1, b.chan(SWZ1[i]))
                .dst(ctx.temp(i as u8))
                .last(i == 2),
        )?;
    }
    for i in (0..=lasti).filter(|&i| mask.has_channel(i)) {
        let alu = if i < 3 {
            AluInstr::op3(ctx.ops.muladd)
                .src(0, a.chan(SWZ1[i]))
                .src(1, b.chan(SWZ0[i]))
                .src(2, ctx.temp_src(i as u8).negate())
        } else {
            AluInstr::op3(ctx.ops.muladd)
                .src(0, AluSrc::inline(sel::SRC_0))
                .src(1, AluSrc::inline(sel::SRC_0))
                .src(2, AluSrc::inline(sel::SRC_1))
        };
        ctx.alu(alu.dst(ctx.dst(inst, i as u8)?).last(i == lasti))?;
    }
    Ok(())
}

/// `SSG`: sign of each component.
pub(crate) fn ssg(ctx: &mut Ctx<'_>, inst: &Instruction, _info: &OpInfo) -> Result<(), CompileError> {
    let src = ctx.source(0)?;
    for i in 0..4u8 {
        ctx.alu(
            AluInstr::op3(ctx.ops.cndgt)
                .src(0, src.chan(usize::from(i)))
                .src(1, AluSrc::inline(sel::SRC_1))
                .src(2, src.chan(usize::from(i)))
                .dst(ctx.temp(i))
                .last(i == 3),
        )?;
    }
    let mask = write_mask(inst);
    let Some(lasti) = last_channel(mask) else {
        return Ok(());
    };
    for i in (0..=lasti).filter(|&i| mask.has_channel(i)) {
        let chan = i as u8;
        ctx.alu(
            AluInstr::op3(ctx.ops.cndgt)
                .src(0, ctx.temp_src(chan).negate())
                .src(1, AluSrc::inline(sel::SRC_1).negate())
                .src(2, ctx.temp_src(chan))
                .dst(ctx.dst(inst, chan)?)
                .last(i == lasti),
        )?;
    }
    Ok(())
}

/// `DST`: (1, src0.y * src1.y, src0.z, src1.w).
pub(crate) fn dst(ctx: &mut Ctx<'_>, inst: &Instruction, _info: &OpInfo) -> Result<(), CompileError> {
    let (a, b) = (ctx.source(0)?, ctx.source(1)?);
    let one = AluSrc::inline(sel::SRC_1);
    for i in 0..4usize {
        let src0 = if i == 0 || i == 3 { one } else { a.chan(i) };
        let src1 = if i == 0 || i == 2 { one } else { b.chan(i) };
        ctx.alu(
            AluInstr::op2(ctx.ops.mul)
                .src(0, src0)
                .src(1, src1)
                .dst(ctx.dst(inst, i as u8)?)
                .last(i == 3),
        )?;
    }
    Ok(())
}

/// `EXP`: (2^floor(x), fract(x), 2^x, 1).
pub(crate) fn exp(ctx: &mut Ctx<'_>, inst: &Instruction, _info: &OpInfo) -> Result<(), CompileError> {
    let x = ctx.source(0)?.chan(0);
    let mask = write_mask(inst);
    if mask.has_channel(0) {
        ctx.alu(
            AluInstr::op2(ctx.ops.floor)
                .src(0, x)
                .dst(ctx.temp(0))
                .last(true),
        )?;
        ctx.scalar(
            AluInstr::op2(ctx.ops.exp_ieee)
                .src(0, ctx.temp_src(0))
                .dst(ctx.temp(0)),
        )?;
    }
    if mask.has_channel(1) {
        ctx.alu(
            AluInstr::op2(ctx.ops.fract)
                .src(0, x)
                .dst(ctx.temp(1))
                .last(true),
        )?;
    }
    if mask.has_channel(2) {
        ctx.scalar(AluInstr::op2(ctx.ops.exp_ieee).src(0, x).dst(ctx.temp(2)))?;
    }
    if mask.has_channel(3) {
        ctx.alu(
            AluInstr::op2(ctx.ops.mov)
                .src(0, AluSrc::inline(sel::SRC_1))
                .dst(ctx.temp(3))
                .last(true),
        )?;
    }
    ctx.copy_temp(inst)
}

/// `LOG`: (floor(log2|x|), |x| / 2^floor(log2|x|), log2|x|, 1).
pub(crate) fn log(ctx: &mut Ctx<'_>, inst: &Instruction, _info: &OpInfo) -> Result<(), CompileError> {
    let x = ctx.source(0)?.chan(0).abs();
    let mask = write_mask(inst);
    if mask.has_channel(0) {
        ctx.scalar(AluInstr::op2(ctx.ops.log_ieee).src(0, x).dst(ctx.temp(0)))?;
        ctx.alu(
            AluInstr::op2(ctx.ops.floor)
                .src(0, ctx.temp_src(0))
                .dst(ctx.temp(0))
                .last(true),
        )?;
    }
    if mask.has_channel(1) {
        ctx.scalar(AluInstr::op2(ctx.ops.log_ieee).src(0, x).dst(ctx.temp(1)))?;
        ctx.alu(
            AluInstr::op2(ctx.ops.floor)
                .src(0, ctx.temp_src(1))
                .dst(ctx.temp(1))
                .last(true),
        )?;
        for op in [ctx.ops.exp_ieee, ctx.ops.recip_ieee] {
            ctx.scalar(AluInstr::op2(op).src(0, ctx.temp_src(1)).dst(ctx.temp(1)))?;
        }
        ctx.alu(
            AluInstr::op2(ctx.ops.mul_ieee)
                .src(0, x)
                .src(1, ctx.temp_src(1))
                .dst(ctx.temp(1))
                .last(true),
        )?;
    }
    if mask.has_channel(2) {
        ctx.scalar(AluInstr::op2(ctx.ops.log_ieee).src(0, x).dst(ctx.temp(2)))?;
    }
    if mask.has_channel(3) {
        ctx.alu(
            AluInstr::op2(ctx.ops.mov)
                .src(0, AluSrc::inline(sel::SRC_1))
                .dst(ctx.temp(3))
                .last(true),
        )?;
    }
    ctx.copy_temp(inst)
}

/// `KIL` (per component `< 0`) and `KILP` (unconditional).
pub(crate) fn kill(ctx: &mut Ctx<'_>, inst: &Instruction, info: &OpInfo) -> Result<(), CompileError> {
    let src = match inst.opcode {
        Opcode::Kilp => None,
        _ => Some(ctx.source(0)?),
    };
    for i in 0..4usize {
        let threshold = src.map_or(AluSrc::inline(sel::SRC_1).negate(), |src| src.chan(i));
        ctx.alu(
            AluInstr::op2(info.native)
                .src(0, AluSrc::inline(sel::SRC_0))
                .src(1, threshold)
                .dst(AluDst::slot(i as u8))
                .last(i == 3),
        )?;
    }
    ctx.bc.force_new_cf();
    ctx.uses_kill = true;
    Ok(())
}

/// `ARL`: loads the address register with `floor(src.x)`.
pub(crate) fn arl(ctx: &mut Ctx<'_>, inst: &Instruction, _info: &OpInfo) -> Result<(), CompileError> {
    let src = ctx.source(0)?.chan(0);
    if ctx.class.is_evergreen() {
        ctx.alu(
            AluInstr::op2(evergreen::FLT_TO_INT_FLOOR)
                .src(0, src)
                .dst(ctx.temp(0))
                .last(true),
        )?;
        return ctx.alu(
            AluInstr::op2(ctx.ops.mova_int)
                .src(0, ctx.temp_src(0))
                .dst(AluDst::slot(0))
                .last(true),
        );
    }
    ctx.alu(
        AluInstr::op2(r600::MOVA_FLOOR)
            .src(0, src)
            .dst(ctx.dst(inst, 0)?)
            .last(true),
    )?;
    ctx.bc.mark_waterfall();
    Ok(())
}

fn needs_load(inst: &Instruction, index: usize, operand: &Operand) -> bool {
    let Some(src) = inst.src.get(index) else {
        return false;
    };
    src.file != RegisterFile::Temporary || operand.base.neg || operand.base.abs || src.indirect
}

/// Texture sample, fetch, size query and gradient instructions.
pub(crate) fn tex(ctx: &mut Ctx<'_>, inst: &Instruction, info: &OpInfo) -> Result<(), CompileError> {
    let sampler = match inst.opcode {
        Opcode::Ddx | Opcode::Ddy => 0,
        Opcode::Txd => ctx.source(3)?.base.sel,
        _ => ctx.source(1)?.base.sel,
    };
    let mut coord = ctx.source(0)?;
    let mut loaded = false;

    if inst.opcode == Opcode::Txp {
        ctx.scalar(
            AluInstr::op2(ctx.ops.recip_ieee)
                .src(0, coord.chan(3))
                .dst(ctx.temp(3)),
        )?;
        for i in 0..4u8 {
            let alu = if i < 3 {
                AluInstr::op2(ctx.ops.mul)
                    .src(0, ctx.temp_src(3))
                    .src(1, coord.chan(usize::from(i)))
            } else {
                AluInstr::op2(ctx.ops.mov).src(0, AluSrc::inline(sel::SRC_1))
            };
            ctx.alu(alu.dst(ctx.temp(i)).last(i == 3))?;
        }
        coord = Operand::gpr(ctx.temp_reg);
        loaded = true;
    }

    let mut src_sel = coord.swizzle;
    if inst.texture == TextureTarget::Cube {
        const CUBE_SRC0: [usize; 4] = [2, 2, 0, 1];
        const CUBE_SRC1: [usize; 4] = [1, 0, 2, 2];
        for i in 0..4usize {
            ctx.alu(
                AluInstr::op2(ctx.ops.cube)
                    .src(0, coord.chan(CUBE_SRC0[i]))
                    .src(1, coord.chan(CUBE_SRC1[i]))
                    .dst(ctx.temp(i as u8))
                    .last(i == 3),
            )?;
        }
        ctx.scalar(
            AluInstr::op2(ctx.ops.recip_ieee)
                .src(0, ctx.temp_src(2).abs())
                .dst(ctx.temp(2)),
        )?;
        ctx.value = [FLOAT_ONE_AND_HALF, 0, 0, 0];
        for i in 0..2u8 {
            ctx.alu(
                AluInstr::op3(ctx.ops.muladd)
                    .src(0, ctx.temp_src(i))
                    .src(1, ctx.temp_src(2))
                    .src(2, AluSrc::literal(0))
                    .dst(ctx.temp(i))
                    .last(i == 1),
            )?;
        }
        loaded = true;
        src_sel = [1, 0, 3, 1];
    } else if !loaded && needs_load(inst, 0, &coord) {
        ctx.load_gpr(coord, ctx.temp_reg)?;
        loaded = true;
    }
    if loaded && inst.texture != TextureTarget::Cube {
        src_sel = [0, 1, 2, 3];
    }
    let src_gpr = if loaded { ctx.temp_reg } else { coord.base.sel };
    let normalized = !(inst.texture.is_rect() || inst.opcode == Opcode::Txf);

    if inst.opcode == Opcode::Txd {
        for (index, op) in [(1, tex::SET_GRADIENTS_H), (2, tex::SET_GRADIENTS_V)] {
            let gradient = ctx.source(index)?;
            let (gpr, sel) = if needs_load(inst, index, &gradient) {
                let reg = ctx.get_temp();
                ctx.load_gpr(gradient, reg)?;
                (reg, [0, 1, 2, 3])
            } else {
                (gradient.base.sel, gradient.swizzle)
            };
            ctx.bc.add_tex(TexInstr {
                inst: op,
                resource_id: sampler,
                sampler_id: sampler,
                src_gpr: gpr,
                src_sel: sel,
                dst_sel: [SEL_MASK; 4],
                coord_type: [normalized; 4],
                ..TexInstr::default()
            })?;
        }
    }

    let dst = ctx.dst(inst, 0)?;
    let mask = write_mask(inst);
    let mut dst_sel = [SEL_MASK; 4];
    for (i, sel) in dst_sel.iter_mut().enumerate() {
        if mask.has_channel(i) {
            *sel = i as u8;
        }
    }
    let mut opcode = info.native;
    if inst.texture.is_shadow() {
        if let Some(shadow) = tex::shadow(opcode) {
            opcode = shadow;
            src_sel[3] = src_sel[2];
        }
    }
    ctx.bc.add_tex(TexInstr {
        inst: opcode,
        resource_id: sampler,
        sampler_id: sampler,
        src_gpr,
        src_sel,
        dst_gpr: dst.sel,
        dst_rel: dst.rel,
        dst_sel,
        coord_type: [normalized; 4],
        ..TexInstr::default()
    })
}

/// Structured control flow.
pub(crate) fn flow(ctx: &mut Ctx<'_>, inst: &Instruction, _info: &OpInfo) -> Result<(), CompileError> {
    match inst.opcode {
        Opcode::If => {
            let cond = ctx.source(0)?.chan(0);
            let scratch = ctx.temp_reg;
            let literal = ctx.value;
            ctx.bc.open_if(cond, scratch, &literal)
        }
        Opcode::Else => ctx.bc.emit_else(),
        Opcode::EndIf => ctx.bc.close_if(),
        Opcode::BgnLoop => ctx.bc.open_loop(),
        Opcode::EndLoop => ctx.bc.close_loop(),
        Opcode::Brk => ctx.bc.emit_break_or_continue(CfOp::LoopBreak),
        Opcode::Cont => ctx.bc.emit_break_or_continue(CfOp::LoopContinue),
        _ => Err(CompileError::UnsupportedOpcode(inst.opcode.raw())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::CfBody;
    use crate::family::ChipFamily;
    use crate::ir::{Declaration, DstRegister, ProcessorKind, ShaderProgram, Token};
    use crate::options::CompileOptions;
    use crate::translate::translate;
    use pretty_assertions::assert_eq;

    #[test]
    fn special_constants_map_to_inline_selectors() {
        assert_eq!(special_constant(0).map(|s| s.sel), Some(sel::SRC_0));
        assert_eq!(special_constant(FLOAT_ONE).map(|s| s.sel), Some(sel::SRC_1));
        assert_eq!(special_constant(0xBF00_0000), Some(AluSrc::inline(sel::SRC_0_5).negate()));
        assert_eq!(special_constant(0x4000_0000), None);
    }

    #[test]
    fn last_channel_of_mask() {
        assert_eq!(last_channel(WriteMask::XYZW), Some(3));
        assert_eq!(last_channel(WriteMask::X | WriteMask::Z), Some(2));
        assert_eq!(last_channel(WriteMask::empty()), None);
    }

    fn fragment(body: Vec<Instruction>) -> ShaderProgram {
        let mut tokens = vec![
            Token::Declaration(Declaration::new(RegisterFile::Temporary, 0, 1)),
            Token::Declaration(
                Declaration::new(RegisterFile::Output, 0, 0)
                    .semantic(crate::ir::Semantic::Color, 0),
            ),
            Token::Immediate([FLOAT_ONE, 0x4000_0000, 0, 0]),
            Token::Immediate([0x4040_0000, 0x4080_0000, 0, 0]),
        ];
        tokens.extend(body.into_iter().map(Token::Instruction));
        ShaderProgram {
            processor: ProcessorKind::Fragment,
            tokens,
        }
    }

    fn alu_bodies(family: ChipFamily, program: &ShaderProgram) -> Vec<AluInstr> {
        let shader = translate(program, family, &CompileOptions::default()).unwrap();
        crate::disasm::decode(shader.class, &shader.bytecode)
            .unwrap()
            .into_iter()
            .flat_map(|cf| match cf.body {
                CfBody::Alu(instrs) => instrs,
                _ => Vec::new(),
            })
            .collect()
    }

    #[test]
    fn two_distinct_literals_are_split() {
        let add = Instruction::new(Opcode::Add)
            .dst(DstRegister::new(RegisterFile::Temporary, 0))
            .src(SrcRegister::new(RegisterFile::Immediate, 0).swizzle([1, 1, 1, 1]))
            .src(SrcRegister::new(RegisterFile::Immediate, 1));
        let instrs = alu_bodies(ChipFamily::Rv770, &fragment(vec![add]));
        // Four moves of the first immediate, then the ADD bundle.
        let movs = instrs.iter().take(4).filter(|alu| alu.inst == crate::isa::R600_ALU.mov);
        assert_eq!(movs.count(), 4);
        assert_eq!(instrs[3].literals(), &[FLOAT_ONE, 0x4000_0000, 0, 0][..]);
        let adds: Vec<_> = instrs[4..8].iter().collect();
        assert!(adds.iter().all(|alu| alu.inst == crate::isa::R600_ALU.add));
        assert!(adds.iter().all(|alu| alu.src[1].sel == sel::LITERAL));
        assert_eq!(adds[3].literals(), &[0x4040_0000, 0x4080_0000, 0, 0][..]);
    }

    #[test]
    fn replicated_one_uses_inline_constant() {
        let mov = Instruction::new(Opcode::Mov)
            .dst(DstRegister::new(RegisterFile::Temporary, 0))
            .src(SrcRegister::new(RegisterFile::Immediate, 0).scalar(0));
        let instrs = alu_bodies(ChipFamily::Rv770, &fragment(vec![mov]));
        assert!(instrs[..4].iter().all(|alu| alu.src[0].sel == sel::SRC_1));
        assert_eq!(instrs[3].nliteral(), 0);
    }

    #[test]
    fn slt_swaps_operands_into_setgt() {
        let slt = Instruction::new(Opcode::Slt)
            .dst(DstRegister::new(RegisterFile::Temporary, 0).mask(WriteMask::X))
            .src(SrcRegister::new(RegisterFile::Temporary, 0))
            .src(SrcRegister::new(RegisterFile::Temporary, 1));
        let instrs = alu_bodies(ChipFamily::Rv770, &fragment(vec![slt]));
        let setgt = &instrs[0];
        assert_eq!(setgt.inst, crate::isa::R600_ALU.setgt);
        assert_eq!(setgt.src[0].sel, 2);
        assert_eq!(setgt.src[1].sel, 1);
        assert!(setgt.last);
    }

    #[test]
    fn cayman_transcendental_fills_vector_slots() {
        let rcp = Instruction::new(Opcode::Rcp)
            .dst(DstRegister::new(RegisterFile::Temporary, 0).mask(WriteMask::Y))
            .src(SrcRegister::new(RegisterFile::Temporary, 1));
        let instrs = alu_bodies(ChipFamily::Cayman, &fragment(vec![rcp]));
        let slots: Vec<_> = instrs
            .iter()
            .take_while(|alu| alu.inst == crate::isa::EVERGREEN_ALU.recip_ieee)
            .collect();
        assert_eq!(slots.len(), 3);
        assert_eq!(
            slots.iter().map(|alu| alu.dst.write).collect::<Vec<_>>(),
            [false, true, false]
        );
        assert!(slots[2].last);
    }
}
