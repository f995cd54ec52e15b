//! IR to bytecode translation driver.
//!
//! Walks the token stream once: declarations allocate GPRs (and emit vertex fetches or
//! interpolation code), instructions go through the per-class dispatch table, and the outputs
//! are exported at the end.

use tracing::{debug, trace};

use crate::alu::{sel, AluDst, AluInstr, AluSrc};
use crate::bank_swizzle::BankSwizzle;
use crate::bytecode::{Bytecode, Kcache};
use crate::dispatch;
use crate::emit::Operand;
use crate::error::CompileError;
use crate::export::{swizzle, ExportType, Output};
use crate::family::{ChipClass, ChipFamily};
use crate::fetch::VtxInstr;
use crate::ir::{
    self, Declaration, Instruction, Interpolate, ProcessorKind, RegisterFile, Semantic,
    ShaderProgram, Token,
};
use crate::isa::{evergreen, kcache_mode, AluOpcodes, CfOp};
use crate::limits::{MAX_GPR, MAX_INTERP_PARAMS, SCRATCH_GPRS};
use crate::options::{CompileOptions, ConstantMode};

/// A declared shader input or output and the GPR holding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderIo {
    pub semantic: Option<(Semantic, u32)>,
    pub gpr: u32,
    pub interpolate: Interpolate,
}

impl ShaderIo {
    fn name(&self) -> Option<Semantic> {
        self.semantic.map(|(name, _)| name)
    }
}

/// A translated program and the metadata the driver needs to bind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledShader {
    pub class: ChipClass,
    pub bytecode: Vec<u32>,
    /// Highest GPR used plus one.
    pub ngpr: u32,
    /// Hardware stack entries.
    pub nstack: u32,
    pub ninput: u32,
    pub noutput: u32,
    pub inputs: Vec<ShaderIo>,
    pub outputs: Vec<ShaderIo>,
    pub uses_kill: bool,
}

impl CompiledShader {
    /// The program as bytes, ready for upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.bytecode)
    }
}

/// Translates `program` for `family`.
pub fn translate(
    program: &ShaderProgram,
    family: ChipFamily,
    options: &CompileOptions,
) -> Result<CompiledShader, CompileError> {
    let info = ir::scan(program);
    let mut ctx = Ctx::new(family, options, &info)?;

    for token in &program.tokens {
        if let Token::Immediate(value) = token {
            ctx.immediates.try_reserve(1)?;
            ctx.immediates.push(*value);
        }
    }
    if ctx.processor == ProcessorKind::Vertex && options.fetch_shader {
        ctx.bc.add_cfinst(CfOp::CallFs)?;
    }

    for token in &program.tokens {
        match token {
            Token::Declaration(decl) => ctx.declare(decl)?,
            Token::Immediate(_) => {}
            Token::Instruction(inst) => ctx.instruction(inst)?,
        }
    }
    ctx.emit_exports()?;

    ctx.bc.build()?;
    let shader = CompiledShader {
        class: ctx.class,
        bytecode: ctx.bc.take_bytecode(),
        ngpr: ctx.bc.ngpr(),
        nstack: ctx.bc.nstack(),
        ninput: ctx.inputs.len() as u32,
        noutput: ctx.outputs.len() as u32,
        inputs: ctx.inputs,
        outputs: ctx.outputs,
        uses_kill: ctx.uses_kill,
    };
    debug!(
        family = %family,
        processor = ?info.processor,
        ndw = shader.bytecode.len(),
        ngpr = shader.ngpr,
        nstack = shader.nstack,
        "translated shader"
    );
    Ok(shader)
}

/// Translation state shared by the emission routines.
pub(crate) struct Ctx<'a> {
    pub(crate) bc: Bytecode,
    pub(crate) class: ChipClass,
    pub(crate) ops: &'static AluOpcodes,
    pub(crate) processor: ProcessorKind,
    pub(crate) options: &'a CompileOptions,
    pub(crate) constant_mode: ConstantMode,
    /// First GPR of each register file.
    pub(crate) file_offset: [u32; RegisterFile::COUNT],
    /// Declared size of each register file.
    file_count: [u32; RegisterFile::COUNT],
    /// First scratch GPR, past every declared register.
    pub(crate) temp_reg: u32,
    next_temp: u32,
    pub(crate) immediates: Vec<[u32; 4]>,
    /// Literal words offered to every bundle closed by the current instruction.
    pub(crate) value: [u32; 4],
    /// Source operands of the current instruction.
    pub(crate) src: Vec<Operand>,
    pub(crate) inputs: Vec<ShaderIo>,
    pub(crate) outputs: Vec<ShaderIo>,
    pub(crate) uses_kill: bool,
}

impl<'a> Ctx<'a> {
    fn new(
        family: ChipFamily,
        options: &'a CompileOptions,
        info: &ir::ScanInfo,
    ) -> Result<Self, CompileError> {
        let mut bc = Bytecode::new(family)?;
        let class = bc.class();
        let constant_mode = options.constant_mode_for(class);

        let mut file_offset = [0; RegisterFile::COUNT];
        // GPR 0 holds the vertex id, or the barycentrics on Evergreen fragment shaders.
        let input = match info.processor {
            ProcessorKind::Vertex => 1,
            ProcessorKind::Fragment if class.interpolates_in_shader() => 1,
            ProcessorKind::Fragment => 0,
        };
        let after = |base: u32, file| {
            base.checked_add(info.count(file))
                .ok_or(CompileError::UnsupportedOperand("declared register count overflows"))
        };
        let output = after(input, RegisterFile::Input)?;
        let temporary = after(output, RegisterFile::Output)?;
        file_offset[RegisterFile::Input.index()] = input;
        file_offset[RegisterFile::Output.index()] = output;
        file_offset[RegisterFile::Temporary.index()] = temporary;
        file_offset[RegisterFile::Constant.index()] = match constant_mode {
            ConstantMode::Kcache => sel::KCACHE0_BASE,
            ConstantMode::ConstantFile => sel::CFILE_BASE,
        };
        file_offset[RegisterFile::Immediate.index()] = sel::LITERAL;
        let temp_reg = after(temporary, RegisterFile::Temporary)?;
        if temp_reg > MAX_GPR - SCRATCH_GPRS {
            return Err(CompileError::UnsupportedOperand("declared registers exceed the GPR file"));
        }

        if constant_mode == ConstantMode::Kcache {
            bc.set_kcache([
                Kcache {
                    bank: 0,
                    mode: kcache_mode::LOCK_2,
                    addr: 0,
                },
                Kcache {
                    bank: 0,
                    mode: kcache_mode::LOCK_2,
                    addr: 2,
                },
            ]);
        }
        debug!(?file_offset, temp_reg, ?constant_mode, "register layout");

        Ok(Self {
            ops: bc.alu_opcodes(),
            bc,
            class,
            processor: info.processor,
            options,
            constant_mode,
            file_offset,
            file_count: info.file_count,
            temp_reg,
            next_temp: 1,
            immediates: Vec::new(),
            value: [0; 4],
            src: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            uses_kill: false,
        })
    }

    pub(crate) fn offset(&self, file: RegisterFile) -> u32 {
        self.file_offset[file.index()]
    }

    /// The GPR behind `index` of a GPR-backed file, checked against its declaration.
    pub(crate) fn gpr(&self, file: RegisterFile, index: u32) -> Result<u32, CompileError> {
        if index >= self.file_count[file.index()] {
            return Err(CompileError::UnsupportedOperand("register index past its declaration"));
        }
        Ok(self.offset(file) + index)
    }

    /// A fresh scratch GPR, valid until the next instruction.
    pub(crate) fn get_temp(&mut self) -> u32 {
        let reg = self.temp_reg + self.next_temp;
        self.next_temp += 1;
        reg
    }

    fn declare(&mut self, decl: &Declaration) -> Result<(), CompileError> {
        match decl.file {
            RegisterFile::Input => {
                for index in decl.first..=decl.last {
                    let io = ShaderIo {
                        semantic: decl.semantic,
                        gpr: self.offset(RegisterFile::Input) + index,
                        interpolate: decl.interpolate,
                    };
                    let ordinal = self.inputs.len() as u32;
                    if self.processor == ProcessorKind::Fragment
                        && self.class.interpolates_in_shader()
                        && ordinal >= MAX_INTERP_PARAMS
                    {
                        return Err(CompileError::UnsupportedOperand("too many interpolated inputs"));
                    }
                    self.inputs.try_reserve(1)?;
                    self.inputs.push(io);
                    match self.processor {
                        ProcessorKind::Vertex if !self.options.fetch_shader => {
                            self.bc.add_vtx(VtxInstr::fetch(ordinal, 0, io.gpr))?;
                        }
                        ProcessorKind::Fragment if self.class.interpolates_in_shader() => {
                            self.interpolate(io.gpr, ordinal)?;
                        }
                        _ => {}
                    }
                }
                Ok(())
            }
            RegisterFile::Output => {
                for index in decl.first..=decl.last {
                    self.outputs.try_reserve(1)?;
                    self.outputs.push(ShaderIo {
                        semantic: decl.semantic,
                        gpr: self.offset(RegisterFile::Output) + index,
                        interpolate: decl.interpolate,
                    });
                }
                Ok(())
            }
            RegisterFile::Constant
            | RegisterFile::Temporary
            | RegisterFile::Sampler
            | RegisterFile::Address => Ok(()),
            file => Err(CompileError::UnsupportedFile(file)),
        }
    }

    /// Interpolates parameter `param` into `gpr` from the barycentrics in GPR 0.
    fn interpolate(&mut self, gpr: u32, param: u32) -> Result<(), CompileError> {
        for i in 0..8u8 {
            let inst = if i < 4 {
                evergreen::INTERP_ZW
            } else {
                evergreen::INTERP_XY
            };
            let chan = i % 4;
            let dst = if (2..6).contains(&i) {
                AluDst::gpr(gpr, chan)
            } else {
                AluDst::slot(chan)
            };
            let alu = AluInstr::op2(inst)
                .dst(dst)
                .src(0, AluSrc::gpr(0, 1 - i % 2))
                .src(1, AluSrc::gpr(sel::PARAM_BASE + param, 0))
                .force_swizzle(BankSwizzle::VEC_210)
                .last(chan == 3);
            self.bc.add_alu(alu)?;
        }
        Ok(())
    }

    fn instruction(&mut self, inst: &Instruction) -> Result<(), CompileError> {
        ir::is_supported(inst)?;
        let info = dispatch::lookup(self.class, inst.opcode);
        trace!(
            opcode = inst.opcode.name(),
            native = info.native,
            op3 = info.is_op3,
            "translate"
        );
        self.next_temp = 1;
        self.value = [0; 4];
        self.load_sources(inst)?;
        (info.emit)(self, inst, info)
    }

    /// Adds an ALU instruction and, when it closes a bundle, the pending literals.
    pub(crate) fn alu(&mut self, alu: AluInstr) -> Result<(), CompileError> {
        let last = alu.last;
        self.bc.add_alu(alu)?;
        if last {
            self.bc.add_literal(&self.value)?;
        }
        Ok(())
    }

    fn emit_exports(&mut self) -> Result<(), CompileError> {
        let mut exports = Vec::new();
        exports.try_reserve(self.outputs.len() + 2)?;
        let mut npos = 0;
        for (i, io) in self.outputs.iter().enumerate() {
            let out = match self.processor {
                ProcessorKind::Vertex => match io.name() {
                    Some(Semantic::Position) => {
                        npos += 1;
                        Output::new(ExportType::Pos, 60, io.gpr)
                    }
                    Some(Semantic::PSize) => {
                        npos += 1;
                        Output::new(ExportType::Pos, 61, io.gpr)
                    }
                    _ => Output::new(ExportType::Param, i as u32 - npos, io.gpr),
                },
                ProcessorKind::Fragment => match io.semantic {
                    Some((Semantic::Color, sid)) => Output::new(ExportType::Pixel, sid, io.gpr),
                    Some((Semantic::Position, _)) => Output::new(ExportType::Pixel, 61, io.gpr)
                        .swizzle([2, swizzle::MASK, swizzle::MASK, swizzle::MASK]),
                    Some((Semantic::Stencil, _)) => Output::new(ExportType::Pixel, 61, io.gpr)
                        .swizzle([swizzle::MASK, 1, swizzle::MASK, swizzle::MASK]),
                    _ => {
                        return Err(CompileError::UnsupportedOperand(
                            "fragment output semantic",
                        ))
                    }
                },
            };
            exports.push(out);
        }

        let masked = [swizzle::MASK; 4];
        match self.processor {
            ProcessorKind::Vertex => {
                if !exports.iter().any(|out| out.array_base == 60 && out.export_type == ExportType::Pos) {
                    exports.push(Output::new(ExportType::Pos, 60, 0).swizzle(masked));
                }
                if !exports.iter().any(|out| out.export_type == ExportType::Param) {
                    exports.push(Output::new(ExportType::Param, 0, 0));
                }
            }
            ProcessorKind::Fragment => {
                if exports.is_empty() {
                    exports.push(Output::new(ExportType::Pixel, 0, 0).swizzle(masked));
                }
            }
        }

        let mut done = [false; 3];
        let count = exports.len();
        for (i, out) in exports.iter_mut().enumerate().rev() {
            if i == count - 1 && self.class.export_eop() {
                out.end_of_program = true;
            }
            let seen = &mut done[out.export_type.raw() as usize];
            if !*seen {
                *seen = true;
                out.op = CfOp::ExportDone;
            }
        }
        for out in exports {
            self.bc.add_output(out)?;
        }
        if self.class.needs_cf_end() {
            self.bc.add_cfinst(CfOp::End)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{DstRegister, SrcRegister};
    use pretty_assertions::assert_eq;

    fn program(processor: ProcessorKind, tokens: Vec<Token>) -> ShaderProgram {
        ShaderProgram { processor, tokens }
    }

    #[test]
    fn register_layout_follows_declarations() {
        let prog = program(
            ProcessorKind::Vertex,
            vec![
                Token::Declaration(Declaration::new(RegisterFile::Input, 0, 1)),
                Token::Declaration(
                    Declaration::new(RegisterFile::Output, 0, 0).semantic(Semantic::Position, 0),
                ),
                Token::Declaration(Declaration::new(RegisterFile::Temporary, 0, 2)),
            ],
        );
        let options = CompileOptions::default();
        let ctx = Ctx::new(ChipFamily::Rv770, &options, &ir::scan(&prog)).unwrap();
        assert_eq!(ctx.offset(RegisterFile::Input), 1);
        assert_eq!(ctx.offset(RegisterFile::Output), 3);
        assert_eq!(ctx.offset(RegisterFile::Temporary), 4);
        assert_eq!(ctx.temp_reg, 7);
        assert_eq!(ctx.offset(RegisterFile::Constant), 256);
    }

    #[test]
    fn fragment_inputs_start_at_zero_before_evergreen() {
        let prog = program(
            ProcessorKind::Fragment,
            vec![Token::Declaration(Declaration::new(RegisterFile::Input, 0, 0))],
        );
        let options = CompileOptions::default();
        let info = ir::scan(&prog);
        let r700 = Ctx::new(ChipFamily::Rv730, &options, &info).unwrap();
        let eg = Ctx::new(ChipFamily::Juniper, &options, &info).unwrap();
        assert_eq!(r700.offset(RegisterFile::Input), 0);
        assert_eq!(eg.offset(RegisterFile::Input), 1);
        assert_eq!(eg.offset(RegisterFile::Constant), 128);
    }

    #[test]
    fn huge_declarations_are_rejected_without_overflow() {
        let options = CompileOptions::default();
        for (processor, file) in [
            (ProcessorKind::Vertex, RegisterFile::Input),
            (ProcessorKind::Vertex, RegisterFile::Temporary),
            (ProcessorKind::Fragment, RegisterFile::Output),
            (ProcessorKind::Fragment, RegisterFile::Temporary),
        ] {
            let prog = program(
                processor,
                vec![
                    Token::Declaration(Declaration::new(RegisterFile::Input, 0, 3)),
                    Token::Declaration(Declaration::new(file, 0, u32::MAX)),
                ],
            );
            assert!(
                matches!(
                    Ctx::new(ChipFamily::Rv770, &options, &ir::scan(&prog)),
                    Err(CompileError::UnsupportedOperand(_))
                ),
                "{file:?}"
            );
        }
    }

    #[test]
    fn scratch_registers_stay_inside_the_gpr_file() {
        let options = CompileOptions::default();
        let layout = |last_temp| {
            let prog = program(
                ProcessorKind::Fragment,
                vec![Token::Declaration(Declaration::new(RegisterFile::Temporary, 0, last_temp))],
            );
            Ctx::new(ChipFamily::Rv770, &options, &ir::scan(&prog))
        };
        let ctx = layout(122).unwrap();
        assert_eq!(ctx.temp_reg + SCRATCH_GPRS, MAX_GPR);
        assert!(matches!(layout(123), Err(CompileError::UnsupportedOperand(_))));
    }

    #[test]
    fn unsupported_declaration_file() {
        let prog = program(
            ProcessorKind::Vertex,
            vec![Token::Declaration(Declaration::new(RegisterFile::Immediate, 0, 0))],
        );
        assert!(matches!(
            translate(&prog, ChipFamily::Rv770, &CompileOptions::default()),
            Err(CompileError::UnsupportedFile(RegisterFile::Immediate))
        ));
    }

    #[test]
    fn unknown_fragment_output_semantic() {
        let prog = program(
            ProcessorKind::Fragment,
            vec![Token::Declaration(
                Declaration::new(RegisterFile::Output, 0, 0).semantic(Semantic::Generic, 0),
            )],
        );
        assert!(matches!(
            translate(&prog, ChipFamily::R600, &CompileOptions::default()),
            Err(CompileError::UnsupportedOperand(_))
        ));
    }

    #[test]
    fn bytes_view_matches_words() {
        let prog = program(
            ProcessorKind::Fragment,
            vec![
                Token::Declaration(
                    Declaration::new(RegisterFile::Output, 0, 0).semantic(Semantic::Color, 0),
                ),
                Token::Instruction(
                    Instruction::new(ir::Opcode::Mov)
                        .dst(DstRegister::new(RegisterFile::Output, 0))
                        .src(SrcRegister::new(RegisterFile::Constant, 0)),
                ),
            ],
        );
        let shader = translate(&prog, ChipFamily::Rv770, &CompileOptions::default()).unwrap();
        assert_eq!(shader.as_bytes().len(), shader.bytecode.len() * 4);
        assert_eq!(shader.noutput, 1);
    }
}
