//! Token-stream shader IR consumed by the translator.
//!
//! The IR is a flat list of declarations, immediates and instructions over typed register files,
//! with four-component registers, per-operand swizzles and destination write masks.

use bitflags::bitflags;

use crate::error::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessorKind {
    Vertex,
    Fragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterFile {
    Null,
    Constant,
    Input,
    Output,
    Temporary,
    Sampler,
    Address,
    Immediate,
}

impl RegisterFile {
    pub const COUNT: usize = 8;

    pub fn index(self) -> usize {
        match self {
            Self::Null => 0,
            Self::Constant => 1,
            Self::Input => 2,
            Self::Output => 3,
            Self::Temporary => 4,
            Self::Sampler => 5,
            Self::Address => 6,
            Self::Immediate => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Semantic {
    Position,
    Color,
    BColor,
    Fog,
    PSize,
    Generic,
    Normal,
    Face,
    EdgeFlag,
    PrimId,
    InstanceId,
    Stencil,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Interpolate {
    Constant,
    Linear,
    #[default]
    Perspective,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    #[default]
    Unknown,
    Tex1D,
    Tex2D,
    Tex3D,
    Cube,
    Rect,
    Shadow1D,
    Shadow2D,
    ShadowRect,
}

impl TextureTarget {
    pub fn is_shadow(self) -> bool {
        matches!(self, Self::Shadow1D | Self::Shadow2D | Self::ShadowRect)
    }

    /// Rectangle targets take unnormalized texel coordinates.
    pub fn is_rect(self) -> bool {
        matches!(self, Self::Rect | Self::ShadowRect)
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct WriteMask: u8 {
        const X = 1 << 0;
        const Y = 1 << 1;
        const Z = 1 << 2;
        const W = 1 << 3;
        const XYZW = 0xF;
    }
}

impl WriteMask {
    pub fn has_channel(self, chan: usize) -> bool {
        chan < 4 && self.bits() & (1 << chan) != 0
    }
}

bitflags! {
    /// Register files read or written with address-register indexing.
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct IndirectFiles: u32 {
        const CONSTANT = 1 << 0;
        const INPUT = 1 << 1;
        const OUTPUT = 1 << 2;
        const TEMPORARY = 1 << 3;
    }
}

impl IndirectFiles {
    fn for_file(file: RegisterFile) -> Self {
        match file {
            RegisterFile::Constant => Self::CONSTANT,
            RegisterFile::Input => Self::INPUT,
            RegisterFile::Output => Self::OUTPUT,
            RegisterFile::Temporary => Self::TEMPORARY,
            _ => Self::empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Declaration {
    pub file: RegisterFile,
    pub first: u32,
    pub last: u32,
    /// Semantic name and index of input/output declarations.
    pub semantic: Option<(Semantic, u32)>,
    pub interpolate: Interpolate,
}

impl Declaration {
    pub fn new(file: RegisterFile, first: u32, last: u32) -> Self {
        Self {
            file,
            first,
            last,
            semantic: None,
            interpolate: Interpolate::default(),
        }
    }

    pub fn semantic(mut self, name: Semantic, index: u32) -> Self {
        self.semantic = Some((name, index));
        self
    }

    pub fn interpolate(mut self, interpolate: Interpolate) -> Self {
        self.interpolate = interpolate;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrcRegister {
    pub file: RegisterFile,
    /// Signed so relative addressing can start below zero.
    pub index: i32,
    /// Source channel for each destination channel.
    pub swizzle: [u8; 4],
    pub negate: bool,
    pub absolute: bool,
    /// Indexed by `ADDR[0].x`.
    pub indirect: bool,
}

impl SrcRegister {
    pub fn new(file: RegisterFile, index: i32) -> Self {
        Self {
            file,
            index,
            swizzle: [0, 1, 2, 3],
            negate: false,
            absolute: false,
            indirect: false,
        }
    }

    pub fn swizzle(mut self, swizzle: [u8; 4]) -> Self {
        self.swizzle = swizzle;
        self
    }

    /// Replicates one channel to all four.
    pub fn scalar(self, chan: u8) -> Self {
        self.swizzle([chan; 4])
    }

    pub fn negate(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    pub fn absolute(mut self) -> Self {
        self.absolute = true;
        self
    }

    pub fn indirect(mut self) -> Self {
        self.indirect = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DstRegister {
    pub file: RegisterFile,
    pub index: u32,
    pub write_mask: WriteMask,
    pub indirect: bool,
}

impl DstRegister {
    pub fn new(file: RegisterFile, index: u32) -> Self {
        Self {
            file,
            index,
            write_mask: WriteMask::XYZW,
            indirect: false,
        }
    }

    pub fn mask(mut self, write_mask: WriteMask) -> Self {
        self.write_mask = write_mask;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub saturate: bool,
    pub dst: Vec<DstRegister>,
    pub src: Vec<SrcRegister>,
    /// Sampled target of texture instructions.
    pub texture: TextureTarget,
}

impl Instruction {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            saturate: false,
            dst: Vec::new(),
            src: Vec::new(),
            texture: TextureTarget::Unknown,
        }
    }

    pub fn dst(mut self, dst: DstRegister) -> Self {
        self.dst.push(dst);
        self
    }

    pub fn src(mut self, src: SrcRegister) -> Self {
        self.src.push(src);
        self
    }

    pub fn saturate(mut self) -> Self {
        self.saturate = true;
        self
    }

    pub fn texture(mut self, target: TextureTarget) -> Self {
        self.texture = target;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Declaration(Declaration),
    /// Four raw 32-bit immediate values, referenced by IMMEDIATE operands in order.
    Immediate([u32; 4]),
    Instruction(Instruction),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderProgram {
    pub processor: ProcessorKind,
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Arl,
    Mov,
    Lit,
    Rcp,
    Rsq,
    Exp,
    Log,
    Mul,
    Add,
    Dp3,
    Dp4,
    Dst,
    Min,
    Max,
    Slt,
    Sge,
    Mad,
    Sub,
    Lrp,
    Cnd,
    Dp2a,
    Frc,
    Clamp,
    Flr,
    Round,
    Ex2,
    Lg2,
    Pow,
    Xpd,
    Abs,
    Rcc,
    Dph,
    Cos,
    Ddx,
    Ddy,
    /// Unconditional fragment kill.
    Kilp,
    Seq,
    Sfl,
    Sgt,
    Sin,
    Sle,
    Sne,
    Str,
    Tex,
    Txd,
    Txp,
    Cal,
    Ret,
    Ssg,
    Cmp,
    Scs,
    Txb,
    Nrm,
    Div,
    Dp2,
    Txl,
    Brk,
    If,
    Else,
    EndIf,
    Ceil,
    I2f,
    Not,
    Trunc,
    Txf,
    Txq,
    Cont,
    BgnLoop,
    EndLoop,
    Nop,
    /// Kill where any source component is negative.
    Kil,
    End,
    Unknown(u16),
}

impl Opcode {
    /// Highest raw opcode number with a named variant, plus one.
    pub const RAW_COUNT: usize = 118;

    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0 => Self::Arl,
            1 => Self::Mov,
            2 => Self::Lit,
            3 => Self::Rcp,
            4 => Self::Rsq,
            5 => Self::Exp,
            6 => Self::Log,
            7 => Self::Mul,
            8 => Self::Add,
            9 => Self::Dp3,
            10 => Self::Dp4,
            11 => Self::Dst,
            12 => Self::Min,
            13 => Self::Max,
            14 => Self::Slt,
            15 => Self::Sge,
            16 => Self::Mad,
            17 => Self::Sub,
            18 => Self::Lrp,
            19 => Self::Cnd,
            21 => Self::Dp2a,
            24 => Self::Frc,
            25 => Self::Clamp,
            26 => Self::Flr,
            27 => Self::Round,
            28 => Self::Ex2,
            29 => Self::Lg2,
            30 => Self::Pow,
            31 => Self::Xpd,
            33 => Self::Abs,
            34 => Self::Rcc,
            35 => Self::Dph,
            36 => Self::Cos,
            37 => Self::Ddx,
            38 => Self::Ddy,
            39 => Self::Kilp,
            45 => Self::Seq,
            46 => Self::Sfl,
            47 => Self::Sgt,
            48 => Self::Sin,
            49 => Self::Sle,
            50 => Self::Sne,
            51 => Self::Str,
            52 => Self::Tex,
            53 => Self::Txd,
            54 => Self::Txp,
            63 => Self::Cal,
            64 => Self::Ret,
            65 => Self::Ssg,
            66 => Self::Cmp,
            67 => Self::Scs,
            68 => Self::Txb,
            69 => Self::Nrm,
            70 => Self::Div,
            71 => Self::Dp2,
            72 => Self::Txl,
            73 => Self::Brk,
            74 => Self::If,
            77 => Self::Else,
            78 => Self::EndIf,
            83 => Self::Ceil,
            84 => Self::I2f,
            85 => Self::Not,
            86 => Self::Trunc,
            94 => Self::Txf,
            95 => Self::Txq,
            96 => Self::Cont,
            99 => Self::BgnLoop,
            101 => Self::EndLoop,
            107 => Self::Nop,
            116 => Self::Kil,
            117 => Self::End,
            other => Self::Unknown(other),
        }
    }

    #[deny(unreachable_patterns)]
    pub const fn raw(self) -> u16 {
        match self {
            Self::Arl => 0,
            Self::Mov => 1,
            Self::Lit => 2,
            Self::Rcp => 3,
            Self::Rsq => 4,
            Self::Exp => 5,
            Self::Log => 6,
            Self::Mul => 7,
            Self::Add => 8,
            Self::Dp3 => 9,
            Self::Dp4 => 10,
            Self::Dst => 11,
            Self::Min => 12,
            Self::Max => 13,
            Self::Slt => 14,
            Self::Sge => 15,
            Self::Mad => 16,
            Self::Sub => 17,
            Self::Lrp => 18,
            Self::Cnd => 19,
            Self::Dp2a => 21,
            Self::Frc => 24,
            Self::Clamp => 25,
            Self::Flr => 26,
            Self::Round => 27,
            Self::Ex2 => 28,
            Self::Lg2 => 29,
            Self::Pow => 30,
            Self::Xpd => 31,
            Self::Abs => 33,
            Self::Rcc => 34,
            Self::Dph => 35,
            Self::Cos => 36,
            Self::Ddx => 37,
            Self::Ddy => 38,
            Self::Kilp => 39,
            Self::Seq => 45,
            Self::Sfl => 46,
            Self::Sgt => 47,
            Self::Sin => 48,
            Self::Sle => 49,
            Self::Sne => 50,
            Self::Str => 51,
            Self::Tex => 52,
            Self::Txd => 53,
            Self::Txp => 54,
            Self::Cal => 63,
            Self::Ret => 64,
            Self::Ssg => 65,
            Self::Cmp => 66,
            Self::Scs => 67,
            Self::Txb => 68,
            Self::Nrm => 69,
            Self::Div => 70,
            Self::Dp2 => 71,
            Self::Txl => 72,
            Self::Brk => 73,
            Self::If => 74,
            Self::Else => 77,
            Self::EndIf => 78,
            Self::Ceil => 83,
            Self::I2f => 84,
            Self::Not => 85,
            Self::Trunc => 86,
            Self::Txf => 94,
            Self::Txq => 95,
            Self::Cont => 96,
            Self::BgnLoop => 99,
            Self::EndLoop => 101,
            Self::Nop => 107,
            Self::Kil => 116,
            Self::End => 117,
            Self::Unknown(raw) => raw,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Arl => "ARL",
            Self::Mov => "MOV",
            Self::Lit => "LIT",
            Self::Rcp => "RCP",
            Self::Rsq => "RSQ",
            Self::Exp => "EXP",
            Self::Log => "LOG",
            Self::Mul => "MUL",
            Self::Add => "ADD",
            Self::Dp3 => "DP3",
            Self::Dp4 => "DP4",
            Self::Dst => "DST",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Slt => "SLT",
            Self::Sge => "SGE",
            Self::Mad => "MAD",
            Self::Sub => "SUB",
            Self::Lrp => "LRP",
            Self::Cnd => "CND",
            Self::Dp2a => "DP2A",
            Self::Frc => "FRC",
            Self::Clamp => "CLAMP",
            Self::Flr => "FLR",
            Self::Round => "ROUND",
            Self::Ex2 => "EX2",
            Self::Lg2 => "LG2",
            Self::Pow => "POW",
            Self::Xpd => "XPD",
            Self::Abs => "ABS",
            Self::Rcc => "RCC",
            Self::Dph => "DPH",
            Self::Cos => "COS",
            Self::Ddx => "DDX",
            Self::Ddy => "DDY",
            Self::Kilp => "KILP",
            Self::Seq => "SEQ",
            Self::Sfl => "SFL",
            Self::Sgt => "SGT",
            Self::Sin => "SIN",
            Self::Sle => "SLE",
            Self::Sne => "SNE",
            Self::Str => "STR",
            Self::Tex => "TEX",
            Self::Txd => "TXD",
            Self::Txp => "TXP",
            Self::Cal => "CAL",
            Self::Ret => "RET",
            Self::Ssg => "SSG",
            Self::Cmp => "CMP",
            Self::Scs => "SCS",
            Self::Txb => "TXB",
            Self::Nrm => "NRM",
            Self::Div => "DIV",
            Self::Dp2 => "DP2",
            Self::Txl => "TXL",
            Self::Brk => "BRK",
            Self::If => "IF",
            Self::Else => "ELSE",
            Self::EndIf => "ENDIF",
            Self::Ceil => "CEIL",
            Self::I2f => "I2F",
            Self::Not => "NOT",
            Self::Trunc => "TRUNC",
            Self::Txf => "TXF",
            Self::Txq => "TXQ",
            Self::Cont => "CONT",
            Self::BgnLoop => "BGNLOOP",
            Self::EndLoop => "ENDLOOP",
            Self::Nop => "NOP",
            Self::Kil => "KIL",
            Self::End => "END",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

/// Declared register counts and addressing modes gathered before translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanInfo {
    pub processor: ProcessorKind,
    /// Highest declared index plus one, per [`RegisterFile::index`].
    pub file_count: [u32; RegisterFile::COUNT],
    pub immediate_count: u32,
    pub indirect: IndirectFiles,
}

impl ScanInfo {
    pub fn count(&self, file: RegisterFile) -> u32 {
        self.file_count[file.index()]
    }
}

pub fn scan(program: &ShaderProgram) -> ScanInfo {
    let mut info = ScanInfo {
        processor: program.processor,
        file_count: [0; RegisterFile::COUNT],
        immediate_count: 0,
        indirect: IndirectFiles::empty(),
    };
    for token in &program.tokens {
        match token {
            Token::Declaration(decl) => {
                let count = &mut info.file_count[decl.file.index()];
                *count = (*count).max(decl.last.saturating_add(1));
            }
            Token::Immediate(_) => info.immediate_count += 1,
            Token::Instruction(inst) => {
                for src in inst.src.iter().filter(|src| src.indirect) {
                    info.indirect |= IndirectFiles::for_file(src.file);
                }
                for dst in inst.dst.iter().filter(|dst| dst.indirect) {
                    info.indirect |= IndirectFiles::for_file(dst.file);
                }
            }
        }
    }
    info
}

/// Operand shapes the translator can lower.
pub fn is_supported(inst: &Instruction) -> Result<(), CompileError> {
    if inst.dst.len() > 1 {
        return Err(CompileError::UnsupportedOperand("more than one destination"));
    }
    if inst.src.iter().any(|src| src.absolute) {
        return Err(CompileError::UnsupportedOperand("absolute value source modifier"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_numbers_round_trip() {
        for raw in 0..Opcode::RAW_COUNT as u16 + 4 {
            assert_eq!(Opcode::from_raw(raw).raw(), raw);
        }
        assert_eq!(Opcode::from_raw(20), Opcode::Unknown(20));
        assert_eq!(Opcode::Kil.name(), "KIL");
    }

    #[test]
    fn scan_counts_declarations_and_indirect_files() {
        let program = ShaderProgram {
            processor: ProcessorKind::Vertex,
            tokens: vec![
                Token::Declaration(Declaration::new(RegisterFile::Input, 0, 1)),
                Token::Declaration(Declaration::new(RegisterFile::Constant, 0, 7)),
                Token::Declaration(Declaration::new(RegisterFile::Temporary, 2, 2)),
                Token::Immediate([0; 4]),
                Token::Instruction(
                    Instruction::new(Opcode::Mov)
                        .dst(DstRegister::new(RegisterFile::Temporary, 0))
                        .src(SrcRegister::new(RegisterFile::Constant, 0).indirect()),
                ),
            ],
        };
        let info = scan(&program);
        assert_eq!(info.count(RegisterFile::Input), 2);
        assert_eq!(info.count(RegisterFile::Constant), 8);
        assert_eq!(info.count(RegisterFile::Temporary), 3);
        assert_eq!(info.count(RegisterFile::Output), 0);
        assert_eq!(info.immediate_count, 1);
        assert_eq!(info.indirect, IndirectFiles::CONSTANT);
    }

    #[test]
    fn declaration_ending_at_u32_max_saturates() {
        let program = ShaderProgram {
            processor: ProcessorKind::Fragment,
            tokens: vec![Token::Declaration(Declaration::new(
                RegisterFile::Temporary,
                0,
                u32::MAX,
            ))],
        };
        assert_eq!(scan(&program).count(RegisterFile::Temporary), u32::MAX);
    }

    #[test]
    fn multiple_destinations_and_abs_are_rejected() {
        let mov = Instruction::new(Opcode::Mov)
            .dst(DstRegister::new(RegisterFile::Temporary, 0))
            .src(SrcRegister::new(RegisterFile::Temporary, 1));
        assert!(is_supported(&mov).is_ok());
        let two = mov.clone().dst(DstRegister::new(RegisterFile::Temporary, 2));
        assert!(matches!(is_supported(&two), Err(CompileError::UnsupportedOperand(_))));
        let abs = Instruction::new(Opcode::Mov)
            .src(SrcRegister::new(RegisterFile::Temporary, 1).absolute());
        assert!(is_supported(&abs).is_err());
    }
}
