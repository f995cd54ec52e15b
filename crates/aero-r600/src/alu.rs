//! ALU micro-instructions and their operand selectors.

use crate::bank_swizzle::BankSwizzle;

/// ALU source/destination selector values.
pub mod sel {
    /// First selector past the general purpose registers.
    pub const GPR_END: u32 = 128;
    pub const KCACHE0_BASE: u32 = 128;
    pub const KCACHE1_BASE: u32 = 160;
    pub const KCACHE_END: u32 = 192;
    pub const SRC_0: u32 = 248;
    pub const SRC_1: u32 = 249;
    pub const SRC_1_INT: u32 = 250;
    pub const SRC_M_1_INT: u32 = 251;
    pub const SRC_0_5: u32 = 252;
    pub const LITERAL: u32 = 253;
    pub const PV: u32 = 254;
    pub const PS: u32 = 255;
    pub const CFILE_BASE: u32 = 256;
    pub const CFILE_END: u32 = 512;
    /// Evergreen interpolation parameter base (`PARAM0`).
    pub const PARAM_BASE: u32 = 448;

    pub fn is_gpr(sel: u32) -> bool {
        sel < GPR_END
    }

    pub fn is_kcache(sel: u32) -> bool {
        (KCACHE0_BASE..KCACHE_END).contains(&sel)
    }

    /// Constant file (and interpolation parameter) selectors.
    pub fn is_cfile(sel: u32) -> bool {
        (CFILE_BASE..CFILE_END).contains(&sel)
    }

    /// Selectors read through the constant ports: the constant file, kcache windows and the
    /// inline constants including the literal selector.
    pub fn is_const(sel: u32) -> bool {
        is_cfile(sel) || is_kcache(sel) || (SRC_0..=LITERAL).contains(&sel)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AluSrc {
    pub sel: u32,
    pub chan: u8,
    pub neg: bool,
    pub abs: bool,
    /// Relative (address-register indexed) addressing.
    pub rel: bool,
}

impl AluSrc {
    pub fn gpr(sel: u32, chan: u8) -> Self {
        Self {
            sel,
            chan,
            ..Self::default()
        }
    }

    /// One of the inline constants (`SRC_0`, `SRC_1`, `SRC_0_5`, ...).
    pub fn inline(sel: u32) -> Self {
        Self::gpr(sel, 0)
    }

    pub fn literal(chan: u8) -> Self {
        Self::gpr(sel::LITERAL, chan)
    }

    pub fn negate(mut self) -> Self {
        self.neg = !self.neg;
        self
    }

    pub fn abs(mut self) -> Self {
        self.abs = true;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AluDst {
    pub sel: u32,
    pub chan: u8,
    pub write: bool,
    pub clamp: bool,
    pub rel: bool,
}

impl AluDst {
    /// A written GPR channel.
    pub fn gpr(sel: u32, chan: u8) -> Self {
        Self {
            sel,
            chan,
            write: true,
            ..Self::default()
        }
    }

    /// An unwritten slot result; only the channel (slot) matters.
    pub fn slot(chan: u8) -> Self {
        Self {
            chan,
            ..Self::default()
        }
    }
}

/// One ALU micro-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AluInstr {
    /// Native opcode number for the active class.
    pub inst: u32,
    pub is_op3: bool,
    pub src: [AluSrc; 3],
    pub dst: AluDst,
    /// Closes the bundle.
    pub last: bool,
    /// Updates the execute mask and predicate (`UPDATE_EXEC_MASK` + `UPDATE_PRED`).
    pub predicate: bool,
    pub omod: u8,
    pub index_mode: u8,
    pub pred_sel: u8,
    /// Resolved when the bundle closes.
    pub bank_swizzle: BankSwizzle,
    pub bank_swizzle_force: Option<BankSwizzle>,
    pub(crate) bundle: u32,
    pub(crate) nliteral: u32,
    pub(crate) literal_added: bool,
    pub(crate) value: [u32; 4],
}

impl AluInstr {
    pub fn op2(inst: u32) -> Self {
        Self {
            inst,
            ..Self::default()
        }
    }

    pub fn op3(inst: u32) -> Self {
        Self {
            inst,
            is_op3: true,
            ..Self::default()
        }
    }

    pub fn dst(mut self, dst: AluDst) -> Self {
        self.dst = dst;
        self
    }

    pub fn src(mut self, index: usize, src: AluSrc) -> Self {
        self.src[index] = src;
        self
    }

    pub fn last(mut self, last: bool) -> Self {
        self.last = last;
        self
    }

    pub fn predicate(mut self) -> Self {
        self.predicate = true;
        self
    }

    pub fn force_swizzle(mut self, swizzle: BankSwizzle) -> Self {
        self.bank_swizzle_force = Some(swizzle);
        self
    }

    /// Explicit bundle id assigned when the instruction was appended.
    pub fn bundle(&self) -> u32 {
        self.bundle
    }

    /// Size of the literal pool (0, 2 or 4 words) shared by this instruction's bundle.
    pub fn nliteral(&self) -> u32 {
        self.nliteral
    }

    pub fn literal_added(&self) -> bool {
        self.literal_added
    }

    /// Literal words trailing this instruction, when it closes a bundle that uses them.
    pub fn literals(&self) -> &[u32] {
        if self.literal_added {
            &self.value[..self.nliteral as usize]
        } else {
            &[]
        }
    }

    /// Literal pool size needed by this instruction's own operands.
    pub(crate) fn literal_need(&self) -> u32 {
        self.src
            .iter()
            .filter(|src| src.sel == sel::LITERAL)
            .map(|src| (u32::from(src.chan) + 2) & 0x6)
            .max()
            .unwrap_or(0)
    }
}
