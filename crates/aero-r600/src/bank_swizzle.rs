//! Bank swizzle selection for closed ALU bundles.
//!
//! Every ALU source is read through one of three read cycles. The bank swizzle of an
//! instruction picks which cycle each source uses. Selection is a fixed table lookup keyed by
//! which sources are constants; the tables are part of the hardware contract and are kept as
//! data. After selection the bundle is checked against the register read ports so that a
//! scheduling bug upstream surfaces as [`CompileError::BankSwizzleConflict`] instead of
//! silently wrong reads.

use tracing::trace;

use crate::alu::{sel, AluInstr};
use crate::error::CompileError;
use crate::isa::AluOpcodes;
use crate::limits::MAX_CFILE_READS_PER_BUNDLE;

/// Raw `BANK_SWIZZLE` field value. Vector and scalar (trans) slots interpret the same numbers
/// differently, hence a newtype with two sets of names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BankSwizzle(pub u8);

impl BankSwizzle {
    pub const VEC_012: Self = Self(0);
    pub const VEC_021: Self = Self(1);
    pub const VEC_120: Self = Self(2);
    pub const VEC_102: Self = Self(3);
    pub const VEC_201: Self = Self(4);
    pub const VEC_210: Self = Self(5);

    pub const SCL_210: Self = Self(0);
    pub const SCL_122: Self = Self(1);
    pub const SCL_212: Self = Self(2);
    pub const SCL_221: Self = Self(3);

    /// Read cycle of source `src` when used in a vector slot.
    pub fn vector_cycle(self, src: usize) -> Option<u8> {
        let cycles: [u8; 3] = match self.0 {
            0 => [0, 1, 2],
            1 => [0, 2, 1],
            2 => [1, 2, 0],
            3 => [1, 0, 2],
            4 => [2, 0, 1],
            5 => [2, 1, 0],
            _ => return None,
        };
        cycles.get(src).copied()
    }

    /// Read cycle of source `src` when used in the scalar (trans) slot.
    pub fn scalar_cycle(self, src: usize) -> Option<u8> {
        let cycles: [u8; 3] = match self.0 {
            0 => [2, 1, 0],
            1 => [1, 2, 2],
            2 => [2, 1, 2],
            3 => [2, 2, 1],
            _ => return None,
        };
        cycles.get(src).copied()
    }
}

/// Indexed by the constant key of [`swizzle_key`].
const BANK_SWIZZLE_VEC: [BankSwizzle; 8] = [
    BankSwizzle::VEC_210, // 000
    BankSwizzle::VEC_120, // 001
    BankSwizzle::VEC_102, // 010
    BankSwizzle::VEC_201, // 011
    BankSwizzle::VEC_012, // 100
    BankSwizzle::VEC_021, // 101
    BankSwizzle::VEC_012, // 110
    BankSwizzle::VEC_012, // 111
];

const BANK_SWIZZLE_SCL: [BankSwizzle; 8] = [
    BankSwizzle::SCL_210, // 000
    BankSwizzle::SCL_122, // 001
    BankSwizzle::SCL_122, // 010
    BankSwizzle::SCL_221, // 011
    BankSwizzle::SCL_212, // 100
    BankSwizzle::SCL_122, // 101
    BankSwizzle::SCL_122, // 110
    BankSwizzle::SCL_122, // 111
];

/// 3-bit key: bit 2 set when src0 is a constant, bit 1 for src1, bit 0 for src2.
///
/// Sources past the instruction's operand count count as non-constant.
pub fn swizzle_key(alu: &AluInstr, ops: &AluOpcodes) -> u8 {
    let nsrc = ops.num_operands(alu.inst, alu.is_op3);
    alu.src
        .iter()
        .enumerate()
        .fold(0u8, |key, (i, src)| {
            let bit = u8::from(i < nsrc && sel::is_const(src.sel));
            key | (bit << (2 - i))
        })
}

/// Table lookup. `bundle_len == 1` selects the scalar table.
pub fn select(key: u8, bundle_len: usize) -> BankSwizzle {
    let table = if bundle_len == 1 {
        &BANK_SWIZZLE_SCL
    } else {
        &BANK_SWIZZLE_VEC
    };
    table[usize::from(key & 0x7)]
}

/// Register read ports of one bundle.
#[derive(Default)]
struct ReadPorts {
    /// `gpr[cycle][chan]` holds the GPR read on that port.
    gpr: [[Option<u32>; 4]; 3],
    cfile: Vec<(u32, u8)>,
}

impl ReadPorts {
    fn reserve_gpr(&mut self, gpr: u32, chan: u8, cycle: u8) -> bool {
        let port = &mut self.gpr[usize::from(cycle)][usize::from(chan & 3)];
        match port {
            Some(held) => *held == gpr,
            None => {
                *port = Some(gpr);
                true
            }
        }
    }

    fn reserve_cfile(&mut self, sel: u32, chan: u8) -> bool {
        if self.cfile.contains(&(sel, chan)) {
            return true;
        }
        if self.cfile.len() == MAX_CFILE_READS_PER_BUNDLE {
            return false;
        }
        self.cfile.push((sel, chan));
        true
    }
}

/// Assigns a bank swizzle to every instruction of a closed bundle and checks the read ports.
pub(crate) fn resolve(
    bundle: &mut [AluInstr],
    ops: &AluOpcodes,
    bundle_id: u32,
) -> Result<(), CompileError> {
    let len = bundle.len();
    for alu in bundle.iter_mut() {
        alu.bank_swizzle = match alu.bank_swizzle_force {
            Some(forced) => forced,
            None => select(swizzle_key(alu, ops), len),
        };
    }

    let conflict = |reason| CompileError::BankSwizzleConflict {
        bundle: bundle_id,
        reason,
    };
    let mut ports = ReadPorts::default();
    for alu in bundle.iter() {
        if len == 1 {
            check_scalar(alu, ops, &mut ports).map_err(conflict)?;
        } else {
            check_vector(alu, ops, &mut ports).map_err(conflict)?;
        }
    }
    trace!(
        bundle = bundle_id,
        len,
        swizzles = ?bundle.iter().map(|alu| alu.bank_swizzle.0).collect::<Vec<_>>(),
        "resolved bank swizzle"
    );
    Ok(())
}

fn check_vector(
    alu: &AluInstr,
    ops: &AluOpcodes,
    ports: &mut ReadPorts,
) -> Result<(), &'static str> {
    let nsrc = ops.num_operands(alu.inst, alu.is_op3);
    for (i, src) in alu.src.iter().take(nsrc).enumerate() {
        if sel::is_gpr(src.sel) {
            // src1 reading the same component as src0 shares its port.
            if i == 1 && src.sel == alu.src[0].sel && src.chan == alu.src[0].chan {
                continue;
            }
            let cycle = alu
                .bank_swizzle
                .vector_cycle(i)
                .ok_or("invalid vector bank swizzle")?;
            if !ports.reserve_gpr(src.sel, src.chan, cycle) {
                return Err("GPR read port already taken by another register");
            }
        } else if sel::is_cfile(src.sel) || sel::is_kcache(src.sel) {
            if !ports.reserve_cfile(src.sel, src.chan) {
                return Err("more than four constant reads");
            }
        }
    }
    Ok(())
}

fn check_scalar(
    alu: &AluInstr,
    ops: &AluOpcodes,
    ports: &mut ReadPorts,
) -> Result<(), &'static str> {
    let nsrc = ops.num_operands(alu.inst, alu.is_op3);
    let sources = &alu.src[..nsrc];

    let mut const_count = 0u8;
    for src in sources {
        if sel::is_const(src.sel) {
            const_count += 1;
            if (sel::is_cfile(src.sel) || sel::is_kcache(src.sel))
                && !ports.reserve_cfile(src.sel, src.chan)
            {
                return Err("more than four constant reads");
            }
        }
    }

    for (i, src) in sources.iter().enumerate() {
        if !sel::is_gpr(src.sel) {
            continue;
        }
        let cycle = alu
            .bank_swizzle
            .scalar_cycle(i)
            .ok_or("invalid scalar bank swizzle")?;
        // Constants occupy the first cycles of the trans slot.
        if cycle < const_count {
            return Err("GPR read in a cycle taken by a constant");
        }
        if !ports.reserve_gpr(src.sel, src.chan, cycle) {
            return Err("GPR read port already taken by another register");
        }
    }
    Ok(())
}
