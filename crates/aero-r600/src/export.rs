//! Export (output) CF instructions.
//!
//! An export is a CF instruction in its own right: it lives in the CF header words and has no
//! clause body. Word 0 is shared by every class; word 1 is encoded by the class CF encoder.

use crate::encode::bits::{flag, get, put};
use crate::isa::CfOp;

/// Export target class (`SQ_EXPORT_*`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ExportType {
    #[default]
    Pixel,
    Pos,
    Param,
}

impl ExportType {
    pub fn raw(self) -> u32 {
        match self {
            Self::Pixel => 0,
            Self::Pos => 1,
            Self::Param => 2,
        }
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Pixel),
            1 => Some(Self::Pos),
            2 => Some(Self::Param),
            _ => None,
        }
    }
}

/// Export swizzle selectors besides the 0..=3 channels.
pub mod swizzle {
    pub const ZERO: u8 = 4;
    pub const ONE: u8 = 5;
    pub const MASK: u8 = 7;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Output {
    /// [`CfOp::Export`] or [`CfOp::ExportDone`].
    pub op: CfOp,
    pub gpr: u32,
    /// Number of dwords per element minus one.
    pub elem_size: u32,
    pub array_base: u32,
    pub export_type: ExportType,
    pub swizzle: [u8; 4],
    /// Number of consecutive GPRs exported (at least 1).
    pub burst_count: u32,
    pub end_of_program: bool,
    pub barrier: bool,
    pub rw_rel: bool,
    pub index_gpr: u32,
}

impl Output {
    /// A four component export of `gpr` with an identity swizzle.
    pub fn new(export_type: ExportType, array_base: u32, gpr: u32) -> Self {
        Self {
            op: CfOp::Export,
            gpr,
            elem_size: 3,
            array_base,
            export_type,
            swizzle: [0, 1, 2, 3],
            burst_count: 1,
            end_of_program: false,
            barrier: true,
            rw_rel: false,
            index_gpr: 0,
        }
    }

    pub fn swizzle(mut self, swizzle: [u8; 4]) -> Self {
        self.swizzle = swizzle;
        self
    }

    pub(crate) fn word0(&self) -> u32 {
        put(self.array_base, 0, 13)
            | put(self.export_type.raw(), 13, 2)
            | put(self.gpr, 15, 7)
            | flag(self.rw_rel, 22)
            | put(self.index_gpr, 23, 7)
            | put(self.elem_size, 30, 2)
    }

    /// `SWIZ_SEL_*` bits of word 1, identical on every class.
    pub(crate) fn swizzle_bits(&self) -> u32 {
        put(u32::from(self.swizzle[0]), 0, 3)
            | put(u32::from(self.swizzle[1]), 3, 3)
            | put(u32::from(self.swizzle[2]), 6, 3)
            | put(u32::from(self.swizzle[3]), 9, 3)
    }

    /// Rebuilds the fields carried by word 0 and the swizzle bits of word 1.
    pub(crate) fn decode_common(op: CfOp, w0: u32, w1: u32) -> Option<Self> {
        Some(Self {
            op,
            gpr: get(w0, 15, 7),
            elem_size: get(w0, 30, 2),
            array_base: get(w0, 0, 13),
            export_type: ExportType::from_raw(get(w0, 13, 2))?,
            swizzle: [
                get(w1, 0, 3) as u8,
                get(w1, 3, 3) as u8,
                get(w1, 6, 3) as u8,
                get(w1, 9, 3) as u8,
            ],
            burst_count: 1,
            end_of_program: false,
            barrier: get(w1, 31, 1) != 0,
            rw_rel: get(w0, 22, 1) != 0,
            index_gpr: get(w0, 23, 7),
        })
    }
}
