//! Vertex and texture fetch micro-instructions.
//!
//! Both kinds take four dwords in a fetch clause, the last one always zero. The layouts are the
//! same on every class, so one encoder per kind is shared.

use crate::encode::bits::{flag, get, put};

/// Selector value masking a destination channel.
pub const SEL_MASK: u8 = 7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VtxInstr {
    pub inst: u32,
    /// 0 = per-vertex, 1 = per-instance data.
    pub fetch_type: u8,
    pub buffer_id: u32,
    pub src_gpr: u32,
    pub src_rel: bool,
    pub src_sel_x: u8,
    pub mega_fetch_count: u8,
    pub dst_gpr: u32,
    pub dst_rel: bool,
    pub dst_sel: [u8; 4],
    /// Take format fields from the fetch constant instead of the instruction.
    pub use_const_fields: bool,
    pub data_format: u32,
    pub num_format_all: u8,
    pub format_comp_all: bool,
    pub srf_mode_all: bool,
    pub offset: u32,
    pub endian_swap: u8,
    pub mega_fetch: bool,
}

impl VtxInstr {
    /// Fetch of a whole vertex element from `buffer_id`, indexed by `src_gpr.x`.
    pub fn fetch(buffer_id: u32, src_gpr: u32, dst_gpr: u32) -> Self {
        Self {
            buffer_id,
            src_gpr,
            dst_gpr,
            mega_fetch_count: 0x1F,
            dst_sel: [0, 1, 2, 3],
            use_const_fields: true,
            mega_fetch: true,
            ..Self::default()
        }
    }

    pub fn encode(&self) -> [u32; 4] {
        let w0 = put(self.inst, 0, 5)
            | put(u32::from(self.fetch_type), 5, 2)
            | put(self.buffer_id, 8, 8)
            | put(self.src_gpr, 16, 7)
            | flag(self.src_rel, 23)
            | put(u32::from(self.src_sel_x), 24, 2)
            | put(u32::from(self.mega_fetch_count), 26, 6);
        let w1 = put(self.dst_gpr, 0, 7)
            | flag(self.dst_rel, 7)
            | put(u32::from(self.dst_sel[0]), 9, 3)
            | put(u32::from(self.dst_sel[1]), 12, 3)
            | put(u32::from(self.dst_sel[2]), 15, 3)
            | put(u32::from(self.dst_sel[3]), 18, 3)
            | flag(self.use_const_fields, 21)
            | put(self.data_format, 22, 6)
            | put(u32::from(self.num_format_all), 28, 2)
            | flag(self.format_comp_all, 30)
            | flag(self.srf_mode_all, 31);
        let w2 = put(self.offset, 0, 16)
            | put(u32::from(self.endian_swap), 16, 2)
            | flag(self.mega_fetch, 19);
        [w0, w1, w2, 0]
    }

    pub fn decode(words: [u32; 4]) -> Self {
        let [w0, w1, w2, _] = words;
        Self {
            inst: get(w0, 0, 5),
            fetch_type: get(w0, 5, 2) as u8,
            buffer_id: get(w0, 8, 8),
            src_gpr: get(w0, 16, 7),
            src_rel: get(w0, 23, 1) != 0,
            src_sel_x: get(w0, 24, 2) as u8,
            mega_fetch_count: get(w0, 26, 6) as u8,
            dst_gpr: get(w1, 0, 7),
            dst_rel: get(w1, 7, 1) != 0,
            dst_sel: [
                get(w1, 9, 3) as u8,
                get(w1, 12, 3) as u8,
                get(w1, 15, 3) as u8,
                get(w1, 18, 3) as u8,
            ],
            use_const_fields: get(w1, 21, 1) != 0,
            data_format: get(w1, 22, 6),
            num_format_all: get(w1, 28, 2) as u8,
            format_comp_all: get(w1, 30, 1) != 0,
            srf_mode_all: get(w1, 31, 1) != 0,
            offset: get(w2, 0, 16),
            endian_swap: get(w2, 16, 2) as u8,
            mega_fetch: get(w2, 19, 1) != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TexInstr {
    pub inst: u32,
    pub resource_id: u32,
    pub sampler_id: u32,
    pub src_gpr: u32,
    pub src_rel: bool,
    pub src_sel: [u8; 4],
    pub dst_gpr: u32,
    pub dst_rel: bool,
    pub dst_sel: [u8; 4],
    /// Signed LOD bias in 1/16 steps (7 bits).
    pub lod_bias: i8,
    /// `true` selects normalized coordinates for the channel.
    pub coord_type: [bool; 4],
    /// Signed texel offsets in 1/2 steps (5 bits each).
    pub offset: [i8; 3],
}

impl TexInstr {
    pub fn encode(&self) -> [u32; 4] {
        let w0 = put(self.inst, 0, 5)
            | put(self.resource_id, 8, 8)
            | put(self.src_gpr, 16, 7)
            | flag(self.src_rel, 23);
        let w1 = put(self.dst_gpr, 0, 7)
            | flag(self.dst_rel, 7)
            | put(u32::from(self.dst_sel[0]), 9, 3)
            | put(u32::from(self.dst_sel[1]), 12, 3)
            | put(u32::from(self.dst_sel[2]), 15, 3)
            | put(u32::from(self.dst_sel[3]), 18, 3)
            | put(self.lod_bias as u32, 21, 7)
            | flag(self.coord_type[0], 28)
            | flag(self.coord_type[1], 29)
            | flag(self.coord_type[2], 30)
            | flag(self.coord_type[3], 31);
        let w2 = put(self.offset[0] as u32, 0, 5)
            | put(self.offset[1] as u32, 5, 5)
            | put(self.offset[2] as u32, 10, 5)
            | put(self.sampler_id, 15, 5)
            | put(u32::from(self.src_sel[0]), 20, 3)
            | put(u32::from(self.src_sel[1]), 23, 3)
            | put(u32::from(self.src_sel[2]), 26, 3)
            | put(u32::from(self.src_sel[3]), 29, 3);
        [w0, w1, w2, 0]
    }

    pub fn decode(words: [u32; 4]) -> Self {
        let [w0, w1, w2, _] = words;
        Self {
            inst: get(w0, 0, 5),
            resource_id: get(w0, 8, 8),
            src_gpr: get(w0, 16, 7),
            src_rel: get(w0, 23, 1) != 0,
            dst_gpr: get(w1, 0, 7),
            dst_rel: get(w1, 7, 1) != 0,
            dst_sel: [
                get(w1, 9, 3) as u8,
                get(w1, 12, 3) as u8,
                get(w1, 15, 3) as u8,
                get(w1, 18, 3) as u8,
            ],
            lod_bias: sign_extend(get(w1, 21, 7), 7),
            coord_type: [
                get(w1, 28, 1) != 0,
                get(w1, 29, 1) != 0,
                get(w1, 30, 1) != 0,
                get(w1, 31, 1) != 0,
            ],
            offset: [
                sign_extend(get(w2, 0, 5), 5),
                sign_extend(get(w2, 5, 5), 5),
                sign_extend(get(w2, 10, 5), 5),
            ],
            sampler_id: get(w2, 15, 5),
            src_sel: [
                get(w2, 20, 3) as u8,
                get(w2, 23, 3) as u8,
                get(w2, 26, 3) as u8,
                get(w2, 29, 3) as u8,
            ],
        }
    }
}

fn sign_extend(value: u32, bits: u32) -> i8 {
    let shift = 32 - bits;
    (((value << shift) as i32) >> shift) as i8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::tex;

    #[test]
    fn vertex_fetch_layout() {
        let vtx = VtxInstr::fetch(3, 0, 5);
        let words = vtx.encode();
        assert_eq!(words[0], (3 << 8) | (0x1F << 26));
        assert_eq!(words[1], 5 | (1 << 12) | (2 << 15) | (3 << 18) | (1 << 21));
        assert_eq!(words[2], 1 << 19);
        assert_eq!(words[3], 0);
        assert_eq!(VtxInstr::decode(words), vtx);
    }

    #[test]
    fn texture_fields_survive_decode() {
        let tex = TexInstr {
            inst: tex::SAMPLE_C,
            resource_id: 2,
            sampler_id: 2,
            src_gpr: 9,
            src_sel: [0, 1, 2, 2],
            dst_gpr: 4,
            dst_sel: [0, 1, SEL_MASK, SEL_MASK],
            lod_bias: -3,
            coord_type: [true, true, false, false],
            offset: [-2, 1, 0],
            ..TexInstr::default()
        };
        assert_eq!(TexInstr::decode(tex.encode()), tex);
        assert_eq!(tex.encode()[0] & 0x1F, tex::SAMPLE_C);
    }
}
