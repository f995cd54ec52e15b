//! GPU families and the hardware generations ("classes") they belong to.

use std::fmt;
use std::str::FromStr;

use crate::error::CompileError;
use crate::isa::CfOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipFamily {
    R600,
    Rv610,
    Rv630,
    Rv670,
    Rv620,
    Rv635,
    Rs780,
    Rs880,
    Rv770,
    Rv730,
    Rv710,
    Rv740,
    Cedar,
    Redwood,
    Juniper,
    Cypress,
    Hemlock,
    Palm,
    Sumo,
    Sumo2,
    Barts,
    Turks,
    Caicos,
    Cayman,
    /// Any family number the encoder does not know, including the pre-R600 parts.
    Unknown(u32),
}

/// `(family, raw family number, name)` in kernel family order.
const FAMILIES: [(ChipFamily, u32, &str); 24] = [
    (ChipFamily::R600, 28, "r600"),
    (ChipFamily::Rv610, 29, "rv610"),
    (ChipFamily::Rv630, 30, "rv630"),
    (ChipFamily::Rv670, 31, "rv670"),
    (ChipFamily::Rv620, 32, "rv620"),
    (ChipFamily::Rv635, 33, "rv635"),
    (ChipFamily::Rs780, 34, "rs780"),
    (ChipFamily::Rs880, 35, "rs880"),
    (ChipFamily::Rv770, 36, "rv770"),
    (ChipFamily::Rv730, 37, "rv730"),
    (ChipFamily::Rv710, 38, "rv710"),
    (ChipFamily::Rv740, 39, "rv740"),
    (ChipFamily::Cedar, 40, "cedar"),
    (ChipFamily::Redwood, 41, "redwood"),
    (ChipFamily::Juniper, 42, "juniper"),
    (ChipFamily::Cypress, 43, "cypress"),
    (ChipFamily::Hemlock, 44, "hemlock"),
    (ChipFamily::Palm, 45, "palm"),
    (ChipFamily::Sumo, 46, "sumo"),
    (ChipFamily::Sumo2, 47, "sumo2"),
    (ChipFamily::Barts, 48, "barts"),
    (ChipFamily::Turks, 49, "turks"),
    (ChipFamily::Caicos, 50, "caicos"),
    (ChipFamily::Cayman, 51, "cayman"),
];

impl ChipFamily {
    pub fn from_raw(raw: u32) -> Self {
        FAMILIES
            .iter()
            .find(|(_, r, _)| *r == raw)
            .map(|(family, _, _)| *family)
            .unwrap_or(Self::Unknown(raw))
    }

    pub fn raw(self) -> u32 {
        match self {
            Self::Unknown(raw) => raw,
            known => FAMILIES
                .iter()
                .find(|(family, _, _)| *family == known)
                .map(|(_, raw, _)| *raw)
                .unwrap_or(0),
        }
    }

    pub fn name(self) -> &'static str {
        FAMILIES
            .iter()
            .find(|(family, _, _)| *family == self)
            .map(|(_, _, name)| *name)
            .unwrap_or("unknown")
    }

    /// Hardware generation of this family.
    pub fn class(self) -> Result<ChipClass, CompileError> {
        use ChipFamily::*;
        Ok(match self {
            R600 | Rv610 | Rv630 | Rv670 | Rv620 | Rv635 | Rs780 | Rs880 => ChipClass::R600,
            Rv770 | Rv730 | Rv710 | Rv740 => ChipClass::R700,
            Cedar | Redwood | Juniper | Cypress | Hemlock | Palm | Sumo | Sumo2 | Barts
            | Turks | Caicos => ChipClass::Evergreen,
            Cayman => ChipClass::Cayman,
            Unknown(raw) => return Err(CompileError::UnsupportedFamily(raw)),
        })
    }
}

impl fmt::Display for ChipFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(raw) => write!(f, "unknown({raw})"),
            known => f.write_str(known.name()),
        }
    }
}

impl FromStr for ChipFamily {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        FAMILIES
            .iter()
            .find(|(_, _, n)| *n == name)
            .map(|(family, _, _)| *family)
            .ok_or(CompileError::UnsupportedFamily(0))
    }
}

/// Hardware generation. `R600` and `R700` share the CF encoding; `R700` and later share the
/// second ALU word layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChipClass {
    R600,
    R700,
    Evergreen,
    Cayman,
}

impl ChipClass {
    /// Chip revision number used by the kernel interface (`CHIPREV_*`).
    pub fn chiprev(self) -> u32 {
        match self {
            Self::R600 => 0,
            Self::R700 => 1,
            Self::Evergreen => 2,
            Self::Cayman => 3,
        }
    }

    /// Evergreen and Cayman share the CF word layout and the ALU opcode numbering.
    pub fn is_evergreen(self) -> bool {
        matches!(self, Self::Evergreen | Self::Cayman)
    }

    /// Whether the last export carries the end-of-program bit. Cayman ends with a CF `END`.
    pub fn export_eop(self) -> bool {
        self != Self::Cayman
    }

    pub fn needs_cf_end(self) -> bool {
        self == Self::Cayman
    }

    /// Cayman has no trans unit: transcendental ops are issued across the vector slots.
    pub fn is_vliw4(self) -> bool {
        self == Self::Cayman
    }

    /// Constants must be read through kcache windows (no constant file selectors).
    pub fn kcache_only(self) -> bool {
        self.is_evergreen()
    }

    /// Fragment inputs arrive as barycentrics and are interpolated by ALU code.
    pub fn interpolates_in_shader(self) -> bool {
        self.is_evergreen()
    }

    /// CF clause used for vertex fetches. Cayman has no vertex cache clause and fetches through
    /// the texture cache.
    pub fn vertex_fetch_op(self) -> CfOp {
        if self == Self::Cayman {
            CfOp::Tex
        } else {
            CfOp::Vtx
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_round_trips_for_known_families() {
        for (family, raw, _) in FAMILIES {
            assert_eq!(ChipFamily::from_raw(raw), family);
            assert_eq!(family.raw(), raw);
        }
        assert_eq!(ChipFamily::from_raw(3), ChipFamily::Unknown(3));
        assert_eq!(ChipFamily::Unknown(3).raw(), 3);
    }

    #[test]
    fn classes() {
        assert_eq!(ChipFamily::Rs880.class().unwrap(), ChipClass::R600);
        assert_eq!(ChipFamily::Rv740.class().unwrap(), ChipClass::R700);
        assert_eq!(ChipFamily::Caicos.class().unwrap(), ChipClass::Evergreen);
        assert_eq!(ChipFamily::Cayman.class().unwrap(), ChipClass::Cayman);
        assert!(matches!(
            ChipFamily::from_raw(12).class(),
            Err(CompileError::UnsupportedFamily(12))
        ));
    }

    #[test]
    fn parse_by_name() {
        assert_eq!("RV770".parse::<ChipFamily>().unwrap(), ChipFamily::Rv770);
        assert_eq!(" cypress ".parse::<ChipFamily>().unwrap(), ChipFamily::Cypress);
        assert!("r300".parse::<ChipFamily>().is_err());
        assert_eq!(ChipFamily::Juniper.to_string(), "juniper");
        assert_eq!(ChipFamily::Unknown(7).to_string(), "unknown(7)");
    }
}
