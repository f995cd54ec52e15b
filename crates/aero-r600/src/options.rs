//! Translator configuration.

use crate::family::ChipClass;

/// How CONSTANT registers are addressed by ALU instructions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConstantMode {
    /// Constant file selectors 256..511 (R600/R700 only).
    #[default]
    ConstantFile,
    /// Two locked kcache windows, selectors 128..191.
    Kcache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    pub constant_mode: ConstantMode,
    /// Vertex inputs are loaded by a separate fetch shader called at program start.
    pub fetch_shader: bool,
    /// Use the inline 0.0, 1.0 and 0.5 selectors for replicated immediates.
    pub inline_special_constants: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            constant_mode: ConstantMode::ConstantFile,
            fetch_shader: false,
            inline_special_constants: true,
        }
    }
}

impl CompileOptions {
    /// Constant addressing actually used on `class`; Evergreen has no constant file selectors.
    pub fn constant_mode_for(&self, class: ChipClass) -> ConstantMode {
        if class.kcache_only() {
            ConstantMode::Kcache
        } else {
            self.constant_mode
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evergreen_forces_kcache() {
        let options = CompileOptions::default();
        assert_eq!(options.constant_mode_for(ChipClass::R700), ConstantMode::ConstantFile);
        assert_eq!(options.constant_mode_for(ChipClass::Evergreen), ConstantMode::Kcache);
        assert_eq!(options.constant_mode_for(ChipClass::Cayman), ConstantMode::Kcache);
    }
}
