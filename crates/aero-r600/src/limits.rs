//! Centralized hardware and translator limits for the R600 family back-end.
//!
//! The numbers here come from the width of the CF `COUNT` fields and the size of the sequencer
//! stacks. Builders consult them when deciding whether the current CF block can grow.

/// Number of ALU slots (two dwords each) after which a closing bundle forces a new ALU clause.
///
/// The ALU CF `COUNT` field is 7 bits wide (128 slots). Literals share the same slot budget, so
/// the builder stops short of the limit to leave room for the trailing literal words of the
/// bundle that crosses the threshold.
pub(crate) const MAX_ALU_SLOTS_PER_BLOCK: u32 = 120;

/// Maximum number of vertex or texture fetch instructions held by one fetch clause.
pub(crate) const MAX_FETCH_PER_BLOCK: u32 = 8;

/// Maximum number of ALU instructions co-issued in one bundle (x, y, z, w and trans).
pub(crate) const MAX_BUNDLE_SIZE: usize = 5;

/// Depth of the structured control-flow stack (`IF`/`LOOP` nesting).
pub(crate) const MAX_CONTROL_FLOW_DEPTH: usize = 32;

/// Number of general purpose registers addressable by an ALU selector.
pub(crate) const MAX_GPR: u32 = 128;

/// GPRs reserved past the declared registers for translator scratch values.
///
/// The busiest lowering (TXD with a constant coordinate and constant gradients) writes
/// `temp_reg` and four more registers split out of its operands.
pub(crate) const SCRATCH_GPRS: u32 = 5;

/// Number of interpolation parameters addressable on Evergreen, from `PARAM_BASE` to the end of
/// the constant file selectors.
pub(crate) const MAX_INTERP_PARAMS: u32 = 64;

/// Number of constants reachable through the two locked kcache windows.
pub(crate) const MAX_KCACHE_CONSTANTS: u32 = 64;

/// Number of constants reachable through the constant file selectors.
pub(crate) const MAX_CFILE_CONSTANTS: u32 = 256;

/// Number of distinct constant file reads a bundle may issue.
pub(crate) const MAX_CFILE_READS_PER_BUNDLE: usize = 4;
