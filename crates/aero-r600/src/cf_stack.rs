//! Structured control-flow lowering.
//!
//! `IF`/`LOOP` constructs become `JUMP`/`ELSE`/`POP` and `LOOP_START`/`LOOP_END` CF
//! instructions whose targets are patched once the closing instruction exists. Open constructs
//! are tracked on a fixed-depth stack holding block indices into the CF arena.

use tracing::debug;

use crate::alu::{sel, AluDst, AluInstr, AluSrc};
use crate::bytecode::{AluClause, Bytecode};
use crate::error::CompileError;
use crate::isa::CfOp;
use crate::limits::MAX_CONTROL_FLOW_DEPTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    If,
    Loop,
}

impl FlowKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::If => "IF",
            Self::Loop => "LOOP",
        }
    }
}

#[derive(Debug)]
pub(crate) struct FlowLevel {
    kind: FlowKind,
    /// Block that opened the construct (`JUMP` or `LOOP_START`).
    start: usize,
    /// `ELSE`, `LOOP_BREAK` and `LOOP_CONTINUE` blocks patched when the construct closes.
    mid: Vec<usize>,
}

#[derive(Debug, Default)]
pub(crate) struct FlowStack {
    levels: Vec<FlowLevel>,
}

impl FlowStack {
    fn push(&mut self, kind: FlowKind, start: usize) -> Result<(), CompileError> {
        if self.levels.len() >= MAX_CONTROL_FLOW_DEPTH {
            return Err(CompileError::ControlFlowStackOverflow {
                max: MAX_CONTROL_FLOW_DEPTH,
            });
        }
        self.levels.try_reserve(1)?;
        self.levels.push(FlowLevel {
            kind,
            start,
            mid: Vec::new(),
        });
        Ok(())
    }

    fn expect_top(&self, kind: FlowKind) -> Result<(), CompileError> {
        match self.top_kind() {
            Some(top) if top == kind => Ok(()),
            found => Err(CompileError::UnbalancedControlFlow {
                expected: kind.name(),
                found: found.map_or("nothing", FlowKind::name),
            }),
        }
    }

    fn pop(&mut self, kind: FlowKind) -> Result<FlowLevel, CompileError> {
        self.expect_top(kind)?;
        self.levels
            .pop()
            .ok_or(CompileError::Internal("control flow stack underflow"))
    }

    pub(crate) fn top_kind(&self) -> Option<FlowKind> {
        self.levels.last().map(|level| level.kind)
    }

    pub(crate) fn depth(&self) -> usize {
        self.levels.len()
    }
}

/// Why a stack entry is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StackReason {
    PushVpm,
    Loop,
}

impl StackReason {
    fn elements(self) -> u32 {
        match self {
            Self::PushVpm => 1,
            Self::Loop => 4,
        }
    }
}

/// Hardware stack usage, in stack elements.
#[derive(Debug, Default)]
pub(crate) struct CallStack {
    current: u32,
    max: u32,
}

impl CallStack {
    /// Accounts for `reason`. With `max_only` the entry is only checked against the high
    /// water mark and not kept.
    fn check_depth(&mut self, reason: StackReason, max_only: bool) {
        let depth = self.current + reason.elements();
        if !max_only {
            self.current = depth;
        }
        self.max = self.max.max(depth);
    }

    fn decrease(&mut self, reason: StackReason) {
        self.current = self.current.saturating_sub(reason.elements());
    }

    pub(crate) fn max(&self) -> u32 {
        self.max
    }
}

impl Bytecode {
    /// Opens an `IF`: a predicate update testing `cond != 0` in an `ALU_PUSH_BEFORE` clause,
    /// then a `JUMP` over the body.
    ///
    /// `scratch` receives the comparison result. `literal` backs `cond` when it reads the
    /// literal selector.
    pub fn open_if(
        &mut self,
        cond: AluSrc,
        scratch: u32,
        literal: &[u32; 4],
    ) -> Result<(), CompileError> {
        if self.flow.depth() >= MAX_CONTROL_FLOW_DEPTH {
            return Err(CompileError::ControlFlowStackOverflow {
                max: MAX_CONTROL_FLOW_DEPTH,
            });
        }
        let pred = AluInstr::op2(self.alu_opcodes().pred_setne)
            .src(0, cond)
            .src(1, AluSrc::inline(sel::SRC_0))
            .dst(AluDst::gpr(scratch, 0))
            .predicate()
            .last(true);
        self.add_alu_clause(pred, AluClause::PushBefore)?;
        self.add_literal(literal)?;
        let jump = self.add_cfinst(CfOp::Jump)?;
        self.flow.push(FlowKind::If, jump)?;
        self.callstack.check_depth(StackReason::PushVpm, false);
        Ok(())
    }

    pub fn emit_else(&mut self) -> Result<(), CompileError> {
        self.flow.expect_top(FlowKind::If)?;
        let index = self.add_cfinst(CfOp::Else)?;
        self.cf[index].pop_count = 1;
        let else_id = self.cf[index].id;
        let level = self
            .flow
            .levels
            .last_mut()
            .ok_or(CompileError::Internal("control flow stack underflow"))?;
        level.mid.try_reserve(1)?;
        level.mid.push(index);
        let start = level.start;
        self.cf[start].cf_addr = else_id;
        debug!(jump = self.cf[start].id, target = else_id, "patched IF jump to ELSE");
        Ok(())
    }

    pub fn close_if(&mut self) -> Result<(), CompileError> {
        self.flow.expect_top(FlowKind::If)?;
        let pop = self.emit_pop(1)?;
        let level = self.flow.pop(FlowKind::If)?;
        let target = self.cf[pop].id + 2;
        match level.mid.first() {
            None => {
                let start = &mut self.cf[level.start];
                start.cf_addr = target;
                start.pop_count = 1;
            }
            Some(&mid) => self.cf[mid].cf_addr = target,
        }
        debug!(target, "patched ENDIF");
        self.callstack.decrease(StackReason::PushVpm);
        Ok(())
    }

    pub fn open_loop(&mut self) -> Result<(), CompileError> {
        if self.flow.depth() >= MAX_CONTROL_FLOW_DEPTH {
            return Err(CompileError::ControlFlowStackOverflow {
                max: MAX_CONTROL_FLOW_DEPTH,
            });
        }
        let start = self.add_cfinst(CfOp::LoopStartNoAl)?;
        self.flow.push(FlowKind::Loop, start)?;
        self.callstack.check_depth(StackReason::Loop, false);
        Ok(())
    }

    pub fn close_loop(&mut self) -> Result<(), CompileError> {
        self.flow.expect_top(FlowKind::Loop)?;
        let end = self.add_cfinst(CfOp::LoopEnd)?;
        let level = self.flow.pop(FlowKind::Loop)?;
        let end_id = self.cf[end].id;
        self.cf[end].cf_addr = self.cf[level.start].id + 2;
        self.cf[level.start].cf_addr = end_id + 2;
        for &mid in &level.mid {
            self.cf[mid].cf_addr = end_id;
        }
        debug!(
            start = self.cf[level.start].id,
            end = end_id,
            mids = level.mid.len(),
            "patched loop"
        );
        self.callstack.decrease(StackReason::Loop);
        Ok(())
    }

    /// Emits `LOOP_BREAK` or `LOOP_CONTINUE` for the innermost loop, followed by a `POP`.
    pub fn emit_break_or_continue(&mut self, op: CfOp) -> Result<(), CompileError> {
        if !matches!(op, CfOp::LoopBreak | CfOp::LoopContinue) {
            return Err(CompileError::Internal("not a loop exit instruction"));
        }
        let Some(depth) = self
            .flow
            .levels
            .iter()
            .rposition(|level| level.kind == FlowKind::Loop)
        else {
            return Err(CompileError::NotInLoop);
        };
        self.flow.levels[depth].mid.try_reserve(1)?;
        let index = self.add_cfinst(op)?;
        self.cf[index].pop_count = 1;
        self.flow.levels[depth].mid.push(index);
        self.emit_pop(1)?;
        self.callstack.check_depth(StackReason::PushVpm, true);
        Ok(())
    }

    fn emit_pop(&mut self, pops: u32) -> Result<usize, CompileError> {
        let index = self.add_cfinst(CfOp::Pop)?;
        let pop = &mut self.cf[index];
        pop.pop_count = pops;
        pop.cf_addr = pop.id + 2;
        Ok(index)
    }
}
