//! Placeholders and back-patching for forward jumps.
//!
//! A forward jump's target is unknown when the jump is emitted, so the
//! compiler reserves a run of `Nop`s and rewrites it in place once the
//! target offset is known. The run is wide enough for the jump instruction
//! plus one more extension prefix than the current program length needs,
//! which holds any target up to 256 times the length at reservation time.

use crate::compiler::bytecode::{Bytecode, Instruction, OpCode, split_operand};
use crate::error::CompileError;

/// Number of slots reserved for a placeholder when the program currently
/// holds `program_len` instructions.
pub fn placeholder_width(program_len: usize) -> usize {
    2 + crate::compiler::bytecode::extension_len(program_len)
}

/// A reserved run of `Nop`s awaiting a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder {
    /// First reserved slot
    pub at: usize,
    /// Number of reserved slots
    pub width: usize,
}

impl Placeholder {
    /// Reserves a placeholder at the end of `bytecode`.
    pub fn reserve(bytecode: &mut Bytecode) -> Self {
        let at = bytecode.len();
        let width = placeholder_width(at);
        for _ in 0..width {
            bytecode.emit(Instruction::simple(OpCode::Nop));
        }
        Self { at, width }
    }

    /// Rewrites the placeholder as `opcode target`, extension prefixes
    /// first. Unused trailing slots stay `Nop`.
    pub fn patch(self, bytecode: &mut Bytecode, opcode: OpCode, target: usize) -> Result<(), CompileError> {
        let (extensions, low) = split_operand(target);
        if extensions.len() + 1 > self.width {
            return Err(CompileError::JumpTargetOverflow {
                at: self.at,
                target,
            });
        }

        let mut slot = self.at;
        for byte in extensions {
            bytecode.instructions[slot] = Instruction::with_operand(OpCode::ExtendArgument, byte);
            slot += 1;
        }
        bytecode.instructions[slot] = Instruction::with_operand(opcode, low);
        Ok(())
    }
}

/// Jumps of one block that still wait for their target.
#[derive(Debug, Default)]
pub struct JumpContext {
    /// Unconditional jumps out of finished `if`/`elseif` arms
    pub jumps: Vec<Placeholder>,
    /// False branches of `if`/`elseif` conditions
    pub false_jumps: Vec<Placeholder>,
}

impl JumpContext {
    /// Returns true if any jump is unresolved.
    pub fn needs_resolution(&self) -> bool {
        !self.jumps.is_empty() || !self.false_jumps.is_empty()
    }

    /// Points every pending jump at `target`.
    pub fn resolve(&mut self, bytecode: &mut Bytecode, target: usize) -> Result<(), CompileError> {
        for placeholder in self.jumps.drain(..) {
            placeholder.patch(bytecode, OpCode::Jump, target)?;
        }
        for placeholder in self.false_jumps.drain(..) {
            placeholder.patch(bytecode, OpCode::JumpIfFalse, target)?;
        }
        Ok(())
    }

    /// Points the most recent false branch at `target`, leaving the arms'
    /// exit jumps pending. Returns false if no false branch is open.
    pub fn resolve_clause(&mut self, bytecode: &mut Bytecode, target: usize) -> Result<bool, CompileError> {
        match self.false_jumps.pop() {
            Some(placeholder) => {
                placeholder.patch(bytecode, OpCode::JumpIfFalse, target)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
