//! Code generation from AST to bytecode.
//!
//! This module contains the `Compiler`, which flattens a [`Program`] into a
//! linear instruction stream for the VM. Every expression leaves exactly one
//! binding on the operand stack; operands are emitted before the operator
//! that consumes them.

mod jump;

#[cfg(test)]
mod tests;

pub use jump::{JumpContext, Placeholder, placeholder_width};

use std::fmt;

use crate::ast::*;
use crate::compiler::bytecode::{Bytecode, ComparisonBit, Instruction, OpCode, Syscall};
use crate::compiler::pools::{self, Constant, Entity, Pools, classify};
use crate::error::CompileError;
use crate::vm::is_keyword;

/// Flattened bytecode together with the pools it indexes.
#[derive(Debug, Clone, Default)]
pub struct CompiledProgram {
    /// Instruction stream
    pub bytecode: Bytecode,
    /// Constants and names referenced by operands
    pub pools: Pools,
}

impl CompiledProgram {
    /// Disassembly listing.
    pub fn listing(&self) -> String {
        self.bytecode.listing(&self.pools)
    }
}

impl fmt::Display for CompiledProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.listing())
    }
}

/// Compiles AST to bytecode.
pub struct Compiler {
    /// The bytecode being generated
    pub bytecode: Bytecode,
    /// Pools built by the first pass
    pools: Pools,
    /// `BindSection` of a method definition whose body is still to come
    pending_section: Option<(Placeholder, usize)>,
}

impl Compiler {
    /// Creates a new compiler.
    pub fn new() -> Self {
        Self {
            bytecode: Bytecode::new(),
            pools: Pools::new(),
            pending_section: None,
        }
    }

    /// Compiles a program. The main block ends with an implicit `return`.
    pub fn compile(&mut self, program: &Program) -> Result<CompiledProgram, CompileError> {
        self.pools = Pools::collect(program);
        self.bytecode = Bytecode::new();
        self.pending_section = None;

        self.flatten_block(&program.main)?;
        self.emit_with(OpCode::Return, 0);

        if let Some((_, line)) = self.pending_section.take() {
            return Err(CompileError::MissingMethodBody { line });
        }

        tracing::debug!(
            instructions = self.bytecode.len(),
            statements = self.bytecode.lines.len(),
            "flattened program"
        );

        Ok(CompiledProgram {
            bytecode: std::mem::take(&mut self.bytecode),
            pools: std::mem::take(&mut self.pools),
        })
    }

    fn emit(&mut self, opcode: OpCode) -> usize {
        self.bytecode.emit(Instruction::simple(opcode))
    }

    fn emit_with(&mut self, opcode: OpCode, operand: usize) -> usize {
        self.bytecode.emit_with_operand(opcode, operand)
    }

    fn reserve(&mut self) -> Placeholder {
        Placeholder::reserve(&mut self.bytecode)
    }

    // ========================================================================
    // Blocks and Control Flow
    // ========================================================================

    fn flatten_block(&mut self, block: &Block) -> Result<(), CompileError> {
        let mut context = JumpContext::default();
        let mut owner: Option<&Operation> = None;
        let mut owner_start = 0;

        for executable in &block.executables {
            match executable {
                Executable::Block(body) => {
                    // An arm's body keeps the chain's jumps pending.
                    if !owner.is_some_and(Operation::is_if_chain) {
                        let here = self.bytecode.len();
                        context.resolve(&mut self.bytecode, here)?;
                    }

                    match owner.map(|op| op.kind) {
                        Some(OperationType::While) => self.flatten_while(body, owner_start)?,
                        Some(OperationType::If | OperationType::ElseIf) => {
                            self.flatten_scoped_block(body)?;
                            context.jumps.push(self.reserve());
                        }
                        Some(OperationType::DefineMethod) => self.flatten_method_body(body)?,
                        _ => self.flatten_scoped_block(body)?,
                    }
                    owner = None;
                }
                Executable::Operation(op) => {
                    let here = self.bytecode.len();
                    if op.continues_if_chain() {
                        if !context.resolve_clause(&mut self.bytecode, here)? {
                            return Err(CompileError::DanglingClause {
                                kind: op.kind,
                                line: op.line,
                            });
                        }
                    } else {
                        context.resolve(&mut self.bytecode, here)?;
                    }

                    owner_start = here;
                    self.bytecode.mark_line(here, op.line);
                    self.flatten_operation(op)?;

                    if !op.is_conditional_jump() {
                        self.emit(OpCode::EndStatement);
                    }
                    if op.is_if_conditional() {
                        context.false_jumps.push(self.reserve());
                    }
                    owner = Some(op);
                }
            }
        }

        let end = self.bytecode.len();
        context.resolve(&mut self.bytecode, end)
    }

    fn flatten_scoped_block(&mut self, body: &Block) -> Result<(), CompileError> {
        self.emit(OpCode::EnterLocal);
        self.flatten_block(body)?;
        self.emit(OpCode::LeaveLocal);
        Ok(())
    }

    fn flatten_while(&mut self, body: &Block, condition_start: usize) -> Result<(), CompileError> {
        let exit = self.reserve();
        self.flatten_scoped_block(body)?;
        self.emit_with(OpCode::Jump, condition_start);
        let end = self.bytecode.len();
        exit.patch(&mut self.bytecode, OpCode::JumpIfFalse, end)
    }

    fn flatten_method_body(&mut self, body: &Block) -> Result<(), CompileError> {
        let Some((section, _)) = self.pending_section.take() else {
            return Err(CompileError::MissingMethodBody { line: 0 });
        };

        let skip = self.reserve();
        let start = self.bytecode.len();
        section.patch(&mut self.bytecode, OpCode::BindSection, start)?;

        self.flatten_block(body)?;
        self.emit_with(OpCode::Return, 0);

        let end = self.bytecode.len();
        skip.patch(&mut self.bytecode, OpCode::Jump, end)
    }

    // ========================================================================
    // Statement and Expression Compilation
    // ========================================================================

    fn flatten_operation(&mut self, op: &Operation) -> Result<(), CompileError> {
        match op.kind {
            OperationType::Ref | OperationType::ScopeResolution => self.flatten_resolution(op, true),

            OperationType::Assign => {
                let [target, value] = operands(op)?;
                self.flatten_resolution(target, false)?;
                self.flatten_operation(value)?;
                self.emit(OpCode::Assign);
                Ok(())
            }

            OperationType::IsEqual
            | OperationType::IsLessThan
            | OperationType::IsGreaterThan
            | OperationType::IsLessThanOrEqual
            | OperationType::IsGreaterThanOrEqual => {
                let bit = match op.kind {
                    OperationType::IsEqual => ComparisonBit::Equal,
                    OperationType::IsLessThan => ComparisonBit::Less,
                    OperationType::IsGreaterThan => ComparisonBit::Greater,
                    OperationType::IsLessThanOrEqual => ComparisonBit::LessOrEqual,
                    _ => ComparisonBit::GreaterOrEqual,
                };
                self.flatten_binary(op, OpCode::Compare)?;
                self.emit_with(OpCode::LoadComparisonBit, bit as usize);
                Ok(())
            }

            OperationType::IsNotEqual => self.flatten_binary(op, OpCode::NotEqual),
            OperationType::Add => self.flatten_binary(op, OpCode::Add),
            OperationType::Subtract => self.flatten_binary(op, OpCode::Subtract),
            OperationType::Multiply => self.flatten_binary(op, OpCode::Multiply),
            OperationType::Divide => self.flatten_binary(op, OpCode::Divide),
            OperationType::And => self.flatten_binary(op, OpCode::And),
            OperationType::Or => self.flatten_binary(op, OpCode::Or),

            OperationType::Not => {
                let [operand] = operands(op)?;
                self.flatten_operation(operand)?;
                self.emit(OpCode::Not);
                Ok(())
            }

            OperationType::Print => {
                let [value] = operands(op)?;
                self.flatten_operation(value)?;
                self.emit_with(OpCode::Syscall, Syscall::Print as usize);
                Ok(())
            }

            OperationType::Ask => {
                match op.operands.as_slice() {
                    [] => {}
                    [prompt] => {
                        self.flatten_operation(prompt)?;
                        self.emit_with(OpCode::Syscall, Syscall::Print as usize);
                        self.emit(OpCode::EndStatement);
                    }
                    _ => return Err(operand_count(op, 1)),
                }
                self.emit_with(OpCode::Syscall, Syscall::ReadLine as usize);
                Ok(())
            }

            OperationType::Return => match op.operands.as_slice() {
                [] => {
                    self.emit_with(OpCode::Return, 0);
                    Ok(())
                }
                [value] => {
                    self.flatten_operation(value)?;
                    self.emit_with(OpCode::Return, 1);
                    Ok(())
                }
                _ => Err(operand_count(op, 1)),
            },

            // The condition is left for the jump that follows it.
            OperationType::If | OperationType::ElseIf | OperationType::While => {
                let [condition] = operands(op)?;
                self.flatten_operation(condition)
            }
            OperationType::Else => Ok(()),

            OperationType::DefineMethod => self.flatten_define_method(op),
            OperationType::Evaluate => self.flatten_evaluate(op),

            OperationType::New => {
                let [target] = operands(op)?;
                self.flatten_resolution(target, true)?;
                self.emit(OpCode::Copy);
                Ok(())
            }

            OperationType::Index => {
                let [target, index] = operands(op)?;
                self.flatten_operation(target)?;
                self.flatten_operation(index)?;
                self.emit(OpCode::ArrayIndex);
                Ok(())
            }

            OperationType::Tuple => Err(CompileError::MisplacedTuple { line: op.line }),
        }
    }

    fn flatten_binary(&mut self, op: &Operation, opcode: OpCode) -> Result<(), CompileError> {
        let [lhs, rhs] = operands(op)?;
        self.flatten_operation(lhs)?;
        self.flatten_operation(rhs)?;
        self.emit(opcode);
        Ok(())
    }

    /// Emits a name or literal reference. Without `dereference` the result
    /// stays addressable for assignment.
    fn flatten_resolution(&mut self, op: &Operation, dereference: bool) -> Result<(), CompileError> {
        match op.kind {
            OperationType::Ref => self.flatten_reference(op, dereference),
            OperationType::ScopeResolution => match op.operands.as_slice() {
                [single] => self.flatten_resolution(single, dereference),
                [target, member] => {
                    self.flatten_resolution(target, true)?;
                    let name = self.name_index(member)?;
                    self.emit_with(OpCode::LoadName, name);
                    self.emit(OpCode::ResolveScoped);
                    if dereference {
                        self.emit(OpCode::Dereference);
                    }
                    Ok(())
                }
                _ => Err(operand_count(op, 2)),
            },
            _ => self.flatten_operation(op),
        }
    }

    fn flatten_reference(&mut self, leaf: &Operation, dereference: bool) -> Result<(), CompileError> {
        let reference = leaf
            .value
            .as_ref()
            .ok_or(CompileError::MissingReference { line: leaf.line })?;

        match classify(reference) {
            Entity::Constant(constant) => {
                let index = self.constant_index(&constant)?;
                self.emit_with(OpCode::LoadLiteral, index);
            }
            Entity::Name(name) => {
                let index = self.interned_name(name)?;
                self.emit_with(OpCode::LoadName, index);
                self.emit(OpCode::ResolveDirect);
                if dereference && !is_keyword(name) {
                    self.emit(OpCode::Dereference);
                }
            }
        }
        Ok(())
    }

    fn flatten_define_method(&mut self, op: &Operation) -> Result<(), CompileError> {
        let (target, parameters) = match op.operands.as_slice() {
            [target] => (target, None),
            [target, parameters] => (target, Some(parameters)),
            _ => return Err(operand_count(op, 2)),
        };

        self.flatten_resolution(target, false)?;

        let parameters: Vec<&Operation> = match parameters {
            None => Vec::new(),
            Some(p) if p.is_nothing() => Vec::new(),
            Some(p) if p.kind == OperationType::Tuple => p.operands.iter().collect(),
            Some(p) => vec![p],
        };
        for parameter in &parameters {
            let index = self.name_index(parameter)?;
            self.emit_with(OpCode::LoadName, index);
        }
        self.emit_with(OpCode::DefineMethod, parameters.len());

        if let Some((_, line)) = self.pending_section {
            return Err(CompileError::MissingMethodBody { line });
        }
        let section = self.reserve();
        self.pending_section = Some((section, op.line));

        self.emit(OpCode::Assign);
        Ok(())
    }

    fn flatten_evaluate(&mut self, op: &Operation) -> Result<(), CompileError> {
        let (caller, method, arguments) = match op.operands.as_slice() {
            [caller, method] => (caller, method, None),
            [caller, method, arguments] => (caller, method, Some(arguments)),
            _ => return Err(operand_count(op, 3)),
        };
        let method_name = method
            .leaf_name()
            .ok_or(CompileError::ExpectedName { line: method.line })?;
        let method_index = self.interned_name(method_name)?;

        if caller.is_nothing() {
            self.emit_with(OpCode::LoadLiteral, pools::NOTHING);
            self.emit_with(OpCode::LoadName, method_index);
            self.emit(OpCode::ResolveDirect);
        } else {
            self.flatten_resolution(caller, true)?;
            self.emit(OpCode::Duplicate);
            self.emit_with(OpCode::LoadName, method_index);
            self.emit(OpCode::ResolveScoped);
        }
        if !is_keyword(method_name) {
            self.emit(OpCode::Dereference);
        }

        // Methods always run on a copy of the binding they were found through.
        self.emit(OpCode::Copy);

        let count = match arguments {
            None => 0,
            Some(a) if a.is_nothing() => 0,
            Some(a) if a.kind == OperationType::Tuple => {
                for argument in &a.operands {
                    self.flatten_operation(argument)?;
                }
                a.operands.len()
            }
            Some(a) => {
                self.flatten_operation(a)?;
                1
            }
        };
        self.emit_with(OpCode::Evaluate, count);
        Ok(())
    }

    // ========================================================================
    // Pool Lookups
    // ========================================================================

    fn constant_index(&self, constant: &Constant) -> Result<usize, CompileError> {
        self.pools
            .constants
            .index_of(constant)
            .ok_or_else(|| CompileError::NotInterned(constant.to_string()))
    }

    fn interned_name(&self, name: &str) -> Result<usize, CompileError> {
        self.pools
            .names
            .index_of(name)
            .ok_or_else(|| CompileError::NotInterned(name.to_string()))
    }

    fn name_index(&self, op: &Operation) -> Result<usize, CompileError> {
        let name = op
            .leaf_name()
            .ok_or(CompileError::ExpectedName { line: op.line })?;
        // Well-known names are pooled as constants, never as names.
        self.pools
            .names
            .index_of(name)
            .ok_or(CompileError::ExpectedName { line: op.line })
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

fn operands<const N: usize>(op: &Operation) -> Result<&[Operation; N], CompileError> {
    op.operands
        .as_slice()
        .try_into()
        .map_err(|_| operand_count(op, N))
}

fn operand_count(op: &Operation, expected: usize) -> CompileError {
    CompileError::OperandCount {
        kind: op.kind,
        line: op.line,
        expected,
        found: op.operands.len(),
    }
}
