//! The bytecode interpreter.

use rustc_hash::FxHashMap;

use super::console::{Console, Input};
use super::operators;
use crate::compiler::bytecode::{ComparisonBit, OpCode, Syscall};
use crate::compiler::codegen::CompiledProgram;
use crate::compiler::pools::{Constant, Pools};
use crate::config::Config;
use crate::diagnostics::Diagnostic;
use crate::error::{Error, RuntimeError};
use crate::runtime::binding::{Binding, BindingId};
use crate::runtime::heap::Heap;
use crate::runtime::scope::{Scope, ScopeId};
use crate::runtime::value::{BindingType, PrimitiveKey, Value};

/// Name of the array constructor in the program scope.
const ARRAY_NAME: &str = "Array";
/// Attribute holding an array's element count.
const SIZE_NAME: &str = "size";
/// Extension prefixes an operand can carry before it overflows `usize`.
const MAX_EXTENSIONS: usize = std::mem::size_of::<usize>() - 1;

/// An operand stack entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Slot {
    /// A resolved binding
    Binding(BindingId),
    /// A name pool index waiting to be resolved
    Name(usize),
}

/// The register set.
#[derive(Debug, Clone)]
pub(super) struct Registers {
    /// Instruction pointer
    pub ip: usize,
    /// Set by jumps to suppress the automatic advance
    pub jumped: bool,
    /// Bits of the last comparison, see [`ComparisonBit`]
    pub comparison: u8,
    /// Accumulated high bytes of the next operand
    pub extended: usize,
    /// Number of extension prefixes seen so far
    pub extension_count: usize,
    /// The binding a method was called on
    pub caller: BindingId,
    /// The method binding being executed, or the program object
    pub receiver: BindingId,
    /// Innermost local scope
    pub local_scope: ScopeId,
    /// Result of the last completed statement
    pub last_result: Option<BindingId>,
}

/// Saved state of one active invocation.
#[derive(Debug, Clone)]
struct CallFrame {
    return_address: usize,
    stack_mark: usize,
    caller: BindingId,
    receiver: BindingId,
    /// Block scopes opened in this frame, innermost last
    local_scopes: Vec<ScopeId>,
    /// Scope of the method copy this call runs on, freed with the frame
    method_scope: Option<ScopeId>,
    /// The caller's last-result register
    saved_result: Option<BindingId>,
}

/// The virtual machine.
pub struct VM {
    pub(super) config: Config,
    pub(super) heap: Heap,
    pub(super) stack: Vec<Slot>,
    frames: Vec<CallFrame>,
    pub(super) registers: Registers,
    /// Constant pool entries materialized as bindings, by pool index
    constants: Vec<BindingId>,
    /// Shared bindings of primitive values
    interned: FxHashMap<PrimitiveKey, BindingId>,
    pub(super) program_scope: ScopeId,
    program_object: BindingId,
    pub(super) nothing: BindingId,
    console: Console,
    diagnostics: Vec<Diagnostic>,
    result: Option<BindingId>,
    halted: bool,
    line: usize,
}

/// The bindings every execution starts from.
struct Bootstrap {
    heap: Heap,
    program_scope: ScopeId,
    program_object: BindingId,
    nothing: BindingId,
}

impl Bootstrap {
    fn new() -> Result<Self, RuntimeError> {
        let mut heap = Heap::new();
        let program_scope = heap.new_scope(None, true);
        let program_object = heap.allocate(Binding {
            ty: BindingType::Object,
            scope: Some(program_scope),
            constant: true,
            ..Binding::default()
        });
        let nothing = heap.allocate(Binding {
            name: Some(crate::ast::NOTHING_NAME.to_string()),
            constant: true,
            ..Binding::default()
        });

        let array_scope = heap.new_scope(None, true);
        heap.declare(
            program_scope,
            Binding::named(ARRAY_NAME, BindingType::Array).with_scope(array_scope),
        )?;

        Ok(Self {
            heap,
            program_scope,
            program_object,
            nothing,
        })
    }
}

impl VM {
    /// Creates a new VM with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a new VM.
    pub fn with_config(config: Config) -> Self {
        let console = Console::new(config.echo_output);
        let mut heap = Heap::new();
        let program_scope = heap.new_scope(None, true);
        let nothing = heap.allocate(Binding::default());

        Self {
            config,
            heap,
            stack: Vec::new(),
            frames: Vec::new(),
            registers: Registers {
                ip: 0,
                jumped: false,
                comparison: 0,
                extended: 0,
                extension_count: 0,
                caller: nothing,
                receiver: nothing,
                local_scope: program_scope,
                last_result: None,
            },
            constants: Vec::new(),
            interned: FxHashMap::default(),
            program_scope,
            program_object: nothing,
            nothing,
            console,
            diagnostics: Vec::new(),
            result: None,
            halted: false,
            line: 0,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replaces the configuration.
    pub fn set_config(&mut self, config: Config) {
        self.console.set_echo(config.echo_output);
        self.config = config;
    }

    /// Replaces the source `ask` reads from.
    pub fn set_input(&mut self, input: Input) {
        self.console.set_input(input);
    }

    /// Output written by the last execution.
    pub fn output(&self) -> &str {
        self.console.output()
    }

    /// Diagnostics reported by the last execution.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// The binding and scope graph.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The shared `Nothing` binding.
    pub fn nothing(&self) -> BindingId {
        self.nothing
    }

    /// Looks up a binding.
    pub fn binding(&self, id: BindingId) -> Option<&Binding> {
        self.heap.binding(id).ok()
    }

    /// Looks up a name declared in the program scope.
    pub fn lookup_global(&self, name: &str) -> Option<&Binding> {
        let id = self.heap.find_immediate(self.program_scope, name).ok()??;
        self.binding(id)
    }

    /// Executes a compiled program from its first instruction.
    ///
    /// Returns the value of an explicit top-level `return`, or else the
    /// result of the last top-level statement. A fatal error stops
    /// execution; output and diagnostics stay readable afterwards.
    pub fn execute(&mut self, program: &CompiledProgram) -> Result<Option<BindingId>, Error> {
        if let Err(error) = self.reset(&program.pools) {
            return Err(self.fatal(error));
        }

        let code = &program.bytecode.instructions;
        while !self.halted {
            let ip = self.registers.ip;
            let Some(&instruction) = code.get(ip) else {
                // Hand-built programs may run off the end without a return.
                self.result = self.registers.last_result;
                break;
            };

            if instruction.opcode == OpCode::ExtendArgument {
                if let Err(error) = self.extend(instruction.operand) {
                    return Err(self.fatal(error));
                }
                self.registers.ip += 1;
                continue;
            }

            let operand = self.registers.extended | instruction.operand as usize;
            self.registers.extended = 0;
            self.registers.extension_count = 0;
            if let Some(line) = program.bytecode.line_for(ip) {
                self.line = line;
            }
            if self.config.trace_instructions {
                tracing::trace!(ip, opcode = ?instruction.opcode, operand, depth = self.stack.len(), "dispatch");
            }

            self.registers.jumped = false;
            if let Err(error) = self.step(instruction.opcode, operand, &program.pools) {
                return Err(self.fatal(error));
            }
            if !self.registers.jumped {
                self.registers.ip += 1;
            }
        }

        tracing::debug!(
            bindings = self.heap.binding_count(),
            scopes = self.heap.scope_count(),
            diagnostics = self.diagnostics.len(),
            "execution finished"
        );
        Ok(self.result)
    }

    fn reset(&mut self, pools: &Pools) -> Result<(), RuntimeError> {
        let Bootstrap {
            heap,
            program_scope,
            program_object,
            nothing,
        } = Bootstrap::new()?;

        self.heap = heap;
        self.program_scope = program_scope;
        self.program_object = program_object;
        self.nothing = nothing;
        self.stack.clear();
        self.interned.clear();
        self.constants.clear();
        self.console.clear();
        self.diagnostics.clear();
        self.result = None;
        self.halted = false;
        self.line = 0;

        for constant in pools.constants.iter() {
            let id = match constant {
                Constant::Nothing => nothing,
                Constant::Root | Constant::Something => {
                    let scope = self.heap.new_scope(None, true);
                    self.heap.allocate(Binding {
                        name: Some(constant.to_string()),
                        ty: constant.binding_type(),
                        scope: Some(scope),
                        constant: true,
                        ..Binding::default()
                    })
                }
                Constant::Primitive(value) => self.intern(value.clone()),
            };
            self.constants.push(id);
        }

        self.registers = Registers {
            ip: 0,
            jumped: false,
            comparison: 0,
            extended: 0,
            extension_count: 0,
            caller: nothing,
            receiver: program_object,
            local_scope: program_scope,
            last_result: None,
        };
        self.frames = vec![CallFrame {
            return_address: 0,
            stack_mark: 0,
            caller: nothing,
            receiver: program_object,
            local_scopes: Vec::new(),
            method_scope: None,
            saved_result: None,
        }];
        Ok(())
    }

    fn extend(&mut self, byte: u8) -> Result<(), RuntimeError> {
        if self.registers.extension_count >= MAX_EXTENSIONS {
            return Err(RuntimeError::OperandOverflow(MAX_EXTENSIONS));
        }
        self.registers.extension_count += 1;
        self.registers.extended |= (byte as usize) << (8 * self.registers.extension_count);
        Ok(())
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    fn step(&mut self, opcode: OpCode, operand: usize, pools: &Pools) -> Result<(), RuntimeError> {
        match opcode {
            OpCode::LoadName => {
                if operand >= pools.names.len() {
                    return Err(RuntimeError::UnknownName(operand));
                }
                self.stack.push(Slot::Name(operand));
            }

            OpCode::LoadLiteral => {
                let id = *self
                    .constants
                    .get(operand)
                    .ok_or(RuntimeError::UnknownConstant(operand))?;
                self.push(id);
            }

            OpCode::Assign => {
                let value = self.pop_binding()?;
                let target = self.pop_binding()?;
                let current = self.heap.binding(target)?;
                if current.constant {
                    let message = format!("cannot assign to {}", current.label());
                    self.recover(message);
                    return Ok(());
                }
                let source = self.heap.binding(value)?.clone();
                self.heap.binding_mut(target)?.assign_from(&source);
                self.push(target);
            }

            OpCode::Add | OpCode::Subtract | OpCode::Multiply | OpCode::Divide => {
                self.binary(|lhs, rhs| operators::arithmetic(opcode, lhs, rhs))?;
            }

            OpCode::And | OpCode::Or => {
                self.binary(|lhs, rhs| operators::logical(opcode, lhs, rhs))?;
            }

            OpCode::Not => {
                let operand = self.pop_binding()?;
                let result = operators::not(self.heap.binding(operand)?);
                match result {
                    Ok(value) => {
                        let id = self.temporary(value)?;
                        self.push(id);
                    }
                    Err(message) => self.recover(message),
                }
            }

            OpCode::Equal | OpCode::NotEqual => {
                let rhs = self.pop_binding()?;
                let lhs = self.pop_binding()?;
                let same = self.heap.binding(lhs)?.same_as(self.heap.binding(rhs)?);
                let id = self.intern(Value::Boolean(same == (opcode == OpCode::Equal)));
                self.push(id);
            }

            OpCode::Compare => {
                let rhs = self.pop_binding()?;
                let lhs = self.pop_binding()?;
                let ordering = operators::compare(self.heap.binding(lhs)?, self.heap.binding(rhs)?);
                self.registers.comparison = ComparisonBit::True.mask();
                match ordering {
                    Ok(Some(ordering)) => self.registers.comparison |= operators::comparison_mask(ordering),
                    Ok(None) => {}
                    Err(message) => self.report(message),
                }
            }

            OpCode::LoadComparisonBit => {
                if operand > ComparisonBit::GreaterOrEqual as usize {
                    return Err(RuntimeError::UnknownComparisonBit(operand));
                }
                let set = self.registers.comparison & (1u8 << operand) != 0;
                let id = self.intern(Value::Boolean(set));
                self.push(id);
            }

            OpCode::JumpIfFalse => {
                let condition = self.pop_binding()?;
                if !self.truthy(condition)? {
                    self.jump(operand);
                }
            }

            OpCode::Jump => self.jump(operand),

            OpCode::JumpIfNull => {
                let value = self.pop_binding()?;
                if self.heap.binding(value)?.is_null() {
                    self.jump(operand);
                }
            }

            OpCode::Copy => {
                let source = self.pop_binding()?;
                let copy = self.copy_binding(source)?;
                self.push(copy);
            }

            OpCode::BindType => {
                let ty = BindingType::from_operand(operand).ok_or(RuntimeError::UnknownType(operand))?;
                let target = self.peek_binding()?;
                self.heap.binding_mut(target)?.ty = ty;
            }

            OpCode::ResolveDirect => {
                let index = self.pop_name()?;
                let name = pools.names.get(index).ok_or(RuntimeError::UnknownName(index))?;
                let id = self.resolve_direct(name)?;
                self.push(id);
            }

            OpCode::ResolveScoped => {
                let index = self.pop_name()?;
                let name = pools.names.get(index).ok_or(RuntimeError::UnknownName(index))?;
                let target = self.pop_binding()?;
                match self.resolve_scoped(target, name)? {
                    Some(id) => self.push(id),
                    None => {
                        let message = format!(
                            "cannot access '{}' on {}, which has no attributes",
                            name,
                            self.heap.binding(target)?.label()
                        );
                        self.recover(message);
                    }
                }
            }

            OpCode::DefineMethod => {
                let mut params = Vec::with_capacity(operand);
                for _ in 0..operand {
                    let index = self.pop_name()?;
                    let name = pools.names.get(index).ok_or(RuntimeError::UnknownName(index))?;
                    params.push(name.to_string());
                }
                params.reverse();

                let scope = self.heap.allocate_scope(Scope::method(params));
                let method = self
                    .heap
                    .allocate(Binding::anonymous(BindingType::Method).with_scope(scope));
                self.push(method);
            }

            OpCode::BindSection => {
                let target = self.peek_binding()?;
                self.heap.binding_mut(target)?.section = operand;
            }

            OpCode::Evaluate => self.evaluate(operand)?,
            OpCode::EvaluateInPlace => self.evaluate_in_place(operand)?,
            OpCode::Return => self.return_from_frame(operand != 0)?,
            OpCode::ArrayIndex => self.array_index()?,

            OpCode::EnterLocal => {
                let scope = self.heap.new_scope(Some(self.registers.local_scope), false);
                self.frame_mut()?.local_scopes.push(scope);
                self.registers.local_scope = scope;
                self.registers.last_result = None;
            }

            OpCode::LeaveLocal => {
                let scope = self
                    .frame_mut()?
                    .local_scopes
                    .pop()
                    .ok_or(RuntimeError::NoLocalScope)?;
                self.heap.release_scope(scope)?;
                self.registers.local_scope = self.current_local_scope()?;
                self.registers.last_result = None;
            }

            OpCode::Syscall => match Syscall::from_operand(operand) {
                Some(Syscall::Print) => {
                    let value = self.peek_binding()?;
                    let text = self.heap.binding(value)?.display_value();
                    self.console.write_line(&text);
                }
                Some(Syscall::ReadLine) => {
                    let line = self.console.read_line()?;
                    let id = self.adopt(Binding::primitive(Value::String(line)))?;
                    self.push(id);
                }
                None => return Err(RuntimeError::UnknownSyscall(operand)),
            },

            OpCode::Duplicate => {
                let top = *self.stack.last().ok_or(RuntimeError::StackUnderflow)?;
                self.stack.push(top);
            }

            OpCode::EndStatement => {
                self.registers.last_result = Some(self.pop_binding()?);
            }

            OpCode::Swap => {
                let len = self.stack.len();
                if len < 2 {
                    return Err(RuntimeError::StackUnderflow);
                }
                self.stack.swap(len - 1, len - 2);
            }

            OpCode::DropTop => {
                self.pop()?;
            }

            OpCode::Dereference => {
                let id = self.peek_binding()?;
                self.heap.binding(id)?;
            }

            // Consumed by the dispatch loop before a handler runs.
            OpCode::ExtendArgument | OpCode::Nop => {}
        }
        Ok(())
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn evaluate(&mut self, count: usize) -> Result<(), RuntimeError> {
        let arguments = self.pop_arguments(count)?;
        let method = self.pop_binding()?;
        let caller = self.pop_binding()?;

        let target = self.heap.binding(method)?.clone();
        if target.ty == BindingType::Array {
            return self.construct_array(method, &arguments);
        }

        let scope = self.check_call(&target, arguments.len())?;
        if let Some(scope) = scope {
            self.bind_parameters(scope, &arguments)?;
        }
        // `method` is the copy emitted before this call; the frame owns it.
        self.enter_frame(caller, method, target.section, scope)
    }

    fn evaluate_in_place(&mut self, count: usize) -> Result<(), RuntimeError> {
        let arguments = self.pop_arguments(count)?;
        let method = self.pop_binding()?;

        let target = self.heap.binding(method)?.clone();
        self.check_call(&target, arguments.len())?;

        let receiver_scope = self
            .heap
            .binding(self.registers.receiver)?
            .scope
            .unwrap_or(self.program_scope);
        if let Some(scope) = target.scope {
            let params = self.heap.scope(scope)?.params.clone();
            self.declare_parameters(receiver_scope, &params, &arguments)?;
        }
        self.enter_frame(self.registers.caller, self.registers.receiver, target.section, None)
    }

    /// Validates a call and returns the method's scope.
    fn check_call(&self, target: &Binding, supplied: usize) -> Result<Option<ScopeId>, RuntimeError> {
        if !target.is_callable() {
            return Err(RuntimeError::NotCallable {
                name: target.label().to_string(),
            });
        }

        let declared = match target.scope {
            Some(scope) => self.heap.scope(scope)?.params.len(),
            None => 0,
        };
        if declared != supplied {
            return Err(RuntimeError::ArgumentCount {
                name: target.label().to_string(),
                expected: declared,
                got: supplied,
            });
        }
        Ok(target.scope)
    }

    fn bind_parameters(&mut self, scope: ScopeId, arguments: &[BindingId]) -> Result<(), RuntimeError> {
        let params = self.heap.scope(scope)?.params.clone();
        self.declare_parameters(scope, &params, arguments)
    }

    fn declare_parameters(
        &mut self,
        scope: ScopeId,
        params: &[String],
        arguments: &[BindingId],
    ) -> Result<(), RuntimeError> {
        for (param, &argument) in params.iter().zip(arguments) {
            let source = self.heap.binding(argument)?.clone();
            let mut binding = Binding::named(param.as_str(), BindingType::Null);
            binding.assign_from(&source);
            self.heap.redeclare(scope, binding)?;
        }
        Ok(())
    }

    fn enter_frame(
        &mut self,
        caller: BindingId,
        receiver: BindingId,
        section: usize,
        method_scope: Option<ScopeId>,
    ) -> Result<(), RuntimeError> {
        if self.frames.len() >= self.config.max_call_depth {
            return Err(RuntimeError::CallDepthExceeded {
                limit: self.config.max_call_depth,
            });
        }

        self.frames.push(CallFrame {
            return_address: self.registers.ip + 1,
            stack_mark: self.stack.len(),
            caller,
            receiver,
            local_scopes: Vec::new(),
            method_scope,
            saved_result: self.registers.last_result.take(),
        });
        self.registers.caller = caller;
        self.registers.receiver = receiver;
        self.registers.local_scope = self.current_local_scope()?;

        tracing::debug!(section, depth = self.frames.len(), "call");
        self.jump(section);
        Ok(())
    }

    fn return_from_frame(&mut self, has_value: bool) -> Result<(), RuntimeError> {
        let explicit = if has_value { Some(self.pop_binding()?) } else { None };
        let frame = self.frames.pop().ok_or(RuntimeError::MissingFrame)?;
        self.stack.truncate(frame.stack_mark);

        let outermost = self.frames.is_empty();
        let yielded = match explicit {
            Some(id) => Some(id),
            None if outermost => self.registers.last_result,
            None if self.heap.binding(frame.caller)?.is_null() => Some(frame.receiver),
            None => Some(frame.caller),
        };
        let yielded = self.release_scopes(&frame.local_scopes, yielded)?;
        let yielded = self.release_method(&frame, yielded)?;

        if outermost {
            self.result = yielded;
            self.halted = true;
            return Ok(());
        }

        self.push(yielded.unwrap_or(self.nothing));
        let top = self.frames.last().ok_or(RuntimeError::MissingFrame)?;
        self.registers.caller = top.caller;
        self.registers.receiver = top.receiver;
        self.registers.last_result = frame.saved_result;
        self.registers.local_scope = self.current_local_scope()?;

        tracing::debug!(depth = self.frames.len(), "return");
        self.jump(frame.return_address);
        Ok(())
    }

    /// Frees block scopes innermost first. A kept binding owned by one of
    /// them is copied out before its scope goes.
    fn release_scopes(&mut self, scopes: &[ScopeId], keep: Option<BindingId>) -> Result<Option<BindingId>, RuntimeError> {
        let mut keep = keep;
        for &scope in scopes.iter().rev() {
            if let Some(id) = keep {
                if self.heap.scope(scope)?.owns(id) {
                    keep = Some(self.escape(id)?);
                }
            }
            self.heap.release_scope(scope)?;
        }
        Ok(keep)
    }

    /// Frees the method copy a finished call ran on, together with its
    /// scope. The copy survives when it, or a binding bound to its scope,
    /// is the call's result.
    fn release_method(&mut self, frame: &CallFrame, keep: Option<BindingId>) -> Result<Option<BindingId>, RuntimeError> {
        let Some(scope) = frame.method_scope else {
            return Ok(keep);
        };

        let mut keep = keep;
        if let Some(id) = keep {
            if id == frame.receiver || self.heap.binding(id)?.scope == Some(scope) {
                return Ok(keep);
            }
            if self.heap.scope(scope)?.owns(id) {
                keep = Some(self.escape(id)?);
            }
        }

        self.heap.free_scope(scope)?;
        self.heap.free_binding(frame.receiver);
        Ok(keep)
    }

    /// Copies a binding whose owner is about to be freed into the current
    /// frame.
    fn escape(&mut self, id: BindingId) -> Result<BindingId, RuntimeError> {
        let escaped = Binding {
            name: None,
            constant: false,
            ..self.heap.binding(id)?.clone()
        };
        self.adopt(escaped)
    }

    // ========================================================================
    // Arrays
    // ========================================================================

    fn construct_array(&mut self, array: BindingId, arguments: &[BindingId]) -> Result<(), RuntimeError> {
        let size = match arguments {
            [argument] => self.heap.binding(*argument)?.value.as_integer().filter(|n| *n >= 0),
            _ => None,
        };
        let Some(size) = size else {
            self.recover("Array expects a single non-negative Integer size");
            return Ok(());
        };

        let scope = match self.heap.binding(array)?.scope {
            Some(scope) => scope,
            None => {
                let scope = self.heap.new_scope(None, true);
                self.heap.binding_mut(array)?.scope = Some(scope);
                scope
            }
        };
        for index in 0..size {
            self.heap
                .declare(scope, Binding::named(index.to_string(), BindingType::Null))?;
        }
        self.heap.declare(scope, Binding {
            name: Some(SIZE_NAME.to_string()),
            ..Binding::primitive(Value::Integer(size))
        })?;

        tracing::debug!(size, "constructed array");
        self.push(array);
        Ok(())
    }

    fn array_index(&mut self) -> Result<(), RuntimeError> {
        let index = self.pop_binding()?;
        let target = self.pop_binding()?;

        let index_binding = self.heap.binding(index)?;
        let Value::Integer(index) = index_binding.value else {
            return Err(RuntimeError::NonIntegerIndex {
                found: index_binding.ty.name(),
            });
        };

        let array = self.heap.binding(target)?;
        let name = array.label().to_string();
        let not_an_array = || RuntimeError::NotAnArray { name: name.clone() };

        let scope = array.scope.ok_or_else(not_an_array)?;
        let size_id = self.heap.find_immediate(scope, SIZE_NAME)?.ok_or_else(not_an_array)?;
        let size = self
            .heap
            .binding(size_id)?
            .value
            .as_integer()
            .ok_or_else(not_an_array)?;

        if index < 0 || index >= size {
            return Err(RuntimeError::IndexOutOfBounds { name, index, size });
        }

        match self.heap.find_immediate(scope, &index.to_string())? {
            Some(element) => self.push(element),
            None => self.recover(format!("{} has no element {}", name, index)),
        }
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn binary<F>(&mut self, op: F) -> Result<(), RuntimeError>
    where
        F: Fn(&Binding, &Binding) -> Result<Value, String>,
    {
        let rhs = self.pop_binding()?;
        let lhs = self.pop_binding()?;
        let result = op(self.heap.binding(lhs)?, self.heap.binding(rhs)?);
        match result {
            Ok(value) => {
                let id = self.temporary(value)?;
                self.push(id);
            }
            Err(message) => self.recover(message),
        }
        Ok(())
    }

    fn copy_binding(&mut self, source: BindingId) -> Result<BindingId, RuntimeError> {
        let original = self.heap.binding(source)?.clone();
        let scope = match original.scope {
            Some(scope) => self.heap.copy_scope(scope)?,
            None => self.heap.new_scope(None, true),
        };
        Ok(self.heap.allocate(Binding {
            scope: Some(scope),
            constant: false,
            ..original
        }))
    }

    fn truthy(&mut self, condition: BindingId) -> Result<bool, RuntimeError> {
        let binding = self.heap.binding(condition)?;
        match (binding.value.as_boolean(), binding.ty) {
            (Some(b), _) => Ok(b),
            (None, BindingType::Null) => Ok(false),
            (None, ty) => {
                let message = format!("condition must be a Boolean, found {}", ty.name());
                self.report(message);
                Ok(false)
            }
        }
    }

    /// The innermost scope the current frame frees on its own: its open
    /// block scope, else the method copy it runs on.
    fn disposable_scope(&self) -> Option<ScopeId> {
        let frame = self.frames.last()?;
        frame.local_scopes.last().copied().or(frame.method_scope)
    }

    /// Allocates a binding that lives as long as the current frame's
    /// disposable scope, or unowned at program level.
    fn adopt(&mut self, binding: Binding) -> Result<BindingId, RuntimeError> {
        match self.disposable_scope() {
            Some(scope) => self.heap.declare(scope, binding),
            None => Ok(self.heap.allocate(binding)),
        }
    }

    /// A computed result. Booleans are shared; other values live in the
    /// current disposable scope, or are shared at program level.
    fn temporary(&mut self, value: Value) -> Result<BindingId, RuntimeError> {
        if matches!(value, Value::Boolean(_) | Value::None) {
            return Ok(self.intern(value));
        }
        match self.disposable_scope() {
            Some(scope) => self.heap.declare(scope, Binding::primitive(value)),
            None => Ok(self.intern(value)),
        }
    }

    /// Returns the shared binding of a primitive value.
    fn intern(&mut self, value: Value) -> BindingId {
        let Some(key) = value.primitive_key() else {
            return self.nothing;
        };
        if let Some(&id) = self.interned.get(&key) {
            return id;
        }
        let id = self.heap.allocate(Binding {
            constant: true,
            ..Binding::primitive(value)
        });
        self.interned.insert(key, id);
        id
    }

    fn current_local_scope(&self) -> Result<ScopeId, RuntimeError> {
        if let Some(&scope) = self.frames.last().and_then(|frame| frame.local_scopes.last()) {
            return Ok(scope);
        }
        Ok(self
            .heap
            .binding(self.registers.receiver)?
            .scope
            .unwrap_or(self.program_scope))
    }

    fn frame_mut(&mut self) -> Result<&mut CallFrame, RuntimeError> {
        self.frames.last_mut().ok_or(RuntimeError::MissingFrame)
    }

    fn jump(&mut self, target: usize) {
        self.registers.ip = target;
        self.registers.jumped = true;
    }

    fn push(&mut self, id: BindingId) {
        self.stack.push(Slot::Binding(id));
    }

    fn pop(&mut self) -> Result<Slot, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    fn pop_binding(&mut self) -> Result<BindingId, RuntimeError> {
        match self.pop()? {
            Slot::Binding(id) => Ok(id),
            Slot::Name(_) => Err(RuntimeError::ExpectedBinding),
        }
    }

    fn pop_name(&mut self) -> Result<usize, RuntimeError> {
        match self.pop()? {
            Slot::Name(index) => Ok(index),
            Slot::Binding(_) => Err(RuntimeError::ExpectedName),
        }
    }

    fn peek_binding(&self) -> Result<BindingId, RuntimeError> {
        match self.stack.last() {
            Some(Slot::Binding(id)) => Ok(*id),
            Some(Slot::Name(_)) => Err(RuntimeError::ExpectedBinding),
            None => Err(RuntimeError::StackUnderflow),
        }
    }

    /// Pops `count` arguments, returned in push order.
    fn pop_arguments(&mut self, count: usize) -> Result<Vec<BindingId>, RuntimeError> {
        let mut arguments = Vec::with_capacity(count);
        for _ in 0..count {
            arguments.push(self.pop_binding()?);
        }
        arguments.reverse();
        Ok(arguments)
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    fn report(&mut self, message: impl Into<String>) {
        let diagnostic = Diagnostic::recoverable(self.line, message);
        tracing::warn!(line = diagnostic.line, "{}", diagnostic.message);
        self.diagnostics.push(diagnostic);
    }

    /// Reports a recoverable error and yields `Nothing` in place of the
    /// failed result.
    fn recover(&mut self, message: impl Into<String>) {
        self.report(message);
        self.push(self.nothing);
    }

    fn fatal(&mut self, error: RuntimeError) -> Error {
        let diagnostic = Diagnostic::fatal(self.line, error.to_string());
        tracing::error!(line = self.line, "{}", error);
        self.diagnostics.push(diagnostic);
        self.halted = true;
        Error::Fatal {
            line: self.line,
            error,
        }
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}
