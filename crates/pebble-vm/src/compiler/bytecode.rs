//! Bytecode definitions.

use std::fmt::Write as _;

use super::pools::Pools;

/// A compiled program body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    /// The instructions
    pub instructions: Vec<Instruction>,
    /// Statement start offsets and their source lines, in offset order
    pub lines: Vec<LineEntry>,
}

/// Associates the statement starting at `offset` with a source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    /// First instruction of the statement
    pub offset: usize,
    /// Source line
    pub line: usize,
}

impl Bytecode {
    /// Creates a new empty bytecode chunk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instructions, which is also the offset of the next one.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if nothing has been emitted.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Adds an instruction and returns its index.
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        let index = self.instructions.len();
        self.instructions.push(instruction);
        index
    }

    /// Emits `opcode` with an operand of any size, preceded by as many
    /// extension prefixes as it needs. Returns the offset of the first
    /// emitted instruction.
    pub fn emit_with_operand(&mut self, opcode: OpCode, operand: usize) -> usize {
        let start = self.len();
        let (extensions, low) = split_operand(operand);
        for byte in extensions {
            self.emit(Instruction::with_operand(OpCode::ExtendArgument, byte));
        }
        self.emit(Instruction::with_operand(opcode, low));
        start
    }

    /// Records that the statement at `offset` came from `line`.
    pub fn mark_line(&mut self, offset: usize, line: usize) {
        self.lines.push(LineEntry { offset, line });
    }

    /// Source line of the statement containing `offset`.
    pub fn line_for(&self, offset: usize) -> Option<usize> {
        let after = self.lines.partition_point(|entry| entry.offset <= offset);
        after.checked_sub(1).map(|i| self.lines[i].line)
    }

    /// Human-readable listing, one instruction per row, with pool entries
    /// resolved for literal and name loads.
    pub fn listing(&self, pools: &Pools) -> String {
        let mut out = String::new();
        let mut extended = 0usize;
        let mut shift = 0u32;

        for (offset, instruction) in self.instructions.iter().enumerate() {
            let line = match self.lines.iter().find(|entry| entry.offset == offset) {
                Some(entry) => format!("{:>4}", entry.line),
                None => "   |".to_string(),
            };

            if instruction.opcode == OpCode::ExtendArgument {
                shift += 8;
                extended |= (instruction.operand as usize).checked_shl(shift).unwrap_or(0);
                let _ = writeln!(out, "{} {:>5}  {:?} {}", line, offset, instruction.opcode, instruction.operand);
                continue;
            }

            let operand = extended | instruction.operand as usize;
            extended = 0;
            shift = 0;

            let note = match instruction.opcode {
                OpCode::LoadLiteral => pools.constants.get(operand).map(|c| c.to_string()),
                OpCode::LoadName => pools.names.get(operand).map(str::to_string),
                _ => None,
            };
            let _ = match note {
                Some(note) => writeln!(out, "{} {:>5}  {:?} {} ; {}", line, offset, instruction.opcode, operand, note),
                None => writeln!(out, "{} {:>5}  {:?} {}", line, offset, instruction.opcode, operand),
            };
        }

        out
    }
}

/// Splits an operand into the extension bytes that precede the instruction
/// (next-higher byte first) and the instruction's own low byte.
pub fn split_operand(operand: usize) -> (Vec<u8>, u8) {
    let mut extensions = Vec::new();
    let mut rest = operand >> 8;
    while rest != 0 {
        extensions.push((rest & 0xff) as u8);
        rest >>= 8;
    }
    (extensions, (operand & 0xff) as u8)
}

/// Number of extension prefixes `operand` needs.
pub fn extension_len(operand: usize) -> usize {
    let mut len = 0;
    let mut rest = operand >> 8;
    while rest != 0 {
        len += 1;
        rest >>= 8;
    }
    len
}

/// A single bytecode instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// The operation code
    pub opcode: OpCode,
    /// Low byte of the operand
    pub operand: u8,
}

impl Instruction {
    /// Creates a new instruction with a zero operand.
    pub fn simple(opcode: OpCode) -> Self {
        Self { opcode, operand: 0 }
    }

    /// Creates a new instruction with an operand.
    pub fn with_operand(opcode: OpCode, operand: u8) -> Self {
        Self { opcode, operand }
    }
}

/// Syscall numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Syscall {
    /// Write the top of stack and a newline to program output
    Print = 0,
    /// Read a line from the console and push it
    ReadLine = 1,
}

impl Syscall {
    /// Decodes a syscall operand.
    pub fn from_operand(operand: usize) -> Option<Self> {
        match operand {
            0 => Some(Syscall::Print),
            1 => Some(Syscall::ReadLine),
            _ => None,
        }
    }
}

/// Bits of the comparison register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ComparisonBit {
    /// Always clear
    False = 0,
    /// Always set
    True = 1,
    /// `==`
    Equal = 2,
    /// `<`
    Less = 3,
    /// `>`
    Greater = 4,
    /// `<=`
    LessOrEqual = 5,
    /// `>=`
    GreaterOrEqual = 6,
}

impl ComparisonBit {
    /// Mask of this bit in the register.
    pub fn mask(self) -> u8 {
        1 << self as u8
    }
}

/// Operation codes for the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    // Loads
    /// Push the name at the operand's pool index as a resolution key
    LoadName,
    /// Push the pooled constant binding at the operand's index
    LoadLiteral,

    // Binding operations
    /// Pop value and target; bind the target to the value and push it
    Assign,

    // Arithmetic
    /// Add top two bindings
    Add,
    /// Subtract
    Subtract,
    /// Multiply
    Multiply,
    /// Divide
    Divide,

    /// Console I/O, see [`Syscall`]
    Syscall,

    // Boolean
    /// Logical and
    And,
    /// Logical or
    Or,
    /// Logical not
    Not,

    // Comparison
    /// Structural inequality of the top two bindings
    NotEqual,
    /// Structural equality of the top two bindings
    Equal,
    /// Compare the top two bindings into the comparison register
    Compare,
    /// Push the comparison register bit selected by the operand
    LoadComparisonBit,

    // Control flow
    /// Pop a condition; jump to the operand if it is false
    JumpIfFalse,
    /// Jump to the operand
    Jump,

    /// Replace the top binding by an independent copy
    Copy,
    /// Set the type tag of the top binding
    BindType,
    /// Resolve a bare name
    ResolveDirect,
    /// Resolve a name inside the binding below it
    ResolveScoped,
    /// Pop the operand's count of parameter names and push a new method
    DefineMethod,
    /// Set the code section of the top binding
    BindSection,
    /// Call a method on the current self
    EvaluateInPlace,
    /// Call a method with the operand's count of arguments
    Evaluate,
    /// Return from the current frame; a nonzero operand means a value is on the stack
    Return,
    /// Index an array
    ArrayIndex,
    /// Open a block scope
    EnterLocal,
    /// Close the innermost block scope
    LeaveLocal,
    /// Prefix carrying the next-higher byte of the following operand
    ExtendArgument,
    /// No operation
    Nop,
    /// Duplicate the top of stack
    Duplicate,
    /// Pop the statement result into the last-result register
    EndStatement,
    /// Swap the top two entries
    Swap,
    /// Pop a binding; jump to the operand if it is null-typed
    JumpIfNull,
    /// Pop and discard
    DropTop,
    /// Check that the top of stack is a resolved binding
    Dereference,
}
