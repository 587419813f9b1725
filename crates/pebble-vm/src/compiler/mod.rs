//! Bytecode compiler for Pebble programs.
//!
//! Transforms the AST into a flat instruction stream for the VM.
//!
//! # Module Structure
//!
//! - `pools`: Constant and name interning (first pass)
//! - `bytecode`: Bytecode definitions and instructions
//! - `codegen`: Code generation from AST (second pass)
//!   - `codegen::jump`: Placeholders and back-patching of forward jumps

pub mod bytecode;
pub mod codegen;
pub mod pools;

pub use bytecode::{Bytecode, ComparisonBit, Instruction, OpCode, Syscall};
pub use codegen::{CompiledProgram, Compiler};
pub use pools::{Constant, Pools};
