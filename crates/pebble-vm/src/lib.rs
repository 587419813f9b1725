// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # pebble-vm
//!
//! The compiler backend and virtual machine of the Pebble language.
//!
//! ## Overview
//!
//! This crate takes a parsed Pebble program and runs it:
//! - Interning pools for literals and identifiers (first pass)
//! - A flattener emitting linear bytecode with back-patched jumps (second pass)
//! - A stack VM with call frames and layered name resolution
//! - An arena-backed binding/scope graph with deterministic block teardown
//!
//! ## Quick Start
//!
//! ```rust
//! use pebble_vm::{Block, Engine, Operation, OperationType, Program, Value};
//!
//! let program = Program::new(Block::new().with(Operation::assign(
//!     Operation::var("a"),
//!     Operation::binary(OperationType::Add, Operation::integer(2), Operation::integer(3)),
//! )));
//!
//! let mut engine = Engine::new();
//! engine.run(&program).unwrap();
//! assert_eq!(engine.vm().lookup_global("a").unwrap().value, Value::Integer(5));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod gc;
pub mod runtime;
pub mod vm;

#[cfg(feature = "async")]
mod async_engine;

#[cfg(feature = "async")]
pub use async_engine::AsyncEngine;
#[cfg(all(feature = "async", feature = "parallel"))]
pub use async_engine::ParallelCompiler;

// Re-exports for convenience
pub use ast::{Block, Executable, Literal, Operation, OperationType, Program, Reference};
pub use compiler::{CompiledProgram, Compiler};
pub use config::Config;
pub use diagnostics::{Diagnostic, Severity};
pub use error::{CompileError, Error, Result, RuntimeError};
pub use runtime::{Binding, BindingType, Value};
pub use vm::{Input, VM};

use std::path::Path;

/// The Pebble engine.
///
/// Owns one VM and runs programs on it, one at a time.
pub struct Engine {
    vm: VM,
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// Everything the program printed
    pub output: String,
    /// The returned value or the last statement result
    pub result: Option<Binding>,
    /// Recoverable errors reported along the way
    pub diagnostics: Vec<Diagnostic>,
}

impl Execution {
    /// Payload of the result, if any.
    pub fn value(&self) -> Option<&Value> {
        self.result.as_ref().map(|binding| &binding.value)
    }
}

impl Engine {
    /// Creates a new engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a new engine.
    pub fn with_config(config: Config) -> Self {
        Self {
            vm: VM::with_config(config),
        }
    }

    /// Parses a JSON-serialized program.
    pub fn parse(json: &str) -> Result<Program> {
        Ok(serde_json::from_str(json)?)
    }

    /// Compiles a program to bytecode.
    pub fn compile(program: &Program) -> Result<CompiledProgram> {
        let mut compiler = Compiler::new();
        Ok(compiler.compile(program)?)
    }

    /// Compiles and runs a program.
    ///
    /// # Errors
    ///
    /// Fails on malformed programs and on the first fatal runtime error.
    /// After a fatal error the VM still holds the output and diagnostics
    /// produced up to that point.
    pub fn run(&mut self, program: &Program) -> Result<Execution> {
        let compiled = Self::compile(program)?;
        self.run_compiled(&compiled)
    }

    /// Runs an already compiled program.
    pub fn run_compiled(&mut self, compiled: &CompiledProgram) -> Result<Execution> {
        let result = self.vm.execute(compiled)?;
        Ok(Execution {
            output: self.vm.output().to_string(),
            result: result.and_then(|id| self.vm.binding(id).cloned()),
            diagnostics: self.vm.diagnostics().to_vec(),
        })
    }

    /// Runs a JSON-serialized program.
    pub fn run_json(&mut self, json: &str) -> Result<Execution> {
        let program = Self::parse(json)?;
        self.run(&program)
    }

    /// Runs a JSON-serialized program file.
    pub fn run_file(&mut self, path: impl AsRef<Path>) -> Result<Execution> {
        let source = std::fs::read_to_string(path)?;
        self.run_json(&source)
    }

    /// Replaces the source `ask` reads from.
    pub fn set_input(&mut self, input: Input) {
        self.vm.set_input(input);
    }

    /// The underlying VM.
    pub fn vm(&self) -> &VM {
        &self.vm
    }

    /// The underlying VM, mutably.
    pub fn vm_mut(&mut self) -> &mut VM {
        &mut self.vm
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_creation() {
        let engine = Engine::new();
        assert!(engine.vm().output().is_empty());
    }

    #[test]
    fn test_run_empty_program() {
        let mut engine = Engine::new();
        let execution = engine.run(&Program::default()).unwrap();
        assert!(execution.output.is_empty());
        assert!(execution.result.is_none());
    }

    #[test]
    fn test_run_json_rejects_garbage() {
        let mut engine = Engine::new();
        assert!(matches!(engine.run_json("not json"), Err(Error::Json(_))));
    }

    #[test]
    fn test_run_missing_file() {
        let mut engine = Engine::new();
        assert!(matches!(
            engine.run_file("/nonexistent/program.json"),
            Err(Error::Io(_))
        ));
    }
}
