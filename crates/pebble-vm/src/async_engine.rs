//! Asynchronous engine APIs.
//!
//! Program files are read with tokio's non-blocking file I/O and the
//! dispatch loop runs on a blocking-pool thread, so a long-running program
//! never stalls the async runtime.
//!
//! # Example
//!
//! ```ignore
//! use pebble_vm::AsyncEngine;
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = AsyncEngine::new();
//!     let execution = engine.run_file("program.json").await.unwrap();
//!     print!("{}", execution.output);
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use tokio::fs;
use tokio::sync::Mutex;

use crate::ast::Program;
use crate::compiler::CompiledProgram;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::{Engine, Execution};

/// An asynchronous Pebble engine.
///
/// Wraps the synchronous engine. Runs are serialized on the one VM it owns.
pub struct AsyncEngine {
    /// The underlying engine (thread-safe wrapper)
    engine: Arc<Mutex<Engine>>,
}

impl AsyncEngine {
    /// Creates a new async engine.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a new async engine with a configuration.
    pub fn with_config(config: Config) -> Self {
        Self {
            engine: Arc::new(Mutex::new(Engine::with_config(config))),
        }
    }

    /// Runs a compiled program off the async threads.
    pub async fn run_compiled(&self, compiled: CompiledProgram) -> Result<Execution> {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || {
            let mut engine = engine.blocking_lock();
            engine.run_compiled(&compiled)
        })
        .await
        .map_err(|e| Error::Task(e.to_string()))?
    }

    /// Compiles and runs a program.
    pub async fn run(&self, program: &Program) -> Result<Execution> {
        let compiled = Engine::compile(program)?;
        self.run_compiled(compiled).await
    }

    /// Runs a JSON-serialized program.
    pub async fn run_json(&self, json: &str) -> Result<Execution> {
        let program = Engine::parse(json)?;
        self.run(&program).await
    }

    /// Reads and compiles a program file without running it.
    pub async fn compile_file(&self, path: impl AsRef<Path>) -> Result<CompiledProgram> {
        let source = fs::read_to_string(path.as_ref()).await?;
        let program = Engine::parse(&source)?;
        Engine::compile(&program)
    }

    /// Runs a JSON-serialized program file.
    ///
    /// Uses tokio's async file I/O for non-blocking reads.
    pub async fn run_file(&self, path: impl AsRef<Path>) -> Result<Execution> {
        let compiled = self.compile_file(path).await?;
        self.run_compiled(compiled).await
    }

    /// Runs several program files.
    ///
    /// Files are read and compiled concurrently; runs share the VM and so
    /// execute one after another. Results are in input order.
    pub async fn run_files(&self, paths: &[impl AsRef<Path>]) -> Vec<Result<Execution>> {
        let futures: Vec<_> = paths.iter().map(|p| self.run_file(p)).collect();

        futures::future::join_all(futures).await
    }

    /// Runs a closure against the engine, e.g. to inspect the VM after a
    /// fatal error.
    pub async fn with_engine<R>(&self, f: impl FnOnce(&mut Engine) -> R) -> R {
        let mut engine = self.engine.lock().await;
        f(&mut engine)
    }
}

impl Default for AsyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Compiles many programs on a thread pool.
#[cfg(feature = "parallel")]
pub struct ParallelCompiler {
    /// Thread pool for CPU-bound work
    pool: rayon::ThreadPool,
}

#[cfg(feature = "parallel")]
impl ParallelCompiler {
    /// Creates a compiler pool with the default number of threads.
    pub fn new() -> Result<Self> {
        Self::build(rayon::ThreadPoolBuilder::new())
    }

    /// Creates a compiler pool with a specific number of threads.
    pub fn with_threads(num_threads: usize) -> Result<Self> {
        Self::build(rayon::ThreadPoolBuilder::new().num_threads(num_threads))
    }

    fn build(builder: rayon::ThreadPoolBuilder) -> Result<Self> {
        let pool = builder.build().map_err(|e| Error::Task(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Compiles each program independently. Results are in input order.
    pub fn compile_all(&self, programs: &[Program]) -> Vec<Result<CompiledProgram>> {
        use rayon::prelude::*;

        self.pool
            .install(|| programs.par_iter().map(Engine::compile).collect())
    }
}
