//! The bytecode virtual machine.
//!
//! ## Structure
//!
//! - `interpreter` - VM context, registers, call frames and the dispatch loop
//! - `resolve` - Bare and scoped name resolution
//! - `operators` - Typed arithmetic, boolean and comparison semantics
//! - `console` - Program output buffer and line input

mod interpreter;
mod resolve;

pub mod console;
pub mod operators;

// Re-export public API
pub use console::{Console, Input};
pub use interpreter::VM;
pub use resolve::{CALLER_KEYWORD, LAST_RESULT_KEYWORD, SELF_KEYWORD, is_keyword};
