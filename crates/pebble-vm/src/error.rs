//! Error types for compilation and execution.

use thiserror::Error;

use crate::ast::OperationType;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the engine.
#[derive(Debug, Error)]
pub enum Error {
    /// The AST could not be flattened
    #[error("CompileError: {0}")]
    Compile(#[from] CompileError),

    /// A fatal runtime error aborted the program
    #[error("line {line}: {error}")]
    Fatal {
        /// Source line of the failing statement
        line: usize,
        /// What went wrong
        error: RuntimeError,
    },

    /// File system error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Program file is not a valid serialized AST
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A background task failed to complete
    #[error("task failed: {0}")]
    Task(String),
}

impl Error {
    /// Returns the runtime error behind a fatal abort.
    pub fn runtime(&self) -> Option<&RuntimeError> {
        match self {
            Error::Fatal { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Malformed AST shapes and encoding limits hit while flattening.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// Wrong number of children
    #[error("line {line}: {kind:?} expects {expected} operand(s), found {found}")]
    OperandCount {
        /// Operation kind
        kind: OperationType,
        /// Source line
        line: usize,
        /// Accepted operand count
        expected: usize,
        /// Actual operand count
        found: usize,
    },

    /// A literal or expression where a plain name is required
    #[error("line {line}: expected a name")]
    ExpectedName {
        /// Source line
        line: usize,
    },

    /// A reference leaf without a payload
    #[error("line {line}: reference carries no value")]
    MissingReference {
        /// Source line
        line: usize,
    },

    /// A tuple outside an argument or parameter list
    #[error("line {line}: a tuple is only valid as an argument or parameter list")]
    MisplacedTuple {
        /// Source line
        line: usize,
    },

    /// `elseif` or `else` with no open `if`
    #[error("line {line}: {kind:?} without a preceding if")]
    DanglingClause {
        /// Operation kind
        kind: OperationType,
        /// Source line
        line: usize,
    },

    /// A method definition not followed by its body
    #[error("line {line}: method definition has no body")]
    MissingMethodBody {
        /// Source line of the definition
        line: usize,
    },

    /// A leaf that the first pass did not intern
    #[error("'{0}' is missing from the interning pools")]
    NotInterned(String),

    /// A back-patched target needs more bytes than were reserved.
    ///
    /// A jump reserved while the program holds `n` instructions reaches
    /// offsets below `256^(2 + k)`, where `k` is the number of extension
    /// bytes `n` itself needs. Near the start of a program that is 65535,
    /// so a single block body longer than that fails to compile.
    #[error("jump target {target} does not fit the placeholder at {at}")]
    JumpTargetOverflow {
        /// Placeholder offset
        at: usize,
        /// Target offset
        target: usize,
    },
}

/// Errors that stop the dispatch loop.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// Argument count differs from the declared parameters
    #[error("{name} expected {expected} arguments but got {got}")]
    ArgumentCount {
        /// Method name
        name: String,
        /// Declared parameters
        expected: usize,
        /// Supplied arguments
        got: usize,
    },

    /// Call of a binding without a code section
    #[error("{name} cannot be called")]
    NotCallable {
        /// Binding name
        name: String,
    },

    /// Array index of a non-integer type
    #[error("array index must be an Integer, found {found}")]
    NonIntegerIndex {
        /// Type of the index
        found: &'static str,
    },

    /// Indexed binding has no size
    #[error("{name} is not an array")]
    NotAnArray {
        /// Binding name
        name: String,
    },

    /// Index outside `0..size`
    #[error("index {index} is out of bounds for {name} of size {size}")]
    IndexOutOfBounds {
        /// Binding name
        name: String,
        /// Requested index
        index: i64,
        /// Array size
        size: i64,
    },

    /// Too many active call frames
    #[error("call depth exceeded the limit of {limit}")]
    CallDepthExceeded {
        /// Configured limit
        limit: usize,
    },

    /// Pop from an empty operand stack
    #[error("operand stack underflow")]
    StackUnderflow,

    /// A raw name where a binding is required
    #[error("expected a binding on the operand stack, found a name")]
    ExpectedBinding,

    /// A binding where a raw name is required
    #[error("expected a name on the operand stack, found a binding")]
    ExpectedName,

    /// A handle whose value has been freed
    #[error("stale handle {0}")]
    StaleHandle(String),

    /// Return with no active frame
    #[error("no active call frame")]
    MissingFrame,

    /// Leave-local with no open block scope
    #[error("no block scope to leave")]
    NoLocalScope,

    /// Literal operand outside the constant pool
    #[error("unknown constant index {0}")]
    UnknownConstant(usize),

    /// Name operand outside the name pool
    #[error("unknown name index {0}")]
    UnknownName(usize),

    /// Unsupported syscall number
    #[error("unknown syscall {0}")]
    UnknownSyscall(usize),

    /// Comparison bit outside the register
    #[error("unknown comparison bit {0}")]
    UnknownComparisonBit(usize),

    /// Type tag outside the known set
    #[error("unknown type tag {0}")]
    UnknownType(usize),

    /// More extension prefixes than an operand can hold
    #[error("operand extension exceeds {0} bytes")]
    OperandOverflow(usize),

    /// Console input failed
    #[error("console input failed: {0}")]
    Input(String),
}
