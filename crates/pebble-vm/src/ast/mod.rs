//! Abstract Syntax Tree consumed by the compiler.
//!
//! The parser hands over a [`Program`]: a tree of [`Block`]s whose entries are
//! either nested blocks or [`Operation`]s. A control-flow operation (`if`,
//! `elseif`, `else`, `while`, a method definition) is immediately followed in
//! its enclosing block by the [`Block`] that forms its body.
//!
//! Every type here is serde-serializable so that parsed programs can be
//! stored and exchanged as JSON.

use serde::{Deserialize, Serialize};

/// A complete program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// The top-level block
    pub main: Block,
}

impl Program {
    /// Creates a program from its top-level block.
    pub fn new(main: Block) -> Self {
        Self { main }
    }
}

/// An ordered sequence of statements and nested blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Entries in source order
    pub executables: Vec<Executable>,
}

impl Block {
    /// Creates an empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a statement.
    pub fn with(mut self, operation: Operation) -> Self {
        self.executables.push(Executable::Operation(operation));
        self
    }

    /// Appends a nested block.
    pub fn with_block(mut self, block: Block) -> Self {
        self.executables.push(Executable::Block(block));
        self
    }

    /// Returns true if the block has no entries.
    pub fn is_empty(&self) -> bool {
        self.executables.is_empty()
    }
}

/// One entry of a [`Block`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Executable {
    /// A statement
    Operation(Operation),
    /// A nested block, owned by the statement preceding it (if any)
    Block(Block),
}

/// The kind of an [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    /// Leaf reference: a name or a literal, carried in `value`
    Ref,
    /// Name resolution: `[name]` or `[target, member]`
    ScopeResolution,
    /// `target = value`
    Assign,
    /// `==`
    IsEqual,
    /// `!=`
    IsNotEqual,
    /// `<`
    IsLessThan,
    /// `>`
    IsGreaterThan,
    /// `<=`
    IsLessThanOrEqual,
    /// `>=`
    IsGreaterThanOrEqual,
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `and`
    And,
    /// `or`
    Or,
    /// `not`
    Not,
    /// Call: `[caller, method, arguments]`
    Evaluate,
    /// `print value`
    Print,
    /// `ask [prompt]`
    Ask,
    /// `return [value]`
    Return,
    /// `if condition`
    If,
    /// `elseif condition`
    ElseIf,
    /// `else`
    Else,
    /// `while condition`
    While,
    /// Method definition: `[name, parameters]`
    DefineMethod,
    /// `new target`
    New,
    /// A parenthesized list of arguments or parameters
    Tuple,
    /// `target[index]`
    Index,
}

/// The payload of a [`OperationType::Ref`] leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reference {
    /// An identifier
    Name(String),
    /// A literal value
    Literal(Literal),
}

/// A literal value in source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// Integer literal
    Integer(i64),
    /// Decimal literal
    Decimal(f64),
    /// `true` / `false`
    Boolean(bool),
    /// String literal
    String(String),
}

/// A statement or expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// What this node does
    pub kind: OperationType,
    /// Child nodes
    #[serde(default)]
    pub operands: Vec<Operation>,
    /// Leaf payload, present only on [`OperationType::Ref`]
    #[serde(default)]
    pub value: Option<Reference>,
    /// Source line
    #[serde(default)]
    pub line: usize,
}

impl Operation {
    /// Creates an operation from its kind and operands.
    pub fn new(kind: OperationType, operands: Vec<Operation>) -> Self {
        Self {
            kind,
            operands,
            value: None,
            line: 0,
        }
    }

    fn leaf(reference: Reference) -> Self {
        Self {
            kind: OperationType::Ref,
            operands: Vec::new(),
            value: Some(reference),
            line: 0,
        }
    }

    /// Sets the source line on this node and every child that has none.
    pub fn at_line(mut self, line: usize) -> Self {
        self.set_line(line);
        self
    }

    fn set_line(&mut self, line: usize) {
        if self.line == 0 {
            self.line = line;
        }
        for operand in &mut self.operands {
            operand.set_line(line);
        }
    }

    // ========================================================================
    // Leaves
    // ========================================================================

    /// A bare name leaf.
    pub fn name(name: impl Into<String>) -> Self {
        Self::leaf(Reference::Name(name.into()))
    }

    /// An integer literal leaf.
    pub fn integer(value: i64) -> Self {
        Self::leaf(Reference::Literal(Literal::Integer(value)))
    }

    /// A decimal literal leaf.
    pub fn decimal(value: f64) -> Self {
        Self::leaf(Reference::Literal(Literal::Decimal(value)))
    }

    /// A boolean literal leaf.
    pub fn boolean(value: bool) -> Self {
        Self::leaf(Reference::Literal(Literal::Boolean(value)))
    }

    /// A string literal leaf.
    pub fn string(value: impl Into<String>) -> Self {
        Self::leaf(Reference::Literal(Literal::String(value.into())))
    }

    /// The `Nothing` leaf, used for "no caller" and "no arguments".
    pub fn nothing() -> Self {
        Self::name(NOTHING_NAME)
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Direct resolution of `name`.
    pub fn var(name: impl Into<String>) -> Self {
        Self::new(OperationType::ScopeResolution, vec![Self::name(name)])
    }

    /// Scoped resolution of `member` inside `target`.
    pub fn attr(target: Operation, member: impl Into<String>) -> Self {
        Self::new(OperationType::ScopeResolution, vec![target, Self::name(member)])
    }

    /// A unary operation.
    pub fn unary(kind: OperationType, operand: Operation) -> Self {
        Self::new(kind, vec![operand])
    }

    /// A binary operation.
    pub fn binary(kind: OperationType, lhs: Operation, rhs: Operation) -> Self {
        Self::new(kind, vec![lhs, rhs])
    }

    /// `target = value`
    pub fn assign(target: Operation, value: Operation) -> Self {
        Self::binary(OperationType::Assign, target, value)
    }

    /// A call of `method` on `caller` (or on nothing) with `arguments`.
    pub fn call(caller: Option<Operation>, method: impl Into<String>, arguments: Vec<Operation>) -> Self {
        let caller = caller.unwrap_or_else(Self::nothing);
        let arguments = match arguments.len() {
            0 => Self::nothing(),
            1 => arguments.into_iter().next().unwrap_or_else(Self::nothing),
            _ => Self::new(OperationType::Tuple, arguments),
        };
        Self::new(
            OperationType::Evaluate,
            vec![caller, Self::name(method), arguments],
        )
    }

    /// `new target`
    pub fn new_object(target: Operation) -> Self {
        Self::unary(OperationType::New, target)
    }

    /// `target[index]`
    pub fn index(target: Operation, index: Operation) -> Self {
        Self::binary(OperationType::Index, target, index)
    }

    // ========================================================================
    // Statements
    // ========================================================================

    /// `print value`
    pub fn print(value: Operation) -> Self {
        Self::unary(OperationType::Print, value)
    }

    /// `ask [prompt]`
    pub fn ask(prompt: Option<Operation>) -> Self {
        Self::new(OperationType::Ask, prompt.into_iter().collect())
    }

    /// `return [value]`
    pub fn ret(value: Option<Operation>) -> Self {
        Self::new(OperationType::Return, value.into_iter().collect())
    }

    /// `if condition`; the body block follows it.
    pub fn if_clause(condition: Operation) -> Self {
        Self::unary(OperationType::If, condition)
    }

    /// `elseif condition`; the body block follows it.
    pub fn elseif_clause(condition: Operation) -> Self {
        Self::unary(OperationType::ElseIf, condition)
    }

    /// `else`; the body block follows it.
    pub fn else_clause() -> Self {
        Self::new(OperationType::Else, Vec::new())
    }

    /// `while condition`; the body block follows it.
    pub fn while_loop(condition: Operation) -> Self {
        Self::unary(OperationType::While, condition)
    }

    /// A method definition bound to `target`; the body block follows it.
    pub fn define(target: Operation, parameters: &[&str]) -> Self {
        let mut operands = vec![target];
        match parameters {
            [] => {}
            [single] => operands.push(Self::name(*single)),
            many => operands.push(Self::new(
                OperationType::Tuple,
                many.iter().map(|p| Self::name(*p)).collect(),
            )),
        }
        Self::new(OperationType::DefineMethod, operands)
    }

    // ========================================================================
    // Classification
    // ========================================================================

    /// The name carried by a name leaf, looking through a single-operand
    /// scope resolution.
    pub fn leaf_name(&self) -> Option<&str> {
        match (self.kind, &self.value, self.operands.as_slice()) {
            (OperationType::Ref, Some(Reference::Name(name)), _) => Some(name),
            (OperationType::ScopeResolution, _, [single]) => single.leaf_name(),
            _ => None,
        }
    }

    /// Returns true for the `Nothing` placeholder leaf.
    pub fn is_nothing(&self) -> bool {
        self.leaf_name() == Some(NOTHING_NAME)
    }

    /// Statements that transfer control and therefore leave no result.
    pub fn is_conditional_jump(&self) -> bool {
        matches!(
            self.kind,
            OperationType::If | OperationType::ElseIf | OperationType::Else | OperationType::While
        )
    }

    /// `if` and `elseif`, which test a condition before their body.
    pub fn is_if_conditional(&self) -> bool {
        matches!(self.kind, OperationType::If | OperationType::ElseIf)
    }

    /// Members of an `if`/`elseif`/`else` chain.
    pub fn is_if_chain(&self) -> bool {
        matches!(
            self.kind,
            OperationType::If | OperationType::ElseIf | OperationType::Else
        )
    }

    /// `elseif` and `else`, which continue a chain opened earlier.
    pub fn continues_if_chain(&self) -> bool {
        matches!(self.kind, OperationType::ElseIf | OperationType::Else)
    }
}

/// The name of the null object.
pub const NOTHING_NAME: &str = "Nothing";
