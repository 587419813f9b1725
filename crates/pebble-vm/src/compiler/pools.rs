//! Interning pools and the first compilation pass.
//!
//! Bytecode never carries literal payloads or identifier text inline. The
//! first pass walks the whole AST once and gives every literal a slot in the
//! [`ConstantPool`] and every identifier a slot in the [`NamePool`]; the
//! second pass then addresses them by index.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::ast::{Block, Executable, Literal, NOTHING_NAME, Operation, OperationType, Program, Reference};
use crate::runtime::value::{BindingType, PrimitiveKey, Value};

/// Pool index of the root object.
pub const ROOT_OBJECT: usize = 0;
/// Pool index of the generic non-specific object.
pub const SOMETHING: usize = 1;
/// Pool index of the null object.
pub const NOTHING: usize = 2;

/// A pooled constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// `Object`
    Root,
    /// `Something`
    Something,
    /// `Nothing`
    Nothing,
    /// A primitive literal
    Primitive(Value),
}

impl Constant {
    /// Type tag of the binding this constant materializes as.
    pub fn binding_type(&self) -> BindingType {
        match self {
            Constant::Root => BindingType::Object,
            Constant::Something => BindingType::Something,
            Constant::Nothing => BindingType::Null,
            Constant::Primitive(value) => value.binding_type(),
        }
    }

    fn key(&self) -> ConstantKey {
        match self {
            Constant::Root => ConstantKey::Root,
            Constant::Something => ConstantKey::Something,
            Constant::Nothing => ConstantKey::Nothing,
            Constant::Primitive(value) => match value.primitive_key() {
                Some(key) => ConstantKey::Primitive(key),
                None => ConstantKey::Nothing,
            },
        }
    }
}

impl From<&Literal> for Constant {
    fn from(literal: &Literal) -> Self {
        let value = match literal {
            Literal::Integer(n) => Value::Integer(*n),
            Literal::Decimal(n) => Value::Decimal(*n),
            Literal::Boolean(b) => Value::Boolean(*b),
            Literal::String(s) => Value::String(s.clone()),
        };
        Constant::Primitive(value)
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Root => write!(f, "Object"),
            Constant::Something => write!(f, "Something"),
            Constant::Nothing => write!(f, "Nothing"),
            Constant::Primitive(Value::String(s)) => write!(f, "{:?}", s),
            Constant::Primitive(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstantKey {
    Root,
    Something,
    Nothing,
    Primitive(PrimitiveKey),
}

/// What a reference leaf denotes.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity<'a> {
    /// A pooled constant
    Constant(Constant),
    /// A name resolved at runtime
    Name(&'a str),
}

/// Classifies a reference leaf as a constant or a name. The well-known
/// object names are constants.
pub fn classify(reference: &Reference) -> Entity<'_> {
    match reference {
        Reference::Literal(literal) => Entity::Constant(Constant::from(literal)),
        Reference::Name(name) => match name.as_str() {
            "Object" => Entity::Constant(Constant::Root),
            "Something" => Entity::Constant(Constant::Something),
            NOTHING_NAME => Entity::Constant(Constant::Nothing),
            other => Entity::Name(other),
        },
    }
}

/// Deduplicated constants, by type and value.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    index: FxHashMap<ConstantKey, usize>,
}

impl ConstantPool {
    /// Creates a pool holding the three well-known objects.
    pub fn new() -> Self {
        let mut pool = Self {
            entries: Vec::new(),
            index: FxHashMap::default(),
        };
        pool.intern(Constant::Root);
        pool.intern(Constant::Something);
        pool.intern(Constant::Nothing);
        pool
    }

    /// Returns the index of `constant`, adding it on first sight.
    pub fn intern(&mut self, constant: Constant) -> usize {
        let key = constant.key();
        if let Some(&index) = self.index.get(&key) {
            return index;
        }
        let index = self.entries.len();
        self.entries.push(constant);
        self.index.insert(key, index);
        index
    }

    /// Returns the index of an already interned constant.
    pub fn index_of(&self, constant: &Constant) -> Option<usize> {
        self.index.get(&constant.key()).copied()
    }

    /// Gets a constant by index.
    pub fn get(&self, index: usize) -> Option<&Constant> {
        self.entries.get(index)
    }

    /// Iterates constants in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Constant> {
        self.entries.iter()
    }

    /// Number of pooled constants.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Deduplicated identifier names.
#[derive(Debug, Clone, Default)]
pub struct NamePool {
    names: Vec<String>,
    index: FxHashMap<String, usize>,
}

impl NamePool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of `name`, adding it on first sight.
    pub fn intern(&mut self, name: &str) -> usize {
        if let Some(&index) = self.index.get(name) {
            return index;
        }
        let index = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), index);
        index
    }

    /// Returns the index of an already interned name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Gets a name by index.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Number of pooled names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Both pools of one compilation.
#[derive(Debug, Clone, Default)]
pub struct Pools {
    /// Literal constants
    pub constants: ConstantPool,
    /// Identifier names
    pub names: NamePool,
}

impl Pools {
    /// Creates pools holding only the well-known constants.
    pub fn new() -> Self {
        Self::default()
    }

    /// First pass: interns every reference leaf of `program`.
    pub fn collect(program: &Program) -> Self {
        let mut pools = Self::new();
        pools.visit_block(&program.main);
        tracing::debug!(
            constants = pools.constants.len(),
            names = pools.names.len(),
            "interned program references"
        );
        pools
    }

    fn visit_block(&mut self, block: &Block) {
        for executable in &block.executables {
            match executable {
                Executable::Operation(op) => self.visit_operation(op),
                Executable::Block(inner) => self.visit_block(inner),
            }
        }
    }

    fn visit_operation(&mut self, op: &Operation) {
        if op.kind == OperationType::Ref {
            if let Some(reference) = &op.value {
                match classify(reference) {
                    Entity::Constant(constant) => {
                        self.constants.intern(constant);
                    }
                    Entity::Name(name) => {
                        self.names.intern(name);
                    }
                }
            }
        }
        for operand in &op.operands {
            self.visit_operation(operand);
        }
    }
}
