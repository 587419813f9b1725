//! Binding payloads and type tags.

use std::fmt;

/// The raw payload carried by a binding.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// No payload
    #[default]
    None,
    /// 64-bit signed integer
    Integer(i64),
    /// IEEE 754 double
    Decimal(f64),
    /// Boolean
    Boolean(bool),
    /// String
    String(String),
}

impl Value {
    /// Returns the integer payload, if any.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the decimal payload, if any.
    pub fn as_decimal(&self) -> Option<f64> {
        match self {
            Value::Decimal(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean payload, if any.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The type tag a binding holding only this payload carries.
    pub fn binding_type(&self) -> BindingType {
        match self {
            Value::None => BindingType::Null,
            Value::Integer(_) => BindingType::Integer,
            Value::Decimal(_) => BindingType::Decimal,
            Value::Boolean(_) => BindingType::Boolean,
            Value::String(_) => BindingType::String,
        }
    }

    /// Returns the interning key of a primitive payload.
    pub fn primitive_key(&self) -> Option<PrimitiveKey> {
        match self {
            Value::None => None,
            Value::Integer(n) => Some(PrimitiveKey::Integer(*n)),
            Value::Decimal(n) => Some(PrimitiveKey::Decimal(n.to_bits())),
            Value::Boolean(b) => Some(PrimitiveKey::Boolean(*b)),
            Value::String(s) => Some(PrimitiveKey::String(s.clone())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "Nothing"),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Decimal(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

/// Hashable identity of a primitive payload. Decimals compare by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrimitiveKey {
    /// Integer payload
    Integer(i64),
    /// Decimal payload bits
    Decimal(u64),
    /// Boolean payload
    Boolean(bool),
    /// String payload
    String(String),
}

/// The dynamic type tag of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum BindingType {
    /// The null object (`Nothing`)
    #[default]
    Null,
    /// The root object and plain objects copied from it
    Object,
    /// The generic non-specific object
    Something,
    /// Integer
    Integer,
    /// Decimal
    Decimal,
    /// Boolean
    Boolean,
    /// String
    String,
    /// Callable method
    Method,
    /// Array constructor marker and constructed arrays
    Array,
}

impl BindingType {
    const ALL: [BindingType; 9] = [
        BindingType::Null,
        BindingType::Object,
        BindingType::Something,
        BindingType::Integer,
        BindingType::Decimal,
        BindingType::Boolean,
        BindingType::String,
        BindingType::Method,
        BindingType::Array,
    ];

    /// Decodes a type tag from an instruction operand.
    pub fn from_operand(operand: usize) -> Option<Self> {
        Self::ALL.get(operand).copied()
    }

    /// The user-facing name of this type.
    pub fn name(&self) -> &'static str {
        match self {
            BindingType::Null => "Nothing",
            BindingType::Object => "Object",
            BindingType::Something => "Something",
            BindingType::Integer => "Integer",
            BindingType::Decimal => "Decimal",
            BindingType::Boolean => "Boolean",
            BindingType::String => "String",
            BindingType::Method => "Method",
            BindingType::Array => "Array",
        }
    }
}

impl fmt::Display for BindingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
