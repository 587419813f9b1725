//! Arithmetic, boolean and comparison semantics.
//!
//! Operands must share a compatible type: integer with integer, decimal
//! with decimal, and string with string for addition only. A mismatch is
//! returned as a message; the VM reports it and substitutes `Nothing`.

use std::cmp::Ordering;

use crate::compiler::bytecode::{ComparisonBit, OpCode};
use crate::runtime::binding::Binding;
use crate::runtime::value::Value;

/// Applies an arithmetic opcode to two bindings.
pub fn arithmetic(opcode: OpCode, lhs: &Binding, rhs: &Binding) -> Result<Value, String> {
    let verb = match opcode {
        OpCode::Add => "add",
        OpCode::Subtract => "subtract",
        OpCode::Multiply => "multiply",
        OpCode::Divide => "divide",
        other => return Err(format!("{:?} is not an arithmetic operation", other)),
    };

    match (&lhs.value, &rhs.value) {
        (Value::Integer(a), Value::Integer(b)) => {
            let result = match opcode {
                OpCode::Add => a.checked_add(*b),
                OpCode::Subtract => a.checked_sub(*b),
                OpCode::Multiply => a.checked_mul(*b),
                _ => {
                    if *b == 0 {
                        return Err("division by zero".to_string());
                    }
                    a.checked_div(*b)
                }
            };
            result
                .map(Value::Integer)
                .ok_or_else(|| format!("integer overflow in {} {} {}", a, verb, b))
        }
        (Value::Decimal(a), Value::Decimal(b)) => Ok(Value::Decimal(match opcode {
            OpCode::Add => a + b,
            OpCode::Subtract => a - b,
            OpCode::Multiply => a * b,
            _ => a / b,
        })),
        (Value::String(a), Value::String(b)) if opcode == OpCode::Add => Ok(Value::String(format!("{}{}", a, b))),
        _ => Err(mismatch(verb, lhs, rhs)),
    }
}

/// Applies `And` or `Or` to two booleans.
pub fn logical(opcode: OpCode, lhs: &Binding, rhs: &Binding) -> Result<Value, String> {
    match (&lhs.value, &rhs.value, opcode) {
        (Value::Boolean(a), Value::Boolean(b), OpCode::And) => Ok(Value::Boolean(*a && *b)),
        (Value::Boolean(a), Value::Boolean(b), OpCode::Or) => Ok(Value::Boolean(*a || *b)),
        (_, _, OpCode::And) => Err(mismatch("and", lhs, rhs)),
        _ => Err(mismatch("or", lhs, rhs)),
    }
}

/// Negates a boolean.
pub fn not(operand: &Binding) -> Result<Value, String> {
    match operand.value {
        Value::Boolean(b) => Ok(Value::Boolean(!b)),
        _ => Err(format!("cannot negate {}", operand.ty.name())),
    }
}

/// Orders two numeric bindings. `Ok(None)` means unordered (a NaN operand).
pub fn compare(lhs: &Binding, rhs: &Binding) -> Result<Option<Ordering>, String> {
    match (&lhs.value, &rhs.value) {
        (Value::Integer(a), Value::Integer(b)) => Ok(Some(a.cmp(b))),
        (Value::Decimal(a), Value::Decimal(b)) => Ok(a.partial_cmp(b)),
        _ => Err(mismatch("compare", lhs, rhs)),
    }
}

/// Comparison register bits set by an ordering. `<=` and `>=` are the
/// union of their strict bit with `==`.
pub fn comparison_mask(ordering: Ordering) -> u8 {
    match ordering {
        Ordering::Less => ComparisonBit::Less.mask() | ComparisonBit::LessOrEqual.mask(),
        Ordering::Greater => ComparisonBit::Greater.mask() | ComparisonBit::GreaterOrEqual.mask(),
        Ordering::Equal => {
            ComparisonBit::Equal.mask() | ComparisonBit::LessOrEqual.mask() | ComparisonBit::GreaterOrEqual.mask()
        }
    }
}

fn mismatch(verb: &str, lhs: &Binding, rhs: &Binding) -> String {
    format!("cannot {} {} and {}", verb, lhs.ty.name(), rhs.ty.name())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i64) -> Binding {
        Binding::primitive(Value::Integer(n))
    }

    fn text(s: &str) -> Binding {
        Binding::primitive(Value::String(s.into()))
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(arithmetic(OpCode::Add, &int(2), &int(3)), Ok(Value::Integer(5)));
        assert_eq!(arithmetic(OpCode::Subtract, &int(2), &int(3)), Ok(Value::Integer(-1)));
        assert_eq!(arithmetic(OpCode::Multiply, &int(4), &int(3)), Ok(Value::Integer(12)));
        assert_eq!(arithmetic(OpCode::Divide, &int(7), &int(2)), Ok(Value::Integer(3)));
    }

    #[test]
    fn test_integer_errors() {
        assert!(arithmetic(OpCode::Divide, &int(1), &int(0)).is_err());
        assert!(arithmetic(OpCode::Add, &int(i64::MAX), &int(1)).is_err());
    }

    #[test]
    fn test_decimal_arithmetic() {
        let a = Binding::primitive(Value::Decimal(1.5));
        let b = Binding::primitive(Value::Decimal(0.5));
        assert_eq!(arithmetic(OpCode::Add, &a, &b), Ok(Value::Decimal(2.0)));
        assert_eq!(arithmetic(OpCode::Divide, &a, &b), Ok(Value::Decimal(3.0)));
    }

    #[test]
    fn test_string_concatenation_only() {
        assert_eq!(
            arithmetic(OpCode::Add, &text("ab"), &text("cd")),
            Ok(Value::String("abcd".into()))
        );
        assert!(arithmetic(OpCode::Multiply, &text("ab"), &text("cd")).is_err());
    }

    #[test]
    fn test_mixed_types_are_rejected() {
        let err = arithmetic(OpCode::Add, &int(1), &text("x")).unwrap_err();
        assert_eq!(err, "cannot add Integer and String");

        let decimal = Binding::primitive(Value::Decimal(1.0));
        assert!(arithmetic(OpCode::Add, &int(1), &decimal).is_err());
    }

    #[test]
    fn test_logical() {
        let t = Binding::primitive(Value::Boolean(true));
        let f = Binding::primitive(Value::Boolean(false));
        assert_eq!(logical(OpCode::And, &t, &f), Ok(Value::Boolean(false)));
        assert_eq!(logical(OpCode::Or, &t, &f), Ok(Value::Boolean(true)));
        assert_eq!(not(&f), Ok(Value::Boolean(true)));
        assert!(logical(OpCode::And, &t, &int(1)).is_err());
        assert!(not(&int(1)).is_err());
    }

    #[test]
    fn test_compare_and_masks() {
        assert_eq!(compare(&int(1), &int(2)), Ok(Some(Ordering::Less)));
        assert!(compare(&text("a"), &text("b")).is_err());

        let mask = comparison_mask(Ordering::Equal);
        assert_ne!(mask & ComparisonBit::LessOrEqual.mask(), 0);
        assert_ne!(mask & ComparisonBit::GreaterOrEqual.mask(), 0);
        assert_eq!(mask & ComparisonBit::Less.mask(), 0);
    }
}
