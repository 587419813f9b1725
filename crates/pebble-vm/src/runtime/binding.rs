//! Bindings: the named or anonymous slots every instruction operates on.

use super::scope::ScopeId;
use super::value::{BindingType, Value};
use crate::gc::Handle;

/// Handle to a [`Binding`] in the heap.
pub type BindingId = Handle<Binding>;

/// A runtime slot carrying a type tag, a payload, and optionally a bound
/// scope (its attribute namespace) and a code section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Binding {
    /// Name, or `None` for temporaries
    pub name: Option<String>,
    /// Attribute namespace (non-owning)
    pub scope: Option<ScopeId>,
    /// Current type tag
    pub ty: BindingType,
    /// Bytecode offset of the body; zero when not callable
    pub section: usize,
    /// Raw payload
    pub value: Value,
    /// Pooled or interned bindings are shared and must not be assigned to
    pub constant: bool,
}

impl Binding {
    /// An unnamed binding of the given type.
    pub fn anonymous(ty: BindingType) -> Self {
        Self {
            ty,
            ..Self::default()
        }
    }

    /// A named binding of the given type.
    pub fn named(name: impl Into<String>, ty: BindingType) -> Self {
        Self {
            name: Some(name.into()),
            ty,
            ..Self::default()
        }
    }

    /// An unnamed binding holding a primitive payload.
    pub fn primitive(value: Value) -> Self {
        Self {
            ty: value.binding_type(),
            value,
            ..Self::default()
        }
    }

    /// Attaches a bound scope.
    pub fn with_scope(mut self, scope: ScopeId) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Returns true for null-typed bindings.
    pub fn is_null(&self) -> bool {
        self.ty == BindingType::Null
    }

    /// Returns true if the binding has a code section.
    pub fn is_callable(&self) -> bool {
        self.section != 0
    }

    /// Name for diagnostics.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }

    /// Text written by `print`.
    pub fn display_value(&self) -> String {
        match self.value {
            Value::None => self.ty.name().to_string(),
            ref value => value.to_string(),
        }
    }

    /// Takes over `source`'s section, scope and payload.
    ///
    /// The type follows `source` unless `source` is null-typed and this
    /// binding already has a type, so assigning `Nothing` never erases an
    /// established type.
    pub fn assign_from(&mut self, source: &Binding) {
        self.section = source.section;
        self.scope = source.scope;
        self.value = source.value.clone();
        if !source.is_null() || self.is_null() {
            self.ty = source.ty;
        }
    }

    /// Structural identity: type, bound scope, section and payload.
    pub fn same_as(&self, other: &Binding) -> bool {
        self.ty == other.ty
            && self.scope == other.scope
            && self.section == other.section
            && self.value == other.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_takes_type_and_payload() {
        let mut target = Binding::named("a", BindingType::Null);
        target.assign_from(&Binding::primitive(Value::Integer(5)));

        assert_eq!(target.ty, BindingType::Integer);
        assert_eq!(target.value, Value::Integer(5));
        assert_eq!(target.name.as_deref(), Some("a"));
    }

    #[test]
    fn test_assign_null_keeps_established_type() {
        let mut target = Binding::named("a", BindingType::Null);
        target.assign_from(&Binding::primitive(Value::Integer(5)));
        target.assign_from(&Binding::anonymous(BindingType::Null));

        assert_eq!(target.ty, BindingType::Integer);
        assert_eq!(target.value, Value::None);
    }

    #[test]
    fn test_assign_copies_section() {
        let mut method = Binding::anonymous(BindingType::Method);
        method.section = 12;
        let mut target = Binding::named("f", BindingType::Null);
        target.assign_from(&method);

        assert!(target.is_callable());
        assert_eq!(target.ty, BindingType::Method);
    }

    #[test]
    fn test_same_as_ignores_name() {
        let a = Binding {
            name: Some("a".into()),
            ..Binding::primitive(Value::String("x".into()))
        };
        let b = Binding::primitive(Value::String("x".into()));
        assert!(a.same_as(&b));
        assert!(!a.same_as(&Binding::primitive(Value::String("y".into()))));
    }

    #[test]
    fn test_display_value() {
        assert_eq!(Binding::primitive(Value::Integer(3)).display_value(), "3");
        assert_eq!(Binding::anonymous(BindingType::Object).display_value(), "Object");
    }
}
