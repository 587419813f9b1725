//! Scopes: ordered sets of owned bindings with a parent link.

use super::binding::BindingId;
use crate::gc::Handle;

/// Handle to a [`Scope`] in the heap.
pub type ScopeId = Handle<Scope>;

/// One level of name lookup.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    /// Bindings declared directly at this level, in declaration order
    pub own: Vec<BindingId>,
    /// Inherited scope, searched by chained lookups
    pub parent: Option<ScopeId>,
    /// Declared parameter names, for method scopes
    pub params: Vec<String>,
    /// Durable scopes outlive the statement that created them
    pub durable: bool,
}

impl Scope {
    /// Creates an empty scope.
    pub fn new(parent: Option<ScopeId>, durable: bool) -> Self {
        Self {
            parent,
            durable,
            ..Self::default()
        }
    }

    /// Creates a durable method scope declaring `params`.
    pub fn method(params: Vec<String>) -> Self {
        Self {
            params,
            durable: true,
            ..Self::default()
        }
    }

    /// Returns true if `binding` was declared at this level.
    pub fn owns(&self, binding: BindingId) -> bool {
        self.own.contains(&binding)
    }
}
