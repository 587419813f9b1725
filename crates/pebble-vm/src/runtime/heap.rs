//! The binding/scope graph.
//!
//! The heap owns both arenas. Scopes own the bindings declared in them and
//! free those bindings when released; bound-scope references held by
//! bindings are non-owning, so releasing a binding never touches the scope
//! it is bound to.

use super::binding::{Binding, BindingId};
use super::scope::{Scope, ScopeId};
use crate::error::RuntimeError;
use crate::gc::Arena;

/// Arena-backed storage for bindings and scopes.
#[derive(Default)]
pub struct Heap {
    bindings: Arena<Binding>,
    scopes: Arena<Scope>,
}

impl Heap {
    /// Creates an empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a binding that no scope owns.
    pub fn allocate(&mut self, binding: Binding) -> BindingId {
        self.bindings.allocate(binding)
    }

    /// Allocates a scope.
    pub fn allocate_scope(&mut self, scope: Scope) -> ScopeId {
        self.scopes.allocate(scope)
    }

    /// Allocates an empty scope.
    pub fn new_scope(&mut self, parent: Option<ScopeId>, durable: bool) -> ScopeId {
        self.allocate_scope(Scope::new(parent, durable))
    }

    /// Looks up a binding.
    pub fn binding(&self, id: BindingId) -> Result<&Binding, RuntimeError> {
        self.bindings
            .get(id)
            .ok_or_else(|| RuntimeError::StaleHandle(format!("binding {:?}", id)))
    }

    /// Looks up a binding mutably.
    pub fn binding_mut(&mut self, id: BindingId) -> Result<&mut Binding, RuntimeError> {
        self.bindings
            .get_mut(id)
            .ok_or_else(|| RuntimeError::StaleHandle(format!("binding {:?}", id)))
    }

    /// Looks up a scope.
    pub fn scope(&self, id: ScopeId) -> Result<&Scope, RuntimeError> {
        self.scopes
            .get(id)
            .ok_or_else(|| RuntimeError::StaleHandle(format!("scope {:?}", id)))
    }

    /// Looks up a scope mutably.
    pub fn scope_mut(&mut self, id: ScopeId) -> Result<&mut Scope, RuntimeError> {
        self.scopes
            .get_mut(id)
            .ok_or_else(|| RuntimeError::StaleHandle(format!("scope {:?}", id)))
    }

    /// Allocates `binding` and makes `scope` its owner.
    pub fn declare(&mut self, scope: ScopeId, binding: Binding) -> Result<BindingId, RuntimeError> {
        // Check the scope first so a failed declare leaks nothing.
        self.scope(scope)?;
        let id = self.bindings.allocate(binding);
        self.scope_mut(scope)?.own.push(id);
        Ok(id)
    }

    /// Declares `binding` in `scope`, replacing a binding of the same name
    /// already declared there.
    pub fn redeclare(&mut self, scope: ScopeId, binding: Binding) -> Result<BindingId, RuntimeError> {
        let existing = match binding.name.as_deref() {
            Some(name) => self.find_immediate(scope, name)?,
            None => None,
        };
        match existing {
            Some(id) => {
                *self.binding_mut(id)? = binding;
                Ok(id)
            }
            None => self.declare(scope, binding),
        }
    }

    /// Finds `name` among the bindings declared directly in `scope`.
    pub fn find_immediate(&self, scope: ScopeId, name: &str) -> Result<Option<BindingId>, RuntimeError> {
        for &id in &self.scope(scope)?.own {
            if self.binding(id)?.name.as_deref() == Some(name) {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Finds `name` in `scope` or any scope it inherits from.
    pub fn find_inherited(&self, scope: ScopeId, name: &str) -> Result<Option<BindingId>, RuntimeError> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(found) = self.find_immediate(id, name)? {
                return Ok(Some(found));
            }
            current = self.scope(id)?.parent;
        }
        Ok(None)
    }

    /// Shallow copy: a new durable scope with the same parent and
    /// parameters, owning a copy of every binding `source` owns.
    ///
    /// The copied bindings keep their bound-scope handles, so nested
    /// objects are shared rather than duplicated.
    pub fn copy_scope(&mut self, source: ScopeId) -> Result<ScopeId, RuntimeError> {
        let original = self.scope(source)?.clone();
        let copy = self.allocate_scope(Scope {
            own: Vec::with_capacity(original.own.len()),
            parent: original.parent,
            params: original.params,
            durable: true,
        });

        for id in original.own {
            let binding = Binding {
                constant: false,
                ..self.binding(id)?.clone()
            };
            let duplicate = self.bindings.allocate(binding);
            self.scope_mut(copy)?.own.push(duplicate);
        }

        Ok(copy)
    }

    /// Frees a disposable scope and every binding it owns, returning how
    /// many bindings were freed. Durable scopes are left in place.
    pub fn release_scope(&mut self, scope: ScopeId) -> Result<usize, RuntimeError> {
        if self.scope(scope)?.durable {
            return Ok(0);
        }
        self.free_scope(scope)
    }

    /// Frees a scope and every binding it owns, durable or not.
    pub fn free_scope(&mut self, scope: ScopeId) -> Result<usize, RuntimeError> {
        let released = self
            .scopes
            .free(scope)
            .ok_or_else(|| RuntimeError::StaleHandle(format!("scope {:?}", scope)))?;

        let mut freed = 0;
        for id in released.own {
            if self.bindings.free(id).is_some() {
                freed += 1;
            }
        }

        tracing::trace!(?scope, freed, "released scope");
        Ok(freed)
    }

    /// Frees a binding no scope owns. Returns false if it was already gone.
    pub fn free_binding(&mut self, id: BindingId) -> bool {
        self.bindings.free(id).is_some()
    }

    /// Returns true if the binding handle is still live.
    pub fn is_live(&self, id: BindingId) -> bool {
        self.bindings.contains(id)
    }

    /// Number of live bindings.
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Number of live scopes.
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }
}
