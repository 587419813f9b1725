//! Name resolution.
//!
//! A bare name is looked up in this order:
//!
//! 1. the resolution keywords `caller`, `self` and `it`, read from registers
//! 2. the innermost local scope, immediate level only
//! 3. the scope chain of the current `self` binding
//! 4. the current caller's scope, immediate level only
//! 5. the program scope, immediate level only
//!
//! A name found nowhere is declared in the innermost local scope, so bare
//! resolution never fails. A scoped name is looked up in the immediate
//! level of its target's scope and declared there on a miss.

use super::interpreter::VM;
use crate::error::RuntimeError;
use crate::runtime::binding::{Binding, BindingId};
use crate::runtime::value::BindingType;

/// Resolves to the caller register.
pub const CALLER_KEYWORD: &str = "caller";
/// Resolves to the self register.
pub const SELF_KEYWORD: &str = "self";
/// Resolves to the last statement result.
pub const LAST_RESULT_KEYWORD: &str = "it";

/// Returns true for names that resolve to a register instead of a scope.
pub fn is_keyword(name: &str) -> bool {
    matches!(name, CALLER_KEYWORD | SELF_KEYWORD | LAST_RESULT_KEYWORD)
}

impl VM {
    pub(super) fn resolve_direct(&mut self, name: &str) -> Result<BindingId, RuntimeError> {
        match name {
            CALLER_KEYWORD => return Ok(self.registers.caller),
            SELF_KEYWORD => return Ok(self.registers.receiver),
            LAST_RESULT_KEYWORD => return Ok(self.registers.last_result.unwrap_or(self.nothing)),
            _ => {}
        }

        let local = self.registers.local_scope;
        if let Some(found) = self.heap.find_immediate(local, name)? {
            return Ok(found);
        }

        if let Some(scope) = self.heap.binding(self.registers.receiver)?.scope {
            if let Some(found) = self.heap.find_inherited(scope, name)? {
                return Ok(found);
            }
        }

        if let Some(scope) = self.heap.binding(self.registers.caller)?.scope {
            if let Some(found) = self.heap.find_immediate(scope, name)? {
                return Ok(found);
            }
        }

        if let Some(found) = self.heap.find_immediate(self.program_scope, name)? {
            return Ok(found);
        }

        tracing::trace!(name, "declaring unresolved name");
        self.heap.declare(local, Binding::named(name, BindingType::Null))
    }

    /// Resolves `name` inside `target`'s scope. `Ok(None)` means the target
    /// has no scope, which the caller reports as a recoverable error.
    pub(super) fn resolve_scoped(&mut self, target: BindingId, name: &str) -> Result<Option<BindingId>, RuntimeError> {
        let Some(scope) = self.heap.binding(target)?.scope else {
            return Ok(None);
        };

        match self.heap.find_immediate(scope, name)? {
            Some(found) => Ok(Some(found)),
            None => self
                .heap
                .declare(scope, Binding::named(name, BindingType::Null))
                .map(Some),
        }
    }
}
