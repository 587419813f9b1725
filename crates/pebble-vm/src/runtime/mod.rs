//! Runtime data model: bindings, scopes and the heap that owns them.

pub mod binding;
pub mod heap;
pub mod scope;
pub mod value;

pub use binding::{Binding, BindingId};
pub use heap::Heap;
pub use scope::{Scope, ScopeId};
pub use value::{BindingType, PrimitiveKey, Value};
