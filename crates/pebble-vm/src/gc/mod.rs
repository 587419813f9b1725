//! Memory management for the runtime.
//!
//! Bindings and scopes live in generational arenas. Ownership is explicit:
//! a scope owns the bindings declared in it, and a binding's bound scope is
//! a non-owning handle. Block scopes are torn down when the block exits;
//! see [`crate::runtime::heap`].

pub mod arena;

pub use arena::{Arena, Handle};
