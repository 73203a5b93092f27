//! Command execution (component H, spec.md §4.H): turns a parsed
//! `Command` into table operations and a formatted reply, one function
//! per wire protocol since the two reply grammars share little beyond
//! the table actions themselves.

pub mod handlers;

pub use handlers::{execute_ascii, execute_binary, ControlFlow};
